use super::{Cache, CacheFuture, EntryFuture, Expiry, GetFuture, is_expired};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::{fs, sync::Mutex};
use tracing::{debug, warn};

/// Default lifetime of a disk entry.
pub const DEFAULT_DISK_EXPIRY: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// Default byte capacity of the disk tier.
pub const DEFAULT_DISK_CAPACITY: u64 = 100 * 1024 * 1024;

const DATA_EXTENSION: &str = "bin";
const META_EXTENSION: &str = "json";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A disk-backed cache.
///
/// Each entry is stored as two files named by the SHA-256 of its key: the
/// raw bytes (`<hash>.bin`) and a JSON metadata sidecar (`<hash>.json`).
/// Both are written to a temporary file and renamed into place, so a reader
/// sees either the old entry or the new one.
///
/// Each entry keeps the expiry it was stored with. When the total stored
/// size exceeds the capacity, the entries stored longest ago are evicted.
#[derive(Debug)]
pub struct DiskCache {
    dir: PathBuf,
    max_size: u64,
    /// Serialises writers so eviction sees a consistent directory.
    write_lock: Mutex<()>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    stored_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    size: u64,
    digest: String,
}

impl DiskCache {
    /// Create a disk cache rooted at `dir`.
    ///
    /// The directory is created lazily on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_size: DEFAULT_DISK_CAPACITY,
            write_lock: Mutex::new(()),
        }
    }

    /// Create a disk cache in the platform cache directory (`<cache>/poly/http`).
    pub fn in_default_location() -> Result<Self> {
        Ok(Self::new(default_cache_root()?.join("http")))
    }

    /// Set the byte capacity.
    #[must_use]
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// The directory entries are stored in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Total bytes currently stored, as recorded in entry metadata.
    pub async fn size(&self) -> Result<u64> {
        Ok(self.entries().await?.iter().map(|(_, meta)| meta.size).sum())
    }

    fn paths(&self, key: &str) -> (PathBuf, PathBuf) {
        let stem = hex::encode(Sha256::digest(key.as_bytes()));
        (
            self.dir.join(format!("{stem}.{DATA_EXTENSION}")),
            self.dir.join(format!("{stem}.{META_EXTENSION}")),
        )
    }

    /// The entry's bytes and deadline, if present, intact and unexpired.
    async fn read_entry(&self, key: &str) -> Result<Option<(Vec<u8>, Option<DateTime<Utc>>)>> {
        let (data_path, meta_path) = self.paths(key);

        let meta_content = match fs::read(&meta_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(cache_error("read", &e)),
        };
        let Ok(meta) = serde_json::from_slice::<EntryMeta>(&meta_content) else {
            warn!(path = %meta_path.display(), "discarding unreadable cache metadata");
            self.discard_stale(key).await?;
            return Ok(None);
        };

        if meta.key != key {
            // SHA-256 collision or a stray file; either way not ours.
            return Ok(None);
        }
        if is_expired(meta.expires_at, Utc::now()) {
            debug!(key, "cache entry expired");
            self.discard_stale(key).await?;
            return Ok(None);
        }

        let data = match fs::read(&data_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(cache_error("read", &e)),
        };

        // A concurrent writer may have swapped the data file between the two
        // reads. Treat any mismatch as a miss rather than hand out the wrong
        // bytes.
        if data.len() as u64 != meta.size || digest(&data) != meta.digest {
            debug!(key, "cache entry changed during read");
            return Ok(None);
        }

        Ok(Some((data, meta.expires_at)))
    }

    /// Remove the entry for `key` if it is still unreadable or expired.
    ///
    /// Readers spot stale entries without holding the write lock, so a writer
    /// may have replaced the entry since; a fresh entry is left alone.
    async fn discard_stale(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let (_, meta_path) = self.paths(key);

        let content = match fs::read(&meta_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(cache_error("read", &e)),
        };
        let stale = match serde_json::from_slice::<EntryMeta>(&content) {
            Ok(meta) => meta.key == key && is_expired(meta.expires_at, Utc::now()),
            Err(_) => true,
        };

        if stale {
            self.remove_entry(key).await?;
        }
        Ok(())
    }

    async fn write_entry(&self, key: &str, data: Vec<u8>, expiry: Expiry) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let (data_path, meta_path) = self.paths(key);

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| cache_error("create directory", &e))?;

        let now = Utc::now();
        let meta = EntryMeta {
            key: key.to_string(),
            stored_at: now,
            expires_at: expiry.deadline(now),
            size: data.len() as u64,
            digest: digest(&data),
        };
        let meta_json = serde_json::to_vec(&meta).map_err(|e| Error::Cache {
            operation: "put",
            message: e.to_string(),
        })?;

        write_atomic(&data_path, &data)
            .await
            .map_err(|e| cache_error("write", &e))?;
        write_atomic(&meta_path, &meta_json)
            .await
            .map_err(|e| cache_error("write", &e))?;
        debug!(key, size = meta.size, "stored cache entry");

        self.evict_to_capacity().await
    }

    async fn remove_entry(&self, key: &str) -> Result<()> {
        let (data_path, meta_path) = self.paths(key);
        remove_if_present(&meta_path).await?;
        remove_if_present(&data_path).await
    }

    /// Every entry with readable metadata, keyed by the metadata path.
    async fn entries(&self) -> Result<Vec<(PathBuf, EntryMeta)>> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(cache_error("scan", &e)),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| cache_error("scan", &e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(META_EXTENSION) {
                continue;
            }
            let Ok(content) = fs::read(&path).await else {
                continue;
            };
            if let Ok(meta) = serde_json::from_slice::<EntryMeta>(&content) {
                entries.push((path, meta));
            }
        }
        Ok(entries)
    }

    async fn evict_to_capacity(&self) -> Result<()> {
        let mut entries = self.entries().await?;
        let mut total: u64 = entries.iter().map(|(_, meta)| meta.size).sum();
        if total <= self.max_size {
            return Ok(());
        }

        entries.sort_by_key(|(_, meta)| meta.stored_at);
        for (meta_path, meta) in entries {
            if total <= self.max_size {
                break;
            }
            remove_if_present(&meta_path).await?;
            remove_if_present(&meta_path.with_extension(DATA_EXTENSION)).await?;
            total = total.saturating_sub(meta.size);
            debug!(key = meta.key, size = meta.size, "evicted cache entry");
        }
        Ok(())
    }
}

impl Cache for DiskCache {
    fn get(&self, key: &str) -> GetFuture<'_> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.read_entry(&key).await?.map(|(data, _)| data)) })
    }

    fn get_entry(&self, key: &str) -> EntryFuture<'_> {
        let key = key.to_string();
        Box::pin(async move {
            Ok(self
                .read_entry(&key)
                .await?
                .map(|(data, expires_at)| (data, Expiry::from_deadline(expires_at))))
        })
    }

    fn put(&self, key: &str, data: Vec<u8>, expiry: Expiry) -> CacheFuture<'_> {
        let key = key.to_string();
        Box::pin(async move { self.write_entry(&key, data, expiry).await })
    }

    fn remove(&self, key: &str) -> CacheFuture<'_> {
        let key = key.to_string();
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            self.remove_entry(&key).await
        })
    }

    fn remove_expired(&self) -> CacheFuture<'_> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            let now = Utc::now();
            let mut removed = 0usize;
            for (meta_path, meta) in self.entries().await? {
                if is_expired(meta.expires_at, now) {
                    remove_if_present(&meta_path).await?;
                    remove_if_present(&meta_path.with_extension(DATA_EXTENSION)).await?;
                    removed += 1;
                }
            }
            debug!(removed, "swept expired cache entries");
            Ok(())
        })
    }

    fn clear(&self) -> CacheFuture<'_> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            match fs::remove_dir_all(&self.dir).await {
                Ok(()) => {
                    debug!(dir = %self.dir.display(), "cleared disk cache");
                    Ok(())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(cache_error("clear", &e)),
            }
        })
    }
}

/// `<platform cache dir>/poly`.
pub(crate) fn default_cache_root() -> Result<PathBuf> {
    let base = dirs::cache_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| Error::Cache {
            operation: "locate",
            message: "could not determine cache directory".to_string(),
        })?;
    Ok(base.join("poly"))
}

fn digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn cache_error(operation: &'static str, e: &std::io::Error) -> Error {
    Error::Cache {
        operation,
        message: e.to_string(),
    }
}

/// Write `content` to a unique temporary file beside `path`, then rename it
/// into place. Readers see the old file or the new one, never a mix.
pub(crate) async fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let temp_path = path.with_extension(format!("{}.{counter}.tmp", std::process::id()));

    fs::write(&temp_path, content).await?;

    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }
    Ok(())
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(cache_error("remove", &e)),
    }
}
