//! Local persistence for downloaded files.

use crate::cache::{default_cache_root, write_atomic};
use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use url::Url;

/// A directory that downloaded files are written into.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// A store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// A store in the platform cache directory (`<cache>/poly/files`).
    pub fn in_default_location() -> Result<Self> {
        Ok(Self::new(default_cache_root()?.join("files")))
    }

    /// The directory files are written into.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where `filename` lives (or would live) in this store.
    #[must_use]
    pub fn resolve(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Write `data` to `filename`, replacing any existing file.
    ///
    /// The file is written beside its destination and renamed into place,
    /// so concurrent saves of one name leave one complete file.
    pub async fn save(&self, filename: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.resolve(filename);

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| storage_error(&self.dir, &e))?;
        write_atomic(&path, data)
            .await
            .map_err(|e| storage_error(&path, &e))?;

        tracing::debug!(path = %path.display(), size = data.len(), "saved file");
        Ok(path)
    }
}

/// The local file name for a download: the URL's last path segment, or a
/// hash of the URL when it has none.
#[must_use]
pub fn file_name_for(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .map(|segment| {
            urlencoding::decode(segment)
                .map_or_else(|_| segment.to_string(), |decoded| decoded.into_owned())
        })
        .filter(|name| !name.contains(['/', '\\']))
        .unwrap_or_else(|| hex::encode(Sha256::digest(url.as_str().as_bytes())))
}

fn storage_error(path: &Path, e: &std::io::Error) -> Error {
    Error::Storage {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}
