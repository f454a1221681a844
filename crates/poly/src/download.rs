//! Multi-file asset downloads.
//!
//! An asset's first format is downloaded as one unit: the root file first,
//! then every resource file concurrently. The operation succeeds only once
//! every file is cached and written to the client's [`FileStore`]; the first
//! failure cancels whatever is still running and fails the whole download.

use crate::cache::{Cache, Expiry};
use crate::client::Client;
use crate::error::{Error, Result};
use crate::fetch::{CachePolicy, FetchRequest};
use crate::store::{FileStore, file_name_for};
use crate::transport::{ProgressHandler, Transport};
use crate::types::{Asset, DownloadResult};
use std::{
    fmt,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// Options for a download.
#[derive(Clone, Default)]
pub struct DownloadOptions {
    /// Cache policy applied to every file.
    pub policy: CachePolicy,
    /// Receives overall progress across all files, as a fraction.
    pub progress: Option<ProgressHandler>,
}

impl fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("policy", &self.policy)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl DownloadOptions {
    /// Options with the given cache policy.
    #[must_use]
    pub fn with_policy(policy: CachePolicy) -> Self {
        Self {
            policy,
            progress: None,
        }
    }

    /// Report overall progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressHandler) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// A download running in the background.
#[derive(Debug)]
pub struct DownloadHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<DownloadResult>>,
}

impl DownloadHandle {
    /// Cancel every transfer still outstanding. [`join`](Self::join) then
    /// settles with [`Error::Cancelled`] unless the download already finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the download has settled.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the download to settle.
    pub async fn join(self) -> Result<DownloadResult> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(Error::Unknown {
                detail: format!("download task failed: {e}"),
            }),
        }
    }
}

/// The URLs of one download, validated before any transfer starts.
#[derive(Debug)]
struct DownloadPlan {
    root: Url,
    resources: Vec<Url>,
}

impl DownloadPlan {
    fn for_asset(asset: &Asset) -> Result<Self> {
        let format = asset
            .primary_format()
            .ok_or_else(|| Error::invalid("asset", format!("{} has no formats", asset.name)))?;

        let root = format
            .root
            .as_ref()
            .and_then(|root| root.url.as_deref())
            .ok_or_else(|| Error::invalid("asset", format!("{} has no root file", asset.name)))?;

        Ok(Self {
            root: Url::parse(root)?,
            // Resources without a URL can't be fetched and are left out.
            resources: format
                .resources
                .iter()
                .filter_map(|resource| resource.url.as_deref())
                .map(Url::parse)
                .collect::<std::result::Result<_, _>>()?,
        })
    }

    fn file_count(&self) -> usize {
        1 + self.resources.len()
    }
}

/// Combines per-file progress into one fraction: the mean over all files.
#[derive(Clone)]
struct AggregateProgress {
    fractions: Arc<Mutex<Vec<f32>>>,
    handler: ProgressHandler,
}

impl AggregateProgress {
    fn new(file_count: usize, handler: ProgressHandler) -> Self {
        Self {
            fractions: Arc::new(Mutex::new(vec![0.0; file_count])),
            handler,
        }
    }

    fn for_file(&self, index: usize) -> ProgressHandler {
        let progress = self.clone();
        Arc::new(move |fraction| progress.update(index, fraction))
    }

    #[allow(clippy::cast_precision_loss)]
    fn update(&self, index: usize, fraction: f32) {
        let overall = {
            let mut fractions = self.fractions.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = fractions.get_mut(index) {
                *slot = fraction.clamp(0.0, 1.0);
            }
            fractions.iter().sum::<f32>() / fractions.len() as f32
        };
        (self.handler)(overall);
    }
}

/// Everything a single file transfer needs, shared by the tasks of one
/// download.
struct Transfer<C: Cache> {
    cache: Arc<C>,
    transport: Arc<dyn Transport>,
    store: FileStore,
    policy: CachePolicy,
    expiry: Expiry,
    cancel: CancellationToken,
    progress: Option<AggregateProgress>,
}

impl<C: Cache> Transfer<C> {
    async fn run(&self, index: usize, url: &Url) -> Result<PathBuf> {
        let mut request =
            FetchRequest::new(url.as_str(), self.policy).with_cancellation(self.cancel.clone());
        if let Some(progress) = &self.progress {
            request = request.with_progress(progress.for_file(index));
        }

        let data = request
            .fetch(self.cache.as_ref(), self.transport.as_ref(), self.expiry)
            .await?;
        self.store.save(&file_name_for(url), &data).await
    }
}

impl<C: Cache + 'static> Client<C> {
    /// Download the files of `asset`'s first format.
    ///
    /// Resolves once the root and every resource file are stored locally.
    /// Resource paths are in the format's resource order, regardless of the
    /// order the transfers finished in.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidData`] before any transfer if the asset has
    /// no downloadable format or contains a malformed URL. Otherwise fails
    /// with the first transfer or storage error; remaining transfers are
    /// cancelled and nothing partial is returned.
    pub async fn download_asset(
        &self,
        asset: &Asset,
        options: DownloadOptions,
    ) -> Result<DownloadResult> {
        self.download_with_token(asset, options, self.request_token())
            .await
    }

    /// Look up an asset by id, then download it.
    pub async fn download_asset_by_id(
        &self,
        id: &str,
        options: DownloadOptions,
    ) -> Result<DownloadResult> {
        let asset = self.get_asset(id).await?;
        self.download_asset(&asset, options).await
    }

    /// Start downloading `asset` in the background.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn_download(&self, asset: Asset, options: DownloadOptions) -> DownloadHandle {
        let cancel = self.request_token();
        let client = self.clone();
        let token = cancel.clone();
        let task =
            tokio::spawn(async move { client.download_with_token(&asset, options, token).await });
        DownloadHandle { cancel, task }
    }

    /// Start looking up and downloading an asset in the background.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn_download_by_id(&self, id: &str, options: DownloadOptions) -> DownloadHandle {
        let cancel = self.request_token();
        let client = self.clone();
        let token = cancel.clone();
        let id = id.to_string();
        let task = tokio::spawn(async move {
            let asset = tokio::select! {
                biased;
                () = token.cancelled() => {
                    return Err(Error::Cancelled { url: id });
                }
                asset = client.get_asset(&id) => asset?,
            };
            client.download_with_token(&asset, options, token).await
        });
        DownloadHandle { cancel, task }
    }

    async fn download_with_token(
        &self,
        asset: &Asset,
        options: DownloadOptions,
        cancel: CancellationToken,
    ) -> Result<DownloadResult> {
        let plan = DownloadPlan::for_asset(asset)?;
        let state = self.session.snapshot();

        debug!(
            asset = asset.name,
            policy = %options.policy,
            resources = plan.resources.len(),
            "downloading asset"
        );

        let transfer = Arc::new(Transfer {
            cache: Arc::clone(&self.cache),
            transport: Arc::clone(state.transport()),
            store: self.store.clone(),
            policy: options.policy,
            expiry: Expiry::After(state.config().cache_expiry),
            cancel: cancel.clone(),
            progress: options
                .progress
                .map(|handler| AggregateProgress::new(plan.file_count(), handler)),
        });

        let root = transfer.run(0, &plan.root).await?;

        let mut tasks = JoinSet::new();
        for (index, url) in plan.resources.iter().cloned().enumerate() {
            let transfer = Arc::clone(&transfer);
            tasks.spawn(async move { (index, transfer.run(index + 1, &url).await) });
        }

        let mut slots: Vec<Option<PathBuf>> = vec![None; plan.resources.len()];
        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok((index, Ok(path))) => {
                    slots[index] = Some(path);
                    continue;
                }
                Ok((index, Err(e))) => {
                    warn!(asset = asset.name, url = %plan.resources[index], error = %e, "resource download failed");
                    e
                }
                Err(e) => Error::Unknown {
                    detail: format!("resource task failed: {e}"),
                },
            };
            cancel.cancel();
            tasks.abort_all();
            return Err(failure);
        }

        let resources = slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::Unknown {
                detail: "resource task ended without a result".to_string(),
            })?;

        debug!(asset = asset.name, files = plan.file_count(), "downloaded asset");
        Ok(DownloadResult { root, resources })
    }
}
