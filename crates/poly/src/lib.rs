//! Async client for the Poly 3D asset catalog.
//!
//! This crate looks up and lists catalog assets and downloads their files
//! (a root model file plus its materials, textures and buffers) as one unit,
//! using a cache to avoid repeat transfers.
//!
//! # Design principles
//!
//! - **Owned sessions**: credentials live in a [`Session`] owned by each [`Client`]
//! - **Per-request cache policy**: every transfer chooses a [`CachePolicy`]
//! - **All-or-nothing downloads**: a download succeeds only when every file does
//!
//! # Example
//!
//! ```ignore
//! use poly::{CachePolicy, Client, DownloadOptions, SessionConfig};
//!
//! // Create a client with a memory + disk cache.
//! let client = Client::with_default_cache(SessionConfig::from_env())?;
//!
//! // Look up an asset and download its files.
//! let asset = client.get_asset("5vbJ5vildOq").await?;
//! let files = client
//!     .download_asset(&asset, DownloadOptions::with_policy(CachePolicy::PreferCache))
//!     .await?;
//! ```

pub mod cache;
mod client;
pub mod download;
mod error;
pub mod fetch;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;

pub use cache::{Cache, DiskCache, Expiry, MemoryCache, NoCache, TieredCache};
pub use client::Client;
pub use download::{DownloadHandle, DownloadOptions};
pub use error::{Error, ErrorKind, Result};
pub use fetch::{CachePolicy, FetchRequest, fingerprint};
pub use session::{Session, SessionConfig};
pub use store::FileStore;
pub use transport::{HttpTransport, ProgressHandler, Transport};
pub use types::{
    Asset, AssetPage, Complexity, DownloadResult, FileRef, Format, FormatComplexity, FormatKind,
    ListQuery, PresentationParams,
};
