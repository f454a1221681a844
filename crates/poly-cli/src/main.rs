//! Command-line client for the Poly asset catalog.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use poly::{
    Asset, Cache, CachePolicy, Client, Complexity, DiskCache, DownloadOptions, FileStore,
    FormatKind, ListQuery, Session, SessionConfig, TieredCache,
};

#[derive(Parser)]
#[command(name = "poly", about = "Search and download assets from the Poly catalog")]
struct CliArgs {
    /// API key for catalog requests.
    #[arg(long, env = "POLY_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OAuth token sent as a bearer token.
    #[arg(long, env = "POLY_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// Catalog endpoint.
    #[arg(long, env = "POLY_BASE_URL")]
    base_url: Option<String>,

    /// Directory for the download cache and downloaded files.
    #[arg(long, env = "POLY_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show one asset.
    Get {
        /// Asset id, with or without the `assets/` prefix.
        id: String,
    },
    /// Search the catalog.
    List {
        /// Search keywords.
        keywords: Vec<String>,
        /// Only curated assets.
        #[arg(long)]
        curated: bool,
        #[arg(long)]
        category: Option<String>,
        /// Maximum complexity (simple, medium, complex).
        #[arg(long)]
        complexity: Option<Complexity>,
        /// Required format (OBJ, GLTF2, ...).
        #[arg(long)]
        format: Option<FormatKind>,
        /// Continue from a previous page.
        #[arg(long)]
        page_token: Option<String>,
    },
    /// Download an asset's files.
    Download {
        id: String,
        #[arg(long, value_enum, default_value_t = Policy::PreferCache)]
        policy: Policy,
    },
    /// Manage the download cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove expired entries.
    Sweep,
    /// Remove everything.
    Clear,
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    PreferCache,
    IgnoreCache,
    CacheOnly,
}

impl From<Policy> for CachePolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::PreferCache => CachePolicy::PreferCache,
            Policy::IgnoreCache => CachePolicy::IgnoreCache,
            Policy::CacheOnly => CachePolicy::CacheOnly,
        }
    }
}

impl CliArgs {
    fn config(&self) -> SessionConfig {
        let mut config = SessionConfig::from_env();
        if let Some(api_key) = &self.api_key {
            config = config.with_api_key(api_key);
        }
        if let Some(auth_token) = &self.auth_token {
            config = config.with_auth_token(auth_token);
        }
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url);
        }
        config
    }

    fn client(&self) -> anyhow::Result<Client<TieredCache>> {
        let config = self.config();

        let (disk, store) = match &self.cache_dir {
            Some(dir) => (DiskCache::new(dir.join("http")), FileStore::new(dir.join("files"))),
            None => (
                DiskCache::in_default_location()?,
                FileStore::in_default_location()?,
            ),
        };

        Ok(Client::with_session_and_cache(
            Session::new(config)?,
            TieredCache::with_disk(disk),
            store,
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    let args = CliArgs::parse();
    let client = args.client()?;

    match args.command {
        Command::Get { id } => {
            let asset = client.get_asset(&id).await.context("failed to get asset")?;
            print_asset(&asset);
        }
        Command::List {
            keywords,
            curated,
            category,
            complexity,
            format,
            page_token,
        } => {
            let mut query = ListQuery::keywords(keywords);
            if curated {
                query = query.with_curated(true);
            }
            query.category = category;
            query.max_complexity = complexity;
            query.format = format;
            query.page_token = page_token;

            let page = client
                .list_assets(&query)
                .await
                .context("failed to list assets")?;
            for asset in &page.assets {
                println!(
                    "{}\t{}\t{}",
                    asset.id(),
                    asset.display_name.as_deref().unwrap_or("-"),
                    asset.author_name.as_deref().unwrap_or("-"),
                );
            }
            if let Some(total) = page.total_count {
                println!("{} of {total} assets", page.assets.len());
            }
            if let Some(token) = page.next_page_token {
                println!("next page: --page-token {token}");
            }
        }
        Command::Download { id, policy } => {
            let last_reported = Arc::new(std::sync::atomic::AtomicU32::new(0));
            let options = DownloadOptions::with_policy(policy.into()).with_progress(Arc::new(
                move |fraction| {
                    // Log every 10%.
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let step = (fraction * 10.0).floor() as u32;
                    if step > last_reported.fetch_max(step, std::sync::atomic::Ordering::Relaxed) {
                        tracing::info!("{}%", step * 10);
                    }
                },
            ));

            let handle = client.spawn_download_by_id(&id, options);
            let cancel = tokio::spawn({
                let client = client.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("interrupted, cancelling download");
                        client.cancel_all();
                    }
                }
            });

            let result = handle.join().await;
            cancel.abort();
            let result = result.with_context(|| format!("failed to download {id}"))?;

            println!("{}", result.root.display());
            for resource in &result.resources {
                println!("{}", resource.display());
            }
        }
        Command::Cache { action } => match action {
            CacheAction::Sweep => {
                client.cache().remove_expired().await?;
                tracing::info!("removed expired cache entries");
            }
            CacheAction::Clear => {
                client.cache().clear().await?;
                tracing::info!("cleared cache");
            }
        },
    }

    Ok(())
}

fn print_asset(asset: &Asset) {
    println!("id:        {}", asset.id());
    println!("name:      {}", asset.display_name.as_deref().unwrap_or("-"));
    println!("author:    {}", asset.author_name.as_deref().unwrap_or("-"));
    if let Some(license) = &asset.license {
        println!("license:   {license}");
    }
    if let Some(created) = asset.create_time {
        println!("created:   {}", created.to_rfc3339());
    }
    for format in &asset.formats {
        let triangles = format
            .complexity
            .and_then(|c| c.triangle_count)
            .map_or_else(String::new, |count| format!(", {count} triangles"));
        println!(
            "format:    {} ({} resources{triangles}){}",
            format.kind,
            format.resources.len(),
            if format.is_downloadable() { "" } else { " [no root]" },
        );
    }
}
