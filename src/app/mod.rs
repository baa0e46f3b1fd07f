//! Application wiring: catalog loading, collaborators and CLI handlers

mod actions;
mod modlist;
mod prompt;

pub use actions::{cmd_config_set, cmd_config_show, ListOptions};
pub use modlist::{BulkReport, ModList, Outcome};
pub use prompt::{Confirmations, TerminalConfirmations};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::db::{parse_api_links, parse_mod_links, ApiLinks, Database, ModDatabase, ModLinks};
use crate::installer::LocalInstaller;
use crate::mods::{ModProgress, ProgressCallback};
use crate::APP_VERSION;

use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Main application struct that owns the live catalog
pub struct App {
    pub config: Config,

    pub db: Arc<Database>,

    /// Every mod operation goes through here
    pub mods: ModList,
}

impl App {
    /// Load the catalog, join it with local install records and wire up the
    /// installer for the configured managed folder.
    pub async fn new(config: Config, assume_yes: bool) -> Result<Self> {
        config
            .paths
            .ensure_dirs()
            .context("Failed to create directories")?;
        let managed = config.managed_folder()?;

        let db = Database::open(&config.paths.database_file()).context("Failed to open database")?;
        let db = Arc::new(db);

        let (links, api_links) = load_links(&config).await?;
        let recent = db
            .observe_catalog(&ModDatabase::catalog_entries(&links), Utc::now())
            .context("Failed to record catalog history")?;
        let installed = db.list_installed()?;

        let database = ModDatabase::new(&links, api_links.manifest, &installed, &recent);
        tracing::info!(
            "Loaded {} mods ({} installed), API version {}",
            database.items.len(),
            installed.len(),
            database.api.version
        );

        let latest_api = database.api.version;
        let installer = Arc::new(LocalInstaller::new(managed, db.clone(), database.api));
        let catalog = Arc::new(RwLock::new(Catalog::new(database.items)));

        let mods = ModList::new(
            catalog,
            installer.clone(),
            installer,
            Arc::new(TerminalConfirmations::new(assume_yes)),
            config.settings.clone(),
            latest_api,
        )
        .with_progress(download_progress());

        Ok(Self { config, db, mods })
    }
}

/// Catalog and API manifests, from the configured overrides or the network
async fn load_links(config: &Config) -> Result<(ModLinks, ApiLinks)> {
    let settings = &config.settings;
    let paths = &config.paths;
    let client = reqwest::Client::builder()
        .user_agent(format!("modlinks/{}", APP_VERSION))
        .timeout(FETCH_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;

    let mod_xml = match &settings.modlinks_path {
        Some(path) => read_override(path).await?,
        None => fetch_cached(&client, &settings.mod_links_url(), &paths.cached_mod_links()).await?,
    };
    let api_xml = match &settings.apilinks_path {
        Some(path) => read_override(path).await?,
        None => fetch_cached(&client, &settings.api_links_url(), &paths.cached_api_links()).await?,
    };

    Ok((parse_mod_links(&mod_xml)?, parse_api_links(&api_xml)?))
}

async fn read_override(path: &Path) -> Result<String> {
    tracing::debug!("Reading {}", path.display());
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// Fetch `url` and refresh the cache, falling back to the cache when offline.
async fn fetch_cached(client: &reqwest::Client, url: &str, cache: &Path) -> Result<String> {
    let fetched = async {
        let response = client.get(url).send().await?.error_for_status()?;
        response.text().await
    }
    .await;

    match fetched {
        Ok(body) => {
            if let Err(e) = tokio::fs::write(cache, &body).await {
                tracing::warn!("Failed to cache {}: {}", cache.display(), e);
            }
            Ok(body)
        }
        Err(e) => {
            tracing::warn!("Failed to fetch {}: {}, using cached copy", url, e);
            tokio::fs::read_to_string(cache)
                .await
                .with_context(|| format!("Failed to fetch {} and no cached copy exists", url))
        }
    }
}

/// A progress callback drawing one bar per download on stderr
fn download_progress() -> ProgressCallback {
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");

    let current: Mutex<Option<ProgressBar>> = Mutex::new(None);
    Arc::new(move |p: ModProgress| {
        let Ok(mut slot) = current.lock() else {
            return;
        };

        if let Some(download) = p.download {
            let bar = slot.get_or_insert_with(|| {
                let bar = ProgressBar::new(download.total.unwrap_or(0));
                bar.set_style(style.clone());
                bar
            });
            if let Some(total) = download.total {
                bar.set_length(total);
            }
            bar.set_position(download.bytes_read);
        }

        if p.completed {
            if let Some(bar) = slot.take() {
                bar.finish_and_clear();
            }
        }
    })
}
