//! Installer backed by the game's managed folder and the SQLite store
//!
//! Layout inside the managed folder:
//! - `Mods/<name>/` for enabled mods
//! - `Mods/Disabled/<name>/` for disabled mods
//! - `Assembly-CSharp.dll` is the active game assembly; the inactive one is
//!   kept next to it as `.v` (vanilla) or `.m` (modded).

use super::archive::{extract_zip, verify_sha256};
use super::{Installer, ModSource};
use crate::db::{ApiManifest, ApiRecord, Database, InstalledModRecord};
use crate::error::InstallerError;
use crate::mods::{version, DownloadProgress, Mod, ModProgress, ModState, ProgressCallback};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use semver::Version;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

const GAME_ASSEMBLY: &str = "Assembly-CSharp.dll";
const VANILLA_SUFFIX: &str = ".v";
const MODDED_SUFFIX: &str = ".m";

pub struct LocalInstaller {
    client: reqwest::Client,
    managed: PathBuf,
    db: Arc<Database>,
    api: ApiManifest,
}

impl LocalInstaller {
    pub fn new(managed: PathBuf, db: Arc<Database>, api: ApiManifest) -> Self {
        Self {
            client: reqwest::Client::new(),
            managed,
            db,
            api,
        }
    }

    fn mods_dir(&self) -> PathBuf {
        self.managed.join("Mods")
    }

    fn disabled_dir(&self) -> PathBuf {
        self.mods_dir().join("Disabled")
    }

    fn mod_dir(&self, name: &str, enabled: bool) -> PathBuf {
        if enabled {
            self.mods_dir().join(name)
        } else {
            self.disabled_dir().join(name)
        }
    }

    fn assembly(&self, suffix: &str) -> PathBuf {
        self.managed.join(format!("{}{}", GAME_ASSEMBLY, suffix))
    }

    /// Stream `url` into memory, reporting progress as chunks arrive
    async fn download(
        &self,
        url: &str,
        progress: Option<&ProgressCallback>,
    ) -> Result<Vec<u8>, InstallerError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(InstallerError::Network(format!(
                "download of {} failed with status {}",
                url,
                response.status()
            )));
        }

        let total = response.content_length();
        let mut bytes = Vec::with_capacity(total.unwrap_or(0) as usize);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            bytes.extend_from_slice(&chunk);
            if let Some(cb) = progress {
                cb(ModProgress {
                    completed: false,
                    download: Some(DownloadProgress {
                        bytes_read: bytes.len() as u64,
                        total,
                    }),
                });
            }
        }

        Ok(bytes)
    }

    async fn remove_mod_files(&self, name: &str) -> Result<(), InstallerError> {
        for enabled in [true, false] {
            let dir = self.mod_dir(name, enabled);
            if fs::try_exists(&dir).await? {
                fs::remove_dir_all(&dir).await?;
            }
        }
        Ok(())
    }

    fn staging_dir(&self, name: &str) -> PathBuf {
        self.managed.join(".mod-staging").join(name)
    }

    /// Unpack a downloaded or supplied file beside the mod folder, record it,
    /// then swap it in for the old files. A failure before the swap leaves
    /// the previous files and record untouched.
    async fn place_files(
        &self,
        enable: bool,
        filename: &str,
        bytes: &[u8],
        record: InstalledModRecord,
    ) -> Result<(), InstallerError> {
        let name = record.name.clone();
        let staging = self.staging_dir(&name);
        if fs::try_exists(&staging).await? {
            fs::remove_dir_all(&staging).await?;
        }
        fs::create_dir_all(&staging).await?;

        if let Err(e) = unpack(filename, bytes, &staging).await {
            discard(&staging).await;
            return Err(e);
        }

        let previous = self.db.get_installed(&name)?;
        if let Err(e) = self.record(record) {
            discard(&staging).await;
            return Err(e);
        }

        let dest = self.mod_dir(&name, enable);
        let swapped = async {
            self.remove_mod_files(&name).await?;
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).await?;
            }
            Self::rename(&staging, &dest).await
        }
        .await;

        if let Err(e) = swapped {
            discard(&staging).await;
            self.restore_record(&name, previous);
            return Err(e);
        }
        Ok(())
    }

    fn restore_record(&self, name: &str, previous: Option<InstalledModRecord>) {
        let restored = match previous {
            Some(record) => self.db.upsert_installed(&record),
            None => self.db.remove_installed(name),
        };
        if let Err(e) = restored {
            tracing::error!("Failed to restore install record of {}: {:#}", name, e);
        }
    }

    fn record(&self, record: InstalledModRecord) -> Result<(), InstallerError> {
        self.db
            .upsert_installed(&record)
            .with_context(|| format!("Failed to record install of {}", record.name))?;
        Ok(())
    }

    fn pinned_on_record(&self, name: &str) -> Result<bool, InstallerError> {
        Ok(self
            .db
            .get_installed(name)?
            .map(|r| r.pinned)
            .unwrap_or(false))
    }

    async fn rename(from: &Path, to: &Path) -> Result<(), InstallerError> {
        fs::rename(from, to).await.map_err(|e| {
            InstallerError::Other(anyhow!(
                "Failed to move {} to {}: {}",
                from.display(),
                to.display(),
                e
            ))
        })
    }
}

/// Extract a zip into `dest`, or copy any other file there as is
async fn unpack(filename: &str, bytes: &[u8], dest: &Path) -> Result<(), InstallerError> {
    if filename.to_ascii_lowercase().ends_with(".zip") {
        let count = extract_zip(bytes, dest)?;
        tracing::debug!("Extracted {} files into {}", count, dest.display());
    } else {
        let file = Path::new(filename)
            .file_name()
            .ok_or_else(|| anyhow!("Invalid file name '{}'", filename))?;
        fs::write(dest.join(file), bytes).await?;
    }
    Ok(())
}

async fn discard(staging: &Path) {
    if let Err(e) = fs::remove_dir_all(staging).await {
        tracing::warn!("Failed to clean up {}: {}", staging.display(), e);
    }
}

fn file_name_from_link(link: &str) -> String {
    url::Url::parse(link)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.last().map(str::to_string))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "download.zip".to_string())
}

#[async_trait]
impl Installer for LocalInstaller {
    async fn install(
        &self,
        m: &Mod,
        progress: ProgressCallback,
        enable: bool,
    ) -> Result<(), InstallerError> {
        tracing::info!("Installing {} {}", m.name, version::display(&m.version));

        let bytes = self.download(&m.link, Some(&progress)).await?;
        verify_sha256(&m.name, &bytes, &m.sha256)?;

        let filename = file_name_from_link(&m.link);
        let pinned = self.pinned_on_record(&m.name)?;
        let record = InstalledModRecord {
            name: m.name.clone(),
            version: m.version.to_string(),
            enabled: enable,
            pinned,
            from_catalog: true,
            updated_at: Utc::now().to_rfc3339(),
        };
        self.place_files(enable, &filename, &bytes, record).await?;

        progress(ModProgress {
            completed: true,
            download: None,
        });
        Ok(())
    }

    async fn uninstall(&self, m: &Mod) -> Result<(), InstallerError> {
        tracing::info!("Uninstalling {}", m.name);
        self.remove_mod_files(&m.name).await?;
        self.db.remove_installed(&m.name)?;
        Ok(())
    }

    async fn toggle(&self, m: &Mod) -> Result<(), InstallerError> {
        let enabled = m.state.enabled().ok_or_else(|| {
            InstallerError::Other(anyhow!("{} is not installed", m.name))
        })?;

        let from = self.mod_dir(&m.name, enabled);
        let to = self.mod_dir(&m.name, !enabled);

        if fs::try_exists(&from).await? {
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).await?;
            }
            if fs::try_exists(&to).await? {
                fs::remove_dir_all(&to).await?;
            }
            Self::rename(&from, &to).await?;
        } else if !fs::try_exists(&to).await? {
            return Err(InstallerError::Other(anyhow!(
                "Files for {} are missing from {}",
                m.name,
                self.mods_dir().display()
            )));
        }

        self.db.set_enabled(&m.name, !enabled)?;
        tracing::info!(
            "{} {}",
            if enabled { "Disabled" } else { "Enabled" },
            m.name
        );
        Ok(())
    }

    async fn pin(&self, m: &Mod, pinned: bool) -> Result<(), InstallerError> {
        self.db.set_pinned(&m.name, pinned)?;
        Ok(())
    }

    async fn install_api(&self) -> Result<(), InstallerError> {
        let link = self
            .api
            .download()
            .cloned()
            .ok_or_else(|| InstallerError::Other(anyhow!("The API manifest has no download link")))?;

        tracing::info!("Installing modding API {}", self.api.version);
        let bytes = self.download(&link.url, None).await?;
        verify_sha256("modding API", &bytes, &link.sha256)?;

        let active = self.assembly("");
        let vanilla = self.assembly(VANILLA_SUFFIX);
        let was_enabled = self.db.get_api()?.map(|r| r.enabled).unwrap_or(false);
        if fs::try_exists(&active).await? && !was_enabled && !fs::try_exists(&vanilla).await? {
            fs::copy(&active, &vanilla).await?;
        }

        let staging = self.managed.join(".api-staging");
        if fs::try_exists(&staging).await? {
            fs::remove_dir_all(&staging).await?;
        }
        extract_zip(&bytes, &staging)?;
        for file in self.api.files() {
            let source = staging.join(file);
            if !fs::try_exists(&source).await? {
                tracing::warn!("API archive is missing {}", file);
                continue;
            }
            fs::copy(&source, self.managed.join(file)).await?;
        }
        fs::remove_dir_all(&staging).await?;

        let modded = self.assembly(MODDED_SUFFIX);
        if fs::try_exists(&modded).await? {
            fs::remove_file(&modded).await?;
        }

        self.db.set_api(ApiRecord {
            version: self.api.version,
            enabled: true,
        })?;
        Ok(())
    }

    async fn toggle_api(&self) -> Result<(), InstallerError> {
        let record = self
            .db
            .get_api()?
            .ok_or_else(|| InstallerError::Other(anyhow!("The modding API is not installed")))?;

        let active = self.assembly("");
        let (stash, restore) = if record.enabled {
            (self.assembly(MODDED_SUFFIX), self.assembly(VANILLA_SUFFIX))
        } else {
            (self.assembly(VANILLA_SUFFIX), self.assembly(MODDED_SUFFIX))
        };

        if !fs::try_exists(&restore).await? {
            return Err(InstallerError::Other(anyhow!(
                "Cannot toggle the API: {} is missing",
                restore.display()
            )));
        }

        Self::rename(&active, &stash).await?;
        Self::rename(&restore, &active).await?;

        self.db.set_api(ApiRecord {
            enabled: !record.enabled,
            ..record
        })?;
        tracing::info!(
            "Modding API {}",
            if record.enabled { "disabled" } else { "enabled" }
        );
        Ok(())
    }

    async fn check_api(&self) -> Result<bool, InstallerError> {
        let Some(record) = self.db.get_api()? else {
            return Ok(false);
        };

        let active = fs::try_exists(self.assembly("")).await?;
        let stashed = if record.enabled {
            fs::try_exists(self.assembly(VANILLA_SUFFIX)).await?
        } else {
            fs::try_exists(self.assembly(MODDED_SUFFIX)).await?
        };
        Ok(active && stashed)
    }

    async fn place_mod(
        &self,
        m: &Mod,
        enable: bool,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<(), InstallerError> {
        tracing::info!("Placing {} from {}", m.name, filename);
        let record = InstalledModRecord {
            name: m.name.clone(),
            version: m.version.to_string(),
            enabled: enable,
            pinned: false,
            from_catalog: false,
            updated_at: Utc::now().to_rfc3339(),
        };
        self.place_files(enable, filename, &bytes, record).await
    }
}

impl ModSource for LocalInstaller {
    fn api_install(&self) -> ModState {
        match self.db.get_api() {
            Ok(Some(record)) => ModState::Installed {
                enabled: record.enabled,
                version: Version::new(u64::from(record.version), 0, 0),
                updated: record.version >= self.api.version,
                pinned: false,
            },
            Ok(None) => ModState::NotInstalled { installing: false },
            Err(e) => {
                tracing::error!("Failed to read API install record: {:#}", e);
                ModState::NotInstalled { installing: false }
            }
        }
    }

    fn record_installed_state(&self, m: &Mod) -> Result<(), InstallerError> {
        match &m.state {
            ModState::Installed {
                enabled,
                version,
                pinned,
                ..
            } => self.record(InstalledModRecord {
                name: m.name.clone(),
                version: version.to_string(),
                enabled: *enabled,
                pinned: *pinned,
                from_catalog: true,
                updated_at: Utc::now().to_rfc3339(),
            }),
            ModState::NotInModLinks {
                installed: true,
                enabled,
                modlinks_mod,
                pinned,
            } => self.record(InstalledModRecord {
                name: m.name.clone(),
                version: m.version.to_string(),
                enabled: *enabled,
                pinned: *pinned,
                from_catalog: *modlinks_mod,
                updated_at: Utc::now().to_rfc3339(),
            }),
            ModState::NotInstalled { .. } | ModState::NotInModLinks { installed: false, .. } => {
                self.db.remove_installed(&m.name)?;
                Ok(())
            }
        }
    }
}
