//! XDG-compliant path management

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Manages all application paths using XDG base directory specification
#[derive(Debug, Clone)]
pub struct Paths {
    config_dir: PathBuf,
    data_dir: PathBuf,
    cache_dir: PathBuf,
}

impl Paths {
    /// Resolve the per-user directories
    pub fn new() -> Result<Self> {
        let dirs = ProjectDirs::from("", "", "modlinks")
            .context("Failed to determine project directories")?;
        Ok(Self {
            config_dir: dirs.config_dir().to_path_buf(),
            data_dir: dirs.data_dir().to_path_buf(),
            cache_dir: dirs.cache_dir().to_path_buf(),
        })
    }

    /// Everything under one root, for tests and portable installs
    pub fn with_root(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            data_dir: root.join("data"),
            cache_dir: root.join("cache"),
        }
    }

    // ========== Config Paths ==========

    /// Config directory: ~/.config/modlinks/
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone()
    }

    /// Main config file: ~/.config/modlinks/config.toml
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    // ========== Data Paths ==========

    /// Data directory: ~/.local/share/modlinks/
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    /// Install records: ~/.local/share/modlinks/modlinks.db
    pub fn database_file(&self) -> PathBuf {
        self.data_dir.join("modlinks.db")
    }

    /// Log file: ~/.local/share/modlinks/modlinks.log
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("modlinks.log")
    }

    // ========== Cache Paths ==========

    /// Cache directory: ~/.cache/modlinks/
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone()
    }

    /// Downloaded archives: ~/.cache/modlinks/downloads/
    pub fn downloads_dir(&self) -> PathBuf {
        self.cache_dir.join("downloads")
    }

    /// Last fetched catalog: ~/.cache/modlinks/ModLinks.xml
    pub fn cached_mod_links(&self) -> PathBuf {
        self.cache_dir.join("ModLinks.xml")
    }

    /// Last fetched API manifest: ~/.cache/modlinks/ApiLinks.xml
    pub fn cached_api_links(&self) -> PathBuf {
        self.cache_dir.join("ApiLinks.xml")
    }

    // ========== Utility Methods ==========

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.downloads_dir())?;
        Ok(())
    }
}
