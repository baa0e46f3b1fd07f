//! Configuration management for modlinks
//!
//! Uses XDG-compliant paths:
//! - Config: ~/.config/modlinks/config.toml
//! - Data: ~/.local/share/modlinks/
//! - Cache: ~/.cache/modlinks/

mod paths;

pub use paths::Paths;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// Default location of the published catalog files
pub const DEFAULT_BASE_LINK: &str =
    "https://raw.githubusercontent.com/hk-modding/modlinks/main";

/// User settings, persisted as TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// The game's `Managed` folder; mods live under `Mods/` inside it
    pub managed_folder: Option<PathBuf>,

    /// Ask before uninstalling or disabling a mod other enabled mods need
    pub warn_before_removing_dependents: bool,

    /// What to do with dependencies nothing needs anymore after an uninstall
    pub auto_remove_unused_deps: AutoRemoveUnusedDeps,

    /// Local ModLinks.xml to use instead of downloading one
    pub modlinks_path: Option<PathBuf>,

    /// Local ApiLinks.xml to use instead of downloading one
    pub apilinks_path: Option<PathBuf>,

    /// Base URL the catalog files are fetched from
    pub base_link: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            managed_folder: None,
            warn_before_removing_dependents: true,
            auto_remove_unused_deps: AutoRemoveUnusedDeps::Ask,
            modlinks_path: None,
            apilinks_path: None,
            base_link: DEFAULT_BASE_LINK.to_string(),
        }
    }
}

impl Settings {
    pub fn mod_links_url(&self) -> String {
        format!("{}/ModLinks.xml", self.base_link.trim_end_matches('/'))
    }

    pub fn api_links_url(&self) -> String {
        format!("{}/ApiLinks.xml", self.base_link.trim_end_matches('/'))
    }
}

/// Policy for dependencies left unused by an uninstall
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AutoRemoveUnusedDeps {
    Never,
    #[default]
    Ask,
    Always,
}

impl AutoRemoveUnusedDeps {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoRemoveUnusedDeps::Never => "never",
            AutoRemoveUnusedDeps::Ask => "ask",
            AutoRemoveUnusedDeps::Always => "always",
        }
    }

    pub fn from_cli(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "never" | "no" => Ok(AutoRemoveUnusedDeps::Never),
            "ask" | "prompt" => Ok(AutoRemoveUnusedDeps::Ask),
            "always" | "yes" => Ok(AutoRemoveUnusedDeps::Always),
            other => bail!(
                "Invalid unused dependency policy '{}'. Valid values: never, ask, always",
                other
            ),
        }
    }
}

/// Settings plus the paths they were loaded from
#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
    pub paths: Paths,
}

impl Config {
    /// Load the config file, creating it with defaults on first run
    pub async fn load(paths: Paths) -> Result<Self> {
        let config_path = paths.config_file();

        let settings = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            let config = Config {
                settings: Settings::default(),
                paths: paths.clone(),
            };
            config.save().await?;
            config.settings
        };

        Ok(Self { settings, paths })
    }

    pub async fn save(&self) -> Result<()> {
        let config_path = self.paths.config_file();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content =
            toml::to_string_pretty(&self.settings).context("Failed to serialize config")?;
        fs::write(&config_path, content)
            .await
            .context("Failed to write config file")?;

        Ok(())
    }

    /// The managed folder, or an error telling the user how to set it
    pub fn managed_folder(&self) -> Result<PathBuf> {
        match &self.settings.managed_folder {
            Some(path) => Ok(path.clone()),
            None => bail!(
                "No managed folder configured. Set managed_folder in {}",
                self.paths.config_file().display()
            ),
        }
    }
}
