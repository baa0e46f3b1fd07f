//! Mod model - catalog facts plus the mutable lifecycle state

pub mod state;
pub mod version;

pub use state::ModState;

use chrono::{DateTime, Utc};
use semver::Version;
use std::sync::Arc;

/// Description given to mods installed from a local file.
pub const MANUAL_INSTALL_DESCRIPTION: &str =
    "This mod was manually installed and is not from official modlinks";

/// Progress reported by the installer while fetching a mod
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModProgress {
    pub completed: bool,
    pub download: Option<DownloadProgress>,
}

/// Bytes transferred so far for a download
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    pub bytes_read: u64,
    pub total: Option<u64>,
}

impl DownloadProgress {
    /// Percentage in `0.0..=100.0`, `None` when the size is unknown.
    pub fn percent_complete(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => {
                Some((self.bytes_read as f64 / total as f64 * 100.0).min(100.0))
            }
            _ => None,
        }
    }
}

/// Progress callback handed to the installer
pub type ProgressCallback = Arc<dyn Fn(ModProgress) + Send + Sync>;

/// A callback that drops every progress report
pub fn no_progress() -> ProgressCallback {
    Arc::new(|_| {})
}

/// When a mod was added to or last changed in the catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentChangeInfo {
    pub last_created: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl RecentChangeInfo {
    /// Oldest change still reported as recent, in days.
    pub const RECENT_DAYS: i64 = 31;

    pub fn is_created_recently(&self, now: DateTime<Utc>) -> bool {
        Self::within(self.last_created, now, Self::RECENT_DAYS)
    }

    pub fn is_updated_recently(&self, now: DateTime<Utc>) -> bool {
        Self::within(self.last_updated, now, Self::RECENT_DAYS)
    }

    pub(crate) fn within(at: Option<DateTime<Utc>>, now: DateTime<Utc>, days: i64) -> bool {
        at.is_some_and(|at| at >= now - chrono::Duration::days(days))
    }
}

/// A catalog entry: immutable facts plus `state`, the only mutable field.
///
/// Identity is the name; two entries with the same name are the same mod.
#[derive(Debug, Clone, PartialEq)]
pub struct Mod {
    pub name: String,
    pub version: Version,
    pub dependencies: Vec<String>,
    pub integrations: Vec<String>,
    pub tags: Vec<String>,
    pub authors: Vec<String>,
    pub link: String,
    pub sha256: String,
    pub description: String,
    pub repository: String,
    pub recent_changes: RecentChangeInfo,
    pub state: ModState,
}

impl Mod {
    /// Entry with the given name and default facts, not installed.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version::zero(),
            dependencies: Vec::new(),
            integrations: Vec::new(),
            tags: Vec::new(),
            authors: Vec::new(),
            link: String::new(),
            sha256: String::new(),
            description: String::new(),
            repository: String::new(),
            recent_changes: RecentChangeInfo::default(),
            state: ModState::default(),
        }
    }

    /// Synthetic entry for a mod installed from a local file.
    pub fn manual(name: impl Into<String>) -> Self {
        Self {
            description: MANUAL_INSTALL_DESCRIPTION.to_string(),
            state: ModState::NotInModLinks {
                installed: true,
                enabled: true,
                modlinks_mod: false,
                pinned: false,
            },
            ..Self::new(name)
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_integrations<I, S>(mut self, integrations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.integrations = integrations.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_state(mut self, state: ModState) -> Self {
        self.state = state;
        self
    }

    /// Installed as far as the user is concerned (catalog or not).
    pub fn installed(&self) -> bool {
        matches!(
            self.state,
            ModState::Installed { .. } | ModState::NotInModLinks { .. }
        )
    }

    pub fn update_available(&self) -> bool {
        self.state.is_out_of_date()
    }

    /// Whether the enable checkbox should be ticked.
    pub fn enabled_is_checked(&self) -> bool {
        match &self.state {
            ModState::Installed { enabled, .. } | ModState::NotInModLinks { enabled, .. } => {
                *enabled
            }
            ModState::NotInstalled { .. } => false,
        }
    }

    /// Installed version for catalog installs, catalog version otherwise.
    pub fn version_text(&self) -> String {
        match &self.state {
            ModState::Installed { version, .. } => version::display(version),
            ModState::NotInstalled { .. } | ModState::NotInModLinks { .. } => {
                version::display(&self.version)
            }
        }
    }

    /// Out of the catalog and never part of it.
    pub fn is_external(&self) -> bool {
        matches!(
            self.state,
            ModState::NotInModLinks {
                modlinks_mod: false,
                ..
            }
        )
    }

    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.iter().any(|d| d == name)
    }

    pub fn integrates_with(&self, name: &str) -> bool {
        self.integrations.iter().any(|i| i == name)
    }

    /// `owner/repo` for GitHub repositories, the raw value otherwise.
    pub fn shortened_repository(&self) -> String {
        if !self.repository.contains("github.com") {
            return self.repository.clone();
        }

        match url::Url::parse(&self.repository) {
            Ok(parsed) => parsed.path().trim_matches('/').to_string(),
            Err(e) => {
                tracing::debug!("Unable to parse repository {}: {}", self.repository, e);
                self.repository.clone()
            }
        }
    }
}
