//! Error types for catalog operations and installer collaborators

use crate::mods::ModState;
use thiserror::Error;

/// Failure reported by an [`Installer`](crate::installer::Installer) call.
///
/// Any of these means the operation did not happen; the orchestrator restores
/// the mod's previous state before surfacing it.
#[derive(Error, Debug)]
pub enum InstallerError {
    #[error("hash mismatch for {name}: expected {expected}, got {actual}")]
    HashMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl From<reqwest::Error> for InstallerError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// Errors raised by the mod list orchestrator and the dependency index.
#[derive(Error, Debug)]
pub enum ModError {
    /// The operation makes no sense for the mod's current state.
    #[error("cannot {operation} '{name}' while it is {state:?}")]
    InvalidTransition {
        name: String,
        operation: &'static str,
        state: ModState,
    },

    #[error("mod '{0}' is not in the catalog")]
    UnknownMod(String),

    /// A declared dependency names a mod the catalog does not contain.
    #[error("dependency '{0}' is not in the catalog")]
    UnknownDependency(String),

    #[error("corrupt catalog: {0}")]
    CorruptCatalog(String),

    /// Another operation on the same mod is still waiting on the installer.
    #[error("'{0}' is busy with another operation")]
    Busy(String),

    #[error("a mod named '{0}' already exists")]
    DuplicateName(String),

    #[error(transparent)]
    Installer(#[from] InstallerError),
}

impl ModError {
    pub(crate) fn invalid(name: &str, operation: &'static str, state: &ModState) -> Self {
        Self::InvalidTransition {
            name: name.to_string(),
            operation,
            state: state.clone(),
        }
    }

    /// Catalog integrity violations abort bulk operations instead of being skipped.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            ModError::UnknownDependency(_) | ModError::CorruptCatalog(_)
        )
    }
}

pub type ModResult<T> = Result<T, ModError>;
