//! Installer collaborators: file operations and install records
//!
//! The orchestrator never touches the filesystem itself. It asks an
//! [`Installer`] to do the work and a [`ModSource`] to read or record what is
//! installed, so both can be replaced in tests.

mod archive;
mod local;

pub use archive::{extract_zip, sha256_hex, verify_sha256};
pub use local::LocalInstaller;

use crate::error::InstallerError;
use crate::mods::{Mod, ModState, ProgressCallback};
use async_trait::async_trait;

/// Performs the file-level side of every mod operation.
///
/// Each call either completes or returns an error having changed nothing the
/// caller needs to undo.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Installer: Send + Sync {
    /// Download, verify and place `m`, replacing any previous copy.
    async fn install(
        &self,
        m: &Mod,
        progress: ProgressCallback,
        enable: bool,
    ) -> Result<(), InstallerError>;

    async fn uninstall(&self, m: &Mod) -> Result<(), InstallerError>;

    /// Flip the enabled flag of an installed mod. `m.state` is the state before the flip.
    async fn toggle(&self, m: &Mod) -> Result<(), InstallerError>;

    async fn pin(&self, m: &Mod, pinned: bool) -> Result<(), InstallerError>;

    async fn install_api(&self) -> Result<(), InstallerError>;

    async fn toggle_api(&self) -> Result<(), InstallerError>;

    /// Whether the API files on disk match what was recorded.
    async fn check_api(&self) -> Result<bool, InstallerError>;

    /// Place a locally supplied mod file (`.dll` or `.zip`).
    async fn place_mod(
        &self,
        m: &Mod,
        enable: bool,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<(), InstallerError>;
}

/// Read and record install state outside of a file operation
#[cfg_attr(test, mockall::automock)]
pub trait ModSource: Send + Sync {
    /// State of the modding API, as a mod state.
    fn api_install(&self) -> ModState;

    /// Persist the current state of `m`.
    fn record_installed_state(&self, m: &Mod) -> Result<(), InstallerError>;
}
