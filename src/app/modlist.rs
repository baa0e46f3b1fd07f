//! Mutation orchestrator
//!
//! Every state change goes through [`ModList`]. Each single-mod step runs in
//! three phases against the shared catalog lock:
//!
//! 1. under the write lock: validate the transition, mark the mod in flight
//!    and publish any provisional state;
//! 2. without the lock: await the installer;
//! 3. under the write lock again: release the mod and either commit the new
//!    state or restore the one captured in phase 1.
//!
//! The lock is never held across an installer call, so readers always see
//! either the committed state or the provisional one.

use super::prompt::Confirmations;
use crate::catalog::{BulkFlags, Catalog, CatalogEvent};
use crate::config::{AutoRemoveUnusedDeps, Settings};
use crate::error::{InstallerError, ModError, ModResult};
use crate::installer::{Installer, ModSource};
use crate::mods::{no_progress, Mod, ModState, ProgressCallback};
use crate::view::{self, ViewQuery};
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock, RwLockReadGuard};

/// Whether a confirmable operation went ahead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Declined,
}

/// Per-item results of a bulk operation
#[derive(Debug, Default)]
pub struct BulkReport {
    pub processed: Vec<String>,
    /// Items whose live state no longer qualified, or that were protected
    pub skipped: Vec<String>,
    pub failed: Vec<(String, ModError)>,
}

impl BulkReport {
    /// Record a per-item result. Integrity errors are handed back to abort the batch.
    fn record(&mut self, name: String, result: ModResult<()>) -> ModResult<()> {
        match result {
            Ok(()) => self.processed.push(name),
            Err(e) if e.is_integrity() => return Err(e),
            Err(e) => {
                tracing::error!("{}: {}", name, e);
                self.failed.push((name, e));
            }
        }
        Ok(())
    }
}

/// Cheaply clonable handle to the live catalog and its collaborators
#[derive(Clone)]
pub struct ModList {
    catalog: Arc<RwLock<Catalog>>,
    installer: Arc<dyn Installer>,
    source: Arc<dyn ModSource>,
    prompts: Arc<dyn Confirmations>,
    settings: Settings,
    latest_api: u32,
    progress: ProgressCallback,
}

impl ModList {
    pub fn new(
        catalog: Arc<RwLock<Catalog>>,
        installer: Arc<dyn Installer>,
        source: Arc<dyn ModSource>,
        prompts: Arc<dyn Confirmations>,
        settings: Settings,
        latest_api: u32,
    ) -> Self {
        Self {
            catalog,
            installer,
            source,
            prompts,
            settings,
            latest_api,
            progress: no_progress(),
        }
    }

    /// Report installer progress to `progress`
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub async fn catalog(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read().await
    }

    pub async fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.catalog.read().await.subscribe()
    }

    pub async fn flags(&self) -> BulkFlags {
        self.catalog.read().await.flags()
    }

    /// The visible list for `query`, in display order
    pub async fn view(&self, query: &ViewQuery, now: DateTime<Utc>) -> ModResult<Vec<Mod>> {
        let catalog = self.catalog.read().await;
        Ok(view::project(&catalog, query, now)?
            .into_iter()
            .cloned()
            .collect())
    }

    // ========== Single-mod steps ==========

    /// Phase 1: validate under the lock, claim the mod and publish `provisional`.
    async fn begin<F>(&self, name: &str, provisional: F) -> ModResult<Mod>
    where
        F: FnOnce(&ModState) -> ModResult<Option<ModState>>,
    {
        let mut catalog = self.catalog.write().await;
        let target = catalog.require(name)?.clone();
        let next = provisional(&target.state)?;

        catalog.claim(name)?;
        if let Some(state) = next {
            catalog.set_state(name, state)?;
        }
        Ok(target)
    }

    /// Phase 3: release the claim, then commit on success or restore the
    /// state captured in `target` on failure.
    async fn complete<F>(
        &self,
        target: &Mod,
        operation: &str,
        result: Result<(), InstallerError>,
        next: F,
    ) -> ModResult<()>
    where
        F: FnOnce(&ModState) -> ModResult<ModState>,
    {
        let mut catalog = self.catalog.write().await;
        catalog.release(&target.name);

        let outcome = result.map_err(ModError::from).and_then(|()| next(&target.state));
        match outcome {
            Ok(state) => {
                catalog.set_state(&target.name, state)?;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to {} {}: {}", operation, target.name, e);
                catalog.set_state(&target.name, target.state.clone())?;
                Err(e)
            }
        }
    }

    async fn install_one(&self, name: &str) -> ModResult<()> {
        let target = self
            .begin(name, |s| s.begin_install(name).map(Some))
            .await?;
        let result = self
            .installer
            .install(&target, self.progress.clone(), true)
            .await;
        self.complete(&target, "install", result, |s| {
            s.for_install(name, &target.version)
        })
        .await
    }

    async fn update_one(&self, name: &str) -> ModResult<()> {
        let target = self
            .begin(name, |s| s.for_update_start(name).map(|_| None))
            .await?;
        let enabled = target.state.is_enabled();
        let result = self
            .installer
            .install(&target, self.progress.clone(), enabled)
            .await;
        self.complete(&target, "update", result, |s| {
            s.for_update_complete(name, &target.version)
        })
        .await
    }

    async fn uninstall_one(&self, name: &str) -> ModResult<()> {
        let target = self
            .begin(name, |s| s.for_uninstall(name).map(|_| None))
            .await?;
        let result = self.installer.uninstall(&target).await;
        self.complete(&target, "uninstall", result, |s| s.for_uninstall(name))
            .await
    }

    /// Flip enabled. With `unpin`, a pinned mod also loses its pin.
    async fn toggle_one(&self, name: &str, unpin: bool) -> ModResult<()> {
        let target = self
            .begin(name, |s| s.for_toggle_enabled(name).map(|_| None))
            .await?;
        let result = self.installer.toggle(&target).await;
        self.complete(&target, "toggle", result, |s| {
            let toggled = s.for_toggle_enabled(name)?;
            if unpin && toggled.is_pinned() {
                toggled.for_pin(name, false)
            } else {
                Ok(toggled)
            }
        })
        .await?;

        if unpin && target.state.is_pinned() {
            self.record_state(name).await;
        }
        Ok(())
    }

    async fn pin_one(&self, name: &str, pin: bool) -> ModResult<()> {
        {
            let catalog = self.catalog.read().await;
            let state = &catalog.require(name)?.state;
            if state.for_pin(name, pin)? == *state {
                return Ok(());
            }
        }

        let target = self
            .begin(name, |s| s.for_pin(name, pin).map(|_| None))
            .await?;
        let result = self.installer.pin(&target, pin).await;
        self.complete(&target, "pin", result, |s| s.for_pin(name, pin))
            .await
    }

    /// Persist the live state of `name` outside of an installer call.
    async fn record_state(&self, name: &str) {
        let current = self.catalog.read().await.get(name).cloned();
        if let Some(m) = current {
            if let Err(e) = self.source.record_installed_state(&m) {
                tracing::error!("Failed to record state of {}: {}", name, e);
            }
        }
    }

    /// Install missing and update stale, unpinned dependencies of `name`, leaves first.
    async fn ensure_dependencies(&self, name: &str) -> ModResult<()> {
        let order = {
            let catalog = self.catalog.read().await;
            catalog.index().install_order(catalog.mods(), name)?
        };

        for dep in order {
            let state = self.catalog.read().await.resolve(&dep)?.state.clone();
            match state {
                ModState::NotInstalled { installing: false }
                | ModState::NotInModLinks {
                    installed: false, ..
                } => {
                    tracing::info!("Installing {} as a dependency of {}", dep, name);
                    self.install_one(&dep).await?;
                }
                ModState::Installed {
                    updated: false,
                    pinned: false,
                    ..
                } => {
                    tracing::info!("Updating {} as a dependency of {}", dep, name);
                    self.update_one(&dep).await?;
                }
                ModState::NotInstalled { installing: true } => return Err(ModError::Busy(dep)),
                ModState::Installed { .. } | ModState::NotInModLinks { installed: true, .. } => {}
            }
        }

        Ok(())
    }

    /// Repair derived data after an operation.
    async fn finish(&self) {
        let mut catalog = self.catalog.write().await;
        if let Err(e) = catalog.fixup(None) {
            tracing::error!("Failed to repair the catalog: {}", e);
        }
    }

    async fn settle<T>(&self, result: ModResult<T>) -> ModResult<T> {
        self.finish().await;
        result
    }

    /// Names of enabled mods that depend on or integrate with `name`
    async fn enabled_dependent_names(&self, name: &str) -> Vec<String> {
        self.catalog
            .read()
            .await
            .reverse()
            .enabled_dependents(name)
            .iter()
            .map(|m| m.name.clone())
            .collect()
    }

    async fn confirm_dependents(&self, target: &Mod) -> bool {
        if !self.settings.warn_before_removing_dependents {
            return true;
        }
        let dependents = self.enabled_dependent_names(&target.name).await;
        dependents.is_empty()
            || self
                .prompts
                .confirm_remove_with_dependents(target, &dependents)
                .await
    }

    // ========== Operations ==========

    /// Install `name` and whatever it depends on.
    pub async fn install(&self, name: &str) -> ModResult<()> {
        tracing::info!("Install {}", name);
        {
            let catalog = self.catalog.read().await;
            catalog.require(name)?.state.begin_install(name)?;
        }

        let result = match self.ensure_dependencies(name).await {
            Ok(()) => self.install_one(name).await,
            Err(e) => Err(e),
        };
        self.settle(result).await
    }

    /// Uninstall when installed, install otherwise.
    pub async fn toggle_install(&self, name: &str) -> ModResult<Outcome> {
        let exists = self.catalog.read().await.require(name)?.state.exists();
        if exists {
            self.uninstall(name).await
        } else {
            self.install(name).await.map(|()| Outcome::Applied)
        }
    }

    pub async fn uninstall(&self, name: &str) -> ModResult<Outcome> {
        tracing::info!("Uninstall {}", name);
        let target = {
            let catalog = self.catalog.read().await;
            let m = catalog.require(name)?;
            m.state.for_uninstall(name)?;
            m.clone()
        };

        if !self.confirm_dependents(&target).await {
            tracing::info!("Uninstall of {} declined", name);
            return Ok(Outcome::Declined);
        }

        let result = match self.uninstall_one(name).await {
            Ok(()) => self.remove_unused_dependencies(&target).await,
            Err(e) => Err(e),
        };
        self.settle(result).await.map(|()| Outcome::Applied)
    }

    /// Offer to uninstall dependencies of `removed` that nothing enabled uses anymore.
    async fn remove_unused_dependencies(&self, removed: &Mod) -> ModResult<()> {
        let policy = self.settings.auto_remove_unused_deps;
        if policy == AutoRemoveUnusedDeps::Never {
            return Ok(());
        }

        let (candidates, has_external_mods) = {
            let catalog = self.catalog.read().await;
            let reverse = catalog.reverse();
            let mut candidates: Vec<String> = Vec::new();
            for dep in &removed.dependencies {
                let m = catalog.resolve(dep)?;
                let unused = matches!(m.state, ModState::Installed { pinned: false, .. })
                    && reverse.enabled_dependents(dep).is_empty();
                if unused && !candidates.contains(&m.name) {
                    candidates.push(m.name.clone());
                }
            }
            (candidates, catalog.mods().iter().any(Mod::is_external))
        };

        if candidates.is_empty() {
            return Ok(());
        }

        let chosen = match policy {
            AutoRemoveUnusedDeps::Always => candidates.clone(),
            AutoRemoveUnusedDeps::Ask => {
                self.prompts
                    .select_unused_dependencies(&candidates, has_external_mods)
                    .await
            }
            AutoRemoveUnusedDeps::Never => Vec::new(),
        };

        for name in chosen {
            if !candidates.contains(&name) {
                tracing::warn!("Ignoring {}, it was not offered for removal", name);
                continue;
            }
            let still_installed = matches!(
                self.catalog.read().await.state(&name),
                Some(ModState::Installed { .. })
            );
            if !still_installed {
                continue;
            }

            tracing::info!("Removing unused dependency {}", name);
            if let Err(e) = self.uninstall_one(&name).await {
                if e.is_integrity() {
                    return Err(e);
                }
                tracing::error!("Failed to remove unused dependency {}: {}", name, e);
            }
        }

        Ok(())
    }

    /// Enable when disabled, disable when enabled.
    pub async fn toggle_enabled(&self, name: &str) -> ModResult<Outcome> {
        let state = self.catalog.read().await.require(name)?.state.clone();
        match state.enabled() {
            Some(true) => self.disable(name).await,
            Some(false) => self.enable(name).await,
            None => Err(ModError::invalid(name, "toggle", &state)),
        }
    }

    /// Enable a disabled mod, offering to install missing dependencies first.
    ///
    /// Declining the offer still enables the mod.
    pub async fn enable(&self, name: &str) -> ModResult<Outcome> {
        tracing::info!("Enable {}", name);
        let (target, missing) = {
            let catalog = self.catalog.read().await;
            let m = catalog.require(name)?;
            if m.state.enabled() != Some(false) {
                return Err(ModError::invalid(name, "enable", &m.state));
            }

            let mut missing = Vec::new();
            for dep in &m.dependencies {
                let d = catalog.resolve(dep)?;
                if matches!(d.state, ModState::NotInstalled { .. }) {
                    missing.push(d.name.clone());
                }
            }
            (m.clone(), missing)
        };

        if !missing.is_empty() {
            if self
                .prompts
                .confirm_install_missing_dependencies(&target, &missing)
                .await
            {
                for dep in &missing {
                    if let Err(e) = self.install_missing(dep).await {
                        tracing::error!("Not enabling {}: dependency {} failed", name, dep);
                        return self.settle(Err(e)).await;
                    }
                }
            } else {
                tracing::warn!("Enabling {} without {}", name, missing.join(", "));
            }
        }

        let result = self.toggle_one(name, false).await;
        self.settle(result).await.map(|()| Outcome::Applied)
    }

    /// Install `name` with its own dependencies unless something else already did.
    /// A dependency still being installed by another task is `Busy`.
    async fn install_missing(&self, name: &str) -> ModResult<()> {
        let state = self.catalog.read().await.state(name).cloned();
        match state {
            Some(ModState::NotInstalled { installing: false }) => {}
            Some(ModState::NotInstalled { installing: true }) => {
                return Err(ModError::Busy(name.to_string()));
            }
            Some(_) | None => return Ok(()),
        }
        self.ensure_dependencies(name).await?;
        self.install_one(name).await
    }

    /// Disable an enabled mod. A pinned mod loses its pin.
    pub async fn disable(&self, name: &str) -> ModResult<Outcome> {
        tracing::info!("Disable {}", name);
        let target = {
            let catalog = self.catalog.read().await;
            let m = catalog.require(name)?;
            if m.state.enabled() != Some(true) {
                return Err(ModError::invalid(name, "disable", &m.state));
            }
            m.clone()
        };

        if !self.confirm_dependents(&target).await {
            tracing::info!("Disable of {} declined", name);
            return Ok(Outcome::Declined);
        }

        let result = self.toggle_one(name, true).await;
        self.settle(result).await.map(|()| Outcome::Applied)
    }

    /// Update an out-of-date mod, keeping its enabled and pinned flags.
    pub async fn update(&self, name: &str) -> ModResult<()> {
        tracing::info!("Update {}", name);
        {
            let catalog = self.catalog.read().await;
            catalog.require(name)?.state.for_update_start(name)?;
        }
        let result = self.update_with_dependencies(name).await;
        self.settle(result).await
    }

    async fn update_with_dependencies(&self, name: &str) -> ModResult<()> {
        self.ensure_dependencies(name).await?;
        self.update_one(name).await
    }

    pub async fn pin(&self, name: &str) -> ModResult<()> {
        let result = self.pin_one(name, true).await;
        self.settle(result).await
    }

    pub async fn unpin(&self, name: &str) -> ModResult<()> {
        let result = self.pin_one(name, false).await;
        self.settle(result).await
    }

    /// Update every out-of-date, unpinned mod.
    pub async fn update_all(&self) -> ModResult<BulkReport> {
        let snapshot = self
            .catalog
            .read()
            .await
            .snapshot_names(|m| m.state.is_out_of_date() && !m.state.is_pinned());
        tracing::info!("Updating {} mods", snapshot.len());

        let mut report = BulkReport::default();
        for name in snapshot {
            // an earlier item may have updated this one as a dependency
            let live = self.catalog.read().await.state(&name).cloned();
            if !matches!(
                live,
                Some(ModState::Installed {
                    updated: false,
                    pinned: false,
                    ..
                })
            ) {
                report.skipped.push(name);
                continue;
            }

            let result = self.update_with_dependencies(&name).await;
            if let Err(e) = report.record(name, result) {
                return self.settle(Err(e)).await;
            }
        }

        self.settle(Ok(report)).await
    }

    /// Mark every catalog install out of date, pinned or not, then update all.
    pub async fn force_update_all(&self) -> ModResult<BulkReport> {
        let targets = self
            .catalog
            .read()
            .await
            .snapshot_names(|m| m.state.force_outdated(&m.name).is_ok());
        tracing::info!("Forcing {} mods out of date", targets.len());

        let forced = self.force_outdated(targets).await;
        self.finish().await;
        let forced = forced?;

        let mut report = self.update_all().await?;
        report.skipped.extend(forced.skipped);
        report.failed.extend(forced.failed);
        Ok(report)
    }

    /// Reset the recorded version of each of `targets` still eligible.
    async fn force_outdated(&self, targets: Vec<String>) -> ModResult<BulkReport> {
        let mut report = BulkReport::default();
        for name in targets {
            let forced = {
                let mut catalog = self.catalog.write().await;
                if catalog.is_in_flight(&name) {
                    report.failed.push((name.clone(), ModError::Busy(name)));
                    continue;
                }
                // uninstalled or delisted since the snapshot
                let next = match catalog.get(&name).map(|m| m.state.force_outdated(&name)) {
                    Some(Ok(next)) => next,
                    Some(Err(_)) | None => {
                        report.skipped.push(name);
                        continue;
                    }
                };
                catalog.set_state(&name, next)?;
                catalog.get(&name).cloned()
            };

            if let Some(m) = forced {
                if let Err(e) = self.source.record_installed_state(&m) {
                    tracing::error!("Failed to record forced version of {}: {}", m.name, e);
                    report.failed.push((m.name, e.into()));
                }
            }
        }
        Ok(report)
    }

    /// Uninstall every unpinned mod nothing pinned depends on.
    ///
    /// Returns `None` when the user declines.
    pub async fn uninstall_all(&self) -> ModResult<Option<BulkReport>> {
        if !self.prompts.confirm_uninstall_all().await {
            tracing::info!("Uninstall all declined");
            return Ok(None);
        }

        let snapshot = self
            .catalog
            .read()
            .await
            .snapshot_names(|m| m.state.exists() && !m.state.is_pinned());
        tracing::info!("Uninstalling {} mods", snapshot.len());

        let mut report = BulkReport::default();
        for name in snapshot {
            let eligible = {
                let catalog = self.catalog.read().await;
                catalog.state(&name).is_some_and(|s| s.exists())
                    && !catalog.reverse().has_pinned_dependents(&name)
            };
            if !eligible {
                report.skipped.push(name);
                continue;
            }

            let result = self.uninstall_one(&name).await;
            if let Err(e) = report.record(name, result) {
                return self.settle(Err(e)).await;
            }
        }

        self.settle(Ok(report)).await.map(Some)
    }

    /// Disable every enabled, unpinned mod nothing pinned depends on.
    pub async fn disable_all(&self) -> ModResult<BulkReport> {
        let snapshot = self
            .catalog
            .read()
            .await
            .snapshot_names(|m| m.state.is_enabled() && !m.state.is_pinned());
        tracing::info!("Disabling {} mods", snapshot.len());

        let mut report = BulkReport::default();
        for name in snapshot {
            let eligible = {
                let catalog = self.catalog.read().await;
                catalog.state(&name).is_some_and(ModState::is_enabled)
                    && !catalog.reverse().has_pinned_dependents(&name)
            };
            if !eligible {
                report.skipped.push(name);
                continue;
            }

            let result = self.toggle_one(&name, true).await;
            if let Err(e) = report.record(name, result) {
                return self.settle(Err(e)).await;
            }
        }

        self.settle(Ok(report)).await
    }

    /// Enable every disabled mod whose dependencies are all installed.
    pub async fn enable_all(&self) -> ModResult<BulkReport> {
        let snapshot = self
            .catalog
            .read()
            .await
            .snapshot_names(|m| m.state.enabled() == Some(false));
        tracing::info!("Enabling {} mods", snapshot.len());

        let mut report = BulkReport::default();
        for name in snapshot {
            let eligible = self.dependencies_installed(&name).await;
            let eligible = match eligible {
                Ok(eligible) => eligible,
                Err(e) => return self.settle(Err(e)).await,
            };
            if !eligible {
                report.skipped.push(name);
                continue;
            }

            let result = self.toggle_one(&name, false).await;
            if let Err(e) = report.record(name, result) {
                return self.settle(Err(e)).await;
            }
        }

        self.settle(Ok(report)).await
    }

    /// Disabled, with every dependency present on disk
    async fn dependencies_installed(&self, name: &str) -> ModResult<bool> {
        let catalog = self.catalog.read().await;
        let m = match catalog.get(name) {
            Some(m) if m.state.enabled() == Some(false) => m,
            Some(_) | None => return Ok(false),
        };
        for dep in &m.dependencies {
            if !catalog.resolve(dep)?.state.exists() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Install a local `.dll` or `.zip` as an out-of-catalog mod named after the file.
    pub async fn manual_install(&self, path: &Path) -> ModResult<()> {
        let (name, filename) = manual_names(path)?;
        tracing::info!("Manually installing {} from {}", name, path.display());

        let bytes = tokio::fs::read(path).await.map_err(InstallerError::from)?;

        // reserve the name before touching the disk
        let target = {
            let mut catalog = self.catalog.write().await;
            match catalog.get(&name).map(Mod::is_external) {
                Some(false) => return Err(ModError::DuplicateName(name)),
                // reinstalling over an earlier manual install
                Some(true) => {}
                None => catalog.fixup(Some(Mod::manual(name.as_str()).with_state(
                    ModState::NotInModLinks {
                        installed: false,
                        enabled: false,
                        modlinks_mod: false,
                        pinned: false,
                    },
                )))?,
            }
            catalog.claim(&name)?;
            catalog.require(&name)?.clone()
        };

        let result = self
            .installer
            .place_mod(&target, true, &filename, bytes)
            .await;
        let result = self
            .complete(&target, "place", result, |s| {
                Ok(ModState::NotInModLinks {
                    installed: true,
                    enabled: true,
                    modlinks_mod: false,
                    pinned: s.is_pinned(),
                })
            })
            .await;
        self.settle(result).await
    }

    // ========== Modding API ==========

    pub fn api_install(&self) -> ModState {
        self.source.api_install()
    }

    /// Installed API older than the published one
    pub fn api_out_of_date(&self) -> bool {
        match self.source.api_install() {
            ModState::Installed { version, .. } => version.major < u64::from(self.latest_api),
            ModState::NotInstalled { .. } | ModState::NotInModLinks { .. } => false,
        }
    }

    /// Install the API when absent, otherwise switch between modded and vanilla.
    ///
    /// When the API is recorded as enabled but missing from disk, it is
    /// reinstalled first so the toggle starts from a known state.
    pub async fn toggle_api(&self) -> ModResult<()> {
        match self.source.api_install() {
            ModState::Installed { enabled, .. } => {
                if enabled && !self.installer.check_api().await? {
                    tracing::warn!("Modding API is recorded as enabled but missing, reinstalling");
                    self.installer.install_api().await?;
                }
                self.installer.toggle_api().await?;
            }
            ModState::NotInstalled { .. } | ModState::NotInModLinks { .. } => {
                self.installer.install_api().await?;
            }
        }
        Ok(())
    }

    pub async fn update_api(&self) -> ModResult<()> {
        self.installer.install_api().await?;
        Ok(())
    }
}

/// Mod name and file name for a manual install
fn manual_names(path: &Path) -> ModResult<(String, String)> {
    let unsupported = || {
        ModError::from(InstallerError::Other(anyhow!(
            "{} is not a .dll or .zip file",
            path.display()
        )))
    };

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .ok_or_else(unsupported)?;
    if extension != "dll" && extension != "zip" {
        return Err(unsupported());
    }

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(unsupported)?;
    let filename = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(unsupported)?;

    Ok((name.to_string(), filename.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::prompt::MockConfirmations;
    use crate::installer::{MockInstaller, MockModSource};
    use crate::mods::version;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use semver::Version;

    fn installed(enabled: bool, updated: bool, pinned: bool) -> ModState {
        ModState::Installed {
            enabled,
            version: Version::new(1, 0, 0),
            updated,
            pinned,
        }
    }

    fn versioned(name: &str, major: u64) -> Mod {
        let mut m = Mod::new(name);
        m.version = Version::new(major, 0, 0);
        m
    }

    fn quiet_source() -> MockModSource {
        let mut source = MockModSource::new();
        source.expect_record_installed_state().returning(|_| Ok(()));
        source
            .expect_api_install()
            .returning(|| ModState::NotInstalled { installing: false });
        source
    }

    struct Harness {
        catalog: Arc<RwLock<Catalog>>,
        list: ModList,
    }

    impl Harness {
        fn new(
            mods: Vec<Mod>,
            installer: MockInstaller,
            source: MockModSource,
            prompts: MockConfirmations,
            settings: Settings,
        ) -> Self {
            let catalog = Arc::new(RwLock::new(Catalog::new(mods)));
            Self::with_catalog(catalog, installer, source, prompts, settings)
        }

        fn with_catalog(
            catalog: Arc<RwLock<Catalog>>,
            installer: MockInstaller,
            source: MockModSource,
            prompts: MockConfirmations,
            settings: Settings,
        ) -> Self {
            let list = ModList::new(
                catalog.clone(),
                Arc::new(installer),
                Arc::new(source),
                Arc::new(prompts),
                settings,
                77,
            );
            Self { catalog, list }
        }

        async fn state(&self, name: &str) -> Option<ModState> {
            self.catalog.read().await.state(name).cloned()
        }

        /// Every enabled mod has all of its dependencies installed
        async fn assert_enabled_dependencies_installed(&self) {
            let catalog = self.catalog.read().await;
            for m in catalog.mods() {
                if m.state.is_enabled() {
                    for dep in &m.dependencies {
                        assert!(
                            catalog.resolve(dep).unwrap().state.exists(),
                            "{} is enabled but {} is not installed",
                            m.name,
                            dep
                        );
                    }
                }
            }
        }

        async fn assert_nothing_installing(&self) {
            let catalog = self.catalog.read().await;
            assert!(catalog.mods().iter().all(|m| !m.state.is_installing()));
        }
    }

    #[tokio::test]
    async fn test_install_pulls_dependencies_leaves_first() {
        let mut installer = MockInstaller::new();
        let mut seq = Sequence::new();
        for name in ["Core", "Lib", "App"] {
            installer
                .expect_install()
                .withf(move |m, _, enable| m.name == name && *enable)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _, _| Ok(()));
        }

        let h = Harness::new(
            vec![
                versioned("Core", 1),
                versioned("Lib", 2).with_dependencies(["Core"]),
                versioned("App", 3).with_dependencies(["Lib", "Core"]),
            ],
            installer,
            quiet_source(),
            MockConfirmations::new(),
            Settings::default(),
        );

        h.list.install("App").await.unwrap();

        assert_eq!(
            h.state("App").await,
            Some(ModState::Installed {
                enabled: true,
                version: Version::new(3, 0, 0),
                updated: true,
                pinned: false,
            })
        );
        assert!(h.state("Core").await.unwrap().is_enabled());
        h.assert_enabled_dependencies_installed().await;
    }

    #[tokio::test]
    async fn test_install_shows_provisional_state_without_holding_lock() {
        let catalog = Arc::new(RwLock::new(Catalog::new(vec![Mod::new("A")])));
        let observed = catalog.clone();

        let mut installer = MockInstaller::new();
        installer
            .expect_install()
            .times(1)
            .returning(move |_, _, _| {
                let guard = observed.try_read().expect("lock held during installer call");
                assert!(guard.state("A").unwrap().is_installing());
                assert!(guard.is_in_flight("A"));
                Ok(())
            });

        let h = Harness::with_catalog(
            catalog,
            installer,
            quiet_source(),
            MockConfirmations::new(),
            Settings::default(),
        );
        h.list.install("A").await.unwrap();

        assert!(h.state("A").await.unwrap().is_enabled());
        assert!(!h.catalog.read().await.is_in_flight("A"));
    }

    #[tokio::test]
    async fn test_failed_install_restores_state() {
        let mut installer = MockInstaller::new();
        installer.expect_install().times(1).returning(|m, _, _| {
            Err(InstallerError::HashMismatch {
                name: m.name.clone(),
                expected: "aa".to_string(),
                actual: "bb".to_string(),
            })
        });

        let h = Harness::new(
            vec![Mod::new("A")],
            installer,
            quiet_source(),
            MockConfirmations::new(),
            Settings::default(),
        );

        let err = h.list.install("A").await.unwrap_err();
        assert!(matches!(
            err,
            ModError::Installer(InstallerError::HashMismatch { .. })
        ));
        assert_eq!(h.state("A").await, Some(ModState::NotInstalled { installing: false }));
        h.assert_nothing_installing().await;
        assert!(h.catalog.write().await.claim("A").is_ok());
    }

    #[tokio::test]
    async fn test_failed_dependency_stops_install() {
        let mut installer = MockInstaller::new();
        installer
            .expect_install()
            .withf(|m, _, _| m.name == "Dep")
            .times(1)
            .returning(|_, _, _| Err(InstallerError::Network("offline".to_string())));

        let h = Harness::new(
            vec![Mod::new("Dep"), Mod::new("Top").with_dependencies(["Dep"])],
            installer,
            quiet_source(),
            MockConfirmations::new(),
            Settings::default(),
        );

        assert!(h.list.install("Top").await.is_err());
        assert_eq!(h.state("Top").await, Some(ModState::default()));
        assert_eq!(h.state("Dep").await, Some(ModState::default()));
    }

    #[tokio::test]
    async fn test_install_rejects_installed_mod() {
        let h = Harness::new(
            vec![Mod::new("A").with_state(installed(true, true, false))],
            MockInstaller::new(),
            quiet_source(),
            MockConfirmations::new(),
            Settings::default(),
        );
        assert!(matches!(
            h.list.install("A").await,
            Err(ModError::InvalidTransition { .. })
        ));
        assert!(matches!(
            h.list.install("Nope").await,
            Err(ModError::UnknownMod(_))
        ));
    }

    #[tokio::test]
    async fn test_install_with_unknown_dependency_is_integrity_error() {
        let h = Harness::new(
            vec![Mod::new("A").with_dependencies(["Ghost"])],
            MockInstaller::new(),
            quiet_source(),
            MockConfirmations::new(),
            Settings::default(),
        );
        let err = h.list.install("A").await.unwrap_err();
        assert!(err.is_integrity());
        assert_eq!(h.state("A").await, Some(ModState::default()));
    }

    #[tokio::test]
    async fn test_disable_pinned_mod_with_dependent() {
        let mut prompts = MockConfirmations::new();
        prompts
            .expect_confirm_remove_with_dependents()
            .withf(|target, dependents| target.name == "A" && dependents == ["B".to_string()])
            .times(1)
            .returning(|_, _| true);

        let mut installer = MockInstaller::new();
        installer
            .expect_toggle()
            .withf(|m| m.name == "A")
            .times(2)
            .returning(|_| Ok(()));

        let mut source = MockModSource::new();
        source
            .expect_record_installed_state()
            .withf(|m| m.name == "A" && !m.state.is_pinned() && !m.state.is_enabled())
            .times(1)
            .returning(|_| Ok(()));

        let h = Harness::new(
            vec![
                Mod::new("A").with_state(installed(true, true, true)),
                Mod::new("B")
                    .with_dependencies(["A"])
                    .with_state(installed(true, true, false)),
            ],
            installer,
            source,
            prompts,
            Settings::default(),
        );

        assert_eq!(h.list.disable("A").await.unwrap(), Outcome::Applied);
        let state = h.state("A").await.unwrap();
        assert_eq!(state.enabled(), Some(false));
        assert!(!state.is_pinned());

        // re-enabling does not bring the pin back
        assert_eq!(h.list.enable("A").await.unwrap(), Outcome::Applied);
        let state = h.state("A").await.unwrap();
        assert!(state.is_enabled());
        assert!(!state.is_pinned());
    }

    #[tokio::test]
    async fn test_declined_disable_changes_nothing() {
        let mut prompts = MockConfirmations::new();
        prompts
            .expect_confirm_remove_with_dependents()
            .times(1)
            .returning(|_, _| false);

        let h = Harness::new(
            vec![
                Mod::new("A").with_state(installed(true, true, true)),
                Mod::new("B")
                    .with_dependencies(["A"])
                    .with_state(installed(true, true, false)),
            ],
            MockInstaller::new(),
            quiet_source(),
            prompts,
            Settings::default(),
        );

        assert_eq!(h.list.disable("A").await.unwrap(), Outcome::Declined);
        assert_eq!(h.state("A").await, Some(installed(true, true, true)));
    }

    #[tokio::test]
    async fn test_dependents_warning_can_be_turned_off() {
        let mut installer = MockInstaller::new();
        installer.expect_uninstall().times(1).returning(|_| Ok(()));

        let settings = Settings {
            warn_before_removing_dependents: false,
            auto_remove_unused_deps: AutoRemoveUnusedDeps::Never,
            ..Settings::default()
        };
        let h = Harness::new(
            vec![
                Mod::new("A").with_state(installed(true, true, false)),
                Mod::new("B")
                    .with_dependencies(["A"])
                    .with_state(installed(true, true, false)),
            ],
            installer,
            quiet_source(),
            MockConfirmations::new(),
            settings,
        );

        assert_eq!(h.list.uninstall("A").await.unwrap(), Outcome::Applied);
        assert_eq!(h.state("A").await, Some(ModState::default()));
    }

    #[tokio::test]
    async fn test_failed_toggle_restores_pin() {
        let mut prompts = MockConfirmations::new();
        prompts
            .expect_confirm_remove_with_dependents()
            .returning(|_, _| true);
        let mut installer = MockInstaller::new();
        installer
            .expect_toggle()
            .times(1)
            .returning(|_| Err(InstallerError::Io(std::io::Error::other("busy file"))));

        let h = Harness::new(
            vec![Mod::new("A").with_state(installed(true, true, true))],
            installer,
            MockModSource::new(),
            prompts,
            Settings::default(),
        );

        assert!(h.list.disable("A").await.is_err());
        assert_eq!(h.state("A").await, Some(installed(true, true, true)));
    }

    #[tokio::test]
    async fn test_enable_installs_missing_dependencies() {
        let mut prompts = MockConfirmations::new();
        prompts
            .expect_confirm_install_missing_dependencies()
            .withf(|target, missing| target.name == "Top" && missing == ["Dep".to_string()])
            .times(1)
            .returning(|_, _| true);

        let mut installer = MockInstaller::new();
        let mut seq = Sequence::new();
        installer
            .expect_install()
            .withf(|m, _, _| m.name == "Dep")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        installer
            .expect_toggle()
            .withf(|m| m.name == "Top")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let h = Harness::new(
            vec![
                Mod::new("Dep"),
                Mod::new("Top")
                    .with_dependencies(["Dep"])
                    .with_state(installed(false, true, false)),
            ],
            installer,
            quiet_source(),
            prompts,
            Settings::default(),
        );

        h.list.enable("Top").await.unwrap();
        assert!(h.state("Top").await.unwrap().is_enabled());
        h.assert_enabled_dependencies_installed().await;
    }

    #[tokio::test]
    async fn test_enable_without_dependencies_when_declined() {
        let mut prompts = MockConfirmations::new();
        prompts
            .expect_confirm_install_missing_dependencies()
            .times(1)
            .returning(|_, _| false);
        let mut installer = MockInstaller::new();
        installer.expect_toggle().times(1).returning(|_| Ok(()));

        let h = Harness::new(
            vec![
                Mod::new("Dep"),
                Mod::new("Top")
                    .with_dependencies(["Dep"])
                    .with_state(installed(false, true, false)),
            ],
            installer,
            quiet_source(),
            prompts,
            Settings::default(),
        );

        h.list.enable("Top").await.unwrap();
        assert!(h.state("Top").await.unwrap().is_enabled());
        assert_eq!(h.state("Dep").await, Some(ModState::default()));
    }

    #[tokio::test]
    async fn test_enable_requires_disabled_state() {
        let h = Harness::new(
            vec![Mod::new("A").with_state(installed(true, true, false))],
            MockInstaller::new(),
            quiet_source(),
            MockConfirmations::new(),
            Settings::default(),
        );
        assert!(matches!(
            h.list.enable("A").await,
            Err(ModError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_pin_is_idempotent() {
        let mut installer = MockInstaller::new();
        installer
            .expect_pin()
            .with(mockall::predicate::always(), eq(true))
            .times(1)
            .returning(|_, _| Ok(()));
        installer
            .expect_pin()
            .with(mockall::predicate::always(), eq(false))
            .times(1)
            .returning(|_, _| Ok(()));

        let h = Harness::new(
            vec![Mod::new("A").with_state(installed(true, true, false))],
            installer,
            quiet_source(),
            MockConfirmations::new(),
            Settings::default(),
        );

        h.list.pin("A").await.unwrap();
        h.list.pin("A").await.unwrap();
        assert!(h.state("A").await.unwrap().is_pinned());

        h.list.unpin("A").await.unwrap();
        h.list.unpin("A").await.unwrap();
        assert!(!h.state("A").await.unwrap().is_pinned());
    }

    #[tokio::test]
    async fn test_pin_resorts_catalog() {
        let mut installer = MockInstaller::new();
        installer.expect_pin().returning(|_, _| Ok(()));

        let h = Harness::new(
            vec![
                Mod::new("A").with_state(installed(true, true, false)),
                Mod::new("Z").with_state(installed(true, true, false)),
            ],
            installer,
            quiet_source(),
            MockConfirmations::new(),
            Settings::default(),
        );
        let mut events = h.list.subscribe().await;

        h.list.pin("Z").await.unwrap();

        let order: Vec<String> = h.catalog.read().await.sorted().map(|m| m.name.clone()).collect();
        assert_eq!(order, vec!["Z", "A"]);
        assert_eq!(events.try_recv().unwrap(), CatalogEvent::StateChanged("Z".to_string()));
        assert_eq!(events.try_recv().unwrap(), CatalogEvent::Resorted);
    }

    #[tokio::test]
    async fn test_update_keeps_flags() {
        let mut installer = MockInstaller::new();
        installer
            .expect_install()
            .withf(|m, _, enable| m.name == "A" && !*enable)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut a = versioned("A", 2);
        a.state = installed(false, false, true);
        let h = Harness::new(
            vec![a],
            installer,
            quiet_source(),
            MockConfirmations::new(),
            Settings::default(),
        );

        h.list.update("A").await.unwrap();
        assert_eq!(
            h.state("A").await,
            Some(ModState::Installed {
                enabled: false,
                version: Version::new(2, 0, 0),
                updated: true,
                pinned: true,
            })
        );
    }

    #[tokio::test]
    async fn test_update_all_touches_only_out_of_date() {
        let mut installer = MockInstaller::new();
        installer
            .expect_install()
            .withf(|m, _, _| m.name == "X")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut x = versioned("X", 2);
        x.state = installed(true, false, false);
        let mut y = versioned("Y", 1);
        y.state = installed(true, true, false);

        let h = Harness::new(
            vec![x, y],
            installer,
            quiet_source(),
            MockConfirmations::new(),
            Settings::default(),
        );

        let report = h.list.update_all().await.unwrap();
        assert_eq!(report.processed, vec!["X"]);
        assert!(!h.state("X").await.unwrap().is_out_of_date());
    }

    #[tokio::test]
    async fn test_update_all_rechecks_items_updated_as_dependencies() {
        let mut installer = MockInstaller::new();
        let mut seq = Sequence::new();
        for name in ["Y", "X"] {
            installer
                .expect_install()
                .withf(move |m, _, _| m.name == name)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_, _, _| Ok(()));
        }

        let mut x = versioned("X", 2).with_dependencies(["Y"]);
        x.state = installed(true, false, false);
        let mut y = versioned("Y", 2);
        y.state = installed(true, false, false);
        let mut pinned = versioned("P", 2);
        pinned.state = installed(true, false, true);

        let h = Harness::new(
            vec![x, y, pinned],
            installer,
            quiet_source(),
            MockConfirmations::new(),
            Settings::default(),
        );

        let report = h.list.update_all().await.unwrap();
        assert_eq!(report.processed, vec!["X"]);
        assert_eq!(report.skipped, vec!["Y"]);
        assert!(h.state("P").await.unwrap().is_out_of_date());
    }

    #[tokio::test]
    async fn test_update_all_keeps_going_after_failure() {
        let mut installer = MockInstaller::new();
        installer
            .expect_install()
            .withf(|m, _, _| m.name == "A")
            .returning(|_, _, _| Err(InstallerError::Network("timeout".to_string())));
        installer
            .expect_install()
            .withf(|m, _, _| m.name == "B")
            .returning(|_, _, _| Ok(()));

        let mut a = versioned("A", 2);
        a.state = installed(true, false, false);
        let mut b = versioned("B", 2);
        b.state = installed(true, false, false);

        let h = Harness::new(
            vec![a, b],
            installer,
            quiet_source(),
            MockConfirmations::new(),
            Settings::default(),
        );

        let report = h.list.update_all().await.unwrap();
        assert_eq!(report.processed, vec!["B"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(h.state("A").await, Some(installed(true, false, false)));
    }

    #[tokio::test]
    async fn test_force_update_all_marks_every_target_outdated() {
        let mut installer = MockInstaller::new();
        installer
            .expect_install()
            .withf(|m, _, _| m.name == "A")
            .times(1)
            .returning(|_, _, _| Err(InstallerError::Network("offline".to_string())));

        let mut source = MockModSource::new();
        source
            .expect_record_installed_state()
            .withf(|m| m.state.is_out_of_date())
            .times(3)
            .returning(|_| Ok(()));

        let mut delisted = versioned("Delisted", 1);
        delisted.state = ModState::NotInModLinks {
            installed: true,
            enabled: true,
            modlinks_mod: true,
            pinned: true,
        };

        let h = Harness::new(
            vec![
                versioned("A", 1).with_state(installed(true, true, false)),
                versioned("Pinned", 1).with_state(installed(false, true, true)),
                delisted,
                Mod::manual("Local"),
                Mod::new("Absent"),
            ],
            installer,
            source,
            MockConfirmations::new(),
            Settings::default(),
        );

        let report = h.list.force_update_all().await.unwrap();
        assert_eq!(report.failed.len(), 1);

        let catalog = h.catalog.read().await;
        for name in ["A", "Pinned", "Delisted"] {
            let m = catalog.get(name).unwrap();
            assert!(m.update_available(), "{} should be out of date", name);
        }
        assert!(catalog.get("Pinned").unwrap().state.is_pinned());
        assert_eq!(
            catalog.get("A").unwrap().state,
            ModState::Installed {
                enabled: true,
                version: version::zero(),
                updated: false,
                pinned: false,
            }
        );
        assert!(!catalog.get("Local").unwrap().update_available());
    }

    #[tokio::test]
    async fn test_uninstall_removes_unused_dependency_when_always() {
        let mut installer = MockInstaller::new();
        let mut seq = Sequence::new();
        for name in ["D", "E"] {
            installer
                .expect_uninstall()
                .withf(move |m| m.name == name)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
        }

        let settings = Settings {
            auto_remove_unused_deps: AutoRemoveUnusedDeps::Always,
            ..Settings::default()
        };
        let h = Harness::new(
            vec![
                Mod::new("D")
                    .with_dependencies(["E"])
                    .with_state(installed(true, true, false)),
                Mod::new("E").with_state(installed(true, true, false)),
            ],
            installer,
            quiet_source(),
            MockConfirmations::new(),
            settings,
        );

        h.list.uninstall("D").await.unwrap();
        assert_eq!(h.state("D").await, Some(ModState::default()));
        assert_eq!(h.state("E").await, Some(ModState::default()));
    }

    #[tokio::test]
    async fn test_unused_dependencies_ask_uses_selection() {
        let mut prompts = MockConfirmations::new();
        prompts
            .expect_select_unused_dependencies()
            .withf(|candidates, has_external| {
                candidates == ["E".to_string(), "F".to_string()] && *has_external
            })
            .times(1)
            .returning(|_, _| vec!["F".to_string(), "Unrelated".to_string()]);

        let mut installer = MockInstaller::new();
        installer
            .expect_uninstall()
            .withf(|m| m.name == "D" || m.name == "F")
            .times(2)
            .returning(|_| Ok(()));

        let h = Harness::new(
            vec![
                Mod::new("D")
                    .with_dependencies(["E", "F", "G", "Shared"])
                    .with_state(installed(true, true, false)),
                Mod::new("E").with_state(installed(true, true, false)),
                Mod::new("F").with_state(installed(true, true, false)),
                Mod::new("G").with_state(installed(true, true, true)),
                Mod::new("Shared").with_state(installed(true, true, false)),
                Mod::new("Other")
                    .with_dependencies(["Shared"])
                    .with_state(installed(true, true, false)),
                Mod::manual("Local"),
            ],
            installer,
            quiet_source(),
            prompts,
            Settings::default(),
        );

        h.list.uninstall("D").await.unwrap();
        assert!(h.state("E").await.unwrap().exists());
        assert_eq!(h.state("F").await, Some(ModState::default()));
        assert!(h.state("G").await.unwrap().exists());
        assert!(h.state("Shared").await.unwrap().exists());
    }

    #[tokio::test]
    async fn test_uninstall_all_skips_pinned_and_their_dependencies() {
        let mut prompts = MockConfirmations::new();
        prompts
            .expect_confirm_uninstall_all()
            .times(1)
            .returning(|| true);

        let mut installer = MockInstaller::new();
        installer
            .expect_uninstall()
            .withf(|m| m.name == "Free")
            .times(1)
            .returning(|_| Ok(()));

        let h = Harness::new(
            vec![
                Mod::new("Base").with_state(installed(true, true, false)),
                Mod::new("Keeper")
                    .with_dependencies(["Base"])
                    .with_state(installed(true, true, true)),
                Mod::new("Free").with_state(installed(false, true, false)),
                Mod::new("Absent"),
            ],
            installer,
            quiet_source(),
            prompts,
            Settings::default(),
        );

        let report = h.list.uninstall_all().await.unwrap().unwrap();
        assert_eq!(report.processed, vec!["Free"]);
        assert_eq!(report.skipped, vec!["Base"]);
        assert!(h.state("Keeper").await.unwrap().exists());
        assert!(h.state("Base").await.unwrap().exists());
    }

    #[tokio::test]
    async fn test_uninstall_all_declined() {
        let mut prompts = MockConfirmations::new();
        prompts
            .expect_confirm_uninstall_all()
            .times(1)
            .returning(|| false);

        let h = Harness::new(
            vec![Mod::new("A").with_state(installed(true, true, false))],
            MockInstaller::new(),
            quiet_source(),
            prompts,
            Settings::default(),
        );

        assert!(h.list.uninstall_all().await.unwrap().is_none());
        assert!(h.state("A").await.unwrap().exists());
    }

    #[tokio::test]
    async fn test_disable_all_and_enable_all() {
        let mut installer = MockInstaller::new();
        installer.expect_toggle().returning(|_| Ok(()));

        let h = Harness::new(
            vec![
                Mod::new("Base").with_state(installed(true, true, false)),
                Mod::new("Keeper")
                    .with_dependencies(["Base"])
                    .with_state(installed(true, true, true)),
                Mod::new("Free").with_state(installed(true, true, false)),
                Mod::new("Orphan")
                    .with_dependencies(["Absent"])
                    .with_state(installed(false, true, false)),
                Mod::new("Absent"),
            ],
            installer,
            quiet_source(),
            MockConfirmations::new(),
            Settings::default(),
        );

        let report = h.list.disable_all().await.unwrap();
        assert_eq!(report.processed, vec!["Free"]);
        assert_eq!(report.skipped, vec!["Base"]);
        assert!(h.state("Keeper").await.unwrap().is_enabled());

        let report = h.list.enable_all().await.unwrap();
        assert_eq!(report.processed, vec!["Free"]);
        assert_eq!(report.skipped, vec!["Orphan"]);
        h.assert_enabled_dependencies_installed().await;

        let flags = h.list.flags().await;
        assert!(flags.can_disable_all);
        assert!(flags.can_enable_all);
    }

    #[tokio::test]
    async fn test_toggles_dispatch_on_state() {
        let mut installer = MockInstaller::new();
        installer.expect_install().times(1).returning(|_, _, _| Ok(()));
        installer.expect_toggle().times(2).returning(|_| Ok(()));
        installer.expect_uninstall().times(1).returning(|_| Ok(()));

        let h = Harness::new(
            vec![Mod::new("A")],
            installer,
            quiet_source(),
            MockConfirmations::new(),
            Settings::default(),
        );

        assert_eq!(h.list.toggle_install("A").await.unwrap(), Outcome::Applied);
        assert!(h.state("A").await.unwrap().is_enabled());

        h.list.toggle_enabled("A").await.unwrap();
        assert_eq!(h.state("A").await.unwrap().enabled(), Some(false));
        h.list.toggle_enabled("A").await.unwrap();
        assert!(h.state("A").await.unwrap().is_enabled());

        assert_eq!(h.list.toggle_install("A").await.unwrap(), Outcome::Applied);
        assert_eq!(h.state("A").await, Some(ModState::default()));
        assert!(matches!(
            h.list.toggle_enabled("A").await,
            Err(ModError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_mutual_integrations_do_not_block_operations() {
        let mut installer = MockInstaller::new();
        installer
            .expect_install()
            .withf(|m, _, _| m.name == "A")
            .times(1)
            .returning(|_, _, _| Ok(()));
        installer.expect_toggle().times(1).returning(|_| Ok(()));

        let mut prompts = MockConfirmations::new();
        prompts
            .expect_confirm_remove_with_dependents()
            .withf(|_, dependents| dependents == ["B".to_string()])
            .times(1)
            .returning(|_, _| true);

        let h = Harness::new(
            vec![
                Mod::new("A").with_integrations(["B"]),
                Mod::new("B")
                    .with_integrations(["A"])
                    .with_state(installed(true, true, false)),
            ],
            installer,
            quiet_source(),
            prompts,
            Settings::default(),
        );

        h.list.install("A").await.unwrap();
        assert_eq!(h.list.disable("A").await.unwrap(), Outcome::Applied);
        assert!(h.state("B").await.unwrap().is_enabled());
    }

    #[tokio::test]
    async fn test_busy_mod_rejects_second_operation() {
        let h = Harness::new(
            vec![Mod::new("A").with_state(installed(true, true, false))],
            MockInstaller::new(),
            quiet_source(),
            MockConfirmations::new(),
            Settings::default(),
        );
        h.catalog.write().await.claim("A").unwrap();

        assert!(matches!(h.list.pin("A").await, Err(ModError::Busy(_))));
        assert_eq!(h.state("A").await, Some(installed(true, true, false)));
    }

    #[tokio::test]
    async fn test_manual_install_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Local.dll");
        std::fs::write(&path, b"dll").unwrap();

        let mut installer = MockInstaller::new();
        installer
            .expect_place_mod()
            .withf(|m, enable, filename, bytes| {
                m.name == "Local" && *enable && filename == "Local.dll" && bytes == b"dll"
            })
            .times(2)
            .returning(|_, _, _, _| Ok(()));
        installer.expect_uninstall().times(2).returning(|_| Ok(()));

        let mut prompts = MockConfirmations::new();
        prompts.expect_confirm_remove_with_dependents().never();

        let h = Harness::new(
            vec![Mod::new("Catalogued")],
            installer,
            quiet_source(),
            prompts,
            Settings::default(),
        );

        for _ in 0..2 {
            h.list.manual_install(&path).await.unwrap();
            let m = h.catalog.read().await.get("Local").cloned().unwrap();
            assert!(m.is_external());
            assert!(m.state.is_enabled());
            assert!(!m.state.is_pinned());

            h.list.uninstall("Local").await.unwrap();
            assert!(h.catalog.read().await.get("Local").is_none());
        }
    }

    #[tokio::test]
    async fn test_manual_install_rejects_catalog_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Catalogued.zip");
        std::fs::write(&path, b"zip").unwrap();
        let other = dir.path().join("notes.txt");
        std::fs::write(&other, b"txt").unwrap();

        let h = Harness::new(
            vec![Mod::new("Catalogued")],
            MockInstaller::new(),
            quiet_source(),
            MockConfirmations::new(),
            Settings::default(),
        );

        assert!(matches!(
            h.list.manual_install(&path).await,
            Err(ModError::DuplicateName(_))
        ));
        assert!(h.list.manual_install(&other).await.is_err());
    }

    #[tokio::test]
    async fn test_toggle_api_reinstalls_missing_files() {
        let mut source = MockModSource::new();
        source.expect_api_install().returning(|| ModState::Installed {
            enabled: true,
            version: Version::new(72, 0, 0),
            updated: false,
            pinned: false,
        });

        let mut installer = MockInstaller::new();
        let mut seq = Sequence::new();
        installer
            .expect_check_api()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(false));
        installer
            .expect_install_api()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        installer
            .expect_toggle_api()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let h = Harness::new(
            vec![],
            installer,
            source,
            MockConfirmations::new(),
            Settings::default(),
        );

        assert!(h.list.api_out_of_date());
        h.list.toggle_api().await.unwrap();
    }

    #[tokio::test]
    async fn test_toggle_api_installs_when_absent() {
        let mut installer = MockInstaller::new();
        installer.expect_install_api().times(1).returning(|| Ok(()));
        installer.expect_toggle_api().never();

        let h = Harness::new(
            vec![],
            installer,
            quiet_source(),
            MockConfirmations::new(),
            Settings::default(),
        );

        assert!(!h.list.api_out_of_date());
        h.list.toggle_api().await.unwrap();
    }

    #[tokio::test]
    async fn test_force_update_all_skips_items_removed_mid_batch() {
        let catalog = Arc::new(RwLock::new(Catalog::new(vec![
            versioned("A", 1).with_state(installed(true, true, false)),
            versioned("B", 1).with_state(installed(true, true, false)),
        ])));
        let observed = catalog.clone();

        let mut source = MockModSource::new();
        source
            .expect_record_installed_state()
            .times(1)
            .returning(move |m| {
                assert_eq!(m.name, "A");
                // B is uninstalled elsewhere before the batch reaches it
                observed
                    .try_write()
                    .unwrap()
                    .set_state("B", ModState::default())
                    .unwrap();
                Ok(())
            });

        let mut installer = MockInstaller::new();
        installer
            .expect_install()
            .withf(|m, _, _| m.name == "A")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let h = Harness::with_catalog(
            catalog,
            installer,
            source,
            MockConfirmations::new(),
            Settings::default(),
        );

        let report = h.list.force_update_all().await.unwrap();
        assert_eq!(report.processed, vec!["A"]);
        assert_eq!(report.skipped, vec!["B"]);
        assert!(report.failed.is_empty());
        assert_eq!(h.state("A").await, Some(installed(true, true, false)));
        assert_eq!(h.state("B").await, Some(ModState::default()));
        h.assert_nothing_installing().await;
    }

    #[tokio::test]
    async fn test_enable_refuses_dependency_still_installing() {
        let mut prompts = MockConfirmations::new();
        prompts
            .expect_confirm_install_missing_dependencies()
            .times(1)
            .returning(|_, _| true);

        let h = Harness::new(
            vec![
                Mod::new("Dep").with_state(ModState::NotInstalled { installing: true }),
                Mod::new("Top")
                    .with_dependencies(["Dep"])
                    .with_state(installed(false, true, false)),
            ],
            MockInstaller::new(),
            quiet_source(),
            prompts,
            Settings::default(),
        );

        assert!(matches!(h.list.enable("Top").await, Err(ModError::Busy(_))));
        assert_eq!(h.state("Top").await, Some(installed(false, true, false)));
        h.assert_enabled_dependencies_installed().await;
    }

    #[tokio::test]
    async fn test_uninstall_all_skips_items_removed_mid_batch() {
        let catalog = Arc::new(RwLock::new(Catalog::new(vec![
            Mod::new("A").with_state(installed(true, true, false)),
            Mod::new("B").with_state(installed(true, true, false)),
        ])));
        let observed = catalog.clone();

        let mut prompts = MockConfirmations::new();
        prompts
            .expect_confirm_uninstall_all()
            .times(1)
            .returning(|| true);

        let mut installer = MockInstaller::new();
        installer
            .expect_uninstall()
            .withf(|m| m.name == "A")
            .times(1)
            .returning(move |_| {
                observed
                    .try_write()
                    .unwrap()
                    .set_state("B", ModState::default())
                    .unwrap();
                Ok(())
            });

        let h = Harness::with_catalog(catalog, installer, quiet_source(), prompts, Settings::default());

        let report = h.list.uninstall_all().await.unwrap().unwrap();
        assert_eq!(report.processed, vec!["A"]);
        assert_eq!(report.skipped, vec!["B"]);
        assert!(report.failed.is_empty());
        assert_eq!(h.state("A").await, Some(ModState::default()));
    }

    #[tokio::test]
    async fn test_disable_all_skips_items_disabled_mid_batch() {
        let catalog = Arc::new(RwLock::new(Catalog::new(vec![
            Mod::new("A").with_state(installed(true, true, false)),
            Mod::new("B").with_state(installed(true, true, false)),
        ])));
        let observed = catalog.clone();

        let mut installer = MockInstaller::new();
        installer
            .expect_toggle()
            .withf(|m| m.name == "A")
            .times(1)
            .returning(move |_| {
                observed
                    .try_write()
                    .unwrap()
                    .set_state("B", installed(false, true, false))
                    .unwrap();
                Ok(())
            });

        let h = Harness::with_catalog(
            catalog,
            installer,
            quiet_source(),
            MockConfirmations::new(),
            Settings::default(),
        );

        let report = h.list.disable_all().await.unwrap();
        assert_eq!(report.processed, vec!["A"]);
        assert_eq!(report.skipped, vec!["B"]);
        assert_eq!(h.state("A").await, Some(installed(false, true, false)));
        assert_eq!(h.state("B").await, Some(installed(false, true, false)));
    }

    #[tokio::test]
    async fn test_manual_install_reserves_name_while_placing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Local.dll");
        std::fs::write(&path, b"dll").unwrap();

        let catalog = Arc::new(RwLock::new(Catalog::new(vec![])));
        let observed = catalog.clone();

        let mut installer = MockInstaller::new();
        let mut seq = Sequence::new();
        installer
            .expect_place_mod()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |m, _, _, _| {
                let guard = observed.try_read().expect("lock held during installer call");
                assert!(guard.get(&m.name).is_some());
                assert!(guard.is_in_flight(&m.name));
                Err(InstallerError::Io(std::io::Error::other("disk full")))
            });
        installer
            .expect_place_mod()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(()));

        let h = Harness::with_catalog(
            catalog,
            installer,
            quiet_source(),
            MockConfirmations::new(),
            Settings::default(),
        );

        // a failed placement gives the name back
        assert!(h.list.manual_install(&path).await.is_err());
        assert!(h.catalog.read().await.get("Local").is_none());

        h.list.manual_install(&path).await.unwrap();
        assert!(h.state("Local").await.unwrap().is_enabled());

        // a second install of a name already in flight is refused
        h.catalog.write().await.claim("Local").unwrap();
        assert!(matches!(
            h.list.manual_install(&path).await,
            Err(ModError::Busy(_))
        ));
    }

    #[test]
    fn test_manual_names() {
        let (name, file) = manual_names(Path::new("/tmp/Some Mod.ZIP")).unwrap();
        assert_eq!(name, "Some Mod");
        assert_eq!(file, "Some Mod.ZIP");
        assert!(manual_names(Path::new("/tmp/readme")).is_err());
    }
}
