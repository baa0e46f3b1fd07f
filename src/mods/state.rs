//! Mod lifecycle state and its transitions
//!
//! Every transition is a pure function from the current state to the next
//! one. The orchestrator applies the result only after the installer call it
//! guards has succeeded, so a failed call restores the previous value as-is.

use crate::error::{ModError, ModResult};
use semver::Version;

/// Lifecycle state of a mod. The variants are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModState {
    /// Known to the catalog, no local files.
    NotInstalled { installing: bool },

    /// Local files present for a catalog mod.
    ///
    /// `updated == false` means the catalog carries a newer version than
    /// `version`. `pinned` exempts the mod from bulk operations.
    Installed {
        enabled: bool,
        version: Version,
        updated: bool,
        pinned: bool,
    },

    /// Present locally but absent from the catalog.
    ///
    /// `modlinks_mod` is true for mods that were delisted and false for mods
    /// that were always installed by hand. `installed == false` only appears
    /// transiently after an uninstall, before the entry is pruned.
    NotInModLinks {
        installed: bool,
        enabled: bool,
        modlinks_mod: bool,
        pinned: bool,
    },
}

impl Default for ModState {
    fn default() -> Self {
        ModState::NotInstalled { installing: false }
    }
}

impl ModState {
    /// Local files are present (`Installed`, or `NotInModLinks` still installed).
    pub fn exists(&self) -> bool {
        match self {
            ModState::Installed { .. } => true,
            ModState::NotInModLinks { installed, .. } => *installed,
            ModState::NotInstalled { .. } => false,
        }
    }

    /// Enabled flag for states with local files, `None` otherwise.
    pub fn enabled(&self) -> Option<bool> {
        match self {
            ModState::Installed { enabled, .. } => Some(*enabled),
            ModState::NotInModLinks {
                installed: true,
                enabled,
                ..
            } => Some(*enabled),
            ModState::NotInModLinks { .. } | ModState::NotInstalled { .. } => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled() == Some(true)
    }

    pub fn is_pinned(&self) -> bool {
        match self {
            ModState::Installed { pinned, .. } => *pinned,
            ModState::NotInModLinks {
                installed: true,
                pinned,
                ..
            } => *pinned,
            ModState::NotInModLinks { .. } | ModState::NotInstalled { .. } => false,
        }
    }

    /// Installed from the catalog and older than the catalog version.
    pub fn is_out_of_date(&self) -> bool {
        matches!(self, ModState::Installed { updated: false, .. })
    }

    pub fn is_installing(&self) -> bool {
        matches!(self, ModState::NotInstalled { installing: true })
    }

    /// Ephemeral placeholder left behind by uninstalling an out-of-catalog mod.
    pub fn is_stale_placeholder(&self) -> bool {
        matches!(self, ModState::NotInModLinks { installed: false, .. })
    }

    /// Provisional state visible while the installer is fetching the mod.
    pub fn begin_install(&self, name: &str) -> ModResult<ModState> {
        match self {
            ModState::NotInstalled { installing: false }
            | ModState::NotInModLinks {
                installed: false, ..
            } => Ok(ModState::NotInstalled { installing: true }),
            ModState::NotInstalled { installing: true }
            | ModState::Installed { .. }
            | ModState::NotInModLinks { installed: true, .. } => {
                Err(ModError::invalid(name, "install", self))
            }
        }
    }

    /// State after a successful install of `version`. Fresh installs are enabled.
    pub fn for_install(&self, name: &str, version: &Version) -> ModResult<ModState> {
        match self {
            ModState::NotInstalled { .. }
            | ModState::NotInModLinks {
                installed: false, ..
            } => Ok(ModState::Installed {
                enabled: true,
                version: version.clone(),
                updated: true,
                pinned: false,
            }),
            ModState::Installed { .. } | ModState::NotInModLinks { installed: true, .. } => {
                Err(ModError::invalid(name, "install", self))
            }
        }
    }

    /// State after removing the mod's files.
    ///
    /// Catalog mods fall back to `NotInstalled`; out-of-catalog mods become a
    /// placeholder that the catalog prunes.
    pub fn for_uninstall(&self, name: &str) -> ModResult<ModState> {
        match self {
            ModState::Installed { .. } => Ok(ModState::NotInstalled { installing: false }),
            ModState::NotInModLinks {
                installed: true,
                modlinks_mod,
                ..
            } => Ok(ModState::NotInModLinks {
                installed: false,
                enabled: false,
                modlinks_mod: *modlinks_mod,
                pinned: false,
            }),
            ModState::NotInstalled { .. } | ModState::NotInModLinks { installed: false, .. } => {
                Err(ModError::invalid(name, "uninstall", self))
            }
        }
    }

    pub fn for_toggle_enabled(&self, name: &str) -> ModResult<ModState> {
        match self {
            ModState::Installed {
                enabled,
                version,
                updated,
                pinned,
            } => Ok(ModState::Installed {
                enabled: !enabled,
                version: version.clone(),
                updated: *updated,
                pinned: *pinned,
            }),
            ModState::NotInModLinks {
                installed: true,
                enabled,
                modlinks_mod,
                pinned,
            } => Ok(ModState::NotInModLinks {
                installed: true,
                enabled: !enabled,
                modlinks_mod: *modlinks_mod,
                pinned: *pinned,
            }),
            ModState::NotInstalled { .. } | ModState::NotInModLinks { installed: false, .. } => {
                Err(ModError::invalid(name, "toggle", self))
            }
        }
    }

    /// Set the pinned flag. Setting it to its current value returns the same state.
    pub fn for_pin(&self, name: &str, pin: bool) -> ModResult<ModState> {
        match self {
            ModState::Installed {
                enabled,
                version,
                updated,
                ..
            } => Ok(ModState::Installed {
                enabled: *enabled,
                version: version.clone(),
                updated: *updated,
                pinned: pin,
            }),
            ModState::NotInModLinks {
                installed: true,
                enabled,
                modlinks_mod,
                ..
            } => Ok(ModState::NotInModLinks {
                installed: true,
                enabled: *enabled,
                modlinks_mod: *modlinks_mod,
                pinned: pin,
            }),
            ModState::NotInstalled { .. } | ModState::NotInModLinks { installed: false, .. } => {
                Err(ModError::invalid(name, "pin", self))
            }
        }
    }

    /// Validate that an update may start. Returns whether the mod is enabled,
    /// which the installer must preserve.
    pub fn for_update_start(&self, name: &str) -> ModResult<bool> {
        match self {
            ModState::Installed {
                updated: false,
                enabled,
                ..
            } => Ok(*enabled),
            ModState::Installed { updated: true, .. }
            | ModState::NotInstalled { .. }
            | ModState::NotInModLinks { .. } => Err(ModError::invalid(name, "update", self)),
        }
    }

    /// State after the installer placed `version`, keeping enabled and pinned.
    pub fn for_update_complete(&self, name: &str, version: &Version) -> ModResult<ModState> {
        match self {
            ModState::Installed {
                updated: false,
                enabled,
                pinned,
                ..
            } => Ok(ModState::Installed {
                enabled: *enabled,
                version: version.clone(),
                updated: true,
                pinned: *pinned,
            }),
            ModState::Installed { updated: true, .. }
            | ModState::NotInstalled { .. }
            | ModState::NotInModLinks { .. } => Err(ModError::invalid(name, "update", self)),
        }
    }

    /// Reset the recorded version so the mod reads as out of date.
    ///
    /// Applies to catalog installs and to delisted catalog mods; pinning is
    /// kept but does not exempt the mod.
    pub fn force_outdated(&self, name: &str) -> ModResult<ModState> {
        match self {
            ModState::Installed {
                enabled, pinned, ..
            }
            | ModState::NotInModLinks {
                installed: true,
                modlinks_mod: true,
                enabled,
                pinned,
            } => Ok(ModState::Installed {
                enabled: *enabled,
                version: super::version::zero(),
                updated: false,
                pinned: *pinned,
            }),
            ModState::NotInstalled { .. } | ModState::NotInModLinks { .. } => {
                Err(ModError::invalid(name, "force update", self))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installed(enabled: bool, updated: bool, pinned: bool) -> ModState {
        ModState::Installed {
            enabled,
            version: Version::new(1, 0, 0),
            updated,
            pinned,
        }
    }

    fn external(installed: bool, enabled: bool) -> ModState {
        ModState::NotInModLinks {
            installed,
            enabled,
            modlinks_mod: false,
            pinned: false,
        }
    }

    #[test]
    fn test_exists_grouping() {
        assert!(installed(false, true, false).exists());
        assert!(external(true, false).exists());
        assert!(!external(false, false).exists());
        assert!(!ModState::NotInstalled { installing: true }.exists());
        assert_eq!(external(false, true).enabled(), None);
    }

    #[test]
    fn test_install_goes_through_provisional_state() {
        let start = ModState::default();
        let provisional = start.begin_install("A").unwrap();
        assert!(provisional.is_installing());
        assert!(provisional.begin_install("A").is_err());

        let done = provisional
            .for_install("A", &Version::new(2, 1, 0))
            .unwrap();
        assert_eq!(
            done,
            ModState::Installed {
                enabled: true,
                version: Version::new(2, 1, 0),
                updated: true,
                pinned: false,
            }
        );
    }

    #[test]
    fn test_install_rejects_installed() {
        let err = installed(true, true, false)
            .for_install("A", &Version::new(1, 0, 0))
            .unwrap_err();
        assert!(matches!(err, ModError::InvalidTransition { .. }));
    }

    #[test]
    fn test_uninstall_outcomes() {
        assert_eq!(
            installed(true, true, true).for_uninstall("A").unwrap(),
            ModState::NotInstalled { installing: false }
        );
        let placeholder = external(true, true).for_uninstall("B").unwrap();
        assert!(placeholder.is_stale_placeholder());
        assert!(ModState::default().for_uninstall("C").is_err());
    }

    #[test]
    fn test_pin_is_idempotent() {
        let pinned = installed(true, true, false).for_pin("A", true).unwrap();
        assert_eq!(pinned.for_pin("A", true).unwrap(), pinned);

        let unpinned = pinned.for_pin("A", false).unwrap();
        assert_eq!(unpinned.for_pin("A", false).unwrap(), unpinned);
        assert!(ModState::default().for_pin("A", true).is_err());
    }

    #[test]
    fn test_toggle_keeps_pin() {
        let toggled = installed(true, true, true).for_toggle_enabled("A").unwrap();
        assert_eq!(toggled.enabled(), Some(false));
        assert!(toggled.is_pinned());
    }

    #[test]
    fn test_update_requires_out_of_date() {
        assert!(installed(true, true, false).for_update_start("A").is_err());
        assert!(ModState::default().for_update_start("A").is_err());
        assert!(!installed(false, false, false).for_update_start("A").unwrap());

        let updated = installed(false, false, true)
            .for_update_complete("A", &Version::new(1, 1, 0))
            .unwrap();
        assert_eq!(
            updated,
            ModState::Installed {
                enabled: false,
                version: Version::new(1, 1, 0),
                updated: true,
                pinned: true,
            }
        );
    }

    #[test]
    fn test_force_outdated() {
        let forced = installed(true, true, true).force_outdated("A").unwrap();
        assert!(forced.is_out_of_date());
        assert!(forced.is_pinned());

        let delisted = ModState::NotInModLinks {
            installed: true,
            enabled: false,
            modlinks_mod: true,
            pinned: false,
        };
        assert!(delisted.force_outdated("B").unwrap().is_out_of_date());
        assert!(external(true, true).force_outdated("C").is_err());
    }
}
