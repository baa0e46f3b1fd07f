//! The live mod catalog
//!
//! One owned collection of mods plus everything derived from its membership:
//! the dependency index and the display order. Writers go through the
//! methods here so that every change is announced on the event channel and
//! derived views can be recomputed on demand.

use crate::deps::{DependencyIndex, ReverseDependencySearch};
use crate::error::{ModError, ModResult};
use crate::mods::{Mod, ModState};
use std::cmp::Ordering;
use std::collections::HashSet;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Notification sent whenever the catalog changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEvent {
    /// A single mod's state changed
    StateChanged(String),
    /// Mods were added or removed
    MembershipChanged,
    /// The display order was recomputed
    Resorted,
}

/// Availability of the bulk actions, derived from current states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkFlags {
    pub can_update_all: bool,
    pub can_uninstall_all: bool,
    pub can_disable_all: bool,
    pub can_enable_all: bool,
}

/// Live catalog: at most one entry per name, stable display order
pub struct Catalog {
    /// Storage order; only changes when membership changes
    mods: Vec<Mod>,
    /// Display order as indices into `mods`
    order: Vec<usize>,
    index: DependencyIndex,
    in_flight: HashSet<String>,
    events: broadcast::Sender<CatalogEvent>,
}

impl Catalog {
    /// Build a catalog from loaded items. Later duplicates of a name are dropped.
    pub fn new(items: Vec<Mod>) -> Self {
        let mut seen = HashSet::new();
        let mods: Vec<Mod> = items
            .into_iter()
            .filter(|m| {
                let fresh = seen.insert(m.name.clone());
                if !fresh {
                    tracing::warn!("Ignoring duplicate catalog entry {}", m.name);
                }
                fresh
            })
            .collect();

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut catalog = Self {
            index: DependencyIndex::build(&mods),
            order: Vec::new(),
            mods,
            in_flight: HashSet::new(),
            events,
        };
        catalog.order = catalog.sorted_order();
        catalog
    }

    /// Receive change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: CatalogEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    /// Mods in storage order, for index-based queries
    pub fn mods(&self) -> &[Mod] {
        &self.mods
    }

    /// Mods in display order
    pub fn sorted(&self) -> impl Iterator<Item = &Mod> + '_ {
        self.order.iter().map(move |&i| &self.mods[i])
    }

    pub fn index(&self) -> &DependencyIndex {
        &self.index
    }

    pub fn reverse(&self) -> ReverseDependencySearch<'_> {
        ReverseDependencySearch::new(&self.index, &self.mods)
    }

    pub fn get(&self, name: &str) -> Option<&Mod> {
        self.index.position(name).map(|i| &self.mods[i])
    }

    /// Like [`get`](Self::get), but a miss is an error.
    pub fn require(&self, name: &str) -> ModResult<&Mod> {
        self.get(name).ok_or_else(|| ModError::UnknownMod(name.to_string()))
    }

    /// Resolve a dependency name to its catalog entry.
    pub fn resolve(&self, name: &str) -> ModResult<&Mod> {
        self.index.resolve(&self.mods, name)
    }

    pub fn state(&self, name: &str) -> Option<&ModState> {
        self.get(name).map(|m| &m.state)
    }

    /// Replace a mod's state, returning the previous one.
    ///
    /// The display order is not touched; call [`resort`](Self::resort) or
    /// [`fixup`](Self::fixup) once the operation is done.
    pub fn set_state(&mut self, name: &str, state: ModState) -> ModResult<ModState> {
        let i = self
            .index
            .position(name)
            .ok_or_else(|| ModError::UnknownMod(name.to_string()))?;

        let previous = std::mem::replace(&mut self.mods[i].state, state);
        if previous != self.mods[i].state {
            self.emit(CatalogEvent::StateChanged(name.to_string()));
        }
        Ok(previous)
    }

    /// Mark a mod as having an installer call outstanding.
    pub fn claim(&mut self, name: &str) -> ModResult<()> {
        if !self.index.contains(name) {
            return Err(ModError::UnknownMod(name.to_string()));
        }
        if !self.in_flight.insert(name.to_string()) {
            return Err(ModError::Busy(name.to_string()));
        }
        Ok(())
    }

    pub fn release(&mut self, name: &str) {
        self.in_flight.remove(name);
    }

    pub fn is_in_flight(&self, name: &str) -> bool {
        self.in_flight.contains(name)
    }

    /// Repair derived data after an operation: drop stale placeholders, add a
    /// newly created entry, rebuild the index if membership changed, re-sort.
    pub fn fixup(&mut self, item_to_add: Option<Mod>) -> ModResult<()> {
        let before = self.mods.len();
        let in_flight = &self.in_flight;
        self.mods.retain(|m| {
            // a reserved name stays until its installer call returns
            let stale = m.state.is_stale_placeholder() && !in_flight.contains(&m.name);
            if stale {
                tracing::debug!("Pruning {} from the catalog", m.name);
            }
            !stale
        });
        let mut membership_changed = self.mods.len() != before;

        if let Some(item) = item_to_add {
            if self.mods.iter().any(|m| m.name == item.name) {
                if membership_changed {
                    self.rebuild();
                }
                return Err(ModError::DuplicateName(item.name));
            }
            self.mods.push(item);
            membership_changed = true;
        }

        if membership_changed {
            self.rebuild();
            self.emit(CatalogEvent::MembershipChanged);
        } else {
            self.resort();
        }

        Ok(())
    }

    fn rebuild(&mut self) {
        self.index = DependencyIndex::build(&self.mods);
        let index = &self.index;
        self.in_flight.retain(|name| index.contains(name));
        self.order = self.sorted_order();
    }

    /// Recompute the display order.
    pub fn resort(&mut self) {
        let order = self.sorted_order();
        if order != self.order {
            self.order = order;
            self.emit(CatalogEvent::Resorted);
        }
    }

    fn sorted_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.mods.len()).collect();
        order.sort_by(|&a, &b| compare_mods(&self.mods[a], &self.mods[b]));
        order
    }

    pub fn flags(&self) -> BulkFlags {
        BulkFlags {
            can_update_all: self
                .mods
                .iter()
                .any(|m| m.state.is_out_of_date() && !m.state.is_pinned()),
            can_uninstall_all: self.mods.iter().any(|m| m.state.exists()),
            can_disable_all: self.mods.iter().any(|m| m.state.enabled() == Some(true)),
            can_enable_all: self.mods.iter().any(|m| m.state.enabled() == Some(false)),
        }
    }

    /// Names that may anchor a reverse-dependency search; hand-installed mods
    /// have no catalog relations and are left out.
    pub fn anchor_names(&self) -> Vec<&str> {
        self.sorted()
            .filter(|m| !m.is_external())
            .map(|m| m.name.as_str())
            .collect()
    }

    /// Names of mods matching `predicate`, in display order.
    pub fn snapshot_names(&self, predicate: impl Fn(&Mod) -> bool) -> Vec<String> {
        self.sorted()
            .filter(|m| predicate(m))
            .map(|m| m.name.clone())
            .collect()
    }
}

/// Display order: pinned first, then out-of-date installs, then name.
pub fn compare_mods(a: &Mod, b: &Mod) -> Ordering {
    sort_key(a).cmp(&sort_key(b))
}

fn sort_key(m: &Mod) -> (u8, u8, &str) {
    (
        if m.state.is_pinned() { 0 } else { 1 },
        if m.state.is_out_of_date() { 0 } else { 1 },
        m.name.as_str(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    fn installed(updated: bool, pinned: bool) -> ModState {
        ModState::Installed {
            enabled: true,
            version: Version::new(1, 0, 0),
            updated,
            pinned,
        }
    }

    fn display(catalog: &Catalog) -> Vec<String> {
        catalog.sorted().map(|m| m.name.clone()).collect()
    }

    #[test]
    fn test_sort_order() {
        let catalog = Catalog::new(vec![
            Mod::new("b"),
            Mod::new("Zeta").with_state(installed(true, true)),
            Mod::new("Alpha"),
            Mod::new("Old").with_state(installed(false, false)),
            Mod::new("PinnedOld").with_state(installed(false, true)),
        ]);

        assert_eq!(display(&catalog), vec!["PinnedOld", "Zeta", "Old", "Alpha", "b"]);
    }

    #[test]
    fn test_resort_is_stable() {
        let mut catalog = Catalog::new(vec![
            Mod::new("C"),
            Mod::new("A").with_state(installed(false, false)),
            Mod::new("B").with_state(installed(true, true)),
        ]);
        let first = display(&catalog);
        catalog.resort();
        catalog.resort();
        assert_eq!(display(&catalog), first);
    }

    #[test]
    fn test_duplicates_dropped() {
        let catalog = Catalog::new(vec![Mod::new("A"), Mod::new("A"), Mod::new("B")]);
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_fixup_prunes_and_inserts() {
        let mut catalog = Catalog::new(vec![
            Mod::new("Gone").with_state(ModState::NotInModLinks {
                installed: false,
                enabled: false,
                modlinks_mod: false,
                pinned: false,
            }),
            Mod::new("Kept"),
        ]);
        let mut events = catalog.subscribe();

        catalog.fixup(Some(Mod::manual("Local"))).unwrap();

        assert!(catalog.get("Gone").is_none());
        assert!(catalog.get("Local").is_some());
        assert_eq!(catalog.resolve("Kept").unwrap().name, "Kept");
        assert_eq!(events.try_recv().unwrap(), CatalogEvent::MembershipChanged);
    }

    #[test]
    fn test_fixup_keeps_claimed_placeholder() {
        let placeholder = ModState::NotInModLinks {
            installed: false,
            enabled: false,
            modlinks_mod: false,
            pinned: false,
        };
        let mut catalog = Catalog::new(vec![Mod::manual("Local").with_state(placeholder)]);

        catalog.claim("Local").unwrap();
        catalog.fixup(None).unwrap();
        assert!(catalog.get("Local").is_some());

        catalog.release("Local");
        catalog.fixup(None).unwrap();
        assert!(catalog.get("Local").is_none());
    }

    #[test]
    fn test_fixup_rejects_duplicate_name() {
        let mut catalog = Catalog::new(vec![Mod::new("A")]);
        assert!(matches!(
            catalog.fixup(Some(Mod::manual("A"))),
            Err(ModError::DuplicateName(_))
        ));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let mut catalog = Catalog::new(vec![Mod::new("A")]);
        catalog.claim("A").unwrap();
        assert!(matches!(catalog.claim("A"), Err(ModError::Busy(_))));
        catalog.release("A");
        assert!(catalog.claim("A").is_ok());
        assert!(matches!(catalog.claim("B"), Err(ModError::UnknownMod(_))));
    }

    #[test]
    fn test_flags() {
        let catalog = Catalog::new(vec![Mod::new("A")]);
        assert_eq!(catalog.flags(), BulkFlags::default());

        let catalog = Catalog::new(vec![
            Mod::new("A").with_state(installed(false, false)),
            Mod::new("B").with_state(ModState::Installed {
                enabled: false,
                version: Version::new(1, 0, 0),
                updated: true,
                pinned: false,
            }),
        ]);
        let flags = catalog.flags();
        assert!(flags.can_update_all);
        assert!(flags.can_uninstall_all);
        assert!(flags.can_disable_all);
        assert!(flags.can_enable_all);
    }

    #[test]
    fn test_set_state_emits() {
        let mut catalog = Catalog::new(vec![Mod::new("A")]);
        let mut events = catalog.subscribe();
        let previous = catalog
            .set_state("A", ModState::NotInstalled { installing: true })
            .unwrap();
        assert_eq!(previous, ModState::default());
        assert_eq!(
            events.try_recv().unwrap(),
            CatalogEvent::StateChanged("A".to_string())
        );
    }
}
