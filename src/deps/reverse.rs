//! Reverse dependency queries used for impact analysis before mutations

use super::DependencyIndex;
use crate::error::{ModError, ModResult};
use crate::mods::Mod;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Answers "who would break if this mod went away" for one catalog snapshot
pub struct ReverseDependencySearch<'a> {
    index: &'a DependencyIndex,
    mods: &'a [Mod],
}

impl<'a> ReverseDependencySearch<'a> {
    pub fn new(index: &'a DependencyIndex, mods: &'a [Mod]) -> Self {
        Self { index, mods }
    }

    /// Enabled mods that depend on or integrate with `name`, ordered by name.
    ///
    /// Integrations count as soft dependencies here: disabling a mod that an
    /// enabled mod integrates with is worth a warning too.
    pub fn enabled_dependents(&self, name: &str) -> Vec<&'a Mod> {
        self.index
            .dependents(self.mods, name)
            .into_iter()
            .filter(|m| m.state.is_enabled())
            .collect()
    }

    /// Whether any enabled dependent of `name` is pinned.
    pub fn has_pinned_dependents(&self, name: &str) -> bool {
        self.enabled_dependents(name)
            .iter()
            .any(|m| m.state.is_pinned())
    }

    /// Every mod that reaches `name` through dependency or integration edges,
    /// regardless of state, ordered by name. The anchor itself is excluded.
    ///
    /// Fails with `CorruptCatalog` when a dependency cycle runs through the
    /// searched part of the graph.
    pub fn all_dependent_and_integrated(&self, name: &str) -> ModResult<Vec<&'a Mod>> {
        self.index.resolve(self.mods, name)?;

        let mut marks = HashMap::new();
        self.check_dependency_cycles(name, &mut marks)?;

        let mut found: BTreeMap<&str, &'a Mod> = BTreeMap::new();
        let mut seen: HashSet<&str> = HashSet::from([name]);
        let mut stack: Vec<&str> = vec![name];

        while let Some(current) = stack.pop() {
            for dependent in self.index.dependents(self.mods, current) {
                if seen.insert(dependent.name.as_str()) {
                    found.insert(dependent.name.as_str(), dependent);
                    stack.push(dependent.name.as_str());
                }
            }
        }

        Ok(found.into_values().collect())
    }

    /// Depth-first walk over "is required by" edges. Integrations may point
    /// at each other freely; hard dependencies may not loop.
    fn check_dependency_cycles<'s>(
        &'s self,
        name: &'s str,
        marks: &mut HashMap<&'s str, Mark>,
    ) -> ModResult<()> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(ModError::CorruptCatalog(format!(
                    "'{}' depends on itself through its dependency chain",
                    name
                )))
            }
            None => {}
        }

        marks.insert(name, Mark::Visiting);
        for dependent in self.index.required_by(name) {
            self.check_dependency_cycles(dependent, marks)?;
        }
        marks.insert(name, Mark::Done);

        Ok(())
    }
}
