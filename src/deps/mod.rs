//! Dependency graph index over the catalog
//!
//! The index records, for every mod name, where the entry lives in the
//! catalog's storage and which mods point at it through their dependency or
//! integration lists. It only depends on catalog membership, so it is rebuilt
//! when mods are added or removed and left alone on state edits.

pub mod reverse;

pub use reverse::ReverseDependencySearch;

use crate::error::{ModError, ModResult};
use crate::mods::Mod;
use std::collections::{BTreeSet, HashMap};

/// Name-keyed lookup and reverse-dependency relation for a catalog
#[derive(Debug, Clone, Default)]
pub struct DependencyIndex {
    positions: HashMap<String, usize>,
    required_by: HashMap<String, BTreeSet<String>>,
    integrated_by: HashMap<String, BTreeSet<String>>,
}

impl DependencyIndex {
    /// Build the index for `mods`. Positions refer to indices into this slice.
    pub fn build(mods: &[Mod]) -> Self {
        let mut index = Self::default();

        for (i, m) in mods.iter().enumerate() {
            if index.positions.insert(m.name.clone(), i).is_some() {
                tracing::warn!("Duplicate catalog entry for {}, keeping the last one", m.name);
            }

            for dep in &m.dependencies {
                index
                    .required_by
                    .entry(dep.clone())
                    .or_default()
                    .insert(m.name.clone());
            }
            for integration in &m.integrations {
                index
                    .integrated_by
                    .entry(integration.clone())
                    .or_default()
                    .insert(m.name.clone());
            }
        }

        index
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Look up a mod by name.
    ///
    /// A miss is a data-integrity problem: something referenced a name the
    /// catalog does not carry.
    pub fn resolve<'m>(&self, mods: &'m [Mod], name: &str) -> ModResult<&'m Mod> {
        self.position(name)
            .and_then(|i| mods.get(i))
            .ok_or_else(|| ModError::UnknownDependency(name.to_string()))
    }

    /// Names of mods that list `name` as a dependency.
    pub fn required_by(&self, name: &str) -> impl Iterator<Item = &str> {
        self.required_by
            .get(name)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Names of mods that list `name` as an integration.
    pub fn integrated_by(&self, name: &str) -> impl Iterator<Item = &str> {
        self.integrated_by
            .get(name)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// All catalog mods whose dependency or integration list contains `name`,
    /// ordered by name.
    pub fn dependents<'m>(&self, mods: &'m [Mod], name: &str) -> Vec<&'m Mod> {
        let names: BTreeSet<&str> = self.required_by(name).chain(self.integrated_by(name)).collect();

        names
            .into_iter()
            .filter_map(|n| self.position(n).and_then(|i| mods.get(i)))
            .collect()
    }

    /// Transitive dependencies of `name` in install order (leaves first),
    /// excluding `name` itself.
    ///
    /// Only dependency edges count here; integrations never pull in installs.
    /// Ties are broken by name so the order is deterministic.
    pub fn install_order(&self, mods: &[Mod], name: &str) -> ModResult<Vec<String>> {
        let root = self.resolve(mods, name)?;

        // Collect the dependency closure
        let mut closure: HashMap<&str, &Mod> = HashMap::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            if closure.insert(current.name.as_str(), current).is_some() {
                continue;
            }
            for dep in &current.dependencies {
                let dep_mod = self.resolve(mods, dep)?;
                if !closure.contains_key(dep_mod.name.as_str()) {
                    stack.push(dep_mod);
                }
            }
        }

        // Kahn's algorithm: a node is ready once all of its dependencies are placed
        let mut remaining: HashMap<&str, usize> = closure
            .values()
            .map(|m| {
                let unique: BTreeSet<&str> = m.dependencies.iter().map(String::as_str).collect();
                (m.name.as_str(), unique.len())
            })
            .collect();

        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, &n)| n == 0)
            .map(|(&name, _)| name)
            .collect();

        let mut sorted = Vec::with_capacity(closure.len());
        while let Some(current) = ready.pop_first() {
            sorted.push(current);
            for dependent in self.required_by(current) {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if sorted.len() != closure.len() {
            let stuck: BTreeSet<&str> = remaining
                .iter()
                .filter(|(_, &n)| n > 0)
                .map(|(&name, _)| name)
                .collect();
            return Err(ModError::CorruptCatalog(format!(
                "circular dependency among {}",
                stuck.into_iter().collect::<Vec<_>>().join(", ")
            )));
        }

        Ok(sorted
            .into_iter()
            .filter(|n| *n != name)
            .map(str::to_string)
            .collect())
    }
}
