//! View projection - the filtered, ordered subset of the catalog a user sees
//!
//! Views are recomputed on demand from the live catalog rather than kept in
//! sync incrementally. The catalog's display order is preserved.

use crate::catalog::Catalog;
use crate::error::{ModError, ModResult};
use crate::mods::Mod;
use anyhow::bail;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};

/// Coarse state filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ModFilter {
    #[default]
    All,
    Installed,
    Enabled,
    OutOfDate,
    RecentlyChanged,
}

impl ModFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModFilter::All => "all",
            ModFilter::Installed => "installed",
            ModFilter::Enabled => "enabled",
            ModFilter::OutOfDate => "out-of-date",
            ModFilter::RecentlyChanged => "whats-new",
        }
    }

    pub fn from_cli(value: &str) -> anyhow::Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "all" => Ok(ModFilter::All),
            "installed" => Ok(ModFilter::Installed),
            "enabled" => Ok(ModFilter::Enabled),
            "out-of-date" | "outofdate" | "outdated" => Ok(ModFilter::OutOfDate),
            "whats-new" | "new" | "recent" | "recently-changed" => Ok(ModFilter::RecentlyChanged),
            other => bail!(
                "Invalid filter '{}'. Valid values: all, installed, enabled, out-of-date, whats-new",
                other
            ),
        }
    }

    fn matches(&self, m: &Mod, now: DateTime<Utc>) -> bool {
        match self {
            ModFilter::All => true,
            ModFilter::Installed => m.installed(),
            ModFilter::Enabled => m.state.is_enabled(),
            ModFilter::OutOfDate => m.state.is_out_of_date(),
            ModFilter::RecentlyChanged => {
                m.recent_changes.is_created_recently(now) || m.recent_changes.is_updated_recently(now)
            }
        }
    }
}

/// Length of a what's-new window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChangeWindow {
    #[default]
    Week,
    Month,
}

impl ChangeWindow {
    /// Days to look back. One extra day so that "this week" includes the
    /// change made exactly seven days ago.
    pub fn days(&self) -> i64 {
        match self {
            ChangeWindow::Week => 8,
            ChangeWindow::Month => 31,
        }
    }
}

/// What's-new options: new and updated mods are toggled and windowed separately
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhatsNew {
    pub show_new: bool,
    pub new_window: ChangeWindow,
    pub show_updated: bool,
    pub updated_window: ChangeWindow,
}

impl Default for WhatsNew {
    fn default() -> Self {
        Self {
            show_new: true,
            new_window: ChangeWindow::Week,
            show_updated: false,
            updated_window: ChangeWindow::Week,
        }
    }
}

impl WhatsNew {
    fn matches(&self, m: &Mod, now: DateTime<Utc>) -> bool {
        use crate::mods::RecentChangeInfo;

        let info = &m.recent_changes;
        (self.show_updated
            && RecentChangeInfo::within(info.last_updated, now, self.updated_window.days()))
            || (self.show_new
                && RecentChangeInfo::within(info.last_created, now, self.new_window.days()))
    }
}

/// Free-text search or reverse-dependency mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchMode {
    /// Case-insensitive substring search; `exact` restricts it to names.
    Text { query: String, exact: bool },
    /// Only mods that depend on or integrate with `anchor`, transitively.
    Dependents { anchor: String },
}

impl Default for SearchMode {
    fn default() -> Self {
        SearchMode::Text {
            query: String::new(),
            exact: false,
        }
    }
}

/// Everything that shapes the visible list
#[derive(Debug, Clone, Default)]
pub struct ViewQuery {
    pub filter: ModFilter,
    pub search: SearchMode,
    /// Selected tags; a mod matches when it has any of them
    pub tags: BTreeSet<String>,
    /// Selected authors; a mod matches when it has any of them
    pub authors: BTreeSet<String>,
    pub whats_new: WhatsNew,
}

impl ViewQuery {
    pub fn with_filter(filter: ModFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Reset the search text and the dependency anchor.
    pub fn clear_search(&mut self) {
        self.search = SearchMode::default();
    }
}

/// Project the catalog through `query`.
pub fn project<'c>(catalog: &'c Catalog, query: &ViewQuery, now: DateTime<Utc>) -> ModResult<Vec<&'c Mod>> {
    let mut selected: Vec<&Mod> = catalog
        .sorted()
        .filter(|m| query.filter.matches(m, now))
        .filter(|m| any_selected(&m.tags, &query.tags))
        .filter(|m| any_selected(&m.authors, &query.authors))
        .collect();

    if query.filter == ModFilter::RecentlyChanged {
        selected.retain(|m| query.whats_new.matches(m, now));
    }

    match &query.search {
        SearchMode::Text { query: text, exact } => {
            if !text.is_empty() {
                let needle = text.to_lowercase();
                selected.retain(|m| {
                    m.name.to_lowercase().contains(&needle)
                        || (!exact && m.description.to_lowercase().contains(&needle))
                });
            }
        }
        SearchMode::Dependents { anchor } => {
            if !anchor.is_empty() {
                let anchor_mod = catalog
                    .get(anchor)
                    .filter(|m| !m.is_external())
                    .ok_or_else(|| ModError::UnknownMod(anchor.clone()))?;

                let related: HashSet<&str> = catalog
                    .reverse()
                    .all_dependent_and_integrated(&anchor_mod.name)?
                    .into_iter()
                    .map(|m| m.name.as_str())
                    .collect();
                selected.retain(|m| related.contains(m.name.as_str()));
            }
        }
    }

    Ok(selected)
}

fn any_selected(values: &[String], selected: &BTreeSet<String>) -> bool {
    selected.is_empty() || values.iter().any(|v| selected.contains(v))
}

/// Every tag used in the catalog, ordinal order
pub fn all_tags(catalog: &Catalog) -> Vec<String> {
    catalog
        .mods()
        .iter()
        .flat_map(|m| m.tags.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Every author named in the catalog, ordinal order
pub fn all_authors(catalog: &Catalog) -> Vec<String> {
    catalog
        .mods()
        .iter()
        .flat_map(|m| m.authors.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
