//! CLI command action handlers

use super::{App, BulkReport, Outcome};
use crate::config::{AutoRemoveUnusedDeps, Config};
use crate::mods::{Mod, ModState};
use crate::view::{self, ChangeWindow, ModFilter, SearchMode, ViewQuery, WhatsNew};
use anyhow::{bail, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Options of the `list` command
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub filter: Option<String>,
    pub search: Option<String>,
    pub exact: bool,
    pub tags: Vec<String>,
    pub authors: Vec<String>,
    pub dependents_of: Option<String>,
    pub show_updated: bool,
    pub new_month: bool,
    pub updated_month: bool,
    pub json: bool,
}

impl ListOptions {
    fn to_query(&self) -> Result<ViewQuery> {
        let filter = match &self.filter {
            Some(value) => ModFilter::from_cli(value)?,
            None => ModFilter::All,
        };
        let search = match &self.dependents_of {
            Some(anchor) => SearchMode::Dependents {
                anchor: anchor.clone(),
            },
            None => SearchMode::Text {
                query: self.search.clone().unwrap_or_default(),
                exact: self.exact,
            },
        };
        let window = |month: bool| {
            if month {
                ChangeWindow::Month
            } else {
                ChangeWindow::Week
            }
        };

        Ok(ViewQuery {
            filter,
            search,
            tags: self.tags.iter().cloned().collect(),
            authors: self.authors.iter().cloned().collect(),
            whats_new: WhatsNew {
                new_window: window(self.new_month),
                show_updated: self.show_updated,
                updated_window: window(self.updated_month),
                ..WhatsNew::default()
            },
        })
    }
}

/// One row of `list --json`
#[derive(Debug, Serialize)]
struct ModRow<'a> {
    name: &'a str,
    version: String,
    state: String,
    installed: bool,
    enabled: bool,
    pinned: bool,
    update_available: bool,
    manual: bool,
    dependencies: &'a [String],
    tags: &'a [String],
    authors: &'a [String],
    repository: String,
    description: &'a str,
}

impl<'a> From<&'a Mod> for ModRow<'a> {
    fn from(m: &'a Mod) -> Self {
        Self {
            name: &m.name,
            version: m.version_text(),
            state: state_label(&m.state),
            installed: m.installed(),
            enabled: m.enabled_is_checked(),
            pinned: m.state.is_pinned(),
            update_available: m.update_available(),
            manual: m.is_external(),
            dependencies: &m.dependencies,
            tags: &m.tags,
            authors: &m.authors,
            repository: m.shortened_repository(),
            description: &m.description,
        }
    }
}

fn state_label(state: &ModState) -> String {
    match state {
        ModState::NotInstalled { installing: true } => "installing".to_string(),
        ModState::NotInstalled { installing: false } => "not installed".to_string(),
        ModState::Installed {
            enabled,
            updated,
            pinned,
            ..
        } => {
            let mut label = if *enabled { "enabled" } else { "disabled" }.to_string();
            if !updated {
                label.push_str(", update available");
            }
            if *pinned {
                label.push_str(", pinned");
            }
            label
        }
        ModState::NotInModLinks {
            installed: false, ..
        } => "removed".to_string(),
        ModState::NotInModLinks {
            enabled,
            modlinks_mod,
            pinned,
            ..
        } => {
            let mut label = if *enabled { "enabled" } else { "disabled" }.to_string();
            label.push_str(if *modlinks_mod { ", delisted" } else { ", manual" });
            if *pinned {
                label.push_str(", pinned");
            }
            label
        }
    }
}

fn print_report(verb: &str, report: &BulkReport) {
    if report.processed.is_empty() && report.failed.is_empty() {
        println!("Nothing to {}.", verb);
    }
    for name in &report.processed {
        println!("  ok      {}", name);
    }
    for name in &report.skipped {
        println!("  skipped {}", name);
    }
    for (name, e) in &report.failed {
        println!("  failed  {}: {}", name, e);
    }
    println!(
        "{} processed, {} skipped, {} failed",
        report.processed.len(),
        report.skipped.len(),
        report.failed.len()
    );
}

fn print_outcome(outcome: Outcome, done: &str, name: &str) {
    match outcome {
        Outcome::Applied => println!("{}: {}", done, name),
        Outcome::Declined => println!("Cancelled."),
    }
}

impl App {
    // ========== Browsing ==========

    pub async fn cmd_list(&self, options: &ListOptions) -> Result<()> {
        let query = options.to_query()?;
        let mods = self.mods.view(&query, Utc::now()).await?;

        if options.json {
            let rows: Vec<ModRow<'_>> = mods.iter().map(ModRow::from).collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }

        if mods.is_empty() {
            println!("No mods match ({}).", query.filter.as_str());
            return Ok(());
        }

        println!("{:<32} {:<14} {}", "Name", "Version", "State");
        println!("{:-<72}", "");
        for m in &mods {
            println!("{:<32} {:<14} {}", m.name, m.version_text(), state_label(&m.state));
        }
        println!("{} of {} mods", mods.len(), self.mods.catalog().await.len());
        Ok(())
    }

    pub async fn cmd_info(&self, name: &str) -> Result<()> {
        let catalog = self.mods.catalog().await;
        let m = catalog.require(name)?;

        println!("Mod Information");
        println!("{:-<40}", "");
        println!("Name:         {}", m.name);
        println!("Version:      {}", m.version_text());
        println!("State:        {}", state_label(&m.state));
        if !m.dependencies.is_empty() {
            println!("Depends on:   {}", m.dependencies.join(", "));
        }
        if !m.integrations.is_empty() {
            println!("Integrates:   {}", m.integrations.join(", "));
        }
        if !m.authors.is_empty() {
            println!("Authors:      {}", m.authors.join(", "));
        }
        if !m.tags.is_empty() {
            println!("Tags:         {}", m.tags.join(", "));
        }
        if !m.repository.is_empty() {
            println!("Repository:   {}", m.shortened_repository());
        }
        if !m.description.is_empty() {
            println!("\n{}", m.description);
        }
        Ok(())
    }

    pub async fn cmd_tags(&self) -> Result<()> {
        for tag in view::all_tags(&*self.mods.catalog().await) {
            println!("{}", tag);
        }
        Ok(())
    }

    pub async fn cmd_authors(&self) -> Result<()> {
        for author in view::all_authors(&*self.mods.catalog().await) {
            println!("{}", author);
        }
        Ok(())
    }

    // ========== Single mod ==========

    pub async fn cmd_install(&self, name: &str) -> Result<()> {
        self.mods.install(name).await?;
        println!("Installed: {}", name);
        Ok(())
    }

    pub async fn cmd_uninstall(&self, name: &str) -> Result<()> {
        let outcome = self.mods.uninstall(name).await?;
        print_outcome(outcome, "Uninstalled", name);
        Ok(())
    }

    pub async fn cmd_enable(&self, name: &str) -> Result<()> {
        let outcome = self.mods.enable(name).await?;
        print_outcome(outcome, "Enabled", name);
        Ok(())
    }

    pub async fn cmd_disable(&self, name: &str) -> Result<()> {
        let outcome = self.mods.disable(name).await?;
        print_outcome(outcome, "Disabled", name);
        Ok(())
    }

    pub async fn cmd_toggle(&self, name: &str) -> Result<()> {
        let outcome = self.mods.toggle_enabled(name).await?;
        print_outcome(outcome, "Toggled", name);
        Ok(())
    }

    pub async fn cmd_update(&self, name: &str) -> Result<()> {
        self.mods.update(name).await?;
        println!("Updated: {}", name);
        Ok(())
    }

    pub async fn cmd_pin(&self, name: &str, pin: bool) -> Result<()> {
        if pin {
            self.mods.pin(name).await?;
            println!("Pinned: {}", name);
        } else {
            self.mods.unpin(name).await?;
            println!("Unpinned: {}", name);
        }
        Ok(())
    }

    pub async fn cmd_manual_install(&self, path: &Path) -> Result<()> {
        if !path.is_file() {
            bail!("File not found: {}", path.display());
        }
        println!("Installing mod from: {}", path.display());
        self.mods.manual_install(path).await?;
        println!("Installed manually: {}", path.display());
        Ok(())
    }

    // ========== Bulk ==========

    pub async fn cmd_update_all(&self, force: bool) -> Result<()> {
        let report = if force {
            self.mods.force_update_all().await?
        } else {
            if !self.mods.flags().await.can_update_all {
                println!("All mods are up to date.");
                return Ok(());
            }
            self.mods.update_all().await?
        };
        print_report("update", &report);
        Ok(())
    }

    pub async fn cmd_uninstall_all(&self) -> Result<()> {
        match self.mods.uninstall_all().await? {
            Some(report) => print_report("uninstall", &report),
            None => println!("Cancelled."),
        }
        Ok(())
    }

    pub async fn cmd_disable_all(&self) -> Result<()> {
        let report = self.mods.disable_all().await?;
        print_report("disable", &report);
        Ok(())
    }

    pub async fn cmd_enable_all(&self) -> Result<()> {
        let report = self.mods.enable_all().await?;
        print_report("enable", &report);
        Ok(())
    }

    // ========== Modding API ==========

    pub async fn cmd_api_status(&self) -> Result<()> {
        match self.mods.api_install() {
            ModState::Installed {
                enabled, version, ..
            } => {
                println!(
                    "Modding API {} installed ({})",
                    version.major,
                    if enabled { "modded" } else { "vanilla" }
                );
                if self.mods.api_out_of_date() {
                    println!("An update is available. Run 'modlinks api update'.");
                }
            }
            ModState::NotInstalled { .. } | ModState::NotInModLinks { .. } => {
                println!("Modding API not installed. Run 'modlinks api toggle' to install it.");
            }
        }
        Ok(())
    }

    pub async fn cmd_api_toggle(&self) -> Result<()> {
        self.mods.toggle_api().await?;
        self.cmd_api_status().await
    }

    pub async fn cmd_api_update(&self) -> Result<()> {
        if !self.mods.api_out_of_date() {
            println!("Modding API is up to date.");
            return Ok(());
        }
        self.mods.update_api().await?;
        self.cmd_api_status().await
    }
}

// ========== Settings ==========

pub async fn cmd_config_show(config: &Config) -> Result<()> {
    let settings = &config.settings;
    println!("Settings ({})", config.paths.config_file().display());
    println!("{:-<40}", "");
    println!(
        "managed_folder:                  {}",
        settings
            .managed_folder
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!(
        "warn_before_removing_dependents: {}",
        settings.warn_before_removing_dependents
    );
    println!(
        "auto_remove_unused_deps:         {}",
        settings.auto_remove_unused_deps.as_str()
    );
    println!("base_link:                       {}", settings.base_link);
    if let Some(path) = &settings.modlinks_path {
        println!("modlinks_path:                   {}", path.display());
    }
    if let Some(path) = &settings.apilinks_path {
        println!("apilinks_path:                   {}", path.display());
    }
    Ok(())
}

/// Set one setting by key. An empty value clears optional paths.
pub async fn cmd_config_set(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let value = value.trim();
    let optional_path = || (!value.is_empty()).then(|| PathBuf::from(value));

    let settings = &mut config.settings;
    match key {
        "managed_folder" | "managed-folder" => settings.managed_folder = optional_path(),
        "warn_before_removing_dependents" | "warn-dependents" => {
            settings.warn_before_removing_dependents = match value.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" => true,
                "false" | "no" | "off" => false,
                other => bail!("Invalid value '{}'. Valid values: true, false", other),
            }
        }
        "auto_remove_unused_deps" | "unused-deps" => {
            settings.auto_remove_unused_deps = AutoRemoveUnusedDeps::from_cli(value)?
        }
        "modlinks_path" | "modlinks-path" => settings.modlinks_path = optional_path(),
        "apilinks_path" | "apilinks-path" => settings.apilinks_path = optional_path(),
        "base_link" | "base-link" => {
            if url::Url::parse(value).is_err() {
                bail!("Invalid URL '{}'", value);
            }
            settings.base_link = value.to_string();
        }
        other => bail!(
            "Unknown setting '{}'. Valid keys: managed_folder, warn_before_removing_dependents, \
             auto_remove_unused_deps, modlinks_path, apilinks_path, base_link",
            other
        ),
    }

    config.save().await?;
    println!("Set {}", key);
    Ok(())
}
