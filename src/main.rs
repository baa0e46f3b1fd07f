use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use modlinks::app::{cmd_config_set, cmd_config_show, ListOptions};
use modlinks::config::Paths;
use modlinks::{App, Config};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "modlinks")]
#[command(
    author,
    version,
    about = "A dependency-aware mod manager for ModLinks catalogs"
)]
struct Cli {
    /// Answer yes to every prompt
    #[arg(short, long)]
    yes: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Managed folder override for this invocation
    #[arg(long)]
    managed_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog mods
    List {
        /// all, installed, enabled, out-of-date, whats-new
        #[arg(short, long)]
        filter: Option<String>,
        /// Case-insensitive text to look for
        #[arg(short, long)]
        search: Option<String>,
        /// Match the search against names only
        #[arg(long)]
        exact: bool,
        /// Only mods with this tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Only mods by this author (repeatable)
        #[arg(long = "author")]
        authors: Vec<String>,
        /// Only mods that depend on or integrate with this mod
        #[arg(long, conflicts_with_all = ["search", "exact"])]
        dependents_of: Option<String>,
        /// whats-new: include recently updated mods
        #[arg(long)]
        show_updated: bool,
        /// whats-new: look back a month for new mods instead of a week
        #[arg(long)]
        new_month: bool,
        /// whats-new: look back a month for updated mods instead of a week
        #[arg(long)]
        updated_month: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show mod info
    Info { name: String },
    /// List every tag in the catalog
    Tags,
    /// List every author in the catalog
    Authors,

    /// Install a mod and its dependencies
    Install { name: String },
    /// Uninstall a mod
    Uninstall { name: String },
    /// Enable a disabled mod
    Enable { name: String },
    /// Disable an enabled mod
    Disable { name: String },
    /// Flip a mod between enabled and disabled
    Toggle { name: String },
    /// Update an out-of-date mod
    Update { name: String },
    /// Exempt a mod from bulk operations
    Pin { name: String },
    /// Remove a pin
    Unpin { name: String },
    /// Install a local .dll or .zip that is not in the catalog
    ManualInstall { path: PathBuf },

    /// Update every out-of-date, unpinned mod
    UpdateAll,
    /// Reinstall every catalog mod
    ForceUpdateAll,
    /// Uninstall every unpinned mod
    UninstallAll,
    /// Disable every unpinned mod
    DisableAll,
    /// Enable every disabled mod whose dependencies are installed
    EnableAll,

    /// Manage the modding API
    Api {
        #[command(subcommand)]
        action: ApiCommands,
    },

    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ApiCommands {
    /// Show the installed API version
    Status,
    /// Install the API, or switch between modded and vanilla
    Toggle,
    /// Install the latest API
    Update,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current settings
    Show,
    /// Set a setting (empty value clears a path)
    Set { key: String, value: String },
}

fn setup_logging(verbosity: u8, also_stderr: bool, log_file: &Path) -> Result<()> {
    let filter = match verbosity {
        0 => "modlinks=info",
        1 => "modlinks=debug",
        2 => "modlinks=trace",
        _ => "trace",
    };

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file {}", log_file.display()))?;

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::sync::Arc::new(file));

    if also_stderr {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = Paths::new()?;
    paths.ensure_dirs().context("Failed to create directories")?;
    setup_logging(cli.verbose, cli.verbose > 0, &paths.log_file())?;

    let mut config = Config::load(paths).await?;

    // Settings commands work without a catalog or managed folder
    if let Commands::Config { action } = &cli.command {
        return match action {
            ConfigCommands::Show => cmd_config_show(&config).await,
            ConfigCommands::Set { key, value } => cmd_config_set(&mut config, key, value).await,
        };
    }

    if let Some(folder) = cli.managed_folder {
        config.settings.managed_folder = Some(folder);
    }

    let app = App::new(config, cli.yes).await?;

    match cli.command {
        Commands::List {
            filter,
            search,
            exact,
            tags,
            authors,
            dependents_of,
            show_updated,
            new_month,
            updated_month,
            json,
        } => {
            let options = ListOptions {
                filter,
                search,
                exact,
                tags,
                authors,
                dependents_of,
                show_updated,
                new_month,
                updated_month,
                json,
            };
            app.cmd_list(&options).await?
        }
        Commands::Info { name } => app.cmd_info(&name).await?,
        Commands::Tags => app.cmd_tags().await?,
        Commands::Authors => app.cmd_authors().await?,
        Commands::Install { name } => app.cmd_install(&name).await?,
        Commands::Uninstall { name } => app.cmd_uninstall(&name).await?,
        Commands::Enable { name } => app.cmd_enable(&name).await?,
        Commands::Disable { name } => app.cmd_disable(&name).await?,
        Commands::Toggle { name } => app.cmd_toggle(&name).await?,
        Commands::Update { name } => app.cmd_update(&name).await?,
        Commands::Pin { name } => app.cmd_pin(&name, true).await?,
        Commands::Unpin { name } => app.cmd_pin(&name, false).await?,
        Commands::ManualInstall { path } => app.cmd_manual_install(&path).await?,
        Commands::UpdateAll => app.cmd_update_all(false).await?,
        Commands::ForceUpdateAll => app.cmd_update_all(true).await?,
        Commands::UninstallAll => app.cmd_uninstall_all().await?,
        Commands::DisableAll => app.cmd_disable_all().await?,
        Commands::EnableAll => app.cmd_enable_all().await?,
        Commands::Api { action } => match action {
            ApiCommands::Status => app.cmd_api_status().await?,
            ApiCommands::Toggle => app.cmd_api_toggle().await?,
            ApiCommands::Update => app.cmd_api_update().await?,
        },
        Commands::Config { .. } => {}
    }

    Ok(())
}
