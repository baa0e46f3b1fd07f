//! modlinks - a dependency-aware mod manager for ModLinks catalogs
//!
//! This crate provides:
//! - A live mod catalog with a dependency index and reverse-dependency search
//! - A mutation orchestrator that keeps enabled mods' dependencies installed
//! - Filtered, searchable views of the catalog
//! - A filesystem installer for a game's `Managed/Mods` folder

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod app;
pub mod catalog;
pub mod config;
pub mod db;
pub mod deps;
pub mod error;
pub mod installer;
pub mod mods;
pub mod view;

pub use app::App;
pub use config::Config;
