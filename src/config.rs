//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - reflex.toml (default configuration)
//! - reflex.local.toml (git-ignored local overrides)
//! - Environment variables (REFLEX_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # reflex.toml
//! bytecode_file = "rules.rbc"
//!
//! [store]
//! address = "127.0.0.1:6379"
//! channels = ["facts"]
//!
//! [engine]
//! update_interval = 60
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! REFLEX_BYTECODE_FILE=/etc/reflex/rules.rbc
//! REFLEX_STORE__ADDRESS=10.0.0.5:6379
//! REFLEX_LOGGING__LEVEL=debug
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Compiled artifact to load at startup.
    #[serde(default)]
    pub bytecode_file: Option<PathBuf>,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// External store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store address (host:port).
    #[serde(default = "default_store_address")]
    pub address: String,

    /// Store password; empty means unauthenticated.
    #[serde(default)]
    pub password: String,

    /// Store database number.
    #[serde(default)]
    pub database: i64,

    /// Subscription channels for fact updates.
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
}

/// Engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Rules below this priority are dropped at compile time.
    #[serde(default)]
    pub priority_threshold: i64,

    /// Housekeeping cadence for the dispatcher run loop, in seconds.
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_store_address() -> String {
    String::from("127.0.0.1:6379")
}
fn default_channels() -> Vec<String> {
    vec![String::from("facts")]
}
fn default_update_interval() -> u64 {
    60
}
fn default_log_level() -> String {
    String::from("info")
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. reflex.toml (base configuration)
    /// 2. reflex.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (REFLEX_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("reflex.toml"))
            .merge(Toml::file("reflex.local.toml"))
            .merge(Env::prefixed("REFLEX_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("REFLEX_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bytecode_file: None,
            store: StoreConfig::default(),
            engine: EngineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            address: default_store_address(),
            password: String::new(),
            database: 0,
            channels: default_channels(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            priority_threshold: 0,
            update_interval: default_update_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}
