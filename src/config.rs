//! Runtime settings for the sidecar.
//!
//! Sources, highest priority first:
//! 1. `TERMSD_*` environment variables (`TERMSD_WORKSPACE`, `TERMSD_LOG_LEVEL`)
//! 2. `termsd.toml` in the working directory
//! 3. Built-in defaults

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "termsd.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Workspace opened before the first request, same as `workspace.select`.
    #[serde(default)]
    pub workspace: Option<PathBuf>,

    /// Fallback tracing filter when `TERMSD_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment()
            .extract()
            .map_err(|e| ConfigError::Figment(Box::new(e)))
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE_NAME))
            .merge(Env::prefixed("TERMSD_").ignore(&["log"]))
    }
}
