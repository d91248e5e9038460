//! Configuration management
//!
//! Handles ndproxy.toml and the command-line flags layered on top of it.

mod types;
mod validation;

pub use types::*;
pub use validation::{validate, ValidationResult};

use crate::{Error, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    let config: Config = toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
    Ok(config)
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub lan: Option<String>,
    pub wan: Option<String>,
    pub max_entries: Option<u32>,
    pub aging_time: Option<u64>,
    pub idle_timeout: Option<u64>,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(lan) = &self.lan {
            config.interfaces.lan = lan.clone();
        }
        if let Some(wan) = &self.wan {
            config.interfaces.wan = wan.clone();
        }
        if let Some(max_entries) = self.max_entries {
            config.proxy.max_entries = max_entries;
        }
        if let Some(aging_time) = self.aging_time {
            config.proxy.aging_time = aging_time;
        }
        if let Some(idle_timeout) = self.idle_timeout {
            config.proxy.idle_timeout = idle_timeout;
        }
    }
}
