pub mod config;
pub mod simulate;

use anyhow::{Context, Result};
use std::path::Path;
use surge::SurgeConfig;

/// Load the configuration file if one was given, otherwise the defaults.
pub fn load_config(path: Option<&Path>) -> Result<SurgeConfig> {
    match path {
        Some(path) => SurgeConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(SurgeConfig::default()),
    }
}
