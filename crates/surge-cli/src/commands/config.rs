//! Config command implementation

use anyhow::{Context, Result};
use surge::SurgeConfig;

pub fn execute(config: &SurgeConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(config).context("Failed to encode configuration")?;
    println!("{}", json);
    Ok(())
}
