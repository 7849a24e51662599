use crate::core::config::AppConfig;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

const EXAMPLE_CONFIG: &str = include_str!("../../docs/example_config.yaml");

/// Writes the example config to the default location.
pub fn setup() -> Result<()> {
    let path = AppConfig::default_config_path()?;
    setup_at_path(&path)?;

    let mut config = AppConfig::default();
    config.apply_overrides(|key| std::env::var(key).ok());
    let missing = config.secrets.missing();
    if !missing.is_empty() {
        warn!(
            "Set {} in the environment or a .env file before running the bot",
            missing.join(", ")
        );
    }
    Ok(())
}

/// Writes the example config to `path`, refusing to overwrite.
pub fn setup_at_path<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    info!("Created default configuration at {}", path.display());
    Ok(())
}
