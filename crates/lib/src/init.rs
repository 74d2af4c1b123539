//! Initialize the configuration directory: create it and write a template `config.json`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::FileConfig;

/// Create the config directory and a template config file if they do not exist.
/// An existing config file is never overwritten. Returns the config directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if config_path.exists() {
        log::debug!("config already exists at {}, skipping", config_path.display());
    } else {
        let template = serde_json::to_string_pretty(&FileConfig::template())
            .context("serializing template config")?;
        std::fs::write(config_path, template)
            .with_context(|| format!("writing template config to {}", config_path.display()))?;
        log::info!("created template config at {}", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}
