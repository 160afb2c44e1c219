use crate::error::{Result, TreeLockError};
use std::path::{Path, PathBuf};

use crate::config::paths::*;
use crate::config::schema::*;

/// Load the user config, falling back to defaults when none was written.
pub fn load_config() -> Result<Config> {
    let config_path = get_config_path()?;
    if !config_path.exists() {
        tracing::debug!("no config at {}, using defaults", config_path.display());
        return Ok(Config::default());
    }
    load_config_from(&config_path)
}

/// Load the user config and lay an extra file on top of it.
pub fn load_config_with_overlay(overlay_path: Option<&Path>) -> Result<Config> {
    let config = load_config()?;
    let Some(overlay_path) = overlay_path else {
        return Ok(config);
    };
    let overlay = read_config_file(overlay_path)?;
    let merged = merge_configs(config, overlay);
    validate_config(&merged)?;
    Ok(merged)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    let config = read_config_file(path)?;
    validate_config(&config)?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let toml_content = std::fs::read_to_string(path).map_err(|e| {
        TreeLockError::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    toml::from_str(&toml_content)
        .map_err(|e| TreeLockError::Config(format!("Failed to parse config: {}", e)))
}

pub fn merge_configs(base: Config, overlay: Config) -> Config {
    Config {
        log: LogConfig {
            filter: overlay.log.filter.or(base.log.filter),
        },
        stress: StressConfig {
            threads: overlay.stress.threads.or(base.stress.threads),
            iterations: overlay.stress.iterations.or(base.stress.iterations),
            paths: overlay.stress.paths.or(base.stress.paths),
            seed: overlay.stress.seed.or(base.stress.seed),
            workload: if overlay.stress.workload == Workload::default() {
                base.stress.workload
            } else {
                overlay.stress.workload
            },
        },
    }
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            TreeLockError::Config(format!("Failed to create config directory: {}", e))
        })?;
    }
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| TreeLockError::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, toml_str)
        .map_err(|e| TreeLockError::Config(format!("Failed to write config file: {}", e)))?;
    Ok(())
}

pub fn save_config(config: &Config) -> Result<()> {
    save_config_to(config, &get_config_path()?)
}

/// Write a default config file unless one already exists.
pub fn init_config(force: bool) -> Result<PathBuf> {
    let config_path = get_config_path()?;
    if config_path.exists() && !force {
        return Err(TreeLockError::AlreadyExists(
            config_path.display().to_string(),
        ));
    }
    save_config_to(&Config::default(), &config_path)?;
    tracing::info!("wrote default config to {}", config_path.display());
    Ok(config_path)
}
