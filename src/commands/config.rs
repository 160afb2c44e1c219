use std::path::Path;

use crate::cli::ConfigAction;
use treelock::config::{get_config_path, init_config, load_config_with_overlay};
use treelock::error::Result;

pub fn handle_config_command(action: Option<ConfigAction>, overlay: Option<&Path>) -> Result<()> {
    match action {
        Some(ConfigAction::Path) => {
            let config_path = get_config_path()?;
            println!("Config location: {}", config_path.display());
        }
        None | Some(ConfigAction::Show) => {
            let config_path = get_config_path()?;
            let config = load_config_with_overlay(overlay)?;
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("Config file: {} (not created, using defaults)", config_path.display());
            }
            if let Some(overlay) = overlay {
                println!("Overlay file: {}", overlay.display());
            }
            println!();
            println!("Current configuration:");
            println!("  Log:");
            println!("    filter: {}", config.log.get_filter());
            println!("  Stress:");
            println!("    threads: {}", config.stress.get_threads());
            println!("    iterations: {}", config.stress.get_iterations());
            println!("    paths: {}", config.stress.get_paths());
            println!("    workload: {}", config.stress.workload);
            if let Some(seed) = config.stress.seed {
                println!("    seed: {}", seed);
            }
        }
        Some(ConfigAction::Init { force }) => {
            let config_path = init_config(force)?;
            println!("Created default config at {}", config_path.display());
        }
    }
    Ok(())
}
