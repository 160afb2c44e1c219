use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Args, Commands};
use commands::StressOverrides;
use treelock::config::{load_config_with_overlay, Config};
use treelock::error::Result;

const LOG_ENV: &str = "TREELOCK_LOG";

fn main() {
    match run() {
        Ok(code) => {
            std::process::exit(code);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// `TREELOCK_LOG` wins over the config file, which wins over `info`.
fn init_logging(config: Option<&Config>) {
    let filter = std::env::var(LOG_ENV)
        .ok()
        .or_else(|| config.map(|c| c.log.get_filter()))
        .unwrap_or_else(|| "info".to_string());
    let env_filter = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<i32> {
    let args = Args::parse();

    // Config errors are reported by the commands that need a config, so
    // `config init --force` can still repair a broken file.
    let config = load_config_with_overlay(args.config.as_deref());
    init_logging(config.as_ref().ok());

    match args.command {
        Commands::Stress {
            threads,
            iterations,
            paths,
            seed,
            workload,
            json_output,
        } => commands::run_stress_command(
            config?,
            StressOverrides {
                threads,
                iterations,
                paths,
                seed,
                workload,
                json_output,
            },
        ),
        Commands::Normalize { paths, file, json } => {
            commands::print_normalized(&paths, file, json)?;
            Ok(0)
        }
        Commands::Config { action } => {
            commands::handle_config_command(action, args.config.as_deref())?;
            Ok(0)
        }
    }
}
