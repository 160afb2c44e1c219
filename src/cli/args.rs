use clap::{Parser, Subcommand};
use std::path::PathBuf;
use treelock::config::Workload;

#[derive(Parser, Debug)]
#[command(name = "treelock")]
#[command(version, about = "Hierarchical path locking for user-space filesystems")]
pub struct Args {
    #[arg(
        long,
        global = true,
        help = "Extra config file layered over the user config"
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Run a concurrent workload against one tree and verify it drains")]
    Stress {
        #[arg(long, help = "Number of worker threads")]
        threads: Option<usize>,

        #[arg(long, help = "Operations per worker thread")]
        iterations: Option<u64>,

        #[arg(long, help = "Number of distinct names to contend on")]
        paths: Option<usize>,

        #[arg(long, help = "Seed for the workload generator")]
        seed: Option<u64>,

        #[arg(long, help = "Operation mix: mixed, read-heavy or write-heavy")]
        workload: Option<Workload>,

        #[arg(long, help = "Also write the JSON report to this file")]
        json_output: Option<PathBuf>,
    },
    #[command(about = "Print the canonical tree path for each argument")]
    Normalize {
        #[arg(required = true, help = "Paths to normalize")]
        paths: Vec<String>,

        #[arg(long, help = "Treat arguments as Windows file paths")]
        file: bool,

        #[arg(long, help = "JSON output")]
        json: bool,
    },
    #[command(about = "Manage configuration")]
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    #[command(about = "Show current configuration values")]
    Show,
    #[command(about = "Show config file path")]
    Path,
    #[command(about = "Write a default config file")]
    Init {
        #[arg(long, help = "Overwrite an existing config file")]
        force: bool,
    },
}
