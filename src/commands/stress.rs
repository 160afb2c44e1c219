use std::io::Write;
use std::path::PathBuf;

use crate::cli::validate_stress_overrides;
use treelock::config::{validate_config, Config, Workload};
use treelock::error::Result;
use treelock::stress::{run_stress, write_report, StressOptions};

#[derive(Debug, Default)]
pub struct StressOverrides {
    pub threads: Option<usize>,
    pub iterations: Option<u64>,
    pub paths: Option<usize>,
    pub seed: Option<u64>,
    pub workload: Option<Workload>,
    pub json_output: Option<PathBuf>,
}

/// Run the workload, print the report and map its status to an exit code.
pub fn run_stress_command(mut config: Config, overrides: StressOverrides) -> Result<i32> {
    validate_stress_overrides(overrides.threads, overrides.iterations, overrides.paths)?;

    let stress = &mut config.stress;
    stress.threads = overrides.threads.or(stress.threads);
    stress.iterations = overrides.iterations.or(stress.iterations);
    stress.paths = overrides.paths.or(stress.paths);
    stress.seed = overrides.seed.or(stress.seed);
    if let Some(workload) = overrides.workload {
        stress.workload = workload;
    }
    validate_config(&config)?;

    let report = run_stress(&StressOptions::from_config(&config.stress))?;
    if let Some(path) = &overrides.json_output {
        write_report(&report, path)?;
    }

    let mut out = std::io::stdout().lock();
    writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
    out.flush()?;

    if report.passed() {
        Ok(0)
    } else {
        tracing::error!("stress run failed: {:?}", report.fatal_errors);
        Ok(1)
    }
}
