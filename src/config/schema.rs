use crate::error::{Result, TreeLockError};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Operation mix of the stress workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Workload {
    #[default]
    Mixed,
    ReadHeavy,
    WriteHeavy,
}

impl std::fmt::Display for Workload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Workload::Mixed => write!(f, "mixed"),
            Workload::ReadHeavy => write!(f, "read-heavy"),
            Workload::WriteHeavy => write!(f, "write-heavy"),
        }
    }
}

impl std::str::FromStr for Workload {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mixed" => Ok(Workload::Mixed),
            "read-heavy" => Ok(Workload::ReadHeavy),
            "write-heavy" => Ok(Workload::WriteHeavy),
            _ => Err(format!(
                "Invalid workload '{}'. Must be one of: mixed, read-heavy, write-heavy",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogConfig {
    /// `tracing_subscriber` filter directive, e.g. `treelock=debug`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl LogConfig {
    pub fn get_filter(&self) -> String {
        self.filter.clone().unwrap_or_else(super::default_log_filter)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StressConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u64>,
    /// Number of distinct names the workers fight over.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub workload: Workload,
}

impl StressConfig {
    pub fn get_threads(&self) -> usize {
        self.threads.unwrap_or_else(super::default_stress_threads)
    }

    pub fn get_iterations(&self) -> u64 {
        self.iterations
            .unwrap_or_else(super::default_stress_iterations)
    }

    pub fn get_paths(&self) -> usize {
        self.paths.unwrap_or_else(super::default_stress_paths)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub stress: StressConfig,
}

const MAX_STRESS_THREADS: usize = 1024;
const MAX_STRESS_PATHS: usize = 4096;

pub fn validate_config(config: &Config) -> Result<()> {
    let filter = config.log.get_filter();
    EnvFilter::try_new(&filter).map_err(|e| {
        TreeLockError::Config(format!("Invalid log filter '{}': {}", filter, e))
    })?;

    let threads = config.stress.get_threads();
    if threads == 0 || threads > MAX_STRESS_THREADS {
        return Err(TreeLockError::Config(format!(
            "stress.threads ({}) must be between 1 and {}",
            threads, MAX_STRESS_THREADS
        )));
    }

    if config.stress.get_iterations() == 0 {
        return Err(TreeLockError::Config(
            "stress.iterations must be at least 1".to_string(),
        ));
    }

    let paths = config.stress.get_paths();
    if paths == 0 || paths > MAX_STRESS_PATHS {
        return Err(TreeLockError::Config(format!(
            "stress.paths ({}) must be between 1 and {}",
            paths, MAX_STRESS_PATHS
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.log.get_filter(), "info");
        assert_eq!(config.stress.get_threads(), 8);
        assert_eq!(config.stress.get_iterations(), 10_000);
        assert_eq!(config.stress.get_paths(), 16);
        assert_eq!(config.stress.seed, None);
        assert_eq!(config.stress.workload, Workload::Mixed);
        assert!(validate_config(&config).is_ok());
    }

    #[rstest]
    #[case("mixed", Workload::Mixed)]
    #[case("read-heavy", Workload::ReadHeavy)]
    #[case("WRITE-HEAVY", Workload::WriteHeavy)]
    fn test_workload_from_str(#[case] input: &str, #[case] expected: Workload) {
        assert_eq!(input.parse::<Workload>().unwrap(), expected);
        assert_eq!(expected.to_string(), input.to_lowercase());
    }

    #[test]
    fn test_workload_rejects_unknown() {
        let err = "chaos".parse::<Workload>().unwrap_err();
        assert!(err.contains("mixed, read-heavy, write-heavy"));
    }

    #[rstest]
    #[case("[stress]\nthreads = 0\n")]
    #[case("[stress]\nthreads = 5000\n")]
    #[case("[stress]\niterations = 0\n")]
    #[case("[stress]\npaths = 0\n")]
    #[case("[log]\nfilter = \"treelock=notalevel\"\n")]
    fn test_validate_rejects(#[case] toml_str: &str) {
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(matches!(
            validate_config(&config),
            Err(TreeLockError::Config(_))
        ));
    }
}
