use treelock::error::{Result, TreeLockError};

pub fn validate_path_argument(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(TreeLockError::Config("Path cannot be empty".to_string()));
    }

    for byte in path.bytes() {
        if byte < 32 || byte == 127 {
            return Err(TreeLockError::Config(format!(
                "Path {:?} contains control characters",
                path
            )));
        }
    }

    Ok(())
}

/// Reject flag values that can never describe a runnable workload.
///
/// Upper bounds are left to config validation once flags and files merge.
pub fn validate_stress_overrides(
    threads: Option<usize>,
    iterations: Option<u64>,
    paths: Option<usize>,
) -> Result<()> {
    if threads == Some(0) {
        return Err(TreeLockError::Config(
            "--threads must be at least 1".to_string(),
        ));
    }
    if iterations == Some(0) {
        return Err(TreeLockError::Config(
            "--iterations must be at least 1".to_string(),
        ));
    }
    if paths == Some(0) {
        return Err(TreeLockError::Config(
            "--paths must be at least 1".to_string(),
        ));
    }
    Ok(())
}
