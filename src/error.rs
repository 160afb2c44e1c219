use thiserror::Error;

pub type Result<T> = std::result::Result<T, TreeLockError>;

/// Recoverable failures surfaced to namespace callers.
///
/// Lock contention inside the engine is reported as `None` from the
/// `try_*` functions and broken invariants panic; this enum only covers
/// what an adapter is expected to map onto its own status codes.
#[derive(Error, Debug)]
pub enum TreeLockError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Sharing violation: {0}")]
    SharingViolation(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for TreeLockError {
    fn from(err: serde_json::Error) -> Self {
        TreeLockError::Json(err.to_string())
    }
}
