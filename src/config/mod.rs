pub mod paths;
pub mod persistence;
pub mod schema;

pub use paths::*;
pub use persistence::*;
pub use schema::*;

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_stress_threads() -> usize {
    8
}

fn default_stress_iterations() -> u64 {
    10_000
}

fn default_stress_paths() -> usize {
    16
}
