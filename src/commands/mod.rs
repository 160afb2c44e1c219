pub mod config;
pub mod normalize;
pub mod stress;

pub use config::handle_config_command;
pub use normalize::print_normalized;
pub use stress::{run_stress_command, StressOverrides};
