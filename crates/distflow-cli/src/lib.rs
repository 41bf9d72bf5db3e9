pub mod cli;
pub mod config;

pub use cli::{build_cli_command, Cli, Commands, FeederArgs, InspectArgs, SolveArgs, SolverArgs, SweepArgs};
pub use config::{load_config, DistflowConfig, LoggingConfig, NetworkConfig, SolverSection};
