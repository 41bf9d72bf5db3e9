use clap::{Args, CommandFactory, Parser, Subcommand, ValueHint};
use distflow_algo::BackendKind;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "distflow", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level (overrides `[logging] level` from the config file)
    #[arg(long)]
    pub log_level: Option<tracing::Level>,

    /// Optional TOML configuration file
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Solve the loss-minimizing DistFlow OPF for one feeder
    Solve(SolveArgs),
    /// Validate a feeder and print the assembled model
    Inspect(InspectArgs),
    /// Solve the feeder under several demand multipliers in parallel
    Sweep(SweepArgs),
}

/// Node and line tables shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct FeederArgs {
    /// Node table (NODES, Tb, PD, QD)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub nodes: PathBuf,

    /// Line table (FROM, TO, R, X)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub lines: PathBuf,

    /// Base line-to-line voltage in kV
    #[arg(long)]
    pub base_kv: Option<f64>,
}

/// Solver overrides; unset flags fall back to the config file.
#[derive(Args, Debug, Clone)]
pub struct SolverArgs {
    /// Backend: interior-point or penalty-lbfgs
    #[arg(long)]
    pub backend: Option<BackendKind>,

    /// Maximum solver iterations
    #[arg(long)]
    pub max_iter: Option<usize>,

    /// Convergence tolerance
    #[arg(long)]
    pub tol: Option<f64>,
}

#[derive(Args, Debug)]
pub struct SolveArgs {
    #[command(flatten)]
    pub feeder: FeederArgs,

    #[command(flatten)]
    pub solver: SolverArgs,

    /// Write the full report as JSON
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub json: Option<PathBuf>,

    /// Write lines.csv and nodes.csv into this directory
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub csv_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(flatten)]
    pub feeder: FeederArgs,
}

#[derive(Args, Debug)]
pub struct SweepArgs {
    #[command(flatten)]
    pub feeder: FeederArgs,

    #[command(flatten)]
    pub solver: SolverArgs,

    /// Comma-separated demand multipliers
    #[arg(long, value_delimiter = ',', required = true)]
    pub scales: Vec<f64>,

    /// Worker threads (0 = one per CPU)
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    /// Output root for per-job reports and the manifest
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub out: PathBuf,
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}
