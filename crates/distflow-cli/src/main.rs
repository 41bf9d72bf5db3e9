use std::io;
use std::process::ExitCode;

use clap::Parser;
use distflow_cli::{load_config, Cli, Commands};
use tracing::error;
use tracing_subscriber::FmtSubscriber;

mod commands;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    let level = match cli.log_level {
        Some(level) => level,
        None => match config.logging.tracing_level() {
            Ok(level) => level,
            Err(err) => {
                eprintln!("error: {err:#}");
                return ExitCode::FAILURE;
            }
        },
    };

    // stdout carries the report tables
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("warning: a global tracing subscriber was already installed");
    }

    let result = match &cli.command {
        Commands::Solve(args) => commands::solve::handle(args, &config),
        Commands::Inspect(args) => commands::inspect::handle(args, &config),
        Commands::Sweep(args) => commands::sweep::handle(args, &config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("command failed: {err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
