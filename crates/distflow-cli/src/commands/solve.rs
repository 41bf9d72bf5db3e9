use std::fs;
use std::io::{self, Write};

use anyhow::{anyhow, Context, Result};
use distflow_algo::{OpfError, OpfReport, OpfSolver};
use distflow_cli::{DistflowConfig, SolveArgs};
use tabwriter::TabWriter;
use tracing::info;

use super::read_feeder;

pub fn handle(args: &SolveArgs, config: &DistflowConfig) -> Result<()> {
    let feeder = read_feeder(&args.feeder, config)?;
    let (backend, solver_config) = config.solver.resolve(&args.solver);
    info!(
        backend = %backend,
        max_iterations = solver_config.max_iterations,
        tolerance = solver_config.tolerance,
        "solving DistFlow OPF"
    );

    let solver = OpfSolver::new()
        .with_backend(backend)
        .with_config(solver_config);
    let report = solver.solve(feeder).map_err(|err| {
        let kind = match &err {
            OpfError::Solve(solve) => solve.kind(),
            OpfError::Build(_) => "build",
            OpfError::BackendUnavailable(_) => "backend-unavailable",
        };
        anyhow!("OPF failed [{kind}]: {err}")
    })?;

    let [supply, demand, losses] = report.summary_triple();
    println!("[{supply:.6}, {demand:.6}, {losses:.6}]");
    print_node_table(&report)?;
    print_line_table(&report)?;
    println!(
        "{} iterations with {} in {} ms (max violation {:.2e})",
        report.iterations, report.backend, report.solve_time_ms, report.max_violation
    );

    if let Some(path) = &args.json {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory '{}'", parent.display()))?;
        }
        report.to_json(path)?;
        info!(path = %path.display(), "report written");
    }
    if let Some(dir) = &args.csv_dir {
        report.to_csv(dir)?;
        info!(dir = %dir.display(), "tables written");
    }
    Ok(())
}

fn marginal(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.6}"))
}

fn print_node_table(report: &OpfReport) -> Result<()> {
    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "NODE\tTYPE\tV (kV)\tPS (kW)\tQS (kVAr)\tPD (kW)\tQD (kVAr)\tdLoss/dPD\tdLoss/dQD")?;
    for node in &report.nodes {
        writeln!(
            writer,
            "{}\t{}\t{:.6}\t{:.4}\t{:.4}\t{:.4}\t{:.4}\t{}\t{}",
            node.node,
            node.bus_type,
            node.voltage.value(),
            node.ps.value(),
            node.qs.value(),
            node.pd.value(),
            node.qd.value(),
            marginal(node.marginal_loss_p),
            marginal(node.marginal_loss_q),
        )?;
    }
    writer.flush()?;
    Ok(())
}

fn print_line_table(report: &OpfReport) -> Result<()> {
    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "LINE\tP (kW)\tQ (kVAr)\tI (A)\tLOSS (kW)")?;
    for line in &report.lines {
        writeln!(
            writer,
            "{}\t{:.4}\t{:.4}\t{:.4}\t{:.6}",
            line.line,
            line.p.value(),
            line.q.value(),
            line.current.value(),
            line.loss.value(),
        )?;
    }
    writer.flush()?;
    Ok(())
}
