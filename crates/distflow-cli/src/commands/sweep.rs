use std::io::{self, Write};

use anyhow::{bail, Result};
use distflow_batch::{jobs_from_scales, run_batch, BatchRunnerConfig};
use distflow_cli::{DistflowConfig, SweepArgs};
use tabwriter::TabWriter;

use super::read_feeder;

pub fn handle(args: &SweepArgs, config: &DistflowConfig) -> Result<()> {
    if let Some(bad) = args.scales.iter().find(|s| !s.is_finite()) {
        bail!("load scale must be finite, got {bad}");
    }
    let feeder = read_feeder(&args.feeder, config)?;
    let (backend, solver) = config.solver.resolve(&args.solver);

    let summary = run_batch(&BatchRunnerConfig {
        feeder,
        jobs: jobs_from_scales(&args.scales),
        output_root: args.out.clone(),
        backend,
        solver,
        threads: args.threads,
    })?;

    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "JOB\tSCALE\tSTATUS\tLOSSES (kW)\tITERATIONS")?;
    for job in &summary.jobs {
        let status = match &job.error_kind {
            Some(kind) => format!("{} ({kind})", job.status),
            None => job.status.clone(),
        };
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}",
            job.job_id,
            job.load_scale,
            status,
            job.total_losses_kw
                .map_or_else(|| "-".to_string(), |v| format!("{v:.6}")),
            job.iterations
                .map_or_else(|| "-".to_string(), |n| n.to_string()),
        )?;
    }
    writer.flush()?;
    println!(
        "{} succeeded, {} failed; manifest at {}",
        summary.success,
        summary.failure,
        summary.manifest_path.display()
    );
    Ok(())
}
