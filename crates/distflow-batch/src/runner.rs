use crate::job::{scaled_feeder, BatchJob, BatchJobRecord};
use crate::manifest::BatchManifest;
use anyhow::{Context, Result};
use distflow_algo::{BackendKind, DistFlowProblem, OpfRun, RunOutcome, SolverConfig};
use distflow_core::Feeder;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Runner settings for a load-scaling study.
pub struct BatchRunnerConfig {
    pub feeder: Feeder,
    pub jobs: Vec<BatchJob>,
    pub output_root: PathBuf,
    pub backend: BackendKind,
    pub solver: SolverConfig,
    /// 0 selects one thread per CPU
    pub threads: usize,
}

/// Summary returned after the run so clients can log success/failure counts and manifest location.
pub struct BatchSummary {
    pub success: usize,
    pub failure: usize,
    pub manifest_path: PathBuf,
    pub jobs: Vec<BatchJobRecord>,
}

pub fn run_batch(config: &BatchRunnerConfig) -> Result<BatchSummary> {
    fs::create_dir_all(&config.output_root).with_context(|| {
        format!(
            "creating batch output root '{}'",
            config.output_root.display()
        )
    })?;

    let thread_count = if config.threads == 0 {
        num_cpus::get()
    } else {
        config.threads
    };
    let pool = ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build()
        .context("building Rayon thread pool for batch runs")?;
    info!(
        jobs = config.jobs.len(),
        threads = thread_count,
        backend = %config.backend,
        "starting batch"
    );

    // Each job owns its feeder, problem and backend; nothing is shared.
    let job_records: Vec<BatchJobRecord> = pool.install(|| {
        config
            .jobs
            .par_iter()
            .map(|job| run_job(job, config))
            .collect()
    });

    let manifest = BatchManifest::new(
        &config.feeder,
        config.backend,
        &config.solver,
        job_records,
    );
    let manifest_path = config.output_root.join("batch_manifest.json");
    manifest.write(&manifest_path)?;
    info!(
        success = manifest.success,
        failure = manifest.failure,
        manifest = %manifest_path.display(),
        "batch finished"
    );
    Ok(BatchSummary {
        success: manifest.success,
        failure: manifest.failure,
        manifest_path,
        jobs: manifest.jobs,
    })
}

/// Scale the base feeder, solve it, and write `report.json` on success.
fn run_job(job: &BatchJob, config: &BatchRunnerConfig) -> BatchJobRecord {
    let output_file = config.output_root.join(&job.job_id).join("report.json");
    let mut record = BatchJobRecord {
        job_id: job.job_id.clone(),
        scenario_id: job.scenario_id.clone(),
        load_scale: job.load_scale,
        status: "error".to_string(),
        error_kind: None,
        error: None,
        total_losses_kw: None,
        iterations: None,
        output: output_file.display().to_string(),
    };

    let problem = match scaled_feeder(&config.feeder, job.load_scale)
        .map_err(Into::into)
        .and_then(DistFlowProblem::build)
    {
        Ok(problem) => problem,
        Err(err) => {
            warn!(job = %job.job_id, error = %err, "batch job could not be built");
            record.error_kind = Some("build".to_string());
            record.error = Some(err.to_string());
            return record;
        }
    };

    let backend = config.backend.build();
    match OpfRun::new(problem).solve(backend.as_ref(), &config.solver) {
        RunOutcome::Solved(report) => {
            let written = output_file
                .parent()
                .map(fs::create_dir_all)
                .transpose()
                .context("creating job output directory")
                .and_then(|_| report.to_json(&output_file));
            match written {
                Ok(()) => {
                    record.status = "ok".to_string();
                    record.total_losses_kw = Some(report.total_losses.value());
                    record.iterations = Some(report.iterations);
                }
                Err(err) => {
                    warn!(job = %job.job_id, error = %err, "batch job output failed");
                    record.error_kind = Some("io".to_string());
                    record.error = Some(format!("{err:#}"));
                }
            }
        }
        RunOutcome::Failed(err) => {
            warn!(job = %job.job_id, kind = err.kind(), error = %err, "batch job failed");
            record.error_kind = Some(err.kind().to_string());
            record.error = Some(err.to_string());
        }
    }
    record
}
