//! `batch_manifest.json`: what was run, on which feeder, and how each job ended.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use distflow_algo::{BackendKind, SolverConfig};
use distflow_core::Feeder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::File;
use std::path::Path;

use crate::job::{BatchJobRecord, TASK_NAME};

/// The unscaled feeder every job was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseFeeder {
    pub nodes: usize,
    pub lines: usize,
    pub slack_nodes: usize,
    pub base_kv: f64,
    pub vmin_kv: f64,
    pub vmax_kv: f64,
    pub total_pd_kw: f64,
    pub total_qd_kvar: f64,
}

impl BaseFeeder {
    pub fn describe(feeder: &Feeder) -> Self {
        let limits = feeder.limits();
        let (pd, qd) = feeder.total_demand();
        Self {
            nodes: feeder.node_count(),
            lines: feeder.line_count(),
            slack_nodes: feeder.slack_nodes().count(),
            base_kv: limits.base_kv.value(),
            vmin_kv: limits.vmin.value(),
            vmax_kv: limits.vmax.value(),
            total_pd_kw: pd.value(),
            total_qd_kvar: qd.value(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchManifest {
    pub created_at: DateTime<Utc>,
    pub task: String,
    pub base_feeder: BaseFeeder,
    pub backend: BackendKind,
    pub solver: SolverConfig,
    pub num_jobs: usize,
    pub success: usize,
    pub failure: usize,
    pub jobs: Vec<BatchJobRecord>,
}

impl BatchManifest {
    /// Manifest for `jobs` run against `feeder`; success counts come from the records.
    pub fn new(
        feeder: &Feeder,
        backend: BackendKind,
        solver: &SolverConfig,
        jobs: Vec<BatchJobRecord>,
    ) -> Self {
        let success = jobs.iter().filter(|job| job.status == "ok").count();
        Self {
            created_at: Utc::now(),
            task: TASK_NAME.to_string(),
            base_feeder: BaseFeeder::describe(feeder),
            backend,
            solver: solver.clone(),
            num_jobs: jobs.len(),
            success,
            failure: jobs.len() - success,
            jobs,
        }
    }

    /// Losses against load scale for the jobs that solved, in job order.
    pub fn loss_curve(&self) -> Vec<(f64, f64)> {
        self.jobs
            .iter()
            .filter_map(|job| job.total_losses_kw.map(|loss| (job.load_scale, loss)))
            .collect()
    }

    /// Smallest load scale whose job failed as infeasible, if any.
    pub fn first_infeasible_scale(&self) -> Option<f64> {
        self.jobs
            .iter()
            .filter(|job| job.error_kind.as_deref() == Some("infeasible"))
            .map(|job| job.load_scale)
            .min_by(f64::total_cmp)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating manifest directory '{}'", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("serializing batch manifest")?;
        fs::write(path, json)
            .with_context(|| format!("writing batch manifest '{}'", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("opening batch manifest '{}'", path.display()))?;
        serde_json::from_reader(file)
            .with_context(|| format!("parsing batch manifest '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distflow_core::{
        BusType, Kilovars, Kilovolts, Kilowatts, LineRecord, NodeId, NodeRecord, Ohms,
        VoltageLimits,
    };
    use tempfile::NamedTempFile;

    fn two_node() -> Feeder {
        Feeder::from_records(
            vec![
                NodeRecord::new(NodeId::new(1), BusType::Slack, Kilowatts(0.0), Kilovars(0.0)),
                NodeRecord::new(NodeId::new(2), BusType::Load, Kilowatts(10.0), Kilovars(5.0)),
            ],
            vec![LineRecord::new(NodeId::new(1), NodeId::new(2), Ohms(1.0), Ohms(0.5))],
            VoltageLimits::from_base_kv(Kilovolts(11.0)),
        )
        .unwrap()
    }

    fn record(i: usize, scale: f64, outcome: Result<f64, &str>) -> BatchJobRecord {
        let (status, error_kind, losses) = match outcome {
            Ok(loss) => ("ok", None, Some(loss)),
            Err(kind) => ("error", Some(kind.to_string()), None),
        };
        BatchJobRecord {
            job_id: format!("distflow-opf-{i:03}"),
            scenario_id: format!("scale-{scale}"),
            load_scale: scale,
            status: status.into(),
            error: error_kind.clone().map(|kind| format!("{kind} at scale {scale}")),
            error_kind,
            total_losses_kw: losses,
            iterations: losses.map(|_| 12),
            output: format!("out/distflow-opf-{i:03}/report.json"),
        }
    }

    #[test]
    fn manifest_describes_base_feeder_and_solver() {
        let solver = SolverConfig {
            tolerance: 1e-4,
            ..SolverConfig::default()
        };
        let manifest = BatchManifest::new(
            &two_node(),
            BackendKind::PenaltyLbfgs,
            &solver,
            vec![
                record(0, 1.0, Ok(0.0031)),
                record(1, 800.0, Err("infeasible")),
                record(2, 400.0, Err("infeasible")),
            ],
        );
        assert_eq!(manifest.task, "distflow-opf");
        assert_eq!((manifest.success, manifest.failure), (1, 2));
        assert_eq!(manifest.base_feeder.nodes, 2);
        assert_eq!(manifest.base_feeder.slack_nodes, 1);
        assert_eq!(manifest.base_feeder.total_pd_kw, 10.0);
        assert_eq!(manifest.loss_curve(), vec![(1.0, 0.0031)]);
        assert_eq!(manifest.first_infeasible_scale(), Some(400.0));

        let tmp = NamedTempFile::new().unwrap();
        manifest.write(tmp.path()).unwrap();
        let json = std::fs::read_to_string(tmp.path()).unwrap();
        assert!(json.contains("\"backend\": \"penalty-lbfgs\""));

        let parsed = BatchManifest::load(tmp.path()).unwrap();
        assert_eq!(parsed.solver, solver);
        assert_eq!(parsed.base_feeder, manifest.base_feeder);
        assert_eq!(parsed.jobs, manifest.jobs);
        assert_eq!(parsed.created_at, manifest.created_at);
    }
}
