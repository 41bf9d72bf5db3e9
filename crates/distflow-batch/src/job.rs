use distflow_core::{Feeder, LineRecord, NetworkError, NodeRecord};
use serde::{Deserialize, Serialize};

/// Task label written into every manifest.
pub const TASK_NAME: &str = "distflow-opf";

/// One solve of the base feeder with every demand multiplied by `load_scale`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchJob {
    pub job_id: String,
    pub scenario_id: String,
    pub load_scale: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchJobRecord {
    pub job_id: String,
    pub scenario_id: String,
    pub load_scale: f64,
    pub status: String,
    /// Short failure label such as `infeasible`
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub total_losses_kw: Option<f64>,
    pub iterations: Option<usize>,
    pub output: String,
}

pub fn jobs_from_scales(scales: &[f64]) -> Vec<BatchJob> {
    scales
        .iter()
        .enumerate()
        .map(|(i, &scale)| BatchJob {
            job_id: format!("{TASK_NAME}-{i:03}"),
            scenario_id: format!("scale-{scale}"),
            load_scale: scale,
        })
        .collect()
}

/// Rebuild `base` with scaled demand; topology and limits are unchanged.
pub fn scaled_feeder(base: &Feeder, scale: f64) -> Result<Feeder, NetworkError> {
    let nodes = base
        .nodes()
        .iter()
        .map(|n| NodeRecord::new(n.id, n.bus_type, n.pd * scale, n.qd * scale))
        .collect();
    let lines = base
        .lines()
        .iter()
        .map(|l| LineRecord::new(l.from, l.to, l.r, l.x))
        .collect();
    Feeder::from_records(nodes, lines, *base.limits())
}
