//! Parallel load-scaling studies over one feeder.

pub mod job;
pub mod manifest;
pub mod runner;

pub use job::{jobs_from_scales, scaled_feeder, BatchJob, BatchJobRecord, TASK_NAME};
pub use manifest::{BaseFeeder, BatchManifest};
pub use runner::{run_batch, BatchRunnerConfig, BatchSummary};
