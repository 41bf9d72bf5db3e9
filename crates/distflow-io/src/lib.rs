//! # distflow-io: Feeder Table Ingestion
//!
//! Reads the node and line CSV tables of a radial feeder and turns them into
//! a validated [`Feeder`].
//!
//! ```rust,no_run
//! use distflow_core::{Kilovolts, VoltageLimits};
//! use distflow_io::load_feeder;
//! use std::path::Path;
//!
//! let feeder = load_feeder(
//!     Path::new("nodes.csv"),
//!     Path::new("lines.csv"),
//!     VoltageLimits::from_base_kv(Kilovolts(11.0)),
//! )?;
//! println!("{} nodes", feeder.node_count());
//! # Ok::<(), distflow_core::DistError>(())
//! ```

pub mod tables;

use std::path::Path;

use distflow_core::{DistResult, Feeder, VoltageLimits};
use tracing::info;

pub use tables::{read_lines, read_lines_csv, read_nodes, read_nodes_csv};

/// Read both tables and validate them into a feeder.
pub fn load_feeder(nodes_csv: &Path, lines_csv: &Path, limits: VoltageLimits) -> DistResult<Feeder> {
    let nodes = read_nodes_csv(nodes_csv)?;
    let lines = read_lines_csv(lines_csv)?;
    let feeder = Feeder::from_records(nodes, lines, limits)?;
    info!(
        nodes = feeder.node_count(),
        lines = feeder.line_count(),
        components = feeder.component_count(),
        "feeder loaded"
    );
    Ok(feeder)
}
