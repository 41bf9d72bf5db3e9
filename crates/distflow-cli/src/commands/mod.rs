pub mod inspect;
pub mod solve;
pub mod sweep;

use anyhow::{Context, Result};
use distflow_cli::{DistflowConfig, FeederArgs};
use distflow_core::Feeder;
use distflow_io::load_feeder;

/// Read and validate the tables named on the command line.
pub(crate) fn read_feeder(args: &FeederArgs, config: &DistflowConfig) -> Result<Feeder> {
    let limits = config.network.limits(args.base_kv)?;
    load_feeder(&args.nodes, &args.lines, limits).with_context(|| {
        format!(
            "loading feeder from '{}' and '{}'",
            args.nodes.display(),
            args.lines.display()
        )
    })
}
