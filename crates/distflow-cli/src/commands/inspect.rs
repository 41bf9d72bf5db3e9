//! Feeder validation and model dump.

use anyhow::{Context, Result};
use distflow_algo::DistFlowProblem;
use distflow_cli::{DistflowConfig, InspectArgs};

use super::read_feeder;

pub fn handle(args: &InspectArgs, config: &DistflowConfig) -> Result<()> {
    let feeder = read_feeder(&args.feeder, config)?;
    let limits = *feeder.limits();
    let (pd, qd) = feeder.total_demand();

    println!("Feeder Summary");
    println!("==============");
    println!("  Nodes:       {}", feeder.node_count());
    println!("  Lines:       {}", feeder.line_count());
    println!("  Components:  {}", feeder.component_count());
    let slacks: Vec<String> = feeder.slack_nodes().map(|n| n.id.to_string()).collect();
    println!("  Slack nodes: {}", slacks.join(", "));
    println!("  Demand:      {pd} / {qd}");
    println!(
        "  Voltage:     Vnom {} (window {} .. {})",
        limits.vnom, limits.vmin, limits.vmax
    );
    println!();

    let diagnostics = feeder.diagnostics();
    if diagnostics.is_empty() {
        println!("Diagnostics: none");
    } else {
        println!("Diagnostics: {} warning(s)", diagnostics.warning_count());
        for issue in diagnostics.iter() {
            println!("  {issue}");
        }
    }
    println!();

    let problem = DistFlowProblem::build(feeder).context("assembling DistFlow model")?;
    print!("{problem}");
    Ok(())
}
