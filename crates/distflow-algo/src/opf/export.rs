//! File export for [`OpfReport`].

use super::results::OpfReport;
use anyhow::{Context, Result};
use std::path::Path;

impl OpfReport {
    /// Export to JSON format
    pub fn to_json(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("serializing OpfReport to JSON")?;
        std::fs::write(path, json)
            .with_context(|| format!("writing JSON to {}", path.display()))?;
        Ok(())
    }

    /// Convert to JSON value (for streaming/stdout)
    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).context("converting OpfReport to JSON value")
    }

    /// Write `lines.csv` and `nodes.csv` into `dir` (requires csv feature)
    #[cfg(feature = "csv")]
    pub fn to_csv(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;

        let lines_path = dir.join("lines.csv");
        let mut wtr = csv::Writer::from_path(&lines_path)
            .with_context(|| format!("creating CSV writer for {}", lines_path.display()))?;
        wtr.write_record(["from", "to", "p_kw", "q_kvar", "current_a", "loss_kw"])
            .context("writing CSV header")?;
        for line in &self.lines {
            wtr.write_record(&[
                line.from.to_string(),
                line.to.to_string(),
                line.p.value().to_string(),
                line.q.value().to_string(),
                line.current.value().to_string(),
                line.loss.value().to_string(),
            ])
            .context("writing CSV record")?;
        }
        wtr.flush().context("flushing CSV writer")?;

        let nodes_path = dir.join("nodes.csv");
        let mut wtr = csv::Writer::from_path(&nodes_path)
            .with_context(|| format!("creating CSV writer for {}", nodes_path.display()))?;
        wtr.write_record([
            "node",
            "tb",
            "v_kv",
            "ps_kw",
            "qs_kvar",
            "pd_kw",
            "qd_kvar",
            "marginal_loss_p",
            "marginal_loss_q",
        ])
        .context("writing CSV header")?;
        let opt = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
        for node in &self.nodes {
            wtr.write_record(&[
                node.node.to_string(),
                node.bus_type.code().to_string(),
                node.voltage.value().to_string(),
                node.ps.value().to_string(),
                node.qs.value().to_string(),
                node.pd.value().to_string(),
                node.qd.value().to_string(),
                opt(node.marginal_loss_p),
                opt(node.marginal_loss_q),
            ])
            .context("writing CSV record")?;
        }
        wtr.flush().context("flushing CSV writer")?;
        Ok(())
    }
}
