//! Node and line CSV tables.
//!
//! | Table | Columns |
//! |-------|---------|
//! | nodes | `NODES`, `Tb`, `PD`, `QD` |
//! | lines | `FROM`, `TO`, `R`, `X` |
//!
//! `Tb` is 1 for the slack node and 0 for load nodes; demand is in kW/kvar
//! and impedance in Ω. Every field is read as text first so that a missing or
//! non-numeric value is reported with its column and 1-based data row.

use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use distflow_core::{
    BusType, DistError, DistResult, Kilovars, Kilowatts, LineRecord, NetworkError, NodeId,
    NodeRecord, Ohms,
};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct NodeRow {
    #[serde(rename = "NODES")]
    id: Option<String>,
    #[serde(rename = "Tb")]
    tb: Option<String>,
    #[serde(rename = "PD")]
    pd: Option<String>,
    #[serde(rename = "QD")]
    qd: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LineRow {
    #[serde(rename = "FROM")]
    from: Option<String>,
    #[serde(rename = "TO")]
    to: Option<String>,
    #[serde(rename = "R")]
    r: Option<String>,
    #[serde(rename = "X")]
    x: Option<String>,
}

/// Read the node table from a CSV file.
pub fn read_nodes_csv(path: &Path) -> DistResult<Vec<NodeRecord>> {
    let file = std::fs::File::open(path)?;
    let nodes = read_nodes(file, &path.display().to_string())?;
    debug!(path = %path.display(), rows = nodes.len(), "read node table");
    Ok(nodes)
}

/// Read the line table from a CSV file.
pub fn read_lines_csv(path: &Path) -> DistResult<Vec<LineRecord>> {
    let file = std::fs::File::open(path)?;
    let lines = read_lines(file, &path.display().to_string())?;
    debug!(path = %path.display(), rows = lines.len(), "read line table");
    Ok(lines)
}

/// Read the node table from any reader; `source` names it in errors.
pub fn read_nodes<R: Read>(reader: R, source: &str) -> DistResult<Vec<NodeRecord>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);
    let mut out = Vec::new();
    for (i, result) in rdr.deserialize().enumerate() {
        let row = i + 1;
        let record: NodeRow = result.map_err(|e| csv_error(source, e))?;
        let entity = format!("row {row}");
        let err = |reason: String| NetworkError::node(entity.clone(), reason);

        let id = node_id(record.id.as_deref(), "NODES").map_err(err)?;
        let code = integer(record.tb.as_deref(), "Tb").map_err(err)?;
        let bus_type = BusType::from_code(code)
            .map_err(|_| err(format!("Tb must be 0 (load) or 1 (slack), got {code}")))?;
        let pd = number(record.pd.as_deref(), "PD").map_err(err)?;
        let qd = number(record.qd.as_deref(), "QD").map_err(err)?;

        out.push(NodeRecord::new(id, bus_type, Kilowatts(pd), Kilovars(qd)));
    }
    Ok(out)
}

/// Read the line table from any reader; `source` names it in errors.
pub fn read_lines<R: Read>(reader: R, source: &str) -> DistResult<Vec<LineRecord>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);
    let mut out = Vec::new();
    for (i, result) in rdr.deserialize().enumerate() {
        let row = i + 1;
        let record: LineRow = result.map_err(|e| csv_error(source, e))?;
        let entity = format!("row {row}");
        let err = |reason: String| NetworkError::line(entity.clone(), reason);

        let from = node_id(record.from.as_deref(), "FROM").map_err(err)?;
        let to = node_id(record.to.as_deref(), "TO").map_err(err)?;
        let r = number(record.r.as_deref(), "R").map_err(err)?;
        let x = number(record.x.as_deref(), "X").map_err(err)?;

        out.push(LineRecord::new(from, to, Ohms(r), Ohms(x)));
    }
    Ok(out)
}

fn csv_error(source: &str, err: csv::Error) -> DistError {
    let msg = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(io) => DistError::Io(io),
        _ => DistError::Parse(format!("{source}: {msg}")),
    }
}

fn number(field: Option<&str>, column: &str) -> Result<f64, String> {
    let text = field
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("{column} is missing"))?;
    let value: f64 = text
        .parse()
        .map_err(|_| format!("{column} is not numeric: '{text}'"))?;
    if !value.is_finite() {
        return Err(format!("{column} must be finite, got '{text}'"));
    }
    Ok(value)
}

/// Integer field; spreadsheet exports such as `1.0` are accepted.
fn integer(field: Option<&str>, column: &str) -> Result<i64, String> {
    let value = number(field, column)?;
    if value.fract() != 0.0 {
        return Err(format!("{column} must be an integer, got {value}"));
    }
    Ok(value as i64)
}

fn node_id(field: Option<&str>, column: &str) -> Result<NodeId, String> {
    let value = integer(field, column)?;
    if value < 0 {
        return Err(format!("{column} must be a non-negative node id, got {value}"));
    }
    Ok(NodeId::new(value as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_nodes_with_spreadsheet_numbers() {
        let csv = "NODES,Tb,PD,QD\n1,1,0,0\n2.0,0.0,100,60\n";
        let nodes = read_nodes(csv.as_bytes(), "nodes").unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].bus_type, BusType::Slack);
        assert_eq!(nodes[1].id, NodeId::new(2));
        assert_eq!(nodes[1].pd, Kilowatts(100.0));
    }

    #[test]
    fn column_order_does_not_matter() {
        let csv = "X,R,TO,FROM\n0.47,0.922,2,1\n";
        let lines = read_lines(csv.as_bytes(), "lines").unwrap();
        assert_eq!(lines[0].from, NodeId::new(1));
        assert_eq!(lines[0].to, NodeId::new(2));
        assert_eq!(lines[0].r, Ohms(0.922));
    }

    #[test]
    fn non_numeric_demand_names_row_and_column() {
        let csv = "NODES,Tb,PD,QD\n1,1,0,0\n2,0,abc,1\n";
        let err = read_nodes(csv.as_bytes(), "nodes").unwrap_err();
        match err {
            DistError::Network(NetworkError::InvalidNodeData { entity, reason }) => {
                assert_eq!(entity, "row 2");
                assert!(reason.contains("PD"), "{reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_line_field_names_row() {
        let csv = "FROM,TO,R,X\n1,2,1.0,0.5\n2,3,,0.5\n";
        let err = read_lines(csv.as_bytes(), "lines").unwrap_err();
        match err {
            DistError::Network(NetworkError::InvalidLineData { entity, reason }) => {
                assert_eq!(entity, "row 2");
                assert_eq!(reason, "R is missing");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unknown_bus_type_is_rejected() {
        let csv = "NODES,Tb,PD,QD\n1,2,0,0\n";
        let err = read_nodes(csv.as_bytes(), "nodes").unwrap_err();
        assert!(matches!(
            err,
            DistError::Network(NetworkError::InvalidNodeData { .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_nodes_csv(Path::new("/nonexistent/nodes.csv")).unwrap_err();
        assert!(matches!(err, DistError::Io(_)));
    }
}
