//! # distflow-core: Radial Feeder Modeling Core
//!
//! Holds the validated topology and parameters of a single-phase radial
//! distribution feeder: nodes with demand and a bus type, directed lines with
//! series impedance, and the voltage operating window derived from the base
//! voltage.
//!
//! ## Design Philosophy
//!
//! A feeder is a **forest of trees**, one tree per slack node:
//! - **Nodes**: slack (fixed voltage, free injection) or load (fixed zero
//!   injection, free voltage)
//! - **Lines**: directed `(from, to)` pairs whose orientation defines the sign
//!   of branch power flow
//!
//! Everything is checked once in [`Feeder::from_records`]. Downstream model
//! construction can then index nodes and lines without re-validating.
//!
//! ## Quick Start
//!
//! ```rust
//! use distflow_core::*;
//!
//! let nodes = vec![
//!     NodeRecord::new(NodeId::new(1), BusType::Slack, Kilowatts(0.0), Kilovars(0.0)),
//!     NodeRecord::new(NodeId::new(2), BusType::Load, Kilowatts(10.0), Kilovars(5.0)),
//! ];
//! let lines = vec![LineRecord::new(NodeId::new(1), NodeId::new(2), Ohms(1.0), Ohms(0.5))];
//!
//! let feeder = Feeder::from_records(nodes, lines, VoltageLimits::from_base_kv(Kilovolts(11.0)))?;
//! assert_eq!(feeder.node_count(), 2);
//! assert!((feeder.lines()[0].rm.value() - 0.001).abs() < 1e-12);
//! # Ok::<(), NetworkError>(())
//! ```

pub mod diagnostics;
pub mod error;
pub mod feeder;
pub mod linalg;
pub mod units;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{DistError, DistResult, NetworkError};
pub use feeder::{Feeder, Line, LineRecord, Node, NodeRecord, VoltageLimits};
pub use units::{Amperes, Kiloohms, Kilovars, Kilovolts, Kilowatts, Ohms, OHMS_PER_KILOOHM};

// Newtype wrappers for IDs for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(usize);

impl NodeId {
    #[inline]
    pub fn new(value: usize) -> Self {
        NodeId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl LineId {
    #[inline]
    pub fn new(value: usize) -> Self {
        LineId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Role of a node in the power balance, decoded from the `Tb` column.
///
/// `Tb == 1` is a slack/reference bus: voltage fixed at nominal, injection
/// free. `Tb == 0` is a load bus: injection fixed at zero, voltage free within
/// limits. The input format never names this enumeration; the mapping is
/// kept as a documented assumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusType {
    Slack,
    Load,
}

impl BusType {
    /// Decode a `Tb` bus-type code. Any code other than 0 or 1 has no fixing
    /// rule and is rejected.
    pub fn from_code(code: i64) -> Result<Self, NetworkError> {
        match code {
            1 => Ok(BusType::Slack),
            0 => Ok(BusType::Load),
            other => Err(NetworkError::InvalidNodeData {
                entity: "Tb".to_string(),
                reason: format!("unknown bus type code {other} (expected 0 or 1)"),
            }),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            BusType::Slack => 1,
            BusType::Load => 0,
        }
    }

    pub fn is_slack(&self) -> bool {
        matches!(self, BusType::Slack)
    }
}

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusType::Slack => write!(f, "slack"),
            BusType::Load => write!(f, "load"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_type_codes() {
        assert_eq!(BusType::from_code(1).unwrap(), BusType::Slack);
        assert_eq!(BusType::from_code(0).unwrap(), BusType::Load);
        assert!(BusType::from_code(2).is_err());
        assert!(BusType::from_code(-1).is_err());
        assert_eq!(BusType::Slack.code(), 1);
    }

    #[test]
    fn node_id_serializes_transparently() {
        let json = serde_json::to_string(&NodeId::new(7)).unwrap();
        assert_eq!(json, "7");
    }
}
