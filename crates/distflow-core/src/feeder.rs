//! Topology and parameter store for a radial feeder.
//!
//! [`Feeder::from_records`] turns raw node and line tables into an immutable,
//! validated store. Checks run in a fixed order and the first failure wins:
//!
//! ```text
//! node ids unique ─► node data finite ─► line data finite, R/X ≥ 0
//!        ─► line endpoints known, no self-loops, no duplicate (from,to)
//!        ─► undirected graph acyclic (union-find)
//!        ─► exactly one slack node per connected component
//! ```
//!
//! A line listed in both orientations, `(a,b)` and `(b,a)`, closes a two-edge
//! cycle and is rejected by the acyclicity check.

use std::collections::HashMap;

use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diagnostics::Diagnostics;
use crate::error::NetworkError;
use crate::units::{Kiloohms, Kilovars, Kilovolts, Kilowatts, Ohms};
use crate::{BusType, LineId, NodeId};

/// Fraction of nominal voltage allowed below nominal.
pub const DEFAULT_VMIN_FACTOR: f64 = 0.80;
/// Fraction of nominal voltage allowed above nominal.
pub const DEFAULT_VMAX_FACTOR: f64 = 1.05;

/// One row of the node table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub bus_type: BusType,
    pub pd: Kilowatts,
    pub qd: Kilovars,
}

impl NodeRecord {
    pub fn new(id: NodeId, bus_type: BusType, pd: Kilowatts, qd: Kilovars) -> Self {
        Self {
            id,
            bus_type,
            pd,
            qd,
        }
    }
}

/// One row of the line table, impedance in source units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineRecord {
    pub from: NodeId,
    pub to: NodeId,
    pub r: Ohms,
    pub x: Ohms,
}

impl LineRecord {
    pub fn new(from: NodeId, to: NodeId, r: Ohms, x: Ohms) -> Self {
        Self { from, to, r, x }
    }
}

/// Voltage operating window derived from the base line-to-line voltage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoltageLimits {
    pub base_kv: Kilovolts,
    pub vnom: Kilovolts,
    pub vmin: Kilovolts,
    pub vmax: Kilovolts,
}

impl VoltageLimits {
    /// Vnom = Vbase/√3 with the default 0.80/1.05 window.
    ///
    /// Unchecked; [`Feeder::from_records`] rejects a non-positive base.
    pub fn from_base_kv(base_kv: Kilovolts) -> Self {
        let vnom = base_kv.value() / 3f64.sqrt();
        Self {
            base_kv,
            vnom: Kilovolts(vnom),
            vmin: Kilovolts(DEFAULT_VMIN_FACTOR * vnom),
            vmax: Kilovolts(DEFAULT_VMAX_FACTOR * vnom),
        }
    }

    /// Same as [`from_base_kv`](Self::from_base_kv) with custom factors.
    pub fn with_factors(
        base_kv: Kilovolts,
        vmin_factor: f64,
        vmax_factor: f64,
    ) -> Result<Self, NetworkError> {
        if !(vmin_factor.is_finite() && vmax_factor.is_finite())
            || vmin_factor <= 0.0
            || vmin_factor > 1.0
            || vmax_factor < 1.0
        {
            return Err(NetworkError::InvalidConfig(format!(
                "voltage factors must satisfy 0 < vmin <= 1 <= vmax, got {vmin_factor} / {vmax_factor}"
            )));
        }
        let vnom = base_kv.value() / 3f64.sqrt();
        let limits = Self {
            base_kv,
            vnom: Kilovolts(vnom),
            vmin: Kilovolts(vmin_factor * vnom),
            vmax: Kilovolts(vmax_factor * vnom),
        };
        limits.validate()?;
        Ok(limits)
    }

    /// Checks `base_kv > 0` and `0 < vmin <= vnom <= vmax`, all finite.
    pub fn validate(&self) -> Result<(), NetworkError> {
        if !self.base_kv.is_finite() || self.base_kv.value() <= 0.0 {
            return Err(NetworkError::InvalidConfig(format!(
                "base voltage must be positive, got {}",
                self.base_kv
            )));
        }
        let window = [self.vmin, self.vnom, self.vmax];
        if window.iter().any(|v| !v.is_finite())
            || self.vmin.value() <= 0.0
            || self.vmin > self.vnom
            || self.vnom > self.vmax
        {
            return Err(NetworkError::InvalidConfig(format!(
                "voltage window must satisfy 0 < vmin <= vnom <= vmax, got {} / {} / {}",
                self.vmin, self.vnom, self.vmax
            )));
        }
        Ok(())
    }
}

/// A validated node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub bus_type: BusType,
    pub pd: Kilowatts,
    pub qd: Kilovars,
}

/// A validated directed line with both source and scaled impedance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    pub id: LineId,
    pub from: NodeId,
    pub to: NodeId,
    /// Position of `from` in [`Feeder::nodes`]
    pub from_idx: usize,
    /// Position of `to` in [`Feeder::nodes`]
    pub to_idx: usize,
    pub r: Ohms,
    pub x: Ohms,
    pub rm: Kiloohms,
    pub xm: Kiloohms,
}

impl Line {
    pub fn label(&self) -> String {
        format!("{}-{}", self.from, self.to)
    }

    pub fn is_zero_impedance(&self) -> bool {
        self.rm.value() == 0.0 && self.xm.value() == 0.0
    }
}

/// Immutable, validated feeder.
#[derive(Debug, Clone)]
pub struct Feeder {
    nodes: Vec<Node>,
    lines: Vec<Line>,
    limits: VoltageLimits,
    index: HashMap<NodeId, usize>,
    incoming: Vec<Vec<usize>>,
    outgoing: Vec<Vec<usize>>,
    component: Vec<usize>,
    graph: UnGraph<NodeId, LineId>,
}

impl PartialEq for Feeder {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.lines == other.lines && self.limits == other.limits
    }
}

impl Feeder {
    /// Validate node and line tables and build the store.
    ///
    /// Node and line order is preserved; it fixes the order of variables and
    /// constraints built on top of the feeder.
    pub fn from_records(
        nodes: Vec<NodeRecord>,
        lines: Vec<LineRecord>,
        limits: VoltageLimits,
    ) -> Result<Self, NetworkError> {
        limits.validate()?;

        // ====================================================================
        // NODES
        // ====================================================================

        if nodes.is_empty() {
            return Err(NetworkError::InvalidTopology("feeder has no nodes".into()));
        }

        let mut index = HashMap::with_capacity(nodes.len());
        for (i, rec) in nodes.iter().enumerate() {
            if index.insert(rec.id, i).is_some() {
                return Err(NetworkError::InvalidTopology(format!(
                    "duplicate node id {}",
                    rec.id
                )));
            }
        }
        for rec in &nodes {
            if !rec.pd.is_finite() || !rec.qd.is_finite() {
                return Err(NetworkError::node(
                    format!("node {}", rec.id),
                    "demand must be finite",
                ));
            }
        }

        // ====================================================================
        // LINES
        // ====================================================================

        for rec in &lines {
            let entity = format!("line {}-{}", rec.from, rec.to);
            if !rec.r.is_finite() || !rec.x.is_finite() {
                return Err(NetworkError::line(entity, "impedance must be finite"));
            }
            if rec.r.value() < 0.0 || rec.x.value() < 0.0 {
                return Err(NetworkError::line(entity, "impedance must be non-negative"));
            }
        }

        let mut seen_pairs = HashMap::with_capacity(lines.len());
        let mut built = Vec::with_capacity(lines.len());
        for (l, rec) in lines.iter().enumerate() {
            if rec.from == rec.to {
                return Err(NetworkError::InvalidTopology(format!(
                    "line {} connects node {} to itself",
                    l, rec.from
                )));
            }
            let from_idx = *index.get(&rec.from).ok_or_else(|| {
                NetworkError::InvalidTopology(format!(
                    "line {}-{} references unknown node {}",
                    rec.from, rec.to, rec.from
                ))
            })?;
            let to_idx = *index.get(&rec.to).ok_or_else(|| {
                NetworkError::InvalidTopology(format!(
                    "line {}-{} references unknown node {}",
                    rec.from, rec.to, rec.to
                ))
            })?;
            if seen_pairs.insert((rec.from, rec.to), l).is_some() {
                return Err(NetworkError::InvalidTopology(format!(
                    "duplicate line {}-{}",
                    rec.from, rec.to
                )));
            }
            built.push(Line {
                id: LineId::new(l),
                from: rec.from,
                to: rec.to,
                from_idx,
                to_idx,
                r: rec.r,
                x: rec.x,
                rm: rec.r.to_kiloohms(),
                xm: rec.x.to_kiloohms(),
            });
        }

        // ====================================================================
        // RADIALITY
        // ====================================================================
        //
        // A union that finds both ends already joined closes a cycle.

        let mut uf = UnionFind::<usize>::new(nodes.len());
        for line in &built {
            if !uf.union(line.from_idx, line.to_idx) {
                return Err(NetworkError::InvalidTopology(format!(
                    "line {} closes a cycle; feeder must be radial",
                    line.label()
                )));
            }
        }
        let labels = uf.into_labeling();

        let mut slack_count: HashMap<usize, usize> = HashMap::new();
        for (i, rec) in nodes.iter().enumerate() {
            let count = slack_count.entry(labels[i]).or_insert(0);
            if rec.bus_type.is_slack() {
                *count += 1;
            }
        }
        for (i, rec) in nodes.iter().enumerate() {
            match slack_count.get(&labels[i]).copied().unwrap_or(0) {
                0 => {
                    return Err(NetworkError::InvalidTopology(format!(
                        "node {} is in a component without a slack node",
                        rec.id
                    )))
                }
                1 => {}
                n => {
                    return Err(NetworkError::InvalidTopology(format!(
                        "node {} is in a component with {} slack nodes; exactly one is required",
                        rec.id, n
                    )))
                }
            }
        }

        // Dense component numbering in order of first appearance.
        let mut dense: HashMap<usize, usize> = HashMap::new();
        let component = labels
            .iter()
            .map(|label| {
                let next = dense.len();
                *dense.entry(*label).or_insert(next)
            })
            .collect();

        // ====================================================================
        // ADJACENCY
        // ====================================================================

        let mut incoming = vec![Vec::new(); nodes.len()];
        let mut outgoing = vec![Vec::new(); nodes.len()];
        let mut graph = UnGraph::<NodeId, LineId>::with_capacity(nodes.len(), built.len());
        let handles: Vec<NodeIndex> = nodes.iter().map(|n| graph.add_node(n.id)).collect();
        for line in &built {
            outgoing[line.from_idx].push(line.id.value());
            incoming[line.to_idx].push(line.id.value());
            graph.add_edge(handles[line.from_idx], handles[line.to_idx], line.id);
        }

        let nodes: Vec<Node> = nodes
            .into_iter()
            .map(|rec| Node {
                id: rec.id,
                bus_type: rec.bus_type,
                pd: rec.pd,
                qd: rec.qd,
            })
            .collect();

        debug!(
            nodes = nodes.len(),
            lines = built.len(),
            components = dense.len(),
            vnom_kv = limits.vnom.value(),
            "feeder validated"
        );

        Ok(Self {
            nodes,
            lines: built,
            limits,
            index,
            incoming,
            outgoing,
            component,
            graph,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn limits(&self) -> &VoltageLimits {
        &self.limits
    }

    /// Position of a node id in [`nodes`](Self::nodes).
    pub fn node_index(&self, id: NodeId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Lines whose `to` end is the node at `idx`.
    pub fn incoming(&self, idx: usize) -> &[usize] {
        &self.incoming[idx]
    }

    /// Lines whose `from` end is the node at `idx`.
    pub fn outgoing(&self, idx: usize) -> &[usize] {
        &self.outgoing[idx]
    }

    /// Component number of every node, dense and in order of first appearance.
    pub fn components(&self) -> &[usize] {
        &self.component
    }

    pub fn component_count(&self) -> usize {
        connected_components(&self.graph)
    }

    pub fn slack_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.bus_type.is_slack())
    }

    pub fn total_demand(&self) -> (Kilowatts, Kilovars) {
        (
            self.nodes.iter().map(|n| n.pd).sum(),
            self.nodes.iter().map(|n| n.qd).sum(),
        )
    }

    pub fn graph(&self) -> &UnGraph<NodeId, LineId> {
        &self.graph
    }

    /// Advisory findings that do not prevent building a model.
    pub fn diagnostics(&self) -> Diagnostics {
        let mut diag = Diagnostics::new();
        for line in &self.lines {
            if line.is_zero_impedance() {
                diag.add_warning_with_entity(
                    "physical",
                    "zero impedance; endpoints will share one voltage",
                    &format!("line {}", line.label()),
                );
            }
        }
        for (i, node) in self.nodes.iter().enumerate() {
            let degree = self.incoming[i].len() + self.outgoing[i].len();
            if node.bus_type.is_slack() && degree == 0 {
                diag.add_warning_with_entity(
                    "topology",
                    "slack node has no lines",
                    &format!("node {}", node.id),
                );
            }
            if node.bus_type == BusType::Load && (node.pd.value() < 0.0 || node.qd.value() < 0.0)
            {
                diag.add_warning_with_entity(
                    "physical",
                    "negative demand treated as local generation",
                    &format!("node {}", node.id),
                );
            }
        }
        diag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: usize, bus_type: BusType, pd: f64, qd: f64) -> NodeRecord {
        NodeRecord::new(NodeId::new(id), bus_type, Kilowatts(pd), Kilovars(qd))
    }

    fn line(from: usize, to: usize, r: f64, x: f64) -> LineRecord {
        LineRecord::new(NodeId::new(from), NodeId::new(to), Ohms(r), Ohms(x))
    }

    fn limits() -> VoltageLimits {
        VoltageLimits::from_base_kv(Kilovolts(11.0))
    }

    #[test]
    fn voltage_window_from_base() {
        let lim = limits();
        assert!((lim.vnom.value() - 6.350852961085883).abs() < 1e-12);
        assert!((lim.vmin.value() - 0.8 * lim.vnom.value()).abs() < 1e-12);
        assert!((lim.vmax.value() - 1.05 * lim.vnom.value()).abs() < 1e-12);
    }

    #[test]
    fn rejects_inverted_factors() {
        assert!(VoltageLimits::with_factors(Kilovolts(11.0), 1.1, 1.05).is_err());
        assert!(VoltageLimits::with_factors(Kilovolts(0.0), 0.9, 1.1).is_err());
        assert!(VoltageLimits::with_factors(Kilovolts(11.0), 0.9, 1.1).is_ok());
    }

    #[test]
    fn builds_adjacency() {
        let feeder = Feeder::from_records(
            vec![
                node(1, BusType::Slack, 0.0, 0.0),
                node(2, BusType::Load, 10.0, 5.0),
                node(3, BusType::Load, 4.0, 1.0),
            ],
            vec![line(1, 2, 1.0, 0.5), line(2, 3, 2.0, 1.0)],
            limits(),
        )
        .unwrap();
        assert_eq!(feeder.incoming(1), &[0]);
        assert_eq!(feeder.outgoing(1), &[1]);
        assert!(feeder.incoming(0).is_empty());
        assert_eq!(feeder.component_count(), 1);
        assert_eq!(feeder.slack_nodes().count(), 1);
        assert_eq!(feeder.node_index(NodeId::new(3)), Some(2));
    }

    #[test]
    fn rejects_empty_feeder() {
        let err = Feeder::from_records(vec![], vec![], limits()).unwrap_err();
        assert_eq!(
            err,
            NetworkError::InvalidTopology("feeder has no nodes".into())
        );
    }

    #[test]
    fn rejects_duplicate_node() {
        let err = Feeder::from_records(
            vec![node(1, BusType::Slack, 0.0, 0.0), node(1, BusType::Load, 1.0, 0.0)],
            vec![],
            limits(),
        )
        .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidTopology(_)));
    }

    #[test]
    fn rejects_unknown_endpoint() {
        let err = Feeder::from_records(
            vec![node(1, BusType::Slack, 0.0, 0.0)],
            vec![line(1, 9, 1.0, 1.0)],
            limits(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown node 9"));
    }

    #[test]
    fn rejects_negative_resistance() {
        let err = Feeder::from_records(
            vec![node(1, BusType::Slack, 0.0, 0.0), node(2, BusType::Load, 1.0, 0.0)],
            vec![line(1, 2, -1.0, 1.0)],
            limits(),
        )
        .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidLineData { .. }));
    }

    #[test]
    fn rejects_self_loop() {
        let err = Feeder::from_records(
            vec![node(1, BusType::Slack, 0.0, 0.0), node(2, BusType::Load, 1.0, 0.0)],
            vec![line(1, 2, 1.0, 0.5), line(2, 2, 1.0, 0.5)],
            limits(),
        )
        .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidTopology(_)));
        assert!(err.to_string().contains("connects node 2 to itself"));
    }

    #[test]
    fn rejects_duplicate_directed_pair() {
        let err = Feeder::from_records(
            vec![node(1, BusType::Slack, 0.0, 0.0), node(2, BusType::Load, 1.0, 0.0)],
            vec![line(1, 2, 1.0, 0.5), line(1, 2, 2.0, 1.0)],
            limits(),
        )
        .unwrap_err();
        assert_eq!(err, NetworkError::InvalidTopology("duplicate line 1-2".into()));
    }

    #[test]
    fn rejects_reversed_pair_as_cycle() {
        let err = Feeder::from_records(
            vec![node(1, BusType::Slack, 0.0, 0.0), node(2, BusType::Load, 1.0, 0.0)],
            vec![line(1, 2, 1.0, 0.5), line(2, 1, 1.0, 0.5)],
            limits(),
        )
        .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidTopology(_)));
        assert!(err.to_string().contains("closes a cycle"));
    }

    #[test]
    fn rejects_invalid_voltage_limits() {
        let nodes = || vec![node(1, BusType::Slack, 0.0, 0.0)];
        for base in [0.0, -11.0, f64::NAN] {
            let err = Feeder::from_records(
                nodes(),
                vec![],
                VoltageLimits::from_base_kv(Kilovolts(base)),
            )
            .unwrap_err();
            assert!(matches!(err, NetworkError::InvalidConfig(_)), "{base}");
        }

        let mut inverted = limits();
        inverted.vmin = Kilovolts(7.0);
        let err = Feeder::from_records(nodes(), vec![], inverted).unwrap_err();
        assert!(err.to_string().contains("vmin <= vnom <= vmax"));
        assert!(limits().validate().is_ok());
    }

    #[test]
    fn rejects_two_slacks_in_one_component() {
        let err = Feeder::from_records(
            vec![
                node(1, BusType::Slack, 0.0, 0.0),
                node(2, BusType::Load, 50.0, 20.0),
                node(3, BusType::Slack, 0.0, 0.0),
            ],
            vec![line(1, 2, 1.0, 0.5), line(2, 3, 2.0, 1.0)],
            limits(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("2 slack nodes"));
    }

    #[test]
    fn accepts_one_slack_per_component() {
        let feeder = Feeder::from_records(
            vec![
                node(1, BusType::Slack, 0.0, 0.0),
                node(2, BusType::Load, 10.0, 5.0),
                node(3, BusType::Slack, 0.0, 0.0),
                node(4, BusType::Load, 20.0, 5.0),
            ],
            vec![line(1, 2, 1.0, 0.5), line(3, 4, 1.0, 1.0)],
            limits(),
        )
        .unwrap();
        assert_eq!(feeder.component_count(), 2);
        assert_eq!(feeder.components(), &[0, 0, 1, 1]);
    }

    #[test]
    fn diagnostics_flag_zero_impedance() {
        let feeder = Feeder::from_records(
            vec![
                node(1, BusType::Slack, 0.0, 0.0),
                node(2, BusType::Load, 0.0, 0.0),
                node(3, BusType::Load, 30.0, 10.0),
            ],
            vec![line(1, 2, 1.0, 0.5), line(2, 3, 0.0, 0.0)],
            limits(),
        )
        .unwrap();
        let diag = feeder.diagnostics();
        assert_eq!(diag.warning_count(), 1);
        assert_eq!(diag.issues[0].entity.as_deref(), Some("line 2-3"));
    }
}
