//! Decision variables and their fixing classification.
//!
//! One `(P, Q, I)` triple per line and one `(V, PS, QS)` triple per node,
//! laid out contiguously:
//!
//! ```text
//! ┌────────┬────────┬────────┬────────┬────────┬────────┐
//! │ P (L)  │ Q (L)  │ I (L)  │ V (N)  │ PS (N) │ QS (N) │
//! └────────┴────────┴────────┴────────┴────────┴────────┘
//! ```
//!
//! Fixing is decided once, from the bus type, and stored next to each
//! variable as [`Fixing`]; nothing downstream mutates it.
//!
//! | Node  | V                       | PS, QS          |
//! |-------|-------------------------|-----------------|
//! | Slack | `FixedAt(Vnom)`         | `Free`          |
//! | Load  | `Free` in [Vmin, Vmax]  | `FixedAt(0.0)`  |

use std::fmt;

use distflow_core::{BusType, Feeder, LineId, NodeId};
use serde::Serialize;

use super::expr::VarId;
use crate::error::DistFlowError;

/// Which physical quantity a variable carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VarKind {
    ActiveFlow { line: LineId },
    ReactiveFlow { line: LineId },
    Current { line: LineId },
    Voltage { node: NodeId },
    SlackActive { node: NodeId },
    SlackReactive { node: NodeId },
}

/// Whether a variable is a decision variable or a substituted constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Fixing {
    Free,
    FixedAt(f64),
}

impl Fixing {
    pub fn is_fixed(&self) -> bool {
        matches!(self, Fixing::FixedAt(_))
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Fixing::Free => None,
            Fixing::FixedAt(v) => Some(*v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    pub id: VarId,
    pub name: String,
    pub kind: VarKind,
    pub fixing: Fixing,
    /// Neutral starting value: 0 for flows, current and injections, Vnom for
    /// voltage
    pub initial: f64,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl Variable {
    /// Value used when the variable is fixed, otherwise the initial value.
    pub fn start_value(&self) -> f64 {
        self.fixing.value().unwrap_or(self.initial)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lo = self.lower.map_or("-inf".to_string(), |v| format!("{v:.6}"));
        let hi = self.upper.map_or("+inf".to_string(), |v| format!("{v:.6}"));
        match self.fixing {
            Fixing::FixedAt(v) => write!(f, "{:<12} fixed  {:>12.6}", self.name, v),
            Fixing::Free => write!(
                f,
                "{:<12} free   {:>12.6}  [{}, {}]",
                self.name, self.initial, lo, hi
            ),
        }
    }
}

/// All variables of one model instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableSpace {
    vars: Vec<Variable>,
    n_lines: usize,
    n_nodes: usize,
}

impl VariableSpace {
    /// Allocate every variable and apply the fixing rules.
    pub fn build(feeder: &Feeder) -> Result<Self, DistFlowError> {
        let n_lines = feeder.line_count();
        let n_nodes = feeder.node_count();
        let limits = feeder.limits();
        let vnom = limits.vnom.value();

        let mut vars = Vec::with_capacity(3 * (n_lines + n_nodes));
        let mut push = |name: String, kind: VarKind, fixing, initial, lower, upper| {
            let id = VarId::new(vars.len());
            vars.push(Variable {
                id,
                name,
                kind,
                fixing,
                initial,
                lower,
                upper,
            });
        };

        for line in feeder.lines() {
            push(
                format!("P[{}]", line.label()),
                VarKind::ActiveFlow { line: line.id },
                Fixing::Free,
                0.0,
                None,
                None,
            );
        }
        for line in feeder.lines() {
            push(
                format!("Q[{}]", line.label()),
                VarKind::ReactiveFlow { line: line.id },
                Fixing::Free,
                0.0,
                None,
                None,
            );
        }
        for line in feeder.lines() {
            push(
                format!("I[{}]", line.label()),
                VarKind::Current { line: line.id },
                Fixing::Free,
                0.0,
                Some(0.0),
                None,
            );
        }

        // Fixing is derived per node before any node variable is allocated,
        // so a node without a rule fails the whole build.
        let mut rules = Vec::with_capacity(n_nodes);
        for node in feeder.nodes() {
            if !node.pd.is_finite() || !node.qd.is_finite() {
                return Err(DistFlowError::InvalidNodeData {
                    node: node.id,
                    reason: "demand is not a finite number".to_string(),
                });
            }
            let rule = match node.bus_type {
                BusType::Slack => (Fixing::FixedAt(vnom), Fixing::Free),
                BusType::Load => (Fixing::Free, Fixing::FixedAt(0.0)),
            };
            rules.push(rule);
        }

        for (node, (v_fix, _)) in feeder.nodes().iter().zip(&rules) {
            push(
                format!("V[{}]", node.id),
                VarKind::Voltage { node: node.id },
                *v_fix,
                vnom,
                Some(limits.vmin.value()),
                Some(limits.vmax.value()),
            );
        }
        for (node, (_, s_fix)) in feeder.nodes().iter().zip(&rules) {
            push(
                format!("PS[{}]", node.id),
                VarKind::SlackActive { node: node.id },
                *s_fix,
                0.0,
                None,
                None,
            );
        }
        for (node, (_, s_fix)) in feeder.nodes().iter().zip(&rules) {
            push(
                format!("QS[{}]", node.id),
                VarKind::SlackReactive { node: node.id },
                *s_fix,
                0.0,
                None,
                None,
            );
        }

        Ok(Self {
            vars,
            n_lines,
            n_nodes,
        })
    }

    pub fn p(&self, line: usize) -> VarId {
        VarId::new(line)
    }

    pub fn q(&self, line: usize) -> VarId {
        VarId::new(self.n_lines + line)
    }

    pub fn i(&self, line: usize) -> VarId {
        VarId::new(2 * self.n_lines + line)
    }

    pub fn v(&self, node: usize) -> VarId {
        VarId::new(3 * self.n_lines + node)
    }

    pub fn ps(&self, node: usize) -> VarId {
        VarId::new(3 * self.n_lines + self.n_nodes + node)
    }

    pub fn qs(&self, node: usize) -> VarId {
        VarId::new(3 * self.n_lines + 2 * self.n_nodes + node)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn contains(&self, id: VarId) -> bool {
        id.index() < self.vars.len()
    }

    pub fn get(&self, id: VarId) -> Option<&Variable> {
        self.vars.get(id.index())
    }

    pub fn name(&self, id: VarId) -> String {
        self.get(id)
            .map(|v| v.name.clone())
            .unwrap_or_else(|| format!("x[{}]", id.index()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter()
    }

    pub fn kind(&self, id: VarId) -> Option<VarKind> {
        self.get(id).map(|v| v.kind)
    }

    pub fn fixing(&self, id: VarId) -> Option<Fixing> {
        self.get(id).map(|v| v.fixing)
    }

    pub fn initial(&self, id: VarId) -> Option<f64> {
        self.get(id).map(|v| v.initial)
    }

    /// `(lower, upper)`; `None` on a side means unbounded.
    pub fn bounds(&self, id: VarId) -> Option<(Option<f64>, Option<f64>)> {
        self.get(id).map(|v| (v.lower, v.upper))
    }

    pub fn free_count(&self) -> usize {
        self.vars.iter().filter(|v| !v.fixing.is_fixed()).count()
    }

    /// Ids of the free variables, in layout order. Position `a` in this list
    /// is the solver-side index of the variable.
    pub fn free_ids(&self) -> Vec<VarId> {
        self.vars
            .iter()
            .filter(|v| !v.fixing.is_fixed())
            .map(|v| v.id)
            .collect()
    }

    /// Full starting vector with fixed values substituted.
    pub fn start_values(&self) -> Vec<f64> {
        self.vars.iter().map(Variable::start_value).collect()
    }

    /// Full vector from free values (in [`free_ids`](Self::free_ids) order);
    /// fixed variables take their fixed value.
    pub fn expand(&self, free_values: &[f64]) -> Vec<f64> {
        let mut free = free_values.iter();
        self.vars
            .iter()
            .map(|v| match v.fixing {
                Fixing::FixedAt(value) => value,
                Fixing::Free => free.next().copied().unwrap_or(v.initial),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distflow_core::{
        Kilovars, Kilovolts, Kilowatts, LineRecord, NodeRecord, Ohms, VoltageLimits,
    };

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

    #[test]
    fn layout_and_fixing() {
        let feeder = two_node();
        let space = VariableSpace::build(&feeder).unwrap();
        let vnom = feeder.limits().vnom.value();
        assert_eq!(space.len(), 9);
        assert_eq!(space.free_count(), 6);

        let v1 = space.get(space.v(0)).unwrap();
        assert_eq!(v1.fixing, Fixing::FixedAt(vnom));
        let v2 = space.get(space.v(1)).unwrap();
        assert_eq!(v2.fixing, Fixing::Free);
        assert_eq!(v2.initial, vnom);
        assert!((v2.lower.unwrap() - 0.8 * vnom).abs() < 1e-12);

        assert_eq!(space.get(space.ps(0)).unwrap().fixing, Fixing::Free);
        assert_eq!(space.get(space.ps(1)).unwrap().fixing, Fixing::FixedAt(0.0));
        assert_eq!(space.get(space.qs(1)).unwrap().fixing, Fixing::FixedAt(0.0));

        let i = space.get(space.i(0)).unwrap();
        assert_eq!(i.lower, Some(0.0));
        assert_eq!(i.upper, None);
        assert_eq!(i.name, "I[1-2]");
    }

    #[test]
    fn start_values_are_neutral() {
        let feeder = two_node();
        let space = VariableSpace::build(&feeder).unwrap();
        let vnom = feeder.limits().vnom.value();
        let x0 = space.start_values();
        assert_eq!(&x0[..3], &[0.0, 0.0, 0.0]);
        assert_eq!(&x0[3..5], &[vnom, vnom]);
        assert_eq!(&x0[5..], &[0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn expand_substitutes_fixed_values() {
        let feeder = two_node();
        let space = VariableSpace::build(&feeder).unwrap();
        let vnom = feeder.limits().vnom.value();
        let free = space.free_ids();
        assert_eq!(free.len(), 6);
        assert_eq!(free[3], space.v(1));
        assert_eq!(space.kind(free[3]), Some(VarKind::Voltage { node: NodeId::new(2) }));
        assert_eq!(space.bounds(space.ps(0)), Some((None, None)));
        assert_eq!(space.initial(space.v(0)), Some(vnom));

        let x = space.expand(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(x, vec![1.0, 2.0, 3.0, vnom, 4.0, 5.0, 0.0, 6.0, 0.0]);
    }

    #[test]
    fn unknown_id_is_not_contained() {
        let space = VariableSpace::build(&two_node()).unwrap();
        assert!(space.contains(VarId::new(8)));
        assert!(!space.contains(VarId::new(9)));
        assert_eq!(space.name(VarId::new(42)), "x[42]");
    }
}
