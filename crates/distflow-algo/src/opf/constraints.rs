//! DistFlow equality constraints.
//!
//! Losses are attributed at the sending end: a line's `RM·I²` and `XM·I²`
//! are subtracted from the balance of its `from` node only, so each loss
//! appears once in the system.
//!
//! ```text
//! node k (active):    Σ_(j,k) P_jk − Σ_(k,i) (P_ki + RM_ki·I_ki²) + PS_k − PD_k = 0
//! node k (reactive):  Σ_(j,k) Q_jk − Σ_(k,i) (Q_ki + XM_ki·I_ki²) + QS_k − QD_k = 0
//! line (i,j) drop:    V_i² − 2(RM·P + XM·Q) − (RM² + XM²)·I² − V_j² = 0
//! line (i,j) current: I²·V_j² − P² − Q² = 0
//! ```
//!
//! The current equation is the non-convex one; it is kept exact rather than
//! relaxed to `I²V² ≥ P² + Q²`.
//!
//! Operating limits (`I ≥ 0`, `Vmin ≤ V ≤ Vmax`) are variable bounds held by
//! the [`VariableSpace`].

use std::fmt;

use distflow_core::{Feeder, LineId, NodeId};
use serde::Serialize;

use super::expr::Polynomial;
use super::variables::VariableSpace;
use crate::error::DistFlowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintKind {
    ActiveBalance { node: NodeId },
    ReactiveBalance { node: NodeId },
    VoltageDrop { line: LineId },
    CurrentDefinition { line: LineId },
}

/// `expr == 0`
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub name: String,
    pub expr: Polynomial,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConstraintSystem {
    constraints: Vec<Constraint>,
}

impl ConstraintSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every balance, voltage-drop and current-definition constraint.
    ///
    /// Order: for each node, active then reactive balance; then for each
    /// line, voltage drop then current definition.
    pub fn build(feeder: &Feeder, vars: &VariableSpace) -> Result<Self, DistFlowError> {
        let lines = feeder.lines();
        let mut system = Self::new();

        for (k, node) in feeder.nodes().iter().enumerate() {
            let mut active = Polynomial::new();
            let mut reactive = Polynomial::new();
            for &l in feeder.incoming(k) {
                active = active.linear(1.0, vars.p(l));
                reactive = reactive.linear(1.0, vars.q(l));
            }
            for &l in feeder.outgoing(k) {
                let line = &lines[l];
                active = active
                    .linear(-1.0, vars.p(l))
                    .square(-line.rm.value(), vars.i(l));
                reactive = reactive
                    .linear(-1.0, vars.q(l))
                    .square(-line.xm.value(), vars.i(l));
            }
            active = active
                .linear(1.0, vars.ps(k))
                .with_constant(-node.pd.value());
            reactive = reactive
                .linear(1.0, vars.qs(k))
                .with_constant(-node.qd.value());

            system.push(
                Constraint {
                    kind: ConstraintKind::ActiveBalance { node: node.id },
                    name: format!("active_balance[{}]", node.id),
                    expr: active,
                },
                vars,
            )?;
            system.push(
                Constraint {
                    kind: ConstraintKind::ReactiveBalance { node: node.id },
                    name: format!("reactive_balance[{}]", node.id),
                    expr: reactive,
                },
                vars,
            )?;
        }

        for (l, line) in lines.iter().enumerate() {
            let rm = line.rm.value();
            let xm = line.xm.value();
            let vi = vars.v(line.from_idx);
            let vj = vars.v(line.to_idx);

            let drop = Polynomial::new()
                .square(1.0, vi)
                .linear(-2.0 * rm, vars.p(l))
                .linear(-2.0 * xm, vars.q(l))
                .square(-(rm * rm + xm * xm), vars.i(l))
                .square(-1.0, vj);
            system.push(
                Constraint {
                    kind: ConstraintKind::VoltageDrop { line: line.id },
                    name: format!("voltage_drop[{}]", line.label()),
                    expr: drop,
                },
                vars,
            )?;

            let current = Polynomial::new()
                .term(1.0, &[(vars.i(l), 2), (vj, 2)])
                .square(-1.0, vars.p(l))
                .square(-1.0, vars.q(l));
            system.push(
                Constraint {
                    kind: ConstraintKind::CurrentDefinition { line: line.id },
                    name: format!("define_current[{}]", line.label()),
                    expr: current,
                },
                vars,
            )?;
        }

        Ok(system)
    }

    /// Append a constraint after checking every variable it mentions.
    pub fn push(
        &mut self,
        constraint: Constraint,
        vars: &VariableSpace,
    ) -> Result<(), DistFlowError> {
        if let Some(bad) = constraint.expr.variables().find(|v| !vars.contains(*v)) {
            return Err(DistFlowError::ConstraintReference {
                constraint: constraint.name,
                var: bad.index(),
            });
        }
        self.constraints.push(constraint);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    pub fn get(&self, idx: usize) -> Option<&Constraint> {
        self.constraints.get(idx)
    }

    /// Position of a constraint by kind.
    pub fn position(&self, kind: ConstraintKind) -> Option<usize> {
        self.constraints.iter().position(|c| c.kind == kind)
    }

    /// Residuals `expr(x)` for a full variable vector.
    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        self.constraints.iter().map(|c| c.expr.evaluate(x)).collect()
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintKind::ActiveBalance { node } => write!(f, "active balance at node {node}"),
            ConstraintKind::ReactiveBalance { node } => {
                write!(f, "reactive balance at node {node}")
            }
            ConstraintKind::VoltageDrop { line } => write!(f, "voltage drop on {line}"),
            ConstraintKind::CurrentDefinition { line } => write!(f, "current definition on {line}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opf::expr::VarId;
    use distflow_core::{
        BusType, Kilovars, Kilovolts, Kilowatts, LineRecord, NodeRecord, Ohms, VoltageLimits,
    };

    fn feeder() -> Feeder {
        Feeder::from_records(
            vec![
                NodeRecord::new(NodeId::new(1), BusType::Slack, Kilowatts(0.0), Kilovars(0.0)),
                NodeRecord::new(NodeId::new(2), BusType::Load, Kilowatts(10.0), Kilovars(5.0)),
                NodeRecord::new(NodeId::new(3), BusType::Load, Kilowatts(4.0), Kilovars(2.0)),
            ],
            vec![
                LineRecord::new(NodeId::new(1), NodeId::new(2), Ohms(1.0), Ohms(0.5)),
                LineRecord::new(NodeId::new(2), NodeId::new(3), Ohms(2.0), Ohms(1.0)),
            ],
            VoltageLimits::from_base_kv(Kilovolts(11.0)),
        )
        .unwrap()
    }

    #[test]
    fn constraint_count_and_order() {
        let feeder = feeder();
        let vars = VariableSpace::build(&feeder).unwrap();
        let system = ConstraintSystem::build(&feeder, &vars).unwrap();
        assert_eq!(system.len(), 2 * 3 + 2 * 2);
        assert_eq!(
            system.get(0).unwrap().kind,
            ConstraintKind::ActiveBalance {
                node: NodeId::new(1)
            }
        );
        assert_eq!(
            system.get(1).unwrap().kind,
            ConstraintKind::ReactiveBalance {
                node: NodeId::new(1)
            }
        );
        assert_eq!(
            system.get(6).unwrap().kind,
            ConstraintKind::VoltageDrop {
                line: LineId::new(0)
            }
        );
        assert_eq!(system.get(9).unwrap().name, "define_current[2-3]");
    }

    #[test]
    fn loss_attributed_at_sending_end() {
        let feeder = feeder();
        let vars = VariableSpace::build(&feeder).unwrap();
        let system = ConstraintSystem::build(&feeder, &vars).unwrap();

        // Only I on line 1-2 nonzero: node 1 (sender) sees −RM·I², node 2 does not.
        let mut x = vars.start_values();
        x[vars.i(0).index()] = 10.0;
        let r = system.residuals(&x);
        let rm = 0.001;
        assert!((r[0] - (-rm * 100.0)).abs() < 1e-12);
        assert!((r[2] - (-10.0)).abs() < 1e-12);
    }

    #[test]
    fn voltage_drop_is_exact() {
        let feeder = feeder();
        let vars = VariableSpace::build(&feeder).unwrap();
        let system = ConstraintSystem::build(&feeder, &vars).unwrap();
        let mut x = vars.start_values();
        x[vars.v(0).index()] = 6.0;
        x[vars.v(1).index()] = 5.9;
        x[vars.p(0).index()] = 100.0;
        x[vars.q(0).index()] = 50.0;
        x[vars.i(0).index()] = 20.0;
        let (rm, xm) = (0.001, 0.0005);
        let expected =
            36.0 - 2.0 * (rm * 100.0 + xm * 50.0) - (rm * rm + xm * xm) * 400.0 - 5.9 * 5.9;
        let idx = system
            .position(ConstraintKind::VoltageDrop {
                line: LineId::new(0),
            })
            .unwrap();
        assert!((system.residuals(&x)[idx] - expected).abs() < 1e-12);
    }

    #[test]
    fn dangling_variable_is_rejected() {
        let feeder = feeder();
        let vars = VariableSpace::build(&feeder).unwrap();
        let mut system = ConstraintSystem::new();
        let err = system
            .push(
                Constraint {
                    kind: ConstraintKind::VoltageDrop {
                        line: LineId::new(7),
                    },
                    name: "voltage_drop[ghost]".into(),
                    expr: Polynomial::new().square(1.0, VarId::new(vars.len())),
                },
                &vars,
            )
            .unwrap_err();
        assert!(matches!(err, DistFlowError::ConstraintReference { .. }));
        assert!(system.is_empty());
    }
}
