//! The assembled nonlinear program as one immutable value.
//!
//! ```text
//! minimize    Σ RM·I²
//! subject to  balance / drop / current equalities   (ConstraintSystem)
//!             I ≥ 0,  Vmin ≤ V ≤ Vmax               (variable bounds)
//!             fixed variables substituted            (Fixing)
//! ```
//!
//! A [`DistFlowProblem`] owns its feeder, so it can be moved into a worker
//! thread and solved without sharing anything.

use std::fmt;

use distflow_core::Feeder;
use tracing::debug;

use super::constraints::ConstraintSystem;
use super::objective::LossObjective;
use super::variables::VariableSpace;
use crate::error::DistFlowError;

#[derive(Debug, Clone, PartialEq)]
pub struct DistFlowProblem {
    feeder: Feeder,
    variables: VariableSpace,
    constraints: ConstraintSystem,
    objective: LossObjective,
}

impl DistFlowProblem {
    /// Build variables, constraints and objective from a validated feeder.
    pub fn build(feeder: Feeder) -> Result<Self, DistFlowError> {
        let variables = VariableSpace::build(&feeder)?;
        let constraints = ConstraintSystem::build(&feeder, &variables)?;
        let objective = LossObjective::build(&feeder, &variables);
        debug!(
            variables = variables.len(),
            free = variables.free_count(),
            constraints = constraints.len(),
            "distflow problem built"
        );
        Ok(Self {
            feeder,
            variables,
            constraints,
            objective,
        })
    }

    pub fn feeder(&self) -> &Feeder {
        &self.feeder
    }

    pub fn variables(&self) -> &VariableSpace {
        &self.variables
    }

    pub fn constraints(&self) -> &ConstraintSystem {
        &self.constraints
    }

    pub fn objective(&self) -> &LossObjective {
        &self.objective
    }

    /// Largest absolute equality residual at a full variable vector.
    pub fn max_violation(&self, x: &[f64]) -> f64 {
        self.constraints
            .residuals(x)
            .iter()
            .fold(0.0, |m, r| m.max(r.abs()))
    }

    /// Full model listing: sets, parameters, variables and constraints.
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DistFlowProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let limits = self.feeder.limits();
        writeln!(f, "2 Set Declarations")?;
        writeln!(f, "    NODES : size={}", self.feeder.node_count())?;
        writeln!(f, "    LINES : size={}", self.feeder.line_count())?;
        writeln!(f)?;

        writeln!(f, "Parameters")?;
        writeln!(f, "    Vnom : {:.6}", limits.vnom.value())?;
        writeln!(f, "    Vmin : {:.6}", limits.vmin.value())?;
        writeln!(f, "    Vmax : {:.6}", limits.vmax.value())?;
        for node in self.feeder.nodes() {
            writeln!(
                f,
                "    node {:>4} : Tb={} PD={} QD={}",
                node.id,
                node.bus_type.code(),
                node.pd.value(),
                node.qd.value()
            )?;
        }
        for line in self.feeder.lines() {
            writeln!(
                f,
                "    line {:>9} : RM={} XM={}",
                line.label(),
                line.rm.value(),
                line.xm.value()
            )?;
        }
        writeln!(f)?;

        writeln!(
            f,
            "{} Var Declarations ({} free)",
            self.variables.len(),
            self.variables.free_count()
        )?;
        for var in self.variables.iter() {
            writeln!(f, "    {var}")?;
        }
        writeln!(f)?;

        let name = |id| self.variables.name(id);
        writeln!(f, "1 Objective Declarations")?;
        writeln!(f, "    obj : minimize : {}", self.objective.expr.render(name))?;
        writeln!(f)?;

        writeln!(f, "{} Constraint Declarations", self.constraints.len())?;
        for c in self.constraints.iter() {
            writeln!(f, "    {} : {} == 0", c.name, c.expr.render(name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distflow_core::{
        BusType, Kilovars, Kilovolts, Kilowatts, LineRecord, NodeId, NodeRecord, Ohms,
        VoltageLimits,
    };

    fn feeder() -> Feeder {
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
    fn identical_inputs_build_identical_problems() {
        let a = DistFlowProblem::build(feeder()).unwrap();
        let b = DistFlowProblem::build(feeder()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.variables().start_values(), b.variables().start_values());
    }

    #[test]
    fn summary_lists_every_declaration() {
        let problem = DistFlowProblem::build(feeder()).unwrap();
        let text = problem.summary();
        assert!(text.contains("NODES : size=2"));
        assert!(text.contains("9 Var Declarations (6 free)"));
        assert!(text.contains("obj : minimize : 0.001*I[1-2]^2"));
        assert!(text.contains("define_current[1-2] : I[1-2]^2*V[2]^2 - P[1-2]^2 - Q[1-2]^2 == 0"));
    }
}
