//! Physical quantities read back from a solved program.

use distflow_core::{Amperes, BusType, Kilovars, Kilovolts, Kilowatts, NodeId};
use serde::Serialize;

use super::constraints::ConstraintKind;
use super::problem::DistFlowProblem;
use super::types::NlpSolution;

/// Per-line flows and loss.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineResult {
    pub line: String,
    pub from: NodeId,
    pub to: NodeId,
    pub p: Kilowatts,
    pub q: Kilovars,
    pub current: Amperes,
    /// `RM·I²`
    pub loss: Kilowatts,
}

/// Per-node voltage, injection and demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeResult {
    pub node: NodeId,
    pub bus_type: BusType,
    pub voltage: Kilovolts,
    pub ps: Kilowatts,
    pub qs: Kilovars,
    pub pd: Kilowatts,
    pub qd: Kilovars,
    /// Change in total loss per extra kW of demand at this node
    pub marginal_loss_p: Option<f64>,
    /// Change in total loss per extra kvar of demand at this node
    pub marginal_loss_q: Option<f64>,
}

/// Solved OPF, in physical units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpfReport {
    pub backend: String,
    pub iterations: usize,
    pub solve_time_ms: u128,
    pub total_supply: Kilowatts,
    pub total_supply_reactive: Kilovars,
    pub total_demand: Kilowatts,
    pub total_demand_reactive: Kilovars,
    pub total_losses: Kilowatts,
    pub max_violation: f64,
    pub lines: Vec<LineResult>,
    pub nodes: Vec<NodeResult>,
}

impl OpfReport {
    /// Read a report out of a backend solution.
    ///
    /// Marginal losses come from the balance-row multipliers: with rows
    /// written as `… − PD = 0`, `∂loss/∂PD = −λ`.
    pub fn extract(problem: &DistFlowProblem, solution: &NlpSolution) -> Self {
        let feeder = problem.feeder();
        let vars = problem.variables();
        let constraints = problem.constraints();
        let x = &solution.values;

        let lines = feeder
            .lines()
            .iter()
            .enumerate()
            .map(|(l, line)| {
                let current = x[vars.i(l).index()];
                LineResult {
                    line: line.label(),
                    from: line.from,
                    to: line.to,
                    p: Kilowatts(x[vars.p(l).index()]),
                    q: Kilovars(x[vars.q(l).index()]),
                    current: Amperes(current),
                    loss: Kilowatts(line.rm.value() * current * current),
                }
            })
            .collect::<Vec<_>>();

        let marginal = |kind: ConstraintKind| -> Option<f64> {
            let row = constraints.position(kind)?;
            let lambda = solution.multipliers.as_ref()?.get(row)?;
            Some(-lambda)
        };

        let nodes = feeder
            .nodes()
            .iter()
            .enumerate()
            .map(|(k, node)| NodeResult {
                node: node.id,
                bus_type: node.bus_type,
                voltage: Kilovolts(x[vars.v(k).index()]),
                ps: Kilowatts(x[vars.ps(k).index()]),
                qs: Kilovars(x[vars.qs(k).index()]),
                pd: node.pd,
                qd: node.qd,
                marginal_loss_p: marginal(ConstraintKind::ActiveBalance { node: node.id }),
                marginal_loss_q: marginal(ConstraintKind::ReactiveBalance { node: node.id }),
            })
            .collect::<Vec<_>>();

        let (total_demand, total_demand_reactive) = feeder.total_demand();

        Self {
            backend: solution.backend.clone(),
            iterations: solution.iterations,
            solve_time_ms: solution.solve_time_ms,
            total_supply: nodes.iter().map(|n| n.ps).sum(),
            total_supply_reactive: nodes.iter().map(|n| n.qs).sum(),
            total_demand,
            total_demand_reactive,
            total_losses: Kilowatts(solution.objective),
            max_violation: solution.max_violation,
            lines,
            nodes,
        }
    }

    /// `supply − demand − losses`; zero up to solver tolerance.
    pub fn balance_residual(&self) -> f64 {
        (self.total_supply - self.total_demand - self.total_losses).value()
    }

    /// `[supply, demand, losses]` in kW.
    pub fn summary_triple(&self) -> [f64; 3] {
        [
            self.total_supply.value(),
            self.total_demand.value(),
            self.total_losses.value(),
        ]
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeResult> {
        self.nodes.iter().find(|n| n.node == id)
    }

    pub fn voltage(&self, id: NodeId) -> Option<Kilovolts> {
        self.node(id).map(|n| n.voltage)
    }

    pub fn line(&self, from: NodeId, to: NodeId) -> Option<&LineResult> {
        self.lines.iter().find(|l| l.from == from && l.to == to)
    }
}
