//! # Augmented-Lagrangian Backend with L-BFGS
//!
//! Converts the constrained program into a sequence of unconstrained ones:
//!
//! ```text
//! Φ(z) = f(z) + Σ λ_k·c̃_k(z) + ρ/2·Σ c̃_k(z)² + ρ/2·Σ (bound excess)²
//! ```
//!
//! where `c̃_k = s_k·c_k` rescales every row by the inverse largest entry of
//! its Jacobian row at the start point. Each subproblem is minimized with
//! argmin's L-BFGS (More-Thuente line search, memory 7) and then the
//! multipliers move by `λ ← λ + ρ·c̃`. ρ starts at 10 and grows tenfold
//! whenever a round fails to cut the scaled violation by a factor of four.
//!
//! The iteration starts from a lossless flat start: every line carries the
//! demand downstream of it at nominal voltage, so the first subproblem is
//! already close to the physics.
//!
//! The method produces no multipliers for the report, so results built from
//! it have no marginal-loss columns. It is a pure-Rust fallback;
//! [`InteriorPointBackend`](super::InteriorPointBackend) is the default.

use argmin::core::{ArgminError, CostFunction, Executor, Gradient, State};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use tracing::{debug, warn};
use web_time::Instant;

use crate::error::SolveError;
use crate::opf::nlp::ReducedNlp;
use crate::opf::problem::DistFlowProblem;
use crate::opf::traits::{NlpBackend, SolverConfig};
use crate::opf::types::NlpSolution;

const INITIAL_PENALTY: f64 = 10.0;
const PENALTY_INCREASE: f64 = 10.0;
/// Required shrink of the scaled violation per round before ρ grows
const SUFFICIENT_DECREASE: f64 = 0.25;
const MAX_ROUNDS: usize = 30;
const LBFGS_MEMORY: usize = 7;
/// Subproblem gradient tolerance relative to the constraint tolerance
const GRADIENT_TOLERANCE: f64 = 1e-2;

#[derive(Debug, Clone, Copy, Default)]
pub struct PenaltyLbfgsBackend;

impl PenaltyLbfgsBackend {
    pub fn new() -> Self {
        Self
    }
}

struct AugmentedLagrangian<'a, 'p> {
    nlp: &'a ReducedNlp<'p>,
    scale: &'a [f64],
    lambda: &'a [f64],
    penalty: f64,
}

impl AugmentedLagrangian<'_, '_> {
    /// L-BFGS hands a non-finite trial point to the line search when its
    /// curvature pair degenerates; refusing it ends the subproblem.
    fn expand_finite(&self, z: &[f64]) -> Result<Vec<f64>, argmin::core::Error> {
        if z.iter().any(|v| !v.is_finite()) {
            return Err(ArgminError::ConditionViolated {
                text: "non-finite iterate".to_string(),
            }
            .into());
        }
        Ok(self.nlp.expand(z))
    }
}

impl CostFunction for AugmentedLagrangian<'_, '_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, z: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let x = self.expand_finite(z)?;
        let mut cost = self.nlp.objective(&x);
        for ((c, s), l) in self.nlp.constraints(&x).iter().zip(self.scale).zip(self.lambda) {
            let scaled = s * c;
            cost += l * scaled + 0.5 * self.penalty * scaled * scaled;
        }
        for (a, &za) in z.iter().enumerate() {
            let below = (self.nlp.lower[a] - za).max(0.0);
            let above = (za - self.nlp.upper[a]).max(0.0);
            cost += 0.5 * self.penalty * (below * below + above * above);
        }
        Ok(cost)
    }
}

impl Gradient for AugmentedLagrangian<'_, '_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    /// `∇f + Σ s_k·(λ_k + ρ·c̃_k)·∇c_k + ρ·(bound excess)`
    fn gradient(&self, z: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
        let x = self.expand_finite(z)?;
        let mut grad = self.nlp.gradient(&x);
        let c = self.nlp.constraints(&x);
        let jac = self.nlp.jacobian(&x);
        for (k, row) in jac.iter().enumerate() {
            let weight = self.scale[k] * (self.lambda[k] + self.penalty * self.scale[k] * c[k]);
            for (g, j) in grad.iter_mut().zip(row) {
                *g += weight * j;
            }
        }
        for (a, &za) in z.iter().enumerate() {
            let below = (self.nlp.lower[a] - za).max(0.0);
            let above = (za - self.nlp.upper[a]).max(0.0);
            grad[a] += self.penalty * (above - below);
        }
        Ok(grad)
    }
}

impl NlpBackend for PenaltyLbfgsBackend {
    fn id(&self) -> &str {
        "penalty-lbfgs"
    }

    fn solve(
        &self,
        problem: &DistFlowProblem,
        config: &SolverConfig,
    ) -> Result<NlpSolution, SolveError> {
        let start = Instant::now();
        let nlp = ReducedNlp::new(problem);
        let tol = config.tolerance;

        let mut z = nlp.restrict(&flat_start(problem));
        project_onto_bounds(&mut z, &nlp.lower, &nlp.upper);
        let scale = row_scaling(&nlp, &z);

        let mut lambda = vec![0.0; nlp.m()];
        let mut penalty = INITIAL_PENALTY;
        let mut total_iterations = 0;
        let mut violation = max_violation(&nlp, &z);
        let mut previous = f64::INFINITY;
        let mut timed_out = false;

        for round in 0..MAX_ROUNDS {
            if violation < tol || total_iterations >= config.max_iterations {
                break;
            }
            if config.timeout_seconds > 0 && start.elapsed().as_secs() >= config.timeout_seconds {
                timed_out = true;
                break;
            }

            let subproblem = AugmentedLagrangian {
                nlp: &nlp,
                scale: &scale,
                lambda: &lambda,
                penalty,
            };
            let solver = LBFGS::new(MoreThuenteLineSearch::new(), LBFGS_MEMORY)
                .with_tolerance_grad((tol * GRADIENT_TOLERANCE).max(0.0))
                .and_then(|solver| solver.with_tolerance_cost(0.0))
                .map_err(|err| {
                    warn!(%err, "invalid L-BFGS configuration");
                    SolveError::DidNotConverge {
                        iterations: total_iterations,
                        residual: violation,
                    }
                })?;
            let budget = (config.max_iterations - total_iterations) as u64;
            let executor = Executor::new(subproblem, solver)
                .configure(|state| state.param(z.clone()).max_iters(budget));

            match executor.run() {
                Ok(res) => {
                    total_iterations += res.state().get_iter() as usize;
                    if let Some(best) = res.state().get_best_param() {
                        z = best.clone();
                    }
                }
                Err(err) => {
                    debug!(round, %err, "L-BFGS subproblem failed");
                    break;
                }
            }

            let x = nlp.expand(&z);
            let scaled: Vec<f64> = nlp
                .constraints(&x)
                .iter()
                .zip(&scale)
                .map(|(c, s)| s * c)
                .collect();
            let scaled_violation = scaled.iter().fold(0.0, |m: f64, c| m.max(c.abs()));
            violation = max_violation(&nlp, &z);
            debug!(round, penalty, scaled_violation, violation, "augmented-Lagrangian round finished");

            for (l, c) in lambda.iter_mut().zip(&scaled) {
                *l += penalty * c;
            }
            if scaled_violation > SUFFICIENT_DECREASE * previous {
                penalty *= PENALTY_INCREASE;
            }
            previous = scaled_violation;
        }

        project_onto_bounds(&mut z, &nlp.lower, &nlp.upper);
        if z.iter().any(|v| !v.is_finite()) {
            return Err(SolveError::Unbounded);
        }
        let x = nlp.expand(&z);
        let violation = max_violation(&nlp, &z);

        // Rounding after projection leaves a small residual; accept within 10x.
        if violation >= tol * 10.0 {
            warn!(violation, iterations = total_iterations, "augmented Lagrangian did not reach tolerance");
            if !timed_out && total_iterations >= config.max_iterations {
                return Err(SolveError::IterationLimitExceeded {
                    iterations: total_iterations,
                    residual: violation,
                });
            }
            return Err(SolveError::DidNotConverge {
                iterations: total_iterations,
                residual: violation,
            });
        }

        Ok(NlpSolution {
            objective: nlp.objective(&x),
            values: x,
            iterations: total_iterations,
            max_violation: violation,
            solve_time_ms: start.elapsed().as_millis(),
            backend: self.id().to_string(),
            multipliers: None,
        })
    }
}

/// Lossless power flow at nominal voltage, as a full variable vector.
///
/// Lines carry the demand of every node behind them (negative when the line
/// points towards the slack); slack nodes supply their own demand plus their
/// net outflow. Fixed variables keep their fixed values.
fn flat_start(problem: &DistFlowProblem) -> Vec<f64> {
    let feeder = problem.feeder();
    let vars = problem.variables();
    let lines = feeder.lines();
    let mut x = vars.start_values();

    // (line, upstream node, +1 when the line points away from the slack)
    let mut parent: Vec<Option<(usize, usize, f64)>> = vec![None; feeder.node_count()];
    let mut visited: Vec<bool> = feeder.nodes().iter().map(|n| n.bus_type.is_slack()).collect();
    let mut stack: Vec<usize> = (0..feeder.node_count()).filter(|&k| visited[k]).collect();
    while let Some(u) = stack.pop() {
        let down = feeder.outgoing(u).iter().map(|&l| (l, lines[l].to_idx, 1.0));
        let up = feeder.incoming(u).iter().map(|&l| (l, lines[l].from_idx, -1.0));
        for (l, w, sign) in down.chain(up) {
            if !visited[w] {
                visited[w] = true;
                parent[w] = Some((l, u, sign));
                stack.push(w);
            }
        }
    }

    let mut p = vec![0.0; lines.len()];
    let mut q = vec![0.0; lines.len()];
    for (k, node) in feeder.nodes().iter().enumerate() {
        let mut u = k;
        while let Some((l, upstream, sign)) = parent[u] {
            p[l] += sign * node.pd.value();
            q[l] += sign * node.qd.value();
            u = upstream;
        }
    }

    let vnom = feeder.limits().vnom.value();
    for l in 0..lines.len() {
        x[vars.p(l).index()] = p[l];
        x[vars.q(l).index()] = q[l];
        x[vars.i(l).index()] = p[l].hypot(q[l]) / vnom;
    }
    for (k, node) in feeder.nodes().iter().enumerate() {
        if !node.bus_type.is_slack() {
            continue;
        }
        let net = |flows: &[f64]| {
            feeder.outgoing(k).iter().map(|&l| flows[l]).sum::<f64>()
                - feeder.incoming(k).iter().map(|&l| flows[l]).sum::<f64>()
        };
        x[vars.ps(k).index()] = node.pd.value() + net(&p);
        x[vars.qs(k).index()] = node.qd.value() + net(&q);
    }
    x
}

/// `1 / max(1, ‖∇c_k‖∞)` for every constraint row at `z`.
fn row_scaling(nlp: &ReducedNlp<'_>, z: &[f64]) -> Vec<f64> {
    nlp.jacobian(&nlp.expand(z))
        .iter()
        .map(|row| 1.0 / row.iter().fold(1.0, |m: f64, j| m.max(j.abs())))
        .collect()
}

fn max_violation(nlp: &ReducedNlp<'_>, z: &[f64]) -> f64 {
    nlp.constraints(&nlp.expand(z))
        .iter()
        .fold(0.0, |m, c| m.max(c.abs()))
}

fn project_onto_bounds(z: &mut [f64], lower: &[f64], upper: &[f64]) {
    for ((v, &lo), &hi) in z.iter_mut().zip(lower).zip(upper) {
        *v = v.clamp(lo, hi);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distflow_core::{
        BusType, Feeder, Kilovars, Kilovolts, Kilowatts, LineRecord, NodeId, NodeRecord, Ohms,
        VoltageLimits,
    };

    fn two_node(pd: f64, qd: f64) -> DistFlowProblem {
        let feeder = Feeder::from_records(
            vec![
                NodeRecord::new(NodeId::new(1), BusType::Slack, Kilowatts(0.0), Kilovars(0.0)),
                NodeRecord::new(NodeId::new(2), BusType::Load, Kilowatts(pd), Kilovars(qd)),
            ],
            vec![LineRecord::new(NodeId::new(1), NodeId::new(2), Ohms(1.0), Ohms(0.5))],
            VoltageLimits::from_base_kv(Kilovolts(11.0)),
        )
        .unwrap();
        DistFlowProblem::build(feeder).unwrap()
    }

    #[test]
    fn test_penalty_backend_id() {
        let backend = PenaltyLbfgsBackend::new();
        assert_eq!(backend.id(), "penalty-lbfgs");
        assert!(backend.is_available());
    }

    #[test]
    fn test_projection_respects_open_bounds() {
        let mut z = vec![-1.0, 10.0, 3.0];
        project_onto_bounds(
            &mut z,
            &[0.0, f64::NEG_INFINITY, 1.0],
            &[f64::INFINITY, 5.0, 2.0],
        );
        assert_eq!(z, vec![0.0, 5.0, 2.0]);
    }

    #[test]
    fn test_flat_start_follows_reversed_lines() {
        // 2 -> 1 <- slack direction reversed on the first line
        let feeder = Feeder::from_records(
            vec![
                NodeRecord::new(NodeId::new(1), BusType::Slack, Kilowatts(0.0), Kilovars(0.0)),
                NodeRecord::new(NodeId::new(2), BusType::Load, Kilowatts(10.0), Kilovars(5.0)),
                NodeRecord::new(NodeId::new(3), BusType::Load, Kilowatts(4.0), Kilovars(2.0)),
            ],
            vec![
                LineRecord::new(NodeId::new(2), NodeId::new(1), Ohms(1.0), Ohms(0.5)),
                LineRecord::new(NodeId::new(2), NodeId::new(3), Ohms(1.0), Ohms(0.5)),
            ],
            VoltageLimits::from_base_kv(Kilovolts(11.0)),
        )
        .unwrap();
        let problem = DistFlowProblem::build(feeder).unwrap();
        let vars = problem.variables();
        let x = flat_start(&problem);
        assert_eq!(x[vars.p(0).index()], -14.0);
        assert_eq!(x[vars.q(0).index()], -7.0);
        assert_eq!(x[vars.p(1).index()], 4.0);
        assert_eq!(x[vars.ps(0).index()], 14.0);
        assert_eq!(x[vars.qs(0).index()], 7.0);
        let vnom = problem.feeder().limits().vnom.value();
        assert!((x[vars.i(0).index()] - 14f64.hypot(7.0) / vnom).abs() < 1e-12);
        // load injections stay fixed
        assert_eq!(x[vars.ps(1).index()], 0.0);
    }

    #[test]
    fn test_row_scaling_caps_at_one() {
        let problem = two_node(10.0, 5.0);
        let nlp = ReducedNlp::new(&problem);
        let z = nlp.restrict(&flat_start(&problem));
        let scale = row_scaling(&nlp, &z);
        assert_eq!(scale.len(), nlp.m());
        assert!(scale.iter().all(|&s| s > 0.0 && s <= 1.0));
        // the current definition row is dominated by 2·I·V²
        let current_row = scale[scale.len() - 1];
        assert!(current_row < 0.1, "{current_row}");
    }

    #[test]
    fn test_light_two_node_case_converges() {
        let problem = two_node(10.0, 5.0);
        let config = SolverConfig {
            max_iterations: 2000,
            tolerance: 1e-4,
            timeout_seconds: 60,
        };
        let sol = PenaltyLbfgsBackend::new().solve(&problem, &config).unwrap();
        let vars = problem.variables();
        let v2 = sol.values[vars.v(1).index()];
        assert!((v2 - 6.34888).abs() < 1e-3, "V2 = {v2}");
        assert!(sol.max_violation < 1e-3);
        assert!(sol.multipliers.is_none());
    }

    #[test]
    fn test_isolated_slack_solves_without_multipliers() {
        // A lone slack node: the balances force PS = QS = 0.
        let feeder = Feeder::from_records(
            vec![NodeRecord::new(
                NodeId::new(1),
                BusType::Slack,
                Kilowatts(0.0),
                Kilovars(0.0),
            )],
            vec![],
            VoltageLimits::from_base_kv(Kilovolts(11.0)),
        )
        .unwrap();
        let problem = DistFlowProblem::build(feeder).unwrap();
        let sol = PenaltyLbfgsBackend::new()
            .solve(&problem, &SolverConfig::default())
            .unwrap();
        assert!(sol.multipliers.is_none());
        assert!(sol.max_violation < 1e-5);
        assert_eq!(sol.iterations, 0);
    }
}
