//! Loss-minimizing optimal power flow on radial feeders.
//!
//! The model is assembled bottom-up (variables, then constraints and the
//! loss objective) into a [`DistFlowProblem`], then handed to an
//! [`NlpBackend`] through an [`OpfRun`].

pub mod backends;
mod constraints;
mod expr;
mod export;
mod nlp;
mod objective;
mod problem;
mod results;
mod run;
mod traits;
mod types;
mod variables;

pub use constraints::{Constraint, ConstraintKind, ConstraintSystem};
pub use expr::{Monomial, Polynomial, VarId};
pub use objective::LossObjective;
pub use problem::DistFlowProblem;
pub use results::{LineResult, NodeResult, OpfReport};
pub use run::{OpfRun, RunOutcome, RunState};
pub use traits::{BackendKind, NlpBackend, SolverConfig};
pub use types::NlpSolution;
pub use variables::{Fixing, VarKind, Variable, VariableSpace};

use crate::OpfError;
use distflow_core::Feeder;

/// Build-and-solve entry point with builder-style configuration
pub struct OpfSolver {
    backend: BackendKind,
    config: SolverConfig,
}

impl OpfSolver {
    /// Create new OPF solver with default settings (interior-point backend)
    pub fn new() -> Self {
        Self {
            backend: BackendKind::default(),
            config: SolverConfig::default(),
        }
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set maximum iterations
    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.config.max_iterations = max_iter;
        self
    }

    /// Set convergence tolerance
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.config.tolerance = tol;
        self
    }

    /// Set the wall-clock budget; 0 disables it
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.config.timeout_seconds = seconds;
        self
    }

    pub fn with_config(mut self, config: SolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Build the problem for `feeder` and solve it
    pub fn solve(&self, feeder: Feeder) -> Result<OpfReport, OpfError> {
        let problem = DistFlowProblem::build(feeder)?;
        self.solve_problem(problem)
    }

    /// Solve an already built problem
    pub fn solve_problem(&self, problem: DistFlowProblem) -> Result<OpfReport, OpfError> {
        let backend = self.backend.build();
        if !backend.is_available() {
            return Err(OpfError::BackendUnavailable(backend.id().to_string()));
        }
        let report = OpfRun::new(problem)
            .solve(backend.as_ref(), &self.config)
            .into_result()?;
        Ok(report)
    }
}

impl Default for OpfSolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_config() {
        let solver = OpfSolver::new()
            .with_backend(BackendKind::PenaltyLbfgs)
            .with_max_iterations(50)
            .with_tolerance(1e-4)
            .with_timeout(0);
        assert_eq!(solver.backend(), BackendKind::PenaltyLbfgs);
        assert_eq!(solver.config().max_iterations, 50);
        assert_eq!(solver.config().tolerance, 1e-4);
        assert_eq!(solver.config().timeout_seconds, 0);
    }
}
