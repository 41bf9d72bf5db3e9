//! One solve attempt as an explicit state machine.
//!
//! ```text
//! Built ──solve──► Solving ──┬──► Solved(OpfReport)
//!                            └──► Failed(SolveError)
//! ```
//!
//! `solve` consumes the run, so a run cannot be solved twice and there is
//! no partially solved state.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use super::problem::DistFlowProblem;
use super::results::OpfReport;
use super::traits::{NlpBackend, SolverConfig};
use crate::error::SolveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Built,
    Solving,
    Solved,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Built => write!(f, "built"),
            RunState::Solving => write!(f, "solving"),
            RunState::Solved => write!(f, "solved"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal state of an [`OpfRun`].
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Solved(OpfReport),
    Failed(SolveError),
}

impl RunOutcome {
    pub fn state(&self) -> RunState {
        match self {
            RunOutcome::Solved(_) => RunState::Solved,
            RunOutcome::Failed(_) => RunState::Failed,
        }
    }

    pub fn is_solved(&self) -> bool {
        matches!(self, RunOutcome::Solved(_))
    }

    pub fn into_result(self) -> Result<OpfReport, SolveError> {
        match self {
            RunOutcome::Solved(report) => Ok(report),
            RunOutcome::Failed(err) => Err(err),
        }
    }
}

/// A built problem waiting to be solved.
#[derive(Debug, Clone)]
pub struct OpfRun {
    problem: DistFlowProblem,
    state: RunState,
}

impl OpfRun {
    pub fn new(problem: DistFlowProblem) -> Self {
        info!(
            nodes = problem.feeder().node_count(),
            lines = problem.feeder().line_count(),
            state = %RunState::Built,
            "opf run created"
        );
        Self {
            problem,
            state: RunState::Built,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn problem(&self) -> &DistFlowProblem {
        &self.problem
    }

    /// Hand the problem to a backend and record the terminal state.
    pub fn solve(mut self, backend: &dyn NlpBackend, config: &SolverConfig) -> RunOutcome {
        self.state = RunState::Solving;
        info!(backend = backend.id(), state = %self.state, "opf run started");

        match backend.solve(&self.problem, config) {
            Ok(solution) => {
                let report = OpfReport::extract(&self.problem, &solution);
                info!(
                    backend = backend.id(),
                    iterations = report.iterations,
                    losses_kw = report.total_losses.value(),
                    state = %RunState::Solved,
                    "opf run solved"
                );
                RunOutcome::Solved(report)
            }
            Err(err) => {
                warn!(
                    backend = backend.id(),
                    kind = err.kind(),
                    error = %err,
                    state = %RunState::Failed,
                    "opf run failed"
                );
                RunOutcome::Failed(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opf::types::NlpSolution;
    use distflow_core::{
        BusType, Feeder, Kilovars, Kilovolts, Kilowatts, NodeId, NodeRecord, VoltageLimits,
    };

    struct Refuses;

    impl NlpBackend for Refuses {
        fn id(&self) -> &str {
            "refuses"
        }

        fn solve(
            &self,
            _problem: &DistFlowProblem,
            _config: &SolverConfig,
        ) -> Result<NlpSolution, SolveError> {
            Err(SolveError::Unbounded)
        }
    }

    fn problem() -> DistFlowProblem {
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
        DistFlowProblem::build(feeder).unwrap()
    }

    #[test]
    fn new_run_is_built() {
        assert_eq!(OpfRun::new(problem()).state(), RunState::Built);
    }

    #[test]
    fn backend_error_is_surfaced_verbatim() {
        let outcome = OpfRun::new(problem()).solve(&Refuses, &SolverConfig::default());
        assert_eq!(outcome.state(), RunState::Failed);
        assert_eq!(outcome.into_result(), Err(SolveError::Unbounded));
    }
}
