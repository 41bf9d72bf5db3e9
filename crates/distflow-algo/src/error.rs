use distflow_core::{NetworkError, NodeId};
use thiserror::Error;

/// Errors raised while assembling the nonlinear program.
///
/// All of these are detected before a backend is invoked.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DistFlowError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// A node for which no fixing rule applies
    #[error("invalid node data for node {node}: {reason}")]
    InvalidNodeData { node: NodeId, reason: String },

    /// A constraint mentions a variable the variable space does not hold
    #[error("constraint {constraint} references unknown variable #{var}")]
    ConstraintReference { constraint: String, var: usize },
}

/// Solver outcomes other than success.
///
/// Returned verbatim by every backend; never downgraded to a default solution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    /// The iteration stalled, the KKT system became singular, or the time
    /// budget ran out
    #[error("did not converge after {iterations} iterations (residual: {residual:.2e})")]
    DidNotConverge { iterations: usize, residual: f64 },

    /// Iterates were pinned against an operating limit while the physics was
    /// still violated
    #[error("infeasible: {reason} (residual: {residual:.2e})")]
    Infeasible { residual: f64, reason: String },

    #[error("iteration limit of {iterations} reached (residual: {residual:.2e})")]
    IterationLimitExceeded { iterations: usize, residual: f64 },

    /// Iterates diverged or became non-finite
    #[error("problem is unbounded")]
    Unbounded,
}

impl SolveError {
    /// Short label used in logs, manifests and CLI exit messages.
    pub fn kind(&self) -> &'static str {
        match self {
            SolveError::DidNotConverge { .. } => "did-not-converge",
            SolveError::Infeasible { .. } => "infeasible",
            SolveError::IterationLimitExceeded { .. } => "iteration-limit",
            SolveError::Unbounded => "unbounded",
        }
    }
}

/// Top-level error for [`OpfSolver`](crate::OpfSolver).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OpfError {
    #[error("model construction failed: {0}")]
    Build(#[from] DistFlowError),

    #[error("solve failed: {0}")]
    Solve(#[from] SolveError),

    #[error("backend '{0}' is not available")]
    BackendUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solve_error_kinds_are_distinct() {
        let kinds = [
            SolveError::DidNotConverge {
                iterations: 1,
                residual: 1.0,
            }
            .kind(),
            SolveError::Infeasible {
                residual: 1.0,
                reason: "x".into(),
            }
            .kind(),
            SolveError::IterationLimitExceeded {
                iterations: 1,
                residual: 1.0,
            }
            .kind(),
            SolveError::Unbounded.kind(),
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn network_error_wraps_into_build() {
        let err: OpfError = DistFlowError::from(NetworkError::InvalidTopology("cycle".into())).into();
        assert!(matches!(err, OpfError::Build(DistFlowError::Network(_))));
    }
}
