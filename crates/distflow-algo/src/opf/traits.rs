//! Backend seam for the nonlinear program.
//!
//! The model is built once into a [`DistFlowProblem`]; any type implementing
//! [`NlpBackend`] can then be asked to solve it. Backends only see the
//! problem and a [`SolverConfig`], never the CSV tables or the CLI.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::backends::{InteriorPointBackend, PenaltyLbfgsBackend};
use super::problem::DistFlowProblem;
use super::types::NlpSolution;
use crate::error::SolveError;

/// Configuration passed to backend solvers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Maximum iterations
    pub max_iterations: usize,
    /// Convergence tolerance on constraint residuals and stationarity
    pub tolerance: f64,
    /// Timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-6,
            timeout_seconds: 300,
        }
    }
}

/// Implements the actual solving.
///
/// A backend must return one of the [`SolveError`] variants instead of a
/// partial solution when it cannot reach the tolerance.
pub trait NlpBackend: Send + Sync {
    /// Unique identifier (e.g., "interior-point", "penalty-lbfgs")
    fn id(&self) -> &str;

    /// Check if this backend is available at runtime
    fn is_available(&self) -> bool {
        true
    }

    /// Solve the problem. The returned values cover the full variable
    /// vector, fixed entries included.
    fn solve(
        &self,
        problem: &DistFlowProblem,
        config: &SolverConfig,
    ) -> Result<NlpSolution, SolveError>;
}

/// Backends selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    InteriorPoint,
    PenaltyLbfgs,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::InteriorPoint => "interior-point",
            BackendKind::PenaltyLbfgs => "penalty-lbfgs",
        }
    }

    pub fn build(&self) -> Box<dyn NlpBackend> {
        match self {
            BackendKind::InteriorPoint => Box::new(InteriorPointBackend::new()),
            BackendKind::PenaltyLbfgs => Box::new(PenaltyLbfgsBackend::new()),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "interior-point" | "ipm" => Ok(BackendKind::InteriorPoint),
            "penalty-lbfgs" | "lbfgs" => Ok(BackendKind::PenaltyLbfgs),
            other => Err(format!(
                "unknown backend '{other}' (expected interior-point or penalty-lbfgs)"
            )),
        }
    }
}
