use serde::Serialize;

/// Raw result of a backend solve.
///
/// `values` is indexed like the [`VariableSpace`](super::VariableSpace),
/// with fixed variables at their fixed values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NlpSolution {
    pub values: Vec<f64>,
    pub objective: f64,
    pub iterations: usize,
    /// Largest absolute equality residual at `values`
    pub max_violation: f64,
    pub solve_time_ms: u128,
    pub backend: String,
    /// Equality multipliers in constraint order, when the backend has them
    pub multipliers: Option<Vec<f64>>,
}
