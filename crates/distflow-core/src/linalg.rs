use anyhow::{anyhow, Result};
use faer::{prelude::*, solvers::PartialPivLu, Mat};

/// Trait for solving dense linear systems (Ax = b).
///
/// This is linear algebra only; nonlinear solver backends live in
/// `distflow_algo::opf::backends`.
pub trait LinearSystemBackend: Send + Sync {
    /// Solve the linear system Ax = b
    fn solve(&self, matrix: &[Vec<f64>], rhs: &[f64]) -> Result<Vec<f64>>;
}

/// Dense LU with partial pivoting from `faer`.
///
/// `faer` does not report singularity; it returns non-finite entries or a
/// solution that does not reproduce `b`. Both are mapped to an error so the
/// caller can regularize and retry.
#[derive(Debug, Clone)]
pub struct FaerSolver {
    /// Relative residual ‖Ax − b‖∞ / (‖A‖∞‖x‖∞ + ‖b‖∞) above which the
    /// factorization is treated as singular
    pub residual_tolerance: f64,
}

impl Default for FaerSolver {
    fn default() -> Self {
        Self {
            residual_tolerance: 1e-8,
        }
    }
}

impl LinearSystemBackend for FaerSolver {
    fn solve(&self, matrix: &[Vec<f64>], rhs: &[f64]) -> Result<Vec<f64>> {
        let n = matrix.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        if rhs.len() != n {
            return Err(anyhow!(
                "rhs length ({}) does not match matrix dimension {}",
                rhs.len(),
                n
            ));
        }
        if matrix.iter().any(|row| row.len() != n) {
            return Err(anyhow!("matrix must be square"));
        }

        let mat = Mat::from_fn(n, n, |i, j| matrix[i][j]);
        let rhs_mat = Mat::from_fn(n, 1, |i, _| rhs[i]);
        let lu = PartialPivLu::new(mat.as_ref());
        let sol = lu.solve(&rhs_mat);

        let mut solution = Vec::with_capacity(n);
        for i in 0..n {
            solution.push(sol.read(i, 0));
        }
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(anyhow!("singular matrix"));
        }

        let a_norm = matrix
            .iter()
            .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
            .fold(0.0, f64::max);
        let x_norm = solution.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let b_norm = rhs.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let residual = matrix
            .iter()
            .zip(rhs)
            .map(|(row, b)| {
                let ax: f64 = row.iter().zip(&solution).map(|(a, x)| a * x).sum();
                (ax - b).abs()
            })
            .fold(0.0, f64::max);
        let scale = a_norm * x_norm + b_norm;
        if scale > 0.0 && residual > self.residual_tolerance * scale {
            return Err(anyhow!(
                "singular matrix (relative residual {:.2e})",
                residual / scale
            ));
        }

        Ok(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_small_system() {
        let a = vec![vec![4.0, 1.0, 0.0], vec![1.0, 3.0, 1.0], vec![0.0, 1.0, 2.0]];
        let x_true = [1.0, -2.0, 3.0];
        let b: Vec<f64> = a
            .iter()
            .map(|row| row.iter().zip(&x_true).map(|(a, x)| a * x).sum())
            .collect();
        let x = FaerSolver::default().solve(&a, &b).unwrap();
        for (got, want) in x.iter().zip(&x_true) {
            assert!((got - want).abs() < 1e-12, "got {got}, want {want}");
        }
    }

    #[test]
    fn saddle_point_system_with_zero_block() {
        // [H Jᵀ; J 0] with H = I, J = [1 1]
        let k = vec![
            vec![1.0, 0.0, 1.0],
            vec![0.0, 1.0, 1.0],
            vec![1.0, 1.0, 0.0],
        ];
        let x = FaerSolver::default().solve(&k, &[0.0, 0.0, 2.0]).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 1.0).abs() < 1e-12);
        assert!((x[2] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn singular_matrix_is_an_error() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(FaerSolver::default().solve(&a, &[1.0, 1.0]).is_err());
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let a = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        assert!(FaerSolver::default().solve(&a, &[1.0]).is_err());
    }
}
