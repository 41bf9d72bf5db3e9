//! Reduced view of a [`DistFlowProblem`] over its free variables only.
//!
//! Fixed variables are substituted by
//! [`VariableSpace::expand`](super::variables::VariableSpace::expand), so the
//! backends work with `z ∈ R^n_free` and never see a slack voltage or a load
//! injection. All derivatives are exact, taken from the polynomial data.

use super::expr::VarId;
use super::problem::DistFlowProblem;

pub(crate) struct ReducedNlp<'a> {
    problem: &'a DistFlowProblem,
    /// Full index of each free variable
    free: Vec<usize>,
    /// Free position of each full index, `None` when fixed
    pos: Vec<Option<usize>>,
    template: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl<'a> ReducedNlp<'a> {
    pub fn new(problem: &'a DistFlowProblem) -> Self {
        let vars = problem.variables();
        let free: Vec<usize> = vars.free_ids().iter().map(|id| id.index()).collect();
        let mut pos = vec![None; vars.len()];
        let mut lower = Vec::with_capacity(free.len());
        let mut upper = Vec::with_capacity(free.len());
        for (a, &i) in free.iter().enumerate() {
            pos[i] = Some(a);
            let (lo, hi) = vars.bounds(VarId::new(i)).unwrap_or((None, None));
            lower.push(lo.unwrap_or(f64::NEG_INFINITY));
            upper.push(hi.unwrap_or(f64::INFINITY));
        }
        Self {
            problem,
            template: vars.start_values(),
            free,
            pos,
            lower,
            upper,
        }
    }

    pub fn n(&self) -> usize {
        self.free.len()
    }

    pub fn m(&self) -> usize {
        self.problem.constraints().len()
    }

    /// Starting point for the free variables.
    pub fn start(&self) -> Vec<f64> {
        self.free.iter().map(|&i| self.template[i]).collect()
    }

    /// Full variable vector with `z` written into the free slots.
    pub fn expand(&self, z: &[f64]) -> Vec<f64> {
        self.problem.variables().expand(z)
    }

    pub fn objective(&self, x: &[f64]) -> f64 {
        self.problem.objective().evaluate(x)
    }

    pub fn constraints(&self, x: &[f64]) -> Vec<f64> {
        self.problem.constraints().residuals(x)
    }

    /// Objective gradient restricted to the free variables.
    pub fn gradient(&self, x: &[f64]) -> Vec<f64> {
        let mut full = vec![0.0; x.len()];
        self.problem
            .objective()
            .expr
            .accumulate_gradient(x, 1.0, &mut full);
        self.restrict(&full)
    }

    /// Dense `m × n` constraint Jacobian over the free variables.
    pub fn jacobian(&self, x: &[f64]) -> Vec<Vec<f64>> {
        let mut full = vec![0.0; x.len()];
        self.problem
            .constraints()
            .iter()
            .map(|c| {
                full.iter_mut().for_each(|v| *v = 0.0);
                c.expr.accumulate_gradient(x, 1.0, &mut full);
                self.restrict(&full)
            })
            .collect()
    }

    /// `∇²f + Σ λ_k ∇²c_k` over the free variables.
    pub fn lagrangian_hessian(&self, x: &[f64], lambda: &[f64]) -> Vec<Vec<f64>> {
        let n = self.n();
        let mut hess = vec![vec![0.0; n]; n];
        self.problem
            .objective()
            .expr
            .accumulate_hessian(x, 1.0, &self.pos, &mut hess);
        for (c, &l) in self.problem.constraints().iter().zip(lambda) {
            if l != 0.0 {
                c.expr.accumulate_hessian(x, l, &self.pos, &mut hess);
            }
        }
        hess
    }

    /// Free-variable slice of a full vector.
    pub fn restrict(&self, full: &[f64]) -> Vec<f64> {
        self.free.iter().map(|&i| full[i]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distflow_core::{
        BusType, Feeder, Kilovars, Kilovolts, Kilowatts, LineRecord, NodeId, NodeRecord, Ohms,
        VoltageLimits,
    };

    fn problem() -> DistFlowProblem {
        let feeder = Feeder::from_records(
            vec![
                NodeRecord::new(NodeId::new(1), BusType::Slack, Kilowatts(0.0), Kilovars(0.0)),
                NodeRecord::new(NodeId::new(2), BusType::Load, Kilowatts(10.0), Kilovars(5.0)),
            ],
            vec![LineRecord::new(NodeId::new(1), NodeId::new(2), Ohms(1.0), Ohms(0.5))],
            VoltageLimits::from_base_kv(Kilovolts(11.0)),
        )
        .unwrap();
        DistFlowProblem::build(feeder).unwrap()
    }

    #[test]
    fn fixed_variables_are_substituted() {
        let problem = problem();
        let nlp = ReducedNlp::new(&problem);
        assert_eq!(nlp.n(), 6);
        assert_eq!(nlp.m(), 6);
        let vnom = problem.feeder().limits().vnom.value();
        let x = nlp.expand(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        // P Q I V1 V2 PS1 PS2 QS1 QS2
        assert_eq!(x, vec![1.0, 2.0, 3.0, vnom, 4.0, 5.0, 0.0, 6.0, 0.0]);
        assert_eq!(nlp.lower[2], 0.0);
        assert!(nlp.upper[2].is_infinite());
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let problem = problem();
        let nlp = ReducedNlp::new(&problem);
        let z = vec![9.0, 4.0, 1.7, 6.2, 10.5, 5.2];
        let jac = nlp.jacobian(&nlp.expand(&z));
        let eps = 1e-6;
        for j in 0..nlp.n() {
            let mut zp = z.clone();
            let mut zm = z.clone();
            zp[j] += eps;
            zm[j] -= eps;
            let cp = nlp.constraints(&nlp.expand(&zp));
            let cm = nlp.constraints(&nlp.expand(&zm));
            for i in 0..nlp.m() {
                let fd = (cp[i] - cm[i]) / (2.0 * eps);
                assert!((fd - jac[i][j]).abs() < 1e-5, "J[{i}][{j}]");
            }
        }
    }
}
