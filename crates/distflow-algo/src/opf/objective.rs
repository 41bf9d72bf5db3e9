use distflow_core::Feeder;

use super::expr::Polynomial;
use super::variables::VariableSpace;

/// Total active loss, `Σ RM·I²` in kW.
#[derive(Debug, Clone, PartialEq)]
pub struct LossObjective {
    pub expr: Polynomial,
}

impl LossObjective {
    pub fn build(feeder: &Feeder, vars: &VariableSpace) -> Self {
        let expr = feeder
            .lines()
            .iter()
            .enumerate()
            .fold(Polynomial::new(), |p, (l, line)| {
                p.square(line.rm.value(), vars.i(l))
            });
        Self { expr }
    }

    pub fn evaluate(&self, x: &[f64]) -> f64 {
        self.expr.evaluate(x)
    }
}
