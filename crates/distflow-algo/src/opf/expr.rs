//! Sparse polynomial expressions over model variables.
//!
//! Every DistFlow equation is a short sum of monomials in at most two
//! variables with small integer powers:
//!
//! ```text
//! balance:   P_in − P_out − RM·I² + PS − PD          (degree 2)
//! drop:      V_i² − 2RM·P − 2XM·Q − Z²·I² − V_j²       (degree 2)
//! current:   I²·V_j² − P² − Q²                         (degree 4)
//! ```
//!
//! Keeping them as data gives exact first and second derivatives for free,
//! and lets the problem be printed, compared and checked for dangling
//! variable references.

use serde::Serialize;

/// Index of a variable in the full (fixed + free) variable vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VarId(usize);

impl VarId {
    #[inline]
    pub fn new(value: usize) -> Self {
        VarId(value)
    }
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// `coeff · Π x_i^p_i`, each variable appearing at most once.
#[derive(Debug, Clone, PartialEq)]
pub struct Monomial {
    pub coeff: f64,
    pub factors: Vec<(VarId, u8)>,
}

impl Monomial {
    fn value(&self, x: &[f64]) -> f64 {
        self.factors
            .iter()
            .fold(self.coeff, |acc, (v, p)| acc * x[v.index()].powi(*p as i32))
    }

    /// Product of every factor except those at positions `skip_a`/`skip_b`.
    fn rest(&self, x: &[f64], skip_a: usize, skip_b: usize) -> f64 {
        self.factors
            .iter()
            .enumerate()
            .filter(|(c, _)| *c != skip_a && *c != skip_b)
            .fold(1.0, |acc, (_, (v, p))| acc * x[v.index()].powi(*p as i32))
    }
}

/// `constant + Σ monomials`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polynomial {
    pub terms: Vec<Monomial>,
    pub constant: f64,
}

impl Polynomial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `coeff · Π factors`. Zero coefficients are kept so that the
    /// structure of an equation does not depend on parameter values.
    pub fn term(mut self, coeff: f64, factors: &[(VarId, u8)]) -> Self {
        self.terms.push(Monomial {
            coeff,
            factors: factors.to_vec(),
        });
        self
    }

    pub fn linear(self, coeff: f64, var: VarId) -> Self {
        self.term(coeff, &[(var, 1)])
    }

    pub fn square(self, coeff: f64, var: VarId) -> Self {
        self.term(coeff, &[(var, 2)])
    }

    pub fn with_constant(mut self, constant: f64) -> Self {
        self.constant = constant;
        self
    }

    /// All variables mentioned, in term order (may repeat).
    pub fn variables(&self) -> impl Iterator<Item = VarId> + '_ {
        self.terms
            .iter()
            .flat_map(|t| t.factors.iter().map(|(v, _)| *v))
    }

    pub fn evaluate(&self, x: &[f64]) -> f64 {
        self.terms
            .iter()
            .fold(self.constant, |acc, t| acc + t.value(x))
    }

    /// `grad[i] += weight · ∂p/∂x_i` over the full variable vector.
    pub fn accumulate_gradient(&self, x: &[f64], weight: f64, grad: &mut [f64]) {
        for t in &self.terms {
            for (a, (v, p)) in t.factors.iter().enumerate() {
                let p = *p as i32;
                let d = t.coeff * p as f64 * x[v.index()].powi(p - 1) * t.rest(x, a, a);
                grad[v.index()] += weight * d;
            }
        }
    }

    /// `hess[pos(i)][pos(j)] += weight · ∂²p/∂x_i∂x_j` for free variables.
    ///
    /// `pos` maps a full variable index to its position among the free
    /// variables; fixed variables map to `None` and are skipped.
    pub fn accumulate_hessian(
        &self,
        x: &[f64],
        weight: f64,
        pos: &[Option<usize>],
        hess: &mut [Vec<f64>],
    ) {
        for t in &self.terms {
            for (a, (vi, pi)) in t.factors.iter().enumerate() {
                let Some(row) = pos[vi.index()] else { continue };
                let pi = *pi as i32;
                for (b, (vj, pj)) in t.factors.iter().enumerate() {
                    let Some(col) = pos[vj.index()] else { continue };
                    let pj = *pj as i32;
                    let d = if a == b {
                        if pi < 2 {
                            continue;
                        }
                        t.coeff * (pi * (pi - 1)) as f64 * x[vi.index()].powi(pi - 2)
                    } else {
                        t.coeff
                            * pi as f64
                            * x[vi.index()].powi(pi - 1)
                            * pj as f64
                            * x[vj.index()].powi(pj - 1)
                    };
                    hess[row][col] += weight * d * t.rest(x, a, b);
                }
            }
        }
    }

    /// Human-readable form, e.g. `V[1]^2 - 0.002*P[1-2] - V[2]^2`.
    pub fn render(&self, name: impl Fn(VarId) -> String) -> String {
        let mut out = String::new();
        for (k, t) in self.terms.iter().enumerate() {
            let (sign, mag) = if t.coeff < 0.0 {
                ("-", -t.coeff)
            } else {
                ("+", t.coeff)
            };
            if k == 0 {
                if sign == "-" {
                    out.push('-');
                }
            } else {
                out.push_str(&format!(" {sign} "));
            }
            if mag != 1.0 {
                out.push_str(&format!("{mag}*"));
            }
            let body: Vec<String> = t
                .factors
                .iter()
                .map(|(v, p)| {
                    if *p == 1 {
                        name(*v)
                    } else {
                        format!("{}^{}", name(*v), p)
                    }
                })
                .collect();
            out.push_str(&body.join("*"));
        }
        if self.constant != 0.0 || self.terms.is_empty() {
            if self.terms.is_empty() {
                out.push_str(&format!("{}", self.constant));
            } else if self.constant < 0.0 {
                out.push_str(&format!(" - {}", -self.constant));
            } else {
                out.push_str(&format!(" + {}", self.constant));
            }
        }
        out
    }
}
