//! Solver backend implementations.

mod interior_point;
mod penalty_lbfgs;

pub use interior_point::InteriorPointBackend;
pub use penalty_lbfgs::PenaltyLbfgsBackend;
