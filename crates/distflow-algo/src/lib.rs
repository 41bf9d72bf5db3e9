//! # distflow-algo: Loss-Minimizing Optimal Power Flow for Radial Feeders
//!
//! Builds the exact branch-flow (DistFlow) nonlinear program for a validated
//! [`distflow_core::Feeder`] and solves it through a pluggable backend.
//!
//! ## Pipeline
//!
//! ```text
//! Feeder ──► VariableSpace ──► ConstraintSystem + LossObjective
//!                 │                        │
//!                 └──────► DistFlowProblem ◄┘   (immutable value)
//!                                │
//!                     OpfRun::solve(backend, config)
//!                                │
//!                 ┌──────────────┴──────────────┐
//!          RunOutcome::Solved(OpfReport)   RunOutcome::Failed(SolveError)
//! ```
//!
//! ## Backends
//!
//! | Backend | Id | Method |
//! |---------|----|--------|
//! | [`InteriorPointBackend`] | `interior-point` | Primal barrier Newton on the KKT system (default) |
//! | [`PenaltyLbfgsBackend`] | `penalty-lbfgs` | Augmented Lagrangian + argmin L-BFGS |
//!
//! ## Example
//!
//! ```rust
//! use distflow_algo::{BackendKind, OpfSolver};
//! use distflow_core::*;
//!
//! let feeder = Feeder::from_records(
//!     vec![
//!         NodeRecord::new(NodeId::new(1), BusType::Slack, Kilowatts(0.0), Kilovars(0.0)),
//!         NodeRecord::new(NodeId::new(2), BusType::Load, Kilowatts(10.0), Kilovars(5.0)),
//!     ],
//!     vec![LineRecord::new(NodeId::new(1), NodeId::new(2), Ohms(1.0), Ohms(0.5))],
//!     VoltageLimits::from_base_kv(Kilovolts(11.0)),
//! )?;
//!
//! let report = OpfSolver::new()
//!     .with_backend(BackendKind::InteriorPoint)
//!     .with_tolerance(1e-6)
//!     .solve(feeder)?;
//! println!("losses: {}", report.total_losses);
//! let v2 = report.voltage(NodeId::new(2)).map(|v| v.value());
//! assert!(v2.is_some_and(|v| (v - 6.34888).abs() < 1e-4));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod opf;

pub use error::{DistFlowError, OpfError, SolveError};
pub use opf::backends::{InteriorPointBackend, PenaltyLbfgsBackend};
pub use opf::{
    BackendKind, ConstraintKind, ConstraintSystem, DistFlowProblem, Fixing, LineResult,
    LossObjective, NlpBackend, NlpSolution, NodeResult, OpfReport, OpfRun, OpfSolver,
    RunOutcome, RunState, SolverConfig, VarId, VarKind, VariableSpace,
};
