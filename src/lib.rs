//! # factor-gn
//!
//! Gauss-Newton nonlinear least-squares optimization over factor graphs, for pose-graph
//! style problems.
//!
//! A problem is a [`NonlinearFactorGraph`] of factors over named variables, together with
//! an initial assignment of [`Values`]. The [`GaussNewtonOptimizer`] linearizes the graph,
//! solves the resulting sparse linear system by variable elimination, and retracts the
//! step onto each variable's manifold. Optimizer states are immutable: every iteration
//! returns a new state and shares the graph and configuration with the old one.
//!
//! ## Features
//!
//! - **Variable elimination**: multifrontal (Bayes tree of cliques) or sequential
//!   (Bayes net), with a minimum-degree ordering when none is given
//! - **Per-step factorization**: LDL, QR or Cholesky on small dense blocks
//! - **Manifolds**: Rⁿ, SO(2) and SE(2) variables
//! - **Diagnostics**: verbosity-gated `tracing` output and a driver that records
//!   per-iteration statistics
//!
//! ## Cargo features
//!
//! - `logging` (default): [`init_logger`]
//! - `cli` (default): the `optimize_pose_chain` binary, pulling in `clap` and `rand`
//! - `parallel` (default): factor evaluation and linearization on rayon

pub mod core;
pub mod error;
pub mod factors;
pub mod linalg;
#[cfg(feature = "logging")]
pub mod logger;
pub mod manifold;
pub mod optimizer;

pub use core::{graph::NonlinearFactorGraph, values::Values, variable::Variable};
pub use error::{SolverError, SolverResult};
pub use factors::{BetweenFactor, Factor, PriorFactor};
pub use linalg::{EliminationAlgorithm, FactorizationMethod, Ordering};
#[cfg(feature = "logging")]
pub use logger::{init_logger, init_logger_with_level};
pub use optimizer::{
    GaussNewtonConfig, GaussNewtonOptimizer, NonlinearOptimizer, OptimizationStatus, optimize,
};
