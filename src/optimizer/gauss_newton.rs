//! Gauss-Newton optimization over a nonlinear factor graph.
//!
//! The Gauss-Newton method minimizes
//!
//! ```text
//! f(x) = ½ Σᵢ ‖rᵢ(x)‖²
//! ```
//!
//! by repeatedly replacing each residual with its first-order approximation around the
//! current estimate and solving the resulting linear least-squares problem exactly:
//!
//! ```text
//! δ* = argmin_δ ½ Σᵢ ‖Jᵢ δ + rᵢ‖²
//! x' = x ⊕ δ*
//! ```
//!
//! # One iteration
//!
//! 1. **Linearize** the graph at the current values into a
//!    [`GaussianFactorGraph`](crate::linalg::GaussianFactorGraph)
//! 2. **Order** the variables: the configured ordering if one is given, otherwise a
//!    minimum-degree ordering of the linear system
//! 3. **Eliminate** the linear system in that order, multifrontal or sequential, with LDL,
//!    QR or Cholesky at each step, and back-substitute for `δ*`
//! 4. **Retract** `δ*` onto the values through each variable's manifold
//! 5. **Re-evaluate** the total error at the new values
//!
//! The step is always taken in full. There is no line search, trust region or damping,
//! and an iteration that increases the error is still returned; deciding what to do
//! about it is left to the caller (see [`optimize`](crate::optimizer::optimize)).
//!
//! # Example
//!
//! ```
//! use factor_gn::core::{graph::NonlinearFactorGraph, values::Values};
//! use factor_gn::factors::PriorFactor;
//! use factor_gn::manifold::ManifoldType;
//! use factor_gn::optimizer::{GaussNewtonConfig, GaussNewtonOptimizer, NonlinearOptimizer};
//! use nalgebra::dvector;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = NonlinearFactorGraph::new();
//! graph.add_factor(&["v"], PriorFactor::new(dvector![0.0]));
//!
//! let mut values = Values::new();
//! values.insert("v", ManifoldType::RN, dvector![10.0])?;
//!
//! let optimizer = GaussNewtonOptimizer::new(graph, values, GaussNewtonConfig::new())?;
//! let next = optimizer.iterate()?;
//! assert!(next.error() < 1e-20);
//! assert_eq!(next.iterations(), 1);
//! # Ok(())
//! # }
//! ```

use crate::core::{graph::NonlinearFactorGraph, values::Values};
use crate::error::SolverResult;
use crate::linalg::{
    self, EliminationAlgorithm, FactorizationMethod, Ordering, SparseLinearSystem, VectorValues,
};
use crate::optimizer::{
    NonlinearOptimizer, NonlinearOptimizerConfig, OptimizerResult, OptimizerState,
    StateUpdate, Verbosity,
};
use std::{
    fmt,
    fmt::{Display, Formatter},
    sync::Arc,
};
use tracing::{Level, debug};

/// Configuration parameters for the Gauss-Newton optimizer.
///
/// Built with the `with_*` methods, each of which consumes the config and returns a new
/// one. Once handed to an optimizer a config is shared and never modified.
///
/// # Example
///
/// ```
/// use factor_gn::linalg::{EliminationAlgorithm, FactorizationMethod, Ordering};
/// use factor_gn::optimizer::GaussNewtonConfig;
///
/// let config = GaussNewtonConfig::new()
///     .with_elimination(EliminationAlgorithm::Sequential)
///     .with_factorization(FactorizationMethod::Qr)
///     .with_ordering(Ordering::new(["x1", "x2", "x3"]))
///     .with_max_iterations(20);
/// assert_eq!(config.base().max_iterations, 20);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaussNewtonConfig {
    /// How the linear system is eliminated
    pub elimination: EliminationAlgorithm,
    /// Dense factorization used at each elimination step
    pub factorization: FactorizationMethod,
    /// Elimination ordering; empty means minimum degree, computed at every iteration
    pub ordering: Ordering,
    pub base: NonlinearOptimizerConfig,
}

impl GaussNewtonConfig {
    /// Create a new Gauss-Newton configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_elimination(mut self, elimination: EliminationAlgorithm) -> Self {
        self.elimination = elimination;
        self
    }

    pub fn with_factorization(mut self, factorization: FactorizationMethod) -> Self {
        self.factorization = factorization;
        self
    }

    pub fn with_ordering(mut self, ordering: Ordering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.base.max_iterations = max_iterations;
        self
    }

    pub fn with_relative_error_tol(mut self, relative_error_tol: f64) -> Self {
        self.base.relative_error_tol = relative_error_tol;
        self
    }

    pub fn with_absolute_error_tol(mut self, absolute_error_tol: f64) -> Self {
        self.base.absolute_error_tol = absolute_error_tol;
        self
    }

    pub fn with_error_tol(mut self, error_tol: f64) -> Self {
        self.base.error_tol = error_tol;
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.base.verbosity = verbosity;
        self
    }

    pub fn base(&self) -> &NonlinearOptimizerConfig {
        &self.base
    }

    pub fn validate(&self) -> OptimizerResult<()> {
        self.base.validate()
    }

    /// Print configuration parameters (debug level logging)
    pub fn print_configuration(&self) {
        debug!("\n{}", self);
    }
}

/// The elimination and factorization lines of the configuration print, from raw enum
/// codes. A code that names no variant prints as `(invalid)`.
pub fn describe_methods(elimination_code: u8, factorization_code: u8) -> String {
    format!(
        "         elimination method: {}\n       factorization method: {}",
        EliminationAlgorithm::label_for_code(elimination_code),
        FactorizationMethod::label_for_code(factorization_code)
    )
}

impl Display for GaussNewtonConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "GaussNewtonConfig:")?;
        write!(f, "{}", self.base)?;
        writeln!(
            f,
            "{}",
            describe_methods(self.elimination.code(), self.factorization.code())
        )?;
        if self.ordering.is_empty() {
            write!(f, "                   ordering: <automatic>")
        } else {
            write!(f, "                   ordering: {}", self.ordering)
        }
    }
}

/// Gauss-Newton optimizer state.
///
/// Each value of this type is one immutable step of an optimization. [`iterate`] and
/// [`update`] return new optimizers; the graph and configuration are shared between all
/// of them through `Arc`.
///
/// [`iterate`]: NonlinearOptimizer::iterate
/// [`update`]: NonlinearOptimizer::update
#[derive(Debug, Clone)]
pub struct GaussNewtonOptimizer {
    state: OptimizerState,
    config: Arc<GaussNewtonConfig>,
}

impl GaussNewtonOptimizer {
    /// Start an optimization of `graph` from `values`.
    ///
    /// Fails if the configuration is invalid, the graph has no factors, or `values` lacks
    /// a variable the graph references.
    pub fn new(
        graph: NonlinearFactorGraph,
        values: Values,
        config: GaussNewtonConfig,
    ) -> SolverResult<Self> {
        config.validate()?;
        let state = OptimizerState::new(Arc::new(graph), Arc::new(values))?;
        if config.base.verbosity > Verbosity::Silent {
            config.print_configuration();
        }
        Ok(GaussNewtonOptimizer {
            state,
            config: Arc::new(config),
        })
    }

    /// Start an optimization with the default configuration.
    pub fn with_defaults(graph: NonlinearFactorGraph, values: Values) -> SolverResult<Self> {
        Self::new(graph, values, GaussNewtonConfig::default())
    }

    /// Compare the eliminated step with a sparse Cholesky solve of the normal equations.
    fn log_normal_equation_check(system: &SparseLinearSystem, delta: &VectorValues) {
        match system
            .solve_normal_equations()
            .and_then(|x| system.to_vector_values(&x))
        {
            Ok(direct) => debug!(
                "Elimination vs sparse normal equations: max difference {:.3e}",
                delta.max_abs_diff(&direct)
            ),
            Err(e) => debug!("Sparse normal-equation check unavailable: {}", e),
        }
    }
}

impl NonlinearOptimizer for GaussNewtonOptimizer {
    type Config = GaussNewtonConfig;

    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn config(&self) -> &Arc<GaussNewtonConfig> {
        &self.config
    }

    fn base_config(&self) -> &NonlinearOptimizerConfig {
        &self.config.base
    }

    fn iterate(&self) -> SolverResult<Self> {
        let verbosity = self.config.base.verbosity;
        let graph = self.state.graph();
        let values = self.state.values();

        let linear = graph.linearize(values)?;
        if verbosity >= Verbosity::Linear {
            debug!("Linear system:\n{}", linear);
        }

        let computed;
        let ordering = if self.config.ordering.is_empty() {
            computed = Ordering::minimum_degree(&linear)?;
            &computed
        } else {
            &self.config.ordering
        };

        // whole-system view for diagnostics; a bad ordering is reported by solve below
        let diagnostics = if tracing::enabled!(Level::DEBUG) {
            SparseLinearSystem::assemble(&linear, ordering).ok()
        } else {
            None
        };
        if let Some(system) = &diagnostics {
            debug!(
                "Gradient norm at linearization point: {:.6e}",
                system.gradient_at_zero().norm_l2()
            );
        }

        let delta = linalg::solve(
            &linear,
            ordering,
            self.config.elimination,
            self.config.factorization,
        )?;
        if verbosity >= Verbosity::Delta {
            debug!("Delta:\n{}", delta);
        }
        if verbosity >= Verbosity::Linear
            && let Some(system) = &diagnostics
        {
            Self::log_normal_equation_check(system, &delta);
        }

        let new_values = values.retract(&delta)?;
        if verbosity >= Verbosity::Values {
            debug!("New values:\n{}", new_values);
        }

        let new_error = graph.error(&new_values)?;
        if verbosity >= Verbosity::Error {
            debug!("New error: {:.6e}", new_error);
        }

        Ok(GaussNewtonOptimizer {
            state: self.state.advance(new_values, new_error),
            config: Arc::clone(&self.config),
        })
    }

    fn update(&self, update: StateUpdate<GaussNewtonConfig>) -> SolverResult<Self> {
        let config = match update.config {
            Some(config) => {
                config.validate()?;
                Arc::new(config)
            }
            None => Arc::clone(&self.config),
        };
        let state = self
            .state
            .replace(update.graph.map(Arc::new), update.values.map(Arc::new))?;
        Ok(GaussNewtonOptimizer { state, config })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::{BetweenFactor, PriorFactor};
    use crate::manifold::{ManifoldType, rn::Rn};
    use nalgebra::dvector;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn line_problem() -> SolverResult<(NonlinearFactorGraph, Values)> {
        let mut graph = NonlinearFactorGraph::new();
        graph.add_factor(&["a"], PriorFactor::new(dvector![0.0, 0.0]));
        graph.add_factor(&["a", "b"], BetweenFactor::new(Rn::from(dvector![1.0, 2.0])));

        let mut values = Values::new();
        values.insert("a", ManifoldType::RN, dvector![0.5, -0.5])?;
        values.insert("b", ManifoldType::RN, dvector![3.0, 3.0])?;
        Ok((graph, values))
    }

    #[test]
    fn test_config_defaults() {
        let config = GaussNewtonConfig::default();
        assert_eq!(config.elimination, EliminationAlgorithm::Multifrontal);
        assert_eq!(config.factorization, FactorizationMethod::Ldl);
        assert!(config.ordering.is_empty());
        assert_eq!(config.base, NonlinearOptimizerConfig::default());
    }

    #[test]
    fn test_config_print() {
        let printed = GaussNewtonConfig::new()
            .with_factorization(FactorizationMethod::Qr)
            .with_ordering(Ordering::new(["x1", "x2"]))
            .to_string();
        assert!(printed.contains("elimination method: MULTIFRONTAL"));
        assert!(printed.contains("factorization method: QR"));
        assert!(printed.contains("ordering: x1 x2"));
        assert!(GaussNewtonConfig::new().to_string().contains("<automatic>"));
    }

    #[test]
    fn test_describe_methods_invalid_codes() {
        let lines = describe_methods(9, 200);
        assert_eq!(lines.matches("(invalid)").count(), 2);
        assert!(describe_methods(1, 2).contains("SEQUENTIAL"));
    }

    #[test]
    fn test_linear_problem_solved_in_one_step() -> TestResult {
        let (graph, values) = line_problem()?;
        let optimizer = GaussNewtonOptimizer::with_defaults(graph, values)?;
        assert!(optimizer.error() > 0.0);

        let next = optimizer.iterate()?;
        assert_eq!(next.iterations(), 1);
        assert!(next.error() < 1e-20);
        let b = next.values().vector("b")?;
        assert!((b[0] - 1.0).abs() < 1e-10);
        assert!((b[1] - 2.0).abs() < 1e-10);
        Ok(())
    }

    #[test]
    fn test_iterate_shares_graph_and_config() -> TestResult {
        let (graph, values) = line_problem()?;
        let optimizer = GaussNewtonOptimizer::with_defaults(graph, values)?;
        let next = optimizer.iterate()?;
        assert!(Arc::ptr_eq(next.state().graph(), optimizer.state().graph()));
        assert!(Arc::ptr_eq(next.config(), optimizer.config()));
        assert!(!Arc::ptr_eq(next.state().values(), optimizer.state().values()));
        Ok(())
    }

    #[test]
    fn test_update_config_keeps_error() -> TestResult {
        let (graph, values) = line_problem()?;
        let optimizer = GaussNewtonOptimizer::with_defaults(graph, values)?.iterate()?;
        let updated = optimizer.update(
            StateUpdate::new()
                .with_config(GaussNewtonConfig::new().with_factorization(FactorizationMethod::Qr)),
        )?;
        assert_eq!(updated.error(), optimizer.error());
        assert_eq!(updated.iterations(), 1);
        assert_eq!(updated.config().factorization, FactorizationMethod::Qr);
        assert!(Arc::ptr_eq(updated.state().values(), optimizer.state().values()));
        Ok(())
    }

    #[test]
    fn test_update_values_reevaluates_error() -> TestResult {
        let (graph, values) = line_problem()?;
        let optimizer = GaussNewtonOptimizer::with_defaults(graph, values.clone())?.iterate()?;
        let updated = optimizer.update(StateUpdate::new().with_values(values))?;
        assert_eq!(updated.iterations(), 1);
        assert!(updated.error() > optimizer.error());
        assert_eq!(updated.error(), updated.state().graph().error(updated.values())?);
        Ok(())
    }

    #[test]
    fn test_update_rejects_incomplete_values() -> TestResult {
        let (graph, _) = line_problem()?;
        let mut partial = Values::new();
        partial.insert("a", ManifoldType::RN, dvector![0.0, 0.0])?;
        let optimizer = GaussNewtonOptimizer::with_defaults(graph, line_problem()?.1)?;
        let result = optimizer.update(StateUpdate::new().with_values(partial));
        assert!(result.is_err_and(|e| e.is_invalid_input()));
        Ok(())
    }

    #[test]
    fn test_invalid_config_rejected() -> TestResult {
        let (graph, values) = line_problem()?;
        let result = GaussNewtonOptimizer::new(
            graph,
            values,
            GaussNewtonConfig::new().with_relative_error_tol(-1.0),
        );
        assert!(result.is_err());
        Ok(())
    }
}
