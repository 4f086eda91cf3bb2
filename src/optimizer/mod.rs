//! Nonlinear optimizers over factor graphs.
//!
//! An optimizer is an immutable snapshot: the factor graph, the current values, the
//! cached error at those values and the number of iterations taken so far, plus the
//! configuration it runs with. [`NonlinearOptimizer::iterate`] produces the next
//! snapshot and leaves the current one untouched, so a caller can keep any state
//! around, fork from it, or inspect it after a failed step.
//!
//! [`optimize`] is the driver loop: it iterates until [`check_convergence`] reports a
//! stopping condition or the iteration budget runs out.
//!
//! - [`GaussNewtonOptimizer`]: full Gauss-Newton steps, solved by variable elimination

use crate::core::{graph::NonlinearFactorGraph, values::Values};
use crate::error::{SolverError, SolverResult};
use std::{
    fmt,
    fmt::{Display, Formatter},
    str::FromStr,
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub mod gauss_newton;

pub use gauss_newton::{GaussNewtonConfig, GaussNewtonOptimizer};

/// Optimizer-specific error types
#[derive(Debug, Clone, Error)]
pub enum OptimizerError {
    /// Invalid optimization parameters provided
    #[error("Invalid optimization parameters: {0}")]
    InvalidParameters(String),
}

impl OptimizerError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for optimizer operations
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// How much an optimizer reports about each iteration, at debug level.
///
/// Levels are cumulative: `Delta` also reports values and error.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verbosity {
    #[default]
    Silent,
    /// New error after each iteration
    Error,
    /// New values after each iteration
    Values,
    /// The step applied to the values
    Delta,
    /// The linearized system
    Linear,
}

impl Display for Verbosity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verbosity::Silent => "SILENT",
            Verbosity::Error => "ERROR",
            Verbosity::Values => "VALUES",
            Verbosity::Delta => "DELTA",
            Verbosity::Linear => "LINEAR",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Verbosity {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "silent" => Ok(Verbosity::Silent),
            "error" => Ok(Verbosity::Error),
            "values" => Ok(Verbosity::Values),
            "delta" => Ok(Verbosity::Delta),
            "linear" => Ok(Verbosity::Linear),
            other => Err(OptimizerError::InvalidParameters(format!(
                "unknown verbosity '{other}'"
            ))),
        }
    }
}

/// Stopping and reporting settings shared by every optimizer.
#[derive(Debug, Clone, PartialEq)]
pub struct NonlinearOptimizerConfig {
    /// Maximum number of iterations
    pub max_iterations: usize,
    /// Stop when the relative error decrease falls to this value
    pub relative_error_tol: f64,
    /// Stop when the absolute error decrease falls to this value
    pub absolute_error_tol: f64,
    /// Stop when the error itself falls to this value
    pub error_tol: f64,
    pub verbosity: Verbosity,
}

impl Default for NonlinearOptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            relative_error_tol: 1e-5,
            absolute_error_tol: 1e-5,
            error_tol: 0.0,
            verbosity: Verbosity::Silent,
        }
    }
}

impl NonlinearOptimizerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_relative_error_tol(mut self, relative_error_tol: f64) -> Self {
        self.relative_error_tol = relative_error_tol;
        self
    }

    pub fn with_absolute_error_tol(mut self, absolute_error_tol: f64) -> Self {
        self.absolute_error_tol = absolute_error_tol;
        self
    }

    pub fn with_error_tol(mut self, error_tol: f64) -> Self {
        self.error_tol = error_tol;
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Tolerances must be finite and non-negative.
    pub fn validate(&self) -> OptimizerResult<()> {
        let tolerances = [
            ("relative error tolerance", self.relative_error_tol),
            ("absolute error tolerance", self.absolute_error_tol),
            ("error tolerance", self.error_tol),
        ];
        for (name, value) in tolerances {
            if !value.is_finite() || value < 0.0 {
                return Err(OptimizerError::InvalidParameters(format!(
                    "{name} must be finite and non-negative, got {value}"
                ))
                .log());
            }
        }
        Ok(())
    }
}

impl Display for NonlinearOptimizerConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "             max iterations: {}", self.max_iterations)?;
        writeln!(f, "   relative error tolerance: {:e}", self.relative_error_tol)?;
        writeln!(f, "   absolute error tolerance: {:e}", self.absolute_error_tol)?;
        writeln!(f, "            error tolerance: {:e}", self.error_tol)?;
        writeln!(f, "                  verbosity: {}", self.verbosity)
    }
}

/// Immutable snapshot of an optimization: graph, values, cached error, iteration count.
///
/// Graph and values are shared. A new snapshot never modifies the one it came from.
#[derive(Debug, Clone)]
pub struct OptimizerState {
    graph: Arc<NonlinearFactorGraph>,
    values: Arc<Values>,
    error: f64,
    iterations: usize,
}

impl OptimizerState {
    /// Start a new optimization at `values`.
    ///
    /// Fails with [`CoreError::InvalidInput`](crate::core::CoreError::InvalidInput) if the
    /// graph is empty or a variable it references has no value.
    pub fn new(graph: Arc<NonlinearFactorGraph>, values: Arc<Values>) -> SolverResult<Self> {
        graph.validate(&values)?;
        let error = graph.error(&values)?;
        Ok(OptimizerState {
            graph,
            values,
            error,
            iterations: 0,
        })
    }

    pub fn graph(&self) -> &Arc<NonlinearFactorGraph> {
        &self.graph
    }

    pub fn values(&self) -> &Arc<Values> {
        &self.values
    }

    /// Total error of the graph at the current values.
    pub fn error(&self) -> f64 {
        self.error
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// The state one iteration later, at `values` with error `error`.
    pub(crate) fn advance(&self, values: Values, error: f64) -> Self {
        OptimizerState {
            graph: Arc::clone(&self.graph),
            values: Arc::new(values),
            error,
            iterations: self.iterations + 1,
        }
    }

    /// Swap in a new graph and/or values, keeping the iteration count.
    ///
    /// The error is carried over when neither is replaced. Otherwise the new pairing is
    /// validated and its error evaluated.
    pub(crate) fn replace(
        &self,
        graph: Option<Arc<NonlinearFactorGraph>>,
        values: Option<Arc<Values>>,
    ) -> SolverResult<Self> {
        if graph.is_none() && values.is_none() {
            return Ok(self.clone());
        }
        let graph = graph.unwrap_or_else(|| Arc::clone(&self.graph));
        let values = values.unwrap_or_else(|| Arc::clone(&self.values));
        let mut state = OptimizerState::new(graph, values)?;
        state.iterations = self.iterations;
        Ok(state)
    }
}

/// Fields to override when deriving a new optimizer from an existing one.
///
/// `None` keeps the source's field.
#[derive(Debug, Clone)]
pub struct StateUpdate<C> {
    pub graph: Option<NonlinearFactorGraph>,
    pub values: Option<Values>,
    pub config: Option<C>,
}

impl<C> Default for StateUpdate<C> {
    fn default() -> Self {
        StateUpdate {
            graph: None,
            values: None,
            config: None,
        }
    }
}

impl<C> StateUpdate<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_graph(mut self, graph: NonlinearFactorGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn with_values(mut self, values: Values) -> Self {
        self.values = Some(values);
        self
    }

    pub fn with_config(mut self, config: C) -> Self {
        self.config = Some(config);
        self
    }
}

/// An iterative optimizer as a sequence of immutable states.
///
/// `Clone` yields an optimizer sharing graph, values and configuration with the
/// original, equivalent to `update(StateUpdate::new())`.
pub trait NonlinearOptimizer: Clone {
    type Config: Clone + Display;

    fn state(&self) -> &OptimizerState;

    fn config(&self) -> &Arc<Self::Config>;

    /// The generic stopping and reporting settings inside [`Self::Config`].
    fn base_config(&self) -> &NonlinearOptimizerConfig;

    /// Take one step, returning the optimizer at the new values.
    fn iterate(&self) -> SolverResult<Self>;

    /// Derive an optimizer with some of graph, values or configuration replaced.
    fn update(&self, update: StateUpdate<Self::Config>) -> SolverResult<Self>;

    fn values(&self) -> &Values {
        self.state().values()
    }

    fn error(&self) -> f64 {
        self.state().error()
    }

    fn iterations(&self) -> usize {
        self.state().iterations()
    }
}

/// Why an optimization run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationStatus {
    /// The absolute or relative error decrease fell below its tolerance
    Converged,
    /// The error fell below the error tolerance
    ErrorThresholdReached,
    /// An iteration did not decrease the error
    ErrorIncreased,
    /// Maximum number of iterations reached
    MaxIterationsReached,
    /// An iteration failed; the outcome carries the error
    Failed,
}

impl Display for OptimizationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationStatus::Converged => write!(f, "Converged"),
            OptimizationStatus::ErrorThresholdReached => write!(f, "Error threshold reached"),
            OptimizationStatus::ErrorIncreased => write!(f, "Error increased"),
            OptimizationStatus::MaxIterationsReached => write!(f, "Maximum iterations reached"),
            OptimizationStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Decide whether to stop after an iteration took the error from `current_error` to
/// `new_error`. `None` means keep going.
pub fn check_convergence(
    config: &NonlinearOptimizerConfig,
    current_error: f64,
    new_error: f64,
) -> Option<OptimizationStatus> {
    if new_error <= config.error_tol {
        return Some(OptimizationStatus::ErrorThresholdReached);
    }

    let absolute_decrease = current_error - new_error;
    if !(absolute_decrease >= 0.0) {
        warn!(
            "Error increased from {:.6e} to {:.6e}, stopping",
            current_error, new_error
        );
        return Some(OptimizationStatus::ErrorIncreased);
    }

    // current_error > new_error > error_tol >= 0 here
    let relative_decrease = absolute_decrease / current_error;
    if absolute_decrease <= config.absolute_error_tol
        || relative_decrease <= config.relative_error_tol
    {
        return Some(OptimizationStatus::Converged);
    }
    None
}

/// Per-iteration record kept by [`optimize`].
#[derive(Debug, Clone)]
pub struct IterationStats {
    /// Iteration count after this step
    pub iteration: usize,
    pub error: f64,
    /// Previous error minus new error
    pub error_change: f64,
    pub iter_time_ms: f64,
    pub total_time_ms: f64,
}

impl IterationStats {
    pub fn print_header() {
        debug!(
            "{:>4}  {:>13}  {:>13}  {:>11}  {:>13}",
            "iter", "error", "error_change", "iter_time", "total_time"
        );
    }

    pub fn print_line(&self) {
        debug!(
            "{:>4}  {:>13.6e}  {:>13.2e}  {:>9.2}ms  {:>11.2}ms",
            self.iteration, self.error, self.error_change, self.iter_time_ms, self.total_time_ms
        );
    }
}

/// Result of a driver run.
#[derive(Debug)]
pub struct OptimizationOutcome<O> {
    /// The last valid optimizer state
    pub optimizer: O,
    pub status: OptimizationStatus,
    pub initial_error: f64,
    pub final_error: f64,
    /// Iterations taken during this run
    pub iterations: usize,
    pub elapsed: Duration,
    pub history: Vec<IterationStats>,
    /// The error that stopped the run, when `status` is `Failed`
    pub error: Option<SolverError>,
}

impl<O> OptimizationOutcome<O> {
    /// Whether the run stopped on a convergence criterion.
    pub fn is_converged(&self) -> bool {
        matches!(
            self.status,
            OptimizationStatus::Converged | OptimizationStatus::ErrorThresholdReached
        )
    }
}

impl<O> Display for OptimizationOutcome<O> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization finished: {}", self.status)?;
        writeln!(f, "  Initial error: {:.6e}", self.initial_error)?;
        writeln!(f, "  Final error:   {:.6e}", self.final_error)?;
        if self.initial_error > 0.0 {
            writeln!(
                f,
                "  Reduction:     {:.2}%",
                100.0 * (self.initial_error - self.final_error) / self.initial_error
            )?;
        }
        writeln!(f, "  Iterations:    {}", self.iterations)?;
        write!(f, "  Time:          {:.2?}", self.elapsed)?;
        if let Some(err) = &self.error {
            write!(f, "\n  Error:         {err}")?;
        }
        Ok(())
    }
}

/// Iterate from `start` until a stopping condition is met.
///
/// An iteration error ends the run with [`OptimizationStatus::Failed`]. The outcome then
/// holds the last state that iterated successfully, and the error.
pub fn optimize<O: NonlinearOptimizer>(start: &O) -> OptimizationOutcome<O> {
    let started = Instant::now();
    let config = start.base_config().clone();
    let initial_error = start.error();
    let initial_iterations = start.iterations();

    let mut current = start.clone();
    let mut history = Vec::new();
    let mut failure = None;

    if config.verbosity >= Verbosity::Error {
        debug!("Initial error: {:.6e}", initial_error);
    }
    IterationStats::print_header();

    let status = if initial_error <= config.error_tol {
        OptimizationStatus::ErrorThresholdReached
    } else {
        loop {
            if current.iterations() >= config.max_iterations {
                info!(
                    "Reached the maximum of {} iterations without converging",
                    config.max_iterations
                );
                break OptimizationStatus::MaxIterationsReached;
            }

            let iter_start = Instant::now();
            let next = match current.iterate() {
                Ok(next) => next,
                Err(err) => {
                    warn!("Iteration {} failed: {}", current.iterations() + 1, err);
                    failure = Some(err);
                    break OptimizationStatus::Failed;
                }
            };

            let stats = IterationStats {
                iteration: next.iterations(),
                error: next.error(),
                error_change: current.error() - next.error(),
                iter_time_ms: iter_start.elapsed().as_secs_f64() * 1000.0,
                total_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            };
            stats.print_line();
            history.push(stats);

            let stop = check_convergence(&config, current.error(), next.error());
            current = next;
            if let Some(status) = stop {
                break status;
            }
        }
    };

    OptimizationOutcome {
        final_error: current.error(),
        iterations: current.iterations() - initial_iterations,
        optimizer: current,
        status,
        initial_error,
        elapsed: started.elapsed(),
        history,
        error: failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_default_config() {
        let config = NonlinearOptimizerConfig::default();
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.relative_error_tol, 1e-5);
        assert_eq!(config.absolute_error_tol, 1e-5);
        assert_eq!(config.error_tol, 0.0);
        assert_eq!(config.verbosity, Verbosity::Silent);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_negative_tolerance() {
        let config = NonlinearOptimizerConfig::new().with_absolute_error_tol(-1.0);
        assert!(matches!(
            config.validate(),
            Err(OptimizerError::InvalidParameters(_))
        ));
        let config = NonlinearOptimizerConfig::new().with_relative_error_tol(f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_verbosity_is_ordered() -> TestResult {
        assert!(Verbosity::Silent < Verbosity::Error);
        assert!(Verbosity::Values < Verbosity::Delta);
        assert!(Verbosity::Delta < Verbosity::Linear);
        assert_eq!("delta".parse::<Verbosity>()?, Verbosity::Delta);
        assert!("loud".parse::<Verbosity>().is_err());
        Ok(())
    }

    #[test]
    fn test_check_convergence() {
        let config = NonlinearOptimizerConfig::new()
            .with_absolute_error_tol(1e-3)
            .with_relative_error_tol(1e-3)
            .with_error_tol(1e-9);

        assert_eq!(check_convergence(&config, 10.0, 5.0), None);
        assert_eq!(
            check_convergence(&config, 10.0, 0.0),
            Some(OptimizationStatus::ErrorThresholdReached)
        );
        assert_eq!(
            check_convergence(&config, 10.0, 11.0),
            Some(OptimizationStatus::ErrorIncreased)
        );
        assert_eq!(
            check_convergence(&config, 10.0, f64::NAN),
            Some(OptimizationStatus::ErrorIncreased)
        );
        // absolute decrease 5e-4
        assert_eq!(
            check_convergence(&config, 0.5, 0.4995),
            Some(OptimizationStatus::Converged)
        );
        // relative decrease 1e-4, absolute 1.0
        assert_eq!(
            check_convergence(&config, 1e4, 1e4 - 1.0),
            Some(OptimizationStatus::Converged)
        );
    }

    #[test]
    fn test_state_update_defaults_to_none() {
        let update: StateUpdate<NonlinearOptimizerConfig> = StateUpdate::new();
        assert!(update.graph.is_none());
        assert!(update.values.is_none());
        assert!(update.config.is_none());
        let update = update.with_config(NonlinearOptimizerConfig::default());
        assert!(update.config.is_some());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(OptimizationStatus::Converged.to_string(), "Converged");
        assert_eq!(
            OptimizationStatus::MaxIterationsReached.to_string(),
            "Maximum iterations reached"
        );
    }
}
