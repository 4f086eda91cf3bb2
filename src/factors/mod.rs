//! Factor implementations for graph-based optimization problems.
//!
//! Factors represent measurements or relationships between variables in a factor
//! graph. Each factor computes a residual (error) vector and its Jacobian with respect
//! to the connected variables.
//!
//! # Factor Graph Formulation
//!
//! ```text
//! minimize ½ Σ_i ||r_i(x)||²
//! ```
//!
//! where:
//! - `x` is the set of variables (poses, angles, points, ...)
//! - `r_i(x)` is the (whitened) residual function for factor i
//! - Each factor connects one or more variables
//!
//! # Factor Types
//!
//! - [`PriorFactor`]: unary constraint pulling a variable toward a known value
//! - [`BetweenFactor`]: relative measurement between two variables of the same manifold
//!
//! # Linearization
//!
//! Each factor must provide a `linearize` method that computes:
//! 1. **Residual** `r(x)`: the error at the current variable values
//! 2. **Jacobian** `J = ∂r/∂δ`: how the residual changes with a tangent step on each
//!    variable, with columns laid out variable after variable
//!
//! Residual and Jacobian are expected to be whitened already, so the optimizer can
//! treat every factor as contributing `½‖r‖²` with unit weight.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

pub mod between_factor;
pub mod prior_factor;

pub use between_factor::BetweenFactor;
pub use prior_factor::PriorFactor;

/// Factor-specific error types
#[derive(Debug, Clone, Error)]
pub enum FactorError {
    /// Wrong number of connected variables
    #[error("Invalid arity: expected {expected} variables, got {actual}")]
    InvalidArity { expected: usize, actual: usize },

    /// Invalid dimension mismatch between expected and actual
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    /// Invalid parameter values
    #[error("Invalid parameter values: {0}")]
    InvalidParameters(String),
}

/// Result type for factor evaluation
pub type FactorResult<T> = Result<T, FactorError>;

/// Trait for factor (constraint) implementations in factor graph optimization.
///
/// Factors must be `Send + Sync` so a graph can be shared between optimizer states and
/// evaluated in parallel.
pub trait Factor: Send + Sync {
    /// Compute the residual and Jacobian at the given parameter values.
    ///
    /// # Arguments
    ///
    /// * `params` - Slice of variable coordinate vectors (one `DVector` per connected variable)
    /// * `compute_jacobian` - Whether to compute the Jacobian matrix
    ///
    /// # Returns
    ///
    /// Tuple `(residual, jacobian)` where:
    /// - `residual`: N-dimensional error vector
    /// - `jacobian`: N × M matrix where M is the total tangent dimension of all variables
    ///
    /// # Example
    ///
    /// For a between factor connecting two SE2 poses (3 DOF each):
    /// - Input: `params = [pose1 (3×1), pose2 (3×1)]`
    /// - Output: `(residual (3×1), jacobian (3×6))`
    fn linearize(
        &self,
        params: &[DVector<f64>],
        compute_jacobian: bool,
    ) -> FactorResult<(DVector<f64>, Option<DMatrix<f64>>)>;

    /// Get the dimension of the residual vector.
    fn get_dimension(&self) -> usize;
}

/// Validate noise scale used for whitening.
pub(crate) fn check_sigma(sigma: f64) -> FactorResult<f64> {
    if sigma.is_finite() && sigma > 0.0 {
        Ok(sigma)
    } else {
        Err(FactorError::InvalidParameters(format!(
            "sigma must be positive and finite, got {sigma}"
        )))
    }
}
