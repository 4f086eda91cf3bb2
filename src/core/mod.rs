//! Core building blocks of the nonlinear problem
//!
//! This module contains everything the optimizer treats as "the problem":
//! - Variables and the `Values` container mapping keys to manifold elements
//! - Residual blocks tying a factor to the keys it constrains
//! - The nonlinear factor graph, which evaluates its total error and produces
//!   a linear (Gaussian) approximation of itself at a given set of values

pub mod graph;
pub mod residual_block;
pub mod values;
pub mod variable;

use crate::factors::FactorError;
use crate::manifold::ManifoldError;
use thiserror::Error;
use tracing::error;

/// Core module error types for graphs, values and factors
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Residual block operation failed
    #[error("Residual block error: {0}")]
    ResidualBlock(String),

    /// Variable lookup or conversion error
    #[error("Variable error: {0}")]
    Variable(String),

    /// Factor linearization failed
    #[error("Factor linearization failed: {0}")]
    FactorLinearization(String),

    /// Dimension mismatch between residual/Jacobian/variables
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// The graph and values given to an optimizer do not form a valid problem
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A factor rejected its inputs
    #[error("Factor error: {0}")]
    Factor(#[from] FactorError),

    /// Manifold operation failed while updating a variable
    #[error("Manifold error: {0}")]
    Manifold(#[from] ManifoldError),
}

impl CoreError {
    /// Log the error with tracing::error and return self for chaining
    ///
    /// # Example
    /// ```ignore
    /// operation()
    ///     .map_err(|e| CoreError::from(e).log())?;
    /// ```
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Result type for core module operations
pub type CoreResult<T> = Result<T, CoreError>;
