//! Error types for the factor-gn library
//!
//! # Error Hierarchy
//!
//! - **`SolverError`** is the top-level error returned by optimizer operations
//! - **Module errors** (`CoreError`, `LinAlgError`, `OptimizerError`, ...) are wrapped
//!   inside it transparently, so their messages and sources are preserved
//!
//! The three failures an optimizer caller is expected to handle have predicates:
//!
//! | Failure | Raised by | Predicate |
//! | --- | --- | --- |
//! | graph and values do not form a problem | construction, `update` | [`SolverError::is_invalid_input`] |
//! | ordering is not a permutation of the variables | `iterate` | [`SolverError::is_ordering_mismatch`] |
//! | elimination meets a rank-deficient step | `iterate` | [`SolverError::is_singular_system`] |

use crate::{
    core::CoreError, factors::FactorError, linalg::LinAlgError, manifold::ManifoldError,
    optimizer::OptimizerError,
};
use std::error::Error as StdError;
use thiserror::Error;

/// Main result type used throughout the factor-gn library
pub type SolverResult<T> = Result<T, SolverError>;

/// Main error type for the factor-gn library
///
/// ```rust,ignore
/// if let Err(e) = optimizer.iterate() {
///     warn!("Full chain: {}", e.chain());
/// }
/// ```
#[derive(Debug, Error)]
pub enum SolverError {
    /// Graph, values and factor evaluation errors
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Optimizer configuration errors
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    /// Ordering, elimination and factorization errors
    #[error(transparent)]
    LinearAlgebra(#[from] LinAlgError),

    /// Manifold operation errors
    #[error(transparent)]
    Manifold(#[from] ManifoldError),

    /// Factor construction errors
    #[error(transparent)]
    Factor(#[from] FactorError),
}

impl SolverError {
    /// The graph and values do not form a valid problem.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, SolverError::Core(CoreError::InvalidInput(_)))
    }

    /// The elimination ordering does not match the linear system.
    pub fn is_ordering_mismatch(&self) -> bool {
        matches!(
            self,
            SolverError::LinearAlgebra(LinAlgError::OrderingMismatch { .. })
        )
    }

    /// The linear system is singular under the configured factorization.
    pub fn is_singular_system(&self) -> bool {
        matches!(
            self,
            SolverError::LinearAlgebra(LinAlgError::SingularSystem { .. })
        )
    }

    /// Get the full error chain as a string for logging and debugging.
    ///
    /// Traverses the source chain from this error down to the root cause, one error
    /// per line.
    pub fn chain(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(format!("  → {}", err));
            source = err.source();
        }

        chain.join("\n")
    }

    /// Get a compact single-line error chain for logging
    pub fn chain_compact(&self) -> String {
        let mut chain = vec![self.to_string()];
        let mut source = self.source();

        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }

        chain.join(" → ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::FactorizationMethod;

    #[test]
    fn test_solver_error_display() {
        let error = SolverError::from(LinAlgError::SingularSystem {
            method: FactorizationMethod::Ldl,
            detail: "pivot 0 at column 1".to_string(),
        });
        assert!(error.to_string().contains("Singular system under LDL"));
        assert!(error.is_singular_system());
        assert!(!error.is_ordering_mismatch());
    }

    #[test]
    fn test_solver_error_chain() {
        let error = SolverError::from(LinAlgError::FactorizationFailed(
            "Symbolic Cholesky decomposition failed".to_string(),
        ));
        let chain = error.chain();
        assert!(chain.contains("factorization"));
        assert!(chain.contains("Cholesky"));
    }

    #[test]
    fn test_solver_error_chain_compact() {
        let error = SolverError::from(CoreError::Variable("unknown variable 'x42'".to_string()));
        assert!(error.chain_compact().contains("unknown variable 'x42'"));
    }

    #[test]
    fn test_predicates() {
        let invalid = SolverError::from(CoreError::InvalidInput("empty graph".to_string()));
        assert!(invalid.is_invalid_input());

        let mismatch = SolverError::from(LinAlgError::OrderingMismatch {
            missing: vec!["x3".to_string()],
            unexpected: vec![],
            duplicated: vec![],
        });
        assert!(mismatch.is_ordering_mismatch());
        assert!(!mismatch.is_invalid_input());
    }

    #[test]
    fn test_transparent_error_conversion() {
        let manifold_error = ManifoldError::DimensionMismatch {
            expected: 3,
            actual: 2,
        };
        let error: SolverError = manifold_error.into();
        match error {
            SolverError::Manifold(_) => {}
            _ => panic!("Expected Manifold variant"),
        }
    }
}
