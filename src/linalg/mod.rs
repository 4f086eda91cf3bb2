//! Linear layer: Gaussian factor graphs and their solution by variable elimination.
//!
//! Linearizing the nonlinear graph at a point yields a set of [`JacobianFactor`]s
//! `‖Σ A_j δ_j - b‖²`. [`solve`] eliminates the variables in a given [`Ordering`] and
//! back-substitutes to obtain the update [`VectorValues`].
//!
//! Two elimination algorithms are available:
//! - [`EliminationAlgorithm::Multifrontal`]: variables are grouped into cliques of the
//!   elimination tree and eliminated bottom-up, producing a [`GaussianBayesTree`]
//! - [`EliminationAlgorithm::Sequential`]: one variable at a time, producing a
//!   [`GaussianBayesNet`]
//!
//! Each elimination step factors a small dense system with one of the
//! [`FactorizationMethod`]s. QR works on the stacked Jacobian and is the most robust;
//! Cholesky and LDL work on the information matrix `AᵀA` and are cheaper.

pub mod conditional;
pub mod factorization;
pub mod gaussian_factor;
pub mod multifrontal;
pub mod ordering;
pub mod sequential;
pub mod sparse;
pub mod vector_values;

pub use conditional::{GaussianBayesNet, GaussianConditional};
pub use gaussian_factor::{GaussianFactorGraph, JacobianFactor};
pub use multifrontal::GaussianBayesTree;
pub use ordering::Ordering;
pub use sparse::SparseLinearSystem;
pub use vector_values::VectorValues;

use std::{
    fmt,
    fmt::{Display, Formatter},
    str::FromStr,
};
use thiserror::Error;
use tracing::error;

/// Label printed for an enum code that names no variant.
pub const INVALID_LABEL: &str = "(invalid)";

/// Strategy used to eliminate the variables of a linear system.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EliminationAlgorithm {
    /// Cliques of the elimination tree, eliminated bottom-up
    #[default]
    Multifrontal = 0,
    /// One variable at a time, in ordering
    Sequential = 1,
}

impl EliminationAlgorithm {
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Name for a raw code, `"(invalid)"` if the code names no variant.
    pub fn label_for_code(code: u8) -> &'static str {
        match Self::try_from(code) {
            Ok(EliminationAlgorithm::Multifrontal) => "MULTIFRONTAL",
            Ok(EliminationAlgorithm::Sequential) => "SEQUENTIAL",
            Err(_) => INVALID_LABEL,
        }
    }

    pub fn label(self) -> &'static str {
        Self::label_for_code(self.code())
    }
}

impl TryFrom<u8> for EliminationAlgorithm {
    type Error = LinAlgError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(EliminationAlgorithm::Multifrontal),
            1 => Ok(EliminationAlgorithm::Sequential),
            other => Err(LinAlgError::UnknownMethod(format!(
                "elimination algorithm code {other}"
            ))),
        }
    }
}

impl FromStr for EliminationAlgorithm {
    type Err = LinAlgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "multifrontal" => Ok(EliminationAlgorithm::Multifrontal),
            "sequential" => Ok(EliminationAlgorithm::Sequential),
            other => Err(LinAlgError::UnknownMethod(format!(
                "elimination algorithm '{other}'"
            ))),
        }
    }
}

impl Display for EliminationAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Dense factorization applied at each elimination step.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactorizationMethod {
    /// LDLᵀ of the information matrix
    #[default]
    Ldl = 0,
    /// Householder QR of the stacked Jacobian
    Qr = 1,
    /// Cholesky (LLᵀ) of the information matrix
    Cholesky = 2,
}

impl FactorizationMethod {
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Name for a raw code, `"(invalid)"` if the code names no variant.
    pub fn label_for_code(code: u8) -> &'static str {
        match Self::try_from(code) {
            Ok(FactorizationMethod::Ldl) => "LDL",
            Ok(FactorizationMethod::Qr) => "QR",
            Ok(FactorizationMethod::Cholesky) => "CHOLESKY",
            Err(_) => INVALID_LABEL,
        }
    }

    pub fn label(self) -> &'static str {
        Self::label_for_code(self.code())
    }
}

impl TryFrom<u8> for FactorizationMethod {
    type Error = LinAlgError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(FactorizationMethod::Ldl),
            1 => Ok(FactorizationMethod::Qr),
            2 => Ok(FactorizationMethod::Cholesky),
            other => Err(LinAlgError::UnknownMethod(format!(
                "factorization method code {other}"
            ))),
        }
    }
}

impl FromStr for FactorizationMethod {
    type Err = LinAlgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ldl" => Ok(FactorizationMethod::Ldl),
            "qr" => Ok(FactorizationMethod::Qr),
            "cholesky" => Ok(FactorizationMethod::Cholesky),
            other => Err(LinAlgError::UnknownMethod(format!(
                "factorization method '{other}'"
            ))),
        }
    }
}

impl Display for FactorizationMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Linear algebra specific error types
#[derive(Debug, Clone, Error)]
pub enum LinAlgError {
    /// Matrix factorization failed for a reason other than singularity
    #[error("Matrix factorization failed: {0}")]
    FactorizationFailed(String),

    /// The system cannot be solved numerically with the chosen factorization
    #[error("Singular system under {method} factorization: {detail}")]
    SingularSystem {
        method: FactorizationMethod,
        detail: String,
    },

    /// The elimination ordering is not a permutation of the system's variables
    #[error("Ordering does not match the linear system: {}", describe_mismatch(.missing, .unexpected, .duplicated))]
    OrderingMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
        duplicated: Vec<String>,
    },

    /// Factors disagree on a variable's dimension, or a factor is malformed
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Unrecognized elimination or factorization name or code
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// Failed to create sparse matrix from triplets
    #[error("Failed to create sparse matrix: {0}")]
    SparseMatrixCreation(String),

    /// Matrix format conversion failed
    #[error("Matrix conversion failed: {0}")]
    MatrixConversion(String),
}

fn describe_mismatch(missing: &[String], unexpected: &[String], duplicated: &[String]) -> String {
    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing [{}]", missing.join(", ")));
    }
    if !unexpected.is_empty() {
        parts.push(format!("unexpected [{}]", unexpected.join(", ")));
    }
    if !duplicated.is_empty() {
        parts.push(format!("duplicated [{}]", duplicated.join(", ")));
    }
    parts.join("; ")
}

impl LinAlgError {
    /// Log the error with the original source error from a third-party library
    ///
    /// # Example
    /// ```ignore
    /// SymbolicLlt::try_new(matrix.symbolic(), Side::Lower)
    ///     .map_err(|e| {
    ///         LinAlgError::FactorizationFailed(
    ///             "Symbolic Cholesky decomposition failed".to_string()
    ///         )
    ///         .log_with_source(e)
    ///     })?;
    /// ```
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Result type for linear algebra operations
pub type LinAlgResult<T> = Result<T, LinAlgError>;

/// Solve a linear system by variable elimination.
///
/// `ordering` must be a permutation of the variables of `graph`. The returned delta
/// has one entry per variable. Fails with [`LinAlgError::OrderingMismatch`] for a bad
/// ordering and [`LinAlgError::SingularSystem`] when the chosen factorization meets a
/// rank-deficient step.
pub fn solve(
    graph: &GaussianFactorGraph,
    ordering: &Ordering,
    algorithm: EliminationAlgorithm,
    method: FactorizationMethod,
) -> LinAlgResult<VectorValues> {
    match algorithm {
        EliminationAlgorithm::Multifrontal => {
            multifrontal::eliminate(graph, ordering, method)?.back_substitute()
        }
        EliminationAlgorithm::Sequential => {
            sequential::eliminate(graph, ordering, method)?.back_substitute()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{DMatrix, DVector};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_labels_and_invalid_codes() {
        assert_eq!(EliminationAlgorithm::default().label(), "MULTIFRONTAL");
        assert_eq!(FactorizationMethod::default().label(), "LDL");
        assert_eq!(FactorizationMethod::Cholesky.to_string(), "CHOLESKY");
        assert_eq!(EliminationAlgorithm::label_for_code(7), INVALID_LABEL);
        assert_eq!(FactorizationMethod::label_for_code(255), INVALID_LABEL);
    }

    #[test]
    fn test_parse_methods() -> TestResult {
        assert_eq!(
            "Sequential".parse::<EliminationAlgorithm>()?,
            EliminationAlgorithm::Sequential
        );
        assert_eq!("qr".parse::<FactorizationMethod>()?, FactorizationMethod::Qr);
        assert!("svd".parse::<FactorizationMethod>().is_err());
        assert_eq!(FactorizationMethod::try_from(2u8)?, FactorizationMethod::Cholesky);
        Ok(())
    }

    #[test]
    fn test_ordering_mismatch_message() {
        let err = LinAlgError::OrderingMismatch {
            missing: vec!["x3".to_string()],
            unexpected: vec![],
            duplicated: vec!["x1".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("missing [x3]"));
        assert!(msg.contains("duplicated [x1]"));
    }

    #[test]
    fn test_solve_rejects_bad_ordering() {
        let graph = GaussianFactorGraph::from_factors(vec![JacobianFactor::new(
            vec!["a".to_string(), "b".to_string()],
            vec![DMatrix::identity(1, 1), -DMatrix::identity(1, 1)],
            DVector::zeros(1),
        )]);
        let result = solve(
            &graph,
            &Ordering::new(["a"]),
            EliminationAlgorithm::Multifrontal,
            FactorizationMethod::Ldl,
        );
        assert!(matches!(result, Err(LinAlgError::OrderingMismatch { .. })));
    }
}
