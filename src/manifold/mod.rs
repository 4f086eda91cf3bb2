//! Manifold representations for the variables of a factor graph.
//!
//! Every variable lives on a manifold with a local tangent parameterization. The
//! optimizer computes steps in the tangent space and applies them through a
//! retraction `x ⊕ δ`, which keeps each estimate on its manifold (e.g. wraps angles).
//!
//! Manifold      | repr        | dof | retraction `x ⊕ δ`
//! ------------- | ----------- | --- | ------------------------------------------
//! Rⁿ            | v ∈ Rⁿ      | n   | v + δ
//! SO(2)         | z ∈ S¹ ⊂ C  | 1   | z · exp(iδ)
//! SE(2)         | (t, z)      | 3   | (t + δ_xy, z · exp(iδ_θ))
//!
//! Each type also knows how to express a relative measurement between two of its
//! elements, together with the analytic Jacobians, so that a single generic
//! [`BetweenFactor`](crate::factors::BetweenFactor) covers all of them.

use nalgebra::{DMatrix, DVector};
use std::{
    error, fmt,
    fmt::{Display, Formatter},
};

pub mod rn;
pub mod se2;
pub mod so2;

/// Errors that can occur during manifold operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifoldError {
    /// Invalid tangent vector dimension
    InvalidTangentDimension { expected: usize, actual: usize },
    /// Dimension validation failed during conversion
    DimensionMismatch { expected: usize, actual: usize },
    /// NaN or Inf detected in manifold element or step
    InvalidNumber,
}

impl Display for ManifoldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ManifoldError::InvalidTangentDimension { expected, actual } => {
                write!(
                    f,
                    "Invalid tangent dimension: expected {expected}, got {actual}"
                )
            }
            ManifoldError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {expected}, got {actual}")
            }
            ManifoldError::InvalidNumber => {
                write!(f, "Invalid number: NaN or Inf detected")
            }
        }
    }
}

impl error::Error for ManifoldError {}

/// Result type for manifold operations.
pub type ManifoldResult<T> = Result<T, ManifoldError>;

/// Which manifold a variable lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifoldType {
    RN,
    SO2,
    SE2,
}

impl Display for ManifoldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ManifoldType::RN => write!(f, "Rn"),
            ManifoldType::SO2 => write!(f, "SO2"),
            ManifoldType::SE2 => write!(f, "SE2"),
        }
    }
}

/// Operations every variable type must provide to take part in optimization.
pub trait Manifold: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Build an element from its coordinate vector, validating the length.
    fn from_vector(data: &DVector<f64>) -> ManifoldResult<Self>;

    /// Coordinate vector of this element (the layout factors receive).
    fn to_vector(&self) -> DVector<f64>;

    /// Dimension of the tangent space.
    fn dof(&self) -> usize;

    /// Apply a tangent-space step: `self ⊕ delta`.
    fn retract(&self, delta: &DVector<f64>) -> ManifoldResult<Self>;

    /// Tangent vector taking `self` to `other`, the inverse of [`Manifold::retract`].
    fn local(&self, other: &Self) -> DVector<f64>;

    /// Relative measurement error `measured⁻¹ ∘ (xi⁻¹ ∘ xj)` expressed in the tangent
    /// space, with Jacobians with respect to the steps on `xi` and `xj`.
    fn between(
        xi: &Self,
        xj: &Self,
        measured: &Self,
    ) -> (DVector<f64>, DMatrix<f64>, DMatrix<f64>);
}

/// Check that a step has the expected length and only finite entries.
pub(crate) fn check_step(delta: &DVector<f64>, expected: usize) -> ManifoldResult<()> {
    if delta.len() != expected {
        return Err(ManifoldError::InvalidTangentDimension {
            expected,
            actual: delta.len(),
        });
    }
    if delta.iter().any(|v| !v.is_finite()) {
        return Err(ManifoldError::InvalidNumber);
    }
    Ok(())
}

/// Check a coordinate vector before conversion.
pub(crate) fn check_coordinates(data: &DVector<f64>, expected: usize) -> ManifoldResult<()> {
    if data.len() != expected {
        return Err(ManifoldError::DimensionMismatch {
            expected,
            actual: data.len(),
        });
    }
    if data.iter().any(|v| !v.is_finite()) {
        return Err(ManifoldError::InvalidNumber);
    }
    Ok(())
}
