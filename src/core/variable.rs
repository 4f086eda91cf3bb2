//! Variables for optimization on manifolds.
//!
//! A [`Variable`] is one entry of a [`Values`](crate::core::values::Values) container: an
//! element of Rⁿ, SO(2) or SE(2). Updates happen in the tangent space and are applied
//! through the manifold retraction:
//!
//! ```text
//! x_new = x_old ⊕ δx
//! ```
//!
//! Factors never see the typed element. They receive the coordinate vector produced by
//! [`Variable::to_vector`], which is why the enum exposes a uniform vector interface.

use crate::manifold::{
    Manifold, ManifoldResult, ManifoldType, rn::Rn, se2::SE2, so2::SO2,
};
use nalgebra::DVector;
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// A variable value living on one of the supported manifolds.
#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    Rn(Rn),
    SO2(SO2),
    SE2(SE2),
}

impl Display for Variable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Rn(v) => write!(f, "{v}"),
            Variable::SO2(v) => write!(f, "{v}"),
            Variable::SE2(v) => write!(f, "{v}"),
        }
    }
}

impl From<Rn> for Variable {
    fn from(value: Rn) -> Self {
        Variable::Rn(value)
    }
}

impl From<SO2> for Variable {
    fn from(value: SO2) -> Self {
        Variable::SO2(value)
    }
}

impl From<SE2> for Variable {
    fn from(value: SE2) -> Self {
        Variable::SE2(value)
    }
}

impl Variable {
    /// Build a variable of the given manifold type from its coordinate vector.
    pub fn from_vector(manifold_type: ManifoldType, data: &DVector<f64>) -> ManifoldResult<Self> {
        Ok(match manifold_type {
            ManifoldType::RN => Variable::Rn(Rn::from_vector(data)?),
            ManifoldType::SO2 => Variable::SO2(SO2::from_vector(data)?),
            ManifoldType::SE2 => Variable::SE2(SE2::from_vector(data)?),
        })
    }

    pub fn manifold_type(&self) -> ManifoldType {
        match self {
            Variable::Rn(_) => ManifoldType::RN,
            Variable::SO2(_) => ManifoldType::SO2,
            Variable::SE2(_) => ManifoldType::SE2,
        }
    }

    /// Get the tangent space size for this variable
    pub fn get_size(&self) -> usize {
        match self {
            Variable::Rn(v) => v.dof(),
            Variable::SO2(v) => v.dof(),
            Variable::SE2(v) => v.dof(),
        }
    }

    /// Convert to DVector for use with the Factor trait
    pub fn to_vector(&self) -> DVector<f64> {
        match self {
            Variable::Rn(v) => v.to_vector(),
            Variable::SO2(v) => v.to_vector(),
            Variable::SE2(v) => v.to_vector(),
        }
    }

    /// Apply a tangent space step, returning the updated variable.
    pub fn retract(&self, delta: &DVector<f64>) -> ManifoldResult<Self> {
        Ok(match self {
            Variable::Rn(v) => Variable::Rn(v.retract(delta)?),
            Variable::SO2(v) => Variable::SO2(v.retract(delta)?),
            Variable::SE2(v) => Variable::SE2(v.retract(delta)?),
        })
    }

    /// Tangent step taking `self` to `other`.
    ///
    /// `None` when the two variables live on different manifolds or have different sizes.
    pub fn local(&self, other: &Variable) -> Option<DVector<f64>> {
        match (self, other) {
            (Variable::Rn(a), Variable::Rn(b)) if a.dof() == b.dof() => Some(a.local(b)),
            (Variable::SO2(a), Variable::SO2(b)) => Some(a.local(b)),
            (Variable::SE2(a), Variable::SE2(b)) => Some(a.local(b)),
            _ => None,
        }
    }
}
