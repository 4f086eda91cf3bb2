//! Rⁿ - Euclidean vector space
//!
//! The trivial manifold: the tangent space is the space itself, retraction is plain
//! addition and the between error is `(xj - xi) - measured`.

use crate::manifold::{Manifold, ManifoldResult, check_coordinates, check_step};
use nalgebra::{DMatrix, DVector};
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// Euclidean vector of arbitrary dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Rn {
    data: DVector<f64>,
}

impl Display for Rn {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Rn(")?;
        for (i, v) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v:.4}")?;
        }
        write!(f, ")")
    }
}

impl From<DVector<f64>> for Rn {
    fn from(data: DVector<f64>) -> Self {
        Rn { data }
    }
}

impl From<Rn> for DVector<f64> {
    fn from(rn: Rn) -> Self {
        rn.data
    }
}

impl Rn {
    pub fn new(data: DVector<f64>) -> Self {
        Rn { data }
    }

    pub fn from_slice(values: &[f64]) -> Self {
        Rn {
            data: DVector::from_column_slice(values),
        }
    }

    pub fn zeros(dim: usize) -> Self {
        Rn {
            data: DVector::zeros(dim),
        }
    }

    pub fn data(&self) -> &DVector<f64> {
        &self.data
    }

    pub fn dim(&self) -> usize {
        self.data.len()
    }
}

impl Manifold for Rn {
    fn from_vector(data: &DVector<f64>) -> ManifoldResult<Self> {
        check_coordinates(data, data.len())?;
        Ok(Rn { data: data.clone() })
    }

    fn to_vector(&self) -> DVector<f64> {
        self.data.clone()
    }

    fn dof(&self) -> usize {
        self.data.len()
    }

    fn retract(&self, delta: &DVector<f64>) -> ManifoldResult<Self> {
        check_step(delta, self.data.len())?;
        Ok(Rn {
            data: &self.data + delta,
        })
    }

    fn local(&self, other: &Self) -> DVector<f64> {
        &other.data - &self.data
    }

    fn between(
        xi: &Self,
        xj: &Self,
        measured: &Self,
    ) -> (DVector<f64>, DMatrix<f64>, DMatrix<f64>) {
        let n = measured.dim();
        let residual = (&xj.data - &xi.data) - &measured.data;
        let jac_i = -DMatrix::<f64>::identity(n, n);
        let jac_j = DMatrix::<f64>::identity(n, n);
        (residual, jac_i, jac_j)
    }
}
