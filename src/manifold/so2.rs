//! SO(2) - rotations in the plane
//!
//! Elements are stored as nalgebra's `UnitComplex`, so composition never leaves the
//! unit circle and the reported angle is always in (-π, π]. The tangent space is the
//! single angle increment.

use crate::manifold::{Manifold, ManifoldResult, check_coordinates, check_step};
use nalgebra::{DMatrix, DVector, UnitComplex};
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// SO(2) group element representing a 2D rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct SO2 {
    complex: UnitComplex<f64>,
}

impl Display for SO2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "SO2(angle: {:.4})", self.complex.angle())
    }
}

impl From<SO2> for DVector<f64> {
    fn from(so2: SO2) -> Self {
        DVector::from_vec(vec![so2.complex.angle()])
    }
}

impl SO2 {
    /// Degrees of freedom - dimension of the tangent space
    pub const DOF: usize = 1;

    pub fn identity() -> Self {
        SO2 {
            complex: UnitComplex::identity(),
        }
    }

    pub fn new(complex: UnitComplex<f64>) -> Self {
        SO2 { complex }
    }

    /// Create a rotation from an angle in radians. The stored angle is wrapped.
    pub fn from_angle(angle: f64) -> Self {
        SO2 {
            complex: UnitComplex::new(angle),
        }
    }

    /// Rotation angle in (-π, π].
    pub fn angle(&self) -> f64 {
        self.complex.angle()
    }

    pub fn complex(&self) -> &UnitComplex<f64> {
        &self.complex
    }

    pub fn inverse(&self) -> Self {
        SO2 {
            complex: self.complex.inverse(),
        }
    }

    pub fn compose(&self, other: &Self) -> Self {
        SO2 {
            complex: self.complex * other.complex,
        }
    }
}

/// Wrap an angle into (-π, π].
pub fn wrap_angle(angle: f64) -> f64 {
    UnitComplex::new(angle).angle()
}

impl Manifold for SO2 {
    fn from_vector(data: &DVector<f64>) -> ManifoldResult<Self> {
        check_coordinates(data, 1)?;
        Ok(SO2::from_angle(data[0]))
    }

    fn to_vector(&self) -> DVector<f64> {
        DVector::from_vec(vec![self.angle()])
    }

    fn dof(&self) -> usize {
        Self::DOF
    }

    fn retract(&self, delta: &DVector<f64>) -> ManifoldResult<Self> {
        check_step(delta, Self::DOF)?;
        Ok(self.compose(&SO2::from_angle(delta[0])))
    }

    fn local(&self, other: &Self) -> DVector<f64> {
        DVector::from_vec(vec![self.inverse().compose(other).angle()])
    }

    fn between(
        xi: &Self,
        xj: &Self,
        measured: &Self,
    ) -> (DVector<f64>, DMatrix<f64>, DMatrix<f64>) {
        let error = measured.inverse().compose(&xi.inverse()).compose(xj);
        let residual = DVector::from_vec(vec![error.angle()]);
        let jac_i = DMatrix::from_element(1, 1, -1.0);
        let jac_j = DMatrix::from_element(1, 1, 1.0);
        (residual, jac_i, jac_j)
    }
}
