//! SE(2) - rigid motions in the plane
//!
//! Poses use the coordinate layout `[x, y, theta]` (the g2o convention). The tangent
//! step shares that layout: translation is updated additively in the world frame and
//! the heading is composed on SO(2), so it stays wrapped in (-π, π].
//!
//! The between error follows the classic 2D pose-graph formulation:
//!
//! ```text
//! e_t = R_zᵀ (R_iᵀ (t_j - t_i) - t_z)
//! e_θ = wrap(θ_j - θ_i - θ_z)
//! ```

use crate::manifold::{Manifold, ManifoldResult, check_coordinates, check_step};
use nalgebra::{DMatrix, DVector, Matrix2, UnitComplex, Vector2};
use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// SE(2) group element: a 2D position with a heading.
#[derive(Debug, Clone, PartialEq)]
pub struct SE2 {
    translation: Vector2<f64>,
    rotation: UnitComplex<f64>,
}

impl Display for SE2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SE2(x: {:.4}, y: {:.4}, theta: {:.4})",
            self.translation.x,
            self.translation.y,
            self.rotation.angle()
        )
    }
}

impl From<SE2> for DVector<f64> {
    fn from(se2: SE2) -> Self {
        se2.to_vector()
    }
}

impl SE2 {
    /// Degrees of freedom - dimension of the tangent space
    pub const DOF: usize = 3;

    pub fn identity() -> Self {
        SE2 {
            translation: Vector2::zeros(),
            rotation: UnitComplex::identity(),
        }
    }

    pub fn new(translation: Vector2<f64>, rotation: UnitComplex<f64>) -> Self {
        SE2 {
            translation,
            rotation,
        }
    }

    pub fn from_xy_angle(x: f64, y: f64, theta: f64) -> Self {
        SE2 {
            translation: Vector2::new(x, y),
            rotation: UnitComplex::new(theta),
        }
    }

    pub fn x(&self) -> f64 {
        self.translation.x
    }

    pub fn y(&self) -> f64 {
        self.translation.y
    }

    pub fn angle(&self) -> f64 {
        self.rotation.angle()
    }

    pub fn translation(&self) -> &Vector2<f64> {
        &self.translation
    }

    pub fn rotation(&self) -> &UnitComplex<f64> {
        &self.rotation
    }

    /// Group composition `self ∘ other`.
    pub fn compose(&self, other: &Self) -> Self {
        SE2 {
            translation: self.translation + self.rotation * other.translation,
            rotation: self.rotation * other.rotation,
        }
    }

    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        SE2 {
            translation: -(rotation * self.translation),
            rotation,
        }
    }
}

impl Manifold for SE2 {
    fn from_vector(data: &DVector<f64>) -> ManifoldResult<Self> {
        check_coordinates(data, 3)?;
        Ok(SE2::from_xy_angle(data[0], data[1], data[2]))
    }

    fn to_vector(&self) -> DVector<f64> {
        DVector::from_vec(vec![
            self.translation.x,
            self.translation.y,
            self.rotation.angle(),
        ])
    }

    fn dof(&self) -> usize {
        Self::DOF
    }

    fn retract(&self, delta: &DVector<f64>) -> ManifoldResult<Self> {
        check_step(delta, Self::DOF)?;
        Ok(SE2 {
            translation: self.translation + Vector2::new(delta[0], delta[1]),
            rotation: self.rotation * UnitComplex::new(delta[2]),
        })
    }

    fn local(&self, other: &Self) -> DVector<f64> {
        let dt = other.translation - self.translation;
        let dtheta = (self.rotation.inverse() * other.rotation).angle();
        DVector::from_vec(vec![dt.x, dt.y, dtheta])
    }

    fn between(
        xi: &Self,
        xj: &Self,
        measured: &Self,
    ) -> (DVector<f64>, DMatrix<f64>, DMatrix<f64>) {
        let rz_t = measured.rotation.inverse();
        let delta_t = xj.translation - xi.translation;

        // A = R_zᵀ R_iᵀ
        let a: Matrix2<f64> = (rz_t * xi.rotation.inverse())
            .to_rotation_matrix()
            .into_inner();
        let e_t = a * delta_t - rz_t * measured.translation;
        let e_theta = (rz_t * xi.rotation.inverse() * xj.rotation).angle();

        // d(R_iᵀ)/dθ_i applied to (t_j - t_i)
        let (s, c) = xi.rotation.angle().sin_cos();
        let d_rit = Matrix2::new(-s, c, -c, -s);
        let de_dtheta_i = rz_t.to_rotation_matrix().into_inner() * d_rit * delta_t;

        let mut jac_i = DMatrix::<f64>::zeros(3, 3);
        jac_i.view_mut((0, 0), (2, 2)).copy_from(&(-a));
        jac_i[(0, 2)] = de_dtheta_i.x;
        jac_i[(1, 2)] = de_dtheta_i.y;
        jac_i[(2, 2)] = -1.0;

        let mut jac_j = DMatrix::<f64>::zeros(3, 3);
        jac_j.view_mut((0, 0), (2, 2)).copy_from(&a);
        jac_j[(2, 2)] = 1.0;

        let residual = DVector::from_vec(vec![e_t.x, e_t.y, e_theta]);
        (residual, jac_i, jac_j)
    }
}
