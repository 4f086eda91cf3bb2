use super::{Factor, FactorError, FactorResult, check_sigma};
use crate::manifold::Manifold;
use nalgebra::{DMatrix, DVector};

/// Relative measurement between two variables of the same manifold.
///
/// Given estimates `x_i`, `x_j` and a measurement `z_ij`, the residual is the tangent
/// error of `z_ij⁻¹ ∘ (x_i⁻¹ ∘ x_j)` as defined by [`Manifold::between`], scaled by `1/σ`:
///
/// - **Rⁿ**: `(x_j - x_i) - z`, n-dimensional
/// - **SO(2)**: `wrap(θ_j - θ_i - θ_z)`, 1-dimensional
/// - **SE(2)**: `[R_zᵀ(R_iᵀ(t_j - t_i) - t_z), wrap(θ_j - θ_i - θ_z)]`, 3-dimensional
///
/// The Jacobian is `DOF × 2·DOF`, `[∂r/∂δ_i | ∂r/∂δ_j]`, computed analytically.
///
/// # Example
///
/// ```
/// use factor_gn::factors::{BetweenFactor, Factor};
/// use factor_gn::manifold::se2::SE2;
/// use nalgebra::DVector;
///
/// // Robot moved 1m forward and turned 0.1 rad
/// let between = BetweenFactor::new(SE2::from_xy_angle(1.0, 0.0, 0.1));
///
/// let pose_i = DVector::from_vec(vec![0.0, 0.0, 0.0]);
/// let pose_j = DVector::from_vec(vec![0.95, 0.05, 0.12]);
/// let (residual, jacobian) = between.linearize(&[pose_i, pose_j], true).unwrap();
/// assert_eq!(residual.len(), 3);
/// assert_eq!(jacobian.unwrap().ncols(), 6);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BetweenFactor<M: Manifold> {
    /// The measured relative transformation between the two connected variables
    pub measured: M,
    /// Standard deviation applied to every residual component
    pub sigma: f64,
}

impl<M: Manifold> BetweenFactor<M> {
    pub fn new(measured: M) -> Self {
        BetweenFactor {
            measured,
            sigma: 1.0,
        }
    }

    pub fn with_sigma(measured: M, sigma: f64) -> FactorResult<Self> {
        Ok(BetweenFactor {
            measured,
            sigma: check_sigma(sigma)?,
        })
    }
}

impl<M: Manifold> Factor for BetweenFactor<M> {
    fn linearize(
        &self,
        params: &[DVector<f64>],
        compute_jacobian: bool,
    ) -> FactorResult<(DVector<f64>, Option<DMatrix<f64>>)> {
        let [pi, pj] = params else {
            return Err(FactorError::InvalidArity {
                expected: 2,
                actual: params.len(),
            });
        };
        let to_element = |data: &DVector<f64>| {
            M::from_vector(data).map_err(|e| FactorError::InvalidParameters(e.to_string()))
        };
        let xi = to_element(pi)?;
        let xj = to_element(pj)?;
        let dof = self.measured.dof();
        if xi.dof() != dof || xj.dof() != dof {
            return Err(FactorError::InvalidDimension {
                expected: dof,
                actual: xi.dof().max(xj.dof()),
            });
        }

        let (residual, jac_i, jac_j) = M::between(&xi, &xj, &self.measured);
        let residual = residual / self.sigma;

        let jacobian = compute_jacobian.then(|| {
            let mut jacobian = DMatrix::<f64>::zeros(dof, 2 * dof);
            jacobian.view_mut((0, 0), (dof, dof)).copy_from(&jac_i);
            jacobian.view_mut((0, dof), (dof, dof)).copy_from(&jac_j);
            jacobian / self.sigma
        });

        Ok((residual, jacobian))
    }

    fn get_dimension(&self) -> usize {
        self.measured.dof()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::{rn::Rn, se2::SE2, so2::SO2};
    use std::f64::consts::PI;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_between_rn_layout() -> TestResult {
        let factor = BetweenFactor::new(Rn::from_slice(&[1.0, 2.0]));
        let (r, j) = factor.linearize(
            &[
                DVector::from_vec(vec![0.0, 0.0]),
                DVector::from_vec(vec![1.5, 2.0]),
            ],
            true,
        )?;
        assert!((r[0] - 0.5).abs() < 1e-12);
        assert!(r[1].abs() < 1e-12);
        let j = j.ok_or("missing jacobian")?;
        assert_eq!(j.shape(), (2, 4));
        assert_eq!(j[(0, 0)], -1.0);
        assert_eq!(j[(1, 3)], 1.0);
        Ok(())
    }

    #[test]
    fn test_between_so2_wraps_residual() -> TestResult {
        let factor = BetweenFactor::new(SO2::from_angle(0.2));
        let (r, _) = factor.linearize(
            &[
                DVector::from_vec(vec![PI - 0.1]),
                DVector::from_vec(vec![-PI + 0.1]),
            ],
            false,
        )?;
        assert!(r[0].abs() < 1e-10);
        Ok(())
    }

    #[test]
    fn test_between_se2_sigma_scales() -> TestResult {
        let z = SE2::from_xy_angle(1.0, 0.0, 0.0);
        let unit = BetweenFactor::new(z.clone());
        let scaled = BetweenFactor::with_sigma(z, 0.1)?;
        let params = [
            DVector::from_vec(vec![0.0, 0.0, 0.0]),
            DVector::from_vec(vec![1.1, 0.0, 0.0]),
        ];
        let (r1, j1) = unit.linearize(&params, true)?;
        let (r2, j2) = scaled.linearize(&params, true)?;
        assert!((r2 - r1 * 10.0).norm() < 1e-9);
        let (j1, j2) = (j1.ok_or("missing")?, j2.ok_or("missing")?);
        assert!((j2 - j1 * 10.0).norm() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_between_wrong_arity() {
        let factor = BetweenFactor::new(SO2::identity());
        assert!(matches!(
            factor.linearize(&[DVector::zeros(1)], true),
            Err(FactorError::InvalidArity { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_between_rn_dimension_mismatch() {
        let factor = BetweenFactor::new(Rn::from_slice(&[1.0, 2.0]));
        let result = factor.linearize(&[DVector::zeros(3), DVector::zeros(3)], true);
        assert!(matches!(result, Err(FactorError::InvalidDimension { .. })));
    }
}
