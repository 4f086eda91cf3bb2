//! Prior factor for unary constraints on variables.

use super::{Factor, FactorError, FactorResult, check_sigma};
use nalgebra::{DMatrix, DVector};

/// Prior factor (unary constraint) on a single variable.
///
/// Anchors a variable to a known value. Without at least one prior (or another absolute
/// measurement) a pose graph is only defined up to a global transform and its linear
/// system is singular.
///
/// # Mathematical Formulation
///
/// ```text
/// r = (x - x_prior) / σ
/// J = I / σ
/// ```
///
/// The difference is taken on the coordinate vector, so for angles the prior should be
/// used close to its target.
///
/// # Example
///
/// ```
/// use factor_gn::factors::{Factor, PriorFactor};
/// use nalgebra::DVector;
///
/// let prior = PriorFactor::new(DVector::from_vec(vec![1.0, 2.0]));
/// let current = DVector::from_vec(vec![1.5, 2.3]);
/// let (residual, jacobian) = prior.linearize(&[current], true).unwrap();
///
/// assert!((residual[0] - 0.5).abs() < 1e-10);
/// assert!((residual[1] - 0.3).abs() < 1e-10);
/// assert_eq!(jacobian.unwrap()[(1, 1)], 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct PriorFactor {
    /// The prior value (measurement or known value)
    pub data: DVector<f64>,
    /// Standard deviation applied to every component
    pub sigma: f64,
}

impl PriorFactor {
    /// Prior with unit standard deviation.
    pub fn new(data: DVector<f64>) -> Self {
        PriorFactor { data, sigma: 1.0 }
    }

    /// Prior with an isotropic standard deviation.
    pub fn with_sigma(data: DVector<f64>, sigma: f64) -> FactorResult<Self> {
        Ok(PriorFactor {
            data,
            sigma: check_sigma(sigma)?,
        })
    }
}

impl Factor for PriorFactor {
    fn linearize(
        &self,
        params: &[DVector<f64>],
        compute_jacobian: bool,
    ) -> FactorResult<(DVector<f64>, Option<DMatrix<f64>>)> {
        let [x] = params else {
            return Err(FactorError::InvalidArity {
                expected: 1,
                actual: params.len(),
            });
        };
        if x.len() != self.data.len() {
            return Err(FactorError::InvalidDimension {
                expected: self.data.len(),
                actual: x.len(),
            });
        }

        let residual = (x - &self.data) / self.sigma;
        let jacobian = compute_jacobian.then(|| {
            DMatrix::<f64>::identity(residual.nrows(), residual.nrows()) / self.sigma
        });
        Ok((residual, jacobian))
    }

    fn get_dimension(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_prior_whitening() -> TestResult {
        let prior = PriorFactor::with_sigma(DVector::from_vec(vec![0.0]), 0.5)?;
        let (r, j) = prior.linearize(&[DVector::from_vec(vec![1.0])], true)?;
        assert!((r[0] - 2.0).abs() < 1e-12);
        assert_eq!(j.map(|j| j[(0, 0)]), Some(2.0));
        Ok(())
    }

    #[test]
    fn test_prior_rejects_bad_sigma() {
        assert!(PriorFactor::with_sigma(DVector::zeros(1), 0.0).is_err());
        assert!(PriorFactor::with_sigma(DVector::zeros(1), f64::NAN).is_err());
    }

    #[test]
    fn test_prior_arity_and_dimension() {
        let prior = PriorFactor::new(DVector::zeros(2));
        assert!(matches!(
            prior.linearize(&[], false),
            Err(FactorError::InvalidArity { expected: 1, actual: 0 })
        ));
        assert!(matches!(
            prior.linearize(&[DVector::zeros(3)], false),
            Err(FactorError::InvalidDimension { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_prior_no_jacobian_requested() -> TestResult {
        let prior = PriorFactor::new(DVector::zeros(2));
        let (_, j) = prior.linearize(&[DVector::zeros(2)], false)?;
        assert!(j.is_none());
        Ok(())
    }
}
