//! Residual blocks that tie a factor to the variables it constrains.
//!
//! A `ResidualBlock` is one entry of a
//! [`NonlinearFactorGraph`](crate::core::graph::NonlinearFactorGraph): an id, the ordered
//! list of variable keys, and the [`Factor`] evaluating residuals and Jacobians over them.
//!
//! The factor sees the variables as a slice of coordinate vectors, in key order, and
//! returns one Jacobian spanning all of their tangent dimensions. The block checks that
//! contract and splits the Jacobian into per-variable blocks, which is the shape the
//! linear layer works with.

use crate::core::{CoreError, CoreResult, values::Values};
use crate::factors::Factor;
use crate::linalg::JacobianFactor;
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

/// One factor of the nonlinear graph together with its variable keys.
#[derive(Clone)]
pub struct ResidualBlock {
    pub residual_block_id: usize,
    pub variable_key_list: Vec<String>,
    pub factor: Arc<dyn Factor>,
}

impl std::fmt::Debug for ResidualBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResidualBlock")
            .field("residual_block_id", &self.residual_block_id)
            .field("variable_key_list", &self.variable_key_list)
            .field("dimension", &self.factor.get_dimension())
            .finish()
    }
}

impl ResidualBlock {
    pub fn new(residual_block_id: usize, variable_key_list: &[&str], factor: Arc<dyn Factor>) -> Self {
        ResidualBlock {
            residual_block_id,
            variable_key_list: variable_key_list.iter().map(|s| s.to_string()).collect(),
            factor,
        }
    }

    fn gather_params(&self, values: &Values) -> CoreResult<Vec<DVector<f64>>> {
        self.variable_key_list
            .iter()
            .map(|key| values.vector(key))
            .collect()
    }

    /// Residual of this block at `values`.
    pub fn residual(&self, values: &Values) -> CoreResult<DVector<f64>> {
        let params = self.gather_params(values)?;
        let (residual, _) = self.factor.linearize(&params, false)?;
        if residual.len() != self.factor.get_dimension() {
            return Err(CoreError::ResidualBlock(format!(
                "block {} produced a residual of length {}, expected {}",
                self.residual_block_id,
                residual.len(),
                self.factor.get_dimension()
            )));
        }
        Ok(residual)
    }

    /// Error contribution `½‖r‖²` of this block.
    pub fn error(&self, values: &Values) -> CoreResult<f64> {
        let residual = self.residual(values)?;
        Ok(0.5 * residual.norm_squared())
    }

    /// Linearize at `values` into a Jacobian factor `Σ A_j δx_j ≈ -r`.
    pub fn linearize(&self, values: &Values) -> CoreResult<JacobianFactor> {
        let params = self.gather_params(values)?;
        let dims = self
            .variable_key_list
            .iter()
            .map(|key| values.tangent_dim(key))
            .collect::<CoreResult<Vec<usize>>>()?;
        let total_dim: usize = dims.iter().sum();

        let (residual, jacobian) = self.factor.linearize(&params, true)?;
        let jacobian: DMatrix<f64> = jacobian.ok_or_else(|| {
            CoreError::FactorLinearization(format!(
                "block {} returned no Jacobian",
                self.residual_block_id
            ))
            .log()
        })?;

        if jacobian.nrows() != residual.len() || jacobian.ncols() != total_dim {
            return Err(CoreError::DimensionMismatch(format!(
                "block {} Jacobian is {}x{}, expected {}x{}",
                self.residual_block_id,
                jacobian.nrows(),
                jacobian.ncols(),
                residual.len(),
                total_dim
            )));
        }

        let rows = residual.len();
        let mut blocks = Vec::with_capacity(dims.len());
        let mut col_offset = 0;
        for &dim in &dims {
            blocks.push(jacobian.view((0, col_offset), (rows, dim)).into_owned());
            col_offset += dim;
        }

        Ok(JacobianFactor::new(
            self.variable_key_list.clone(),
            blocks,
            -residual,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::{BetweenFactor, PriorFactor};
    use crate::manifold::{ManifoldType, rn::Rn};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn two_scalar_values() -> CoreResult<Values> {
        let mut values = Values::new();
        values.insert("a", ManifoldType::RN, DVector::from_vec(vec![1.0]))?;
        values.insert("b", ManifoldType::RN, DVector::from_vec(vec![4.0]))?;
        Ok(values)
    }

    #[test]
    fn test_block_error() -> TestResult {
        let values = two_scalar_values()?;
        let block = ResidualBlock::new(
            0,
            &["a"],
            Arc::new(PriorFactor::new(DVector::from_vec(vec![3.0]))),
        );
        assert!((block.error(&values)? - 2.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_block_linearize_splits_jacobian() -> TestResult {
        let values = two_scalar_values()?;
        let block = ResidualBlock::new(
            3,
            &["a", "b"],
            Arc::new(BetweenFactor::new(Rn::from_slice(&[2.0]))),
        );
        let linear = block.linearize(&values)?;
        assert_eq!(linear.keys(), &["a".to_string(), "b".to_string()]);
        assert_eq!(linear.blocks()[0][(0, 0)], -1.0);
        assert_eq!(linear.blocks()[1][(0, 0)], 1.0);
        // r = (4 - 1) - 2 = 1, rhs = -r
        assert!((linear.rhs()[0] + 1.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_block_missing_variable() -> TestResult {
        let values = two_scalar_values()?;
        let block = ResidualBlock::new(
            0,
            &["missing"],
            Arc::new(PriorFactor::new(DVector::zeros(1))),
        );
        assert!(matches!(block.error(&values), Err(CoreError::Variable(_))));
        Ok(())
    }
}
