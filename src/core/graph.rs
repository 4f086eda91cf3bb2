//! Nonlinear factor graph.
//!
//! The graph owns a list of [`ResidualBlock`]s and defines the objective
//!
//! ```text
//! error(x) = ½ Σᵢ ‖rᵢ(x)‖²
//! ```
//!
//! It is the optimizer's view of the problem: it can check that a `Values` container
//! covers every variable it references, evaluate the total error, and produce a
//! linear (Gaussian) approximation of itself around a point.
//!
//! With the `parallel` feature the per-factor work runs on rayon. Results are always
//! collected in factor order and reduced sequentially, so the error is bitwise
//! identical with and without the feature.

use crate::core::{CoreError, CoreResult, residual_block::ResidualBlock, values::Values};
use crate::factors::Factor;
use crate::linalg::{GaussianFactorGraph, JacobianFactor};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Collection of nonlinear factors over named variables.
#[derive(Debug, Clone, Default)]
pub struct NonlinearFactorGraph {
    residual_blocks: Vec<ResidualBlock>,
}

impl NonlinearFactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a factor constraining the variables named by `keys`, in the order the factor
    /// expects its parameters. Returns the id of the new residual block.
    pub fn add_factor(&mut self, keys: &[&str], factor: impl Factor + 'static) -> usize {
        self.add_shared_factor(keys, Arc::new(factor))
    }

    /// Add a factor that is already shared, e.g. between several graphs.
    pub fn add_shared_factor(&mut self, keys: &[&str], factor: Arc<dyn Factor>) -> usize {
        let id = self.residual_blocks.len();
        self.residual_blocks
            .push(ResidualBlock::new(id, keys, factor));
        id
    }

    pub fn len(&self) -> usize {
        self.residual_blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residual_blocks.is_empty()
    }

    pub fn residual_blocks(&self) -> &[ResidualBlock] {
        &self.residual_blocks
    }

    /// All variable keys referenced by at least one factor.
    pub fn keys(&self) -> BTreeSet<String> {
        self.residual_blocks
            .iter()
            .flat_map(|block| block.variable_key_list.iter().cloned())
            .collect()
    }

    /// Check that this graph and `values` form a problem an optimizer can start from.
    ///
    /// Fails with [`CoreError::InvalidInput`] when the graph has no factors, or when a
    /// referenced variable has no value.
    pub fn validate(&self, values: &Values) -> CoreResult<()> {
        if self.is_empty() {
            return Err(CoreError::InvalidInput(
                "factor graph contains no factors".to_string(),
            ));
        }
        let missing: Vec<String> = self
            .keys()
            .into_iter()
            .filter(|key| !values.contains(key))
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::InvalidInput(format!(
                "values provide no assignment for: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Total error `½ Σ ‖rᵢ‖²` at `values`.
    pub fn error(&self, values: &Values) -> CoreResult<f64> {
        #[cfg(feature = "parallel")]
        let errors: CoreResult<Vec<f64>> = self
            .residual_blocks
            .par_iter()
            .map(|block| block.error(values))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let errors: CoreResult<Vec<f64>> = self
            .residual_blocks
            .iter()
            .map(|block| block.error(values))
            .collect();

        Ok(errors?.into_iter().sum())
    }

    /// Linearize every factor at `values`.
    pub fn linearize(&self, values: &Values) -> CoreResult<GaussianFactorGraph> {
        #[cfg(feature = "parallel")]
        let factors: CoreResult<Vec<JacobianFactor>> = self
            .residual_blocks
            .par_iter()
            .map(|block| block.linearize(values))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let factors: CoreResult<Vec<JacobianFactor>> = self
            .residual_blocks
            .iter()
            .map(|block| block.linearize(values))
            .collect();

        Ok(GaussianFactorGraph::from_factors(factors?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::{BetweenFactor, PriorFactor};
    use crate::manifold::{ManifoldType, se2::SE2};
    use nalgebra::DVector;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn pose_pair() -> CoreResult<(NonlinearFactorGraph, Values)> {
        let mut graph = NonlinearFactorGraph::new();
        graph.add_factor(&["x0"], PriorFactor::new(DVector::zeros(3)));
        graph.add_factor(
            &["x0", "x1"],
            BetweenFactor::new(SE2::from_xy_angle(1.0, 0.0, 0.0)),
        );

        let mut values = Values::new();
        values.insert("x0", ManifoldType::SE2, DVector::zeros(3))?;
        values.insert("x1", ManifoldType::SE2, DVector::from_vec(vec![1.2, 0.1, 0.0]))?;
        Ok((graph, values))
    }

    #[test]
    fn test_graph_keys_and_error() -> TestResult {
        let (graph, values) = pose_pair()?;
        assert_eq!(graph.len(), 2);
        assert_eq!(
            graph.keys().into_iter().collect::<Vec<_>>(),
            vec!["x0".to_string(), "x1".to_string()]
        );
        // between residual = (0.2, 0.1, 0)
        let expected = 0.5 * (0.2f64.powi(2) + 0.1f64.powi(2));
        assert!((graph.error(&values)? - expected).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_validate_empty_graph() {
        let graph = NonlinearFactorGraph::new();
        assert!(matches!(
            graph.validate(&Values::new()),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_validate_missing_value() -> TestResult {
        let (graph, _) = pose_pair()?;
        let mut partial = Values::new();
        partial.insert_variable("x0", SE2::identity());
        match graph.validate(&partial) {
            Err(CoreError::InvalidInput(msg)) => assert!(msg.contains("x1")),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_linearize_shapes() -> TestResult {
        let (graph, values) = pose_pair()?;
        let linear = graph.linearize(&values)?;
        assert_eq!(linear.len(), 2);
        assert_eq!(linear.dim("x0"), Some(3));
        assert_eq!(linear.dim("x1"), Some(3));
        Ok(())
    }
}
