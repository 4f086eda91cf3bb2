//! Gaussian (linear) factors and the factor graph they form.
//!
//! A [`JacobianFactor`] stores `Σ_j A_j δ_j ≈ b` as one dense block per variable.
//! During Cholesky/LDL elimination, separator messages are kept in information form
//! instead (`HessianFactor`, the augmented matrix `[AᵀA Aᵀb; bᵀA bᵀb]`); that form is
//! private to the elimination code.

use crate::linalg::{LinAlgError, LinAlgResult, VectorValues};
use nalgebra::{DMatrix, DVector};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    fmt::{Display, Formatter},
};

/// Linear factor `½‖Σ_j A_j δ_j - b‖²`.
#[derive(Debug, Clone, PartialEq)]
pub struct JacobianFactor {
    keys: Vec<String>,
    blocks: Vec<DMatrix<f64>>,
    rhs: DVector<f64>,
}

impl JacobianFactor {
    /// Build a factor from one block per key. Shapes are checked by
    /// [`JacobianFactor::check_shape`] before elimination.
    pub fn new(keys: Vec<String>, blocks: Vec<DMatrix<f64>>, rhs: DVector<f64>) -> Self {
        JacobianFactor { keys, blocks, rhs }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn blocks(&self) -> &[DMatrix<f64>] {
        &self.blocks
    }

    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    pub fn rows(&self) -> usize {
        self.rhs.len()
    }

    /// Block of the given variable, if this factor involves it.
    pub fn block(&self, key: &str) -> Option<&DMatrix<f64>> {
        self.keys
            .iter()
            .position(|k| k == key)
            .map(|i| &self.blocks[i])
    }

    /// Check block count, row counts and key uniqueness.
    pub fn check_shape(&self) -> LinAlgResult<()> {
        if self.keys.len() != self.blocks.len() {
            return Err(LinAlgError::DimensionMismatch(format!(
                "factor has {} keys but {} blocks",
                self.keys.len(),
                self.blocks.len()
            )));
        }
        let unique: BTreeSet<&String> = self.keys.iter().collect();
        if unique.len() != self.keys.len() {
            return Err(LinAlgError::DimensionMismatch(format!(
                "factor on [{}] repeats a key",
                self.keys.join(", ")
            )));
        }
        if let Some((key, block)) = self
            .keys
            .iter()
            .zip(&self.blocks)
            .find(|(_, block)| block.nrows() != self.rhs.len())
        {
            return Err(LinAlgError::DimensionMismatch(format!(
                "block of '{key}' has {} rows, rhs has {}",
                block.nrows(),
                self.rhs.len()
            )));
        }
        Ok(())
    }

    /// Residual `Σ_j A_j x_j - b` at `x`. Variables missing from `x` count as zero.
    pub fn residual(&self, x: &VectorValues) -> DVector<f64> {
        let mut residual = -self.rhs.clone();
        for (key, block) in self.keys.iter().zip(&self.blocks) {
            if let Some(xj) = x.get(key) {
                residual += block * xj;
            }
        }
        residual
    }

    /// Error `½‖Σ_j A_j x_j - b‖²` at `x`.
    pub fn error(&self, x: &VectorValues) -> f64 {
        0.5 * self.residual(x).norm_squared()
    }
}

/// Linear factor in information form: `[G g; gᵀ f]` over `keys`.
#[derive(Debug, Clone)]
pub(crate) struct HessianFactor {
    pub(crate) keys: Vec<String>,
    pub(crate) dims: Vec<usize>,
    /// Augmented information matrix of size `(n + 1) × (n + 1)`
    pub(crate) info: DMatrix<f64>,
}

/// A factor as it flows through elimination.
#[derive(Debug, Clone)]
pub(crate) enum EliminationFactor {
    Jacobian(JacobianFactor),
    Hessian(HessianFactor),
}

impl EliminationFactor {
    pub(crate) fn keys(&self) -> &[String] {
        match self {
            EliminationFactor::Jacobian(f) => f.keys(),
            EliminationFactor::Hessian(f) => &f.keys,
        }
    }
}

/// A linear system as a collection of Jacobian factors.
#[derive(Debug, Clone, Default)]
pub struct GaussianFactorGraph {
    factors: Vec<JacobianFactor>,
    dims: BTreeMap<String, usize>,
}

impl GaussianFactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_factors(factors: Vec<JacobianFactor>) -> Self {
        let mut graph = GaussianFactorGraph::new();
        for factor in factors {
            graph.push(factor);
        }
        graph
    }

    /// Add a factor. The first factor seen for a key fixes that key's dimension.
    pub fn push(&mut self, factor: JacobianFactor) {
        for (key, block) in factor.keys().iter().zip(factor.blocks()) {
            self.dims.entry(key.clone()).or_insert(block.ncols());
        }
        self.factors.push(factor);
    }

    pub fn factors(&self) -> &[JacobianFactor] {
        &self.factors
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// The variable set of the system.
    pub fn keys(&self) -> BTreeSet<String> {
        self.dims.keys().cloned().collect()
    }

    pub fn dims(&self) -> &BTreeMap<String, usize> {
        &self.dims
    }

    pub fn dim(&self, key: &str) -> Option<usize> {
        self.dims.get(key).copied()
    }

    /// Total number of columns (sum of variable dimensions).
    pub fn total_dim(&self) -> usize {
        self.dims.values().sum()
    }

    /// Total number of rows.
    pub fn total_rows(&self) -> usize {
        self.factors.iter().map(JacobianFactor::rows).sum()
    }

    /// Squared column norms of the stacked Jacobian, per variable.
    ///
    /// This is the diagonal of `AᵀA` before any elimination, and the reference the
    /// elimination kernels measure each pivot against.
    pub fn column_scales(&self) -> BTreeMap<String, DVector<f64>> {
        let mut scales: BTreeMap<String, DVector<f64>> = self
            .dims
            .iter()
            .map(|(key, &dim)| (key.clone(), DVector::zeros(dim)))
            .collect();
        for factor in &self.factors {
            for (key, block) in factor.keys().iter().zip(factor.blocks()) {
                if let Some(scale) = scales.get_mut(key)
                    && scale.len() == block.ncols()
                {
                    for (j, column) in block.column_iter().enumerate() {
                        scale[j] += column.norm_squared();
                    }
                }
            }
        }
        scales
    }

    /// Check every factor's shape and that all factors agree on each variable's dimension.
    pub fn check_dimensions(&self) -> LinAlgResult<()> {
        for factor in &self.factors {
            factor.check_shape()?;
            for (key, block) in factor.keys().iter().zip(factor.blocks()) {
                let expected = self.dims.get(key).copied().unwrap_or(block.ncols());
                if block.ncols() != expected {
                    return Err(LinAlgError::DimensionMismatch(format!(
                        "variable '{key}' has dimension {expected} in one factor and {} in another",
                        block.ncols()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Error `½ Σ ‖A x - b‖²` of the whole system at `x`.
    pub fn error(&self, x: &VectorValues) -> f64 {
        self.factors.iter().map(|f| f.error(x)).sum()
    }
}

impl Display for GaussianFactorGraph {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "GaussianFactorGraph: {} factors, {} variables, {} x {}",
            self.factors.len(),
            self.dims.len(),
            self.total_rows(),
            self.total_dim()
        )?;
        for (i, factor) in self.factors.iter().enumerate() {
            writeln!(f, "  factor {i}: keys [{}]", factor.keys().join(", "))?;
            for (key, block) in factor.keys().iter().zip(factor.blocks()) {
                write!(f, "    A[{key}] = {block}")?;
            }
            write!(f, "    b = {}", factor.rhs().transpose())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn test_factor_error() {
        let factor = JacobianFactor::new(
            vec![key("a"), key("b")],
            vec![DMatrix::identity(1, 1), -DMatrix::identity(1, 1)],
            DVector::from_vec(vec![1.0]),
        );
        let mut x = VectorValues::new();
        x.insert("a", DVector::from_vec(vec![3.0]));
        x.insert("b", DVector::from_vec(vec![1.0]));
        // (3 - 1) - 1 = 1
        assert!((factor.error(&x) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_check_shape_rows() {
        let factor = JacobianFactor::new(
            vec![key("a")],
            vec![DMatrix::identity(2, 2)],
            DVector::zeros(3),
        );
        assert!(matches!(
            factor.check_shape(),
            Err(LinAlgError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_graph_dimension_conflict() {
        let graph = GaussianFactorGraph::from_factors(vec![
            JacobianFactor::new(vec![key("a")], vec![DMatrix::identity(2, 2)], DVector::zeros(2)),
            JacobianFactor::new(vec![key("a")], vec![DMatrix::identity(3, 3)], DVector::zeros(3)),
        ]);
        assert_eq!(graph.dim("a"), Some(2));
        assert!(graph.check_dimensions().is_err());
    }

    #[test]
    fn test_graph_totals() {
        let graph = GaussianFactorGraph::from_factors(vec![
            JacobianFactor::new(vec![key("a")], vec![DMatrix::identity(2, 2)], DVector::zeros(2)),
            JacobianFactor::new(
                vec![key("a"), key("b")],
                vec![DMatrix::zeros(1, 2), DMatrix::zeros(1, 1)],
                DVector::zeros(1),
            ),
        ]);
        assert_eq!(graph.total_dim(), 3);
        assert_eq!(graph.total_rows(), 3);
        assert_eq!(graph.keys().len(), 2);
        assert!(graph.check_dimensions().is_ok());
    }

    #[test]
    fn test_column_scales_sum_over_factors() {
        let graph = GaussianFactorGraph::from_factors(vec![
            JacobianFactor::new(
                vec![key("a")],
                vec![DMatrix::from_element(1, 1, 1e6)],
                DVector::zeros(1),
            ),
            JacobianFactor::new(
                vec![key("a"), key("b")],
                vec![-DMatrix::identity(1, 1), DMatrix::from_row_slice(1, 2, &[2.0, 0.0])],
                DVector::zeros(1),
            ),
        ]);
        let scales = graph.column_scales();
        assert_eq!(scales["a"][0], 1e12 + 1.0);
        assert_eq!(scales["b"].as_slice(), &[4.0, 0.0]);
    }
}
