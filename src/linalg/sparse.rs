//! Whole-system sparse view of a [`GaussianFactorGraph`].
//!
//! Elimination never forms the global matrix. This view exists for diagnostics (the
//! gradient at the linearization point) and as an independent normal-equation solve
//! to check elimination results against.

use crate::linalg::{
    FactorizationMethod, GaussianFactorGraph, LinAlgError, LinAlgResult, Ordering, VectorValues,
};
use faer::{
    Mat, Side,
    linalg::solvers::Solve,
    sparse::linalg::solvers::{Llt, SymbolicLlt},
    sparse::{SparseColMat, Triplet},
};
use nalgebra::DVector;
use std::ops::Mul;

/// Stacked Jacobian `A` and right-hand side `b`, columns laid out in ordering.
#[derive(Debug, Clone)]
pub struct SparseLinearSystem {
    jacobian: SparseColMat<usize, f64>,
    rhs: Mat<f64>,
    /// (key, first column, dimension) for each variable
    columns: Vec<(String, usize, usize)>,
}

impl SparseLinearSystem {
    /// Assemble `A` and `b` with variable columns in the order of `ordering`.
    pub fn assemble(graph: &GaussianFactorGraph, ordering: &Ordering) -> LinAlgResult<Self> {
        graph.check_dimensions()?;
        ordering.validate(&graph.keys())?;

        let mut columns = Vec::with_capacity(ordering.len());
        let mut offset = 0;
        for key in ordering.iter() {
            let dim = graph.dim(key).ok_or_else(|| {
                LinAlgError::DimensionMismatch(format!("unknown variable '{key}'"))
            })?;
            columns.push((key.clone(), offset, dim));
            offset += dim;
        }
        let positions = ordering.positions();

        let nrows = graph.total_rows();
        let mut triplets = Vec::new();
        let mut rhs = Mat::zeros(nrows, 1);
        let mut row = 0;
        for factor in graph.factors() {
            for (key, block) in factor.keys().iter().zip(factor.blocks()) {
                let col = positions
                    .get(key.as_str())
                    .map(|&p| columns[p].1)
                    .ok_or_else(|| {
                        LinAlgError::DimensionMismatch(format!("unknown variable '{key}'"))
                    })?;
                for c in 0..block.ncols() {
                    for r in 0..block.nrows() {
                        let value = block[(r, c)];
                        if value != 0.0 {
                            triplets.push(Triplet::new(row + r, col + c, value));
                        }
                    }
                }
            }
            for r in 0..factor.rows() {
                rhs[(row + r, 0)] = factor.rhs()[r];
            }
            row += factor.rows();
        }

        let jacobian = SparseColMat::try_new_from_triplets(nrows, offset, &triplets).map_err(|e| {
            LinAlgError::SparseMatrixCreation("Failed to assemble the stacked Jacobian".to_string())
                .log_with_source(e)
        })?;

        Ok(SparseLinearSystem {
            jacobian,
            rhs,
            columns,
        })
    }

    pub fn jacobian(&self) -> &SparseColMat<usize, f64> {
        &self.jacobian
    }

    pub fn rhs(&self) -> &Mat<f64> {
        &self.rhs
    }

    pub fn nrows(&self) -> usize {
        self.jacobian.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.jacobian.ncols()
    }

    /// Gradient of `½‖A δ - b‖²` at `δ = 0`, that is `-Aᵀb`.
    pub fn gradient_at_zero(&self) -> Mat<f64> {
        let atb = self.jacobian.as_ref().transpose().mul(&self.rhs);
        -&atb
    }

    /// Solve `AᵀA δ = Aᵀb` with a sparse Cholesky factorization.
    pub fn solve_normal_equations(&self) -> LinAlgResult<Mat<f64>> {
        let jt = self.jacobian.as_ref().transpose();
        let hessian = jt
            .to_col_major()
            .map_err(|e| {
                LinAlgError::MatrixConversion(
                    "Failed to convert transposed Jacobian to column-major format".to_string(),
                )
                .log_with_source(e)
            })?
            .mul(self.jacobian.as_ref());
        let atb = jt.mul(&self.rhs);

        let symbolic = SymbolicLlt::try_new(hessian.symbolic(), Side::Lower).map_err(|e| {
            LinAlgError::FactorizationFailed("Symbolic Cholesky decomposition failed".to_string())
                .log_with_source(e)
        })?;
        let cholesky = Llt::try_new_with_symbolic(symbolic, hessian.as_ref(), Side::Lower)
            .map_err(|e| LinAlgError::SingularSystem {
                method: FactorizationMethod::Cholesky,
                detail: format!("normal equations are not positive definite ({e:?})"),
            })?;

        Ok(cholesky.solve(atb))
    }

    /// Split a stacked column vector back into per-variable entries.
    pub fn to_vector_values(&self, x: &Mat<f64>) -> LinAlgResult<VectorValues> {
        if x.nrows() != self.ncols() || x.ncols() != 1 {
            return Err(LinAlgError::DimensionMismatch(format!(
                "expected a {} x 1 vector, got {} x {}",
                self.ncols(),
                x.nrows(),
                x.ncols()
            )));
        }
        let mut values = VectorValues::new();
        for (key, offset, dim) in &self.columns {
            values.insert(key.clone(), DVector::from_fn(*dim, |i, _| x[(offset + i, 0)]));
        }
        Ok(values)
    }
}
