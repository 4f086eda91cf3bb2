//! Gaussian conditionals and Bayes nets, the output of elimination.
//!
//! Eliminating frontal variables `F` from the factors that touch them leaves a
//! conditional density on `F` given its separator `S`, in square-root form:
//!
//! ```text
//! R x_F + S x_S = d        (R upper triangular)
//! ```
//!
//! Once every parent is known, the frontal values follow by back-substitution.

use crate::linalg::{FactorizationMethod, LinAlgError, LinAlgResult, VectorValues};
use nalgebra::{DMatrix, DVector};

/// Conditional `R x_F + S x_S = d` produced by one elimination step.
#[derive(Debug, Clone)]
pub struct GaussianConditional {
    frontals: Vec<String>,
    frontal_dims: Vec<usize>,
    parents: Vec<String>,
    parent_dims: Vec<usize>,
    r: DMatrix<f64>,
    s: DMatrix<f64>,
    d: DVector<f64>,
    method: FactorizationMethod,
}

impl GaussianConditional {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        frontals: Vec<String>,
        frontal_dims: Vec<usize>,
        parents: Vec<String>,
        parent_dims: Vec<usize>,
        r: DMatrix<f64>,
        s: DMatrix<f64>,
        d: DVector<f64>,
        method: FactorizationMethod,
    ) -> Self {
        GaussianConditional {
            frontals,
            frontal_dims,
            parents,
            parent_dims,
            r,
            s,
            d,
            method,
        }
    }

    pub fn frontals(&self) -> &[String] {
        &self.frontals
    }

    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    pub fn r(&self) -> &DMatrix<f64> {
        &self.r
    }

    pub fn s(&self) -> &DMatrix<f64> {
        &self.s
    }

    pub fn d(&self) -> &DVector<f64> {
        &self.d
    }

    /// Solve for the frontal variables given already-solved parents, inserting the
    /// result into `solution`.
    pub fn solve_into(&self, solution: &mut VectorValues) -> LinAlgResult<()> {
        let mut rhs = self.d.clone();
        let mut col = 0;
        for (parent, &dim) in self.parents.iter().zip(&self.parent_dims) {
            let x = solution.get(parent).ok_or_else(|| {
                LinAlgError::FactorizationFailed(format!(
                    "parent '{parent}' of [{}] is not solved yet",
                    self.frontals.join(", ")
                ))
            })?;
            rhs -= self.s.columns(col, dim) * x;
            col += dim;
        }

        let x_frontal = self.r.solve_upper_triangular(&rhs).ok_or_else(|| {
            LinAlgError::SingularSystem {
                method: self.method,
                detail: format!(
                    "zero diagonal while back-substituting [{}]",
                    self.frontals.join(", ")
                ),
            }
        })?;

        let mut row = 0;
        for (frontal, &dim) in self.frontals.iter().zip(&self.frontal_dims) {
            solution.insert(frontal.clone(), x_frontal.rows(row, dim).into_owned());
            row += dim;
        }
        Ok(())
    }
}

/// Chain of conditionals from sequential elimination, in elimination order.
#[derive(Debug, Clone, Default)]
pub struct GaussianBayesNet {
    conditionals: Vec<GaussianConditional>,
}

impl GaussianBayesNet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, conditional: GaussianConditional) {
        self.conditionals.push(conditional);
    }

    pub fn conditionals(&self) -> &[GaussianConditional] {
        &self.conditionals
    }

    pub fn len(&self) -> usize {
        self.conditionals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditionals.is_empty()
    }

    /// Solve all conditionals, last eliminated first.
    pub fn back_substitute(&self) -> LinAlgResult<VectorValues> {
        let mut solution = VectorValues::new();
        for conditional in self.conditionals.iter().rev() {
            conditional.solve_into(&mut solution)?;
        }
        Ok(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_back_substitution_chain() -> TestResult {
        // 2 a - b = 3, b = 1  =>  a = 2
        let mut net = GaussianBayesNet::new();
        net.push(GaussianConditional::new(
            vec!["a".to_string()],
            vec![1],
            vec!["b".to_string()],
            vec![1],
            DMatrix::from_element(1, 1, 2.0),
            DMatrix::from_element(1, 1, -1.0),
            DVector::from_vec(vec![3.0]),
            FactorizationMethod::Qr,
        ));
        net.push(GaussianConditional::new(
            vec!["b".to_string()],
            vec![1],
            vec![],
            vec![],
            DMatrix::from_element(1, 1, 1.0),
            DMatrix::zeros(1, 0),
            DVector::from_vec(vec![1.0]),
            FactorizationMethod::Qr,
        ));

        let solution = net.back_substitute()?;
        assert!((solution.get("a").ok_or("a")?[0] - 2.0).abs() < 1e-12);
        assert!((solution.get("b").ok_or("b")?[0] - 1.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_unsolved_parent_is_an_error() {
        let conditional = GaussianConditional::new(
            vec!["a".to_string()],
            vec![1],
            vec!["b".to_string()],
            vec![1],
            DMatrix::from_element(1, 1, 1.0),
            DMatrix::from_element(1, 1, 1.0),
            DVector::zeros(1),
            FactorizationMethod::Ldl,
        );
        let mut solution = VectorValues::new();
        assert!(conditional.solve_into(&mut solution).is_err());
    }
}
