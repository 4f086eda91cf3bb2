//! Dense kernels for a single elimination step.
//!
//! Given the factors touching a set of frontal variables, a step produces the
//! conditional on those frontals and a new factor on the separator (the remaining
//! variables of the gathered factors).
//!
//! - **QR** stacks the factors into `[A | b]` and takes a Householder QR. The top rows
//!   of `R` form the conditional, the rows below the frontal block become a Jacobian
//!   factor on the separator.
//! - **Cholesky / LDL** sum the factors into the augmented information matrix
//!   `[AᵀA Aᵀb; bᵀA bᵀb]`, factor the frontal block (`RᵀR` with nalgebra, `LDLᵀ` with
//!   faer) and pass the Schur complement on as an information-form factor.
//!
//! Every pivot is judged relative to its own column of the original system, never to
//! the scale of other variables. A pivot at or below that tolerance means the system does not determine
//! the frontal variables, and is reported as [`LinAlgError::SingularSystem`].

use crate::linalg::gaussian_factor::{EliminationFactor, HessianFactor};
use crate::linalg::{
    FactorizationMethod, GaussianConditional, JacobianFactor, LinAlgError, LinAlgResult,
};
use faer::{Mat, Side};
use nalgebra::{Cholesky, DMatrix, DVector};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Relative tolerance on `|R_ii|` against the norm of column `i` of the original system.
const QR_RANK_TOLERANCE: f64 = 1e-10;

/// Relative tolerance on an information-matrix pivot against its column's original
/// diagonal entry.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Column layout of one elimination step: frontals first, then separator keys.
struct Scope {
    keys: Vec<String>,
    dims: Vec<usize>,
    offsets: HashMap<String, usize>,
    frontal_count: usize,
    frontal_dim: usize,
    total_dim: usize,
    /// Squared column norms of the original system, one per frontal column
    frontal_scales: Vec<f64>,
}

impl Scope {
    fn new(
        factors: &[EliminationFactor],
        frontals: &[String],
        dims: &BTreeMap<String, usize>,
        scales: &BTreeMap<String, DVector<f64>>,
    ) -> LinAlgResult<Self> {
        let frontal_set: BTreeSet<&String> = frontals.iter().collect();
        let separator: BTreeSet<&String> = factors
            .iter()
            .flat_map(|factor| factor.keys())
            .filter(|key| !frontal_set.contains(key))
            .collect();

        let mut keys = Vec::with_capacity(frontals.len() + separator.len());
        let mut key_dims = Vec::with_capacity(keys.capacity());
        let mut offsets = HashMap::new();
        let mut offset = 0;
        for key in frontals.iter().chain(separator) {
            let dim = dims.get(key).copied().ok_or_else(|| {
                LinAlgError::DimensionMismatch(format!("unknown variable '{key}'"))
            })?;
            offsets.insert(key.clone(), offset);
            keys.push(key.clone());
            key_dims.push(dim);
            offset += dim;
        }

        let frontal_dim = key_dims[..frontals.len()].iter().sum();
        let mut frontal_scales = Vec::with_capacity(frontal_dim);
        for (key, &dim) in frontals.iter().zip(&key_dims) {
            match scales.get(key) {
                Some(scale) if scale.len() == dim => frontal_scales.extend(scale.iter()),
                _ => frontal_scales.extend(std::iter::repeat_n(0.0, dim)),
            }
        }

        Ok(Scope {
            keys,
            dims: key_dims,
            offsets,
            frontal_count: frontals.len(),
            frontal_dim,
            total_dim: offset,
            frontal_scales,
        })
    }

    fn offset(&self, key: &str) -> LinAlgResult<usize> {
        self.offsets.get(key).copied().ok_or_else(|| {
            LinAlgError::DimensionMismatch(format!("variable '{key}' is outside the step scope"))
        })
    }

    fn separator_dim(&self) -> usize {
        self.total_dim - self.frontal_dim
    }

    fn separator_keys(&self) -> &[String] {
        &self.keys[self.frontal_count..]
    }

    fn separator_dims(&self) -> &[usize] {
        &self.dims[self.frontal_count..]
    }

    fn describe_frontals(&self) -> String {
        self.keys[..self.frontal_count].join(", ")
    }

    /// Global column indices of a factor's local columns, with the rhs column last.
    fn index_map(&self, keys: &[String], dims: &[usize]) -> LinAlgResult<Vec<usize>> {
        let mut index = Vec::with_capacity(dims.iter().sum::<usize>() + 1);
        for (key, &dim) in keys.iter().zip(dims) {
            let offset = self.offset(key)?;
            index.extend(offset..offset + dim);
        }
        index.push(self.total_dim);
        Ok(index)
    }

    fn conditional(
        &self,
        r: DMatrix<f64>,
        s: DMatrix<f64>,
        d: DVector<f64>,
        method: FactorizationMethod,
    ) -> GaussianConditional {
        GaussianConditional::new(
            self.keys[..self.frontal_count].to_vec(),
            self.dims[..self.frontal_count].to_vec(),
            self.separator_keys().to_vec(),
            self.separator_dims().to_vec(),
            r,
            s,
            d,
            method,
        )
    }
}

fn singular(method: FactorizationMethod, detail: String) -> LinAlgError {
    LinAlgError::SingularSystem { method, detail }
}

/// Eliminate `frontals` from `factors`.
///
/// Returns the conditional on the frontals and, if the separator is not empty, the
/// factor passed on to the rest of the elimination. `scales` holds the squared column
/// norms of the original system (see [`GaussianFactorGraph::column_scales`]) and sets
/// the rank tolerance of each frontal column.
///
/// [`GaussianFactorGraph::column_scales`]: crate::linalg::GaussianFactorGraph::column_scales
pub(crate) fn eliminate_frontals(
    factors: Vec<EliminationFactor>,
    frontals: &[String],
    dims: &BTreeMap<String, usize>,
    scales: &BTreeMap<String, DVector<f64>>,
    method: FactorizationMethod,
) -> LinAlgResult<(GaussianConditional, Option<EliminationFactor>)> {
    if factors.is_empty() {
        return Err(singular(
            method,
            format!("no factor constrains [{}]", frontals.join(", ")),
        ));
    }
    let scope = Scope::new(&factors, frontals, dims, scales)?;

    match method {
        FactorizationMethod::Qr => eliminate_qr(&factors, &scope),
        FactorizationMethod::Cholesky => {
            eliminate_information(&factors, &scope, method, cholesky_frontal)
        }
        FactorizationMethod::Ldl => eliminate_information(&factors, &scope, method, ldl_frontal),
    }
}

fn eliminate_qr(
    factors: &[EliminationFactor],
    scope: &Scope,
) -> LinAlgResult<(GaussianConditional, Option<EliminationFactor>)> {
    let method = FactorizationMethod::Qr;
    let n = scope.total_dim;
    let nf = scope.frontal_dim;

    let mut jacobians = Vec::with_capacity(factors.len());
    for factor in factors {
        match factor {
            EliminationFactor::Jacobian(jf) => jacobians.push(jf),
            EliminationFactor::Hessian(_) => {
                return Err(LinAlgError::FactorizationFailed(
                    "QR elimination received a factor in information form".to_string(),
                ));
            }
        }
    }

    let rows: usize = jacobians.iter().map(|jf| jf.rows()).sum();
    if rows < nf {
        return Err(singular(
            method,
            format!(
                "{rows} rows cannot determine the {nf} frontal dimensions of [{}]",
                scope.describe_frontals()
            ),
        ));
    }

    let mut ab = DMatrix::<f64>::zeros(rows, n + 1);
    let mut row = 0;
    for jf in jacobians {
        for (key, block) in jf.keys().iter().zip(jf.blocks()) {
            let col = scope.offset(key)?;
            ab.view_mut((row, col), (jf.rows(), block.ncols()))
                .copy_from(block);
        }
        ab.view_mut((row, n), (jf.rows(), 1)).copy_from(jf.rhs());
        row += jf.rows();
    }

    let r = ab.qr().r();

    // |R_ii| is the distance of column i from the span of the columns before it
    for (i, scale) in scope.frontal_scales.iter().enumerate() {
        if !(r[(i, i)].abs() > QR_RANK_TOLERANCE * scale.sqrt()) {
            return Err(singular(
                method,
                format!(
                    "rank deficient at column {i} while eliminating [{}]",
                    scope.describe_frontals()
                ),
            ));
        }
    }

    let ns = scope.separator_dim();
    let conditional = scope.conditional(
        r.view((0, 0), (nf, nf)).into_owned(),
        r.view((0, nf), (nf, ns)).into_owned(),
        r.column(n).rows(0, nf).into_owned(),
        method,
    );

    // rows of R below the frontal block that still touch separator columns
    let remaining = r.nrows().min(n).saturating_sub(nf);
    let message = if ns > 0 && remaining > 0 {
        let mut blocks = Vec::with_capacity(scope.separator_keys().len());
        for (key, &dim) in scope.separator_keys().iter().zip(scope.separator_dims()) {
            let col = scope.offset(key)?;
            blocks.push(r.view((nf, col), (remaining, dim)).into_owned());
        }
        Some(EliminationFactor::Jacobian(JacobianFactor::new(
            scope.separator_keys().to_vec(),
            blocks,
            r.column(n).rows(nf, remaining).into_owned(),
        )))
    } else {
        None
    };

    Ok((conditional, message))
}

/// Frontal part of an information-form step.
///
/// `r x_F + rhs[.., ..ns] x_S = rhs[.., ns]` is the conditional on the frontals and
/// `update = [H_FS | g_F]ᵀ H_FF⁻¹ [H_FS | g_F]` is subtracted from the separator block.
struct FrontalSolve {
    r: DMatrix<f64>,
    rhs: DMatrix<f64>,
    update: DMatrix<f64>,
}

/// Factor `H_FF` and solve it against `[H_FS | g_F]`, checking pivots against `scales`.
type FrontalKernel =
    fn(&DMatrix<f64>, &DMatrix<f64>, &[f64]) -> Result<FrontalSolve, String>;

/// A pivot is measured against its own column's scale in the original system, so a
/// tightly constrained variable does not mask a weakly constrained one.
fn check_pivot(column: usize, pivot: f64, scale: f64) -> Result<(), String> {
    if pivot > PIVOT_TOLERANCE * scale && pivot > 0.0 {
        Ok(())
    } else {
        Err(format!("pivot {pivot:.3e} at column {column}"))
    }
}

/// `H_FF = RᵀR` with nalgebra's Cholesky, then `W = R⁻ᵀ [H_FS | g_F]`.
fn cholesky_frontal(
    h_ff: &DMatrix<f64>,
    rest: &DMatrix<f64>,
    scales: &[f64],
) -> Result<FrontalSolve, String> {
    let cholesky = Cholesky::new(h_ff.clone())
        .ok_or_else(|| "block is not positive definite".to_string())?;
    let l = cholesky.l();
    for i in 0..l.nrows() {
        check_pivot(i, l[(i, i)] * l[(i, i)], scales[i])?;
    }

    let w = l
        .solve_lower_triangular(rest)
        .ok_or_else(|| "zero diagonal in the Cholesky factor".to_string())?;
    let update = w.transpose() * &w;
    Ok(FrontalSolve {
        r: l.transpose(),
        rhs: w,
        update,
    })
}

/// `H_FF = L D Lᵀ` with faer's dense LDLᵀ.
///
/// `D` is never square-rooted: the conditional is `Lᵀ x_F + S x_S = d` with
/// `[S | d] = D⁻¹ L⁻¹ [H_FS | g_F]`, and the update is `Yᵀ D⁻¹ Y` for `Y = L⁻¹ [H_FS | g_F]`.
fn ldl_frontal(
    h_ff: &DMatrix<f64>,
    rest: &DMatrix<f64>,
    scales: &[f64],
) -> Result<FrontalSolve, String> {
    let n = h_ff.nrows();
    let ldlt = Mat::from_fn(n, n, |i, j| h_ff[(i, j)])
        .ldlt(Side::Lower)
        .map_err(|e| format!("LDLᵀ factorization failed ({e})"))?;
    let (l_factor, d_factor) = (ldlt.L(), ldlt.D());

    let d = DVector::from_fn(n, |i, _| d_factor[i]);
    for i in 0..n {
        check_pivot(i, d[i], scales[i])?;
    }

    let l = DMatrix::from_fn(n, n, |i, j| l_factor[(i, j)]);
    let y = l
        .solve_lower_triangular(rest)
        .ok_or_else(|| "zero diagonal in the unit LDLᵀ factor".to_string())?;
    let mut z = y.clone();
    for (i, mut row) in z.row_iter_mut().enumerate() {
        row /= d[i];
    }
    let update = y.transpose() * &z;
    Ok(FrontalSolve {
        r: l.transpose(),
        rhs: z,
        update,
    })
}

fn scatter(h: &mut DMatrix<f64>, local: &DMatrix<f64>, index: &[usize]) {
    for (li, &gi) in index.iter().enumerate() {
        for (lj, &gj) in index.iter().enumerate() {
            h[(gi, gj)] += local[(li, lj)];
        }
    }
}

fn eliminate_information(
    factors: &[EliminationFactor],
    scope: &Scope,
    method: FactorizationMethod,
    kernel: FrontalKernel,
) -> LinAlgResult<(GaussianConditional, Option<EliminationFactor>)> {
    let n = scope.total_dim;
    let nf = scope.frontal_dim;
    let ns = scope.separator_dim();

    let mut h = DMatrix::<f64>::zeros(n + 1, n + 1);
    for factor in factors {
        match factor {
            EliminationFactor::Jacobian(jf) => {
                let dims: Vec<usize> = jf.blocks().iter().map(|b| b.ncols()).collect();
                let local_n: usize = dims.iter().sum();
                let mut ab = DMatrix::<f64>::zeros(jf.rows(), local_n + 1);
                let mut col = 0;
                for block in jf.blocks() {
                    ab.view_mut((0, col), (jf.rows(), block.ncols()))
                        .copy_from(block);
                    col += block.ncols();
                }
                ab.view_mut((0, local_n), (jf.rows(), 1))
                    .copy_from(jf.rhs());
                let index = scope.index_map(jf.keys(), &dims)?;
                scatter(&mut h, &(ab.transpose() * &ab), &index);
            }
            EliminationFactor::Hessian(hf) => {
                let index = scope.index_map(&hf.keys, &hf.dims)?;
                scatter(&mut h, &hf.info, &index);
            }
        }
    }

    let h_ff = h.view((0, 0), (nf, nf)).into_owned();
    let rest = h.view((0, nf), (nf, ns + 1)).into_owned();
    let frontal = kernel(&h_ff, &rest, &scope.frontal_scales).map_err(|detail| {
        singular(
            method,
            format!("{detail} while eliminating [{}]", scope.describe_frontals()),
        )
    })?;

    let conditional = scope.conditional(
        frontal.r,
        frontal.rhs.columns(0, ns).into_owned(),
        frontal.rhs.column(ns).into_owned(),
        method,
    );

    let message = if ns > 0 {
        let schur = h.view((nf, nf), (ns + 1, ns + 1)) - frontal.update;
        Some(EliminationFactor::Hessian(HessianFactor {
            keys: scope.separator_keys().to_vec(),
            dims: scope.separator_dims().to_vec(),
            info: schur,
        }))
    } else {
        None
    };

    Ok((conditional, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{GaussianFactorGraph, VectorValues};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const METHODS: [FactorizationMethod; 3] = [
        FactorizationMethod::Ldl,
        FactorizationMethod::Qr,
        FactorizationMethod::Cholesky,
    ];

    fn dims(entries: &[(&str, usize)]) -> BTreeMap<String, usize> {
        entries.iter().map(|(k, d)| (k.to_string(), *d)).collect()
    }

    fn jacobian(keys: &[&str], blocks: Vec<DMatrix<f64>>, rhs: &[f64]) -> EliminationFactor {
        EliminationFactor::Jacobian(JacobianFactor::new(
            keys.iter().map(|k| k.to_string()).collect(),
            blocks,
            DVector::from_column_slice(rhs),
        ))
    }

    fn scales_of(factors: &[EliminationFactor]) -> BTreeMap<String, DVector<f64>> {
        let jacobians = factors
            .iter()
            .filter_map(|factor| match factor {
                EliminationFactor::Jacobian(jf) => Some(jf.clone()),
                EliminationFactor::Hessian(_) => None,
            })
            .collect();
        GaussianFactorGraph::from_factors(jacobians).column_scales()
    }

    fn spd_block() -> (DMatrix<f64>, DMatrix<f64>) {
        let h = DMatrix::from_row_slice(3, 3, &[4.0, 2.0, 0.6, 2.0, 5.0, 1.0, 0.6, 1.0, 3.0]);
        let rest = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, -0.5, 0.0, 0.3, 1.5]);
        (h, rest)
    }

    #[test]
    fn test_ldl_keeps_unit_diagonal() -> TestResult {
        let (h, rest) = spd_block();
        let ldl = ldl_frontal(&h, &rest, h.diagonal().as_slice())?;
        for i in 0..3 {
            assert!((ldl.r[(i, i)] - 1.0).abs() < 1e-12);
        }
        let chol = cholesky_frontal(&h, &rest, h.diagonal().as_slice())?;
        assert!((chol.r[(0, 0)] - 2.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_ldl_and_cholesky_agree_on_solution_and_update() -> TestResult {
        let (h, rest) = spd_block();
        let ldl = ldl_frontal(&h, &rest, h.diagonal().as_slice())?;
        let chol = cholesky_frontal(&h, &rest, h.diagonal().as_slice())?;

        let expected = h.clone().lu().solve(&rest).ok_or("h is invertible")?;
        let x_ldl = ldl.r.solve_upper_triangular(&ldl.rhs).ok_or("unit diagonal")?;
        let x_chol = chol.r.solve_upper_triangular(&chol.rhs).ok_or("positive diagonal")?;
        assert!((x_ldl - &expected).norm() < 1e-10);
        assert!((x_chol - &expected).norm() < 1e-10);

        let update = rest.transpose() * &expected;
        assert!((ldl.update - &update).norm() < 1e-10);
        assert!((chol.update - &update).norm() < 1e-10);
        Ok(())
    }

    #[test]
    fn test_kernels_reject_singular_block() {
        let h = DMatrix::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0]);
        let rest = DMatrix::zeros(2, 1);
        assert!(ldl_frontal(&h, &rest, h.diagonal().as_slice()).is_err());
        assert!(cholesky_frontal(&h, &rest, h.diagonal().as_slice()).is_err());
    }

    #[test]
    fn test_tight_prior_next_to_unit_factor_all_methods() -> TestResult {
        // x0 pinned with sigma 1e-6, then x1 - x0 = 1 with unit sigma
        for method in METHODS {
            let factors = vec![
                jacobian(&["x0"], vec![DMatrix::from_element(1, 1, 1e6)], &[0.0]),
                jacobian(
                    &["x0", "x1"],
                    vec![-DMatrix::identity(1, 1), DMatrix::identity(1, 1)],
                    &[1.0],
                ),
            ];
            let scales = scales_of(&factors);
            let (conditional, _) = eliminate_frontals(
                factors,
                &["x0".to_string(), "x1".to_string()],
                &dims(&[("x0", 1), ("x1", 1)]),
                &scales,
                method,
            )?;
            let mut solution = VectorValues::new();
            conditional.solve_into(&mut solution)?;
            let x0 = solution.get("x0").ok_or("x0 solved")?[0];
            let x1 = solution.get("x1").ok_or("x1 solved")?[0];
            assert!(x0.abs() < 1e-9, "{method}: x0 = {x0}");
            assert!((x1 - 1.0).abs() < 1e-9, "{method}: x1 = {x1}");
        }
        Ok(())
    }

    #[test]
    fn test_single_variable_step_all_methods() -> TestResult {
        // x = 3 from two measurements 2x = 6, x = 3
        for method in METHODS {
            let factors = vec![
                jacobian(&["x"], vec![DMatrix::from_element(1, 1, 2.0)], &[6.0]),
                jacobian(&["x"], vec![DMatrix::from_element(1, 1, 1.0)], &[3.0]),
            ];
            let scales = scales_of(&factors);
            let (conditional, message) = eliminate_frontals(
                factors,
                &["x".to_string()],
                &dims(&[("x", 1)]),
                &scales,
                method,
            )?;
            assert!(message.is_none());
            let x = conditional.d()[0] / conditional.r()[(0, 0)];
            assert!((x - 3.0).abs() < 1e-12, "{method}: {x}");
        }
        Ok(())
    }

    #[test]
    fn test_step_produces_separator_message() -> TestResult {
        for method in METHODS {
            let factors = vec![
                jacobian(&["a"], vec![DMatrix::identity(1, 1)], &[1.0]),
                jacobian(
                    &["a", "b"],
                    vec![-DMatrix::identity(1, 1), DMatrix::identity(1, 1)],
                    &[2.0],
                ),
            ];
            let scales = scales_of(&factors);
            let (conditional, message) = eliminate_frontals(
                factors,
                &["a".to_string()],
                &dims(&[("a", 1), ("b", 1)]),
                &scales,
                method,
            )?;
            assert_eq!(conditional.parents(), &["b".to_string()]);
            let message = message.ok_or("expected a separator factor")?;
            assert_eq!(message.keys(), &["b".to_string()]);
        }
        Ok(())
    }

    #[test]
    fn test_unconstrained_frontal_is_singular() {
        for method in METHODS {
            let result = eliminate_frontals(
                Vec::new(),
                &["x".to_string()],
                &dims(&[("x", 1)]),
                &BTreeMap::new(),
                method,
            );
            assert!(matches!(result, Err(LinAlgError::SingularSystem { .. })));
        }
    }

    #[test]
    fn test_rank_deficient_pair_is_singular() {
        // only the difference a - b is observed
        for method in METHODS {
            let factors = vec![jacobian(
                &["a", "b"],
                vec![DMatrix::identity(1, 1), -DMatrix::identity(1, 1)],
                &[1.0],
            )];
            let scales = scales_of(&factors);
            let result = eliminate_frontals(
                factors,
                &["a".to_string(), "b".to_string()],
                &dims(&[("a", 1), ("b", 1)]),
                &scales,
                method,
            );
            match result {
                Err(LinAlgError::SingularSystem { method: m, .. }) => assert_eq!(m, method),
                other => panic!("{method}: expected SingularSystem, got {other:?}"),
            }
        }
    }
}
