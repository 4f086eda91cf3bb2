//! Sequential elimination: one variable per step, in ordering.

use crate::linalg::factorization::eliminate_frontals;
use crate::linalg::gaussian_factor::EliminationFactor;
use crate::linalg::{
    FactorizationMethod, GaussianBayesNet, GaussianFactorGraph, LinAlgResult, Ordering,
};
use std::collections::HashMap;
use std::slice;

/// Eliminate every variable of `graph` in `ordering`, returning the Bayes net of
/// conditionals in elimination order.
///
/// Each step gathers the factors still touching the variable, removes them from the
/// pool and adds the separator factor produced by the step back to it.
pub fn eliminate(
    graph: &GaussianFactorGraph,
    ordering: &Ordering,
    method: FactorizationMethod,
) -> LinAlgResult<GaussianBayesNet> {
    graph.check_dimensions()?;
    ordering.validate(&graph.keys())?;

    let mut pool: Vec<Option<EliminationFactor>> = graph
        .factors()
        .iter()
        .cloned()
        .map(|factor| Some(EliminationFactor::Jacobian(factor)))
        .collect();

    let mut involved: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, factor) in pool.iter().flatten().enumerate() {
        for key in factor.keys() {
            involved.entry(key.clone()).or_default().push(i);
        }
    }

    let scales = graph.column_scales();
    let mut net = GaussianBayesNet::new();
    for key in ordering.iter() {
        let gathered: Vec<EliminationFactor> = involved
            .remove(key)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|i| pool[i].take())
            .collect();

        let (conditional, message) = eliminate_frontals(
            gathered,
            slice::from_ref(key),
            graph.dims(),
            &scales,
            method,
        )?;
        net.push(conditional);

        if let Some(message) = message {
            let slot = pool.len();
            for separator_key in message.keys() {
                involved
                    .entry(separator_key.clone())
                    .or_default()
                    .push(slot);
            }
            pool.push(Some(message));
        }
    }

    Ok(net)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{JacobianFactor, LinAlgError};
    use nalgebra::{DMatrix, DVector};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn unary(key: &str, value: f64) -> JacobianFactor {
        JacobianFactor::new(
            vec![key.to_string()],
            vec![DMatrix::identity(1, 1)],
            DVector::from_vec(vec![value]),
        )
    }

    fn difference(a: &str, b: &str, value: f64) -> JacobianFactor {
        JacobianFactor::new(
            vec![a.to_string(), b.to_string()],
            vec![-DMatrix::identity(1, 1), DMatrix::identity(1, 1)],
            DVector::from_vec(vec![value]),
        )
    }

    #[test]
    fn test_chain_solution() -> TestResult {
        // a = 1, b - a = 2, c - b = 3
        let graph = GaussianFactorGraph::from_factors(vec![
            unary("a", 1.0),
            difference("a", "b", 2.0),
            difference("b", "c", 3.0),
        ]);
        let ordering = Ordering::new(["a", "b", "c"]);
        for method in [
            FactorizationMethod::Ldl,
            FactorizationMethod::Qr,
            FactorizationMethod::Cholesky,
        ] {
            let net = eliminate(&graph, &ordering, method)?;
            assert_eq!(net.len(), 3);
            let x = net.back_substitute()?;
            assert!((x.get("a").ok_or("a")?[0] - 1.0).abs() < 1e-10);
            assert!((x.get("b").ok_or("b")?[0] - 3.0).abs() < 1e-10);
            assert!((x.get("c").ok_or("c")?[0] - 6.0).abs() < 1e-10);
        }
        Ok(())
    }

    #[test]
    fn test_conditionals_follow_ordering() -> TestResult {
        let graph = GaussianFactorGraph::from_factors(vec![
            unary("a", 1.0),
            difference("a", "b", 2.0),
        ]);
        let net = eliminate(&graph, &Ordering::new(["b", "a"]), FactorizationMethod::Qr)?;
        let frontals: Vec<&str> = net
            .conditionals()
            .iter()
            .map(|c| c.frontals()[0].as_str())
            .collect();
        assert_eq!(frontals, vec!["b", "a"]);
        assert!(net.conditionals()[1].parents().is_empty());
        Ok(())
    }

    #[test]
    fn test_underdetermined_is_singular() {
        // only the difference is observed, nothing anchors the pair
        let graph = GaussianFactorGraph::from_factors(vec![difference("a", "b", 1.0)]);
        let result = eliminate(&graph, &Ordering::new(["a", "b"]), FactorizationMethod::Ldl);
        assert!(matches!(result, Err(LinAlgError::SingularSystem { .. })));
    }

    #[test]
    fn test_cancelled_separator_is_singular_for_every_method() {
        // two scaled measurements of a - b; the message left on b cancels to rounding noise
        let scaled = |value: f64| {
            JacobianFactor::new(
                vec!["a".to_string(), "b".to_string()],
                vec![DMatrix::from_element(1, 1, 0.1), DMatrix::from_element(1, 1, -0.1)],
                DVector::from_vec(vec![value]),
            )
        };
        let graph = GaussianFactorGraph::from_factors(vec![scaled(0.3), scaled(0.7)]);
        for method in [
            FactorizationMethod::Ldl,
            FactorizationMethod::Qr,
            FactorizationMethod::Cholesky,
        ] {
            let result = eliminate(&graph, &Ordering::new(["a", "b"]), method);
            assert!(
                matches!(result, Err(LinAlgError::SingularSystem { .. })),
                "{method}: {result:?}"
            );
        }
    }
}
