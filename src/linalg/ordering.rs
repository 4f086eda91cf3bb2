//! Variable elimination orderings.
//!
//! The ordering decides fill-in, and therefore the size of the dense blocks each
//! elimination step has to factor. [`Ordering::minimum_degree`] runs faer's
//! approximate minimum degree on the variable adjacency graph.

use crate::linalg::{GaussianFactorGraph, LinAlgError, LinAlgResult};
use faer::dyn_stack::{MemBuffer, MemStack};
use faer::sparse::{Pair, SymbolicSparseColMat, linalg::amd};
use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    fmt::{Display, Formatter},
};

/// Sequence of variable keys in elimination order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ordering {
    keys: Vec<String>,
}

impl Ordering {
    pub fn new(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Ordering {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Approximate minimum degree ordering of the variable adjacency graph.
    ///
    /// Each variable is one node, and two variables are adjacent when some factor
    /// involves both. Nodes are numbered in key order before faer's AMD runs, so the
    /// result depends only on the structure of the system.
    pub fn minimum_degree(graph: &GaussianFactorGraph) -> LinAlgResult<Self> {
        let keys: Vec<String> = graph.keys().into_iter().collect();
        let n = keys.len();
        if n == 0 {
            return Ok(Ordering::default());
        }
        let index: HashMap<&str, usize> = keys
            .iter()
            .enumerate()
            .map(|(i, key)| (key.as_str(), i))
            .collect();

        // upper triangle of the pattern, diagonal included
        let mut pairs: Vec<Pair<usize, usize>> = (0..n).map(|i| Pair::new(i, i)).collect();
        for factor in graph.factors() {
            let nodes: Vec<usize> = factor
                .keys()
                .iter()
                .filter_map(|key| index.get(key.as_str()).copied())
                .collect();
            for &a in &nodes {
                for &b in &nodes {
                    if a < b {
                        pairs.push(Pair::new(a, b));
                    }
                }
            }
        }

        let (pattern, _) = SymbolicSparseColMat::<usize>::try_new_from_indices(n, n, &pairs)
            .map_err(|e| {
                LinAlgError::SparseMatrixCreation(
                    "Failed to build the variable adjacency pattern".to_string(),
                )
                .log_with_source(e)
            })?;

        let mut perm = vec![0usize; n];
        let mut perm_inv = vec![0usize; n];
        let mut mem = MemBuffer::try_new(amd::order_scratch::<usize>(n, pattern.compute_nnz()))
            .map_err(|e| {
                LinAlgError::FactorizationFailed(
                    "Failed to allocate AMD workspace".to_string(),
                )
                .log_with_source(e)
            })?;
        amd::order(
            &mut perm,
            &mut perm_inv,
            pattern.as_ref(),
            amd::Control::default(),
            MemStack::new(&mut mem),
        )
        .map_err(|e| {
            LinAlgError::FactorizationFailed("AMD ordering failed".to_string()).log_with_source(e)
        })?;

        Ok(Ordering {
            keys: perm.into_iter().map(|i| keys[i].clone()).collect(),
        })
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.keys.iter()
    }

    /// Position of each key. Only meaningful for a validated ordering.
    pub fn positions(&self) -> HashMap<&str, usize> {
        self.keys
            .iter()
            .enumerate()
            .map(|(i, key)| (key.as_str(), i))
            .collect()
    }

    /// Check that this ordering is a permutation of `expected`.
    pub fn validate(&self, expected: &BTreeSet<String>) -> LinAlgResult<()> {
        let mut seen = BTreeSet::new();
        let mut duplicated = BTreeSet::new();
        for key in &self.keys {
            if !seen.insert(key.clone()) {
                duplicated.insert(key.clone());
            }
        }

        let missing: Vec<String> = expected.difference(&seen).cloned().collect();
        let unexpected: Vec<String> = seen.difference(expected).cloned().collect();

        if missing.is_empty() && unexpected.is_empty() && duplicated.is_empty() {
            Ok(())
        } else {
            Err(LinAlgError::OrderingMismatch {
                missing,
                unexpected,
                duplicated: duplicated.into_iter().collect(),
            })
        }
    }
}

impl Display for Ordering {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keys.join(" "))
    }
}

impl FromIterator<String> for Ordering {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Ordering {
            keys: iter.into_iter().collect(),
        }
    }
}
