//! Multifrontal elimination over the cliques of the elimination tree.
//!
//! A symbolic pass over the ordering computes, for every variable, the separator it
//! leaves behind when eliminated and its parent (the first separator variable to be
//! eliminated). Chains in which each variable is the only child of the next and the
//! separators nest exactly are merged into one clique (fundamental supernodes). The
//! numeric pass then eliminates each clique's frontal variables jointly, children
//! before parents, passing every clique's separator factor up to its parent clique.

use crate::linalg::factorization::eliminate_frontals;
use crate::linalg::gaussian_factor::EliminationFactor;
use crate::linalg::{
    FactorizationMethod, GaussianConditional, GaussianFactorGraph, LinAlgError, LinAlgResult,
    Ordering, VectorValues,
};
use std::collections::BTreeSet;
use tracing::trace;

/// One clique of a [`GaussianBayesTree`].
#[derive(Debug, Clone)]
pub struct Clique {
    conditional: GaussianConditional,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl Clique {
    pub fn conditional(&self) -> &GaussianConditional {
        &self.conditional
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }
}

/// Result of multifrontal elimination.
///
/// Cliques are stored children first; a clique's parent always has a larger index.
#[derive(Debug, Clone, Default)]
pub struct GaussianBayesTree {
    cliques: Vec<Clique>,
}

impl GaussianBayesTree {
    pub fn cliques(&self) -> &[Clique] {
        &self.cliques
    }

    pub fn len(&self) -> usize {
        self.cliques.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cliques.is_empty()
    }

    /// Indices of cliques without a parent, one per connected component.
    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.cliques
            .iter()
            .enumerate()
            .filter(|(_, clique)| clique.parent.is_none())
            .map(|(i, _)| i)
    }

    /// Solve every clique conditional, roots first.
    pub fn back_substitute(&self) -> LinAlgResult<VectorValues> {
        let mut solution = VectorValues::new();
        for clique in self.cliques.iter().rev() {
            clique.conditional.solve_into(&mut solution)?;
        }
        Ok(solution)
    }
}

/// Clique structure computed before any numeric work.
#[derive(Debug)]
struct SymbolicClique {
    /// Ordering positions of the frontal variables, ascending
    frontals: Vec<usize>,
    /// Indices of the graph factors whose first eliminated variable is a frontal
    factors: Vec<usize>,
    parent: Option<usize>,
    children: Vec<usize>,
}

fn symbolic_cliques(graph: &GaussianFactorGraph, ordering: &Ordering) -> Vec<SymbolicClique> {
    let positions = ordering.positions();
    let n = ordering.len();

    // each factor is eliminated with its earliest variable
    let mut factors_at: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut factor_positions: Vec<Vec<usize>> = Vec::with_capacity(graph.len());
    for (i, factor) in graph.factors().iter().enumerate() {
        let keys: Vec<usize> = factor
            .keys()
            .iter()
            .filter_map(|key| positions.get(key.as_str()).copied())
            .collect();
        if let Some(&first) = keys.iter().min() {
            factors_at[first].push(i);
        }
        factor_positions.push(keys);
    }

    let mut separators: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    let mut parents: Vec<Option<usize>> = vec![None; n];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut pending: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];

    for j in 0..n {
        let mut separator = std::mem::take(&mut pending[j]);
        for &i in &factors_at[j] {
            separator.extend(factor_positions[i].iter().copied());
        }
        separator.remove(&j);

        if let Some(&parent) = separator.first() {
            parents[j] = Some(parent);
            children[parent].push(j);
            pending[parent].extend(separator.iter().copied());
        }
        separators[j] = separator;
    }

    let mut clique_of: Vec<usize> = vec![0; n];
    let mut cliques: Vec<SymbolicClique> = Vec::new();
    for j in 0..n {
        let merge_into = match children[j].as_slice() {
            [only] if separators[*only].len() == separators[j].len() + 1 => Some(clique_of[*only]),
            _ => None,
        };

        match merge_into {
            Some(c) => {
                clique_of[j] = c;
                cliques[c].frontals.push(j);
                cliques[c].factors.extend(factors_at[j].iter().copied());
            }
            None => {
                clique_of[j] = cliques.len();
                cliques.push(SymbolicClique {
                    frontals: vec![j],
                    factors: factors_at[j].clone(),
                    parent: None,
                    children: Vec::new(),
                });
            }
        }
    }

    // the parent clique is the one holding the parent of the last frontal
    for c in 0..cliques.len() {
        let last = cliques[c].frontals.last().copied();
        if let Some(parent) = last.and_then(|j| parents[j]).map(|p| clique_of[p]) {
            cliques[c].parent = Some(parent);
            cliques[parent].children.push(c);
        }
    }

    cliques
}

/// Eliminate `graph` in `ordering` clique by clique, returning the Bayes tree.
pub fn eliminate(
    graph: &GaussianFactorGraph,
    ordering: &Ordering,
    method: FactorizationMethod,
) -> LinAlgResult<GaussianBayesTree> {
    graph.check_dimensions()?;
    ordering.validate(&graph.keys())?;

    let symbolic = symbolic_cliques(graph, ordering);
    trace!(
        "Multifrontal elimination: {} variables in {} cliques",
        ordering.len(),
        symbolic.len()
    );

    let scales = graph.column_scales();
    let mut messages: Vec<Vec<EliminationFactor>> = vec![Vec::new(); symbolic.len()];
    let mut cliques = Vec::with_capacity(symbolic.len());

    for (c, clique) in symbolic.iter().enumerate() {
        let mut gathered = std::mem::take(&mut messages[c]);
        gathered.extend(
            clique
                .factors
                .iter()
                .map(|&i| EliminationFactor::Jacobian(graph.factors()[i].clone())),
        );
        let frontals: Vec<String> = clique
            .frontals
            .iter()
            .map(|&j| ordering.keys()[j].clone())
            .collect();

        let (conditional, message) =
            eliminate_frontals(gathered, &frontals, graph.dims(), &scales, method)?;

        match (message, clique.parent) {
            (Some(message), Some(parent)) => messages[parent].push(message),
            (Some(_), None) => {
                return Err(LinAlgError::FactorizationFailed(format!(
                    "clique [{}] produced a separator factor but has no parent",
                    frontals.join(", ")
                )));
            }
            (None, _) => {}
        }

        cliques.push(Clique {
            conditional,
            parent: clique.parent,
            children: clique.children.clone(),
        });
    }

    Ok(GaussianBayesTree { cliques })
}
