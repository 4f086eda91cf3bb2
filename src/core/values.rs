//! The `Values` container: an assignment of estimates to variable keys.
//!
//! `Values` is treated as immutable once handed to an optimizer. A step never edits it in
//! place; [`Values::retract`] builds a new container, so earlier optimizer states keep
//! seeing the estimates they were created with.

use crate::core::{CoreError, CoreResult, variable::Variable};
use crate::linalg::VectorValues;
use crate::manifold::ManifoldType;
use nalgebra::DVector;
use std::{
    collections::BTreeMap,
    fmt,
    fmt::{Display, Formatter},
};

/// Ordered map from variable key to its current estimate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values {
    variables: BTreeMap<String, Variable>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a variable given its manifold type and coordinate vector.
    ///
    /// Fails if the coordinates do not fit the manifold (wrong length, NaN/Inf).
    /// An existing entry with the same key is replaced.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        manifold_type: ManifoldType,
        data: DVector<f64>,
    ) -> CoreResult<()> {
        let key = key.into();
        let variable = Variable::from_vector(manifold_type, &data).map_err(|e| {
            CoreError::Variable(format!("cannot insert '{key}' as {manifold_type}: {e}"))
        })?;
        self.variables.insert(key, variable);
        Ok(())
    }

    /// Insert an already-typed variable, returning the previous value if any.
    pub fn insert_variable(
        &mut self,
        key: impl Into<String>,
        variable: impl Into<Variable>,
    ) -> Option<Variable> {
        self.variables.insert(key.into(), variable.into())
    }

    pub fn get(&self, key: &str) -> Option<&Variable> {
        self.variables.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.variables.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.variables.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Variable)> {
        self.variables.iter()
    }

    /// Tangent dimension of a variable.
    pub fn tangent_dim(&self, key: &str) -> CoreResult<usize> {
        self.get(key)
            .map(Variable::get_size)
            .ok_or_else(|| CoreError::Variable(format!("no value for variable '{key}'")))
    }

    /// Coordinate vector of a variable, as passed to factors.
    pub fn vector(&self, key: &str) -> CoreResult<DVector<f64>> {
        self.get(key)
            .map(Variable::to_vector)
            .ok_or_else(|| CoreError::Variable(format!("no value for variable '{key}'")))
    }

    /// Apply a tangent-space delta to every variable it names.
    ///
    /// Variables absent from `delta` are carried over unchanged. A delta entry for a
    /// key that has no value is an error, as is a step of the wrong dimension.
    pub fn retract(&self, delta: &VectorValues) -> CoreResult<Values> {
        if let Some(unknown) = delta.keys().find(|key| !self.contains(key)) {
            return Err(CoreError::Variable(format!(
                "delta refers to unknown variable '{unknown}'"
            )));
        }

        let mut variables = BTreeMap::new();
        for (key, variable) in &self.variables {
            let updated = match delta.get(key) {
                Some(step) => variable.retract(step)?,
                None => variable.clone(),
            };
            variables.insert(key.clone(), updated);
        }
        Ok(Values { variables })
    }

    /// Tangent steps taking each variable of `self` to its counterpart in `other`.
    ///
    /// Both containers must hold the same keys with matching manifolds, so that
    /// `self.retract(&self.local(other)?)` reproduces `other`.
    pub fn local(&self, other: &Values) -> CoreResult<VectorValues> {
        if self.len() != other.len() {
            return Err(CoreError::Variable(format!(
                "cannot compare {} variables with {}",
                self.len(),
                other.len()
            )));
        }
        let mut delta = VectorValues::new();
        for (key, variable) in &self.variables {
            let target = other
                .get(key)
                .ok_or_else(|| CoreError::Variable(format!("no value for variable '{key}'")))?;
            let step = variable.local(target).ok_or_else(|| {
                CoreError::Variable(format!("variable '{key}' differs in manifold or size"))
            })?;
            delta.insert(key.clone(), step);
        }
        Ok(delta)
    }
}

impl Display for Values {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Values with {} variables:", self.variables.len())?;
        for (key, variable) in &self.variables {
            writeln!(f, "  {key}: {variable}")?;
        }
        Ok(())
    }
}
