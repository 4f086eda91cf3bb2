//! Tangent-space vectors keyed by variable, the solution type of a linear system.

use nalgebra::DVector;
use std::{
    collections::BTreeMap,
    fmt,
    fmt::{Display, Formatter},
};

/// Ordered map from variable key to a tangent vector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorValues {
    vectors: BTreeMap<String, DVector<f64>>,
}

impl VectorValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, vector: DVector<f64>) -> Option<DVector<f64>> {
        self.vectors.insert(key.into(), vector)
    }

    pub fn get(&self, key: &str) -> Option<&DVector<f64>> {
        self.vectors.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vectors.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.vectors.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DVector<f64>)> {
        self.vectors.iter()
    }

    /// Sum of the dimensions of all entries.
    pub fn dim(&self) -> usize {
        self.vectors.values().map(|v| v.len()).sum()
    }

    /// Euclidean norm of the stacked vector.
    pub fn norm(&self) -> f64 {
        self.vectors
            .values()
            .map(|v| v.norm_squared())
            .sum::<f64>()
            .sqrt()
    }

    /// Largest absolute difference to `other` over shared keys, infinity if the key
    /// sets or dimensions differ.
    pub fn max_abs_diff(&self, other: &VectorValues) -> f64 {
        if self.len() != other.len() {
            return f64::INFINITY;
        }
        let mut max = 0.0f64;
        for (key, v) in &self.vectors {
            match other.get(key) {
                Some(w) if w.len() == v.len() => {
                    max = max.max((v - w).amax());
                }
                _ => return f64::INFINITY,
            }
        }
        max
    }
}

impl Display for VectorValues {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "VectorValues with {} entries:", self.vectors.len())?;
        for (key, v) in &self.vectors {
            write!(f, "  {key}: [")?;
            for (i, x) in v.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{x:.6e}")?;
            }
            writeln!(f, "]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_norm_and_dim() {
        let mut vv = VectorValues::new();
        vv.insert("a", DVector::from_vec(vec![3.0]));
        vv.insert("b", DVector::from_vec(vec![0.0, 4.0]));
        assert_eq!(vv.dim(), 3);
        assert!((vv.norm() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_max_abs_diff() {
        let mut a = VectorValues::new();
        a.insert("x", DVector::from_vec(vec![1.0, 2.0]));
        let mut b = a.clone();
        b.insert("x", DVector::from_vec(vec![1.5, 2.0]));
        assert!((a.max_abs_diff(&b) - 0.5).abs() < 1e-12);

        b.insert("y", DVector::zeros(1));
        assert!(a.max_abs_diff(&b).is_infinite());
    }
}
