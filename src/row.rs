use std::{fmt::Display, ops::Index};

use itertools::Itertools;

use crate::types::Value;

/// A fixed-arity tuple of values. Rows are plain value objects: equality and hashing are
/// structural, so a row (or a projection of one) can directly act as a grouping or join key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    #[inline]
    pub fn new(values: Vec<Value>) -> Row {
        Row { values }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Tuple concatenation, used by the hash join to glue a probe row to a build row.
    pub fn combine(&self, other: &Row) -> Row {
        let mut values = Vec::with_capacity(self.len() + other.len());
        values.extend_from_slice(&self.values);
        values.extend_from_slice(&other.values);
        Row { values }
    }

    // Indexes are resolved against the schema when an operator is built, so they are in bounds
    // for every row that satisfies the schema arity.
    pub fn project(&self, indexes: &[usize]) -> Row {
        Row { values: self.key(indexes) }
    }

    pub fn key(&self, indexes: &[usize]) -> Vec<Value> {
        indexes.iter().map(|&i| self.values[i].clone()).collect()
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Self::Output {
        &self.values[index]
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

impl Display for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.values.iter().join(", "))
    }
}

/// Builds a [`Row`] from anything convertible into a [`Value`].
#[macro_export]
macro_rules! row {
    ($($value:expr),* $(,)?) => {
        $crate::row::Row::new(vec![$($crate::types::Value::from($value)),*])
    };
}
