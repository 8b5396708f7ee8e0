//! Row representation.

use crate::schema::Schema;
use crate::types::Value;

/// An ordered sequence of values, positionally aligned with a schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Creates a row from its values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Returns the number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row has no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the value at the given column position.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns the value of the named column, resolved through the schema.
    pub fn get_by_name(&self, schema: &Schema, name: &str) -> Option<&Value> {
        schema.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Returns the values as a slice.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row and returns the value at the given position.
    pub fn take(mut self, index: usize) -> Option<Value> {
        if index < self.values.len() {
            Some(self.values.swap_remove(index))
        } else {
            None
        }
    }

    /// Consumes the row and returns its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}
