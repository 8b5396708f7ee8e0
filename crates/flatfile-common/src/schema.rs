//! Schema model: ordered column definitions with lookup by name.

use crate::error::{FlatfileError, Result};
use crate::types::ColumnType;
use serde::{Deserialize, Serialize};

/// Definition of a single column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name, unique within its schema.
    pub name: String,
    /// Type of the values stored in this column.
    pub ctype: ColumnType,
    /// Whether the column accepts null.
    pub nullable: bool,
}

impl ColumnDef {
    /// Creates a new column definition.
    pub fn new(name: impl Into<String>, ctype: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            ctype,
            nullable,
        }
    }
}

/// Ordered sequence of column definitions.
///
/// Column order defines the on-disk row layout. Once a schema is bound to a
/// file it is never mutated; handles only expose it by shared reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<ColumnDef>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a schema from column definitions, rejecting duplicate names.
    pub fn from_columns<I>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = ColumnDef>,
    {
        let mut schema = Self::new();
        for column in columns {
            schema.push(column)?;
        }
        Ok(schema)
    }

    /// Appends a non-nullable column.
    pub fn add_column(&mut self, name: impl Into<String>, ctype: ColumnType) -> Result<&mut Self> {
        self.push(ColumnDef::new(name, ctype, false))?;
        Ok(self)
    }

    /// Appends a nullable column.
    pub fn add_nullable_column(
        &mut self,
        name: impl Into<String>,
        ctype: ColumnType,
    ) -> Result<&mut Self> {
        self.push(ColumnDef::new(name, ctype, true))?;
        Ok(self)
    }

    /// Appends a column definition.
    pub fn push(&mut self, column: ColumnDef) -> Result<()> {
        if self.index_of(&column.name).is_some() {
            return Err(FlatfileError::DuplicateColumn(column.name));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the column at the given position.
    pub fn column_at(&self, index: usize) -> Option<&ColumnDef> {
        self.columns.get(index)
    }

    /// Returns the position of the named column.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Iterates over the columns in layout order.
    pub fn columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter()
    }

    /// Checks this schema against an expected one.
    ///
    /// Fails with the index of the first differing column and which
    /// attribute differs: `length`, `name`, `type` or `nullable`.
    pub fn check_matches(&self, expected: &Schema) -> Result<()> {
        for (index, (actual, wanted)) in self.columns.iter().zip(&expected.columns).enumerate() {
            let reason = if actual.name != wanted.name {
                Some(format!("name: expected {}, got {}", wanted.name, actual.name))
            } else if actual.ctype != wanted.ctype {
                Some(format!("type: expected {}, got {}", wanted.ctype, actual.ctype))
            } else if actual.nullable != wanted.nullable {
                Some(format!(
                    "nullable: expected {}, got {}",
                    wanted.nullable, actual.nullable
                ))
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(FlatfileError::SchemaMismatch { index, reason });
            }
        }

        if self.len() != expected.len() {
            return Err(FlatfileError::SchemaMismatch {
                index: self.len().min(expected.len()),
                reason: format!("length: expected {}, got {}", expected.len(), self.len()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        let mut schema = Schema::new();
        schema
            .add_column("s", ColumnType::String)
            .unwrap()
            .add_column("i64", ColumnType::U64)
            .unwrap()
            .add_nullable_column("i32", ColumnType::U32)
            .unwrap();
        schema
    }

    #[test]
    fn test_build_and_lookup() {
        let schema = sample();
        assert_eq!(schema.len(), 3);
        assert!(!schema.is_empty());
        assert_eq!(schema.index_of("i64"), Some(1));
        assert_eq!(schema.index_of("missing"), None);

        let col = schema.column_at(2).unwrap();
        assert_eq!(col.name, "i32");
        assert_eq!(col.ctype, ColumnType::U32);
        assert!(col.nullable);
        assert!(schema.column_at(3).is_none());
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let mut schema = sample();
        let err = schema.add_column("s", ColumnType::U32).unwrap_err();
        assert!(matches!(err, FlatfileError::DuplicateColumn(name) if name == "s"));
        assert_eq!(schema.len(), 3);
    }

    #[test]
    fn test_from_columns() {
        let schema = Schema::from_columns([
            ColumnDef::new("a", ColumnType::U32, false),
            ColumnDef::new("b", ColumnType::String, true),
        ])
        .unwrap();
        assert_eq!(schema.len(), 2);

        let dup = Schema::from_columns([
            ColumnDef::new("a", ColumnType::U32, false),
            ColumnDef::new("a", ColumnType::U64, false),
        ]);
        assert!(dup.is_err());
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(sample(), sample());

        let mut other = Schema::new();
        other.add_column("s", ColumnType::String).unwrap();
        assert_ne!(sample(), other);
    }

    #[test]
    fn test_check_matches() {
        assert!(sample().check_matches(&sample()).is_ok());

        let mut renamed = Schema::new();
        renamed
            .add_column("s", ColumnType::String)
            .unwrap()
            .add_column("j64", ColumnType::U64)
            .unwrap()
            .add_nullable_column("i32", ColumnType::U32)
            .unwrap();
        match sample().check_matches(&renamed) {
            Err(FlatfileError::SchemaMismatch { index, reason }) => {
                assert_eq!(index, 1);
                assert!(reason.starts_with("name"));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let mut retyped = sample();
        retyped.columns[0].ctype = ColumnType::U32;
        match sample().check_matches(&retyped) {
            Err(FlatfileError::SchemaMismatch { index, reason }) => {
                assert_eq!(index, 0);
                assert!(reason.starts_with("type"));
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let mut nullability = sample();
        nullability.columns[2].nullable = false;
        match sample().check_matches(&nullability) {
            Err(FlatfileError::SchemaMismatch { index, reason }) => {
                assert_eq!(index, 2);
                assert!(reason.starts_with("nullable"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_check_matches_length() {
        let mut shorter = Schema::new();
        shorter.add_column("s", ColumnType::String).unwrap();
        match sample().check_matches(&shorter) {
            Err(FlatfileError::SchemaMismatch { index, reason }) => {
                assert_eq!(index, 1);
                assert!(reason.starts_with("length"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
