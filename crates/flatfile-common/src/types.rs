//! Column types and values.

use crate::error::{FlatfileError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Type of a column.
///
/// The discriminant is the tag stored for the column in the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ColumnType {
    /// Unsigned 32-bit integer, stored little-endian.
    U32 = 1,
    /// Unsigned 64-bit integer, stored little-endian.
    U64 = 2,
    /// UTF-8 string, stored with a 32-bit length prefix.
    String = 3,
}

impl ColumnType {
    /// Returns the fixed byte size for this type, or None for variable-length types.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            ColumnType::U32 => Some(4),
            ColumnType::U64 => Some(8),
            ColumnType::String => None,
        }
    }

    /// Returns the vocabulary name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::U32 => "u32",
            ColumnType::U64 => "u64",
            ColumnType::String => "string",
        }
    }
}

impl TryFrom<u8> for ColumnType {
    type Error = FlatfileError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(ColumnType::U32),
            2 => Ok(ColumnType::U64),
            3 => Ok(ColumnType::String),
            _ => Err(FlatfileError::InvalidSchema(format!(
                "unknown column type tag: {}",
                value
            ))),
        }
    }
}

impl FromStr for ColumnType {
    type Err = FlatfileError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "u32" => Ok(ColumnType::U32),
            "u64" => Ok(ColumnType::U64),
            "string" => Ok(ColumnType::String),
            _ => Err(FlatfileError::InvalidSchema(format!(
                "unknown column type: {}",
                s
            ))),
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Null,
    U32(u32),
    U64(u64),
    String(String),
}

impl Value {
    /// Returns true if this is the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the column type this value belongs to, or None for null.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::U32(_) => Some(ColumnType::U32),
            Value::U64(_) => Some(ColumnType::U64),
            Value::String(_) => Some(ColumnType::String),
        }
    }

    /// Returns the type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self.column_type() {
            Some(ctype) => ctype.as_str(),
            None => "null",
        }
    }

    /// Returns the value as u32 if it is a u32.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U32(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as u64, widening u32 values.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U32(v) => Some(*v as u64),
            Value::U64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a string slice if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns this value with u32 widened to u64.
    ///
    /// Two widened values are equal exactly when they hold the same number,
    /// whatever the width of the columns they came from.
    pub fn widen(self) -> Value {
        match self {
            Value::U32(v) => Value::U64(v as u64),
            other => other,
        }
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::U64(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::U32(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{:?}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_size() {
        assert_eq!(ColumnType::U32.fixed_size(), Some(4));
        assert_eq!(ColumnType::U64.fixed_size(), Some(8));
        assert_eq!(ColumnType::String.fixed_size(), None);
    }

    #[test]
    fn test_type_tag_roundtrip() {
        for ctype in [ColumnType::U32, ColumnType::U64, ColumnType::String] {
            assert_eq!(ColumnType::try_from(ctype as u8).unwrap(), ctype);
        }
        assert!(ColumnType::try_from(0).is_err());
        assert!(ColumnType::try_from(4).is_err());
    }

    #[test]
    fn test_type_vocabulary() {
        assert_eq!("u32".parse::<ColumnType>().unwrap(), ColumnType::U32);
        assert_eq!("u64".parse::<ColumnType>().unwrap(), ColumnType::U64);
        assert_eq!("string".parse::<ColumnType>().unwrap(), ColumnType::String);
        assert!("i64".parse::<ColumnType>().is_err());
        assert_eq!(ColumnType::String.to_string(), "string");
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::U32(7).as_u32(), Some(7));
        assert_eq!(Value::U32(7).as_u64(), Some(7));
        assert_eq!(Value::U64(7).as_u32(), None);
        assert_eq!(Value::from("abc").as_str(), Some("abc"));
        assert!(Value::Null.is_null());
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::U64(1).type_name(), "u64");
    }

    #[test]
    fn test_value_from_option() {
        assert_eq!(Value::from(Some(5u32)), Value::U32(5));
        assert_eq!(Value::from(None::<u64>), Value::Null);
    }

    #[test]
    fn test_widen() {
        assert_eq!(Value::U32(9).widen(), Value::U64(9));
        assert_eq!(Value::U32(9).widen(), Value::U64(9).widen());
        assert_eq!(Value::from("x").widen(), Value::from("x"));
        assert_eq!(Value::Null.widen(), Value::Null);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::U64(12).to_string(), "12");
        assert_eq!(Value::from("hi").to_string(), "\"hi\"");
    }
}
