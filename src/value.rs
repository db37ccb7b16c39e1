//! Scalar values produced by column decoding and bound as query arguments.

use std::cmp::Ordering;

/// Typed scalar value used on both sides of a filter comparison.
///
/// Ordering is total within a type: `Null` equals `Null` and sorts before
/// every non-null value, and floats compare by IEEE total order. This mirrors
/// the byte order produced by the column codecs, so a comparison resolved by
/// decoding and one resolved directly over encoded bytes always agree.
#[derive(Clone, Debug)]
pub enum Value {
    /// Absent value for a nullable column.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned 64-bit integer.
    UInt64(u64),
    /// 64-bit floating point.
    Float64(f64),
    /// UTF-8 string.
    Text(String),
    /// Binary blob.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true when this is the `Null` variant.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Compares this value with another, returning the ordering when both
    /// sides are comparable. Cross-type comparisons return `None`.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Null, Null) => Some(Ordering::Equal),
            (Null, _) => Some(Ordering::Less),
            (_, Null) => Some(Ordering::Greater),
            (Bool(lhs), Bool(rhs)) => Some(lhs.cmp(rhs)),
            (Int64(lhs), Int64(rhs)) => Some(lhs.cmp(rhs)),
            (UInt64(lhs), UInt64(rhs)) => Some(lhs.cmp(rhs)),
            (Float64(lhs), Float64(rhs)) => Some(lhs.total_cmp(rhs)),
            (Text(lhs), Text(rhs)) => Some(lhs.cmp(rhs)),
            (Bytes(lhs), Bytes(rhs)) => Some(lhs.cmp(rhs)),
            _ => None,
        }
    }

    /// Returns a short name for the value's type, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int64(_) => "int64",
            Value::UInt64(_) => "uint64",
            Value::Float64(_) => "float64",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        matches!(self.compare(other), Some(Ordering::Equal))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::UInt64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float64(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::Value;

    #[test]
    fn null_sorts_before_everything() {
        let null = Value::Null;
        assert_eq!(null.compare(&Value::Null), Some(Ordering::Equal));
        assert_eq!(null.compare(&Value::from(i64::MIN)), Some(Ordering::Less));
        assert_eq!(null.compare(&Value::from("")), Some(Ordering::Less));
        assert_eq!(
            Value::from(false).compare(&null),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn floats_use_total_order() {
        let nan = Value::from(f64::NAN);
        assert_eq!(nan.compare(&nan), Some(Ordering::Equal));
        assert_eq!(
            Value::from(-0.0f64).compare(&Value::from(0.0f64)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::from(1.5f64).compare(&nan),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn cross_type_comparison_is_none() {
        assert_eq!(Value::from(1i64).compare(&Value::from("1")), None);
        assert_eq!(Value::from(1i64).compare(&Value::from(1u64)), None);
        assert!(Value::from(1i64) != Value::from(1u64));
    }
}
