//! Scalar values and rows flowing through the engine.
//!
//! A [`Row`] is an insertion-ordered column→value map. Rows are transient:
//! a raw source row becomes a filtered payload and is dropped once written,
//! except for values staged for deferred relation-table inserts.

use std::fmt;

use indexmap::IndexMap;

/// A single scalar cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL / absent column.
    Null,

    /// Boolean value.
    Bool(bool),

    /// 64-bit signed integer (covers all integer key types).
    Int(i64),

    /// 64-bit floating point.
    Float(f64),

    /// Text data.
    Text(String),
}

impl Value {
    /// Whether this value counts as empty for resolution purposes.
    ///
    /// Empty foreign-key values short-circuit recursive resolution.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Interpret this value as a primary key, if possible.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Borrow the text content, if this is a text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// An ordered mapping from column name to scalar value.
pub type Row = IndexMap<String, Value>;

/// Build a [`Row`] from column/value pairs, preserving declaration order.
pub fn row<const N: usize>(columns: [(&str, Value); N]) -> Row {
    columns
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_empty() {
        assert!(Value::Null.is_empty());
        assert!(Value::Text(String::new()).is_empty());
        assert!(!Value::Text("x".into()).is_empty());
        assert!(!Value::Int(0).is_empty());
    }

    #[test]
    fn test_as_int() {
        assert_eq!(Value::Int(7).as_int(), Some(7));
        assert_eq!(Value::Text("42".into()).as_int(), Some(42));
        assert_eq!(Value::Text("nope".into()).as_int(), None);
        assert_eq!(Value::Null.as_int(), None);
    }

    #[test]
    fn test_from_implementations() {
        assert_eq!(Value::from(42i64), Value::Int(42));
        assert_eq!(Value::from("hello"), Value::Text("hello".into()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn test_row_preserves_order() {
        let r = row([("b", Value::Int(1)), ("a", Value::Int(2))]);
        let cols: Vec<&str> = r.keys().map(String::as_str).collect();
        assert_eq!(cols, vec!["b", "a"]);
    }

    #[test]
    fn test_display_null_is_blank() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Int(9).to_string(), "9");
    }
}
