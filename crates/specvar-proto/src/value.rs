//! Runtime value types carried by Spec channels.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A value held by a Spec variable.
///
/// Spec variables are numbers, strings or associative arrays. Arrays keep
/// their element order; associative arrays are keyed by string and kept
/// sorted so that two values with the same entries compare equal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// No value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    String(String),
    /// Ordered array.
    Array(Vec<Value>),
    /// Associative array.
    Assoc(BTreeMap<String, Value>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64. Integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as array slice.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Try to get as associative array.
    pub fn as_assoc(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Assoc(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key of an associative array.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_assoc().and_then(|map| map.get(key))
    }

    /// Check if two values are identical, comparing floats by bit pattern.
    ///
    /// Unlike `==`, a `NaN` is identical to itself, and `0.0` differs from
    /// `-0.0`.
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_identical(y))
            }
            (Value::Assoc(a), Value::Assoc(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.is_identical(vb))
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Assoc(map) => {
                f.write_str("{")?;
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, item)?;
                }
                f.write_str("}")
            }
        }
    }
}

// Conversion implementations
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
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

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Assoc(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_floats() {
        let nan = Value::Float(f64::NAN);
        assert_ne!(nan, nan.clone());
        assert!(nan.is_identical(&nan.clone()));

        assert_eq!(Value::Float(0.0), Value::Float(-0.0));
        assert!(!Value::Float(0.0).is_identical(&Value::Float(-0.0)));

        let nested = Value::from(vec![Value::Float(f64::NAN), Value::Int(1)]);
        assert!(nested.is_identical(&nested.clone()));
        assert!(!nested.is_identical(&Value::from(vec![Value::Float(f64::NAN)])));
        assert!(!Value::Int(1).is_identical(&Value::Float(1.0)));
    }

    #[test]
    fn test_value_accessors() {
        assert!(Value::Null.is_null());
        assert!(!Value::Bool(true).is_null());

        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(42).as_i64(), Some(42));
        assert_eq!(Value::Int(42).as_f64(), Some(42.0)); // Widening conversion
        assert_eq!(Value::Float(1.5).as_i64(), None);
        assert_eq!(Value::String("hello".into()).as_str(), Some("hello"));
    }

    #[test]
    fn test_value_conversions() {
        let v: Value = 7i32.into();
        assert_eq!(v, Value::Int(7));

        let v: Value = "hello".into();
        assert_eq!(v, Value::String("hello".into()));

        let v: Value = None::<i64>.into();
        assert_eq!(v, Value::Null);

        let v: Value = vec![1i64, 2, 3].into();
        assert_eq!(v.as_array().map(|a| a.len()), Some(3));
    }

    #[test]
    fn test_assoc_lookup() {
        let mut map = BTreeMap::new();
        map.insert("position".to_string(), Value::Float(12.5));
        map.insert("moving".to_string(), Value::Bool(false));
        let v = Value::from(map);

        assert_eq!(v.get("position"), Some(&Value::Float(12.5)));
        assert_eq!(v.get("missing"), None);
        assert_eq!(Value::Int(1).get("position"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(3).to_string(), "3");
        assert_eq!(Value::from("ready").to_string(), "ready");
        assert_eq!(Value::from(vec![1i64, 2]).to_string(), "[1, 2]");

        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Value::Int(1));
        map.insert("b".to_string(), Value::Null);
        assert_eq!(Value::from(map).to_string(), "{a: 1, b: null}");
    }

    #[test]
    fn test_json_shapes() {
        let v: Value = serde_json::from_str(r#"{"x": [1, 2.5, "s", null, true]}"#).unwrap();
        let items = v.get("x").and_then(Value::as_array).unwrap();
        assert_eq!(items[0], Value::Int(1));
        assert_eq!(items[1], Value::Float(2.5));
        assert_eq!(items[2], Value::String("s".into()));
        assert_eq!(items[3], Value::Null);
        assert_eq!(items[4], Value::Bool(true));
    }
}
