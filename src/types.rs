use std::{cmp::Ordering, fmt::Display, hash::{Hash, Hasher}};

use crate::error::{QueryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Text,
}

impl ValueType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Int | ValueType::Float)
    }

    pub fn is_type_of(&self, value: &Value) -> bool {
        value.value_type() == *self
    }

    /// Normalizes a value coming from outside the engine into this type. Integers widen to
    /// floats and integral floats narrow to integers, everything else has to match exactly.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        match (self, value) {
            (ValueType::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (ValueType::Int, Value::Int(i)) => Ok(Value::Int(i)),
            (ValueType::Int, Value::Float(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Ok(Value::Int(f as i64))
            }
            (ValueType::Float, Value::Float(f)) => Ok(Value::Float(f)),
            (ValueType::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (ValueType::Text, Value::Text(s)) => Ok(Value::Text(s)),
            (target, value) => Err(QueryError::ValueNotConvertible { value, target: *target }),
        }
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueType::Bool => write!(f, "BOOLEAN"),
            ValueType::Int => write!(f, "INT"),
            ValueType::Float => write!(f, "DOUBLE"),
            ValueType::Text => write!(f, "TEXT"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Text(_) => ValueType::Text,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Ordering between two values of the same kind. Mixing kinds is an error, the engine
    /// expects values to be normalized to their column type before they reach an operator.
    pub fn try_cmp(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => Ok(a.total_cmp(b)),
            (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
            _ => Err(QueryError::IncomparableValues { left: self.clone(), right: other.clone() }),
        }
    }
}

// Structural equality. Floats compare by bit pattern so that Eq and Hash agree and values can
// be used as grouping, distinct and join keys.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Text(s) => write!(f, "\"{}\"", s.escape_debug()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_eq() {
        assert_eq!(Value::Int(10), Value::Int(10));
        assert_eq!(Value::Float(2.5), Value::Float(2.5));
        assert_eq!(Value::Bool(true), Value::Bool(true));
        assert_eq!(Value::from("hello"), Value::from("hello"));

        assert_ne!(Value::Int(10), Value::Int(20));
        assert_ne!(Value::from("hello"), Value::from("world"));
        // No implicit numeric promotion inside the engine
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Int(1), Value::Bool(true));
    }

    #[test]
    fn test_value_try_cmp() {
        assert_eq!(Value::Int(5).try_cmp(&Value::Int(5)), Ok(Ordering::Equal));
        assert_eq!(Value::Int(4).try_cmp(&Value::Int(5)), Ok(Ordering::Less));
        assert_eq!(Value::Float(-0.5).try_cmp(&Value::Float(0.25)), Ok(Ordering::Less));
        assert_eq!(Value::Bool(false).try_cmp(&Value::Bool(true)), Ok(Ordering::Less));
        assert_eq!(Value::from("world").try_cmp(&Value::from("hello")), Ok(Ordering::Greater));

        assert!(matches!(
            Value::Int(10).try_cmp(&Value::from("hello")),
            Err(QueryError::IncomparableValues { .. })
        ));
        assert!(matches!(
            Value::Int(1).try_cmp(&Value::Float(1.0)),
            Err(QueryError::IncomparableValues { .. })
        ));
    }

    #[test]
    fn test_hash_agrees_with_eq() {
        let mut set = ahash::AHashSet::new();
        set.insert(Value::Float(1.5));
        set.insert(Value::Float(1.5));
        set.insert(Value::Int(1));
        set.insert(Value::from("1"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_coerce() {
        assert_eq!(ValueType::Float.coerce(Value::Int(3)), Ok(Value::Float(3.0)));
        assert_eq!(ValueType::Int.coerce(Value::Float(3.0)), Ok(Value::Int(3)));
        assert_eq!(ValueType::Text.coerce(Value::from("x")), Ok(Value::from("x")));
        assert_eq!(ValueType::Bool.coerce(Value::Bool(false)), Ok(Value::Bool(false)));

        assert!(matches!(
            ValueType::Int.coerce(Value::Float(3.5)),
            Err(QueryError::ValueNotConvertible { target: ValueType::Int, .. })
        ));
        assert!(matches!(
            ValueType::Text.coerce(Value::Int(3)),
            Err(QueryError::ValueNotConvertible { target: ValueType::Text, .. })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(-3).to_string(), "-3");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::from("a\"b").to_string(), "\"a\\\"b\"");
        assert_eq!(ValueType::Float.to_string(), "DOUBLE");
    }
}
