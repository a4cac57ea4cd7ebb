use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};

use bytes::Bytes;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Dynamic value flowing through a compiled extraction plan.
///
/// A `Value` is both what leaf extractors decode out of a record and what
/// composite nodes exchange along plan links. It doubles as the operation
/// token of value-carrying composites (constants, map keys), so it provides
/// structural `Eq`/`Hash` — floats are compared and hashed by bit pattern.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Value {
    Bool(bool),
    /// Signed interpretation of an integer field (e.g. zigzag decoded).
    Int(i64),
    /// Unsigned interpretation of an integer field.
    UInt(u64),
    Float(f64),
    String(String),
    /// A binary region: a whole record, a length-delimited payload or a blob.
    Bytes(Bytes),
    /// Ordered collection result.
    List(Vec<Value>),
    /// Pre-decoded structured record (e.g. binary blob + metadata), consumed
    /// by map-key projection.
    Map(Vec<(Value, Value)>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
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
            Value::Int(n) => n.hash(state),
            Value::UInt(n) => n.hash(state),
            Value::Float(n) => n.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::List(items) => items.hash(state),
            Value::Map(entries) => entries.hash(state),
        }
    }
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Looks up `key` in a `Map` value. Returns `None` for missing keys.
    pub fn map_get(&self, key: &Value) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Name of the variant, used in type-mismatch diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::UInt(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
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

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::UInt(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "{} bytes", b.len()),
            Value::List(items) => {
                let rendered = items
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<String>>()
                    .join(", ");
                write!(f, "[{}]", rendered)
            }
            Value::Map(entries) => write!(f, "{{{} entries}}", entries.len()),
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Bytes(b) => write!(f, "{:02x?}", &b[..]),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Map(entries) => f.debug_map().entries(entries.iter().map(|(k, v)| (k, v))).finish(),
            other => write!(f, "{}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use rustc_hash::FxHashMap;

    use super::*;

    #[rstest]
    #[case(Value::Float(1.5), Value::Float(1.5), true)]
    #[case(Value::Float(f64::NAN), Value::Float(f64::NAN), true)]
    #[case(Value::Float(0.0), Value::Float(-0.0), false)]
    #[case(Value::Int(1), Value::UInt(1), false)]
    #[case(Value::from("abc"), Value::from("abc"), true)]
    fn test_eq(#[case] a: Value, #[case] b: Value, #[case] expected: bool) {
        assert_eq!(a == b, expected);
    }

    #[test]
    fn test_usable_as_hash_key() {
        let mut index: FxHashMap<Value, usize> = FxHashMap::default();
        index.insert(Value::Float(3.25), 0);
        index.insert(Value::from("A"), 1);
        assert_eq!(index.get(&Value::Float(3.25)), Some(&0));
        assert_eq!(index.get(&Value::from("A")), Some(&1));
    }

    #[rstest]
    #[case(Value::from("A"), Some(Value::Int(1)))]
    #[case(Value::from("C"), None)]
    fn test_map_get(#[case] key: Value, #[case] expected: Option<Value>) {
        let map = Value::Map(vec![
            (Value::from("A"), Value::Int(1)),
            (Value::from("B"), Value::Int(2)),
        ]);
        assert_eq!(map.map_get(&key).cloned(), expected);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::from("x")]).to_string(),
            "[1, x]"
        );
        assert_eq!(Value::Bytes(Bytes::from_static(b"xyz")).to_string(), "3 bytes");
    }
}
