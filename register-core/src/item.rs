use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::digest::Digest;

/// A cross-register reference of the form `<register>:<key>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Curie {
    register: String,
    key: String,
}

impl Curie {
    pub fn new(register: impl Into<String>, key: impl Into<String>) -> Self {
        Curie {
            register: register.into(),
            key: key.into(),
        }
    }

    pub fn register(&self) -> &str {
        &self.register
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for Curie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.register, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid curie: {0:?}")]
pub struct ParseCurieError(String);

impl FromStr for Curie {
    type Err = ParseCurieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((register, key)) if !register.is_empty() && !key.is_empty() => {
                Ok(Curie::new(register, key))
            }
            _ => Err(ParseCurieError(s.to_string())),
        }
    }
}

/// A field value of an item.
///
/// Scalars and references both serialize as JSON strings; sequences serialize
/// as arrays and keep their order (duplicates included).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Scalar(String),
    Reference(Curie),
    Sequence(Vec<Value>),
}

impl Value {
    /// Returns the scalar text, if this is a scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Value::Sequence(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(s) => f.write_str(s),
            Value::Reference(curie) => write!(f, "{}", curie),
            Value::Sequence(values) => {
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(";")?;
                    }
                    write!(f, "{}", value)?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Scalar(s) => serializer.serialize_str(s),
            Value::Reference(curie) => serializer.collect_str(curie),
            Value::Sequence(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for value in values {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Scalar(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Scalar(n.to_string())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Scalar(n.to_string())
    }
}

impl From<Curie> for Value {
    fn from(curie: Curie) -> Self {
        Value::Reference(curie)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::Sequence(values.into_iter().map(Into::into).collect())
    }
}

/// A record: a mapping from field name to value.
///
/// Fields are kept sorted by name, so the canonical serialization does not
/// depend on the order in which fields were set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    fields: BTreeMap<String, Value>,
}

impl Item {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Sets a field, returning the previous value if any.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Iterates fields in canonical (name) order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Canonical JSON: keys sorted, no insignificant whitespace.
    pub fn canonical(&self) -> String {
        serde_json::to_string(self).expect("serialization should not fail")
    }

    /// Digest of the canonical serialization.
    pub fn digest(&self) -> Digest {
        Digest::of(self.canonical().as_bytes())
    }
}

impl Serialize for Item {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
