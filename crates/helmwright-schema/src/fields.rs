//! Capability traits over a resource's loosely-typed attribute bag.
//!
//! The host runtime owns the attributes; the lifecycle only reads them through
//! [`ReadableFields`] and mutates them through [`WritableFields`]. The same
//! operations therefore run against the host-backed bag and against
//! [`MemoryFields`], which holds nested release sets of a parent resource.

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub trait ReadableFields {
    fn id(&self) -> &str;

    /// Returns `None` for absent keys. `Value::Null` is treated as absent by
    /// the typed accessors in [`FieldsExt`].
    fn get(&self, key: &str) -> Option<&Value>;
}

pub trait WritableFields: ReadableFields {
    fn set(&mut self, key: &str, value: Value);

    fn set_id(&mut self, id: &str);
}

/// Typed accessors shared by every [`ReadableFields`] implementation.
pub trait FieldsExt: ReadableFields {
    fn get_str(&self, key: &str) -> Result<Option<String>, SchemaError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(invalid(key, "a string")),
        }
    }

    fn get_str_or(&self, key: &str, default: &str) -> Result<String, SchemaError> {
        Ok(self.get_str(key)?.unwrap_or_else(|| default.to_owned()))
    }

    fn get_bool(&self, key: &str) -> Result<Option<bool>, SchemaError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(invalid(key, "a boolean")),
        }
    }

    fn get_u32(&self, key: &str) -> Result<Option<u32>, SchemaError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(Some)
                .ok_or_else(|| invalid(key, "a non-negative integer")),
            Some(_) => Err(invalid(key, "a non-negative integer")),
        }
    }

    fn get_string_list(&self, key: &str) -> Result<Vec<String>, SchemaError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| scalar_to_string(item).ok_or_else(|| invalid(key, "a list of strings")))
                .collect(),
            Some(_) => Err(invalid(key, "a list of strings")),
        }
    }

    /// Map values may be any scalar; they are rendered the way the host renders
    /// map elements (numbers and booleans as their literal text).
    fn get_string_map(&self, key: &str) -> Result<BTreeMap<String, String>, SchemaError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(BTreeMap::new()),
            Some(Value::Object(entries)) => entries
                .iter()
                .map(|(k, v)| {
                    scalar_to_string(v)
                        .map(|s| (k.clone(), s))
                        .ok_or_else(|| invalid(key, "a map of scalars"))
                })
                .collect(),
            Some(_) => Err(invalid(key, "a map of scalars")),
        }
    }
}

impl<T: ReadableFields + ?Sized> FieldsExt for T {}

fn invalid(key: &str, expected: &'static str) -> SchemaError {
    SchemaError::InvalidAttribute {
        key: key.to_owned(),
        expected,
    }
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// In-memory attribute bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryFields {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl MemoryFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_attributes(attributes: Map<String, Value>) -> Self {
        Self {
            id: String::new(),
            attributes,
        }
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_owned(), value.into());
        self
    }

    pub fn into_attributes(self) -> Map<String, Value> {
        self.attributes
    }
}

impl ReadableFields for MemoryFields {
    fn id(&self) -> &str {
        &self.id
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

impl WritableFields for MemoryFields {
    fn set(&mut self, key: &str, value: Value) {
        self.attributes.insert(key.to_owned(), value);
    }

    fn set_id(&mut self, id: &str) {
        id.clone_into(&mut self.id);
    }
}
