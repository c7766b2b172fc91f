//! Resource documents and identities
//!
//! A [`ResourceDocument`] is an ordered JSON mapping holding `apiVersion`,
//! `kind`, `metadata`, `spec` and optionally `status`. Both desired and live
//! state use the same type.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{Error, Result};

/// An ordered Kubernetes resource document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceDocument(Map<String, Value>);

impl ResourceDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value, which must be an object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::InvalidDocument(format!(
                "expected a mapping, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn api_version(&self) -> Option<&str> {
        self.0.get("apiVersion").and_then(Value::as_str)
    }

    pub fn kind(&self) -> Option<&str> {
        self.0.get("kind").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.get_path(&["metadata", "name"]).and_then(Value::as_str)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.get_path(&["metadata", "namespace"])
            .and_then(Value::as_str)
    }

    /// Server-assigned version used for optimistic concurrency
    pub fn resource_version(&self) -> Option<&str> {
        self.get_path(&["metadata", "resourceVersion"])
            .and_then(Value::as_str)
    }

    /// Look up a nested value
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.0.get(first.as_ref())?;
        for key in rest {
            current = current.as_object()?.get(key.as_ref())?;
        }
        Some(current)
    }

    /// Set a nested value, creating intermediate mappings.
    ///
    /// A non-mapping found on the way is replaced by a mapping.
    pub fn set_path<S: AsRef<str>>(&mut self, path: &[S], value: Value) {
        set_in_map(&mut self.0, path, value);
    }

    /// Drop null values recursively
    pub fn strip_nulls(&mut self) {
        strip_nulls_map(&mut self.0);
    }
}

impl From<Map<String, Value>> for ResourceDocument {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

pub(crate) fn set_in_map<S: AsRef<str>>(map: &mut Map<String, Value>, path: &[S], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = map;
    for key in parents {
        let entry = current
            .entry(key.as_ref().to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = match entry {
            Value::Object(inner) => inner,
            _ => return,
        };
    }
    current.insert(last.as_ref().to_string(), value);
}

pub(crate) fn strip_nulls_map(map: &mut Map<String, Value>) {
    map.retain(|_, v| !v.is_null());
    for value in map.values_mut() {
        strip_nulls_value(value);
    }
}

fn strip_nulls_value(value: &mut Value) {
    match value {
        Value::Object(map) => strip_nulls_map(map),
        Value::Array(items) => {
            items.retain(|v| !v.is_null());
            items.iter_mut().for_each(strip_nulls_value);
        }
        _ => {}
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

/// Uniquely identifies a resource on the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub api_version: String,
    pub kind: String,
    /// Plural REST name (e.g., "persistentvolumeclaims")
    pub plural: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}
