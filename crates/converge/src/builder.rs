//! Object builder - assembles the desired-state document
//!
//! The desired document comes from exactly one source: flat parameters
//! resolved through the kind's field table, an inline `resource_definition`,
//! or a `src` file holding a JSON document.

use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::document::{ResourceDocument, ResourceRef, type_name};
use crate::error::{Error, Result};
use crate::schema::{KindDescriptor, camelize_keys};

const NAME_PATH: &str = "metadata.name";
const NAMESPACE_PATH: &str = "metadata.namespace";
const DEFAULT_NAMESPACE: &str = "default";

/// Raw declarative input for one invocation
#[derive(Debug, Clone, Default)]
pub struct DesiredInput {
    /// Flat parameters keyed by param name, alias or dotted path
    pub params: Map<String, Value>,
    /// Inline full document
    pub resource_definition: Option<Value>,
    /// Path to a file holding a full document
    pub src: Option<PathBuf>,
}

impl DesiredInput {
    pub fn from_params(params: Map<String, Value>) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    pub fn from_definition(definition: Value) -> Self {
        Self {
            resource_definition: Some(definition),
            ..Default::default()
        }
    }
}

/// A parameter resolved to its document path
#[derive(Debug)]
struct Resolved {
    param: String,
    path: String,
    value: Value,
}

/// Builds desired-state documents for one kind
pub struct ObjectBuilder<'k> {
    kind: &'k KindDescriptor,
}

impl<'k> ObjectBuilder<'k> {
    pub fn new(kind: &'k KindDescriptor) -> Self {
        Self { kind }
    }

    /// Build the desired document
    pub fn build(&self, input: &DesiredInput) -> Result<ResourceDocument> {
        let resolved = self.resolve_params(&input.params)?;

        let mut doc = match self.load_document(input)? {
            Some(doc) => self.overlay_identity(doc, resolved)?,
            None => {
                let mut doc = ResourceDocument::new();
                for r in resolved {
                    let path: Vec<&str> = r.path.split('.').collect();
                    doc.set_path(&path, r.value);
                }
                doc
            }
        };

        doc.strip_nulls();
        let mut doc = self.with_type_meta(doc)?;

        if doc.name().is_none_or(str::is_empty) {
            return Err(Error::Validation(format!(
                "name is required for {}",
                self.kind.kind
            )));
        }
        if self.kind.namespaced && doc.namespace().is_none_or(str::is_empty) {
            doc.set_path(&["metadata", "namespace"], Value::from(DEFAULT_NAMESPACE));
        }

        log::debug!(
            "Built desired {} {}",
            self.kind.kind,
            doc.name().unwrap_or_default()
        );
        Ok(doc)
    }

    /// Resolve flat params to document paths, validating types and choices
    fn resolve_params(&self, params: &Map<String, Value>) -> Result<Vec<Resolved>> {
        let mut resolved: Vec<Resolved> = Vec::new();

        for (name, value) in params {
            if value.is_null() {
                continue;
            }

            let (path, value) = if name.contains('.') {
                (name.clone(), value.clone())
            } else {
                let Some(field) = self.kind.field(name) else {
                    log::debug!("Ignoring unknown parameter '{}' for {}", name, self.kind.kind);
                    continue;
                };

                if !field.ty.accepts(value) {
                    return Err(Error::Validation(format!(
                        "parameter '{}' must be of type {}, got {}",
                        name,
                        field.ty,
                        type_name(value)
                    )));
                }
                if !field.choices.is_empty()
                    && !value
                        .as_str()
                        .is_some_and(|s| field.choices.contains(&s))
                {
                    return Err(Error::Validation(format!(
                        "parameter '{}' must be one of {}, got {}",
                        name,
                        field.choices.join(", "),
                        value
                    )));
                }

                let value = if field.ty.converts_keys() {
                    camelize_keys(value.clone())
                } else {
                    value.clone()
                };
                (field.path.to_string(), value)
            };

            if let Some(existing) = resolved.iter().find(|r| r.path == path) {
                if existing.value != value {
                    return Err(Error::ConflictingInput(format!(
                        "parameters '{}' and '{}' set {} to different values",
                        existing.param, name, path
                    )));
                }
                continue;
            }
            if let Some(existing) = resolved.iter().find(|r| overlaps(&r.path, &path)) {
                return Err(Error::ConflictingInput(format!(
                    "parameters '{}' and '{}' both set {} and {}",
                    existing.param, name, existing.path, path
                )));
            }

            resolved.push(Resolved {
                param: name.clone(),
                path,
                value,
            });
        }

        Ok(resolved)
    }

    /// Load the full document from `resource_definition` or `src`
    fn load_document(&self, input: &DesiredInput) -> Result<Option<ResourceDocument>> {
        match (&input.resource_definition, &input.src) {
            (Some(_), Some(_)) => Err(Error::ConflictingInput(
                "resource_definition and src are mutually exclusive".to_string(),
            )),
            (Some(definition), None) => {
                ResourceDocument::from_value(definition.clone()).map(Some)
            }
            (None, Some(src)) => read_document(src).map(Some),
            (None, None) => Ok(None),
        }
    }

    /// Apply name/namespace params to a provided document; reject anything else
    fn overlay_identity(
        &self,
        mut doc: ResourceDocument,
        resolved: Vec<Resolved>,
    ) -> Result<ResourceDocument> {
        for r in resolved {
            if r.path != NAME_PATH && r.path != NAMESPACE_PATH {
                return Err(Error::ConflictingInput(format!(
                    "parameter '{}' cannot be combined with a full resource document",
                    r.param
                )));
            }

            let path: Vec<&str> = r.path.split('.').collect();
            match doc.get_path(&path) {
                Some(existing) if !existing.is_null() && *existing != r.value => {
                    return Err(Error::ConflictingInput(format!(
                        "parameter '{}' ({}) disagrees with the document ({})",
                        r.param, r.value, existing
                    )));
                }
                _ => doc.set_path(&path, r.value),
            }
        }
        Ok(doc)
    }

    /// Ensure apiVersion and kind match the descriptor, placing them first
    fn with_type_meta(&self, doc: ResourceDocument) -> Result<ResourceDocument> {
        if let Some(api_version) = doc.api_version()
            && !self.kind.accepts_api_version(api_version)
        {
            return Err(Error::Validation(format!(
                "document apiVersion '{}' does not match {}",
                api_version, self.kind.api_version
            )));
        }
        if let Some(kind) = doc.kind()
            && kind != self.kind.kind
        {
            return Err(Error::Validation(format!(
                "document kind '{}' does not match {}",
                kind, self.kind.kind
            )));
        }

        let mut map = Map::new();
        map.insert("apiVersion".into(), Value::from(self.kind.api_version));
        map.insert("kind".into(), Value::from(self.kind.kind));
        for (k, v) in doc.as_map() {
            if k != "apiVersion" && k != "kind" {
                map.insert(k.clone(), v.clone());
            }
        }
        Ok(ResourceDocument::from(map))
    }
}

/// Whether one dotted path lies inside the other
fn overlaps(a: &str, b: &str) -> bool {
    let nested = |outer: &str, inner: &str| {
        inner.len() > outer.len()
            && inner.starts_with(outer)
            && inner.as_bytes()[outer.len()] == b'.'
    };
    nested(a, b) || nested(b, a)
}

/// Read a JSON document from disk
fn read_document(src: &Path) -> Result<ResourceDocument> {
    let expanded = shellexpand::tilde(&src.to_string_lossy()).into_owned();
    let path = PathBuf::from(expanded);
    let content = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
    let value: Value = serde_json::from_str(&content)?;
    ResourceDocument::from_value(value)
}

/// Identity of a built document
pub fn resource_ref(kind: &KindDescriptor, doc: &ResourceDocument) -> Result<ResourceRef> {
    let name = doc
        .name()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::Validation(format!("name is required for {}", kind.kind)))?;

    let namespace = if kind.namespaced {
        Some(doc.namespace().unwrap_or(DEFAULT_NAMESPACE).to_string())
    } else {
        None
    };

    Ok(ResourceRef {
        api_version: kind.api_version.to_string(),
        kind: kind.kind.to_string(),
        plural: kind.plural.to_string(),
        namespace,
        name: name.to_string(),
    })
}
