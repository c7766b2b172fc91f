//! Module-args file loading
//!
//! One file describes one reconciliation: the kind, target state, the
//! desired resource (as field params, an inline document or a `src` path)
//! and how to reach the cluster.

use converge::backend::http::ConnectionParams;
use converge::schema::{self, KindDescriptor};
use converge::{DesiredInput, Error, ReconcileRequest, Result, TargetState};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct ModuleArgs {
    /// Kind name or return key, e.g. `PersistentVolumeClaim`
    pub kind: String,

    #[serde(default)]
    pub state: TargetState,

    #[serde(default)]
    pub force: bool,

    #[serde(default, alias = "_ansible_check_mode")]
    pub check_mode: bool,

    #[serde(default)]
    pub resource_definition: Option<Value>,

    #[serde(default)]
    pub src: Option<PathBuf>,

    #[serde(flatten)]
    pub connection: ConnectionParams,

    /// Everything else: `name`, `namespace` and the kind's field params
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl ModuleArgs {
    /// Load a module-args file. `.toml` files are parsed as TOML, anything
    /// else as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let value: Value = if is_toml {
            toml::from_str(&content).map_err(|e| {
                Error::InvalidDocument(format!("{}: {}", path.display(), e.message()))
            })?
        } else {
            serde_json::from_str(&content)?
        };

        let mut args = Self::from_value(value)?;
        log::debug!("Loaded module args from {}", path.display());

        args.connection.fill_missing(|name| std::env::var(name).ok());
        Ok(args)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::InvalidDocument(
                "module args must be a mapping".to_string(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Resolve the kind descriptor
    pub fn descriptor(&self) -> Result<&'static KindDescriptor> {
        schema::lookup(&self.kind).ok_or_else(|| {
            let known: Vec<&str> = schema::BUILTIN_KINDS.iter().map(|k| k.kind).collect();
            Error::Validation(format!(
                "unsupported kind '{}' (expected one of {})",
                self.kind,
                known.join(", ")
            ))
        })
    }

    /// Build the reconciliation request; `check` forces check mode on
    pub fn request(&self, check: bool) -> Result<ReconcileRequest<'static>> {
        let kind = self.descriptor()?;
        let input = DesiredInput {
            params: self.params.clone(),
            resource_definition: self.resource_definition.clone(),
            src: self.src.clone(),
        };

        Ok(ReconcileRequest::new(kind, input)
            .state(self.state)
            .force(self.force)
            .check_mode(check || self.check_mode))
    }
}
