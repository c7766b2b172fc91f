//! API backends for reading and mutating cluster objects.
//!
//! The [`Backend`] trait is the seam between the reconciler and the cluster.
//! [`http::HttpBackend`] talks to a real API server; [`MockBackend`] keeps
//! objects in memory and records calls for tests.
//!
//! # Testing
//!
//! ```
//! use converge::backend::{Backend, MockBackend, Operation};
//! use converge::{ResourceDocument, ResourceRef};
//! use serde_json::json;
//!
//! let mock = MockBackend::new();
//! let target = ResourceRef {
//!     api_version: "v1".to_string(),
//!     kind: "PersistentVolumeClaim".to_string(),
//!     plural: "persistentvolumeclaims".to_string(),
//!     namespace: Some("demo".to_string()),
//!     name: "data".to_string(),
//! };
//! assert!(mock.get(&target).unwrap().is_none());
//!
//! let doc = ResourceDocument::from_value(json!({"metadata": {"name": "data"}})).unwrap();
//! mock.create(&target, &doc).unwrap();
//! assert!(mock.get(&target).unwrap().is_some());
//! assert_eq!(mock.mutations(), vec![Operation::Create]);
//! ```

pub mod http;

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::document::{ResourceDocument, ResourceRef};
use crate::error::{Error, ErrorKind, Result};

/// Operations a backend performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Create,
    Patch,
    Delete,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Create => "create",
            Self::Patch => "patch",
            Self::Delete => "delete",
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How an API call's HTTP status is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// 404 on get or delete
    Missing,
    Failed(ErrorKind),
}

/// Classify an HTTP status answering `op`
pub fn classify(op: Operation, status: u16) -> StatusClass {
    if (200..300).contains(&status) {
        return StatusClass::Success;
    }
    match op {
        Operation::Get | Operation::Delete if status == 404 => StatusClass::Missing,
        Operation::Get => StatusClass::Failed(ErrorKind::ApiConnection),
        _ if status == 401 => StatusClass::Failed(ErrorKind::ApiConnection),
        Operation::Create | Operation::Patch | Operation::Delete => {
            StatusClass::Failed(ErrorKind::ApiMutation)
        }
    }
}

/// Backend trait for cluster access.
///
/// All calls are blocking. Implementations must not retry; a failure is
/// returned to the caller as-is.
pub trait Backend: Send + Sync {
    /// Fetch the live object, `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `Error::ApiConnection` for transport, auth or server failures.
    fn get(&self, target: &ResourceRef) -> Result<Option<ResourceDocument>>;

    /// Create the object and return what the server stored.
    fn create(&self, target: &ResourceRef, doc: &ResourceDocument) -> Result<ResourceDocument>;

    /// Apply a JSON merge patch and return the patched object.
    fn patch(&self, target: &ResourceRef, merge_patch: &Value) -> Result<ResourceDocument>;

    /// Delete the object. Deleting an object that is already gone succeeds.
    fn delete(&self, target: &ResourceRef) -> Result<()>;
}

/// Read the live state of a resource
pub fn fetch(backend: &dyn Backend, target: &ResourceRef) -> Result<Option<ResourceDocument>> {
    let live = backend.get(target)?;
    match &live {
        Some(doc) => log::debug!(
            "Fetched {} (resourceVersion {})",
            target,
            doc.resource_version().unwrap_or("unknown")
        ),
        None => log::debug!("{} not found", target),
    }
    Ok(live)
}

/// A failure the mock should produce
#[derive(Debug, Clone)]
enum Failure {
    Connection(String),
    Rejected { status: u16, message: String },
}

/// Mock backend for testing without a cluster.
///
/// Objects live in memory. Create and patch stamp a `resourceVersion` the
/// way a server would, and a patch carrying a stale `resourceVersion` is
/// rejected with a conflict.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    objects: Arc<Mutex<HashMap<ResourceRef, ResourceDocument>>>,
    calls: Arc<Mutex<Vec<Operation>>>,
    failures: Arc<Mutex<HashMap<Operation, Failure>>>,
    version: Arc<Mutex<u64>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockBackend {
    /// Create a new empty mock backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing object.
    pub fn insert(&self, target: &ResourceRef, doc: ResourceDocument) {
        lock(&self.objects).insert(target.clone(), doc);
    }

    /// Current stored object, bypassing call recording.
    pub fn stored(&self, target: &ResourceRef) -> Option<ResourceDocument> {
        lock(&self.objects).get(target).cloned()
    }

    /// Make an operation fail as if the server was unreachable.
    pub fn fail_connection(&self, op: Operation, message: impl Into<String>) {
        lock(&self.failures).insert(op, Failure::Connection(message.into()));
    }

    /// Make an operation fail with an HTTP error from the server.
    pub fn reject(&self, op: Operation, status: u16, message: impl Into<String>) {
        lock(&self.failures).insert(
            op,
            Failure::Rejected {
                status,
                message: message.into(),
            },
        );
    }

    /// Every operation issued so far, in order.
    pub fn calls(&self) -> Vec<Operation> {
        lock(&self.calls).clone()
    }

    /// Mutating operations issued so far, in order.
    pub fn mutations(&self) -> Vec<Operation> {
        self.calls().into_iter().filter(Operation::is_mutation).collect()
    }

    fn record(&self, op: Operation) -> Result<()> {
        lock(&self.calls).push(op);
        match lock(&self.failures).get(&op) {
            None => Ok(()),
            Some(Failure::Connection(message)) => Err(Error::connection(message.clone(), None)),
            Some(Failure::Rejected { status, message }) => match classify(op, *status) {
                StatusClass::Failed(ErrorKind::ApiMutation) => {
                    Err(Error::mutation(op.name(), Some(*status), message.clone()))
                }
                _ => Err(Error::connection(message.clone(), Some(*status))),
            },
        }
    }

    fn next_version(&self) -> String {
        let mut version = lock(&self.version);
        *version += 1;
        version.to_string()
    }
}

impl Backend for MockBackend {
    fn get(&self, target: &ResourceRef) -> Result<Option<ResourceDocument>> {
        self.record(Operation::Get)?;
        Ok(self.stored(target))
    }

    fn create(&self, target: &ResourceRef, doc: &ResourceDocument) -> Result<ResourceDocument> {
        self.record(Operation::Create)?;

        let mut objects = lock(&self.objects);
        if objects.contains_key(target) {
            return Err(Error::mutation(
                "create",
                Some(409),
                format!("{} already exists", target),
            ));
        }

        let mut stored = doc.clone();
        stored.set_path(&["metadata", "resourceVersion"], Value::from(self.next_version()));
        objects.insert(target.clone(), stored.clone());
        Ok(stored)
    }

    fn patch(&self, target: &ResourceRef, merge_patch: &Value) -> Result<ResourceDocument> {
        self.record(Operation::Patch)?;

        let mut objects = lock(&self.objects);
        let Some(current) = objects.get(target) else {
            return Err(Error::mutation("patch", Some(404), format!("{} not found", target)));
        };

        let expected = merge_patch
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str);
        if let Some(expected) = expected
            && current.resource_version() != Some(expected)
        {
            return Err(Error::mutation(
                "patch",
                Some(409),
                "the object has been modified; please apply your changes to the latest version",
            ));
        }

        let mut value = current.to_value();
        apply_merge_patch(&mut value, merge_patch);
        let mut patched = ResourceDocument::from_value(value)?;
        patched.set_path(&["metadata", "resourceVersion"], Value::from(self.next_version()));
        objects.insert(target.clone(), patched.clone());
        Ok(patched)
    }

    fn delete(&self, target: &ResourceRef) -> Result<()> {
        self.record(Operation::Delete)?;
        lock(&self.objects).remove(target);
        Ok(())
    }
}

/// Apply a JSON merge patch: mappings merge, null deletes, anything else replaces
fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                apply_merge_patch(
                    target_map.entry(key.clone()).or_insert(Value::Null),
                    value,
                );
            }
        }
    }
}
