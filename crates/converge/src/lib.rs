//! # Converge
//!
//! Desired-state reconciliation for Kubernetes resources.
//!
//! One invocation runs a single pipeline:
//!
//! - **Builder** ([`builder`]): assembles the desired document from flat
//!   parameters, an inline document or a document file
//! - **Fetcher** ([`backend::fetch`]): reads the live document, or reports
//!   that it does not exist
//! - **Differencer** ([`diff`]): computes a patch using merge or replace
//!   semantics for lists
//! - **Reconciler** ([`reconciler`]): decides create, patch, delete or
//!   nothing, and carries it out unless in check mode
//!
//! Resource kinds are described declaratively in [`schema`]; adding a kind
//! means adding a [`KindDescriptor`], not a new code path.
//!
//! ## Example
//!
//! ```
//! use converge::backend::MockBackend;
//! use converge::builder::DesiredInput;
//! use converge::reconciler::{Action, ReconcileRequest, reconcile};
//! use converge::schema::PERSISTENT_VOLUME_CLAIM;
//! use serde_json::json;
//!
//! let params = json!({"name": "data", "namespace": "demo", "access_modes": ["ReadWriteOnce"]});
//! let input = DesiredInput::from_params(params.as_object().cloned().unwrap_or_default());
//! let request = ReconcileRequest::new(&PERSISTENT_VOLUME_CLAIM, input);
//!
//! let backend = MockBackend::new();
//! let outcome = reconcile(&backend, &request)?;
//! assert_eq!(outcome.action, Action::Created);
//!
//! // Running again converges to no change
//! let outcome = reconcile(&backend, &request)?;
//! assert!(!outcome.changed);
//! # Ok::<(), converge::Error>(())
//! ```

pub mod backend;
pub mod builder;
pub mod diff;
pub mod document;
pub mod error;
pub mod reconciler;
pub mod schema;

pub use backend::{Backend, MockBackend, fetch};
pub use builder::{DesiredInput, ObjectBuilder};
pub use diff::{Diff, MergeOptions, Patch, PatchOp};
pub use document::{ResourceDocument, ResourceRef};
pub use error::{Error, ErrorKind, FailureReport, Result};
pub use reconciler::{Action, Outcome, ReconcileRequest, TargetState, reconcile};
pub use schema::{FieldSpec, FieldType, KindDescriptor};
