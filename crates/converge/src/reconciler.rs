//! Reconciler - decides and executes create, patch, delete or nothing
//!
//! Reconciliation is split in two phases so callers can show the decision
//! (and ask for confirmation) before anything is mutated:
//!
//! 1. [`plan`] builds the desired document, fetches the live one and diffs
//! 2. [`execute`] carries out the decision, unless in check mode
//!
//! [`reconcile`] runs both.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::backend::{Backend, fetch};
use crate::builder::{DesiredInput, ObjectBuilder, resource_ref};
use crate::diff::{Diff, MergeOptions, Patch, diff};
use crate::document::{ResourceDocument, ResourceRef};
use crate::error::{Error, Result};
use crate::schema::KindDescriptor;

/// Desired existence of the resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    #[default]
    Present,
    Absent,
}

impl FromStr for TargetState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            other => Err(Error::Validation(format!(
                "state must be one of present, absent; got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
        }
    }
}

/// What a reconciliation did (or would do in check mode)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Created,
    Patched,
    Deleted,
    NoChange,
}

impl Action {
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoChange)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Patched => write!(f, "patched"),
            Self::Deleted => write!(f, "deleted"),
            Self::NoChange => write!(f, "unchanged"),
        }
    }
}

/// One reconciliation request
#[derive(Debug, Clone)]
pub struct ReconcileRequest<'k> {
    pub kind: &'k KindDescriptor,
    pub input: DesiredInput,
    pub state: TargetState,
    /// Replace lists instead of merging them
    pub force: bool,
    /// Compute and report, but never mutate
    pub check_mode: bool,
}

impl<'k> ReconcileRequest<'k> {
    pub fn new(kind: &'k KindDescriptor, input: DesiredInput) -> Self {
        Self {
            kind,
            input,
            state: TargetState::Present,
            force: false,
            check_mode: false,
        }
    }

    #[must_use]
    pub fn state(mut self, state: TargetState) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub fn check_mode(mut self, check_mode: bool) -> Self {
        self.check_mode = check_mode;
        self
    }
}

/// The decided transition
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Create,
    Patch(Patch),
    Delete,
    NoChange,
}

impl Decision {
    pub fn action(&self) -> Action {
        match self {
            Self::Create => Action::Created,
            Self::Patch(_) => Action::Patched,
            Self::Delete => Action::Deleted,
            Self::NoChange => Action::NoChange,
        }
    }
}

/// Everything known before mutating
#[derive(Debug, Clone)]
pub struct Plan<'k> {
    pub kind: &'k KindDescriptor,
    pub target: ResourceRef,
    pub desired: ResourceDocument,
    pub live: Option<ResourceDocument>,
    pub decision: Decision,
}

impl Plan<'_> {
    pub fn has_changes(&self) -> bool {
        self.decision.action().is_change()
    }

    /// The document the cluster should hold once the decision is carried out
    pub fn expected(&self) -> Option<ResourceDocument> {
        match (&self.decision, &self.live) {
            (Decision::Create, _) => Some(self.desired.clone()),
            (Decision::Patch(patch), Some(live)) => Some(patch.apply(live)),
            (Decision::Patch(_), None) | (Decision::Delete, _) => None,
            (Decision::NoChange, live) => live.clone(),
        }
    }
}

/// Result of one reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub changed: bool,
    pub action: Action,
    pub api_version: String,
    pub return_key: String,
    /// Resulting document, `None` after a delete or when nothing exists
    pub resource: Option<ResourceDocument>,
    /// Live document before reconciling
    pub before: Option<ResourceDocument>,
}

impl Outcome {
    /// The module result record: `changed`, `api_version` and the document
    /// under the kind's return key.
    pub fn to_json(&self) -> Value {
        let mut record = Map::new();
        record.insert("changed".to_string(), Value::Bool(self.changed));
        record.insert(
            "api_version".to_string(),
            Value::String(self.api_version.clone()),
        );
        record.insert(
            self.return_key.clone(),
            self.resource
                .as_ref()
                .map_or(Value::Null, ResourceDocument::to_value),
        );
        Value::Object(record)
    }
}

/// Build, fetch and diff without mutating anything
pub fn plan<'k>(backend: &dyn Backend, request: &ReconcileRequest<'k>) -> Result<Plan<'k>> {
    let desired = ObjectBuilder::new(request.kind).build(&request.input)?;
    let target = resource_ref(request.kind, &desired)?;
    let live = fetch(backend, &target)?;

    let decision = match request.state {
        TargetState::Absent if live.is_some() => Decision::Delete,
        TargetState::Absent => Decision::NoChange,
        TargetState::Present => {
            let opts = MergeOptions {
                force: request.force,
            };
            match diff(&desired, live.as_ref(), opts) {
                Diff::CreateNeeded => Decision::Create,
                Diff::NoChange => Decision::NoChange,
                Diff::PatchNeeded(patch) => Decision::Patch(patch),
            }
        }
    };

    match &decision {
        Decision::Patch(patch) => {
            log::info!("{} needs a patch ({} changes)", target, patch.len());
            for op in &patch.ops {
                log::debug!("  {}", op);
            }
        }
        Decision::Create => log::info!("{} needs to be created", target),
        Decision::Delete => log::info!("{} needs to be deleted", target),
        Decision::NoChange => log::info!("{} is up to date", target),
    }

    Ok(Plan {
        kind: request.kind,
        target,
        desired,
        live,
        decision,
    })
}

/// Carry out a plan. In check mode the result is reported as if the
/// mutation had succeeded, without calling the backend.
pub fn execute(backend: &dyn Backend, plan: Plan<'_>, check_mode: bool) -> Result<Outcome> {
    let action = plan.decision.action();

    let resource = if check_mode {
        if action.is_change() {
            log::info!("Check mode: not {} {}", verb(action), plan.target);
        }
        plan.expected()
    } else {
        match &plan.decision {
            Decision::NoChange => plan.live.clone(),
            Decision::Create => {
                let created = backend.create(&plan.target, &plan.desired)?;
                log::info!("Created {}", plan.target);
                Some(created)
            }
            Decision::Patch(patch) => {
                let Some(live) = &plan.live else {
                    return Err(Error::mutation(
                        "patch",
                        None,
                        format!("{} has no live state to patch", plan.target),
                    ));
                };
                let body = patch.to_merge_patch(live);
                let patched = backend.patch(&plan.target, &body)?;
                log::info!("Patched {}", plan.target);
                Some(patched)
            }
            Decision::Delete => {
                backend.delete(&plan.target)?;
                log::info!("Deleted {}", plan.target);
                None
            }
        }
    };

    Ok(Outcome {
        changed: action.is_change(),
        action,
        api_version: plan.kind.api_version.to_string(),
        return_key: plan.kind.return_key.to_string(),
        resource,
        before: plan.live,
    })
}

/// Plan and execute in one step
pub fn reconcile(backend: &dyn Backend, request: &ReconcileRequest<'_>) -> Result<Outcome> {
    let plan = plan(backend, request)?;
    execute(backend, plan, request.check_mode)
}

fn verb(action: Action) -> &'static str {
    match action {
        Action::Created => "creating",
        Action::Patched => "patching",
        Action::Deleted => "deleting",
        Action::NoChange => "changing",
    }
}
