//! Differencer - computes the patch that converges live state to desired state
//!
//! Merge policy:
//! - scalars are overwritten
//! - mappings are merged key by key; keys only present live are kept
//! - lists of mappings carrying a `name` or `type` discriminator are merged
//!   element-wise, other lists are merged as a unique set
//! - with `force`, lists are replaced wholesale
//!
//! Fields absent from the desired document are never touched, so a partial
//! desired document is the normal case.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::document::{ResourceDocument, set_in_map};

/// Keys that identify list elements for element-wise merge, in priority order
const DISCRIMINATORS: &[&str] = &["name", "type"];

/// Options controlling the merge
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    /// Replace lists instead of merging them
    pub force: bool,
}

/// One field-level change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    /// Overwrite a scalar, or install a subtree the live document lacks
    Set { path: Vec<String>, value: Value },
    /// Merge list elements by discriminator or as a unique set
    MergeList { path: Vec<String>, items: Vec<Value> },
    /// Replace the list with exactly these items
    ReplaceList { path: Vec<String>, items: Vec<Value> },
}

impl PatchOp {
    pub fn path(&self) -> &[String] {
        match self {
            Self::Set { path, .. } | Self::MergeList { path, .. } | Self::ReplaceList { path, .. } => {
                path
            }
        }
    }
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::Set { .. } => "set",
            Self::MergeList { .. } => "merge",
            Self::ReplaceList { .. } => "replace",
        };
        write!(f, "{} {}", verb, self.path().join("."))
    }
}

/// An ordered set of field-level changes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Patch {
    pub ops: Vec<PatchOp>,
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Dotted paths touched by this patch
    pub fn paths(&self) -> Vec<String> {
        self.ops.iter().map(|op| op.path().join(".")).collect()
    }

    /// Apply the patch to a document, returning the patched copy
    pub fn apply(&self, live: &ResourceDocument) -> ResourceDocument {
        let mut doc = live.clone();
        for op in &self.ops {
            match op {
                PatchOp::Set { path, value } => doc.set_path(path, value.clone()),
                PatchOp::MergeList { path, items } => {
                    let current = doc
                        .get_path(path)
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default();
                    doc.set_path(path, Value::Array(merge_list(&current, items)));
                }
                PatchOp::ReplaceList { path, items } => {
                    doc.set_path(path, Value::Array(items.clone()));
                }
            }
        }
        doc
    }

    /// Render a JSON merge patch for the server.
    ///
    /// Each touched path carries its fully resolved value (lists are sent
    /// whole, since merge patch replaces lists). The live `resourceVersion`
    /// is included so a concurrent writer makes the server reject the patch.
    pub fn to_merge_patch(&self, live: &ResourceDocument) -> Value {
        let patched = self.apply(live);
        let mut body = Map::new();
        for op in &self.ops {
            if let Some(value) = patched.get_path(op.path()) {
                set_in_map(&mut body, op.path(), value.clone());
            }
        }
        if let Some(version) = live.resource_version() {
            set_in_map(
                &mut body,
                &["metadata", "resourceVersion"],
                Value::from(version),
            );
        }
        Value::Object(body)
    }
}

/// Outcome of comparing desired against live state
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Nothing lives on the cluster yet
    CreateNeeded,
    /// Every desired field already matches
    NoChange,
    /// Fields differ
    PatchNeeded(Patch),
}

/// Compare desired state against live state
pub fn diff(
    desired: &ResourceDocument,
    live: Option<&ResourceDocument>,
    opts: MergeOptions,
) -> Diff {
    let Some(live) = live else {
        return Diff::CreateNeeded;
    };

    let mut ops = Vec::new();
    diff_maps(&mut Vec::new(), desired.as_map(), live.as_map(), opts, &mut ops);

    if ops.is_empty() {
        Diff::NoChange
    } else {
        Diff::PatchNeeded(Patch { ops })
    }
}

fn diff_maps(
    path: &mut Vec<String>,
    desired: &Map<String, Value>,
    live: &Map<String, Value>,
    opts: MergeOptions,
    ops: &mut Vec<PatchOp>,
) {
    for (key, want) in desired {
        if want.is_null() {
            continue;
        }
        path.push(key.clone());
        diff_value(path, want, live.get(key), opts, ops);
        path.pop();
    }
}

fn diff_value(
    path: &mut Vec<String>,
    want: &Value,
    have: Option<&Value>,
    opts: MergeOptions,
    ops: &mut Vec<PatchOp>,
) {
    match (want, have) {
        (Value::Object(want_map), Some(Value::Object(have_map))) => {
            diff_maps(path, want_map, have_map, opts, ops);
        }
        (Value::Array(want_items), Some(Value::Array(have_items))) => {
            if opts.force {
                if want_items != have_items {
                    ops.push(PatchOp::ReplaceList {
                        path: path.clone(),
                        items: want_items.clone(),
                    });
                }
            } else if merge_list(have_items, want_items) != *have_items {
                ops.push(PatchOp::MergeList {
                    path: path.clone(),
                    items: want_items.clone(),
                });
            }
        }
        (want, Some(have)) if want == have => {}
        (want, _) => ops.push(PatchOp::Set {
            path: path.clone(),
            value: want.clone(),
        }),
    }
}

/// Discriminator key and value of a list element, if it has one
fn discriminator(item: &Value) -> Option<(&'static str, &Value)> {
    let map = item.as_object()?;
    DISCRIMINATORS
        .iter()
        .find_map(|key| map.get(*key).map(|v| (*key, v)))
}

/// Merge desired list items into the live list.
///
/// Elements with a discriminator are matched by occurrence: the n-th desired
/// element with a given value merges into the n-th live element with that
/// value, so the first match wins and extra duplicates are appended. Other
/// elements are appended unless an equal element already exists. Nothing is
/// ever removed.
pub fn merge_list(live: &[Value], desired: &[Value]) -> Vec<Value> {
    let mut result = live.to_vec();
    let mut seen: Vec<(&str, &Value)> = Vec::new();

    for want in desired {
        if want.is_null() {
            continue;
        }

        match discriminator(want) {
            Some((key, id)) => {
                let occurrence = seen.iter().filter(|(k, v)| *k == key && *v == id).count();
                seen.push((key, id));

                let slot = result
                    .iter()
                    .enumerate()
                    .filter(|(_, item)| {
                        item.as_object()
                            .and_then(|m| m.get(key))
                            .is_some_and(|v| v == id)
                    })
                    .map(|(i, _)| i)
                    .nth(occurrence);

                match slot {
                    Some(i) => {
                        let merged = merge_value(&result[i], want);
                        result[i] = merged;
                    }
                    None => result.push(want.clone()),
                }
            }
            None => {
                if !result.contains(want) {
                    result.push(want.clone());
                }
            }
        }
    }

    result
}

/// Merge a desired value onto a live value with the default (non-force) policy
fn merge_value(live: &Value, desired: &Value) -> Value {
    match (live, desired) {
        (Value::Object(have), Value::Object(want)) => {
            let mut merged = have.clone();
            for (key, value) in want {
                if value.is_null() {
                    continue;
                }
                let next = match have.get(key) {
                    Some(existing) => merge_value(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (Value::Array(have), Value::Array(want)) => Value::Array(merge_list(have, want)),
        (_, desired) => desired.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> ResourceDocument {
        ResourceDocument::from_value(value).unwrap()
    }

    fn patch_of(d: Diff) -> Patch {
        match d {
            Diff::PatchNeeded(p) => p,
            other => panic!("expected a patch, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_live_needs_create() {
        let desired = doc(json!({"metadata": {"name": "a"}}));
        assert_eq!(diff(&desired, None, MergeOptions::default()), Diff::CreateNeeded);
    }

    #[test]
    fn test_subset_is_no_change() {
        let desired = doc(json!({
            "metadata": {"name": "a", "labels": {"app": "web"}},
            "spec": {"replicas": 2}
        }));
        let live = doc(json!({
            "metadata": {"name": "a", "labels": {"app": "web", "tier": "front"}, "uid": "123"},
            "spec": {"replicas": 2, "paused": false},
            "status": {"phase": "Bound"}
        }));
        assert_eq!(diff(&desired, Some(&live), MergeOptions::default()), Diff::NoChange);
    }

    #[test]
    fn test_scalar_change_is_set() {
        let desired = doc(json!({"spec": {"replicas": 3}}));
        let live = doc(json!({"spec": {"replicas": 5, "test": false}}));
        let patch = patch_of(diff(&desired, Some(&live), MergeOptions::default()));
        assert_eq!(
            patch.ops,
            vec![PatchOp::Set {
                path: vec!["spec".into(), "replicas".into()],
                value: json!(3)
            }]
        );
        assert_eq!(
            patch.apply(&live).to_value(),
            json!({"spec": {"replicas": 3, "test": false}})
        );
    }

    #[test]
    fn test_mapping_merge_keeps_live_only_keys() {
        let desired = doc(json!({"metadata": {"labels": {"app": "api", "env": "prod"}}}));
        let live = doc(json!({"metadata": {"labels": {"app": "web", "team": "core"}}}));
        let patch = patch_of(diff(&desired, Some(&live), MergeOptions::default()));
        assert_eq!(patch.paths(), vec!["metadata.labels.app", "metadata.labels.env"]);
        assert_eq!(
            patch.apply(&live).get_path(&["metadata", "labels"]),
            Some(&json!({"app": "api", "team": "core", "env": "prod"}))
        );
    }

    #[test]
    fn test_missing_subtree_is_set_whole() {
        let desired = doc(json!({"spec": {"selector": {"matchLabels": {"a": "b"}}}}));
        let live = doc(json!({"spec": {}}));
        let patch = patch_of(diff(&desired, Some(&live), MergeOptions::default()));
        assert_eq!(patch.paths(), vec!["spec.selector"]);
    }

    #[test]
    fn test_element_wise_list_merge() {
        let live = [json!({"name": "a", "v": 1}), json!({"name": "b", "v": 2})];
        let desired = [json!({"name": "b", "v": 9}), json!({"name": "c", "v": 3})];
        assert_eq!(
            merge_list(&live, &desired),
            vec![
                json!({"name": "a", "v": 1}),
                json!({"name": "b", "v": 9}),
                json!({"name": "c", "v": 3}),
            ]
        );
    }

    #[test]
    fn test_element_merge_is_recursive() {
        let live = [json!({
            "name": "web",
            "image": "nginx:1",
            "ports": [{"name": "http", "containerPort": 80}]
        })];
        let desired = [json!({
            "name": "web",
            "image": "nginx:2",
            "ports": [{"name": "metrics", "containerPort": 9090}]
        })];
        assert_eq!(
            merge_list(&live, &desired),
            vec![json!({
                "name": "web",
                "image": "nginx:2",
                "ports": [
                    {"name": "http", "containerPort": 80},
                    {"name": "metrics", "containerPort": 9090}
                ]
            })]
        );
    }

    #[test]
    fn test_type_discriminator() {
        let live = [json!({"type": "ConfigChange"}), json!({"type": "ImageChange", "auto": false})];
        let desired = [json!({"type": "ImageChange", "auto": true})];
        assert_eq!(
            merge_list(&live, &desired),
            vec![json!({"type": "ConfigChange"}), json!({"type": "ImageChange", "auto": true})]
        );
    }

    #[test]
    fn test_scalar_list_is_unique_union() {
        let live = [json!("ReadWriteOnce")];
        let desired = [json!("ReadOnlyMany"), json!("ReadWriteOnce"), json!("ReadOnlyMany")];
        assert_eq!(
            merge_list(&live, &desired),
            vec![json!("ReadWriteOnce"), json!("ReadOnlyMany")]
        );
    }

    #[test]
    fn test_duplicate_discriminators_first_match_wins() {
        let live = [json!({"name": "b", "v": 1}), json!({"name": "x"})];
        let desired = [json!({"name": "b", "v": 2}), json!({"name": "b", "v": 3})];
        let merged = merge_list(&live, &desired);
        assert_eq!(
            merged,
            vec![
                json!({"name": "b", "v": 2}),
                json!({"name": "x"}),
                json!({"name": "b", "v": 3}),
            ]
        );
        // The appended duplicate binds on the next pass, so it converges.
        assert_eq!(merge_list(&merged, &desired), merged);
    }

    #[test]
    fn test_merge_never_removes_elements() {
        let live = [json!("a"), json!("b")];
        let desired = [json!("b")];
        assert_eq!(merge_list(&live, &desired), live.to_vec());

        let desired_doc = doc(json!({"spec": {"accessModes": ["b"]}}));
        let live_doc = doc(json!({"spec": {"accessModes": ["a", "b"]}}));
        assert_eq!(
            diff(&desired_doc, Some(&live_doc), MergeOptions::default()),
            Diff::NoChange
        );
    }

    #[test]
    fn test_force_replaces_lists() {
        let desired = doc(json!({"spec": {"accessModes": ["b"]}}));
        let live = doc(json!({"spec": {"accessModes": ["a", "b"]}}));
        let opts = MergeOptions { force: true };
        let patch = patch_of(diff(&desired, Some(&live), opts));
        assert!(matches!(patch.ops[0], PatchOp::ReplaceList { .. }));
        assert_eq!(
            patch.apply(&live).get_path(&["spec", "accessModes"]),
            Some(&json!(["b"]))
        );
    }

    #[test]
    fn test_force_equal_list_is_no_change() {
        let desired = doc(json!({"spec": {"accessModes": ["a"]}}));
        let live = doc(json!({"spec": {"accessModes": ["a"]}}));
        assert_eq!(
            diff(&desired, Some(&live), MergeOptions { force: true }),
            Diff::NoChange
        );
    }

    #[test]
    fn test_type_change_is_set() {
        let desired = doc(json!({"spec": {"selector": {"app": "x"}}}));
        let live = doc(json!({"spec": {"selector": "app=x"}}));
        let patch = patch_of(diff(&desired, Some(&live), MergeOptions::default()));
        assert_eq!(
            patch.ops,
            vec![PatchOp::Set {
                path: vec!["spec".into(), "selector".into()],
                value: json!({"app": "x"})
            }]
        );
    }

    #[test]
    fn test_desired_nulls_are_ignored() {
        let desired = doc(json!({"spec": {"volumeName": null}}));
        let live = doc(json!({"spec": {"volumeName": "pv-1"}}));
        assert_eq!(diff(&desired, Some(&live), MergeOptions::default()), Diff::NoChange);
    }

    #[test]
    fn test_merge_patch_body() {
        let desired = doc(json!({
            "spec": {"replicas": 3, "triggers": [{"type": "ImageChange"}]}
        }));
        let live = doc(json!({
            "metadata": {"name": "fe", "resourceVersion": "77"},
            "spec": {"replicas": 1, "triggers": [{"type": "ConfigChange"}], "test": false}
        }));
        let patch = patch_of(diff(&desired, Some(&live), MergeOptions::default()));
        assert_eq!(
            patch.to_merge_patch(&live),
            json!({
                "spec": {
                    "replicas": 3,
                    "triggers": [{"type": "ConfigChange"}, {"type": "ImageChange"}]
                },
                "metadata": {"resourceVersion": "77"}
            })
        );
    }

    #[test]
    fn test_op_display() {
        let op = PatchOp::MergeList {
            path: vec!["spec".into(), "triggers".into()],
            items: vec![],
        };
        assert_eq!(op.to_string(), "merge spec.triggers");
    }
}
