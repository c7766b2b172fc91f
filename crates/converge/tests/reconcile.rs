//! End-to-end reconciliation against the in-memory backend

use converge::backend::Operation;
use converge::builder::resource_ref;
use converge::diff::{MergeOptions, diff};
use converge::schema::{DEPLOYMENT_CONFIG, KindDescriptor, PERSISTENT_VOLUME_CLAIM};
use converge::{
    Action, Diff, DesiredInput, Error, ErrorKind, FailureReport, MockBackend, ObjectBuilder,
    ReconcileRequest, ResourceDocument, TargetState, reconcile,
};
use serde_json::{Value, json};
use std::io::Write;

fn input(value: Value) -> DesiredInput {
    DesiredInput::from_params(value.as_object().cloned().unwrap_or_default())
}

fn request(kind: &'static KindDescriptor, value: Value) -> ReconcileRequest<'static> {
    ReconcileRequest::new(kind, input(value))
}

/// Seed the mock with `live`, stored under the identity of the request's
/// desired document
fn seed(mock: &MockBackend, req: &ReconcileRequest<'_>, live: Value) {
    let desired = ObjectBuilder::new(req.kind).build(&req.input).unwrap();
    let target = resource_ref(req.kind, &desired).unwrap();
    mock.insert(&target, ResourceDocument::from_value(live).unwrap());
}

fn dc_live() -> Value {
    json!({
        "apiVersion": "apps.openshift.io/v1",
        "kind": "DeploymentConfig",
        "metadata": {
            "name": "frontend",
            "namespace": "k8s-project",
            "resourceVersion": "41",
            "labels": {"app": "frontend", "team": "web"}
        },
        "spec": {
            "replicas": 1,
            "triggers": [
                {"type": "ConfigChange"},
                {"type": "ImageChange", "imageChangeParams": {"automatic": false}}
            ],
            "template": {
                "spec": {
                    "containers": [
                        {"name": "a", "image": "a:1"},
                        {"name": "b", "image": "b:1"}
                    ]
                }
            }
        },
        "status": {"latestVersion": 3}
    })
}

#[test]
fn test_create_then_converges() {
    let mock = MockBackend::new();
    let req = request(
        &PERSISTENT_VOLUME_CLAIM,
        json!({
            "name": "data",
            "namespace": "demo",
            "access_modes": ["ReadWriteOnce"],
            "resources_requests": {"storage": "1Gi"}
        }),
    );

    let first = reconcile(&mock, &req).unwrap();
    assert!(first.changed);
    assert_eq!(first.action, Action::Created);
    assert!(first.before.is_none());
    assert_eq!(mock.mutations(), vec![Operation::Create]);

    let second = reconcile(&mock, &req).unwrap();
    assert!(!second.changed);
    assert_eq!(second.action, Action::NoChange);
    assert_eq!(mock.mutations(), vec![Operation::Create]);
    assert_eq!(second.resource, first.resource);
}

#[test]
fn test_absent_on_missing_resource_is_unchanged() {
    let mock = MockBackend::new();
    let req = request(&PERSISTENT_VOLUME_CLAIM, json!({"name": "data"})).state(TargetState::Absent);

    let outcome = reconcile(&mock, &req).unwrap();
    assert!(!outcome.changed);
    assert!(outcome.resource.is_none());
    assert!(mock.mutations().is_empty());
}

#[test]
fn test_absent_deletes_and_reports_null() {
    let mock = MockBackend::new();
    let req = request(&PERSISTENT_VOLUME_CLAIM, json!({"name": "data", "namespace": "demo"}))
        .state(TargetState::Absent);
    seed(
        &mock,
        &req,
        json!({"metadata": {"name": "data", "namespace": "demo"}, "spec": {}}),
    );

    let outcome = reconcile(&mock, &req).unwrap();
    assert!(outcome.changed);
    assert_eq!(outcome.action, Action::Deleted);
    assert_eq!(
        outcome.to_json(),
        json!({"changed": true, "api_version": "v1", "persistent_volume_claim": null})
    );
    assert_eq!(mock.mutations(), vec![Operation::Delete]);
}

#[test]
fn test_partial_desired_state_is_no_change() {
    let mock = MockBackend::new();
    let req = request(
        &DEPLOYMENT_CONFIG,
        json!({"name": "frontend", "namespace": "k8s-project", "replicas": 1, "labels": {"app": "frontend"}}),
    );
    seed(&mock, &req, dc_live());

    let outcome = reconcile(&mock, &req).unwrap();
    assert!(!outcome.changed);
    assert_eq!(outcome.resource, outcome.before);
    assert!(mock.mutations().is_empty());
}

#[test]
fn test_patch_keeps_live_only_fields() {
    let mock = MockBackend::new();
    let req = request(
        &DEPLOYMENT_CONFIG,
        json!({
            "name": "frontend",
            "namespace": "k8s-project",
            "replicas": 3,
            "labels": {"tier": "edge"},
            "containers": [{"name": "b", "image": "b:2"}, {"name": "c", "image": "c:1"}]
        }),
    );
    seed(&mock, &req, dc_live());

    let outcome = reconcile(&mock, &req).unwrap();
    assert_eq!(outcome.action, Action::Patched);

    let doc = outcome.resource.unwrap();
    assert_eq!(doc.get_path(&["spec", "replicas"]), Some(&json!(3)));
    assert_eq!(
        doc.get_path(&["metadata", "labels"]),
        Some(&json!({"app": "frontend", "team": "web", "tier": "edge"}))
    );
    assert_eq!(
        doc.get_path(&["spec", "template", "spec", "containers"]),
        Some(&json!([
            {"name": "a", "image": "a:1"},
            {"name": "b", "image": "b:2"},
            {"name": "c", "image": "c:1"}
        ]))
    );
    assert_eq!(doc.get_path(&["status", "latestVersion"]), Some(&json!(3)));

    let again = reconcile(&mock, &req).unwrap();
    assert!(!again.changed);
}

#[test]
fn test_force_replaces_lists() {
    let mock = MockBackend::new();
    let req = request(
        &DEPLOYMENT_CONFIG,
        json!({
            "name": "frontend",
            "namespace": "k8s-project",
            "triggers": [{"type": "ConfigChange"}]
        }),
    )
    .force(true);
    seed(&mock, &req, dc_live());

    let outcome = reconcile(&mock, &req).unwrap();
    assert!(outcome.changed);
    let doc = outcome.resource.unwrap();
    assert_eq!(
        doc.get_path(&["spec", "triggers"]),
        Some(&json!([{"type": "ConfigChange"}]))
    );
    assert_eq!(
        doc.get_path(&["spec", "template", "spec", "containers"])
            .and_then(Value::as_array)
            .map(Vec::len),
        Some(2)
    );
}

#[test]
fn test_check_mode_reports_same_changed_without_mutating() {
    let cases: Vec<(ReconcileRequest<'static>, Option<Value>)> = vec![
        (
            request(&DEPLOYMENT_CONFIG, json!({"name": "frontend", "namespace": "k8s-project"})),
            None,
        ),
        (
            request(&DEPLOYMENT_CONFIG, json!({"name": "frontend", "namespace": "k8s-project", "replicas": 5})),
            Some(dc_live()),
        ),
        (
            request(&DEPLOYMENT_CONFIG, json!({"name": "frontend", "namespace": "k8s-project", "replicas": 1})),
            Some(dc_live()),
        ),
        (
            request(&DEPLOYMENT_CONFIG, json!({"name": "frontend", "namespace": "k8s-project"}))
                .state(TargetState::Absent),
            Some(dc_live()),
        ),
        (
            request(&DEPLOYMENT_CONFIG, json!({"name": "frontend", "namespace": "k8s-project"}))
                .state(TargetState::Absent),
            None,
        ),
    ];

    for (req, live) in cases {
        let dry_mock = MockBackend::new();
        let live_mock = MockBackend::new();
        if let Some(live) = &live {
            seed(&dry_mock, &req, live.clone());
            seed(&live_mock, &req, live.clone());
        }

        let dry = reconcile(&dry_mock, &req.clone().check_mode(true)).unwrap();
        let real = reconcile(&live_mock, &req).unwrap();

        assert!(dry_mock.mutations().is_empty());
        assert_eq!(dry.changed, real.changed);
        assert_eq!(dry.action, real.action);
    }
}

#[test]
fn test_check_mode_reports_expected_documents() {
    let mock = MockBackend::new();
    let req = request(
        &DEPLOYMENT_CONFIG,
        json!({"name": "frontend", "namespace": "k8s-project", "replicas": 5}),
    )
    .check_mode(true);
    seed(&mock, &req, dc_live());

    let outcome = reconcile(&mock, &req).unwrap();
    let doc = outcome.resource.unwrap();
    assert_eq!(doc.get_path(&["spec", "replicas"]), Some(&json!(5)));
    assert_eq!(doc.resource_version(), Some("41"));

    let created = reconcile(
        &MockBackend::new(),
        &request(&PERSISTENT_VOLUME_CLAIM, json!({"name": "data"})).check_mode(true),
    )
    .unwrap();
    let doc = created.resource.unwrap();
    assert_eq!(doc.kind(), Some("PersistentVolumeClaim"));
    assert_eq!(doc.namespace(), Some("default"));
}

#[test]
fn test_patch_then_rediff_is_no_change() {
    let live = ResourceDocument::from_value(dc_live()).unwrap();
    let desired = ObjectBuilder::new(&DEPLOYMENT_CONFIG)
        .build(&input(json!({
            "name": "frontend",
            "namespace": "k8s-project",
            "triggers": [{"type": "ImageChange", "image_change_params": {"automatic": true}}],
            "containers": [{"name": "a", "image": "a:2", "ports": [{"container_port": 8080}]}]
        })))
        .unwrap();

    for force in [false, true] {
        let opts = MergeOptions { force };
        let Diff::PatchNeeded(patch) = diff(&desired, Some(&live), opts) else {
            panic!("expected a patch");
        };
        let patched = patch.apply(&live);
        assert_eq!(diff(&desired, Some(&patched), opts), Diff::NoChange);
    }
}

#[test]
fn test_errors_are_fatal_and_reported() {
    let mock = MockBackend::new();
    mock.fail_connection(Operation::Get, "connection refused");
    let req = request(&PERSISTENT_VOLUME_CLAIM, json!({"name": "data"}));
    let err = reconcile(&mock, &req).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ApiConnection);
    assert!(mock.mutations().is_empty());

    let mock = MockBackend::new();
    mock.reject(Operation::Create, 422, "spec.accessModes: Required value");
    let err = reconcile(&mock, &req).unwrap_err();
    assert!(matches!(err, Error::ApiMutation { status: Some(422), .. }));

    let report = FailureReport::from(&err);
    assert!(report.failed);
    assert_eq!(report.error, "ApiMutationError");
    assert!(report.msg.contains("spec.accessModes"));
}

#[test]
fn test_rejected_delete_is_fatal() {
    let mock = MockBackend::new();
    let req = request(
        &DEPLOYMENT_CONFIG,
        json!({"name": "frontend", "namespace": "k8s-project"}),
    )
    .state(TargetState::Absent);
    seed(&mock, &req, dc_live());
    mock.reject(Operation::Delete, 403, "deploymentconfigs \"frontend\" is forbidden");

    let err = reconcile(&mock, &req).unwrap_err();
    assert!(matches!(
        err,
        Error::ApiMutation {
            operation: "delete",
            status: Some(403),
            ..
        }
    ));
    assert_eq!(FailureReport::from(&err).error, "ApiMutationError");

    let plan = converge::reconciler::plan(&mock, &req).unwrap();
    assert!(mock.stored(&plan.target).is_some());
}

#[test]
fn test_legacy_api_version_definition_converges() {
    let mock = MockBackend::new();
    let req = ReconcileRequest::new(
        &DEPLOYMENT_CONFIG,
        DesiredInput::from_definition(json!({
            "apiVersion": "v1",
            "kind": "DeploymentConfig",
            "metadata": {"name": "frontend", "namespace": "k8s-project"},
            "spec": {"replicas": 1}
        })),
    );
    seed(&mock, &req, dc_live());

    let outcome = reconcile(&mock, &req).unwrap();
    assert!(!outcome.changed);
    assert_eq!(outcome.action, Action::NoChange);
    assert!(mock.mutations().is_empty());
}

#[test]
fn test_stale_write_is_rejected() {
    let mock = MockBackend::new();
    let req = request(
        &DEPLOYMENT_CONFIG,
        json!({"name": "frontend", "namespace": "k8s-project", "replicas": 2}),
    );
    seed(&mock, &req, dc_live());

    let plan = converge::reconciler::plan(&mock, &req).unwrap();
    // Someone else writes between fetch and patch
    let mut concurrent = ResourceDocument::from_value(dc_live()).unwrap();
    concurrent.set_path(&["metadata", "resourceVersion"], json!("42"));
    mock.insert(&plan.target, concurrent);

    let err = converge::reconciler::execute(&mock, plan, false).unwrap_err();
    assert!(matches!(err, Error::ApiMutation { status: Some(409), .. }));
}

#[test]
fn test_definition_from_src_file() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(
        file,
        "{}",
        json!({
            "apiVersion": "v1",
            "kind": "PersistentVolumeClaim",
            "metadata": {"name": "from-file", "namespace": "demo"},
            "spec": {"accessModes": ["ReadWriteMany"]}
        })
    )
    .unwrap();

    let mock = MockBackend::new();
    let req = ReconcileRequest::new(
        &PERSISTENT_VOLUME_CLAIM,
        DesiredInput {
            src: Some(file.path().to_path_buf()),
            ..Default::default()
        },
    );

    let outcome = reconcile(&mock, &req).unwrap();
    assert_eq!(outcome.action, Action::Created);
    assert_eq!(outcome.resource.unwrap().name(), Some("from-file"));
}
