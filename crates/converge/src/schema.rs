//! Resource-kind descriptors
//!
//! One generic reconciler serves every kind; what differs per kind is data:
//! the REST coordinates and an ordered table mapping flat parameter names
//! (and their aliases) to nested document paths.

use serde_json::Value;
use std::fmt;

/// Declared type of a parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Str,
    Int,
    Bool,
    /// Free-form string map (labels, annotations, requests); keys are user data
    Dict,
    /// Structured API object; keys are converted to camelCase
    Object,
    /// List of scalars
    List,
    /// List of structured API objects; keys are converted to camelCase
    ObjectList,
}

impl FieldType {
    /// Whether a JSON value has the shape this type expects
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Str => value.is_string(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Bool => value.is_boolean(),
            Self::Dict | Self::Object => value.is_object(),
            Self::List | Self::ObjectList => value.is_array(),
        }
    }

    /// Whether nested keys of the value name API fields
    pub fn converts_keys(&self) -> bool {
        matches!(self, Self::Object | Self::ObjectList)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Dict | Self::Object => "dict",
            Self::List | Self::ObjectList => "list",
        };
        f.write_str(name)
    }
}

/// Maps one flat parameter onto a document path
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Full parameter name (e.g., "spec_access_modes")
    pub param: &'static str,
    /// Short alias (e.g., "access_modes")
    pub alias: Option<&'static str>,
    /// Dotted document path (e.g., "spec.accessModes")
    pub path: &'static str,
    pub ty: FieldType,
    /// Allowed values; empty means unrestricted
    pub choices: &'static [&'static str],
}

impl FieldSpec {
    const fn new(param: &'static str, path: &'static str, ty: FieldType) -> Self {
        Self {
            param,
            alias: None,
            path,
            ty,
            choices: &[],
        }
    }

    const fn alias(mut self, alias: &'static str) -> Self {
        self.alias = Some(alias);
        self
    }

    const fn choices(mut self, choices: &'static [&'static str]) -> Self {
        self.choices = choices;
        self
    }

    /// Whether `name` refers to this field
    pub fn matches(&self, name: &str) -> bool {
        self.param == name || self.alias == Some(name)
    }

}

/// Everything the reconciler needs to know about one resource kind
#[derive(Debug)]
pub struct KindDescriptor {
    /// CamelCase kind (e.g., "PersistentVolumeClaim")
    pub kind: &'static str,
    /// Group/version (e.g., "v1", "apps.openshift.io/v1")
    pub api_version: &'static str,
    /// Older apiVersions documents may still carry; normalized on build
    pub legacy_api_versions: &'static [&'static str],
    /// Plural REST resource name
    pub plural: &'static str,
    pub namespaced: bool,
    /// Key under which the result document is returned
    pub return_key: &'static str,
    /// Kind-specific fields, in declaration order
    pub fields: &'static [FieldSpec],
}

/// Fields every kind carries in its metadata
pub const COMMON_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("name", "metadata.name", FieldType::Str),
    FieldSpec::new("namespace", "metadata.namespace", FieldType::Str),
    FieldSpec::new("labels", "metadata.labels", FieldType::Dict),
    FieldSpec::new("annotations", "metadata.annotations", FieldType::Dict),
];

impl KindDescriptor {
    /// Find the field a parameter name or alias refers to
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        COMMON_FIELDS
            .iter()
            .chain(self.fields.iter())
            .find(|f| f.matches(name))
    }

    /// All fields, common ones first
    pub fn all_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        COMMON_FIELDS.iter().chain(self.fields.iter())
    }

    /// Whether a document's apiVersion names this kind's API
    pub fn accepts_api_version(&self, api_version: &str) -> bool {
        api_version == self.api_version || self.legacy_api_versions.contains(&api_version)
    }
}

// ============================================================================
// Built-in kinds
// ============================================================================

use FieldType::{Bool, Dict, Int, List, Object, ObjectList, Str};

pub static PERSISTENT_VOLUME_CLAIM: KindDescriptor = KindDescriptor {
    kind: "PersistentVolumeClaim",
    api_version: "v1",
    legacy_api_versions: &[],
    plural: "persistentvolumeclaims",
    namespaced: true,
    return_key: "persistent_volume_claim",
    fields: &[
        FieldSpec::new("spec_access_modes", "spec.accessModes", List).alias("access_modes"),
        FieldSpec::new("spec_resources_limits", "spec.resources.limits", Dict)
            .alias("resources_limits"),
        FieldSpec::new("spec_resources_requests", "spec.resources.requests", Dict)
            .alias("resources_requests"),
        FieldSpec::new(
            "spec_selector_match_expressions",
            "spec.selector.matchExpressions",
            ObjectList,
        )
        .alias("selector_match_expressions"),
        FieldSpec::new("spec_selector_match_labels", "spec.selector.matchLabels", Dict)
            .alias("selector_match_labels"),
        FieldSpec::new("spec_storage_class_name", "spec.storageClassName", Str)
            .alias("storage_class_name"),
        FieldSpec::new("spec_volume_name", "spec.volumeName", Str).alias("volume_name"),
    ],
};

pub static DEPLOYMENT_CONFIG: KindDescriptor = KindDescriptor {
    kind: "DeploymentConfig",
    api_version: "apps.openshift.io/v1",
    legacy_api_versions: &["v1"],
    plural: "deploymentconfigs",
    namespaced: true,
    return_key: "deployment_config",
    fields: &[
        FieldSpec::new("spec_min_ready_seconds", "spec.minReadySeconds", Int)
            .alias("min_ready_seconds"),
        FieldSpec::new("spec_paused", "spec.paused", Bool).alias("paused"),
        FieldSpec::new("spec_replicas", "spec.replicas", Int).alias("replicas"),
        FieldSpec::new("spec_revision_history_limit", "spec.revisionHistoryLimit", Int)
            .alias("revision_history_limit"),
        FieldSpec::new("spec_selector", "spec.selector", Dict).alias("selector"),
        FieldSpec::new(
            "spec_strategy_active_deadline_seconds",
            "spec.strategy.activeDeadlineSeconds",
            Int,
        )
        .alias("strategy_active_deadline_seconds"),
        FieldSpec::new("spec_strategy_annotations", "spec.strategy.annotations", Dict)
            .alias("strategy_annotations"),
        FieldSpec::new("spec_strategy_custom_params", "spec.strategy.customParams", Object)
            .alias("strategy_custom_params"),
        FieldSpec::new("spec_strategy_labels", "spec.strategy.labels", Dict)
            .alias("strategy_labels"),
        FieldSpec::new(
            "spec_strategy_recreate_params",
            "spec.strategy.recreateParams",
            Object,
        )
        .alias("strategy_recreate_params"),
        FieldSpec::new(
            "spec_strategy_resources_limits",
            "spec.strategy.resources.limits",
            Dict,
        )
        .alias("strategy_resources_limits"),
        FieldSpec::new(
            "spec_strategy_resources_requests",
            "spec.strategy.resources.requests",
            Dict,
        )
        .alias("strategy_resources_requests"),
        FieldSpec::new("spec_strategy_rolling_params", "spec.strategy.rollingParams", Object)
            .alias("strategy_rolling_params"),
        FieldSpec::new("spec_strategy_type", "spec.strategy.type", Str)
            .alias("strategy_type")
            .choices(&["Rolling", "Custom", "Recreate"]),
        FieldSpec::new(
            "spec_template_metadata_annotations",
            "spec.template.metadata.annotations",
            Dict,
        ),
        FieldSpec::new(
            "spec_template_metadata_labels",
            "spec.template.metadata.labels",
            Dict,
        ),
        FieldSpec::new("spec_template_metadata_name", "spec.template.metadata.name", Str),
        FieldSpec::new(
            "spec_template_metadata_namespace",
            "spec.template.metadata.namespace",
            Str,
        ),
        FieldSpec::new(
            "spec_template_spec_active_deadline_seconds",
            "spec.template.spec.activeDeadlineSeconds",
            Int,
        )
        .alias("active_deadline_seconds"),
        FieldSpec::new(
            "spec_template_spec_affinity_node_affinity_preferred_during_scheduling_ignored_during_execution",
            "spec.template.spec.affinity.nodeAffinity.preferredDuringSchedulingIgnoredDuringExecution",
            ObjectList,
        )
        .alias("affinity_node_affinity_preferred_during_scheduling_ignored_during_execution"),
        FieldSpec::new(
            "spec_template_spec_affinity_node_affinity_required_during_scheduling_ignored_during_execution_node_selector_terms",
            "spec.template.spec.affinity.nodeAffinity.requiredDuringSchedulingIgnoredDuringExecution.nodeSelectorTerms",
            ObjectList,
        )
        .alias("affinity_node_affinity_required_during_scheduling_ignored_during_execution_node_selector_terms"),
        FieldSpec::new(
            "spec_template_spec_affinity_pod_affinity_preferred_during_scheduling_ignored_during_execution",
            "spec.template.spec.affinity.podAffinity.preferredDuringSchedulingIgnoredDuringExecution",
            ObjectList,
        )
        .alias("affinity_pod_affinity_preferred_during_scheduling_ignored_during_execution"),
        FieldSpec::new(
            "spec_template_spec_affinity_pod_affinity_required_during_scheduling_ignored_during_execution",
            "spec.template.spec.affinity.podAffinity.requiredDuringSchedulingIgnoredDuringExecution",
            ObjectList,
        )
        .alias("affinity_pod_affinity_required_during_scheduling_ignored_during_execution"),
        FieldSpec::new(
            "spec_template_spec_affinity_pod_anti_affinity_preferred_during_scheduling_ignored_during_execution",
            "spec.template.spec.affinity.podAntiAffinity.preferredDuringSchedulingIgnoredDuringExecution",
            ObjectList,
        )
        .alias("affinity_pod_anti_affinity_preferred_during_scheduling_ignored_during_execution"),
        FieldSpec::new(
            "spec_template_spec_affinity_pod_anti_affinity_required_during_scheduling_ignored_during_execution",
            "spec.template.spec.affinity.podAntiAffinity.requiredDuringSchedulingIgnoredDuringExecution",
            ObjectList,
        )
        .alias("affinity_pod_anti_affinity_required_during_scheduling_ignored_during_execution"),
        FieldSpec::new(
            "spec_template_spec_automount_service_account_token",
            "spec.template.spec.automountServiceAccountToken",
            Bool,
        )
        .alias("automount_service_account_token"),
        FieldSpec::new(
            "spec_template_spec_containers",
            "spec.template.spec.containers",
            ObjectList,
        )
        .alias("containers"),
        FieldSpec::new("spec_template_spec_dns_policy", "spec.template.spec.dnsPolicy", Str)
            .alias("dns_policy"),
        FieldSpec::new(
            "spec_template_spec_host_aliases",
            "spec.template.spec.hostAliases",
            ObjectList,
        )
        .alias("host_aliases"),
        FieldSpec::new("spec_template_spec_host_ipc", "spec.template.spec.hostIPC", Bool)
            .alias("host_ipc"),
        FieldSpec::new(
            "spec_template_spec_host_network",
            "spec.template.spec.hostNetwork",
            Bool,
        )
        .alias("host_network"),
        FieldSpec::new("spec_template_spec_host_pid", "spec.template.spec.hostPID", Bool)
            .alias("host_pid"),
        FieldSpec::new("spec_template_spec_hostname", "spec.template.spec.hostname", Str)
            .alias("hostname"),
        FieldSpec::new(
            "spec_template_spec_image_pull_secrets",
            "spec.template.spec.imagePullSecrets",
            ObjectList,
        )
        .alias("image_pull_secrets"),
        FieldSpec::new(
            "spec_template_spec_init_containers",
            "spec.template.spec.initContainers",
            ObjectList,
        )
        .alias("init_containers"),
        FieldSpec::new("spec_template_spec_node_name", "spec.template.spec.nodeName", Str)
            .alias("node_name"),
        FieldSpec::new(
            "spec_template_spec_node_selector",
            "spec.template.spec.nodeSelector",
            Dict,
        )
        .alias("node_selector"),
        FieldSpec::new("spec_template_spec_priority", "spec.template.spec.priority", Int)
            .alias("priority"),
        FieldSpec::new(
            "spec_template_spec_priority_class_name",
            "spec.template.spec.priorityClassName",
            Str,
        )
        .alias("priority_class_name"),
        FieldSpec::new(
            "spec_template_spec_restart_policy",
            "spec.template.spec.restartPolicy",
            Str,
        )
        .alias("restart_policy"),
        FieldSpec::new(
            "spec_template_spec_scheduler_name",
            "spec.template.spec.schedulerName",
            Str,
        )
        .alias("scheduler_name"),
        FieldSpec::new(
            "spec_template_spec_security_context_fs_group",
            "spec.template.spec.securityContext.fsGroup",
            Int,
        )
        .alias("security_context_fs_group"),
        FieldSpec::new(
            "spec_template_spec_security_context_run_as_non_root",
            "spec.template.spec.securityContext.runAsNonRoot",
            Bool,
        )
        .alias("security_context_run_as_non_root"),
        FieldSpec::new(
            "spec_template_spec_security_context_run_as_user",
            "spec.template.spec.securityContext.runAsUser",
            Int,
        )
        .alias("security_context_run_as_user"),
        FieldSpec::new(
            "spec_template_spec_security_context_se_linux_options_level",
            "spec.template.spec.securityContext.seLinuxOptions.level",
            Str,
        )
        .alias("security_context_se_linux_options_level"),
        FieldSpec::new(
            "spec_template_spec_security_context_se_linux_options_role",
            "spec.template.spec.securityContext.seLinuxOptions.role",
            Str,
        )
        .alias("security_context_se_linux_options_role"),
        FieldSpec::new(
            "spec_template_spec_security_context_se_linux_options_type",
            "spec.template.spec.securityContext.seLinuxOptions.type",
            Str,
        )
        .alias("security_context_se_linux_options_type"),
        FieldSpec::new(
            "spec_template_spec_security_context_se_linux_options_user",
            "spec.template.spec.securityContext.seLinuxOptions.user",
            Str,
        )
        .alias("security_context_se_linux_options_user"),
        FieldSpec::new(
            "spec_template_spec_security_context_supplemental_groups",
            "spec.template.spec.securityContext.supplementalGroups",
            List,
        )
        .alias("security_context_supplemental_groups"),
        FieldSpec::new(
            "spec_template_spec_service_account",
            "spec.template.spec.serviceAccount",
            Str,
        )
        .alias("service_account"),
        FieldSpec::new(
            "spec_template_spec_service_account_name",
            "spec.template.spec.serviceAccountName",
            Str,
        )
        .alias("service_account_name"),
        FieldSpec::new("spec_template_spec_subdomain", "spec.template.spec.subdomain", Str)
            .alias("subdomain"),
        FieldSpec::new(
            "spec_template_spec_termination_grace_period_seconds",
            "spec.template.spec.terminationGracePeriodSeconds",
            Int,
        )
        .alias("termination_grace_period_seconds"),
        FieldSpec::new(
            "spec_template_spec_tolerations",
            "spec.template.spec.tolerations",
            ObjectList,
        )
        .alias("tolerations"),
        FieldSpec::new("spec_template_spec_volumes", "spec.template.spec.volumes", ObjectList)
            .alias("volumes"),
        FieldSpec::new("spec_test", "spec.test", Bool).alias("test"),
        FieldSpec::new("spec_triggers", "spec.triggers", ObjectList).alias("triggers"),
    ],
};

/// All kinds known to this crate
pub static BUILTIN_KINDS: &[&KindDescriptor] = &[&PERSISTENT_VOLUME_CLAIM, &DEPLOYMENT_CONFIG];

/// Resolve a kind by name (case-insensitive) or by its return key
pub fn lookup(name: &str) -> Option<&'static KindDescriptor> {
    BUILTIN_KINDS
        .iter()
        .copied()
        .find(|k| k.kind.eq_ignore_ascii_case(name) || k.return_key == name)
}

/// Convert a snake_case API key to camelCase.
///
/// A leading underscore marks a name that collides with a reserved word
/// (`_from`) and is dropped. Keys without underscores pass through.
pub fn camel_case(key: &str) -> String {
    let trimmed = key.strip_prefix('_').unwrap_or(key);
    let mut out = String::with_capacity(trimmed.len());
    let mut upper_next = false;
    for ch in trimmed.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// API fields whose values are free-form maps keyed by user data
const FREE_FORM_KEYS: &[&str] = &[
    "annotations",
    "capacity",
    "data",
    "labels",
    "limits",
    "matchLabels",
    "nodeSelector",
    "requests",
    "stringData",
    "volumeAttributes",
];

/// Recursively convert the keys of structured API values to camelCase.
///
/// The values of free-form map fields (`matchLabels`, `nodeSelector`,
/// resource `limits`, ...) are left exactly as given.
pub fn camelize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let key = camel_case(&k);
                    if FREE_FORM_KEYS.contains(&key.as_str()) {
                        (key, v)
                    } else {
                        (key, camelize_keys(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(camelize_keys).collect()),
        other => other,
    }
}
