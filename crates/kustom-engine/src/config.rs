//! Default transformer configuration
//!
//! Field specs follow the built-in Kubernetes kinds. Transformers take a
//! [`TransformerConfig`], so callers can replace any table.

use kustom_core::FieldSpec;
use once_cell::sync::Lazy;

/// Kinds whose pod template carries labels and annotations
const POD_TEMPLATE_KINDS: &[&str] = &["Deployment", "ReplicaSet", "DaemonSet", "StatefulSet", "Job", "ReplicationController"];

/// Kinds that never carry a namespace
pub const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "Namespace",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "PersistentVolume",
    "StorageClass",
    "Node",
    "APIService",
    "MutatingWebhookConfiguration",
    "ValidatingWebhookConfiguration",
    "PriorityClass",
];

/// A field of `referrer` kinds that holds the name of a `target` kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameReference {
    pub target: String,
    pub referrers: Vec<FieldSpec>,
}

#[derive(Debug, Clone)]
pub struct TransformerConfig {
    pub common_labels: Vec<FieldSpec>,
    pub common_annotations: Vec<FieldSpec>,
    /// Kinds exempt from name prefix and suffix
    pub prefix_exempt_kinds: Vec<String>,
    pub cluster_scoped_kinds: Vec<String>,
    pub name_references: Vec<NameReference>,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        DEFAULT_CONFIG.clone()
    }
}

pub static DEFAULT_CONFIG: Lazy<TransformerConfig> = Lazy::new(|| TransformerConfig {
    common_labels: label_specs(),
    common_annotations: annotation_specs(),
    prefix_exempt_kinds: vec!["CustomResourceDefinition".to_string()],
    cluster_scoped_kinds: CLUSTER_SCOPED_KINDS.iter().map(|k| k.to_string()).collect(),
    name_references: name_reference_specs(),
});

fn label_specs() -> Vec<FieldSpec> {
    let mut specs = vec![FieldSpec::any("metadata/labels", true)];
    for kind in ["Deployment", "ReplicaSet", "DaemonSet", "StatefulSet"] {
        specs.push(FieldSpec::for_kind(kind, "spec/selector/matchLabels", true));
        specs.push(FieldSpec::for_kind(kind, "spec/template/metadata/labels", true));
    }
    specs.extend([
        FieldSpec::for_kind("ReplicationController", "spec/selector", true),
        FieldSpec::for_kind("ReplicationController", "spec/template/metadata/labels", true),
        FieldSpec::for_kind("Service", "spec/selector", true),
        FieldSpec::for_kind("Job", "spec/template/metadata/labels", true),
        FieldSpec::for_kind("CronJob", "spec/jobTemplate/spec/template/metadata/labels", true),
        FieldSpec::for_kind("StatefulSet", "spec/volumeClaimTemplates/metadata/labels", false),
        FieldSpec::for_kind("NetworkPolicy", "spec/podSelector/matchLabels", false),
        FieldSpec::for_kind("PodDisruptionBudget", "spec/selector/matchLabels", false),
    ]);
    specs
}

fn annotation_specs() -> Vec<FieldSpec> {
    let mut specs = vec![FieldSpec::any("metadata/annotations", true)];
    for kind in POD_TEMPLATE_KINDS {
        specs.push(FieldSpec::for_kind(kind, "spec/template/metadata/annotations", true));
    }
    specs.push(FieldSpec::for_kind(
        "CronJob",
        "spec/jobTemplate/spec/template/metadata/annotations",
        true,
    ));
    specs
}

/// Pod spec paths of every workload kind, joined with `suffix`
fn pod_spec_paths(suffix: &str) -> Vec<FieldSpec> {
    let mut specs = vec![FieldSpec::for_kind("Pod", &format!("spec/{}", suffix), false)];
    for kind in POD_TEMPLATE_KINDS {
        specs.push(FieldSpec::for_kind(kind, &format!("spec/template/spec/{}", suffix), false));
    }
    specs.push(FieldSpec::for_kind(
        "CronJob",
        &format!("spec/jobTemplate/spec/template/spec/{}", suffix),
        false,
    ));
    specs
}

fn name_reference_specs() -> Vec<NameReference> {
    let container_paths = |suffix: &str| -> Vec<FieldSpec> {
        ["containers", "initContainers"]
            .iter()
            .flat_map(|c| pod_spec_paths(&format!("{}/{}", c, suffix)))
            .collect()
    };

    let mut config_map = pod_spec_paths("volumes/configMap/name");
    config_map.extend(pod_spec_paths("volumes/projected/sources/configMap/name"));
    config_map.extend(container_paths("env/valueFrom/configMapKeyRef/name"));
    config_map.extend(container_paths("envFrom/configMapRef/name"));

    let mut secret = pod_spec_paths("volumes/secret/secretName");
    secret.extend(pod_spec_paths("volumes/projected/sources/secret/name"));
    secret.extend(pod_spec_paths("imagePullSecrets/name"));
    secret.extend(container_paths("env/valueFrom/secretKeyRef/name"));
    secret.extend(container_paths("envFrom/secretRef/name"));
    secret.extend([
        FieldSpec::for_kind("ServiceAccount", "imagePullSecrets/name", false),
        FieldSpec::for_kind("ServiceAccount", "secrets/name", false),
        FieldSpec::for_kind("Ingress", "spec/tls/secretName", false),
    ]);

    let service = vec![
        FieldSpec::for_kind("Ingress", "spec/rules/http/paths/backend/service/name", false),
        FieldSpec::for_kind("Ingress", "spec/rules/http/paths/backend/serviceName", false),
        FieldSpec::for_kind("Ingress", "spec/defaultBackend/service/name", false),
        FieldSpec::for_kind("Ingress", "spec/backend/serviceName", false),
        FieldSpec::for_kind("StatefulSet", "spec/serviceName", false),
    ];

    let mut service_account = pod_spec_paths("serviceAccountName");
    service_account.extend([
        FieldSpec::for_kind("RoleBinding", "subjects/name", false),
        FieldSpec::for_kind("ClusterRoleBinding", "subjects/name", false),
    ]);

    let role = vec![FieldSpec::for_kind("RoleBinding", "roleRef/name", false)];
    let cluster_role = vec![
        FieldSpec::for_kind("RoleBinding", "roleRef/name", false),
        FieldSpec::for_kind("ClusterRoleBinding", "roleRef/name", false),
    ];

    let pvc = pod_spec_paths("volumes/persistentVolumeClaim/claimName");

    vec![
        NameReference { target: "ConfigMap".into(), referrers: config_map },
        NameReference { target: "Secret".into(), referrers: secret },
        NameReference { target: "Service".into(), referrers: service },
        NameReference { target: "ServiceAccount".into(), referrers: service_account },
        NameReference { target: "Role".into(), referrers: role },
        NameReference { target: "ClusterRole".into(), referrers: cluster_role },
        NameReference { target: "PersistentVolumeClaim".into(), referrers: pvc },
    ]
}
