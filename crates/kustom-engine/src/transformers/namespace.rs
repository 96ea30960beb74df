use kustom_core::ResourceMap;
use serde_json::Value as JsonValue;

use super::Transformer;
use crate::config::TransformerConfig;
use crate::error::Result;

const BINDING_KINDS: &[&str] = &["RoleBinding", "ClusterRoleBinding"];

/// Forces one namespace onto every namespaced resource
///
/// Cluster-scoped kinds are left alone. ServiceAccount subjects of role
/// bindings follow the binding when they lived in the binding's previous
/// namespace or had none.
#[derive(Debug, Clone)]
pub struct NamespaceTransformer {
    namespace: String,
    cluster_scoped: Vec<String>,
}

impl NamespaceTransformer {
    pub fn new(namespace: &str, config: &TransformerConfig) -> Self {
        Self {
            namespace: namespace.to_string(),
            cluster_scoped: config.cluster_scoped_kinds.clone(),
        }
    }

    fn is_cluster_scoped(&self, kind: &str) -> bool {
        self.cluster_scoped.iter().any(|k| k == kind)
    }
}

impl Transformer for NamespaceTransformer {
    fn transform(&self, resources: &mut ResourceMap) -> Result<()> {
        if self.namespace.is_empty() {
            return Ok(());
        }
        for id in resources.ids() {
            resources.update(&id, |res| {
                let previous = res.namespace().to_string();
                if BINDING_KINDS.contains(&res.kind()) {
                    update_subjects(res.document_mut().inner_mut(), &previous, &self.namespace);
                }
                if self.is_cluster_scoped(res.kind()) {
                    return Ok(());
                }
                res.set_namespace(&self.namespace)
            })?;
        }
        Ok(())
    }
}

fn update_subjects(doc: &mut JsonValue, previous: &str, namespace: &str) {
    let Some(subjects) = doc.get_mut("subjects").and_then(JsonValue::as_array_mut) else {
        return;
    };
    for subject in subjects {
        if subject.get("kind").and_then(JsonValue::as_str) != Some("ServiceAccount") {
            continue;
        }
        let current = subject
            .get("namespace")
            .and_then(JsonValue::as_str)
            .unwrap_or("");
        if current.is_empty() || current == previous {
            if let Some(map) = subject.as_object_mut() {
                map.insert("namespace".into(), JsonValue::String(namespace.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformers::test_support::{map_from_yaml, only};

    #[test]
    fn test_sets_namespace_except_cluster_scoped() {
        let mut map = map_from_yaml(
            r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: old
---
apiVersion: v1
kind: Namespace
metadata:
  name: ns1
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: reader
"#,
        );
        NamespaceTransformer::new("ns1", &TransformerConfig::default())
            .transform(&mut map)
            .unwrap();

        assert_eq!(only(&map, "Deployment")["metadata"]["namespace"], "ns1");
        assert!(only(&map, "Namespace")["metadata"].get("namespace").is_none());
        assert!(only(&map, "ClusterRole")["metadata"].get("namespace").is_none());

        let deployment = map.resources().find(|r| r.kind() == "Deployment").unwrap();
        assert_eq!(deployment.id().namespace, "ns1");
        assert_eq!(deployment.origin_id().namespace, "old");
    }

    #[test]
    fn test_binding_subjects() {
        let mut map = map_from_yaml(
            r#"
apiVersion: rbac.authorization.k8s.io/v1
kind: RoleBinding
metadata:
  name: rb
  namespace: old
subjects:
- kind: ServiceAccount
  name: same
  namespace: old
- kind: ServiceAccount
  name: unset
- kind: ServiceAccount
  name: elsewhere
  namespace: other
- kind: User
  name: jane
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: crb
subjects:
- kind: ServiceAccount
  name: sa
"#,
        );
        NamespaceTransformer::new("prod", &TransformerConfig::default())
            .transform(&mut map)
            .unwrap();

        let subjects = &only(&map, "RoleBinding")["subjects"];
        assert_eq!(subjects[0]["namespace"], "prod");
        assert_eq!(subjects[1]["namespace"], "prod");
        assert_eq!(subjects[2]["namespace"], "other");
        assert!(subjects[3].get("namespace").is_none());

        let cluster = only(&map, "ClusterRoleBinding");
        assert_eq!(cluster["subjects"][0]["namespace"], "prod");
        assert!(cluster["metadata"].get("namespace").is_none());
    }
}
