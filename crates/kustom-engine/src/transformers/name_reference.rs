use std::collections::BTreeSet;

use kustom_core::{ResourceMap, Result as CoreResult};
use serde_json::Value as JsonValue;

use super::Transformer;
use crate::config::{NameReference, TransformerConfig};
use crate::error::Result;

/// Rewrites references to resources renamed during the build
///
/// Runs last, once every rename is known. A referring field holding a name
/// that some resource of the target kind used to carry is switched to that
/// resource's current name. Candidates in the referrer's namespace win; when
/// several candidates remain the reference is left alone.
#[derive(Debug, Clone)]
pub struct NameReferenceTransformer {
    references: Vec<NameReference>,
}

/// A resource of the target kind whose name changed
#[derive(Debug)]
struct Renamed {
    previous: Vec<String>,
    current: String,
    namespace: String,
}

/// Everything known about one target kind
#[derive(Debug)]
struct Targets<'a> {
    kind: &'a str,
    renamed: Vec<Renamed>,
    current: BTreeSet<(String, String)>,
}

impl Targets<'_> {
    /// Current name `old` should become, if any
    fn resolve(&self, old: &str, namespace: &str) -> Option<String> {
        if self.current.contains(&(namespace.to_string(), old.to_string()))
            || self.current.contains(&(String::new(), old.to_string()))
        {
            return None;
        }
        let candidates: Vec<&Renamed> = self
            .renamed
            .iter()
            .filter(|r| r.previous.iter().any(|p| p == old))
            .collect();
        let local: Vec<&Renamed> = candidates
            .iter()
            .copied()
            .filter(|r| r.namespace == namespace || r.namespace.is_empty())
            .collect();
        let chosen = if local.is_empty() { candidates } else { local };
        match chosen.as_slice() {
            [] => None,
            [only] => Some(only.current.clone()),
            many => {
                tracing::warn!(
                    kind = self.kind,
                    name = old,
                    candidates = many.len(),
                    "ambiguous name reference left unchanged"
                );
                None
            }
        }
    }
}

impl NameReferenceTransformer {
    pub fn new(config: &TransformerConfig) -> Self {
        Self {
            references: config.name_references.clone(),
        }
    }

    fn targets<'a>(&'a self, reference: &'a NameReference, resources: &ResourceMap) -> Targets<'a> {
        let mut renamed = Vec::new();
        let mut current = BTreeSet::new();
        for res in resources.resources().filter(|r| r.kind() == reference.target) {
            current.insert((res.namespace().to_string(), res.name().to_string()));
            if !res.previous_names().is_empty() {
                renamed.push(Renamed {
                    previous: res.previous_names().to_vec(),
                    current: res.name().to_string(),
                    namespace: res.namespace().to_string(),
                });
            }
        }
        Targets {
            kind: &reference.target,
            renamed,
            current,
        }
    }
}

impl Transformer for NameReferenceTransformer {
    fn transform(&self, resources: &mut ResourceMap) -> Result<()> {
        for reference in &self.references {
            let targets = self.targets(reference, resources);
            if targets.renamed.is_empty() {
                continue;
            }
            for id in resources.ids() {
                let specs: Vec<_> = reference
                    .referrers
                    .iter()
                    .filter(|s| s.applies_to(&id.gvk))
                    .collect();
                if specs.is_empty() {
                    continue;
                }
                resources.update(&id, |res| {
                    let namespace = res.namespace().to_string();
                    for spec in &specs {
                        let (parent, leaf) = spec.path.rsplit_once('/').unwrap_or(("", spec.path.as_str()));
                        res.document_mut().visit_fields_mut(parent, false, &mut |holder: &mut JsonValue| {
                            rewrite_in(holder, leaf, &targets, &namespace)
                        })?;
                    }
                    Ok::<(), kustom_core::CoreError>(())
                })?;
            }
        }
        Ok(())
    }
}

/// Rewrite `holder[leaf]`
///
/// A holder naming a different `kind` (a role ref or subject) is skipped; its
/// own `namespace` overrides the referrer's.
fn rewrite_in(holder: &mut JsonValue, leaf: &str, targets: &Targets<'_>, namespace: &str) -> CoreResult<()> {
    let map = match holder {
        JsonValue::Object(map) => map,
        JsonValue::Array(items) => {
            for item in items {
                rewrite_in(item, leaf, targets, namespace)?;
            }
            return Ok(());
        }
        _ => return Ok(()),
    };
    if let Some(kind) = map.get("kind").and_then(JsonValue::as_str) {
        if kind != targets.kind {
            return Ok(());
        }
    }
    let namespace = map
        .get("namespace")
        .and_then(JsonValue::as_str)
        .filter(|ns| !ns.is_empty())
        .unwrap_or(namespace)
        .to_string();
    match map.get_mut(leaf) {
        Some(JsonValue::String(name)) => {
            if let Some(new) = targets.resolve(name, &namespace) {
                *name = new;
            }
        }
        Some(JsonValue::Array(items)) => {
            for item in items {
                if let JsonValue::String(name) = item {
                    if let Some(new) = targets.resolve(name, &namespace) {
                        *name = new;
                    }
                }
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformers::test_support::{map_from_yaml, only};

    fn rename(map: &mut ResourceMap, kind: &str, from: &str, to: &str) {
        let id = map
            .resources()
            .find(|r| r.kind() == kind && r.name() == from)
            .unwrap()
            .id();
        map.update(&id, |res| res.set_name(to)).unwrap();
    }

    fn transform(map: &mut ResourceMap) {
        NameReferenceTransformer::new(&TransformerConfig::default())
            .transform(map)
            .unwrap();
    }

    #[test]
    fn test_pod_template_references_follow_renames() {
        let mut map = map_from_yaml(
            r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
---
apiVersion: v1
kind: Secret
metadata:
  name: creds
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  template:
    spec:
      volumes:
      - name: config
        configMap:
          name: settings
      - name: other
        configMap:
          name: unrelated
      containers:
      - name: app
        envFrom:
        - secretRef:
            name: creds
        env:
        - name: KEY
          valueFrom:
            configMapKeyRef:
              name: settings
              key: key
"#,
        );
        rename(&mut map, "ConfigMap", "settings", "foo-settings-abc");
        rename(&mut map, "Secret", "creds", "foo-creds-def");
        transform(&mut map);

        let spec = &only(&map, "Deployment")["spec"]["template"]["spec"];
        assert_eq!(spec["volumes"][0]["configMap"]["name"], "foo-settings-abc");
        assert_eq!(spec["volumes"][1]["configMap"]["name"], "unrelated");
        assert_eq!(spec["containers"][0]["envFrom"][0]["secretRef"]["name"], "foo-creds-def");
        assert_eq!(
            spec["containers"][0]["env"][0]["valueFrom"]["configMapKeyRef"]["name"],
            "foo-settings-abc"
        );
    }

    #[test]
    fn test_role_ref_respects_kind() {
        let mut map = map_from_yaml(
            r#"
apiVersion: rbac.authorization.k8s.io/v1
kind: Role
metadata:
  name: reader
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: reader
---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: bot
---
apiVersion: rbac.authorization.k8s.io/v1
kind: RoleBinding
metadata:
  name: rb
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: reader
subjects:
- kind: ServiceAccount
  name: bot
- kind: User
  name: bot
"#,
        );
        rename(&mut map, "Role", "reader", "p-reader");
        rename(&mut map, "ClusterRole", "reader", "cluster-reader");
        rename(&mut map, "ServiceAccount", "bot", "p-bot");
        transform(&mut map);

        let binding = only(&map, "RoleBinding");
        assert_eq!(binding["roleRef"]["name"], "cluster-reader");
        assert_eq!(binding["subjects"][0]["name"], "p-bot");
        assert_eq!(binding["subjects"][1]["name"], "bot");
    }

    #[test]
    fn test_namespace_disambiguates() {
        let mut map = map_from_yaml(
            r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: cfg
  namespace: a
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: cfg
  namespace: b
---
apiVersion: v1
kind: Pod
metadata:
  name: p
  namespace: b
spec:
  volumes:
  - configMap:
      name: cfg
---
apiVersion: v1
kind: Pod
metadata:
  name: q
spec:
  volumes:
  - configMap:
      name: cfg
"#,
        );
        let ids: Vec<_> = map.resources().filter(|r| r.kind() == "ConfigMap").map(|r| r.id()).collect();
        map.update(&ids[0], |res| res.set_name("cfg-a")).unwrap();
        map.update(&ids[1], |res| res.set_name("cfg-b")).unwrap();
        transform(&mut map);

        let pod = |name: &str| {
            map.resources()
                .find(|r| r.name() == name)
                .unwrap()
                .document()
                .inner()["spec"]["volumes"][0]["configMap"]["name"]
                .clone()
        };
        assert_eq!(pod("p"), "cfg-b");
        assert_eq!(pod("q"), "cfg");
    }
}
