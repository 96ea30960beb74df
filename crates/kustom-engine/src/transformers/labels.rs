use std::collections::BTreeMap;

use kustom_core::{CoreError, FieldSpec, ResourceMap};
use serde_json::{Map, Value as JsonValue};

use super::Transformer;
use crate::error::Result;

/// Merges a string map into every field its specs address
///
/// Used for `commonLabels` and `commonAnnotations`; the specs decide which
/// selector and template fields follow along.
#[derive(Debug, Clone)]
pub struct MapFieldTransformer {
    entries: BTreeMap<String, String>,
    specs: Vec<FieldSpec>,
}

impl MapFieldTransformer {
    pub fn new(entries: BTreeMap<String, String>, specs: Vec<FieldSpec>) -> Self {
        Self { entries, specs }
    }
}

impl Transformer for MapFieldTransformer {
    fn transform(&self, resources: &mut ResourceMap) -> Result<()> {
        if self.entries.is_empty() {
            return Ok(());
        }
        for id in resources.ids() {
            resources.update(&id, |res| {
                let gvk = res.document().gvk();
                for spec in self.specs.iter().filter(|s| s.applies_to(&gvk)) {
                    res.document_mut()
                        .visit_fields_mut(&spec.path, spec.create, &mut |field: &mut JsonValue| {
                            merge_into(field, &self.entries, &spec.path)
                        })?;
                }
                Ok::<(), CoreError>(())
            })?;
        }
        Ok(())
    }
}

fn merge_into(field: &mut JsonValue, entries: &BTreeMap<String, String>, path: &str) -> kustom_core::Result<()> {
    if field.is_null() {
        *field = JsonValue::Object(Map::new());
    }
    let Some(map) = field.as_object_mut() else {
        return Err(CoreError::TypeMismatch {
            path: path.to_string(),
            expected: "map",
        });
    };
    for (key, value) in entries {
        map.insert(key.clone(), JsonValue::String(value.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CONFIG;
    use crate::transformers::test_support::{map_from_yaml, only};
    use serde_json::json;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_deployment_labels_everywhere() {
        let mut map = map_from_yaml(
            r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: dply1
"#,
        );
        MapFieldTransformer::new(labels(&[("app", "nginx")]), DEFAULT_CONFIG.common_labels.clone())
            .transform(&mut map)
            .unwrap();

        let doc = only(&map, "Deployment");
        assert_eq!(doc["metadata"]["labels"], json!({"app": "nginx"}));
        assert_eq!(doc["spec"]["selector"]["matchLabels"], json!({"app": "nginx"}));
        assert_eq!(doc["spec"]["template"]["metadata"]["labels"], json!({"app": "nginx"}));
    }

    #[test]
    fn test_existing_labels_kept_and_overridden() {
        let mut map = map_from_yaml(
            r#"
apiVersion: v1
kind: Service
metadata:
  name: web
  labels:
    tier: frontend
    app: old
spec:
  selector:
    tier: frontend
"#,
        );
        MapFieldTransformer::new(labels(&[("app", "nginx")]), DEFAULT_CONFIG.common_labels.clone())
            .transform(&mut map)
            .unwrap();

        let doc = only(&map, "Service");
        assert_eq!(doc["metadata"]["labels"], json!({"tier": "frontend", "app": "nginx"}));
        assert_eq!(doc["spec"]["selector"], json!({"tier": "frontend", "app": "nginx"}));
    }

    #[test]
    fn test_optional_fields_not_created() {
        let mut map = map_from_yaml(
            r#"
apiVersion: networking.k8s.io/v1
kind: NetworkPolicy
metadata:
  name: deny
spec: {}
"#,
        );
        MapFieldTransformer::new(labels(&[("app", "nginx")]), DEFAULT_CONFIG.common_labels.clone())
            .transform(&mut map)
            .unwrap();
        assert!(only(&map, "NetworkPolicy")["spec"].get("podSelector").is_none());
    }

    #[test]
    fn test_annotations_skip_selectors() {
        let mut map = map_from_yaml(
            r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: dply1
"#,
        );
        let note = labels(&[("note", "This is a test annotation")]);
        MapFieldTransformer::new(note, DEFAULT_CONFIG.common_annotations.clone())
            .transform(&mut map)
            .unwrap();

        let doc = only(&map, "Deployment");
        assert_eq!(doc["metadata"]["annotations"]["note"], "This is a test annotation");
        assert_eq!(doc["spec"]["template"]["metadata"]["annotations"]["note"], "This is a test annotation");
        assert!(doc["spec"].get("selector").is_none());
    }

    #[test]
    fn test_scalar_field_is_type_mismatch() {
        let mut map = map_from_yaml(
            r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: cm
  labels: oops
"#,
        );
        let err = MapFieldTransformer::new(labels(&[("a", "b")]), DEFAULT_CONFIG.common_labels.clone())
            .transform(&mut map)
            .unwrap_err();
        assert!(err.to_string().contains("metadata/labels"));
    }
}
