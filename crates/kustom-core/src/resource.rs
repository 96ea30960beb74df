//! Resources: one document plus its merge behavior

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::document::Document;
use crate::error::{CoreError, Result};
use crate::merge::strategic_merge;
use crate::resid::ResId;

/// How a resource reconciles with an existing resource of the same id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    #[default]
    Unspecified,
    Create,
    Merge,
    Replace,
}

impl Behavior {
    /// Whether a resource with this behavior may land on an occupied id
    pub fn allows_existing(&self) -> bool {
        matches!(self, Behavior::Merge | Behavior::Replace)
    }
}

impl FromStr for Behavior {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "unspecified" => Ok(Behavior::Unspecified),
            "create" => Ok(Behavior::Create),
            "merge" => Ok(Behavior::Merge),
            "replace" => Ok(Behavior::Replace),
            other => Err(CoreError::InvalidResource {
                message: format!("unknown behavior '{}'", other),
            }),
        }
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Behavior::Unspecified => "unspecified",
            Behavior::Create => "create",
            Behavior::Merge => "merge",
            Behavior::Replace => "replace",
        };
        write!(f, "{}", s)
    }
}

/// A resource in a build
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    doc: Document,
    behavior: Behavior,
    /// Identity when first loaded or generated
    origin: ResId,
    /// Every name this resource carried before its current one, oldest first
    previous_names: Vec<String>,
    /// Content-hash suffix currently appended to the name
    name_hash: Option<String>,
}

impl Resource {
    /// Wrap a document with unspecified behavior
    pub fn new(doc: Document) -> Result<Self> {
        Self::with_behavior(doc, Behavior::Unspecified)
    }

    pub fn with_behavior(doc: Document, behavior: Behavior) -> Result<Self> {
        if !doc.inner().is_object() {
            return Err(CoreError::InvalidResource {
                message: "resource document must be a map".to_string(),
            });
        }
        if doc.kind().is_empty() {
            return Err(CoreError::InvalidResource {
                message: "missing 'kind'".to_string(),
            });
        }
        if doc.name().is_empty() {
            return Err(CoreError::InvalidResource {
                message: format!("{} is missing 'metadata.name'", doc.kind()),
            });
        }
        let origin = doc.id();
        Ok(Self {
            doc,
            behavior,
            origin,
            previous_names: Vec::new(),
            name_hash: None,
        })
    }

    /// Decode a multi-document YAML stream into resources
    ///
    /// Empty documents are skipped and `kind: List` documents are expanded into
    /// their `items`.
    pub fn from_yaml_stream(bytes: &[u8]) -> Result<Vec<Resource>> {
        let mut resources = Vec::new();
        for document in serde_yaml::Deserializer::from_slice(bytes) {
            let value = JsonValue::deserialize(document)?;
            collect_resources(value, &mut resources)?;
        }
        Ok(resources)
    }

    /// Current identity, derived from the document
    pub fn id(&self) -> ResId {
        self.doc.id()
    }

    /// Identity before any renaming
    pub fn origin_id(&self) -> &ResId {
        &self.origin
    }

    pub fn name(&self) -> &str {
        self.doc.name()
    }

    pub fn namespace(&self) -> &str {
        self.doc.namespace()
    }

    pub fn kind(&self) -> &str {
        self.doc.kind()
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn behavior(&self) -> Behavior {
        self.behavior
    }

    /// Names held before the current one, oldest first
    pub fn previous_names(&self) -> &[String] {
        &self.previous_names
    }

    /// Whether `name` is the current name or any earlier one
    pub fn has_held_name(&self, name: &str) -> bool {
        self.name() == name || self.previous_names.iter().any(|n| n == name)
    }

    pub fn name_hash(&self) -> Option<&str> {
        self.name_hash.as_deref()
    }

    /// Rename, recording the old name in the history
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        let current = self.doc.name().to_string();
        if current == name {
            return Ok(());
        }
        self.doc.set_name(name)?;
        if !self.previous_names.contains(&current) {
            self.previous_names.push(current);
        }
        Ok(())
    }

    pub fn set_namespace(&mut self, namespace: &str) -> Result<()> {
        self.doc.set_namespace(namespace)
    }

    /// Append (or swap) the content-hash suffix of the name
    pub fn set_name_hash(&mut self, hash: &str) -> Result<()> {
        let base = match &self.name_hash {
            Some(old) => self
                .name()
                .strip_suffix(old.as_str())
                .and_then(|s| s.strip_suffix('-'))
                .unwrap_or(self.name())
                .to_string(),
            None => self.name().to_string(),
        };
        self.set_name(&format!("{}-{}", base, hash))?;
        self.name_hash = Some(hash.to_string());
        Ok(())
    }

    /// Fully independent copy
    pub fn deep_copy(&self) -> Resource {
        self.clone()
    }

    /// Reconcile `other`, which carries the same id, into this resource
    ///
    /// `other`'s behavior decides: merge deep-merges its document over ours,
    /// replace swaps the document. The current name and namespace are kept
    /// either way.
    pub fn merge(&mut self, other: Resource) -> Result<()> {
        let id = self.id();
        if self.doc.kind() != other.doc.kind() || self.doc.api_version() != other.doc.api_version()
        {
            return Err(CoreError::MergeConflict {
                id,
                message: format!(
                    "cannot reconcile {} with {}",
                    self.doc.gvk(),
                    other.doc.gvk()
                ),
            });
        }

        let name = self.name().to_string();
        let namespace = self.namespace().to_string();
        match other.behavior {
            Behavior::Merge => {
                let mut patch = other.doc.into_inner();
                strip_identity(&mut patch);
                strategic_merge(self.doc.inner_mut(), &patch)?;
            }
            Behavior::Replace => {
                self.doc = other.doc;
            }
            Behavior::Create | Behavior::Unspecified => {
                return Err(CoreError::MergeConflict {
                    id,
                    message: format!(
                        "both resources would create the same object (behaviors {} and {})",
                        self.behavior, other.behavior
                    ),
                });
            }
        }
        self.doc.set_name(&name)?;
        self.doc.set_namespace(&namespace)?;
        Ok(())
    }
}

fn strip_identity(value: &mut JsonValue) {
    if let Some(metadata) = value.get_mut("metadata").and_then(JsonValue::as_object_mut) {
        metadata.remove("name");
        metadata.remove("namespace");
    }
}

fn collect_resources(value: JsonValue, out: &mut Vec<Resource>) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }
    let is_list = value
        .get("kind")
        .and_then(JsonValue::as_str)
        .is_some_and(|k| k == "List" || k.ends_with("List") && value.get("items").is_some());
    if is_list {
        if let Some(JsonValue::Array(items)) = value.get("items") {
            for item in items {
                collect_resources(item.clone(), out)?;
            }
        }
        return Ok(());
    }
    out.push(Resource::new(Document::new(value))?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_map(name: &str, data: JsonValue, behavior: Behavior) -> Resource {
        Resource::with_behavior(
            Document::new(json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": name},
                "data": data,
            })),
            behavior,
        )
        .unwrap()
    }

    #[test]
    fn test_new_requires_kind_and_name() {
        let err = Resource::new(Document::new(json!({"apiVersion": "v1"}))).unwrap_err();
        assert!(err.to_string().contains("kind"));

        let err = Resource::new(Document::new(json!({"kind": "ConfigMap"}))).unwrap_err();
        assert!(err.to_string().contains("metadata.name"));
    }

    #[test]
    fn test_from_yaml_stream_splits_and_expands_lists() {
        let yaml = br#"
apiVersion: v1
kind: Service
metadata:
  name: web
---
---
apiVersion: v1
kind: List
items:
- apiVersion: v1
  kind: ConfigMap
  metadata:
    name: a
- apiVersion: v1
  kind: ConfigMap
  metadata:
    name: b
"#;
        let resources = Resource::from_yaml_stream(yaml).unwrap();
        let names: Vec<&str> = resources.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["web", "a", "b"]);
    }

    #[test]
    fn test_set_name_records_history() {
        let mut res = config_map("cm", json!({}), Behavior::Unspecified);
        res.set_name("p-cm").unwrap();
        res.set_name("p-cm-s").unwrap();
        assert_eq!(res.previous_names(), ["cm", "p-cm"]);
        assert!(res.has_held_name("cm"));
        assert_eq!(res.origin_id().name, "cm");
        assert_eq!(res.id().name, "p-cm-s");
    }

    #[test]
    fn test_set_name_hash_swaps_suffix() {
        let mut res = config_map("cm", json!({}), Behavior::Unspecified);
        res.set_name_hash("aaaa").unwrap();
        assert_eq!(res.name(), "cm-aaaa");
        res.set_name("foo-cm-aaaa").unwrap();
        res.set_name_hash("bbbb").unwrap();
        assert_eq!(res.name(), "foo-cm-bbbb");
    }

    #[test]
    fn test_merge_behavior_merges_data() {
        let mut base = config_map("cm", json!({"a": "1", "b": "2"}), Behavior::Create);
        let overlay = config_map("cm", json!({"b": "3", "c": "4"}), Behavior::Merge);
        base.merge(overlay).unwrap();
        assert_eq!(
            base.document().inner()["data"],
            json!({"a": "1", "b": "3", "c": "4"})
        );
    }

    #[test]
    fn test_replace_behavior_keeps_identity() {
        let mut base = config_map("cm", json!({"a": "1"}), Behavior::Create);
        base.set_name("pre-cm").unwrap();
        let overlay = config_map("cm", json!({"z": "9"}), Behavior::Replace);
        base.merge(overlay).unwrap();
        assert_eq!(base.name(), "pre-cm");
        assert_eq!(base.document().inner()["data"], json!({"z": "9"}));
    }

    #[test]
    fn test_create_create_conflicts() {
        let mut base = config_map("cm", json!({}), Behavior::Create);
        let other = config_map("cm", json!({}), Behavior::Create);
        let err = base.merge(other).unwrap_err();
        assert!(err.is_structural_conflict());
    }

    #[test]
    fn test_merge_rejects_different_kind() {
        let mut base = config_map("cm", json!({}), Behavior::Create);
        let secret = Resource::with_behavior(
            Document::new(json!({"apiVersion": "v1", "kind": "Secret", "metadata": {"name": "cm"}})),
            Behavior::Merge,
        )
        .unwrap();
        assert!(matches!(
            base.merge(secret).unwrap_err(),
            CoreError::MergeConflict { .. }
        ));
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let original = config_map("cm", json!({"a": "1"}), Behavior::Unspecified);
        let mut copy = original.deep_copy();
        copy.document_mut().set("data.a", json!("changed")).unwrap();
        assert_eq!(original.document().inner()["data"]["a"], "1");
    }
}
