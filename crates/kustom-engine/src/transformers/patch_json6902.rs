use json_patch::{PatchErrorKind, PatchOperation};
use kustom_core::{ResId, ResourceMap, Selector};
use serde_json::Value as JsonValue;

use super::{DirectiveRef, Transformer, select_targets};
use crate::error::{EngineError, Result};

/// Applies RFC 6902 operations to every selected resource
///
/// Operations run in order against a working copy; the resource is only
/// updated when all of them succeed. On `remove` and `replace` a trailing
/// `-` addresses the last element of a sequence.
#[derive(Debug, Clone)]
pub struct JsonPatchTransformer {
    at: DirectiveRef,
    target: Selector,
    operations: Vec<JsonValue>,
    allow_empty: bool,
}

impl JsonPatchTransformer {
    /// Build from a YAML or JSON operation list
    pub fn parse(at: DirectiveRef, target: Selector, payload: &str, allow_empty: bool) -> Result<Self> {
        let parsed: JsonValue = serde_yaml::from_str(payload).map_err(|e| EngineError::InvalidPatch {
            directive: at.directive,
            index: at.index,
            message: e.to_string(),
        })?;
        Self::new(at, target, parsed, allow_empty)
    }

    pub fn new(at: DirectiveRef, target: Selector, operations: JsonValue, allow_empty: bool) -> Result<Self> {
        let operations = match operations {
            JsonValue::Array(ops) => ops,
            JsonValue::Null => Vec::new(),
            _ => {
                return Err(EngineError::InvalidPatch {
                    directive: at.directive,
                    index: at.index,
                    message: "JSON patch must be a list of operations".to_string(),
                });
            }
        };
        for op in &operations {
            serde_json::from_value::<PatchOperation>(op.clone()).map_err(|e| EngineError::InvalidPatch {
                directive: at.directive,
                index: at.index,
                message: e.to_string(),
            })?;
        }
        Ok(Self {
            at,
            target,
            operations,
            allow_empty,
        })
    }

    fn apply(&self, id: &ResId, doc: &JsonValue) -> Result<JsonValue> {
        let mut working = doc.clone();
        for raw in &self.operations {
            let resolved = resolve_last_index(raw, &working);
            let path = resolved
                .get("path")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string();
            let op: PatchOperation = serde_json::from_value(resolved).map_err(|e| EngineError::InvalidPatch {
                directive: self.at.directive,
                index: self.at.index,
                message: e.to_string(),
            })?;
            json_patch::patch(&mut working, std::slice::from_ref(&op)).map_err(|err| match err.kind {
                PatchErrorKind::TestFailed => EngineError::PatchTestFailed {
                    directive: self.at.directive,
                    index: self.at.index,
                    id: id.clone(),
                    message: format!("value at '{}' differs", path),
                },
                PatchErrorKind::InvalidPointer => EngineError::PathNotFound {
                    directive: self.at.directive,
                    index: self.at.index,
                    id: id.clone(),
                    path: path.clone(),
                },
                _ => EngineError::InvalidPatch {
                    directive: self.at.directive,
                    index: self.at.index,
                    message: err.to_string(),
                },
            })?;
        }
        Ok(working)
    }
}

impl Transformer for JsonPatchTransformer {
    fn transform(&self, resources: &mut ResourceMap) -> Result<()> {
        let targets = select_targets(resources, &self.target, self.at, self.allow_empty)?;
        for id in targets {
            resources.update(&id, |res| {
                let patched = self.apply(&id, res.document().inner())?;
                let name = res.name().to_string();
                *res.document_mut().inner_mut() = patched;
                let patched_name = res.name().to_string();
                if patched_name != name {
                    res.document_mut().set_name(&name)?;
                    res.set_name(&patched_name)?;
                }
                Ok::<(), EngineError>(())
            })?;
        }
        Ok(())
    }
}

/// Rewrite a final `-` token on `remove` and `replace` to the last index
fn resolve_last_index(op: &JsonValue, doc: &JsonValue) -> JsonValue {
    let mut op = op.clone();
    let kind = op.get("op").and_then(JsonValue::as_str).unwrap_or_default();
    if kind != "remove" && kind != "replace" {
        return op;
    }
    let Some(path) = op.get("path").and_then(JsonValue::as_str) else {
        return op;
    };
    let Some(parent) = path.strip_suffix("/-") else {
        return op;
    };
    let len = match doc.pointer(parent) {
        Some(JsonValue::Array(items)) if !items.is_empty() => items.len(),
        _ => return op,
    };
    let resolved = format!("{}/{}", parent, len - 1);
    if let Some(map) = op.as_object_mut() {
        map.insert("path".into(), JsonValue::String(resolved));
    }
    op
}
