use kustom_core::merge::is_delete_directive;
use kustom_core::{CoreError, PatchOptions, ResourceMap, Selector, strategic_merge};
use serde_json::Value as JsonValue;

use super::{DirectiveRef, Transformer, select_targets};
use crate::error::{EngineError, Result};

/// Applies one strategic-merge patch document
///
/// Without an explicit target the patch selects by its own apiVersion, kind,
/// name and namespace. The patch never renames or re-kinds its targets unless
/// the corresponding option allows it. A top-level `$patch: delete` removes
/// every target.
#[derive(Debug, Clone)]
pub struct StrategicMergeTransformer {
    at: DirectiveRef,
    patch: JsonValue,
    target: Selector,
    options: PatchOptions,
    allow_empty: bool,
}

impl StrategicMergeTransformer {
    pub fn new(
        at: DirectiveRef,
        patch: JsonValue,
        target: Option<Selector>,
        options: PatchOptions,
        allow_empty: bool,
    ) -> Result<Self> {
        if !patch.is_object() {
            return Err(EngineError::InvalidPatch {
                directive: at.directive,
                index: at.index,
                message: "a strategic merge patch must be a map".to_string(),
            });
        }
        let target = match target {
            Some(target) => target,
            None => self_selector(&patch, at)?,
        };
        Ok(Self {
            at,
            patch,
            target,
            options,
            allow_empty,
        })
    }

    /// Copy of the patch with identity fields pinned to the target's
    fn pinned_patch(&self, api_version: &str, kind: &str, name: &str, namespace: &str) -> JsonValue {
        let mut patch = self.patch.clone();
        let Some(map) = patch.as_object_mut() else {
            return patch;
        };
        if !self.options.allow_kind_change || !map.contains_key("kind") {
            map.insert("apiVersion".into(), JsonValue::String(api_version.to_string()));
            map.insert("kind".into(), JsonValue::String(kind.to_string()));
        }
        let metadata = map
            .entry("metadata")
            .or_insert_with(|| JsonValue::Object(Default::default()));
        if let Some(metadata) = metadata.as_object_mut() {
            let rename = self.options.allow_name_change
                && metadata.get("name").and_then(JsonValue::as_str).is_some();
            if !rename {
                metadata.insert("name".into(), JsonValue::String(name.to_string()));
            }
            if namespace.is_empty() {
                metadata.remove("namespace");
            } else {
                metadata.insert("namespace".into(), JsonValue::String(namespace.to_string()));
            }
        }
        patch
    }
}

impl Transformer for StrategicMergeTransformer {
    fn transform(&self, resources: &mut ResourceMap) -> Result<()> {
        let targets = select_targets(resources, &self.target, self.at, self.allow_empty)?;

        if is_delete_directive(&self.patch) {
            for id in targets {
                tracing::debug!(%id, "deleting resource by patch");
                resources.remove(&id)?;
            }
            return Ok(());
        }

        for id in targets {
            resources.update(&id, |res| {
                let name = res.name().to_string();
                let namespace = res.namespace().to_string();
                let api_version = res.document().api_version().to_string();
                let kind = res.kind().to_string();
                let patch = self.pinned_patch(&api_version, &kind, &name, &namespace);

                strategic_merge(res.document_mut().inner_mut(), &patch)?;

                let patched_name = res.name().to_string();
                if patched_name.is_empty() {
                    return Err(CoreError::InvalidPatch {
                        message: format!("patch removed metadata.name of {}", id),
                    });
                }
                if patched_name != name {
                    res.document_mut().set_name(&name)?;
                    res.set_name(&patched_name)?;
                }
                Ok(())
            })?;
        }
        Ok(())
    }
}

/// Selector for the resource a target-less patch names itself
fn self_selector(patch: &JsonValue, at: DirectiveRef) -> Result<Selector> {
    let field = |keys: &[&str]| -> Option<String> {
        let mut current = patch;
        for key in keys {
            current = current.get(*key)?;
        }
        current.as_str().filter(|s| !s.is_empty()).map(regex::escape)
    };
    let (Some(kind), Some(name)) = (field(&["kind"]), field(&["metadata", "name"])) else {
        return Err(EngineError::InvalidPatch {
            directive: at.directive,
            index: at.index,
            message: "a patch without a target must carry kind and metadata.name".to_string(),
        });
    };
    let (group, version) = match patch.get("apiVersion").and_then(JsonValue::as_str) {
        Some(api_version) => match api_version.split_once('/') {
            Some((group, version)) => (Some(regex::escape(group)), Some(regex::escape(version))),
            None => (None, Some(regex::escape(api_version))),
        },
        None => (None, None),
    };
    Ok(Selector {
        group,
        version,
        kind: Some(kind),
        name: Some(name),
        namespace: field(&["metadata", "namespace"]),
        ..Default::default()
    })
}
