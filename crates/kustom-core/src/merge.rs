//! Strategic merge of document trees
//!
//! Rules when merging `patch` into `base`:
//! - Scalars: patch replaces base
//! - Maps: recursive merge, a `null` value deletes the key
//! - Lists of maps with a known merge key: element-wise merge by key, unmatched
//!   patch elements are appended
//! - Other lists: patch replaces base
//!
//! Directives understood inside the patch:
//! - `$patch: replace` on a map replaces it wholesale
//! - `$patch: delete` on a map removes it, on a list element removes the match
//! - `$retainKeys` and `$setElementOrder/...` are accepted and ignored

use serde_json::{Map, Value as JsonValue};

use crate::error::{CoreError, Result};

const PATCH_DIRECTIVE: &str = "$patch";

/// Merge keys for lists of maps, by the name of the list field
///
/// When several keys are listed, the first one present in the patch elements wins
/// (`ports` is keyed by `containerPort` in containers and by `port` in services).
pub fn merge_keys_for(field: &str) -> &'static [&'static str] {
    match field {
        "containers" | "initContainers" | "ephemeralContainers" | "env" | "volumes"
        | "imagePullSecrets" | "resourceClaims" => &["name"],
        "volumeMounts" => &["mountPath"],
        "volumeDevices" => &["devicePath"],
        "ports" => &["containerPort", "port"],
        "hostAliases" => &["ip"],
        "topologySpreadConstraints" => &["topologyKey"],
        "conditions" => &["type"],
        _ => &[],
    }
}

/// Merge `patch` into `base` in place
pub fn strategic_merge(base: &mut JsonValue, patch: &JsonValue) -> Result<()> {
    merge_value(base, patch, "")
}

/// Whether a map carries `$patch: delete`
pub fn is_delete_directive(value: &JsonValue) -> bool {
    value.get(PATCH_DIRECTIVE).and_then(JsonValue::as_str) == Some("delete")
}

fn merge_value(base: &mut JsonValue, patch: &JsonValue, field: &str) -> Result<()> {
    let JsonValue::Object(patch_map) = patch else {
        *base = strip_directives(patch);
        return Ok(());
    };

    match patch_map.get(PATCH_DIRECTIVE).and_then(JsonValue::as_str) {
        Some("replace") => {
            *base = strip_directives(patch);
            return Ok(());
        }
        Some("delete") => {
            *base = JsonValue::Null;
            return Ok(());
        }
        Some("merge") | None => {}
        Some(other) => {
            return Err(CoreError::InvalidPatch {
                message: format!("unknown directive '$patch: {}' at '{}'", other, field),
            });
        }
    }

    if !base.is_object() {
        *base = JsonValue::Object(Map::new());
    }
    let Some(base_map) = base.as_object_mut() else {
        return Ok(());
    };

    for (key, patch_value) in patch_map {
        if key.starts_with('$') {
            continue;
        }
        match patch_value {
            JsonValue::Null => {
                base_map.remove(key);
            }
            JsonValue::Object(_) if is_delete_directive(patch_value) => {
                base_map.remove(key);
            }
            JsonValue::Array(items) => {
                let slot = base_map.entry(key.clone()).or_insert(JsonValue::Null);
                merge_list(slot, items, key)?;
            }
            _ => match base_map.get_mut(key) {
                Some(base_value) => merge_value(base_value, patch_value, key)?,
                None => {
                    base_map.insert(key.clone(), strip_directives(patch_value));
                }
            },
        }
    }
    Ok(())
}

fn merge_list(base: &mut JsonValue, patch_items: &[JsonValue], field: &str) -> Result<()> {
    let replace_requested = patch_items
        .iter()
        .any(|item| item.get(PATCH_DIRECTIVE).and_then(JsonValue::as_str) == Some("replace"));

    let key = merge_keys_for(field)
        .iter()
        .copied()
        .find(|k| patch_items.iter().any(|item| item.get(*k).is_some()));

    let all_maps = patch_items.iter().all(JsonValue::is_object);

    let (Some(key), true, false) = (key, all_maps, replace_requested) else {
        let items = patch_items
            .iter()
            .filter(|item| !is_delete_directive(item) && !is_list_directive(item))
            .map(strip_directives)
            .collect();
        *base = JsonValue::Array(items);
        return Ok(());
    };

    if !base.is_array() {
        *base = JsonValue::Array(Vec::new());
    }
    let Some(base_items) = base.as_array_mut() else {
        return Ok(());
    };

    for item in patch_items {
        let Some(wanted) = item.get(key) else {
            if !is_delete_directive(item) {
                base_items.push(strip_directives(item));
            }
            continue;
        };
        let position = base_items.iter().position(|b| b.get(key) == Some(wanted));

        if is_delete_directive(item) {
            if let Some(index) = position {
                base_items.remove(index);
            }
            continue;
        }

        match position {
            Some(index) => merge_value(&mut base_items[index], item, field)?,
            None => base_items.push(strip_directives(item)),
        }
    }
    Ok(())
}

/// A list element consisting only of a directive, e.g. `- $patch: replace`
fn is_list_directive(item: &JsonValue) -> bool {
    item.as_object()
        .is_some_and(|map| map.keys().all(|k| k.starts_with('$')))
}

/// Copy a patch subtree without directives or null markers
fn strip_directives(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .filter(|(k, v)| !k.starts_with('$') && !v.is_null())
                .map(|(k, v)| (k.clone(), strip_directives(v)))
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(strip_directives).collect()),
        other => other.clone(),
    }
}
