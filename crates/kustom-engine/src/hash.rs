//! Content hashes for generated resource names
//!
//! The hash covers the kind, the unsuffixed name and the payload of a
//! ConfigMap or Secret, encoded as JSON with sorted keys, so equal content
//! always yields the same suffix whatever order the sources were declared in.

use std::collections::BTreeMap;

use kustom_core::Document;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

use crate::error::{EngineError, Result};

/// Length of the name suffix
const HASH_LENGTH: usize = 10;

/// Hash suffix for a ConfigMap or Secret document under `name`
pub fn content_hash(doc: &Document, name: &str) -> Result<String> {
    let payload = hash_payload(doc, name)?;
    let encoded = serde_json::to_string(&payload).map_err(|e| EngineError::generation(name, e.to_string()))?;
    Ok(encode(&encoded))
}

fn hash_payload(doc: &Document, name: &str) -> Result<BTreeMap<&'static str, JsonValue>> {
    let inner = doc.inner();
    let field = |key: &str| inner.get(key).cloned().unwrap_or_else(|| JsonValue::Object(Default::default()));

    let mut payload = BTreeMap::new();
    payload.insert("kind", JsonValue::String(doc.kind().to_string()));
    payload.insert("name", JsonValue::String(name.to_string()));
    payload.insert("data", sorted(field("data")));

    match doc.kind() {
        "ConfigMap" => {
            if let Some(binary) = inner.get("binaryData").filter(|b| b.as_object().is_some_and(|m| !m.is_empty())) {
                payload.insert("binaryData", sorted(binary.clone()));
            }
        }
        "Secret" => {
            let secret_type = inner.get("type").cloned().unwrap_or(JsonValue::String(String::new()));
            payload.insert("type", secret_type);
        }
        other => {
            return Err(EngineError::generation(
                name,
                format!("cannot hash a {}; only ConfigMap and Secret are supported", other),
            ));
        }
    }
    Ok(payload)
}

/// Rebuild maps with sorted keys
fn sorted(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let ordered: BTreeMap<String, JsonValue> = map.into_iter().map(|(k, v)| (k, sorted(v))).collect();
            JsonValue::Object(ordered.into_iter().collect())
        }
        other => other,
    }
}

/// First characters of the SHA-256 hex digest, with vowel-like and
/// digit-like characters swapped so the result never spells words
fn encode(input: &str) -> String {
    let digest = hex::encode(Sha256::digest(input.as_bytes()));
    digest
        .chars()
        .take(HASH_LENGTH)
        .map(|c| match c {
            '0' => 'g',
            '1' => 'h',
            '3' => 'k',
            'a' => 'm',
            'e' => 't',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_map(data: JsonValue) -> Document {
        Document::new(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "cm"},
            "data": data,
        }))
    }

    #[test]
    fn test_hash_shape() {
        let hash = content_hash(&config_map(json!({"a": "1"})), "cm").unwrap();
        assert_eq!(hash.len(), HASH_LENGTH);
        assert!(hash.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(!hash.contains(['0', '1', '3', 'a', 'e']));
    }

    #[test]
    fn test_hash_ignores_key_order() {
        let a = content_hash(&config_map(json!({"x": "1", "y": "2"})), "cm").unwrap();
        let b = content_hash(&config_map(json!({"y": "2", "x": "1"})), "cm").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_changes_with_content_and_name() {
        let base = content_hash(&config_map(json!({"x": "1"})), "cm").unwrap();
        assert_ne!(base, content_hash(&config_map(json!({"x": "2"})), "cm").unwrap());
        assert_ne!(base, content_hash(&config_map(json!({"x": "1"})), "other").unwrap());
    }

    #[test]
    fn test_secret_type_is_hashed() {
        let secret = |t: &str| {
            Document::new(json!({
                "apiVersion": "v1",
                "kind": "Secret",
                "metadata": {"name": "s"},
                "type": t,
                "data": {"k": "dg=="},
            }))
        };
        assert_ne!(
            content_hash(&secret("Opaque"), "s").unwrap(),
            content_hash(&secret("kubernetes.io/tls"), "s").unwrap()
        );
    }

    #[test]
    fn test_other_kinds_rejected() {
        let doc = Document::new(json!({"apiVersion": "v1", "kind": "Service", "metadata": {"name": "s"}}));
        assert!(content_hash(&doc, "s").is_err());
    }
}
