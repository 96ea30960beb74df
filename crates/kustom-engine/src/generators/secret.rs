use base64::Engine as _;
use kustom_core::{GeneratorOptions, Loader, Resource, SecretArgs};
use serde_json::Value as JsonValue;

use super::sources;
use super::{finish, skeleton};
use crate::error::Result;

const DEFAULT_SECRET_TYPE: &str = "Opaque";

/// Build one Secret; every value is base64 encoded into `data`
pub fn generate_secret(
    secret: &SecretArgs,
    layer_options: &GeneratorOptions,
    loader: &dyn Loader,
) -> Result<Resource> {
    let args = &secret.args;
    let options = layer_options.merged_with(args.options.as_ref());
    let kv = sources::collect(args, &secret.commands, loader)?;

    let data: serde_json::Map<String, JsonValue> = kv
        .iter()
        .map(|(key, value)| {
            let encoded = base64::engine::general_purpose::STANDARD.encode(value.as_bytes());
            (key.clone(), JsonValue::String(encoded))
        })
        .collect();

    let secret_type = secret
        .secret_type
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_SECRET_TYPE);

    let mut doc = skeleton("Secret", args, &options);
    if let Some(map) = doc.as_object_mut() {
        map.insert("type".into(), JsonValue::String(secret_type.to_string()));
        if !data.is_empty() {
            map.insert("data".into(), JsonValue::Object(data));
        }
    }
    finish(doc, args, &options)
}
