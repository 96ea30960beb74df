use std::collections::BTreeMap;

use base64::Engine as _;
use kustom_core::{ConfigMapArgs, GeneratorOptions, Loader, Resource};
use serde_json::Value as JsonValue;

use super::sources::{self, SourceValue};
use super::{finish, skeleton};
use crate::error::Result;

/// Build one ConfigMap
///
/// Text values go to `data`; values that are not valid UTF-8 go to
/// `binaryData`, base64 encoded.
pub fn generate_config_map(
    args: &ConfigMapArgs,
    layer_options: &GeneratorOptions,
    loader: &dyn Loader,
) -> Result<Resource> {
    let args = &args.args;
    let options = layer_options.merged_with(args.options.as_ref());
    let kv = sources::collect(args, &BTreeMap::new(), loader)?;

    let mut data = serde_json::Map::new();
    let mut binary = serde_json::Map::new();
    for (key, value) in kv.iter() {
        match value {
            SourceValue::Text(text) => {
                data.insert(key.clone(), JsonValue::String(text.clone()));
            }
            SourceValue::Binary(bytes) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                binary.insert(key.clone(), JsonValue::String(encoded));
            }
        }
    }

    let mut doc = skeleton("ConfigMap", args, &options);
    if let Some(map) = doc.as_object_mut() {
        if !data.is_empty() {
            map.insert("data".into(), JsonValue::Object(data));
        }
        if !binary.is_empty() {
            map.insert("binaryData".into(), JsonValue::Object(binary));
        }
    }
    finish(doc, args, &options)
}
