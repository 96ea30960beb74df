//! ConfigMap and Secret generators
//!
//! A generator turns literal, file, env-file and command sources into a new
//! resource. Unless `disableNameSuffixHash` is set, the generated name gets a
//! content-hash suffix so that changed data produces a new object name.

mod configmap;
mod secret;
pub mod sources;

pub use configmap::generate_config_map;
pub use secret::generate_secret;

use serde_json::{Map, Value as JsonValue, json};

use kustom_core::{GeneratorArgs, GeneratorOptions, Kustomization, Loader, Resource, ResourceMap};

use crate::error::Result;
use crate::hash::content_hash;

/// Run every generator of a layer, ConfigMaps first, in declared order
pub fn generate_all(kustomization: &Kustomization, loader: &dyn Loader) -> Result<ResourceMap> {
    let layer_options = kustomization.generator_options.clone().unwrap_or_default();
    let mut generated = ResourceMap::new();

    for args in &kustomization.config_map_generator {
        let res = generate_config_map(args, &layer_options, loader)?;
        tracing::debug!(id = %res.id(), behavior = %res.behavior(), "generated ConfigMap");
        generated.append(res)?;
    }
    for args in &kustomization.secret_generator {
        let res = generate_secret(args, &layer_options, loader)?;
        tracing::debug!(id = %res.id(), behavior = %res.behavior(), "generated Secret");
        generated.append(res)?;
    }
    Ok(generated)
}

/// Recompute the suffix of every hashed resource from its current content
///
/// Run after generated resources were merged onto existing ones.
pub fn refresh_name_hashes(resources: &mut ResourceMap) -> Result<()> {
    let hashed = resources.get_matching_ids(|res| res.name_hash().is_some());
    for id in hashed {
        let Some(res) = resources.get_by_id(&id) else {
            continue;
        };
        let hash = content_hash(res.document(), &res.origin_id().name)?;
        if res.name_hash() == Some(hash.as_str()) {
            continue;
        }
        tracing::debug!(%id, %hash, "content changed, refreshing name suffix");
        resources.update(&id, |res| res.set_name_hash(&hash))?;
    }
    Ok(())
}

/// Skeleton document for a generated resource
fn skeleton(kind: &str, args: &GeneratorArgs, options: &GeneratorOptions) -> JsonValue {
    let mut metadata = Map::new();
    metadata.insert("name".into(), JsonValue::String(args.name.clone()));
    if let Some(namespace) = args.namespace.as_deref().filter(|ns| !ns.is_empty()) {
        metadata.insert("namespace".into(), JsonValue::String(namespace.to_string()));
    }
    if !options.labels.is_empty() {
        metadata.insert("labels".into(), json!(options.labels));
    }
    if !options.annotations.is_empty() {
        metadata.insert("annotations".into(), json!(options.annotations));
    }
    json!({
        "apiVersion": "v1",
        "kind": kind,
        "metadata": metadata,
    })
}

/// Wrap the document and append the hash suffix when enabled
fn finish(doc: JsonValue, args: &GeneratorArgs, options: &GeneratorOptions) -> Result<Resource> {
    let mut res = Resource::with_behavior(doc.into(), args.behavior)?;
    if options.hash_suffix_enabled() {
        let hash = content_hash(res.document(), &args.name)?;
        res.set_name_hash(&hash)?;
    }
    Ok(res)
}
