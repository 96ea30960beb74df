//! Layer builder
//!
//! One [`Builder`] drives one kustomization layer through a fixed sequence of
//! states. Bases are built to completion by child builders and merged before
//! anything local is added:
//!
//! ```text
//! Empty -> BasesLoaded -> RawResourcesAdded -> Generated -> Transformed -> Final
//! ```
//!
//! Each transition is one method. Calling a step twice or out of order fails
//! with [`EngineError::InvalidState`].

use std::fmt;

use kustom_core::{Kustomization, Loader, Resource, ResourceMap, Selector};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::config::TransformerConfig;
use crate::error::{EngineError, Result};
use crate::generators::{generate_all, refresh_name_hashes};
use crate::suggestions::{KUSTOMIZATION_FIELDS, suggest_kustomization_field};
use crate::transformers::{
    DirectiveRef, JsonPatchTransformer, MapFieldTransformer, NameReferenceTransformer,
    NamespaceTransformer, PrefixSuffixTransformer, ReplacementTransformer,
    StrategicMergeTransformer, Transformer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildState {
    Empty,
    BasesLoaded,
    RawResourcesAdded,
    Generated,
    Transformed,
    Final,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildState::Empty => "empty",
            BuildState::BasesLoaded => "bases-loaded",
            BuildState::RawResourcesAdded => "raw-resources-added",
            BuildState::Generated => "generated",
            BuildState::Transformed => "transformed",
            BuildState::Final => "final",
        };
        write!(f, "{}", s)
    }
}

/// Builds one kustomization layer
pub struct Builder {
    loader: Box<dyn Loader>,
    config: TransformerConfig,
    kustomization: Option<Kustomization>,
    state: BuildState,
    resources: ResourceMap,
    /// Roots of the layers that include this one, outermost first
    ancestry: Vec<String>,
}

impl Builder {
    /// Builder for the kustomization at the loader's root
    pub fn new(loader: impl Loader + 'static) -> Self {
        Self::from_boxed(Box::new(loader))
    }

    pub fn from_boxed(loader: Box<dyn Loader>) -> Self {
        Self {
            loader,
            config: TransformerConfig::default(),
            kustomization: None,
            state: BuildState::Empty,
            resources: ResourceMap::new(),
            ancestry: Vec::new(),
        }
    }

    /// Replace the default field specs and kind tables
    pub fn with_config(mut self, config: TransformerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an already parsed descriptor instead of reading one from the root
    pub fn with_kustomization(mut self, kustomization: Kustomization) -> Self {
        self.kustomization = Some(kustomization);
        self
    }

    fn with_ancestry(mut self, ancestry: Vec<String>) -> Self {
        self.ancestry = ancestry;
        self
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    /// The working set in its current state
    pub fn resources(&self) -> &ResourceMap {
        &self.resources
    }

    fn expect_state(&self, expected: BuildState) -> Result<()> {
        if self.state != expected {
            return Err(EngineError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    /// The layer's descriptor, read from the root on first use
    fn descriptor(&mut self) -> Result<Kustomization> {
        if let Some(kustomization) = &self.kustomization {
            return Ok(kustomization.clone());
        }
        let (file, content) = self.loader.find_kustomization()?;
        warn_unknown_fields(&file, &content);
        let kustomization = Kustomization::from_yaml(&content)?;
        self.kustomization = Some(kustomization.clone());
        Ok(kustomization)
    }

    /// Child builder for a base directory, after checking for a cycle
    fn base_builder(&self, entry: &str) -> Result<Builder> {
        let child = self.loader.child(entry)?;
        let mut chain = self.ancestry.clone();
        chain.push(self.loader.root());
        let root = child.root();
        if chain.contains(&root) {
            chain.push(root);
            return Err(EngineError::CycleDetected {
                path: chain.join(" -> "),
            });
        }
        Ok(Builder::from_boxed(child)
            .with_config(self.config.clone())
            .with_ancestry(chain))
    }

    /// Build every base to completion and merge the results, in declared order
    pub fn load_bases(&mut self) -> Result<()> {
        self.expect_state(BuildState::Empty)?;
        let kustomization = self.descriptor()?;
        for entry in kustomization.all_resources() {
            if !self.loader.is_kustomization_dir(entry) {
                continue;
            }
            tracing::debug!(base = entry, "building base");
            let base = self.base_builder(entry)?.build()?;
            self.resources.merge(base)?;
        }
        self.state = BuildState::BasesLoaded;
        Ok(())
    }

    /// Load the layer's own resource files
    pub fn add_raw_resources(&mut self) -> Result<()> {
        self.expect_state(BuildState::BasesLoaded)?;
        let kustomization = self.descriptor()?;
        let raw = self.load_resource_files(&kustomization)?;
        tracing::debug!(count = raw.len(), "adding raw resources");
        self.resources.merge(raw)?;
        self.state = BuildState::RawResourcesAdded;
        Ok(())
    }

    /// Run the generators and merge their output
    pub fn generate(&mut self) -> Result<()> {
        self.expect_state(BuildState::RawResourcesAdded)?;
        let kustomization = self.descriptor()?;
        let generated = generate_all(&kustomization, self.loader.as_ref())?;
        tracing::debug!(count = generated.len(), "merging generated resources");
        self.resources.merge(generated)?;
        refresh_name_hashes(&mut self.resources)?;
        self.state = BuildState::Generated;
        Ok(())
    }

    /// Run the layer's transformers in their fixed order, then re-hash
    /// generated names whose content changed
    pub fn transform(&mut self) -> Result<()> {
        self.expect_state(BuildState::Generated)?;
        let kustomization = self.descriptor()?;
        let pipeline = self.pipeline(&kustomization)?;
        tracing::debug!(transformers = pipeline.len(), "running transformers");
        for transformer in &pipeline {
            transformer.transform(&mut self.resources)?;
        }
        // Patches and replacements may have changed generated content
        refresh_name_hashes(&mut self.resources)?;
        self.state = BuildState::Transformed;
        Ok(())
    }

    /// Point references at renamed resources to their final names
    pub fn finish(&mut self) -> Result<()> {
        self.expect_state(BuildState::Transformed)?;
        NameReferenceTransformer::new(&self.config).transform(&mut self.resources)?;
        self.state = BuildState::Final;
        Ok(())
    }

    /// Hand over the finished map
    pub fn into_resources(self) -> Result<ResourceMap> {
        self.expect_state(BuildState::Final)?;
        Ok(self.resources)
    }

    /// Run every step and return the layer's final resources
    #[tracing::instrument(skip(self), fields(root = %self.loader.root()))]
    pub fn build(mut self) -> Result<ResourceMap> {
        self.load_bases()?;
        self.add_raw_resources()?;
        self.generate()?;
        self.transform()?;
        self.finish()?;
        self.into_resources()
    }

    /// Resources of this layer and its bases exactly as authored
    ///
    /// Nothing is generated or transformed. Only valid on a fresh builder.
    pub fn raw_resources(mut self) -> Result<ResourceMap> {
        self.expect_state(BuildState::Empty)?;
        let kustomization = self.descriptor()?;
        let mut collected = ResourceMap::new();
        for entry in kustomization.all_resources() {
            if self.loader.is_kustomization_dir(entry) {
                let base = self.base_builder(entry)?.raw_resources()?;
                collected.merge(base)?;
            }
        }
        collected.merge(self.load_resource_files(&kustomization)?)?;
        Ok(collected)
    }

    fn load_resource_files(&self, kustomization: &Kustomization) -> Result<ResourceMap> {
        let mut raw = ResourceMap::new();
        for entry in kustomization.all_resources() {
            if self.loader.is_kustomization_dir(entry) {
                continue;
            }
            if self.loader.is_dir(entry) {
                return Err(EngineError::InvalidResource {
                    file: entry.to_string(),
                    message: "directory without a kustomization file".to_string(),
                });
            }
            let bytes = self.loader.load(entry)?;
            let resources = Resource::from_yaml_stream(&bytes)
                .map_err(|e| EngineError::InvalidResource {
                    file: entry.to_string(),
                    message: e.to_string(),
                })?;
            for res in resources {
                raw.append(res)?;
            }
        }
        Ok(raw)
    }

    fn pipeline(&self, kustomization: &Kustomization) -> Result<Vec<Box<dyn Transformer>>> {
        let mut pipeline: Vec<Box<dyn Transformer>> = Vec::new();

        let prefix = kustomization.name_prefix.as_deref().unwrap_or_default();
        let suffix = kustomization.name_suffix.as_deref().unwrap_or_default();
        if !prefix.is_empty() || !suffix.is_empty() {
            pipeline.push(Box::new(PrefixSuffixTransformer::new(prefix, suffix, &self.config)));
        }
        if let Some(namespace) = kustomization.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            pipeline.push(Box::new(NamespaceTransformer::new(namespace, &self.config)));
        }
        if !kustomization.common_labels.is_empty() {
            pipeline.push(Box::new(MapFieldTransformer::new(
                kustomization.common_labels.clone(),
                self.config.common_labels.clone(),
            )));
        }
        if !kustomization.common_annotations.is_empty() {
            pipeline.push(Box::new(MapFieldTransformer::new(
                kustomization.common_annotations.clone(),
                self.config.common_annotations.clone(),
            )));
        }

        for (index, entry) in kustomization.patches_strategic_merge.iter().enumerate() {
            let at = DirectiveRef::new("patchesStrategicMerge", index);
            for doc in self.strategic_patch_documents(entry, at)? {
                pipeline.push(Box::new(StrategicMergeTransformer::new(
                    at,
                    doc,
                    None,
                    Default::default(),
                    false,
                )?));
            }
        }

        for (index, patch) in kustomization.patches_json6902.iter().enumerate() {
            let at = DirectiveRef::new("patchesJson6902", index);
            let payload = self.patch_payload(patch.path.as_deref(), patch.patch.as_deref())?;
            pipeline.push(Box::new(JsonPatchTransformer::parse(
                at,
                patch.target.clone(),
                &payload,
                patch.allow_empty,
            )?));
        }

        for (index, patch) in kustomization.patches.iter().enumerate() {
            let at = DirectiveRef::new("patches", index);
            let payload = self.patch_payload(patch.path.as_deref(), patch.patch.as_deref())?;
            for doc in parse_documents(&payload, at)? {
                if doc.is_array() {
                    let target = generic_patch_target(patch.target.as_ref(), at)?;
                    pipeline.push(Box::new(JsonPatchTransformer::new(
                        at,
                        target,
                        doc,
                        patch.allow_empty,
                    )?));
                } else {
                    pipeline.push(Box::new(StrategicMergeTransformer::new(
                        at,
                        doc,
                        patch.target.clone(),
                        patch.options.clone(),
                        patch.allow_empty,
                    )?));
                }
            }
        }

        if !kustomization.replacements.is_empty() {
            pipeline.push(Box::new(ReplacementTransformer::new(
                kustomization.replacements.clone(),
            )));
        }
        Ok(pipeline)
    }

    /// Payload of a patch given by file path or inline
    fn patch_payload(&self, path: Option<&str>, inline: Option<&str>) -> Result<String> {
        match (path, inline) {
            (Some(path), _) => Ok(self.loader.load_string(path)?),
            (None, Some(inline)) => Ok(inline.to_string()),
            (None, None) => Ok(String::new()),
        }
    }

    /// Documents of a `patchesStrategicMerge` entry, a file or inline YAML
    fn strategic_patch_documents(&self, entry: &str, at: DirectiveRef) -> Result<Vec<JsonValue>> {
        if self.loader.exists(entry) && !self.loader.is_dir(entry) {
            let content = self.loader.load_string(entry)?;
            return parse_documents(&content, at);
        }
        let docs = parse_documents(entry, at).ok().filter(|docs| docs.iter().all(JsonValue::is_object));
        match docs {
            Some(docs) if !docs.is_empty() => Ok(docs),
            _ => Err(EngineError::InvalidPatch {
                directive: at.directive,
                index: at.index,
                message: format!("'{}' is neither a patch file nor an inline patch", entry),
            }),
        }
    }
}

/// Non-empty documents of a YAML stream
fn parse_documents(content: &str, at: DirectiveRef) -> Result<Vec<JsonValue>> {
    let mut docs = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = JsonValue::deserialize(document).map_err(|e| EngineError::InvalidPatch {
            directive: at.directive,
            index: at.index,
            message: e.to_string(),
        })?;
        if !value.is_null() {
            docs.push(value);
        }
    }
    Ok(docs)
}

fn generic_patch_target(target: Option<&Selector>, at: DirectiveRef) -> Result<Selector> {
    target.cloned().ok_or_else(|| EngineError::InvalidPatch {
        directive: at.directive,
        index: at.index,
        message: "a JSON patch requires a target".to_string(),
    })
}

/// Warn about top-level descriptor fields nothing reads
fn warn_unknown_fields(file: &str, content: &str) {
    let Ok(serde_yaml::Value::Mapping(map)) = serde_yaml::from_str::<serde_yaml::Value>(content) else {
        return;
    };
    for key in map.keys().filter_map(serde_yaml::Value::as_str) {
        if KUSTOMIZATION_FIELDS.contains(&key) {
            continue;
        }
        match suggest_kustomization_field(key) {
            Some(hint) => tracing::warn!(file, field = key, "unknown field ignored. {}", hint),
            None => tracing::warn!(file, field = key, "unknown field ignored"),
        }
    }
}
