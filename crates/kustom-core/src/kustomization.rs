//! Kustomization descriptor
//!
//! The `kustomization.yaml` of one layer, parsed into plain directive structs.
//! `apiVersion` and `kind` are read but not enforced.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::resource::Behavior;
use crate::selector::Selector;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kustomization {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_suffix: Option<String>,

    /// Namespace forced onto every namespaced resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default)]
    pub common_labels: BTreeMap<String, String>,

    #[serde(default)]
    pub common_annotations: BTreeMap<String, String>,

    /// Legacy list of base directories, loaded before `resources`
    #[serde(default)]
    pub bases: Vec<String>,

    /// Resource files and base directories
    #[serde(default)]
    pub resources: Vec<String>,

    #[serde(default)]
    pub config_map_generator: Vec<ConfigMapArgs>,

    #[serde(default)]
    pub secret_generator: Vec<SecretArgs>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator_options: Option<GeneratorOptions>,

    /// File paths or inline YAML documents
    #[serde(default)]
    pub patches_strategic_merge: Vec<String>,

    #[serde(default, rename = "patchesJson6902")]
    pub patches_json6902: Vec<Json6902Patch>,

    #[serde(default)]
    pub patches: Vec<Patch>,

    #[serde(default)]
    pub replacements: Vec<Replacement>,
}

impl Kustomization {
    /// Parse and validate a descriptor; an empty document is an empty kustomization
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let kustomization: Kustomization = serde_yaml::from_str(content)?;
        kustomization.validate()?;
        Ok(kustomization)
    }

    /// Bases followed by resources, in declared order
    pub fn all_resources(&self) -> impl Iterator<Item = &str> {
        self.bases
            .iter()
            .chain(self.resources.iter())
            .map(String::as_str)
    }

    fn validate(&self) -> Result<()> {
        let generators = self
            .config_map_generator
            .iter()
            .map(|g| ("configMapGenerator", &g.args))
            .chain(self.secret_generator.iter().map(|g| ("secretGenerator", &g.args)));
        for (field, args) in generators {
            if args.name.is_empty() {
                return Err(CoreError::InvalidKustomization {
                    message: format!("{} entry is missing 'name'", field),
                });
            }
        }

        for (i, patch) in self.patches.iter().enumerate() {
            if patch.path.is_some() == patch.patch.is_some() {
                return Err(CoreError::InvalidKustomization {
                    message: format!("patches[{}]: exactly one of 'path' or 'patch' is required", i),
                });
            }
        }

        for (i, patch) in self.patches_json6902.iter().enumerate() {
            if patch.path.is_some() == patch.patch.is_some() {
                return Err(CoreError::InvalidKustomization {
                    message: format!(
                        "patchesJson6902[{}]: exactly one of 'path' or 'patch' is required",
                        i
                    ),
                });
            }
        }

        for (i, replacement) in self.replacements.iter().enumerate() {
            if replacement.targets.is_empty() {
                return Err(CoreError::InvalidKustomization {
                    message: format!("replacements[{}] has no targets", i),
                });
            }
        }
        Ok(())
    }
}

/// Options shared by all generators of a layer, or set on one generator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorOptions {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_name_suffix_hash: Option<bool>,
}

impl GeneratorOptions {
    /// Layer options overridden by generator options
    pub fn merged_with(&self, overrides: Option<&GeneratorOptions>) -> GeneratorOptions {
        let Some(overrides) = overrides else {
            return self.clone();
        };
        let mut labels = self.labels.clone();
        labels.extend(overrides.labels.clone());
        let mut annotations = self.annotations.clone();
        annotations.extend(overrides.annotations.clone());
        GeneratorOptions {
            labels,
            annotations,
            disable_name_suffix_hash: overrides
                .disable_name_suffix_hash
                .or(self.disable_name_suffix_hash),
        }
    }

    pub fn hash_suffix_enabled(&self) -> bool {
        !self.disable_name_suffix_hash.unwrap_or(false)
    }
}

/// Data sources and identity shared by the ConfigMap and Secret generators
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorArgs {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default)]
    pub behavior: Behavior,

    /// `KEY=VALUE` pairs
    #[serde(default)]
    pub literals: Vec<String>,

    /// `path` or `key=path`
    #[serde(default)]
    pub files: Vec<String>,

    /// Env files of `KEY=VALUE` lines
    #[serde(default)]
    pub envs: Vec<String>,

    /// Single env file, kept for older descriptors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<GeneratorOptions>,
}

impl GeneratorArgs {
    /// `envs` plus the legacy `env`
    pub fn env_files(&self) -> impl Iterator<Item = &str> {
        self.env.iter().chain(self.envs.iter()).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMapArgs {
    #[serde(flatten)]
    pub args: GeneratorArgs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretArgs {
    #[serde(flatten)]
    pub args: GeneratorArgs,

    /// Key to shell command; the command's stdout becomes the value
    #[serde(default)]
    pub commands: BTreeMap<String, String>,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub secret_type: Option<String>,
}

/// RFC 6902 patch against one selected resource set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Json6902Patch {
    pub target: Selector,

    /// File holding the operations (YAML or JSON)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Inline operations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,

    #[serde(default)]
    pub allow_empty: bool,
}

/// Generic patch: strategic merge or JSON patch, detected from the payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Selector>,

    #[serde(default)]
    pub options: PatchOptions,

    #[serde(default)]
    pub allow_empty: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchOptions {
    #[serde(default)]
    pub allow_name_change: bool,

    #[serde(default)]
    pub allow_kind_change: bool,
}

/// Copy one field value into fields of other resources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replacement {
    pub source: ReplacementSource,

    #[serde(default)]
    pub targets: Vec<ReplacementTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementSource {
    #[serde(flatten)]
    pub selector: Selector,

    /// Defaults to `metadata.name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<FieldOptions>,
}

impl ReplacementSource {
    pub fn field_path(&self) -> &str {
        self.field_path.as_deref().unwrap_or("metadata.name")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementTarget {
    pub select: Selector,

    #[serde(default)]
    pub reject: Vec<Selector>,

    #[serde(default)]
    pub field_paths: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<FieldOptions>,
}

/// Splits a scalar on `delimiter` and addresses part `index` of it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,

    #[serde(default)]
    pub index: i64,

    #[serde(default)]
    pub create: bool,
}
