//! Field specs: which field of which kinds a transformer touches

use serde::{Deserialize, Serialize};

use crate::resid::Gvk;

/// A `/`-separated field path restricted to a group/version/kind
///
/// Unset gvk fields match anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub path: String,
    /// Create the field when it is missing
    #[serde(default)]
    pub create: bool,
}

impl FieldSpec {
    /// Spec applying to every kind
    pub fn any(path: &str, create: bool) -> Self {
        Self {
            group: None,
            version: None,
            kind: None,
            path: path.to_string(),
            create,
        }
    }

    /// Spec applying to one kind, any group or version
    pub fn for_kind(kind: &str, path: &str, create: bool) -> Self {
        Self {
            kind: Some(kind.to_string()),
            ..Self::any(path, create)
        }
    }

    pub fn applies_to(&self, gvk: &Gvk) -> bool {
        let matches = |want: &Option<String>, have: &str| want.as_deref().is_none_or(|w| w == have);
        matches(&self.group, &gvk.group)
            && matches(&self.version, &gvk.version)
            && matches(&self.kind, &gvk.kind)
    }
}
