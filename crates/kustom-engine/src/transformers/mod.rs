//! Transformers: in-place rewrites of a layer's resource map
//!
//! Each transformer borrows the map exclusively for the duration of one call
//! and keeps no reference to it afterwards. Identity changes go through
//! [`ResourceMap::update`] so the map stays keyed by current ids.

mod labels;
mod name_reference;
mod namespace;
mod patch_json6902;
mod patch_strategic;
mod prefix_suffix;
mod replacement;

pub use labels::MapFieldTransformer;
pub use name_reference::NameReferenceTransformer;
pub use namespace::NamespaceTransformer;
pub use patch_json6902::JsonPatchTransformer;
pub use patch_strategic::StrategicMergeTransformer;
pub use prefix_suffix::PrefixSuffixTransformer;
pub use replacement::ReplacementTransformer;

use kustom_core::{ResId, ResourceMap, Selector};

use crate::error::{EngineError, Result};
use crate::suggestions::suggest_for_selector;

pub trait Transformer {
    fn transform(&self, resources: &mut ResourceMap) -> Result<()>;
}

/// Where a directive was declared, for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectiveRef {
    pub directive: &'static str,
    pub index: usize,
}

impl DirectiveRef {
    pub fn new(directive: &'static str, index: usize) -> Self {
        Self { directive, index }
    }
}

/// Resolve a selector against the current map
///
/// An empty result is a [`EngineError::SelectorMiss`] unless `allow_empty`.
pub(crate) fn select_targets(
    resources: &ResourceMap,
    selector: &Selector,
    at: DirectiveRef,
    allow_empty: bool,
) -> Result<Vec<ResId>> {
    let ids = resources.select(selector)?;
    if ids.is_empty() && !allow_empty {
        return Err(EngineError::SelectorMiss {
            directive: at.directive,
            index: at.index,
            selector: selector.describe(),
            help: suggest_for_selector(selector, resources),
        });
    }
    Ok(ids)
}
