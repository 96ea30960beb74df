//! Kustom Core - resource model for overlay-composed Kubernetes configuration
//!
//! This crate provides the types every build stage works on:
//! - `Document`: a decoded resource tree with typed path accessors
//! - `ResId` / `Gvk`: resource identity
//! - `Resource`: a document plus its merge behavior and rename history
//! - `ResourceMap`: the ordered working set of one build layer
//! - `Selector`, `FieldSpec`: how directives address resources and fields
//! - `Kustomization`: the parsed descriptor of one layer
//! - `Loader`: rooted file access for layers

pub mod document;
pub mod error;
pub mod fieldspec;
pub mod kustomization;
pub mod loader;
pub mod merge;
pub mod resid;
pub mod resmap;
pub mod resource;
pub mod selector;

pub use document::{Document, FieldPath, PathSegment};
pub use error::{CoreError, Result};
pub use fieldspec::FieldSpec;
pub use kustomization::{
    ConfigMapArgs, FieldOptions, GeneratorArgs, GeneratorOptions, Json6902Patch, Kustomization,
    Patch, PatchOptions, Replacement, ReplacementSource, ReplacementTarget, SecretArgs,
};
pub use loader::{FsLoader, KUSTOMIZATION_FILE_NAMES, Loader, MemoryLoader};
pub use merge::strategic_merge;
pub use resid::{Gvk, ResId};
pub use resmap::ResourceMap;
pub use resource::{Behavior, Resource};
pub use selector::{Selector, SelectorMatcher};
