//! Kustom Engine - builds overlay-composed Kubernetes configuration
//!
//! This crate turns a kustomization layer into its final resources:
//! - Generators for ConfigMaps and Secrets with content-hash name suffixes
//! - Transformers for names, namespaces, labels, annotations and patches
//! - Replacements and name-reference fixing after renames
//! - A `Builder` that composes bases recursively with conflict checks
//! - Human-readable errors with suggestions

pub mod builder;
pub mod config;
pub mod error;
pub mod generators;
pub mod hash;
pub mod suggestions;
pub mod transformers;

pub use builder::{BuildState, Builder};
pub use config::{DEFAULT_CONFIG, NameReference, TransformerConfig};
pub use error::{EngineError, ErrorCategory, Result};
pub use hash::content_hash;
pub use transformers::{DirectiveRef, Transformer};
