//! Engine error types

use kustom_core::{CoreError, ResId};
use miette::Diagnostic;
use thiserror::Error;

use crate::builder::BuildState;

/// Broad classes of build failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Two resources claim the same identity, or cannot be reconciled
    StructuralConflict,
    /// A patch could not be applied
    PatchFailure,
    /// A generator could not produce its resource
    GenerationFailure,
    /// A directive selected no resources
    SelectorMiss,
    Other,
}

/// Main engine error type
///
/// Every variant aborts the build; no partial output is produced.
#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(code(kustom::engine::core))]
    Core(#[from] CoreError),

    #[error("parse error: {message}")]
    #[diagnostic(code(kustom::engine::parse))]
    Parse { message: String },

    #[error("invalid resource file '{file}': {message}")]
    #[diagnostic(
        code(kustom::engine::invalid_resource),
        help("resource entries must be YAML manifests or directories holding a kustomization file")
    )]
    InvalidResource { file: String, message: String },

    #[error("failed to generate '{name}': {message}")]
    #[diagnostic(code(kustom::engine::generation))]
    Generation { name: String, message: String },

    #[error("{directive}[{index}]: test operation failed on {id}: {message}")]
    #[diagnostic(code(kustom::engine::patch_test_failed))]
    PatchTestFailed {
        directive: &'static str,
        index: usize,
        id: ResId,
        message: String,
    },

    #[error("{directive}[{index}]: path '{path}' not found in {id}")]
    #[diagnostic(
        code(kustom::engine::path_not_found),
        help("remove and replace operations require the path to exist; use `add` to create it")
    )]
    PathNotFound {
        directive: &'static str,
        index: usize,
        id: ResId,
        path: String,
    },

    #[error("{directive}[{index}]: invalid patch: {message}")]
    #[diagnostic(code(kustom::engine::invalid_patch))]
    InvalidPatch {
        directive: &'static str,
        index: usize,
        message: String,
    },

    #[error("{directive}[{index}]: no resource matches {selector}")]
    #[diagnostic(code(kustom::engine::selector_miss))]
    SelectorMiss {
        directive: &'static str,
        index: usize,
        selector: String,
        #[help]
        help: Option<String>,
    },

    #[error("builder is in state {actual}, expected {expected}")]
    #[diagnostic(
        code(kustom::engine::invalid_state),
        help("build steps run once each, in order: load_bases, add_raw_resources, generate, transform, finish")
    )]
    InvalidState {
        expected: BuildState,
        actual: BuildState,
    },

    #[error("base cycle detected: {path}")]
    #[diagnostic(code(kustom::engine::cycle))]
    CycleDetected { path: String },

    #[error("replacements[{index}]: {message}")]
    #[diagnostic(code(kustom::engine::replacement))]
    Replacement { index: usize, message: String },
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::Core(e) if e.is_structural_conflict() => ErrorCategory::StructuralConflict,
            EngineError::Core(CoreError::InvalidPatch { .. })
            | EngineError::PatchTestFailed { .. }
            | EngineError::PathNotFound { .. }
            | EngineError::InvalidPatch { .. } => ErrorCategory::PatchFailure,
            EngineError::Parse { .. } | EngineError::Generation { .. } => {
                ErrorCategory::GenerationFailure
            }
            EngineError::SelectorMiss { .. } => ErrorCategory::SelectorMiss,
            _ => ErrorCategory::Other,
        }
    }

    pub(crate) fn generation(name: &str, message: impl Into<String>) -> Self {
        EngineError::Generation {
            name: name.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn parse(message: impl Into<String>) -> Self {
        EngineError::Parse {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
