//! Core error types

use thiserror::Error;

use crate::resid::ResId;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("field not found: {path}")]
    FieldNotFound { path: String },

    #[error("type mismatch at {path}: expected {expected}")]
    TypeMismatch { path: String, expected: &'static str },

    #[error("may not add resource with an already registered id: {id}")]
    DuplicateId { id: ResId },

    #[error("merge conflict for {id}: {message}")]
    MergeConflict { id: ResId, message: String },

    #[error("no resource with id {id}")]
    IdNotFound { id: ResId },

    #[error("invalid resource: {message}")]
    InvalidResource { message: String },

    #[error("invalid patch: {message}")]
    InvalidPatch { message: String },

    #[error("resource maps differ: {message}")]
    NotEqual { message: String },

    #[error("invalid selector: {message}")]
    InvalidSelector { message: String },

    #[error("failed to load '{path}': {message}")]
    Loader { path: String, message: String },

    #[error("invalid kustomization: {message}")]
    InvalidKustomization { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Whether this error reports two resources fighting over one identity
    pub fn is_structural_conflict(&self) -> bool {
        matches!(
            self,
            CoreError::DuplicateId { .. } | CoreError::MergeConflict { .. }
        )
    }

    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        CoreError::FieldNotFound { path: path.into() }
    }

    pub(crate) fn mismatch(path: impl Into<String>, expected: &'static str) -> Self {
        CoreError::TypeMismatch {
            path: path.into(),
            expected,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
