//! CLI error types with exit code handling
//!
//! This module provides a unified error type for CLI operations that
//! maps errors to appropriate exit codes.

use kustom_engine::{EngineError, ErrorCategory};
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// The build failed
    #[error("Build failed: {message}")]
    #[diagnostic(code(kustom::cli::build))]
    Build {
        message: String,
        category: BuildFailure,
        #[help]
        help: Option<String>,
    },

    /// Invalid input (missing directory, bad arguments)
    #[error("{message}")]
    #[diagnostic(code(kustom::cli::input))]
    Input {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(kustom::cli::io))]
    Io { message: String },
}

/// Which stage of a build failed, for exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildFailure {
    Conflict,
    Patch,
    Generation,
    Selector,
    Other,
}

impl From<ErrorCategory> for BuildFailure {
    fn from(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::StructuralConflict => BuildFailure::Conflict,
            ErrorCategory::PatchFailure => BuildFailure::Patch,
            ErrorCategory::GenerationFailure => BuildFailure::Generation,
            ErrorCategory::SelectorMiss => BuildFailure::Selector,
            ErrorCategory::Other => BuildFailure::Other,
        }
    }
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Build { category, .. } => match category {
                BuildFailure::Conflict => exit_codes::CONFLICT_ERROR,
                BuildFailure::Patch => exit_codes::PATCH_ERROR,
                BuildFailure::Generation => exit_codes::GENERATION_ERROR,
                BuildFailure::Selector => exit_codes::SELECTOR_ERROR,
                BuildFailure::Other => exit_codes::ERROR,
            },
            CliError::Input { .. } => exit_codes::USAGE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
        }
    }

    /// Create an input error with help text
    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        CliError::Build {
            message: err.to_string(),
            category: err.category().into(),
            help: err.help().map(|h| h.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
