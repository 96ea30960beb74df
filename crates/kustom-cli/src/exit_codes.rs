//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Conflict error - two resources claim one identity or cannot be reconciled
pub const CONFLICT_ERROR: i32 = 2;

/// Patch error - a patch failed its test, missed a path or was malformed
pub const PATCH_ERROR: i32 = 3;

/// Generation error - a generator source could not be read or parsed
pub const GENERATION_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Selector error - a directive matched no resource
pub const SELECTOR_ERROR: i32 = 6;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
