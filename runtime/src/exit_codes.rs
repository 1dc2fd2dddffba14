//! Stable exit codes for the CLI.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid configuration or arguments, or any unclassified failure.
pub const INVALID: i32 = 1;
/// The addressed entity, param or user does not exist.
pub const NOT_FOUND: i32 = 2;
/// State failed type conversion or validation.
pub const REJECTED: i32 = 3;
