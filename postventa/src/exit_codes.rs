//! Stable exit codes for postventa CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed due to invalid layout/config/store or other errors.
pub const INVALID: i32 = 1;
/// `postventa validate` found warnings but no errors.
pub const WARNINGS: i32 = 2;
