//! Stable exit codes for pipeline CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid invocation, config, or input file, or an I/O failure.
pub const INVALID: i32 = 1;
/// `pipeline build` finished but the state carries errors.
pub const STATE_ERRORS: i32 = 2;
