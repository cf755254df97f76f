//! Exit codes for the CLI

/// Success, or only passes and expected failures
pub const SUCCESS: i32 = 0;

/// Unexpected failures or passes in a run, or a failed
/// `validate --strict` / `fmt --check`
pub const FAILED: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// Project index could not be loaded
pub const LOAD_ERROR: i32 = 3;

/// Filter expression could not be compiled
pub const PREDICATE_ERROR: i32 = 4;

/// Any other fatal error (I/O, toolchain lookup, ...)
pub const ERROR: i32 = 5;

/// Run interrupted by the operator
pub const CANCELLED: i32 = 130;
