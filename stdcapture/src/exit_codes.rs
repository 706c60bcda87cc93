//! Stable exit codes for `stdcapture` CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid configuration or arguments.
pub const INVALID: i32 = 1;
/// A capture session could not be entered or restored.
pub const CAPTURE_FAILED: i32 = 2;
