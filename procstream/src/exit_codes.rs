//! Stable exit codes for the `procstream` CLI when the child's own code is unavailable.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid arguments/config, spawn failure, or a stream contract violation.
pub const INVALID: i32 = 1;
/// The child did not exit within the configured wait and was killed.
pub const TIMED_OUT: i32 = 124;
/// The child exited without an exit code (terminated by a signal).
pub const SIGNALLED: i32 = 125;
