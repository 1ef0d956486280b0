//! Stable exit codes for the `s2t` CLI.

/// The sync run completed with child exit code zero, or the command succeeded.
pub const OK: i32 = 0;
/// Invalid input: missing credentials, bad settings, or spawn setup failure.
pub const INVALID: i32 = 1;
/// The child process ran and exited non-zero.
pub const SYNC_FAILED: i32 = 2;
/// The run was cancelled before the child exited on its own.
pub const CANCELLED: i32 = 3;
