//! Stable process exit codes for scripting around the CLI.

/// A validated parser artifact was persisted.
pub const OK: i32 = 0;

/// Configuration or setup failure: bad config, missing fixture, unreadable
/// sample. Nothing was attempted.
pub const CONFIG: i32 = 1;

/// The attempt cap was reached without a passing candidate.
pub const EXHAUSTED: i32 = 2;

/// The run was cancelled before completing.
pub const ABORTED: i32 = 3;
