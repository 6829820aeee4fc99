//! Pure, deterministic logic: run state, verdicts, and table comparison.
//! No I/O; fully testable in isolation.

pub mod state;
pub mod table;
pub mod verdict;
