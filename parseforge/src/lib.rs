//! Bounded, self-correcting parser generation.
//!
//! Given a target's sample document and expected output table, the forge
//! asks an external text-generation service to author a parser, validates
//! the candidate in a sandboxed interpreter against the expected table, and
//! feeds reflection on each failure back into the next attempt, up to a
//! strict attempt cap. Only a candidate that reproduces the expected table
//! exactly is persisted.
//!
//! Layout follows a core/io split: `core` holds pure data and comparison
//! logic, `io` holds everything that touches the filesystem or spawns
//! processes, and the stage modules (`author`, `validator`, `reflector`,
//! `orchestrator`) compose the two.

pub mod author;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod reflector;
pub mod validator;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
