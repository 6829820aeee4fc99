//! Run state threaded through the generation loop.
//!
//! One [`RunState`] exists per invocation, owned exclusively by the
//! orchestrator. Stages receive the fields they need and return values; they
//! never mutate shared state directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::core::table::Table;
use crate::core::verdict::{FailCategory, FailDiagnostic};

/// Stages of the generation loop state machine. Terminal outcomes are
/// expressed in [`crate::orchestrator::RunStop`], not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Planning,
    Authoring,
    Validating,
    Reflecting,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Planning => "planning",
            Stage::Authoring => "authoring",
            Stage::Validating => "validating",
            Stage::Reflecting => "reflecting",
        }
    }
}

/// The single mutable record for one run.
#[derive(Debug, Clone)]
pub struct RunState {
    /// Fixture selector; immutable for the run.
    pub target_id: String,
    /// Extracted text of the sample document; set once.
    pub source_text: String,
    /// Expected output table; loaded once.
    pub expected: Table,
    /// Most recently authored candidate; overwritten every attempt.
    pub candidate_code: String,
    /// Authoring attempts so far. Invariant: `0 <= attempt_count <= max_attempts`.
    pub attempt_count: u32,
    /// Reflection feedback guiding the next attempt. Superseded on every
    /// reflection, cleared on success; never merged across attempts.
    pub feedback: Option<String>,
    /// Set at most once; terminal.
    pub succeeded: bool,
    /// Most recent failure, if any.
    pub last_error: Option<FailDiagnostic>,
    /// Ordered per-attempt outcomes, kept so an exhausted run can report the
    /// whole progression of failures.
    pub attempts: Vec<AttemptRecord>,
}

impl RunState {
    pub fn new(target_id: impl Into<String>, source_text: String, expected: Table) -> Self {
        Self {
            target_id: target_id.into(),
            source_text,
            expected,
            candidate_code: String::new(),
            attempt_count: 0,
            feedback: None,
            succeeded: false,
            last_error: None,
            attempts: Vec::new(),
        }
    }
}

/// Outcome of one full authoring + validation attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    /// 1-indexed attempt number.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Passed,
    Failed {
        category: FailCategory,
        diagnostic: String,
    },
}

impl AttemptRecord {
    pub fn passed(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Passed)
    }
}

/// Cooperative cancellation flag checked at stage boundaries.
///
/// Cancellation never interrupts a stage mid-flight; the loop observes the
/// flag before entering the next stage and reports the run as aborted there.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
