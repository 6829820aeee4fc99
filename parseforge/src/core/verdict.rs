//! Validation verdicts and the recoverable failure taxonomy.

use serde::Serialize;

use crate::core::table::{Table, TableDiff};

/// Recoverable failure categories. Each becomes a [`Verdict::Fail`] that
/// drives the reflection transition; none of them terminates the run on its
/// own. Configuration problems (missing fixture, invalid target) are fatal
/// before the loop starts and are plain errors, not verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailCategory {
    /// The generation service was unreachable or returned malformed output.
    GenerationError,
    /// The candidate failed to load as an executable unit.
    Syntax,
    /// Entry point missing/malformed, or the output table does not match.
    Structural,
    /// The candidate raised a fault during execution.
    Runtime,
    /// Candidate execution exceeded the wall-clock bound.
    Timeout,
}

impl FailCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailCategory::GenerationError => "generation-error",
            FailCategory::Syntax => "syntax",
            FailCategory::Structural => "structural",
            FailCategory::Runtime => "runtime",
            FailCategory::Timeout => "timeout",
        }
    }
}

/// Structured description of one failed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailDiagnostic {
    pub category: FailCategory,
    pub message: String,
    /// Column/row-level diff, present for structural output mismatches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<TableDiff>,
}

impl FailDiagnostic {
    pub fn new(category: FailCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            diff: None,
        }
    }

    pub fn with_diff(mut self, diff: TableDiff) -> Self {
        self.diff = Some(diff);
        self
    }

    /// Render the full diagnostic text, including the diff summary when present.
    pub fn render(&self) -> String {
        match &self.diff {
            Some(diff) => format!("[{}] {}\n{}", self.category.as_str(), self.message, diff.summary()),
            None => format!("[{}] {}", self.category.as_str(), self.message),
        }
    }
}

/// Outcome of validating one candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum Verdict {
    /// Exact match; carries the produced table for the run report.
    Pass { produced: Table },
    Fail(FailDiagnostic),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass { .. })
    }

    pub fn fail(category: FailCategory, message: impl Into<String>) -> Verdict {
        Verdict::Fail(FailDiagnostic::new(category, message))
    }
}
