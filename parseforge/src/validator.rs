//! Validation: run a candidate against the sample document and compare its
//! output with the expected table.
//!
//! Every candidate defect becomes a categorized [`Verdict::Fail`]; only
//! orchestrator-side faults (unable to spawn the interpreter, unreadable
//! work dir) surface as errors.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::table::{Table, compare};
use crate::core::verdict::{FailCategory, FailDiagnostic, Verdict};
use crate::io::sandbox::{CandidateFault, Sandbox, SandboxOutcome, SandboxRequest};

/// Keep at most this many trailing bytes of candidate stderr in diagnostics.
const STDERR_TAIL_BYTES: usize = 2_000;

/// Parameters for validating one candidate.
#[derive(Debug, Clone)]
pub struct ValidationRequest<'a> {
    /// Candidate source text, as authored.
    pub candidate: &'a str,
    /// Where to write the candidate before invoking it.
    pub candidate_path: &'a Path,
    /// Sample document handed to the candidate.
    pub input_path: &'a Path,
    /// Sandbox working directory.
    pub work_dir: &'a Path,
    /// Sandbox invocation log.
    pub log_path: &'a Path,
    /// Ground truth to compare against.
    pub expected: &'a Table,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Validate one candidate and return a verdict.
pub fn validate<S: Sandbox>(sandbox: &S, request: &ValidationRequest<'_>) -> Result<Verdict> {
    if request.candidate.trim().is_empty() {
        return Ok(Verdict::fail(
            FailCategory::Syntax,
            "empty candidate: the authoring response contained no code",
        ));
    }

    fs::create_dir_all(request.work_dir)
        .with_context(|| format!("create validation dir {}", request.work_dir.display()))?;
    fs::write(request.candidate_path, request.candidate)
        .with_context(|| format!("write candidate {}", request.candidate_path.display()))?;

    let outcome = sandbox.invoke(&SandboxRequest {
        candidate_path: request.candidate_path.to_path_buf(),
        input_path: request.input_path.to_path_buf(),
        work_dir: request.work_dir.to_path_buf(),
        log_path: request.log_path.to_path_buf(),
        timeout: request.timeout,
        output_limit_bytes: request.output_limit_bytes,
    })?;

    if let Some(fault) = outcome.fault {
        return Ok(Verdict::Fail(diagnose_fault(fault, &outcome, request)));
    }

    let produced = match Table::from_csv(&outcome.stdout) {
        Ok(table) => table,
        Err(err) => {
            return Ok(Verdict::fail(
                FailCategory::Structural,
                format!("candidate output is not a readable table: {err:#}"),
            ));
        }
    };

    match compare(request.expected, &produced) {
        Some(diff) => {
            debug!(mismatches = diff.cell_mismatches.len(), "output mismatch");
            Ok(Verdict::Fail(
                FailDiagnostic::new(
                    FailCategory::Structural,
                    "produced table does not match the expected table",
                )
                .with_diff(diff),
            ))
        }
        None => {
            info!("candidate output matches expected table exactly");
            Ok(Verdict::Pass { produced })
        }
    }
}

fn diagnose_fault(
    fault: CandidateFault,
    outcome: &SandboxOutcome,
    request: &ValidationRequest<'_>,
) -> FailDiagnostic {
    let stderr = stderr_tail(&outcome.stderr);
    match fault {
        CandidateFault::Syntax => FailDiagnostic::new(
            FailCategory::Syntax,
            format!("candidate failed to load:\n{stderr}"),
        ),
        CandidateFault::MissingEntryPoint => FailDiagnostic::new(
            FailCategory::Structural,
            format!("missing or malformed entry point:\n{stderr}"),
        ),
        CandidateFault::BadReturnShape => FailDiagnostic::new(
            FailCategory::Structural,
            format!("entry point did not return a (columns, rows) pair:\n{stderr}"),
        ),
        CandidateFault::Runtime => FailDiagnostic::new(
            FailCategory::Runtime,
            format!("candidate raised during execution:\n{stderr}"),
        ),
        CandidateFault::TimedOut => FailDiagnostic::new(
            FailCategory::Timeout,
            format!(
                "candidate execution exceeded {}s",
                request.timeout.as_secs()
            ),
        ),
    }
}

/// Trailing slice of stderr, cut on a char boundary.
fn stderr_tail(stderr: &str) -> &str {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_TAIL_BYTES {
        return trimmed;
    }
    let mut start = trimmed.len() - STDERR_TAIL_BYTES;
    while start < trimmed.len() && !trimmed.is_char_boundary(start) {
        start += 1;
    }
    &trimmed[start..]
}
