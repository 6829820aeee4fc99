//! Isolated execution of untrusted candidate code.
//!
//! Candidates are freshly generated by an external author and must not be
//! able to hang or destabilize the orchestrator: they run in a separate
//! interpreter process behind an embedded harness, under a wall-clock
//! timeout, and every fault is captured and classified rather than
//! propagated. The [`Sandbox`] trait lets tests script outcomes without
//! spawning an interpreter.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::io::process::{command_from_argv, run_with_timeout};

const HARNESS: &str = include_str!("harness.py");

const EXIT_SYNTAX: i32 = 12;
const EXIT_ENTRY_POINT: i32 = 13;
const EXIT_RUNTIME: i32 = 14;
const EXIT_RETURN_SHAPE: i32 = 15;

/// Parameters for one candidate invocation.
#[derive(Debug, Clone)]
pub struct SandboxRequest {
    /// Candidate source file, already written by the caller.
    pub candidate_path: PathBuf,
    /// Sample document handed to the candidate's entry point.
    pub input_path: PathBuf,
    /// Directory the harness is written into and the process runs in.
    pub work_dir: PathBuf,
    /// Path to write the invocation log.
    pub log_path: PathBuf,
    /// Wall-clock bound on candidate execution.
    pub timeout: Duration,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Classified candidate fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateFault {
    /// The candidate failed to load (malformed source).
    Syntax,
    /// `parse/1` missing or with the wrong arity.
    MissingEntryPoint,
    /// The candidate raised during execution.
    Runtime,
    /// The entry point returned something other than `(columns, rows)`.
    BadReturnShape,
    /// Execution exceeded the wall-clock bound.
    TimedOut,
}

/// Result of one sandbox invocation. `fault: None` means the candidate ran
/// to completion and its table is on stdout as CSV.
#[derive(Debug, Clone)]
pub struct SandboxOutcome {
    pub fault: Option<CandidateFault>,
    pub stdout: String,
    pub stderr: String,
}

/// Abstraction over candidate execution backends.
pub trait Sandbox {
    fn invoke(&self, request: &SandboxRequest) -> Result<SandboxOutcome>;
}

/// Sandbox that spawns a Python interpreter on the embedded harness.
pub struct PythonSandbox {
    interpreter: Vec<String>,
}

impl PythonSandbox {
    pub fn new(interpreter: Vec<String>) -> Result<Self> {
        if interpreter.is_empty() || interpreter[0].trim().is_empty() {
            return Err(anyhow!("sandbox command must be a non-empty array"));
        }
        Ok(Self { interpreter })
    }
}

impl Sandbox for PythonSandbox {
    fn invoke(&self, request: &SandboxRequest) -> Result<SandboxOutcome> {
        info!(candidate = %request.candidate_path.display(), "invoking candidate");
        fs::create_dir_all(&request.work_dir)
            .with_context(|| format!("create sandbox dir {}", request.work_dir.display()))?;
        let harness_path = request.work_dir.join("harness.py");
        fs::write(&harness_path, HARNESS)
            .with_context(|| format!("write harness {}", harness_path.display()))?;

        let mut argv = self.interpreter.clone();
        argv.push(harness_path.display().to_string());
        argv.push(request.candidate_path.display().to_string());
        argv.push(request.input_path.display().to_string());
        let mut cmd = command_from_argv(&argv)?;
        cmd.current_dir(&request.work_dir);

        let output = run_with_timeout(cmd, None, request.timeout, request.output_limit_bytes)
            .context("run candidate sandbox")?;
        write_invocation_log(&request.log_path, &output.stderr, output.status.code())?;

        let fault = if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "candidate timed out");
            Some(CandidateFault::TimedOut)
        } else {
            match output.status.code() {
                Some(0) => None,
                Some(EXIT_SYNTAX) => Some(CandidateFault::Syntax),
                Some(EXIT_ENTRY_POINT) => Some(CandidateFault::MissingEntryPoint),
                Some(EXIT_RETURN_SHAPE) => Some(CandidateFault::BadReturnShape),
                Some(EXIT_RUNTIME) => Some(CandidateFault::Runtime),
                // Killed by signal or an unexpected interpreter exit.
                _ => Some(CandidateFault::Runtime),
            }
        };

        debug!(?fault, "candidate finished");
        Ok(SandboxOutcome {
            fault,
            stdout: output.stdout_lossy(),
            stderr: output.stderr_lossy(),
        })
    }
}

fn write_invocation_log(path: &Path, stderr: &[u8], exit_code: Option<i32>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create sandbox log dir {}", parent.display()))?;
    }
    let mut buf = format!("exit code: {exit_code:?}\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(stderr));
    fs::write(path, buf).with_context(|| format!("write sandbox log {}", path.display()))
}
