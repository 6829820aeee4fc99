//! Generation service adapter.
//!
//! The [`Generator`] trait decouples authoring and reflection from the
//! actual text-generation backend (by default a `codex exec` style CLI that
//! reads the prompt on stdin and prints the completion on stdout). Tests use
//! scripted generators that return predetermined responses without spawning
//! processes. Every call site treats the service as unreliable: failures are
//! surfaced as errors, never swallowed.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::io::process::{CapturedOutput, command_from_argv, run_with_timeout};
use crate::io::prompt::floor_char_boundary;

/// Parameters for one generation call.
#[derive(Debug, Clone)]
pub struct GenRequest {
    /// Prompt text fed to the service.
    pub prompt: String,
    /// Path to write the raw call log (stdout/stderr of the backend).
    pub log_path: PathBuf,
    /// Maximum time to wait for the completion.
    pub timeout: Duration,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Abstraction over text-generation backends.
pub trait Generator {
    /// Request a completion for the prompt. Returns the response text.
    fn complete(&self, request: &GenRequest) -> Result<String>;
}

/// Generator that spawns a configured command-line tool.
pub struct CommandGenerator {
    command: Vec<String>,
}

impl CommandGenerator {
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.is_empty() || command[0].trim().is_empty() {
            return Err(anyhow!("generator command must be a non-empty array"));
        }
        Ok(Self { command })
    }
}

impl Generator for CommandGenerator {
    fn complete(&self, request: &GenRequest) -> Result<String> {
        info!(command = %self.command[0], "requesting completion");
        let cmd = command_from_argv(&self.command)?;
        let output = run_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .context("run generation command")?;

        write_call_log(&request.log_path, &output, request.output_limit_bytes)?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "generation timed out");
            return Err(anyhow!(
                "generation command timed out after {:?}",
                request.timeout
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "generation command failed");
            return Err(anyhow!(
                "generation command failed with status {:?}",
                output.status.code()
            ));
        }

        let response = output.stdout_lossy();
        if response.trim().is_empty() {
            return Err(anyhow!("generation command produced no output"));
        }
        debug!(bytes = response.len(), "completion received");
        Ok(response)
    }
}

fn write_call_log(path: &Path, output: &CapturedOutput, output_limit: usize) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create call log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&output.stdout_lossy());
    if output.stdout_truncated > 0 {
        buf.push_str(&format!(
            "\n[stdout truncated {} bytes]\n",
            output.stdout_truncated
        ));
    }
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&output.stderr_lossy());
    if output.stderr_truncated > 0 {
        buf.push_str(&format!(
            "\n[stderr truncated {} bytes]\n",
            output.stderr_truncated
        ));
    }
    if output.timed_out {
        buf.push_str("\n[generation timed out]\n");
    }

    if buf.len() > output_limit {
        // Truncated captures can leave the buffer cut mid-character.
        let cut = floor_char_boundary(&buf, output_limit);
        let truncated = format!(
            "{}\n[truncated {} bytes]\n",
            &buf[..cut],
            buf.len() - cut
        );
        fs::write(path, truncated)
            .with_context(|| format!("write call log {}", path.display()))?;
        return Ok(());
    }
    fs::write(path, buf).with_context(|| format!("write call log {}", path.display()))
}
