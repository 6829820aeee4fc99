//! Per-attempt run products under `.forge/runs/`.
//!
//! # Separation of Concerns
//!
//! These files are product artifacts, always written regardless of
//! `RUST_LOG`; tracing output is dev diagnostics only. Each attempt keeps
//! its candidate, prompts, verdict, and metadata so a failed run can be
//! audited attempt by attempt.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::verdict::{FailCategory, Verdict};

/// Metadata for one attempt (`meta.json`).
#[derive(Debug, Clone, Serialize)]
pub struct AttemptMeta {
    pub target: String,
    /// 1-indexed attempt number.
    pub attempt: u32,
    pub passed: bool,
    pub category: Option<FailCategory>,
    pub duration_ms: u64,
}

/// Resolved paths for one attempt's products.
#[derive(Debug, Clone)]
pub struct AttemptPaths {
    pub dir: PathBuf,
    pub candidate_path: PathBuf,
    pub plan_path: PathBuf,
    pub prompt_path: PathBuf,
    pub verdict_path: PathBuf,
    pub feedback_path: PathBuf,
    pub meta_path: PathBuf,
    pub planner_log_path: PathBuf,
    pub author_log_path: PathBuf,
    pub reflector_log_path: PathBuf,
    pub sandbox_log_path: PathBuf,
}

impl AttemptPaths {
    pub fn new(root: &Path, target: &str, attempt: u32) -> Self {
        let dir = root
            .join(".forge")
            .join("runs")
            .join(target)
            .join(attempt.to_string());
        Self {
            dir: dir.clone(),
            candidate_path: dir.join("candidate.py"),
            plan_path: dir.join("plan.md"),
            prompt_path: dir.join("prompt.md"),
            verdict_path: dir.join("verdict.json"),
            feedback_path: dir.join("feedback.md"),
            meta_path: dir.join("meta.json"),
            planner_log_path: dir.join("planner.log"),
            author_log_path: dir.join("author.log"),
            reflector_log_path: dir.join("reflector.log"),
            sandbox_log_path: dir.join("sandbox.log"),
        }
    }

    pub fn create_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create attempt dir {}", self.dir.display()))
    }
}

/// Write the authoring products: the candidate source, the prompt that
/// produced it, and the strategy notes when present.
pub fn write_authoring(
    paths: &AttemptPaths,
    candidate: &str,
    prompt: &str,
    plan: Option<&str>,
) -> Result<()> {
    paths.create_dir()?;
    write_text(&paths.candidate_path, candidate)?;
    write_text(&paths.prompt_path, prompt)?;
    if let Some(plan) = plan {
        write_text(&paths.plan_path, plan)?;
    }
    Ok(())
}

/// Write the validation verdict and attempt metadata.
pub fn write_verdict(paths: &AttemptPaths, verdict: &Verdict, meta: &AttemptMeta) -> Result<()> {
    paths.create_dir()?;
    write_json(&paths.verdict_path, verdict)?;
    write_json(&paths.meta_path, meta)
}

/// Write the reflection feedback that will guide the next attempt.
pub fn write_feedback(paths: &AttemptPaths, feedback: &str) -> Result<()> {
    paths.create_dir()?;
    write_text(&paths.feedback_path, feedback)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    write_text(path, &buf)
}
