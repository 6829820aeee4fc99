//! Code Author: turns a task description into one candidate source unit.
//!
//! Internally this makes two sequential generation calls, one to derive a
//! parsing strategy and one to render that strategy into code, but the
//! orchestrator sees a single `author` operation. There are no internal
//! retries: any failure of the underlying service surfaces to the caller,
//! which maps it to a generation-error verdict.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info};

use crate::io::generator::{GenRequest, Generator};
use crate::io::prompt::{PromptBuilder, PromptInputs};

/// Settings for one authoring attempt.
#[derive(Debug, Clone)]
pub struct AuthorSettings {
    pub prompt_budget_bytes: usize,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
    pub planner_log_path: PathBuf,
    pub author_log_path: PathBuf,
}

/// Product of one authoring attempt.
#[derive(Debug, Clone)]
pub struct Authored {
    /// The candidate source unit.
    pub candidate: String,
    /// Strategy notes from the planning call.
    pub plan: String,
    /// The code-synthesis prompt that produced the candidate.
    pub prompt: String,
}

/// Author one candidate: strategy call, then code call.
pub fn author<G: Generator>(
    generator: &G,
    inputs: &PromptInputs,
    settings: &AuthorSettings,
) -> Result<Authored> {
    let builder = PromptBuilder::new(settings.prompt_budget_bytes);

    let planner_prompt = builder.build_planner(inputs).render();
    info!("requesting parsing strategy");
    let plan = generator
        .complete(&GenRequest {
            prompt: planner_prompt,
            log_path: settings.planner_log_path.clone(),
            timeout: settings.timeout,
            output_limit_bytes: settings.output_limit_bytes,
        })
        .context("strategy synthesis")?;

    let author_prompt = builder.build_author(inputs, Some(&plan)).render();
    info!("requesting candidate code");
    let response = generator
        .complete(&GenRequest {
            prompt: author_prompt.clone(),
            log_path: settings.author_log_path.clone(),
            timeout: settings.timeout,
            output_limit_bytes: settings.output_limit_bytes,
        })
        .context("code synthesis")?;

    let candidate = strip_code_fences(&response);
    debug!(bytes = candidate.len(), "candidate authored");
    Ok(Authored {
        candidate,
        plan: plan.trim().to_string(),
        prompt: author_prompt,
    })
}

/// Extract the first fenced code block, or the whole response when unfenced.
fn strip_code_fences(response: &str) -> String {
    static FENCE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```(?:python)?[ \t]*\n(.*?)```").unwrap());
    match FENCE_RE.captures(response) {
        Some(caps) => caps.get(1).unwrap().as_str().trim().to_string(),
        None => response.trim().to_string(),
    }
}
