//! Reflection: turn a failed attempt into corrective feedback for the next
//! one.
//!
//! Reflection is best-effort. A reflection failure never consumes an attempt
//! and never stops the run; the loop degrades to a blind retry with no
//! feedback.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use crate::io::generator::{GenRequest, Generator};
use crate::io::prompt::{PromptBuilder, PromptInputs};

/// Settings for one reflection call.
#[derive(Debug, Clone)]
pub struct ReflectorSettings {
    pub prompt_budget_bytes: usize,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
    pub log_path: PathBuf,
}

/// Produce feedback for the next attempt from the failure diagnostic and the
/// failing candidate. Returns `None` when reflection itself fails or yields
/// nothing usable.
pub fn reflect<G: Generator>(
    generator: &G,
    inputs: &PromptInputs,
    diagnostic: &str,
    candidate: &str,
    settings: &ReflectorSettings,
) -> Option<String> {
    let prompt = PromptBuilder::new(settings.prompt_budget_bytes)
        .build_reflector(inputs, diagnostic, candidate)
        .render();
    let response = generator.complete(&GenRequest {
        prompt,
        log_path: settings.log_path.clone(),
        timeout: settings.timeout,
        output_limit_bytes: settings.output_limit_bytes,
    });
    match response {
        Ok(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                warn!("reflection returned no feedback, retrying blind");
                None
            } else {
                info!(bytes = trimmed.len(), "reflection feedback produced");
                Some(trimmed.to_string())
            }
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), "reflection failed, retrying blind");
            None
        }
    }
}
