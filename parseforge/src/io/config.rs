//! Tool configuration stored under `.forge/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Forge configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ForgeConfig {
    /// Authoring attempts permitted per run. The cap is strict and
    /// attempt-counted, not time-counted.
    pub max_attempts: u32,

    /// Wall-clock budget in seconds for one generation-service call.
    pub generation_timeout_secs: u64,

    /// Wall-clock budget in seconds for one candidate execution.
    pub candidate_timeout_secs: u64,

    /// Wall-clock budget in seconds for sample text extraction.
    pub extract_timeout_secs: u64,

    /// Maximum bytes for a prompt pack before dropping sections.
    pub prompt_budget_bytes: usize,

    /// Truncate captured process output beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Bytes of extracted sample text included in prompts.
    pub source_excerpt_bytes: usize,

    /// Expected-table rows included in prompts.
    pub expected_sample_rows: usize,

    pub generator: GeneratorConfig,
    pub sandbox: SandboxConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command invoked per completion; prompt on stdin, response on stdout.
    pub command: Vec<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec!["codex".to_string(), "exec".to_string(), "-".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter command the candidate harness runs under.
    pub command: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            command: vec!["python3".to_string()],
        }
    }
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            generation_timeout_secs: 5 * 60,
            candidate_timeout_secs: 30,
            extract_timeout_secs: 60,
            prompt_budget_bytes: 40_000,
            output_limit_bytes: 100_000,
            source_excerpt_bytes: 2_000,
            expected_sample_rows: 5,
            generator: GeneratorConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl ForgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.generation_timeout_secs == 0 {
            return Err(anyhow!("generation_timeout_secs must be > 0"));
        }
        if self.candidate_timeout_secs == 0 {
            return Err(anyhow!("candidate_timeout_secs must be > 0"));
        }
        if self.extract_timeout_secs == 0 {
            return Err(anyhow!("extract_timeout_secs must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.generator.command.is_empty() || self.generator.command[0].trim().is_empty() {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        if self.sandbox.command.is_empty() || self.sandbox.command[0].trim().is_empty() {
            return Err(anyhow!("sandbox.command must be a non-empty array"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ForgeConfig::default()`.
pub fn load_config(path: &Path) -> Result<ForgeConfig> {
    if !path.exists() {
        let cfg = ForgeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ForgeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ForgeConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
