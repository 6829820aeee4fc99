//! Durable storage for the final parser artifact.
//!
//! Only a candidate that passed validation is persisted here: the existence
//! of `parsers/<target>.py` implies the parser reproduced the expected table
//! exactly. Failing candidates stay under the per-attempt run directories.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

/// Addressable location of a target's parser artifact.
pub fn artifact_path(out_dir: &Path, target: &str) -> PathBuf {
    out_dir.join(format!("{target}.py"))
}

/// Atomically persist the validated candidate (temp file + rename).
pub fn persist_artifact(out_dir: &Path, target: &str, code: &str) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("create artifact dir {}", out_dir.display()))?;
    let path = artifact_path(out_dir, target);
    let tmp_path = path.with_extension("py.tmp");
    let mut contents = code.to_string();
    if !contents.ends_with('\n') {
        contents.push('\n');
    }
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp artifact {}", tmp_path.display()))?;
    fs::rename(&tmp_path, &path)
        .with_context(|| format!("replace artifact {}", path.display()))?;
    info!(path = %path.display(), "artifact persisted");
    Ok(path)
}
