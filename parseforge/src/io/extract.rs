//! Text extraction from sample documents.
//!
//! Plain-text samples are read directly; PDFs are delegated to `pdftotext`.
//! Extraction mechanics stay opaque behind this one function.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use crate::io::process::{command_from_argv, run_with_timeout};

/// Extract the sample document's text for the planning and authoring prompts.
pub fn extract_text(path: &Path, timeout: Duration, output_limit_bytes: usize) -> Result<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "txt" => {
            debug!(path = %path.display(), "reading plain-text sample");
            std::fs::read_to_string(path)
                .with_context(|| format!("read sample {}", path.display()))
        }
        "pdf" => extract_pdf(path, timeout, output_limit_bytes),
        other => Err(anyhow!(
            "unsupported sample format '.{other}' for {}",
            path.display()
        )),
    }
}

fn extract_pdf(path: &Path, timeout: Duration, output_limit_bytes: usize) -> Result<String> {
    info!(path = %path.display(), "extracting pdf text");
    let argv = vec![
        "pdftotext".to_string(),
        "-layout".to_string(),
        path.display().to_string(),
        "-".to_string(),
    ];
    let cmd = command_from_argv(&argv)?;
    let output = run_with_timeout(cmd, None, timeout, output_limit_bytes)
        .with_context(|| format!("run pdftotext on {}", path.display()))?;
    if output.timed_out {
        return Err(anyhow!("pdftotext timed out after {:?}", timeout));
    }
    if !output.status.success() {
        return Err(anyhow!(
            "pdftotext failed with status {:?}: {}",
            output.status.code(),
            output.stderr_lossy().trim()
        ));
    }
    Ok(output.stdout_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_samples_pass_through() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("sample.txt");
        std::fs::write(&path, "01-02-2024 coffee 4.50\n").expect("write");
        let text = extract_text(&path, Duration::from_secs(5), 100_000).expect("extract");
        assert_eq!(text, "01-02-2024 coffee 4.50\n");
    }

    #[test]
    fn unsupported_formats_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("sample.docx");
        std::fs::write(&path, "irrelevant").expect("write");
        let err = extract_text(&path, Duration::from_secs(5), 100_000).unwrap_err();
        assert!(err.to_string().contains("unsupported sample format"));
    }
}
