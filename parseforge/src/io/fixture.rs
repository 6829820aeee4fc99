//! Fixture resolution: the sample document and expected table for a target.
//!
//! Fixtures live under `<fixtures_dir>/<target>/` with either plain or
//! target-prefixed names (both naming conventions are accepted). A missing
//! fixture is a configuration error, fatal before the loop starts: no
//! candidate-dependent retry can fix it.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::table::Table;

/// Missing or unresolvable fixture pair. Surfaced as a typed error so the
/// CLI can map it to the configuration exit code.
#[derive(Debug)]
pub struct MissingFixtureError {
    pub target: String,
    pub dir: PathBuf,
    pub what: &'static str,
}

impl fmt::Display for MissingFixtureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "missing fixture for target '{}': no {} found under {}",
            self.target,
            self.what,
            self.dir.display()
        )
    }
}

impl std::error::Error for MissingFixtureError {}

/// Resolved fixture pair for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixturePaths {
    /// Sample input document (`.pdf` or `.txt`).
    pub sample: PathBuf,
    /// Expected output table (`.csv`).
    pub expected: PathBuf,
}

/// Resolve the fixture pair for `target`, trying prefixed names first.
pub fn resolve_fixture(fixtures_dir: &Path, target: &str) -> Result<FixturePaths> {
    let dir = fixtures_dir.join(target);
    let sample = first_existing(
        &dir,
        &[
            format!("{target}_sample.pdf"),
            format!("{target}_sample.txt"),
            "sample.pdf".to_string(),
            "sample.txt".to_string(),
        ],
    )
    .ok_or_else(|| MissingFixtureError {
        target: target.to_string(),
        dir: dir.clone(),
        what: "sample document",
    })?;
    let expected = first_existing(
        &dir,
        &[
            format!("{target}_expected.csv"),
            format!("{target}_sample.csv"),
            "expected.csv".to_string(),
            "sample.csv".to_string(),
        ],
    )
    .ok_or_else(|| MissingFixtureError {
        target: target.to_string(),
        dir: dir.clone(),
        what: "expected table",
    })?;

    debug!(sample = %sample.display(), expected = %expected.display(), "fixture resolved");
    Ok(FixturePaths { sample, expected })
}

/// Load the expected table from its CSV fixture.
pub fn load_expected(path: &Path) -> Result<Table> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("read expected table {}", path.display()))?;
    Table::from_csv(&contents).with_context(|| format!("parse expected table {}", path.display()))
}

fn first_existing(dir: &Path, names: &[String]) -> Option<PathBuf> {
    names
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_fixture_is_a_typed_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = resolve_fixture(temp.path(), "t2").unwrap_err();
        let missing = err
            .downcast_ref::<MissingFixtureError>()
            .expect("typed error");
        assert_eq!(missing.target, "t2");
        assert_eq!(missing.what, "sample document");
    }

    #[test]
    fn expected_table_must_also_exist() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("t1");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("sample.txt"), "text").expect("write");
        let err = resolve_fixture(temp.path(), "t1").unwrap_err();
        let missing = err
            .downcast_ref::<MissingFixtureError>()
            .expect("typed error");
        assert_eq!(missing.what, "expected table");
    }

    #[test]
    fn plain_names_resolve() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("t1");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("sample.txt"), "text").expect("write");
        fs::write(dir.join("expected.csv"), "a\n1\n").expect("write");
        let paths = resolve_fixture(temp.path(), "t1").expect("resolve");
        assert!(paths.sample.ends_with("sample.txt"));
        assert!(paths.expected.ends_with("expected.csv"));
    }

    #[test]
    fn prefixed_names_take_precedence() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("t1");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("sample.txt"), "plain").expect("write");
        fs::write(dir.join("t1_sample.txt"), "prefixed").expect("write");
        fs::write(dir.join("t1_sample.csv"), "a\n1\n").expect("write");
        let paths = resolve_fixture(temp.path(), "t1").expect("resolve");
        assert!(paths.sample.ends_with("t1_sample.txt"));
        assert!(paths.expected.ends_with("t1_sample.csv"));
    }

    #[test]
    fn load_expected_parses_csv() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("expected.csv");
        fs::write(&path, "date,amount\n01-02-2024,4.50\n").expect("write");
        let table = load_expected(&path).expect("load");
        assert_eq!(table.columns, vec!["date", "amount"]);
        assert_eq!(table.rows.len(), 1);
    }
}
