//! Bounded parser-generation CLI.
//!
//! `generate <target>` drives the full loop for one target: author a parser
//! via the configured generation command, validate it against the target's
//! fixture pair, reflect on failures, and persist the artifact once a
//! candidate reproduces the expected table exactly.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parseforge::core::state::{AttemptOutcome, CancelToken};
use parseforge::exit_codes;
use parseforge::io::config::{ForgeConfig, load_config, write_config};
use parseforge::io::generator::CommandGenerator;
use parseforge::io::sandbox::PythonSandbox;
use parseforge::orchestrator::{LoopSettings, RunStop, run_loop};
use parseforge::{logging, orchestrator};

const CONFIG_PATH: &str = ".forge/config.toml";

#[derive(Parser)]
#[command(
    name = "parseforge",
    version,
    about = "Self-correcting parser generation against fixture tables"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `.forge/config.toml` if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Generate and validate a parser for one fixture target.
    Generate {
        /// Fixture target id (subdirectory of the fixtures dir).
        target: String,
        /// Directory holding per-target fixture subdirectories.
        #[arg(long, default_value = "data")]
        fixtures_dir: PathBuf,
        /// Directory validated parsers are written into.
        #[arg(long, default_value = "parsers")]
        out_dir: PathBuf,
        /// Override the configured attempt cap.
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Config file path.
        #[arg(long, default_value = CONFIG_PATH)]
        config: PathBuf,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::CONFIG);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(force),
        Command::Generate {
            target,
            fixtures_dir,
            out_dir,
            max_attempts,
            config,
        } => cmd_generate(&target, fixtures_dir, out_dir, max_attempts, &config),
    }
}

fn cmd_init(force: bool) -> Result<i32> {
    let path = Path::new(CONFIG_PATH);
    if path.exists() && !force {
        println!("config already exists at {CONFIG_PATH}");
        return Ok(exit_codes::OK);
    }
    write_config(path, &ForgeConfig::default()).context("write default config")?;
    println!("wrote {CONFIG_PATH}");
    Ok(exit_codes::OK)
}

fn cmd_generate(
    target: &str,
    fixtures_dir: PathBuf,
    out_dir: PathBuf,
    max_attempts: Option<u32>,
    config_path: &Path,
) -> Result<i32> {
    let mut config = load_config(config_path)?;
    if let Some(cap) = max_attempts {
        config.max_attempts = cap;
    }
    config.validate()?;

    let generator = CommandGenerator::new(config.generator.command.clone())?;
    let sandbox = PythonSandbox::new(config.sandbox.command.clone())?;
    let cancel = CancelToken::new();
    let max = config.max_attempts;
    let settings = LoopSettings {
        fixtures_dir,
        out_dir,
        config,
    };

    let outcome = run_loop(
        Path::new("."),
        target,
        &generator,
        &sandbox,
        &settings,
        &cancel,
        |record| match &record.outcome {
            AttemptOutcome::Passed => {
                println!("attempt {}/{}: pass", record.attempt, max);
            }
            AttemptOutcome::Failed { category, .. } => {
                println!(
                    "attempt {}/{}: fail [{}]",
                    record.attempt,
                    max,
                    category.as_str()
                );
            }
        },
    )?;

    report(&outcome);
    Ok(match outcome.stop {
        RunStop::Success { .. } => exit_codes::OK,
        RunStop::Exhausted => exit_codes::EXHAUSTED,
        RunStop::Aborted { .. } => exit_codes::ABORTED,
    })
}

fn report(outcome: &orchestrator::RunOutcome) {
    match &outcome.stop {
        RunStop::Success { artifact } => {
            println!(
                "{}: validated parser after {} attempt(s) -> {}",
                outcome.target,
                outcome.attempt_count,
                artifact.display()
            );
        }
        RunStop::Exhausted => {
            println!(
                "{}: no passing parser after {} attempt(s)",
                outcome.target, outcome.attempt_count
            );
            for record in &outcome.attempts {
                if let AttemptOutcome::Failed { diagnostic, .. } = &record.outcome {
                    println!("--- attempt {} ---", record.attempt);
                    println!("{diagnostic}");
                }
            }
        }
        RunStop::Aborted { stage } => {
            println!(
                "{}: cancelled before {} after {} attempt(s)",
                outcome.target,
                stage.as_str(),
                outcome.attempt_count
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["parseforge", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
    }

    #[test]
    fn parse_generate_defaults() {
        let cli = Cli::parse_from(["parseforge", "generate", "bank1"]);
        match cli.command {
            Command::Generate {
                target,
                fixtures_dir,
                out_dir,
                max_attempts,
                config,
            } => {
                assert_eq!(target, "bank1");
                assert_eq!(fixtures_dir, PathBuf::from("data"));
                assert_eq!(out_dir, PathBuf::from("parsers"));
                assert_eq!(max_attempts, None);
                assert_eq!(config, PathBuf::from(CONFIG_PATH));
            }
            Command::Init { .. } => panic!("expected generate"),
        }
    }

    #[test]
    fn parse_generate_overrides() {
        let cli = Cli::parse_from([
            "parseforge",
            "generate",
            "bank1",
            "--max-attempts",
            "5",
            "--fixtures-dir",
            "fixtures",
        ]);
        match cli.command {
            Command::Generate {
                max_attempts,
                fixtures_dir,
                ..
            } => {
                assert_eq!(max_attempts, Some(5));
                assert_eq!(fixtures_dir, PathBuf::from("fixtures"));
            }
            Command::Init { .. } => panic!("expected generate"),
        }
    }
}
