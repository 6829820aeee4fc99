//! The generation loop state machine.
//!
//! One run drives Planning -> Authoring -> Validating and either stops on a
//! passing verdict, transitions to Reflecting -> Authoring on a recoverable
//! failure, or stops exhausted once the attempt cap is hit. Attempts are
//! counted at authoring time, so a generation-service failure consumes an
//! attempt like any other. Cancellation is observed at stage boundaries only.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{info, warn};

use crate::author::{AuthorSettings, author};
use crate::core::state::{AttemptOutcome, AttemptRecord, CancelToken, RunState, Stage};
use crate::core::verdict::{FailCategory, FailDiagnostic, Verdict};
use crate::io::artifact::persist_artifact;
use crate::io::config::ForgeConfig;
use crate::io::extract::extract_text;
use crate::io::fixture::{FixturePaths, load_expected, resolve_fixture};
use crate::io::generator::Generator;
use crate::io::prompt::{PromptInputs, excerpt};
use crate::io::report::{AttemptMeta, AttemptPaths, write_authoring, write_feedback, write_verdict};
use crate::io::sandbox::Sandbox;
use crate::reflector::{ReflectorSettings, reflect};
use crate::validator::{ValidationRequest, validate};

/// Run-level settings resolved by the CLI.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Directory holding per-target fixture subdirectories.
    pub fixtures_dir: PathBuf,
    /// Directory validated parser artifacts are persisted into.
    pub out_dir: PathBuf,
    pub config: ForgeConfig,
}

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStop {
    /// A candidate reproduced the expected table exactly.
    Success { artifact: PathBuf },
    /// The attempt cap was reached without a passing candidate.
    Exhausted,
    /// Cancellation observed before entering `stage`.
    Aborted { stage: Stage },
}

/// Final report for one run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub target: String,
    pub attempt_count: u32,
    /// Ordered per-attempt records, one per consumed attempt.
    pub attempts: Vec<AttemptRecord>,
    pub stop: RunStop,
}

/// Drive the full generation loop for one target.
///
/// `on_attempt` is called after every validated attempt, in order, with its
/// record. Recoverable candidate failures never surface as errors here; an
/// `Err` means the run could not be set up (fixture, extraction) or the
/// orchestrator itself failed to write a run product.
pub fn run_loop<G, S, F>(
    root: &Path,
    target: &str,
    generator: &G,
    sandbox: &S,
    settings: &LoopSettings,
    cancel: &CancelToken,
    mut on_attempt: F,
) -> Result<RunOutcome>
where
    G: Generator,
    S: Sandbox,
    F: FnMut(&AttemptRecord),
{
    let cfg = &settings.config;
    let fixture = resolve_fixture(&settings.fixtures_dir, target)?;
    let source_text = extract_text(
        &fixture.sample,
        Duration::from_secs(cfg.extract_timeout_secs),
        cfg.output_limit_bytes,
    )?;
    let expected = load_expected(&fixture.expected)?;
    info!(
        target,
        schema = %expected.schema_summary(),
        "run starting"
    );

    let mut state = RunState::new(target, source_text, expected);
    let mut stage = Stage::Planning;
    let mut task = String::new();
    // Authoring failure carried into Validating as a ready-made verdict.
    let mut pending_failure: Option<FailDiagnostic> = None;

    loop {
        if cancel.is_cancelled() {
            warn!(stage = stage.as_str(), "run cancelled");
            return Ok(finish(state, RunStop::Aborted { stage }));
        }
        match stage {
            Stage::Planning => {
                task = task_description(&state);
                stage = Stage::Authoring;
            }
            Stage::Authoring => {
                state.attempt_count += 1;
                let attempt = state.attempt_count;
                info!(attempt, max_attempts = cfg.max_attempts, "authoring");
                let paths = AttemptPaths::new(root, target, attempt);
                let inputs = prompt_inputs(&state, &task, cfg);
                let author_settings = AuthorSettings {
                    prompt_budget_bytes: cfg.prompt_budget_bytes,
                    timeout: Duration::from_secs(cfg.generation_timeout_secs),
                    output_limit_bytes: cfg.output_limit_bytes,
                    planner_log_path: paths.planner_log_path.clone(),
                    author_log_path: paths.author_log_path.clone(),
                };
                match author(generator, &inputs, &author_settings) {
                    Ok(authored) => {
                        write_authoring(
                            &paths,
                            &authored.candidate,
                            &authored.prompt,
                            Some(&authored.plan),
                        )?;
                        state.candidate_code = authored.candidate;
                        pending_failure = None;
                    }
                    Err(err) => {
                        warn!(attempt, error = %format!("{err:#}"), "authoring failed");
                        paths.create_dir()?;
                        state.candidate_code.clear();
                        pending_failure = Some(FailDiagnostic::new(
                            FailCategory::GenerationError,
                            format!("{err:#}"),
                        ));
                    }
                }
                stage = Stage::Validating;
            }
            Stage::Validating => {
                let attempt = state.attempt_count;
                let paths = AttemptPaths::new(root, target, attempt);
                let started = Instant::now();
                let verdict = match pending_failure.take() {
                    Some(diagnostic) => Verdict::Fail(diagnostic),
                    None => validate(sandbox, &validation_request(&state, &fixture, &paths, cfg))?,
                };
                let record = attempt_record(attempt, &verdict);
                write_verdict(
                    &paths,
                    &verdict,
                    &AttemptMeta {
                        target: target.to_string(),
                        attempt,
                        passed: verdict.is_pass(),
                        category: match &verdict {
                            Verdict::Pass { .. } => None,
                            Verdict::Fail(diag) => Some(diag.category),
                        },
                        duration_ms: started.elapsed().as_millis() as u64,
                    },
                )?;
                state.attempts.push(record.clone());
                on_attempt(&record);
                match verdict {
                    Verdict::Pass { .. } => {
                        state.succeeded = true;
                        state.feedback = None;
                        state.last_error = None;
                        let artifact =
                            persist_artifact(&settings.out_dir, target, &state.candidate_code)?;
                        info!(attempt, artifact = %artifact.display(), "run succeeded");
                        return Ok(finish(state, RunStop::Success { artifact }));
                    }
                    Verdict::Fail(diagnostic) => {
                        warn!(
                            attempt,
                            category = diagnostic.category.as_str(),
                            "attempt failed"
                        );
                        state.last_error = Some(diagnostic);
                        if state.attempt_count >= cfg.max_attempts {
                            warn!(attempts = state.attempt_count, "attempt cap reached");
                            return Ok(finish(state, RunStop::Exhausted));
                        }
                        stage = Stage::Reflecting;
                    }
                }
            }
            Stage::Reflecting => {
                let paths = AttemptPaths::new(root, target, state.attempt_count);
                let inputs = prompt_inputs(&state, &task, cfg);
                let diagnostic = state
                    .last_error
                    .as_ref()
                    .map(FailDiagnostic::render)
                    .unwrap_or_default();
                // Supersedes the previous feedback entirely; a failed
                // reflection leaves the next attempt blind.
                state.feedback = reflect(
                    generator,
                    &inputs,
                    &diagnostic,
                    &state.candidate_code,
                    &ReflectorSettings {
                        prompt_budget_bytes: cfg.prompt_budget_bytes,
                        timeout: Duration::from_secs(cfg.generation_timeout_secs),
                        output_limit_bytes: cfg.output_limit_bytes,
                        log_path: paths.reflector_log_path.clone(),
                    },
                );
                if let Some(feedback) = &state.feedback {
                    write_feedback(&paths, feedback)?;
                }
                stage = Stage::Authoring;
            }
        }
    }
}

fn finish(state: RunState, stop: RunStop) -> RunOutcome {
    RunOutcome {
        target: state.target_id,
        attempt_count: state.attempt_count,
        attempts: state.attempts,
        stop,
    }
}

/// Task description handed to every prompt; derived once per run from the
/// target and the expected schema.
fn task_description(state: &RunState) -> String {
    format!(
        "Write a parser for '{}' documents. Given the path of one document, \
         return a table with exactly this schema: {}. The document sample \
         below must parse to the expected output sample exactly.",
        state.target_id,
        state.expected.schema_summary()
    )
}

fn prompt_inputs(state: &RunState, task: &str, cfg: &ForgeConfig) -> PromptInputs {
    PromptInputs {
        task: task.to_string(),
        schema: state.expected.schema_summary(),
        source_excerpt: excerpt(&state.source_text, cfg.source_excerpt_bytes),
        expected_sample: state.expected.sample_csv(cfg.expected_sample_rows),
        feedback: state.feedback.clone(),
    }
}

fn validation_request<'a>(
    state: &'a RunState,
    fixture: &'a FixturePaths,
    paths: &'a AttemptPaths,
    cfg: &ForgeConfig,
) -> ValidationRequest<'a> {
    ValidationRequest {
        candidate: &state.candidate_code,
        candidate_path: &paths.candidate_path,
        input_path: &fixture.sample,
        work_dir: &paths.dir,
        log_path: &paths.sandbox_log_path,
        expected: &state.expected,
        timeout: Duration::from_secs(cfg.candidate_timeout_secs),
        output_limit_bytes: cfg.output_limit_bytes,
    }
}

fn attempt_record(attempt: u32, verdict: &Verdict) -> AttemptRecord {
    let outcome = match verdict {
        Verdict::Pass { .. } => AttemptOutcome::Passed,
        Verdict::Fail(diagnostic) => AttemptOutcome::Failed {
            category: diagnostic.category,
            diagnostic: diagnostic.render(),
        },
    };
    AttemptRecord { attempt, outcome }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::core::verdict::FailCategory;
    use crate::io::fixture::MissingFixtureError;
    use crate::io::sandbox::CandidateFault;
    use crate::test_support::{
        ScriptedGenerator, ScriptedResponse, ScriptedSandbox, fault_outcome, ok_outcome,
        write_fixture,
    };

    const EXPECTED_CSV: &str = "date,description,amount\n01-02-2024,coffee,4.5\n";
    const SAMPLE_TEXT: &str = "01-02-2024 coffee 4.50\n";
    const CANDIDATE: &str = "def parse(input_path):\n    ...\n";

    fn settings(root: &Path) -> LoopSettings {
        LoopSettings {
            fixtures_dir: root.join("fixtures"),
            out_dir: root.join("parsers"),
            config: ForgeConfig::default(),
        }
    }

    fn plan_and_code() -> Vec<ScriptedResponse> {
        vec![
            ScriptedResponse::text("1. split on whitespace"),
            ScriptedResponse::text(CANDIDATE),
        ]
    }

    #[test]
    fn first_attempt_success_persists_the_artifact() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        write_fixture(&root.join("fixtures"), "bank1", SAMPLE_TEXT, EXPECTED_CSV);
        let generator = ScriptedGenerator::new(plan_and_code());
        let sandbox = ScriptedSandbox::new(vec![ok_outcome(EXPECTED_CSV)]);

        let outcome = run_loop(
            root,
            "bank1",
            &generator,
            &sandbox,
            &settings(root),
            &CancelToken::new(),
            |_| {},
        )
        .expect("run");

        assert_eq!(outcome.attempt_count, 1);
        assert_eq!(outcome.attempts.len(), 1);
        assert!(outcome.attempts[0].passed());
        match outcome.stop {
            RunStop::Success { artifact } => {
                assert_eq!(artifact, root.join("parsers").join("bank1.py"));
                let persisted = fs::read_to_string(&artifact).expect("read artifact");
                assert!(persisted.starts_with("def parse(input_path):"));
            }
            other => panic!("expected success, got {other:?}"),
        }
        // Run products for the attempt exist alongside the artifact.
        let attempt_dir = root.join(".forge/runs/bank1/1");
        assert!(attempt_dir.join("candidate.py").is_file());
        assert!(attempt_dir.join("verdict.json").is_file());
        assert!(attempt_dir.join("meta.json").is_file());
    }

    /// The cap is strict: three failing attempts stop the run with every
    /// diagnostic preserved in order, and no artifact is written.
    #[test]
    fn persistent_failure_exhausts_after_three_attempts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        write_fixture(&root.join("fixtures"), "bank1", SAMPLE_TEXT, EXPECTED_CSV);
        let generator = ScriptedGenerator::new(vec![
            ScriptedResponse::text("plan 1"),
            ScriptedResponse::text(CANDIDATE),
            ScriptedResponse::text("feedback 1"),
            ScriptedResponse::text("plan 2"),
            ScriptedResponse::text(CANDIDATE),
            ScriptedResponse::text("feedback 2"),
            ScriptedResponse::text("plan 3"),
            ScriptedResponse::text(CANDIDATE),
        ]);
        let sandbox = ScriptedSandbox::new(vec![
            fault_outcome(CandidateFault::Runtime, "fault 1"),
            fault_outcome(CandidateFault::Runtime, "fault 2"),
            fault_outcome(CandidateFault::Runtime, "fault 3"),
        ]);

        let mut seen = Vec::new();
        let outcome = run_loop(
            root,
            "bank1",
            &generator,
            &sandbox,
            &settings(root),
            &CancelToken::new(),
            |record| seen.push(record.clone()),
        )
        .expect("run");

        assert_eq!(outcome.stop, RunStop::Exhausted);
        assert_eq!(outcome.attempt_count, 3);
        assert_eq!(seen.len(), 3);
        for (idx, record) in outcome.attempts.iter().enumerate() {
            assert_eq!(record.attempt as usize, idx + 1);
            match &record.outcome {
                AttemptOutcome::Failed {
                    category,
                    diagnostic,
                } => {
                    assert_eq!(*category, FailCategory::Runtime);
                    assert!(diagnostic.contains(&format!("fault {}", idx + 1)));
                }
                AttemptOutcome::Passed => panic!("attempt {} should fail", idx + 1),
            }
        }
        assert!(!root.join("parsers").join("bank1.py").exists());
    }

    #[test]
    fn missing_fixture_fails_before_any_attempt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let generator = ScriptedGenerator::new(Vec::new());
        let sandbox = ScriptedSandbox::new(Vec::new());

        let err = run_loop(
            root,
            "absent",
            &generator,
            &sandbox,
            &settings(root),
            &CancelToken::new(),
            |_| {},
        )
        .unwrap_err();

        let missing = err
            .downcast_ref::<MissingFixtureError>()
            .expect("typed error");
        assert_eq!(missing.target, "absent");
        assert!(generator.prompts().is_empty());
    }

    /// A wrong column name on the first attempt produces a structural
    /// diagnostic naming the column, then the corrected second attempt wins.
    #[test]
    fn column_mismatch_recovers_on_the_second_attempt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        write_fixture(&root.join("fixtures"), "bank1", SAMPLE_TEXT, EXPECTED_CSV);
        let generator = ScriptedGenerator::new(vec![
            ScriptedResponse::text("plan 1"),
            ScriptedResponse::text(CANDIDATE),
            ScriptedResponse::text("rename 'narrative' to 'description'"),
            ScriptedResponse::text("plan 2"),
            ScriptedResponse::text(CANDIDATE),
        ]);
        let sandbox = ScriptedSandbox::new(vec![
            ok_outcome("date,narrative,amount\n01-02-2024,coffee,4.5\n"),
            ok_outcome(EXPECTED_CSV),
        ]);

        let outcome = run_loop(
            root,
            "bank1",
            &generator,
            &sandbox,
            &settings(root),
            &CancelToken::new(),
            |_| {},
        )
        .expect("run");

        assert_eq!(outcome.attempt_count, 2);
        match &outcome.attempts[0].outcome {
            AttemptOutcome::Failed {
                category,
                diagnostic,
            } => {
                assert_eq!(*category, FailCategory::Structural);
                assert!(diagnostic.contains("narrative"));
                assert!(diagnostic.contains("description"));
            }
            AttemptOutcome::Passed => panic!("first attempt should fail"),
        }
        assert!(outcome.attempts[1].passed());
        // The feedback was surfaced to the second authoring prompt.
        let prompts = generator.prompts();
        assert!(prompts[4].contains("rename 'narrative' to 'description'"));
    }

    /// Feedback supersedes: the third authoring prompt carries only the
    /// second reflection, never the first.
    #[test]
    fn later_feedback_replaces_earlier_feedback() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        write_fixture(&root.join("fixtures"), "bank1", SAMPLE_TEXT, EXPECTED_CSV);
        let generator = ScriptedGenerator::new(vec![
            ScriptedResponse::text("plan 1"),
            ScriptedResponse::text(CANDIDATE),
            ScriptedResponse::text("first-reflection-note"),
            ScriptedResponse::text("plan 2"),
            ScriptedResponse::text(CANDIDATE),
            ScriptedResponse::text("second-reflection-note"),
            ScriptedResponse::text("plan 3"),
            ScriptedResponse::text(CANDIDATE),
        ]);
        let sandbox = ScriptedSandbox::new(vec![
            fault_outcome(CandidateFault::Runtime, "fault 1"),
            fault_outcome(CandidateFault::Runtime, "fault 2"),
            fault_outcome(CandidateFault::Runtime, "fault 3"),
        ]);

        run_loop(
            root,
            "bank1",
            &generator,
            &sandbox,
            &settings(root),
            &CancelToken::new(),
            |_| {},
        )
        .expect("run");

        let prompts = generator.prompts();
        // prompts[7] is the third attempt's authoring prompt.
        assert!(prompts[7].contains("second-reflection-note"));
        assert!(!prompts[7].contains("first-reflection-note"));
        assert!(prompts[4].contains("first-reflection-note"));
    }

    /// Generation-service failures consume attempts and surface as
    /// generation-error records instead of stopping the run.
    #[test]
    fn generation_failures_consume_attempts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        write_fixture(&root.join("fixtures"), "bank1", SAMPLE_TEXT, EXPECTED_CSV);
        // Every call fails: authoring errors out, and so does reflection.
        let generator = ScriptedGenerator::new(Vec::new());
        let sandbox = ScriptedSandbox::new(Vec::new());

        let outcome = run_loop(
            root,
            "bank1",
            &generator,
            &sandbox,
            &settings(root),
            &CancelToken::new(),
            |_| {},
        )
        .expect("run");

        assert_eq!(outcome.stop, RunStop::Exhausted);
        assert_eq!(outcome.attempts.len(), 3);
        for record in &outcome.attempts {
            match &record.outcome {
                AttemptOutcome::Failed { category, .. } => {
                    assert_eq!(*category, FailCategory::GenerationError);
                }
                AttemptOutcome::Passed => panic!("should fail"),
            }
        }
    }

    #[test]
    fn pre_cancelled_run_aborts_before_planning() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        write_fixture(&root.join("fixtures"), "bank1", SAMPLE_TEXT, EXPECTED_CSV);
        let generator = ScriptedGenerator::new(Vec::new());
        let sandbox = ScriptedSandbox::new(Vec::new());
        let cancel = CancelToken::new();
        cancel.cancel();

        let outcome = run_loop(
            root,
            "bank1",
            &generator,
            &sandbox,
            &settings(root),
            &cancel,
            |_| {},
        )
        .expect("run");

        assert_eq!(
            outcome.stop,
            RunStop::Aborted {
                stage: Stage::Planning
            }
        );
        assert_eq!(outcome.attempt_count, 0);
        assert!(generator.prompts().is_empty());
    }

    /// Cancellation lands at the next stage boundary: a token cancelled
    /// while validating aborts before reflection runs.
    #[test]
    fn cancellation_is_observed_at_the_next_stage_boundary() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        write_fixture(&root.join("fixtures"), "bank1", SAMPLE_TEXT, EXPECTED_CSV);
        let generator = ScriptedGenerator::new(plan_and_code());
        let sandbox =
            ScriptedSandbox::new(vec![fault_outcome(CandidateFault::Runtime, "fault 1")]);
        let cancel = CancelToken::new();

        let observer = cancel.clone();
        let outcome = run_loop(
            root,
            "bank1",
            &generator,
            &sandbox,
            &settings(root),
            &cancel,
            move |_| observer.cancel(),
        )
        .expect("run");

        assert_eq!(
            outcome.stop,
            RunStop::Aborted {
                stage: Stage::Reflecting
            }
        );
        assert_eq!(outcome.attempt_count, 1);
        // No reflection call was made after the cancel.
        assert_eq!(generator.prompts().len(), 2);
    }

    /// Same fixtures, same scripted responses: two fresh runs stop the same
    /// way and persist byte-identical artifacts.
    #[test]
    fn identical_inputs_give_identical_runs() {
        let run_once = || {
            let temp = tempfile::tempdir().expect("tempdir");
            let root = temp.path();
            write_fixture(&root.join("fixtures"), "bank1", SAMPLE_TEXT, EXPECTED_CSV);
            let generator = ScriptedGenerator::new(plan_and_code());
            let sandbox = ScriptedSandbox::new(vec![ok_outcome(EXPECTED_CSV)]);
            let outcome = run_loop(
                root,
                "bank1",
                &generator,
                &sandbox,
                &settings(root),
                &CancelToken::new(),
                |_| {},
            )
            .expect("run");
            let artifact = fs::read(root.join("parsers").join("bank1.py")).expect("artifact");
            (outcome.attempt_count, outcome.attempts, artifact)
        };

        let first = run_once();
        let second = run_once();
        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
        assert_eq!(first.2, second.2);
    }

    /// An authored response with no code at all is a syntax failure, not an
    /// orchestrator error.
    #[test]
    fn empty_candidate_is_recorded_as_a_syntax_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        write_fixture(&root.join("fixtures"), "bank1", SAMPLE_TEXT, EXPECTED_CSV);
        let generator = ScriptedGenerator::new(vec![
            ScriptedResponse::text("plan 1"),
            ScriptedResponse::text("```python\n```"),
            ScriptedResponse::text("write actual code"),
            ScriptedResponse::text("plan 2"),
            ScriptedResponse::text(CANDIDATE),
        ]);
        let sandbox = ScriptedSandbox::new(vec![ok_outcome(EXPECTED_CSV)]);

        let outcome = run_loop(
            root,
            "bank1",
            &generator,
            &sandbox,
            &settings(root),
            &CancelToken::new(),
            |_| {},
        )
        .expect("run");

        assert_eq!(outcome.attempt_count, 2);
        match &outcome.attempts[0].outcome {
            AttemptOutcome::Failed { category, .. } => {
                assert_eq!(*category, FailCategory::Syntax);
            }
            AttemptOutcome::Passed => panic!("first attempt should fail"),
        }
        assert!(outcome.attempts[1].passed());
    }
}
