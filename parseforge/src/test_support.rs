//! Scripted doubles and fixture helpers for tests.
//!
//! Compiled for this crate's own tests and, via the `test-support` feature,
//! for downstream integration tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};

use crate::io::generator::{GenRequest, Generator};
use crate::io::sandbox::{CandidateFault, Sandbox, SandboxOutcome, SandboxRequest};

/// One scripted generation response.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Text(String),
    Error(String),
}

impl ScriptedResponse {
    pub fn text(text: &str) -> Self {
        ScriptedResponse::Text(text.to_string())
    }

    pub fn error(message: &str) -> Self {
        ScriptedResponse::Error(message.to_string())
    }
}

/// Generator that replays scripted responses in order and records every
/// prompt it was handed. An exhausted script fails the call, which the loop
/// treats like any other service failure.
pub struct ScriptedGenerator {
    responses: RefCell<VecDeque<ScriptedResponse>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Generator for ScriptedGenerator {
    fn complete(&self, request: &GenRequest) -> Result<String> {
        self.prompts.borrow_mut().push(request.prompt.clone());
        match self.responses.borrow_mut().pop_front() {
            Some(ScriptedResponse::Text(text)) => Ok(text),
            Some(ScriptedResponse::Error(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted generator exhausted")),
        }
    }
}

/// Sandbox that replays scripted outcomes without spawning an interpreter.
pub struct ScriptedSandbox {
    outcomes: RefCell<VecDeque<SandboxOutcome>>,
    invocations: RefCell<usize>,
}

impl ScriptedSandbox {
    pub fn new(outcomes: Vec<SandboxOutcome>) -> Self {
        Self {
            outcomes: RefCell::new(outcomes.into()),
            invocations: RefCell::new(0),
        }
    }

    pub fn invocations(&self) -> usize {
        *self.invocations.borrow()
    }
}

impl Sandbox for ScriptedSandbox {
    fn invoke(&self, _request: &SandboxRequest) -> Result<SandboxOutcome> {
        *self.invocations.borrow_mut() += 1;
        self.outcomes
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted sandbox exhausted"))
    }
}

/// A clean run: the candidate's table is on stdout as CSV.
pub fn ok_outcome(stdout: &str) -> SandboxOutcome {
    SandboxOutcome {
        fault: None,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

/// A classified candidate fault with the given stderr.
pub fn fault_outcome(fault: CandidateFault, stderr: &str) -> SandboxOutcome {
    SandboxOutcome {
        fault: Some(fault),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// Write a plain-text sample and expected CSV for `target` under
/// `<fixtures_dir>/<target>/`.
pub fn write_fixture(fixtures_dir: &Path, target: &str, sample: &str, expected_csv: &str) {
    let dir = fixtures_dir.join(target);
    fs::create_dir_all(&dir).expect("create fixture dir");
    fs::write(dir.join("sample.txt"), sample).expect("write sample");
    fs::write(dir.join("expected.csv"), expected_csv).expect("write expected");
}
