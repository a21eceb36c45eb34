//! Scripted command runner for tests

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::runner::{CommandOutput, CommandRunner, RunOutcome};

/// Replays a fixed sequence of outcomes and records every call.
/// Once the script runs out every call succeeds with empty output.
pub(crate) struct ScriptedRunner {
    outcomes: Mutex<Vec<RunOutcome>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub(crate) fn new(outcomes: Vec<RunOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        _program: &str,
        args: &[String],
        _env: &HashMap<String, String>,
        _timeout: Duration,
    ) -> std::io::Result<RunOutcome> {
        self.calls.lock().push(args.to_vec());
        let mut outcomes = self.outcomes.lock();
        if outcomes.is_empty() {
            return Ok(ok(""));
        }
        Ok(outcomes.remove(0))
    }
}

pub(crate) fn failed(stderr: &str) -> RunOutcome {
    RunOutcome::Finished(CommandOutput {
        status: Some(1),
        stdout: String::new(),
        stderr: stderr.to_string(),
    })
}

pub(crate) fn ok(stdout: &str) -> RunOutcome {
    RunOutcome::Finished(CommandOutput {
        status: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    })
}
