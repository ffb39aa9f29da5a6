// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted fake executor for tests.

use af_core::ExecutorKind;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use super::{ExecutorDriver, ExecutorError, RunOutcome};

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub prompt: String,
    pub model: String,
    pub timeout: Duration,
}

/// A driver that replays scripted outcomes and records its invocations.
///
/// When the script runs dry, every further run succeeds with empty output.
#[derive(Clone)]
pub struct FakeExecutor {
    kind: ExecutorKind,
    script: Arc<Mutex<VecDeque<Result<RunOutcome, String>>>>,
    runs: Arc<Mutex<Vec<RecordedRun>>>,
    healthy: Arc<Mutex<bool>>,
}

impl FakeExecutor {
    pub fn new(kind: ExecutorKind) -> Self {
        Self {
            kind,
            script: Arc::new(Mutex::new(VecDeque::new())),
            runs: Arc::new(Mutex::new(Vec::new())),
            healthy: Arc::new(Mutex::new(true)),
        }
    }

    /// Queue the next outcome.
    pub fn push_outcome(&self, outcome: RunOutcome) {
        self.script.lock().push_back(Ok(outcome));
    }

    /// Queue a spawn-level failure.
    pub fn push_error(&self, message: impl Into<String>) {
        self.script.lock().push_back(Err(message.into()));
    }

    pub fn set_healthy(&self, healthy: bool) {
        *self.healthy.lock() = healthy;
    }

    pub fn runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().clone()
    }

    /// Convenience: a successful outcome with the given stdout.
    pub fn done(stdout: impl Into<String>) -> RunOutcome {
        RunOutcome {
            ok: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
            timed_out: false,
        }
    }

    /// Convenience: a failed outcome with the given stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> RunOutcome {
        RunOutcome {
            ok: false,
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
            timed_out: false,
        }
    }

    /// Convenience: a timed-out outcome.
    pub fn timed_out() -> RunOutcome {
        RunOutcome {
            ok: false,
            exit_code: None,
            stdout: String::new(),
            stderr: "timed out".to_string(),
            timed_out: true,
        }
    }
}

#[async_trait]
impl ExecutorDriver for FakeExecutor {
    fn kind(&self) -> ExecutorKind {
        self.kind
    }

    async fn health(&self) -> bool {
        *self.healthy.lock()
    }

    async fn run(
        &self,
        prompt: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<RunOutcome, ExecutorError> {
        self.runs.lock().push(RecordedRun {
            prompt: prompt.to_string(),
            model: model.to_string(),
            timeout,
        });

        match self.script.lock().pop_front() {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(ExecutorError::Spawn(message)),
            None => Ok(FakeExecutor::done("")),
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
