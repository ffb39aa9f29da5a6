// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executor drivers: the codex-like and opencode-like CLI coders behind
//! one `run(prompt, model, timeout)` interface. External workers speak
//! the same contract out of process and report back over HTTP.

pub mod codex;
pub mod opencode;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use af_core::{ExecutorKind, Reason};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::subprocess::ExecOutput;

/// Result of one executor run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub ok: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl From<ExecOutput> for RunOutcome {
    fn from(output: ExecOutput) -> Self {
        Self {
            ok: output.ok(),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            timed_out: output.timed_out,
        }
    }
}

/// Errors raised before a run produces any output.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("executor binary not found: {0}")]
    MissingBinary(String),
    #[error("spawn failed: {0}")]
    Spawn(String),
}

impl ExecutorError {
    pub fn reason(&self) -> Reason {
        match self {
            ExecutorError::MissingBinary(_) => Reason::MissingBinary,
            ExecutorError::Spawn(_) => Reason::ExecutorError,
        }
    }

    pub(crate) fn from_io(binary: &str, e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            ExecutorError::MissingBinary(binary.to_string())
        } else {
            ExecutorError::Spawn(e.to_string())
        }
    }
}

/// A CLI coder the scheduler can hand prompts to.
#[async_trait]
pub trait ExecutorDriver: Send + Sync {
    fn kind(&self) -> ExecutorKind;

    /// Cheap liveness probe (binary present and responsive).
    async fn health(&self) -> bool;

    async fn run(
        &self,
        prompt: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<RunOutcome, ExecutorError>;
}

/// Map a completed run to a failure reason, if it failed.
///
/// Timeouts win over everything; after that, stderr is sniffed for the
/// model-layer failures the requeue ladder acts on.
pub fn classify_run(outcome: &RunOutcome) -> Option<Reason> {
    if outcome.timed_out {
        return Some(Reason::Timeout);
    }
    if outcome.ok {
        return None;
    }

    let haystack = format!("{}\n{}", outcome.stderr, outcome.stdout);
    let lower = haystack.to_lowercase();

    let sniffed = [
        ("rate limit", Reason::RateLimited),
        ("429", Reason::RateLimited),
        ("too many requests", Reason::RateLimited),
        ("unauthorized", Reason::Unauthorized),
        ("401", Reason::Unauthorized),
        ("forbidden", Reason::Forbidden),
        ("403", Reason::Forbidden),
        ("network", Reason::NetworkError),
        ("connection refused", Reason::NetworkError),
        ("dns", Reason::NetworkError),
        ("unknown subcommand", Reason::WrongSubcommand),
        ("unrecognized subcommand", Reason::WrongSubcommand),
        ("bun install", Reason::OccliBunInstallFailed),
    ];
    for (needle, reason) in sniffed {
        if lower.contains(needle) {
            return Some(reason);
        }
    }

    Some(Reason::ExecutorError)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
