// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Codex-like executor driver.
//!
//! Invokes the configured binary as
//! `<bin> exec --model <m> --sandbox read-only --skip-git-repo-check --json`
//! with the prompt piped on stdin and cwd set to the executor root.

use af_core::ExecutorKind;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use super::{ExecutorDriver, ExecutorError, RunOutcome};
use crate::subprocess::{spawn, SpawnSpec};

/// Timeout for the health probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct CodexDriver {
    binary: String,
    root: PathBuf,
}

impl CodexDriver {
    pub fn new(binary: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            root: root.into(),
        }
    }
}

#[async_trait]
impl ExecutorDriver for CodexDriver {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Codex
    }

    async fn health(&self) -> bool {
        let spec = SpawnSpec::new(
            vec![self.binary.clone(), "--version".to_string()],
            HEALTH_TIMEOUT,
        );
        matches!(spawn(spec).await, Ok(output) if output.ok())
    }

    async fn run(
        &self,
        prompt: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<RunOutcome, ExecutorError> {
        let argv = vec![
            self.binary.clone(),
            "exec".to_string(),
            "--model".to_string(),
            model.to_string(),
            "--sandbox".to_string(),
            "read-only".to_string(),
            "--skip-git-repo-check".to_string(),
            "--json".to_string(),
        ];

        let mut spec = SpawnSpec::new(argv, timeout);
        spec.stdin = Some(prompt.to_string());
        spec.cwd = Some(self.root.clone());

        tracing::debug!(model, root = %self.root.display(), "running codex executor");
        let output = spawn(spec)
            .await
            .map_err(|e| ExecutorError::from_io(&self.binary, e))?;
        Ok(output.into())
    }
}

#[cfg(test)]
#[path = "codex_tests.rs"]
mod tests;
