// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OpenCode-like executor driver.
//!
//! Invokes the configured binary as
//! `<bin> run --format json --model <m> [--variant <v>] <prompt>` with
//! project-local config disabled through the environment: the run must
//! see only the inline config payload, never whatever `.opencode/`
//! happens to be lying in the repo.

use af_core::ExecutorKind;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

use super::{ExecutorDriver, ExecutorError, RunOutcome};
use crate::subprocess::{spawn, SpawnSpec};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct OpencodeDriver {
    binary: String,
    root: PathBuf,
    variant: Option<String>,
    /// Inline config passed via `OPENCODE_CONFIG_CONTENT`.
    config_content: String,
}

impl OpencodeDriver {
    pub fn new(binary: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            root: root.into(),
            variant: None,
            config_content: default_config_content(),
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    pub fn with_config_content(mut self, content: impl Into<String>) -> Self {
        self.config_content = content.into();
        self
    }
}

/// Minimal inline config: no project instructions, no MCP servers.
fn default_config_content() -> String {
    serde_json::json!({
        "instructions": [],
        "mcp": {},
    })
    .to_string()
}

#[async_trait]
impl ExecutorDriver for OpencodeDriver {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Opencodecli
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
        let mut argv = vec![
            self.binary.clone(),
            "run".to_string(),
            "--format".to_string(),
            "json".to_string(),
            "--model".to_string(),
            model.to_string(),
        ];
        if let Some(variant) = &self.variant {
            argv.push("--variant".to_string());
            argv.push(variant.clone());
        }
        // Prompt travels as a single argv element.
        argv.push(prompt.to_string());

        let mut spec = SpawnSpec::new(argv, timeout);
        spec.cwd = Some(self.root.clone());
        spec.env = vec![
            (
                "OPENCODE_DISABLE_PROJECT_CONFIG".to_string(),
                "true".to_string(),
            ),
            (
                "OPENCODE_CONFIG_CONTENT".to_string(),
                self.config_content.clone(),
            ),
        ];

        tracing::debug!(model, root = %self.root.display(), "running opencode executor");
        let output = spawn(spec)
            .await
            .map_err(|e| ExecutorError::from_io(&self.binary, e))?;
        Ok(output.into())
    }
}

#[cfg(test)]
#[path = "opencode_tests.rs"]
mod tests;
