// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CI gate command handling: the allowlist, template substitution, and
//! the timed run whose output becomes hash-witnessed evidence.

use std::path::Path;
use std::time::Duration;

use crate::subprocess::{spawn, ExecOutput, SpawnSpec};

/// Command prefixes the gate will execute.
pub const CI_ALLOWED_PREFIXES: &[&str] = &[
    "python -m pytest",
    "pytest",
    "npm test",
    "pnpm test",
    "yarn test",
    "bun test",
    "go test",
    "cargo test",
    "dotnet test",
];

/// Whether a test command is a task selftest rather than a real suite.
pub fn is_selftest(command: &str) -> bool {
    command.contains("selftest")
}

/// Whether the list carries at least one real (non-selftest) command.
pub fn has_real_test(allowed_tests: &[String]) -> bool {
    allowed_tests.iter().any(|t| !is_selftest(t))
}

/// Pick the first allowed command and substitute `{task_id}`, `{job_id}`,
/// and `{area}` templates. Selftest commands are allowed through (they
/// carry the selftest marker by construction); with `allow_all` the
/// prefix allowlist is skipped entirely.
pub fn resolve_ci_command(
    allowed_tests: &[String],
    task_id: &str,
    job_id: &str,
    area: Option<&str>,
    allow_all: bool,
) -> Option<String> {
    let command = allowed_tests.iter().find(|t| {
        allow_all
            || is_selftest(t)
            || CI_ALLOWED_PREFIXES
                .iter()
                .any(|prefix| t.trim_start().starts_with(prefix))
    })?;

    let substituted = command
        .replace("{task_id}", task_id)
        .replace("{job_id}", job_id)
        .replace("{area}", area.unwrap_or(""));

    // An empty {area} can leave doubled spaces behind.
    Some(
        substituted
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" "),
    )
}

/// Run a gate command through the shell with cwd and timeout.
pub async fn run_ci_command(
    command: &str,
    cwd: &Path,
    timeout: Duration,
) -> std::io::Result<ExecOutput> {
    let mut spec = SpawnSpec::new(
        vec!["sh".to_string(), "-c".to_string(), command.to_string()],
        timeout,
    );
    spec.cwd = Some(cwd.to_path_buf());
    spawn(spec).await
}

#[cfg(test)]
#[path = "ci_tests.rs"]
mod tests;
