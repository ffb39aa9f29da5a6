// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The SUBMIT contract: the single JSON line an executor must emit
//! describing outcome, touched files, tests run, and artifact paths.

use crate::pins::Pins;
use crate::reason::Reason;
use serde::{Deserialize, Serialize};

/// Schema tag every submit must carry.
pub const SUBMIT_SCHEMA_VERSION: &str = "scc.submit.v1";

/// Line prefix scanned for in executor stdout.
const SUBMIT_PREFIX: &str = "SUBMIT:";

/// Root all submit artifacts must live under.
const ARTIFACTS_ROOT: &str = "artifacts/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitStatus {
    #[serde(rename = "DONE")]
    Done,
    #[serde(rename = "NEED_INPUT")]
    NeedInput,
    #[serde(rename = "FAILED")]
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitTests {
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub passed: bool,
    #[serde(default)]
    pub summary: String,
}

/// Required artifact set, all repo-relative under `artifacts/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitArtifacts {
    pub report_md: String,
    pub selftest_log: String,
    pub evidence_dir: String,
    pub patch_diff: String,
    pub submit_json: String,
}

impl SubmitArtifacts {
    /// `(field_name, path)` pairs for uniform validation.
    pub fn entries(&self) -> [(&'static str, &str); 5] {
        [
            ("report_md", &self.report_md),
            ("selftest_log", &self.selftest_log),
            ("evidence_dir", &self.evidence_dir),
            ("patch_diff", &self.patch_diff),
            ("submit_json", &self.submit_json),
        ]
    }
}

/// Parsed submit contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submit {
    pub schema_version: String,
    pub task_id: String,
    pub status: SubmitStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    #[serde(default)]
    pub changed_files: Vec<String>,
    #[serde(default)]
    pub new_files: Vec<String>,
    #[serde(default)]
    pub touched_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<SubmitTests>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<SubmitArtifacts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub needs_input: Vec<String>,
}

impl Submit {
    /// Scan stdout for the submit line and parse it.
    ///
    /// Agent-message JSON lines (objects with a `text`/`message`/`content`
    /// string field) are scanned first; raw lines second. The first hit
    /// wins. `Some(Err)` means a SUBMIT line was found but its payload is
    /// not a valid contract.
    pub fn extract(stdout: &str) -> Option<Result<Submit, serde_json::Error>> {
        find_submit_payload(stdout).map(|payload| serde_json::from_str::<Submit>(payload.trim()))
    }

    /// Like [`Submit::extract`] but collapses parse failures to `None`.
    pub fn extract_ok(stdout: &str) -> Option<Submit> {
        Self::extract(stdout).and_then(Result::ok)
    }

    /// Hygiene violations for an accepted DONE submit: artifacts must be
    /// present and under `artifacts/`; every touched file must match some
    /// allowed-paths prefix.
    pub fn hygiene_violations(&self, pins: Option<&Pins>) -> Vec<Reason> {
        let mut violations = Vec::new();

        match &self.artifacts {
            None => violations.push(Reason::MissingArtifact("all".to_string())),
            Some(artifacts) => {
                for (name, path) in artifacts.entries() {
                    if path.is_empty() {
                        violations.push(Reason::MissingArtifact(name.to_string()));
                    } else if !path.starts_with(ARTIFACTS_ROOT) {
                        violations.push(Reason::ArtifactOutOfRoot(name.to_string()));
                    }
                }
            }
        }

        if let Some(pins) = pins {
            if self.touched_files.iter().any(|f| !pins.allows(f)) {
                violations.push(Reason::TouchedFileOutsideAllowPaths);
            }
        }

        violations
    }

    /// Whether the schema tag matches the supported version.
    pub fn schema_ok(&self) -> bool {
        self.schema_version == SUBMIT_SCHEMA_VERSION
    }
}

/// Locate the JSON payload after the first `SUBMIT:` marker.
///
/// Pass 1 walks JSON stream lines (executors run with `--json`/`--format
/// json`) and inspects their agent-message text fields, where the payload
/// arrives unescaped after decoding. Pass 2 falls back to raw line
/// scanning for plain-text output.
fn find_submit_payload(stdout: &str) -> Option<String> {
    for line in stdout.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') {
            continue;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
            continue;
        };
        for field in ["text", "message", "content"] {
            if let Some(text) = value.get(field).and_then(|v| v.as_str()) {
                if let Some(idx) = text.find(SUBMIT_PREFIX) {
                    return Some(text[idx + SUBMIT_PREFIX.len()..].to_string());
                }
            }
        }
    }

    for line in stdout.lines() {
        if let Some(rest) = line.trim_start().strip_prefix(SUBMIT_PREFIX) {
            return Some(rest.to_string());
        }
    }
    None
}

#[cfg(test)]
#[path = "submit_tests.rs"]
mod tests;
