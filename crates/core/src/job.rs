// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record: one execution attempt against a task.

use crate::executor::ExecutorKind;
use crate::id::{JobId, PackId, TaskId, WorkerId};
use crate::reason::Reason;
use crate::scan;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Where a job runs: in-process driver or external claim/lease worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    Internal,
    External,
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerKind::Internal => write!(f, "internal"),
            RunnerKind::External => write!(f, "external"),
        }
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Informational stats extracted from the first patch block in stdout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchStats {
    pub files: Vec<String>,
    pub added: u32,
    pub removed: u32,
    pub hunks: u32,
}

impl PatchStats {
    /// Parse the first `*** Begin Patch` block out of executor stdout.
    ///
    /// Understands both the apply-patch envelope (`*** Update File: x`)
    /// and unified-diff hunks inside it.
    pub fn from_stdout(stdout: &str) -> Option<Self> {
        let patch = scan::extract_patch_block(stdout)?;
        let mut files = BTreeSet::new();
        let mut stats = PatchStats::default();

        for line in patch.lines() {
            if let Some(path) = line
                .strip_prefix("*** Update File: ")
                .or_else(|| line.strip_prefix("*** Add File: "))
                .or_else(|| line.strip_prefix("*** Delete File: "))
            {
                files.insert(path.trim().to_string());
                stats.hunks += 1;
            } else if let Some(path) = line.strip_prefix("+++ ") {
                files.insert(path.trim().trim_start_matches("b/").to_string());
            } else if line.starts_with("@@") {
                stats.hunks += 1;
            } else if line.starts_with('+') && !line.starts_with("+++") {
                stats.added += 1;
            } else if line.starts_with('-') && !line.starts_with("---") {
                stats.removed += 1;
            }
        }

        stats.files = files.into_iter().collect();
        Some(stats)
    }
}

/// Token usage counters reported by the executor, when available.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Outcome of the server-side CI gate for a job, with anti-forgery evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiGateOutcome {
    pub ok: bool,
    pub required: bool,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    pub stdout_path: String,
    pub stdout_sha256: String,
    pub stderr_path: String,
    pub stderr_sha256: String,
    /// False when the evidence window check or a digest re-check failed.
    pub evidence_valid: bool,
}

/// An execution attempt against a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    #[serde(default)]
    pub attempts: u32,

    pub executor: ExecutorKind,
    pub model: String,
    pub timeout_ms: u64,
    pub runner: RunnerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
    /// Epoch ms the current lease expires. Meaningful only for
    /// external running jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_until_ms: Option<u64>,

    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_pack_id: Option<PackId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub allowed_tests: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default)]
    pub priority: i64,

    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_stats: Option<PatchStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageCounters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_gate: Option<CiGateOutcome>,
}

impl Job {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Whether the external lease has expired at `now_ms`.
    pub fn lease_expired(&self, now_ms: u64) -> bool {
        self.runner == RunnerKind::External
            && self.status == JobStatus::Running
            && self.lease_until_ms.is_some_and(|until| until <= now_ms)
    }

    /// Clear per-attempt outputs ahead of a requeue. Attempt count and
    /// identity are preserved.
    pub fn reset_for_requeue(&mut self) {
        self.status = JobStatus::Queued;
        self.worker_id = None;
        self.lease_until_ms = None;
        self.started_at_ms = None;
        self.finished_at_ms = None;
        self.exit_code = None;
        self.stdout.clear();
        self.stderr.clear();
        self.reason = None;
        self.submit = None;
        self.patch_stats = None;
        self.ci_gate = None;
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
