// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types for the Agent Foundry audit stream.
//!
//! Serializes with `{"type": "domain:name", ...fields}` format. The
//! append log adds the `t`/`level` envelope at write time; readers that
//! meet an unrecognized type keep the line verbatim rather than failing.

use crate::executor::ExecutorKind;
use crate::id::{JobId, PackId, TaskId, WorkerId};
use crate::job::{JobStatus, RunnerKind};
use crate::reason::Reason;
use crate::role::Role;
use crate::task::{Lane, TaskStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity attached to an event line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventLevel::Info => write!(f, "info"),
            EventLevel::Warn => write!(f, "warn"),
            EventLevel::Error => write!(f, "error"),
        }
    }
}

/// Events appended to the audit stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- board --
    #[serde(rename = "task:created")]
    TaskCreated {
        task_id: TaskId,
        kind: String,
        role: Role,
        lane: Lane,
        title: String,
    },

    #[serde(rename = "task:status")]
    TaskStatusChanged {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<Reason>,
    },

    #[serde(rename = "task:split_applied")]
    TaskSplitApplied {
        task_id: TaskId,
        children: Vec<TaskId>,
    },

    #[serde(rename = "task:recovered")]
    TaskRecovered { task_id: TaskId, reason: Reason },

    #[serde(rename = "board:task_completed")]
    BoardTaskCompleted {
        task_id: TaskId,
        job_id: JobId,
        status: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<Reason>,
    },

    // -- jobs --
    #[serde(rename = "job:created")]
    JobCreated {
        job_id: JobId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<TaskId>,
        executor: ExecutorKind,
        model: String,
        runner: RunnerKind,
    },

    #[serde(rename = "job:started")]
    JobStarted {
        job_id: JobId,
        executor: ExecutorKind,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        worker_id: Option<WorkerId>,
    },

    #[serde(rename = "job:finished")]
    JobFinished {
        job_id: JobId,
        status: JobStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<Reason>,
    },

    #[serde(rename = "job:lease_expired")]
    JobLeaseExpired {
        job_id: JobId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        worker_id: Option<WorkerId>,
    },

    #[serde(rename = "job:long_running")]
    JobLongRunning { job_id: JobId, elapsed_ms: u64 },

    #[serde(rename = "job:canceled")]
    JobCanceled { job_id: JobId, reason: Reason },

    // -- routing --
    #[serde(rename = "route:decision")]
    RouteDecision {
        task_id: TaskId,
        job_id: JobId,
        executor: ExecutorKind,
        model: String,
        mode: String,
        attempt: u32,
    },

    // -- verification --
    #[serde(rename = "ci:gate_result")]
    CiGateResult {
        job_id: JobId,
        ok: bool,
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        evidence_valid: bool,
    },

    #[serde(rename = "ci:gate_skipped")]
    CiGateSkipped { job_id: JobId, reason: Reason },

    // -- context packs --
    #[serde(rename = "contextpack:pins_created")]
    PackPinsCreated {
        pack_id: PackId,
        files: u32,
        windows: u32,
        bytes: u64,
    },

    #[serde(rename = "contextpack:files_created")]
    PackFilesCreated {
        pack_id: PackId,
        files: u32,
        bytes: u64,
    },

    // -- fixups & degradation --
    #[serde(rename = "fixup:created")]
    FixupCreated {
        task_id: TaskId,
        source_task_id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_job_id: Option<JobId>,
        class: String,
    },

    #[serde(rename = "fixup:fused")]
    FixupFused { queued: u32, threshold: u32 },

    #[serde(rename = "breaker:open")]
    BreakerOpened {
        cluster: String,
        fail_count: u32,
        cooldown_ms: u64,
    },

    #[serde(rename = "breaker:half_open")]
    BreakerHalfOpen { cluster: String },

    #[serde(rename = "breaker:closed")]
    BreakerClosed { cluster: String },

    #[serde(rename = "quarantine:raised")]
    QuarantineRaised { until_ms: u64, reason: String },

    #[serde(rename = "quarantine:cleared")]
    QuarantineCleared {},

    // -- workers & scheduler --
    #[serde(rename = "worker:registered")]
    WorkerRegistered { worker_id: WorkerId, name: String },

    #[serde(rename = "scheduler:underutilized")]
    SchedulerUnderutilized { queued: u32, running: u32 },

    #[serde(rename = "scheduler:heartbeat")]
    SchedulerHeartbeat {
        queued: u32,
        running: u32,
        workers: u32,
    },

    // -- lifecycle --
    #[serde(rename = "state:recovered")]
    StateRecovered { demoted_jobs: u32, reset_tasks: u32 },
}

impl Event {
    /// Default severity for this event type.
    pub fn level(&self) -> EventLevel {
        match self {
            Event::JobFinished {
                status: JobStatus::Failed,
                ..
            } => EventLevel::Warn,
            Event::JobLeaseExpired { .. }
            | Event::JobLongRunning { .. }
            | Event::TaskRecovered { .. }
            | Event::CiGateSkipped { .. }
            | Event::SchedulerUnderutilized { .. }
            | Event::FixupFused { .. }
            | Event::BreakerOpened { .. } => EventLevel::Warn,
            Event::QuarantineRaised { .. } => EventLevel::Error,
            Event::CiGateResult { ok: false, .. } => EventLevel::Warn,
            _ => EventLevel::Info,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
