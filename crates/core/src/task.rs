// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task record and state machine.

use crate::executor::ExecutorKind;
use crate::id::{JobId, TaskId};
use crate::job::{JobStatus, RunnerKind};
use crate::pins::Pins;
use crate::reason::Reason;
use crate::role::Role;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum entries in a task's file list.
pub const MAX_FILES: usize = 16;

/// Maximum entries in a task's skills list.
pub const MAX_SKILLS: usize = 16;

/// Maximum entries in a task's allowed-models ladder.
pub const MAX_MODELS: usize = 8;

/// Parent tasks are split into atomic children; atomic tasks are
/// executable by a single executor invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Parent,
    Atomic,
}

/// Board lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    NeedsSplit,
    Ready,
    InProgress,
    Blocked,
    Done,
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 7] = [
        TaskStatus::Backlog,
        TaskStatus::NeedsSplit,
        TaskStatus::Ready,
        TaskStatus::InProgress,
        TaskStatus::Blocked,
        TaskStatus::Done,
        TaskStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::NeedsSplit => "needs_split",
            TaskStatus::Ready => "ready",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        TaskStatus::ALL.into_iter().find(|v| v.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }

    /// Whether the `self → to` arrow is in the allowed transition table.
    ///
    /// `failed → ready` is only legal through the bounded requeue loops;
    /// callers on that path set `requeue`. `done` reopens only via the
    /// explicit operator path, which also sets `requeue`.
    pub fn can_transition(&self, to: TaskStatus, requeue: bool) -> bool {
        use TaskStatus::*;
        match (self, to) {
            (Backlog, Ready) => true,
            (Ready, InProgress) => true,
            (InProgress, Done) | (InProgress, Failed) | (InProgress, Blocked) => true,
            (Blocked, Ready) => true,
            (NeedsSplit, InProgress) => true,
            (InProgress, Ready) => requeue,
            (InProgress, NeedsSplit) => requeue,
            (Failed, Ready) => requeue,
            (Done, Ready) => requeue,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Priority class a task lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Fastlane,
    Mainlane,
    Batchlane,
    Quarantine,
    Dlq,
}

impl Lane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Fastlane => "fastlane",
            Lane::Mainlane => "mainlane",
            Lane::Batchlane => "batchlane",
            Lane::Quarantine => "quarantine",
            Lane::Dlq => "dlq",
        }
    }

    /// Default priority when the task carries none.
    pub fn default_priority(&self) -> i64 {
        match self {
            Lane::Fastlane => 900,
            Lane::Mainlane => 500,
            Lane::Batchlane => 100,
            Lane::Quarantine | Lane::Dlq => 0,
        }
    }

    /// Lanes in which tasks are never auto-dispatched.
    pub fn is_parked(&self) -> bool {
        matches!(self, Lane::Quarantine | Lane::Dlq)
    }
}

impl Default for Lane {
    fn default() -> Self {
        Lane::Mainlane
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Priority given to fixup children: head of every lane.
pub const FIXUP_PRIORITY: i64 = 950;

/// Back-pointers carried by system-created fixup children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPointers {
    pub source_task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_job_id: Option<JobId>,
}

/// A unit of work on the board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub created_at_ms: u64,
    #[serde(default)]
    pub updated_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
    pub kind: TaskKind,

    pub title: String,
    pub goal: String,
    #[serde(default)]
    pub role: Role,

    #[serde(default)]
    pub allowed_executors: Vec<ExecutorKind>,
    #[serde(default)]
    pub allowed_models: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner: Option<RunnerKind>,
    #[serde(default)]
    pub lane: Lane,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,

    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pins: Option<Pins>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pins_instance: Option<Pins>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    /// Two-phase pins: created without pins, blocked until a pinser fills them.
    #[serde(default)]
    pub pins_pending: bool,

    #[serde(default)]
    pub allowed_tests: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointers: Option<TaskPointers>,

    pub status: TaskStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_job_status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_job_reason: Option<Reason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_job_finished_at_ms: Option<u64>,

    #[serde(default)]
    pub timeout_retries: u32,
    /// Index into the model ladder for the next attempt.
    #[serde(default)]
    pub model_attempt: u32,
    #[serde(default)]
    pub ci_fixup_count: u32,
    #[serde(default)]
    pub pins_fixup_count: u32,
    #[serde(default)]
    pub ci_requeue_count: u32,
    #[serde(default)]
    pub pins_requeue_count: u32,
    /// Epoch ms before which the task must not be dispatched.
    #[serde(default)]
    pub cooldown_until_ms: u64,
}

impl Task {
    /// Effective scheduling priority: explicit value, else the lane default.
    pub fn effective_priority(&self) -> i64 {
        self.priority.unwrap_or_else(|| self.lane.default_priority())
    }

    /// Whether the task's last job is still queued or running.
    pub fn has_active_job(&self) -> bool {
        self.last_job_id.is_some()
            && matches!(
                self.last_job_status,
                Some(JobStatus::Queued) | Some(JobStatus::Running)
            )
    }

    /// Whether the task is cooling down at `now_ms`.
    pub fn in_cooldown(&self, now_ms: u64) -> bool {
        self.cooldown_until_ms > now_ms
    }

    /// Effective pins: template+instance merge when both exist.
    pub fn effective_pins(&self) -> Option<Pins> {
        match (&self.pins, &self.pins_instance) {
            (Some(t), Some(i)) => Some(Pins::merge(t, i)),
            (Some(p), None) | (None, Some(p)) => Some(p.clone()),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
