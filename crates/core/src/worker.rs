// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External worker records.

use crate::executor::ExecutorKind;
use crate::id::{JobId, WorkerId};
use serde::{Deserialize, Serialize};

/// Default window within which a worker counts as active.
pub const DEFAULT_ACTIVE_WINDOW_MS: u64 = 120_000;

/// A registered external executor process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub name: String,
    pub executors: Vec<ExecutorKind>,
    /// Narrow claim filter: empty means any model.
    #[serde(default)]
    pub models: Vec<String>,
    pub registered_at_ms: u64,
    pub last_seen_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_job_id: Option<JobId>,
}

impl Worker {
    pub fn is_active(&self, now_ms: u64, window_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_seen_ms) <= window_ms
    }

    /// Whether this worker may claim a job with the given routing.
    pub fn can_claim(&self, executor: ExecutorKind, model: &str) -> bool {
        self.executors.contains(&executor)
            && (self.models.is_empty() || self.models.iter().any(|m| m == model))
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
