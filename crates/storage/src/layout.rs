// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk layout of persisted control-plane state.
//!
//! Everything lives under one configurable root:
//!
//! ```text
//! artifacts/taskboard/{tasks.json, mission.json}
//! artifacts/executor_logs/*.jsonl
//! artifacts/executor_logs/{jobs_state.json, model_rr.json, circuit_breaker_state.json}
//! artifacts/executor_logs/contextpacks/<id>.md
//! artifacts/executor_logs/threads/<id>.json
//! artifacts/executor_logs/ci_gate/ci_<epoch>_<nonce>.{stdout,stderr}.log
//! runtime.env
//! ```

use std::path::{Path, PathBuf};

use crate::StoreError;

/// Path helper rooted at the state directory.
#[derive(Debug, Clone)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create every directory the daemon writes into.
    pub fn ensure(&self) -> Result<(), StoreError> {
        for dir in [
            self.taskboard_dir(),
            self.logs_dir(),
            self.contextpacks_dir(),
            self.threads_dir(),
            self.ci_gate_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn taskboard_dir(&self) -> PathBuf {
        self.root.join("artifacts").join("taskboard")
    }

    pub fn tasks_file(&self) -> PathBuf {
        self.taskboard_dir().join("tasks.json")
    }

    pub fn mission_file(&self) -> PathBuf {
        self.taskboard_dir().join("mission.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("artifacts").join("executor_logs")
    }

    pub fn jobs_log(&self) -> PathBuf {
        self.logs_dir().join("jobs.jsonl")
    }

    pub fn failures_log(&self) -> PathBuf {
        self.logs_dir().join("failures.jsonl")
    }

    pub fn heartbeat_log(&self) -> PathBuf {
        self.logs_dir().join("heartbeat.jsonl")
    }

    pub fn state_events_log(&self) -> PathBuf {
        self.logs_dir().join("state_events.jsonl")
    }

    pub fn ci_gate_results_log(&self) -> PathBuf {
        self.logs_dir().join("ci_gate_results.jsonl")
    }

    pub fn ci_failures_log(&self) -> PathBuf {
        self.logs_dir().join("ci_failures.jsonl")
    }

    pub fn route_decisions_log(&self) -> PathBuf {
        self.logs_dir().join("route_decisions.jsonl")
    }

    pub fn jobs_state_file(&self) -> PathBuf {
        self.logs_dir().join("jobs_state.json")
    }

    pub fn model_rr_file(&self) -> PathBuf {
        self.logs_dir().join("model_rr.json")
    }

    pub fn breaker_file(&self) -> PathBuf {
        self.logs_dir().join("circuit_breaker_state.json")
    }

    pub fn contextpacks_dir(&self) -> PathBuf {
        self.logs_dir().join("contextpacks")
    }

    pub fn contextpack_file(&self, id: &str) -> PathBuf {
        self.contextpacks_dir().join(format!("{id}.md"))
    }

    pub fn threads_dir(&self) -> PathBuf {
        self.logs_dir().join("threads")
    }

    pub fn thread_file(&self, id: &str) -> PathBuf {
        self.threads_dir().join(format!("{id}.json"))
    }

    pub fn ci_gate_dir(&self) -> PathBuf {
        self.logs_dir().join("ci_gate")
    }

    pub fn instinct_dir(&self) -> PathBuf {
        self.logs_dir().join("instinct")
    }

    pub fn patterns_file(&self) -> PathBuf {
        self.instinct_dir().join("patterns.json")
    }

    pub fn runtime_env_file(&self) -> PathBuf {
        self.root.join("runtime.env.json")
    }

    pub fn daemon_lock_file(&self) -> PathBuf {
        self.root.join("afd.lock")
    }

    pub fn daemon_log_file(&self) -> PathBuf {
        self.root.join("afd.log")
    }
}

#[cfg(test)]
#[path = "layout_tests.rs"]
mod tests;
