// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory job map with a durable snapshot.
//!
//! On reload, internal jobs stranded in `running` demote to `queued`
//! (the in-process run died with the daemon); external running jobs keep
//! their lease and are recycled by the lease sweep if the worker is gone.

use af_core::{ExecutorKind, Job, JobId, JobStatus, RunnerKind};
use af_storage::{read_json, write_json_atomic, StoreError};
use std::collections::HashMap;
use std::path::PathBuf;

/// Job store with snapshot persistence.
pub struct JobQueue {
    jobs: HashMap<JobId, Job>,
    path: PathBuf,
}

impl JobQueue {
    /// Load the snapshot, demoting stranded internal jobs. Returns the
    /// queue and how many jobs were demoted.
    pub fn load(path: impl Into<PathBuf>) -> (Self, u32) {
        let path = path.into();
        let jobs: Vec<Job> = read_json(&path, Vec::new());
        let mut demoted = 0;
        let mut map = HashMap::new();
        for mut job in jobs {
            if job.status == JobStatus::Running && job.runner == RunnerKind::Internal {
                job.reset_for_requeue();
                demoted += 1;
            }
            map.insert(job.id.clone(), job);
        }
        (Self { jobs: map, path }, demoted)
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let mut jobs: Vec<&Job> = self.jobs.values().collect();
        jobs.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then(a.id.0.cmp(&b.id.0)));
        write_json_atomic(&self.path, &jobs)
    }

    pub fn insert(&mut self, job: Job) -> Result<(), StoreError> {
        self.jobs.insert(job.id.clone(), job);
        self.save()
    }

    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn get_mut(&mut self, id: &JobId) -> Option<&mut Job> {
        self.jobs.get_mut(id)
    }

    pub fn list(&self) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self.jobs.values().collect();
        jobs.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then(a.id.0.cmp(&b.id.0)));
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn queued_count(&self) -> u32 {
        self.jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .count() as u32
    }

    pub fn running_count(&self, executor: ExecutorKind, runner: RunnerKind) -> u32 {
        self.jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Running && j.executor == executor && j.runner == runner
            })
            .count() as u32
    }

    pub fn running_total(&self) -> u32 {
        self.jobs
            .values()
            .filter(|j| j.status == JobStatus::Running)
            .count() as u32
    }

    /// Active job (queued or running) against a task, for idempotency.
    pub fn active_for_task(&self, task_id: &af_core::TaskId) -> Option<&Job> {
        self.jobs
            .values()
            .find(|j| j.task_id.as_ref() == Some(task_id) && j.is_active())
    }

    /// Next runnable internal job for an executor:
    /// `priority desc, created_at asc`.
    pub fn next_internal(&self, executor: ExecutorKind) -> Option<&Job> {
        self.jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Queued
                    && j.runner == RunnerKind::Internal
                    && j.executor == executor
            })
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at_ms.cmp(&b.created_at_ms))
                    .then(a.id.0.cmp(&b.id.0))
            })
    }

    /// Next claimable external job matching a worker's filters.
    pub fn next_external(
        &self,
        executors: &[ExecutorKind],
        models: &[String],
    ) -> Option<&Job> {
        self.jobs
            .values()
            .filter(|j| {
                j.status == JobStatus::Queued
                    && j.runner == RunnerKind::External
                    && executors.contains(&j.executor)
                    && (models.is_empty() || models.iter().any(|m| *m == j.model))
            })
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at_ms.cmp(&b.created_at_ms))
                    .then(a.id.0.cmp(&b.id.0))
            })
    }

    /// External running jobs whose lease has expired.
    pub fn expired_leases(&self, now_ms: u64) -> Vec<JobId> {
        self.jobs
            .values()
            .filter(|j| j.lease_expired(now_ms))
            .map(|j| j.id.clone())
            .collect()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
