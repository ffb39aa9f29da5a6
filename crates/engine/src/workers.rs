// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External worker registry and the claim/lease protocol.

use af_core::{Clock, ExecutorKind, IdGen, JobId, JobStatus, RunnerKind, Worker, WorkerId};
use std::collections::HashMap;

use crate::queue::JobQueue;

/// In-memory registry of external workers.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: HashMap<WorkerId, Worker>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        executors: Vec<ExecutorKind>,
        models: Vec<String>,
        clock: &impl Clock,
        idgen: &impl IdGen,
    ) -> Worker {
        let now_ms = clock.epoch_ms();
        let id = WorkerId::new(idgen.next());
        let worker = Worker {
            id: id.clone(),
            name: name.into(),
            executors,
            models,
            registered_at_ms: now_ms,
            last_seen_ms: now_ms,
            running_job_id: None,
        };
        self.workers.insert(id, worker.clone());
        worker
    }

    pub fn get(&self, id: &WorkerId) -> Option<&Worker> {
        self.workers.get(id)
    }

    pub fn get_mut(&mut self, id: &WorkerId) -> Option<&mut Worker> {
        self.workers.get_mut(id)
    }

    pub fn list(&self) -> Vec<&Worker> {
        let mut workers: Vec<&Worker> = self.workers.values().collect();
        workers.sort_by(|a, b| a.registered_at_ms.cmp(&b.registered_at_ms).then(a.id.0.cmp(&b.id.0)));
        workers
    }

    pub fn active_count(&self, now_ms: u64, window_ms: u64) -> u32 {
        self.workers
            .values()
            .filter(|w| w.is_active(now_ms, window_ms))
            .count() as u32
    }

    /// Heartbeat: refresh `last_seen` and extend the lease of the
    /// worker's running job. Returns false for unknown workers.
    pub fn heartbeat(
        &mut self,
        id: &WorkerId,
        queue: &mut JobQueue,
        now_ms: u64,
        lease_ms: u64,
    ) -> bool {
        let Some(worker) = self.workers.get_mut(id) else {
            return false;
        };
        worker.last_seen_ms = now_ms;
        if let Some(job_id) = worker.running_job_id.clone() {
            if let Some(job) = queue.get_mut(&job_id) {
                if job.status == JobStatus::Running && job.runner == RunnerKind::External {
                    job.lease_until_ms = Some(now_ms + lease_ms);
                }
            }
        }
        true
    }

    /// One claim attempt: pick a queued external job matching the
    /// worker's filters, respecting the per-executor external cap, and
    /// transition it queued→running under a fresh lease.
    ///
    /// Long-polling is the caller's loop; this is a single poll.
    pub fn try_claim(
        &mut self,
        id: &WorkerId,
        executor_filter: Option<ExecutorKind>,
        queue: &mut JobQueue,
        now_ms: u64,
        lease_ms: u64,
        external_cap: u32,
    ) -> Option<JobId> {
        let worker = self.workers.get_mut(id)?;
        worker.last_seen_ms = now_ms;
        if worker.running_job_id.is_some() {
            return None;
        }

        let executors: Vec<ExecutorKind> = match executor_filter {
            Some(kind) if worker.executors.contains(&kind) => vec![kind],
            Some(_) => return None,
            None => worker.executors.clone(),
        };

        let eligible: Vec<ExecutorKind> = executors
            .into_iter()
            .filter(|e| queue.running_count(*e, RunnerKind::External) < external_cap)
            .collect();
        if eligible.is_empty() {
            return None;
        }

        let job_id = queue.next_external(&eligible, &worker.models)?.id.clone();
        let job = queue.get_mut(&job_id)?;
        job.status = JobStatus::Running;
        job.started_at_ms = Some(now_ms);
        job.attempts += 1;
        job.worker_id = Some(id.clone());
        job.lease_until_ms = Some(now_ms + lease_ms);
        worker.running_job_id = Some(job_id.clone());
        Some(job_id)
    }

    /// Clear a worker's running job (on completion, cancel, or expiry).
    pub fn release_job(&mut self, job_id: &JobId) {
        for worker in self.workers.values_mut() {
            if worker.running_job_id.as_ref() == Some(job_id) {
                worker.running_job_id = None;
            }
        }
    }
}

use af_core::{Event, Job};

use crate::engine::Engine;

impl<C: Clock, G: IdGen> Engine<C, G> {
    /// Register a worker and announce it.
    pub fn register_worker(
        &mut self,
        name: impl Into<String>,
        executors: Vec<ExecutorKind>,
        models: Vec<String>,
    ) -> Worker {
        let clock = self.clock.clone();
        let idgen = self.idgen.clone();
        let worker = self.workers.register(name, executors, models, &clock, &idgen);
        self.emit(&Event::WorkerRegistered {
            worker_id: worker.id.clone(),
            name: worker.name.clone(),
        });
        worker
    }

    /// Heartbeat: refresh the worker and extend its job lease.
    pub fn worker_heartbeat(&mut self, id: &WorkerId) -> bool {
        let now_ms = self.now_ms();
        let lease_ms = self.settings.get_u64("EXTERNAL_LEASE_MS");
        let ok = self.workers.heartbeat(id, &mut self.queue, now_ms, lease_ms);
        if ok {
            if let Err(e) = self.queue.save() {
                tracing::error!(error = %e, "failed to persist queue");
            }
        }
        ok
    }

    /// One claim poll for a worker. The daemon long-polls around this.
    pub fn claim_for_worker(
        &mut self,
        id: &WorkerId,
        executor_filter: Option<ExecutorKind>,
    ) -> Option<Job> {
        let now_ms = self.now_ms();
        let lease_ms = self.settings.get_u64("EXTERNAL_LEASE_MS");
        let cap = self.external_cap();
        let job_id =
            self.workers
                .try_claim(id, executor_filter, &mut self.queue, now_ms, lease_ms, cap)?;

        let job = self.queue.get(&job_id)?.clone();
        if let Some(task_id) = &job.task_id {
            let _ = self
                .board
                .link_job(task_id, job.id.clone(), JobStatus::Running, now_ms);
        }
        if let Err(e) = self.queue.save() {
            tracing::error!(error = %e, "failed to persist queue");
        }
        self.emit(&Event::JobStarted {
            job_id: job.id.clone(),
            executor: job.executor,
            model: job.model.clone(),
            worker_id: Some(id.clone()),
        });
        Some(job)
    }
}

#[cfg(test)]
#[path = "workers_tests.rs"]
mod tests;
