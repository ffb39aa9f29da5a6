// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixup and recovery loops. Every loop is bounded by a counter or a
//! cooldown; the system never silently upgrades `failed` back to `ready`
//! outside these paths.

use af_core::{
    Clock, Event, IdGen, Job, JobId, JobStatus, Reason, Role, RunnerKind, Task, TaskId, TaskKind,
    TaskStatus, FIXUP_PRIORITY,
};

use crate::board::NewTask;
use crate::engine::Engine;
use crate::error::DispatchError;
use crate::split::parse_pins_payload;

/// Task class of CI fixup children.
pub const CI_FIXUP_CLASS: &str = "ci_fixup_v1";

/// Task class of pins fixup children.
pub const PINS_FIXUP_CLASS: &str = "pins_fixup_v1";

impl<C: Clock, G: IdGen> Engine<C, G> {
    /// Entry point from the verdict pipeline for failed jobs.
    pub(crate) fn run_failure_loops(&mut self, task_id: &TaskId, job: &Job) {
        let Some(reason) = job.reason.clone() else {
            return;
        };
        match reason {
            Reason::Timeout => self.maybe_requeue_timeout(task_id),
            ref r if r.is_model_failure() => self.maybe_requeue_model(task_id),
            Reason::CiFailed | Reason::CiSkipped => self.maybe_create_ci_fixup(task_id, job),
            ref r if r.is_pins_failure() => self.maybe_create_pins_fixup(task_id, job),
            _ => {}
        }
    }

    /// Entry point from the verdict pipeline for completed jobs: fixup
    /// children feed their result back into their source task.
    pub(crate) fn handle_success_loops(&mut self, task_id: &TaskId, job: &Job) {
        let Some(task) = self.board.get(task_id).cloned() else {
            return;
        };
        match task.task_class.as_deref() {
            Some(PINS_FIXUP_CLASS) => self.apply_pins_fixup(&task, job),
            Some(CI_FIXUP_CLASS) => self.requeue_ci_source(&task),
            _ => {}
        }
    }

    /// Timeout requeue: bounded by `TIMEOUT_REQUEUE_MAX` with cooldown.
    fn maybe_requeue_timeout(&mut self, task_id: &TaskId) {
        let now_ms = self.now_ms();
        let cap = self.settings.get_u64("TIMEOUT_REQUEUE_MAX") as u32;
        let cooldown_ms = self.settings.get_u64("TIMEOUT_REQUEUE_COOLDOWN_MS");

        {
            let Some(task) = self.board.get_mut(task_id) else {
                return;
            };
            if task.timeout_retries >= cap {
                return;
            }
            task.timeout_retries += 1;
            task.cooldown_until_ms = now_ms + cooldown_ms;
        }
        if self
            .board
            .set_status(task_id, TaskStatus::Ready, true, Some(Reason::Timeout), now_ms)
            .is_ok()
        {
            self.emit(&Event::TaskRecovered {
                task_id: task_id.clone(),
                reason: Reason::Timeout,
            });
        }
    }

    /// Model-ladder requeue on rate_limited/unauthorized/forbidden.
    fn maybe_requeue_model(&mut self, task_id: &TaskId) {
        if !self.settings.get_bool("AUTO_REQUEUE_MODEL_FAILURES") {
            return;
        }
        let now_ms = self.now_ms();
        let cap = self.settings.get_u64("AUTO_REQUEUE_MODEL_FAILURES_MAX") as u32;
        let cooldown_ms = self.settings.get_u64("AUTO_REQUEUE_MODEL_FAILURES_COOLDOWN_MS");

        let reason;
        {
            let Some(task) = self.board.get_mut(task_id) else {
                return;
            };
            if task.model_attempt >= cap {
                return;
            }
            reason = task.last_job_reason.clone().unwrap_or(Reason::RateLimited);
            task.model_attempt += 1;
            task.cooldown_until_ms = now_ms + cooldown_ms;
        }
        if self
            .board
            .set_status(task_id, TaskStatus::Ready, true, Some(reason.clone()), now_ms)
            .is_ok()
        {
            self.emit(&Event::TaskRecovered {
                task_id: task_id.clone(),
                reason,
            });
        }
    }

    /// Create a qa child to repair a CI failure, bounded per source.
    fn maybe_create_ci_fixup(&mut self, task_id: &TaskId, job: &Job) {
        if !self.settings.get_bool("CI_FIXUP_ENABLED") || self.fixups_disabled {
            return;
        }
        let cap = self.settings.get_u64("CI_FIXUP_MAX_PER_TASK") as u32;
        let Some(source) = self.board.get(task_id).cloned() else {
            return;
        };
        if source.ci_fixup_count >= cap {
            return;
        }
        if self.fuse_blown() {
            return;
        }

        let goal = format!(
            "The required test command failed for task {} (job {}). Reproduce the \
             failure with the allowed tests, fix the smallest thing that makes the \
             command pass, and resubmit.",
            source.id, job.id
        );
        if let Some(child_id) = self.create_fixup_child(&source, job, CI_FIXUP_CLASS, Role::Qa, goal)
        {
            if let Some(stored) = self.board.get_mut(task_id) {
                stored.ci_fixup_count += 1;
            }
            let _ = self.board.save();
            self.emit(&Event::FixupCreated {
                task_id: child_id,
                source_task_id: task_id.clone(),
                source_job_id: Some(job.id.clone()),
                class: CI_FIXUP_CLASS.to_string(),
            });
        }
    }

    /// Create a pinser child to repair insufficient pins.
    fn maybe_create_pins_fixup(&mut self, task_id: &TaskId, job: &Job) {
        if !self.settings.get_bool("PINS_FIXUP_ENABLED") || self.fixups_disabled {
            return;
        }
        let cap = self.settings.get_u64("PINS_FIXUP_MAX_PER_TASK") as u32;
        let Some(source) = self.board.get(task_id).cloned() else {
            return;
        };
        if source.pins_fixup_count >= cap {
            return;
        }
        if self.fuse_blown() {
            return;
        }

        let goal = format!(
            "Task {} failed for lack of sufficient pins. Read its goal and produce a \
             pins object (allowed_paths, line_windows, symbols) that bounds the work. \
             Output a single JSON object of the form {{\"pins\": {{...}}}}.",
            source.id
        );
        if let Some(child_id) =
            self.create_fixup_child(&source, job, PINS_FIXUP_CLASS, Role::Pinser, goal)
        {
            if let Some(stored) = self.board.get_mut(task_id) {
                stored.pins_fixup_count += 1;
            }
            let _ = self.board.save();
            self.emit(&Event::FixupCreated {
                task_id: child_id,
                source_task_id: task_id.clone(),
                source_job_id: Some(job.id.clone()),
                class: PINS_FIXUP_CLASS.to_string(),
            });
        }
    }

    /// Fixup-storm fuse check, with its event.
    fn fuse_blown(&self) -> bool {
        let queued = self.queue.queued_count();
        if self.degradation.fixup_fused(queued, &self.settings) {
            self.emit(&Event::FixupFused {
                queued,
                threshold: self.settings.get_u64("FIXUP_FUSE_QUEUE_THRESHOLD") as u32,
            });
            return true;
        }
        false
    }

    fn create_fixup_child(
        &mut self,
        source: &Task,
        job: &Job,
        class: &str,
        role: Role,
        goal: String,
    ) -> Option<TaskId> {
        let new = NewTask {
            title: format!("{class}: {}", source.title),
            goal,
            kind: Some(TaskKind::Atomic),
            role: Some(role),
            parent_id: Some(source.id.clone()),
            files: source.files.clone(),
            pins: source.pins.clone(),
            allowed_tests: source.allowed_tests.clone(),
            priority: Some(FIXUP_PRIORITY),
            area: source.area.clone(),
            task_class: Some(class.to_string()),
            pointers: Some(af_core::TaskPointers {
                source_task_id: source.id.clone(),
                source_job_id: Some(job.id.clone()),
            }),
            ..NewTask::default()
        };

        let clock = self.clock.clone();
        let idgen = self.idgen.clone();
        match self.board.create(new, &self.settings, &clock, &idgen) {
            Ok(child) => {
                let child_id = child.id.clone();
                let _ = self.board.set_status(
                    &child_id,
                    TaskStatus::Ready,
                    false,
                    None,
                    clock.epoch_ms(),
                );
                Some(child_id)
            }
            Err(e) => {
                tracing::warn!(error = %e, class, "failed to create fixup child");
                None
            }
        }
    }

    /// On pinser completion: parse pins from stdout, apply to the source
    /// task, and (bounded) requeue it.
    fn apply_pins_fixup(&mut self, fixup_task: &Task, job: &Job) {
        let now_ms = self.now_ms();
        let Some(pointers) = &fixup_task.pointers else {
            return;
        };
        let source_id = pointers.source_task_id.clone();

        let Some(pins) = parse_pins_payload(&job.stdout) else {
            if let Some(stored) = self.board.get_mut(&fixup_task.id) {
                stored.last_job_reason = Some(Reason::PinsApplyFailed);
                let _ = self.board.save();
            }
            return;
        };
        if pins.allowed_paths.is_empty() && pins.line_windows.is_empty() {
            return;
        }

        let cap = self.settings.get_u64("PINS_FIXUP_MAX_PER_TASK") as u32;
        {
            let Some(source) = self.board.get_mut(&source_id) else {
                return;
            };
            source.pins = Some(pins);
            source.pins_pending = false;
            if source.pins_requeue_count >= cap {
                let _ = self.board.save();
                return;
            }
            source.pins_requeue_count += 1;
        }
        let _ = self.board.save();
        if self
            .board
            .set_status(
                &source_id,
                TaskStatus::Ready,
                true,
                Some(Reason::PinsInsufficient),
                now_ms,
            )
            .is_ok()
        {
            self.emit(&Event::TaskRecovered {
                task_id: source_id,
                reason: Reason::PinsInsufficient,
            });
        }
    }

    /// On qa fixup completion: bounded requeue of the CI-failed source.
    fn requeue_ci_source(&mut self, fixup_task: &Task) {
        let now_ms = self.now_ms();
        let Some(pointers) = &fixup_task.pointers else {
            return;
        };
        let source_id = pointers.source_task_id.clone();
        let cap = self.settings.get_u64("CI_FIXUP_MAX_PER_TASK") as u32;

        {
            let Some(source) = self.board.get_mut(&source_id) else {
                return;
            };
            if source.ci_requeue_count >= cap || !source.status.is_terminal() {
                return;
            }
            source.ci_requeue_count += 1;
        }
        let _ = self.board.save();
        if self
            .board
            .set_status(&source_id, TaskStatus::Ready, true, Some(Reason::CiFailed), now_ms)
            .is_ok()
        {
            self.emit(&Event::TaskRecovered {
                task_id: source_id,
                reason: Reason::CiFailed,
            });
        }
    }

    // ── sweeps (driven by the daemon's background loops) ────────────────────

    /// Lease expiry sweep: recycle external running jobs whose lease
    /// lapsed back to queued.
    pub fn sweep_leases(&mut self) -> u32 {
        let now_ms = self.now_ms();
        let expired = self.queue.expired_leases(now_ms);
        let mut recycled = 0;
        for job_id in expired {
            let worker_id = self
                .queue
                .get(&job_id)
                .and_then(|j| j.worker_id.clone());
            if let Some(job) = self.queue.get_mut(&job_id) {
                job.reset_for_requeue();
                recycled += 1;
            }
            self.workers.release_job(&job_id);
            if let Some(task_id) = self.queue.get(&job_id).and_then(|j| j.task_id.clone()) {
                let _ = self
                    .board
                    .link_job(&task_id, job_id.clone(), JobStatus::Queued, now_ms);
            }
            self.emit(&Event::JobLeaseExpired {
                job_id,
                worker_id,
            });
        }
        if recycled > 0 {
            if let Err(e) = self.queue.save() {
                tracing::error!(error = %e, "failed to persist queue");
            }
        }
        recycled
    }

    /// Stale-task sweep: in_progress atomics with no live job go back to
    /// ready; parents with no split job go back to needs_split.
    pub fn sweep_stale_tasks(&mut self) -> u32 {
        let now_ms = self.now_ms();
        let threshold_ms = self.settings.get_u64("STALE_TASK_AFTER_MS");
        let mut recovered = 0;

        let stale: Vec<(TaskId, TaskKind)> = self
            .board
            .list()
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .filter(|t| now_ms.saturating_sub(t.updated_at_ms) >= threshold_ms)
            .filter(|t| {
                t.last_job_id
                    .as_ref()
                    .and_then(|id| self.queue.get(id))
                    .map(|j| !j.is_active())
                    .unwrap_or(true)
            })
            .map(|t| (t.id.clone(), t.kind))
            .collect();

        for (task_id, kind) in stale {
            let target = match kind {
                TaskKind::Atomic => TaskStatus::Ready,
                TaskKind::Parent => TaskStatus::NeedsSplit,
            };
            if self
                .board
                .set_status(&task_id, target, true, Some(Reason::JobMissing), now_ms)
                .is_ok()
            {
                recovered += 1;
                self.emit(&Event::TaskRecovered {
                    task_id,
                    reason: Reason::JobMissing,
                });
            }
        }
        recovered
    }

    /// Autorescue: external jobs that keep cycling get cancelled and
    /// their task re-routed to the internal runner.
    pub fn sweep_autorescue(&mut self) -> u32 {
        let now_ms = self.now_ms();
        let cap = self.settings.get_u64("AUTORESCUE_ATTEMPTS_MAX") as u32;
        let candidates: Vec<JobId> = self
            .queue
            .list()
            .iter()
            .filter(|j| j.runner == RunnerKind::External && j.is_active() && j.attempts >= cap)
            .map(|j| j.id.clone())
            .collect();

        let mut rescued = 0;
        for job_id in candidates {
            let Some(job) = self.queue.get_mut(&job_id) else {
                continue;
            };
            job.status = JobStatus::Failed;
            job.reason = Some(Reason::CanceledByLeader);
            job.finished_at_ms = Some(now_ms);
            let task_id = job.task_id.clone();
            self.workers.release_job(&job_id);
            self.emit(&Event::JobCanceled {
                job_id: job_id.clone(),
                reason: Reason::CanceledByLeader,
            });

            if let Some(task_id) = task_id {
                if let Some(task) = self.board.get_mut(&task_id) {
                    task.runner = Some(RunnerKind::Internal);
                    task.last_job_status = Some(JobStatus::Failed);
                }
                let _ = self.board.set_status(
                    &task_id,
                    TaskStatus::Ready,
                    true,
                    Some(Reason::CanceledByLeader),
                    now_ms,
                );
            }
            rescued += 1;
        }
        if rescued > 0 {
            if let Err(e) = self.queue.save() {
                tracing::error!(error = %e, "failed to persist queue");
            }
        }
        rescued
    }

    /// Long-running watchdog plus underutilization probe.
    pub fn watchdog_tick(&mut self) {
        let now_ms = self.now_ms();
        let factor = self.settings.get_u64("LONG_RUNNING_FACTOR").max(1);

        let long: Vec<(JobId, u64)> = self
            .queue
            .list()
            .iter()
            .filter(|j| j.status == JobStatus::Running)
            .filter_map(|j| {
                let started = j.started_at_ms?;
                let elapsed = now_ms.saturating_sub(started);
                (elapsed >= j.timeout_ms.saturating_mul(factor)).then(|| (j.id.clone(), elapsed))
            })
            .collect();
        for (job_id, elapsed_ms) in long {
            if self.long_running_reported.insert(job_id.clone()) {
                self.emit(&Event::JobLongRunning {
                    job_id,
                    elapsed_ms,
                });
            }
        }

        // Underutilized: queued work but running below floor for a minute.
        let queued = self.queue.queued_count();
        let running = self.queue.running_total();
        let floor = 1;
        if queued > 0 && running < floor {
            match self.underutilized_since_ms {
                None => self.underutilized_since_ms = Some(now_ms),
                Some(since) if now_ms.saturating_sub(since) >= 60_000 => {
                    self.emit(&Event::SchedulerUnderutilized { queued, running });
                    self.underutilized_since_ms = Some(now_ms);
                }
                Some(_) => {}
            }
        } else {
            self.underutilized_since_ms = None;
        }
    }

    // ── operator job control ─────────────────────────────────────────────────

    /// Cancel an external job. Internal jobs are owned by the in-process
    /// runner and cannot be cancelled from outside.
    pub fn cancel_external(&mut self, job_id: &JobId) -> Result<(), DispatchError> {
        let now_ms = self.now_ms();
        let job = self
            .queue
            .get_mut(job_id)
            .ok_or_else(|| DispatchError::rejected(Reason::Other("job_not_found".into())))?;
        if job.runner != RunnerKind::External {
            return Err(DispatchError::rejected(Reason::Other(
                "internal_job".into(),
            )));
        }
        if !job.is_active() {
            return Err(DispatchError::rejected(Reason::Other(
                "already_completed".into(),
            )));
        }
        job.status = JobStatus::Failed;
        job.reason = Some(Reason::CanceledByLeader);
        job.finished_at_ms = Some(now_ms);
        let task_id = job.task_id.clone();
        self.workers.release_job(job_id);
        self.queue.save()?;
        self.emit(&Event::JobCanceled {
            job_id: job_id.clone(),
            reason: Reason::CanceledByLeader,
        });
        if let Some(task_id) = task_id {
            let _ = self.board.set_status(
                &task_id,
                TaskStatus::Failed,
                false,
                Some(Reason::CanceledByLeader),
                now_ms,
            );
            let _ = self
                .board
                .link_job(&task_id, job_id.clone(), JobStatus::Failed, now_ms);
        }
        Ok(())
    }

    /// Requeue an external job: identity on the job id, outputs cleared,
    /// attempts preserved.
    pub fn requeue_external(&mut self, job_id: &JobId) -> Result<(), DispatchError> {
        let now_ms = self.now_ms();
        let job = self
            .queue
            .get_mut(job_id)
            .ok_or_else(|| DispatchError::rejected(Reason::Other("job_not_found".into())))?;
        if job.runner != RunnerKind::External {
            return Err(DispatchError::rejected(Reason::Other(
                "internal_job".into(),
            )));
        }
        job.reset_for_requeue();
        let task_id = job.task_id.clone();
        self.workers.release_job(job_id);
        self.queue.save()?;
        if let Some(task_id) = task_id {
            let _ = self
                .board
                .link_job(&task_id, job_id.clone(), JobStatus::Queued, now_ms);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "fixup_tests.rs"]
mod tests;
