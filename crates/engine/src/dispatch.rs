// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Preflight and dispatch gate: the ordered checks a task passes before
//! it becomes a job. Any failing check returns a named reason and no job
//! is created.

use af_core::{
    Clock, Event, ExecutorKind, IdGen, Job, JobStatus, Pins, Reason, Role, RunnerKind, Task,
    TaskKind, TaskStatus,
};

use crate::board::infer_files;
use crate::breaker::cluster_key;
use crate::engine::Engine;
use crate::error::{DispatchError, PackError};
use crate::prompt::build_prompt;
use crate::router::RoutingMode;

impl<C: Clock, G: IdGen> Engine<C, G> {
    /// Run the full gate for a board task and enqueue its job.
    pub fn dispatch(&mut self, task_id: &af_core::TaskId) -> Result<Job, DispatchError> {
        let now_ms = self.now_ms();

        // 1. Task exists, is atomic, is dispatchable.
        let task = self
            .board
            .get(task_id)
            .ok_or_else(|| DispatchError::rejected(Reason::Other("task_not_found".into())))?
            .clone();
        if task.kind != TaskKind::Atomic {
            return Err(DispatchError::rejected(Reason::Other("not_atomic".into())));
        }
        // in_progress passes through here so the idempotency check below
        // can name the active job; without one it is rejected after it.
        if !matches!(
            task.status,
            TaskStatus::Ready | TaskStatus::Backlog | TaskStatus::InProgress
        ) {
            return Err(DispatchError::rejected(Reason::Other(
                "not_dispatchable".into(),
            )));
        }
        if task.pins_pending {
            return Err(DispatchError::rejected(Reason::Other("pins_pending".into())));
        }
        if task.lane.is_parked() {
            return Err(DispatchError::rejected(Reason::Other("lane_parked".into())));
        }
        if task.in_cooldown(now_ms) {
            return Err(DispatchError::rejected(Reason::Other("cooling_down".into())));
        }

        // 2. At least one real test.
        if self.settings.get_bool("CI_GATE_ENABLED")
            && !af_adapters::has_real_test(&task.allowed_tests)
        {
            return Err(DispatchError::rejected(Reason::MissingRealTest));
        }

        // 3. Idempotency: no active job for this task.
        if self.settings.get_bool("DISPATCH_IDEMPOTENCY") {
            if let Some(active) = self.queue.active_for_task(task_id) {
                return Err(DispatchError::Rejected {
                    reason: Reason::AlreadyDispatched,
                    job_id: Some(active.id.clone()),
                });
            }
            if task.has_active_job() {
                return Err(DispatchError::Rejected {
                    reason: Reason::AlreadyDispatched,
                    job_id: task.last_job_id.clone(),
                });
            }
        }
        if task.status == TaskStatus::InProgress {
            // Mid-flight with no active job: stale, left to the sweeps.
            return Err(DispatchError::rejected(Reason::Other(
                "not_dispatchable".into(),
            )));
        }

        // 4. Files / pins inference (may mutate the task, then re-check).
        let task = self.infer_context(task, now_ms)?;

        // 5. Quality gate.
        if let Some(area) = &task.area {
            if self.quality.should_block(area, &self.settings) {
                return Err(DispatchError::rejected(Reason::QualityGateBlocked));
            }
        }

        // Quarantine allowlist.
        if !self.degradation.quarantine_admits(
            task.role,
            task.task_class.as_deref(),
            now_ms,
            &self.settings,
        ) {
            return Err(DispatchError::rejected(Reason::Quarantined));
        }

        // 6. Resolve effective pins under policy.
        if self.settings.get_bool("EXEC_REQUIRE_PINS_TEMPLATE")
            && task.pins_instance.is_some()
            && task.template_id.is_none()
        {
            return Err(DispatchError::rejected(Reason::MissingPinsTemplate));
        }
        let pins = task.effective_pins();
        if self.settings.get_bool("EXEC_REQUIRE_PINS") && pins.is_none() {
            return Err(DispatchError::rejected(Reason::MissingPins));
        }
        if self.settings.get_bool("EXEC_REQUIRE_CONTRACT") && task.contract.is_none() {
            return Err(DispatchError::rejected(Reason::Other(
                "missing_contract".into(),
            )));
        }

        // 7. Context pack.
        let pack = self.build_pack(&task, pins.as_ref())?;

        // 8. Executor.
        let executor = self.pick_executor(&task);

        // Breaker check for the failure cluster this dispatch would rejoin.
        if let Some(reason) = &task.last_job_reason {
            let cluster = cluster_key(reason, task.role, task.task_class.as_deref(), executor);
            if self.degradation.is_open(&cluster, now_ms) {
                return Err(DispatchError::rejected(Reason::BreakerOpen));
            }
        }

        // 9. Model.
        let mode = RoutingMode::parse(&self.settings.get_str("MODEL_ROUTING_MODE"));
        let pool = self.router.pool_for(&task, executor, &self.settings);
        let attempt = task.model_attempt.max(task.timeout_retries);
        let model = self
            .router
            .pick(&pool, mode, attempt)?
            .ok_or_else(|| DispatchError::rejected(Reason::Other("no_model_available".into())))?;

        // 10. Create the job and record the route.
        let pack_text = pack.as_ref().and_then(|meta| self.packs.read(&meta.id));
        let prompt = build_prompt(
            &task,
            Some(self.mission.text.as_str()),
            pack_text.as_deref(),
            None,
        );

        let runner = task.runner.unwrap_or(RunnerKind::Internal);
        let job = Job {
            id: af_core::JobId::new(self.idgen.next()),
            task_id: Some(task.id.clone()),
            created_at_ms: now_ms,
            started_at_ms: None,
            finished_at_ms: None,
            attempts: 0,
            executor,
            model: model.clone(),
            timeout_ms: self.timeout_ms_for(executor),
            runner,
            worker_id: None,
            lease_until_ms: None,
            prompt,
            context_pack_id: pack.as_ref().map(|meta| meta.id.clone()),
            thread_id: Some(self.idgen.next()),
            allowed_tests: task.allowed_tests.clone(),
            area: task.area.clone(),
            priority: task.effective_priority(),
            status: JobStatus::Queued,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            reason: None,
            submit: None,
            patch_stats: None,
            usage: None,
            ci_gate: None,
        };

        self.emit(&Event::RouteDecision {
            task_id: task.id.clone(),
            job_id: job.id.clone(),
            executor,
            model: model.clone(),
            mode: mode.as_str().to_string(),
            attempt,
        });
        if let Err(e) = self.route_log.append(&serde_json::json!({
            "task_id": task.id,
            "job_id": job.id,
            "executor": executor,
            "model": model,
            "mode": mode.as_str(),
            "attempt": attempt,
            "at_ms": now_ms,
        })) {
            tracing::error!(error = %e, "failed to append route decision");
        }

        self.queue.insert(job.clone())?;
        self.emit(&Event::JobCreated {
            job_id: job.id.clone(),
            task_id: Some(task.id.clone()),
            executor,
            model,
            runner,
        });

        // Task moves to in_progress behind its new job.
        if task.status == TaskStatus::Backlog {
            self.board
                .set_status(&task.id, TaskStatus::Ready, false, None, now_ms)?;
        }
        self.board
            .set_status(&task.id, TaskStatus::InProgress, false, None, now_ms)?;
        self.board
            .link_job(&task.id, job.id.clone(), JobStatus::Queued, now_ms)?;

        Ok(job)
    }

    /// Step 4 of the gate: infer files and default pins, persisting any
    /// mutation back to the board.
    fn infer_context(&mut self, mut task: Task, now_ms: u64) -> Result<Task, DispatchError> {
        let mut mutated = false;

        if task.files.is_empty() && task.pins.is_none() && task.pins_instance.is_none() {
            let inferred = infer_files(&format!("{} {}", task.title, task.goal));
            if !inferred.is_empty() {
                task.files = inferred;
                task.files.truncate(af_core::task::MAX_FILES);
                mutated = true;
            }
        }
        if task.pins.is_none() && !task.files.is_empty() {
            task.pins = Some(Pins::from_files(&task.files));
            mutated = true;
        }

        if task.files.is_empty() && task.pins.is_none() && task.pins_instance.is_none() {
            return Err(DispatchError::rejected(Reason::MissingFiles));
        }

        if mutated {
            if let Some(stored) = self.board.get_mut(&task.id) {
                stored.files = task.files.clone();
                stored.pins = task.pins.clone();
                stored.updated_at_ms = now_ms;
            }
            self.board.save()?;
        }
        Ok(task)
    }

    /// Step 7: pins-mode pack when line windows exist, else file mode
    /// over the allowlist (or the task file list).
    fn build_pack(
        &self,
        task: &Task,
        pins: Option<&Pins>,
    ) -> Result<Option<crate::pack::PackMeta>, DispatchError> {
        let max_bytes = crate::pack::DEFAULT_PACK_BYTES;
        let result = match pins {
            Some(p) if !p.line_windows.is_empty() => {
                self.packs.create_from_pins(p, max_bytes, &self.idgen)
            }
            Some(p) => {
                let paths = if p.allowed_paths.is_empty() {
                    task.files.clone()
                } else {
                    p.allowed_paths.clone()
                };
                self.packs.create_from_files(&paths, max_bytes, &self.idgen)
            }
            None if !task.files.is_empty() => {
                self.packs
                    .create_from_files(&task.files, max_bytes, &self.idgen)
            }
            None => return Ok(None),
        };

        match result {
            Ok(meta) => {
                let event = if meta.windows > 0 {
                    Event::PackPinsCreated {
                        pack_id: meta.id.clone(),
                        files: meta.files,
                        windows: meta.windows,
                        bytes: meta.bytes,
                    }
                } else {
                    Event::PackFilesCreated {
                        pack_id: meta.id.clone(),
                        files: meta.files,
                        bytes: meta.bytes,
                    }
                };
                self.emit(&event);
                Ok(Some(meta))
            }
            Err(PackError::EmptyPack) => {
                Err(DispatchError::rejected(Reason::PinsInsufficient))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Step 8: hard role pin, single allowed executor, or ratio balance.
    fn pick_executor(&self, task: &Task) -> ExecutorKind {
        if let Some(pinned) = task.role.rules().executor_pin {
            if task.allowed_executors.contains(&pinned) || task.allowed_executors.is_empty() {
                return pinned;
            }
        }
        match task.allowed_executors.as_slice() {
            [single] => *single,
            [] => ExecutorKind::Codex,
            allowed => {
                let occli = self
                    .queue
                    .running_count(ExecutorKind::Opencodecli, RunnerKind::Internal)
                    + self
                        .queue
                        .running_count(ExecutorKind::Opencodecli, RunnerKind::External);
                let total = self.queue.running_total();
                let share = self.settings.get_f64("EXEC_OPENCODE_SHARE");
                let target = if total == 0 {
                    true
                } else {
                    (occli as f64) / (total as f64 + 1.0) < share
                };
                if target && allowed.contains(&ExecutorKind::Opencodecli) {
                    ExecutorKind::Opencodecli
                } else {
                    ExecutorKind::Codex
                }
            }
        }
    }

    /// Bump the role to designer and dispatch a split-planner job for a
    /// parent task.
    pub fn dispatch_split(&mut self, task_id: &af_core::TaskId) -> Result<Job, DispatchError> {
        let now_ms = self.now_ms();
        let task = self
            .board
            .get(task_id)
            .ok_or_else(|| DispatchError::rejected(Reason::Other("task_not_found".into())))?
            .clone();
        if task.kind != TaskKind::Parent {
            return Err(DispatchError::rejected(Reason::Other("not_parent".into())));
        }
        if !matches!(task.status, TaskStatus::NeedsSplit | TaskStatus::InProgress) {
            return Err(DispatchError::rejected(Reason::Other(
                "not_splittable".into(),
            )));
        }
        if self.settings.get_bool("DISPATCH_IDEMPOTENCY") {
            if let Some(active) = self.queue.active_for_task(task_id) {
                return Err(DispatchError::Rejected {
                    reason: Reason::AlreadyDispatched,
                    job_id: Some(active.id.clone()),
                });
            }
        }
        if task.status == TaskStatus::InProgress {
            return Err(DispatchError::rejected(Reason::Other(
                "not_splittable".into(),
            )));
        }

        // Planner runs as the designer: codex, strong-first.
        let mut planner = task.clone();
        planner.role = Role::Designer;
        let executor = ExecutorKind::Codex;
        let pool = self.router.pool_for(&planner, executor, &self.settings);
        let mode = if self.settings.get_bool("REQUIRE_DESIGNER_STRONG") {
            RoutingMode::StrongFirst
        } else {
            RoutingMode::parse(&self.settings.get_str("MODEL_ROUTING_MODE"))
        };
        let model = self
            .router
            .pick(&pool, mode, 0)?
            .ok_or_else(|| DispatchError::rejected(Reason::Other("no_model_available".into())))?;

        let prompt = build_prompt(&planner, Some(self.mission.text.as_str()), None, None);
        let job = Job {
            id: af_core::JobId::new(self.idgen.next()),
            task_id: Some(task.id.clone()),
            created_at_ms: now_ms,
            started_at_ms: None,
            finished_at_ms: None,
            attempts: 0,
            executor,
            model: model.clone(),
            timeout_ms: self.timeout_ms_for(executor),
            runner: RunnerKind::Internal,
            worker_id: None,
            lease_until_ms: None,
            prompt,
            context_pack_id: None,
            thread_id: Some(self.idgen.next()),
            allowed_tests: Vec::new(),
            area: task.area.clone(),
            priority: task.effective_priority(),
            status: JobStatus::Queued,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            reason: None,
            submit: None,
            patch_stats: None,
            usage: None,
            ci_gate: None,
        };

        self.queue.insert(job.clone())?;
        self.emit(&Event::JobCreated {
            job_id: job.id.clone(),
            task_id: Some(task.id.clone()),
            executor,
            model,
            runner: RunnerKind::Internal,
        });
        self.board
            .set_status(&task.id, TaskStatus::InProgress, false, None, now_ms)?;
        self.board
            .link_job(&task.id, job.id.clone(), JobStatus::Queued, now_ms)?;
        Ok(job)
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
