// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Engine` aggregate: explicitly owned control-plane state.
//!
//! HTTP handlers and background loops receive this behind one lock; there
//! is no module-level mutable state anywhere in the crate. Dispatch,
//! verdict, and recovery logic live in their own modules as further
//! `impl` blocks on this type.

use af_core::{
    Clock, Event, ExecutorKind, IdGen, Job, JobStatus, Reason, Role, RunnerKind, Settings,
};
use af_storage::{read_json, write_json_atomic, EventLog, JsonlWriter, StateLayout, StoreError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::board::Taskboard;
use crate::breaker::{cluster_key, BreakerChange, Degradation, MatrixAction, Signals};
use crate::pack::ContextPackBuilder;
use crate::quality::QualityTracker;
use crate::queue::JobQueue;
use crate::router::ModelRouter;
use crate::workers::WorkerRegistry;

/// Operator-set mission, persisted next to the board.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mission {
    #[serde(default)]
    pub text: String,
}

/// What startup recovery had to repair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartupReport {
    pub demoted_jobs: u32,
    pub reset_tasks: u32,
}

/// The control-plane aggregate.
pub struct Engine<C: Clock, G: IdGen> {
    pub clock: C,
    pub idgen: G,
    pub layout: StateLayout,
    pub settings: Settings,
    pub board: Taskboard,
    pub queue: JobQueue,
    pub workers: WorkerRegistry,
    pub degradation: Degradation,
    pub quality: QualityTracker,
    pub router: ModelRouter,
    pub packs: ContextPackBuilder,
    pub mission: Mission,

    /// WIP clamp from the degradation matrix, when active.
    pub wip_override: Option<u32>,
    /// Fixup-child creation disabled by the degradation matrix.
    pub fixups_disabled: bool,
    /// Jobs already flagged by the long-running watchdog.
    pub(crate) long_running_reported: std::collections::HashSet<af_core::JobId>,
    /// When the queued>0 / running<floor condition started, for the
    /// underutilization watchdog.
    pub(crate) underutilized_since_ms: Option<u64>,

    pub(crate) events: EventLog,
    pub(crate) jobs_log: JsonlWriter,
    pub(crate) failures_log: JsonlWriter,
    pub(crate) route_log: JsonlWriter,
    pub(crate) ci_results_log: JsonlWriter,
    pub(crate) ci_failures_log: JsonlWriter,
    pub(crate) heartbeat_log: JsonlWriter,
}

impl<C: Clock, G: IdGen> Engine<C, G> {
    /// Load all persisted state under the layout root and open the logs.
    pub fn open(
        layout: StateLayout,
        settings: Settings,
        allowed_roots: Vec<PathBuf>,
        clock: C,
        idgen: G,
    ) -> Result<(Self, StartupReport), StoreError> {
        layout.ensure()?;

        let board = Taskboard::load(layout.tasks_file());
        let (queue, demoted_jobs) = JobQueue::load(layout.jobs_state_file());
        let degradation: Degradation = read_json(&layout.breaker_file(), Degradation::default());
        let mission: Mission = read_json(&layout.mission_file(), Mission::default());
        let router = ModelRouter::new(layout.model_rr_file());
        let packs = ContextPackBuilder::new(layout.clone(), allowed_roots);

        let mut engine = Self {
            clock,
            idgen,
            settings,
            board,
            queue,
            workers: WorkerRegistry::new(),
            degradation,
            quality: QualityTracker::new(),
            router,
            packs,
            mission,
            wip_override: None,
            fixups_disabled: false,
            long_running_reported: std::collections::HashSet::new(),
            underutilized_since_ms: None,
            events: EventLog::open(&layout.state_events_log())?,
            jobs_log: JsonlWriter::open(&layout.jobs_log())?,
            failures_log: JsonlWriter::open(&layout.failures_log())?,
            route_log: JsonlWriter::open(&layout.route_decisions_log())?,
            ci_results_log: JsonlWriter::open(&layout.ci_gate_results_log())?,
            ci_failures_log: JsonlWriter::open(&layout.ci_failures_log())?,
            heartbeat_log: JsonlWriter::open(&layout.heartbeat_log())?,
            layout,
        };

        // Atomic tasks stranded in_progress with no surviving active job
        // go back to ready.
        let now_ms = engine.clock.epoch_ms();
        let stranded: Vec<af_core::TaskId> = engine
            .board
            .list()
            .iter()
            .filter(|t| {
                t.kind == af_core::TaskKind::Atomic
                    && t.status == af_core::TaskStatus::InProgress
                    && t.last_job_id
                        .as_ref()
                        .and_then(|id| engine.queue.get(id))
                        .map(|j| !j.is_active())
                        .unwrap_or(true)
            })
            .map(|t| t.id.clone())
            .collect();
        let reset_tasks = stranded.len() as u32;
        for task_id in stranded {
            let _ = engine.board.set_status(
                &task_id,
                af_core::TaskStatus::Ready,
                true,
                Some(Reason::JobMissing),
                now_ms,
            );
        }

        let report = StartupReport {
            demoted_jobs,
            reset_tasks,
        };
        if demoted_jobs > 0 || reset_tasks > 0 {
            engine.queue.save()?;
            engine.emit(&Event::StateRecovered {
                demoted_jobs,
                reset_tasks,
            });
        }

        Ok((engine, report))
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// Append to the audit stream. Event-log write failures must never
    /// take the control plane down; they are logged and dropped.
    pub fn emit(&self, event: &Event) {
        if let Err(e) = self.events.append(event) {
            tracing::error!(error = %e, "failed to append event");
        }
    }

    pub fn persist_degradation(&self) {
        if let Err(e) = write_json_atomic(&self.layout.breaker_file(), &self.degradation) {
            tracing::error!(error = %e, "failed to persist breaker state");
        }
    }

    pub fn set_mission(&mut self, text: String) -> Result<(), StoreError> {
        self.mission = Mission { text };
        write_json_atomic(&self.layout.mission_file(), &self.mission)
    }

    /// Effective internal concurrency cap for an executor.
    pub fn internal_cap(&self, executor: ExecutorKind) -> u32 {
        let configured = match executor {
            ExecutorKind::Codex => self.settings.get_u64("EXEC_CONCURRENCY_CODEX"),
            ExecutorKind::Opencodecli => self.settings.get_u64("EXEC_CONCURRENCY_OPENCODE"),
        } as u32;
        match self.wip_override {
            Some(clamp) => configured.min(clamp),
            None => configured,
        }
    }

    pub fn external_cap(&self) -> u32 {
        self.settings.get_u64("EXEC_EXTERNAL_CONCURRENCY") as u32
    }

    pub fn timeout_ms_for(&self, executor: ExecutorKind) -> u64 {
        match executor {
            ExecutorKind::Codex => self.settings.get_u64("EXEC_TIMEOUT_CODEX_MS"),
            ExecutorKind::Opencodecli => self.settings.get_u64("EXEC_TIMEOUT_OPENCODE_MS"),
        }
    }

    /// Mark the next runnable internal job as running and return a clone
    /// for the caller to execute. Honors per-executor caps.
    pub fn start_next_internal(&mut self, executor: ExecutorKind) -> Option<Job> {
        if self.queue.running_count(executor, RunnerKind::Internal) >= self.internal_cap(executor) {
            return None;
        }
        let job_id = self.queue.next_internal(executor)?.id.clone();
        let now_ms = self.now_ms();
        let job = self.queue.get_mut(&job_id)?;
        job.status = JobStatus::Running;
        job.started_at_ms = Some(now_ms);
        job.attempts += 1;
        let snapshot = job.clone();

        if let Some(task_id) = snapshot.task_id.clone() {
            let _ = self
                .board
                .link_job(&task_id, snapshot.id.clone(), JobStatus::Running, now_ms);
        }
        if let Err(e) = self.queue.save() {
            tracing::error!(error = %e, "failed to persist queue");
        }
        self.emit(&Event::JobStarted {
            job_id: snapshot.id.clone(),
            executor: snapshot.executor,
            model: snapshot.model.clone(),
            worker_id: None,
        });
        Some(snapshot)
    }

    /// Record a failed job into the failure stream and feed the breaker
    /// and quality trackers. Returns any breaker transition.
    pub(crate) fn record_failure(
        &mut self,
        job: &Job,
        reason: &Reason,
        role: Role,
        task_class: Option<&str>,
    ) -> BreakerChange {
        let now_ms = self.now_ms();
        if let Err(e) = self.failures_log.append(&serde_json::json!({
            "job_id": job.id,
            "task_id": job.task_id,
            "executor": job.executor,
            "model": job.model,
            "reason": reason.as_code(),
            "role": role.as_str(),
            "task_class": task_class,
            "at_ms": now_ms,
        })) {
            tracing::error!(error = %e, "failed to append failure record");
        }

        if let Some(area) = &job.area {
            let window = self.settings.get_u64("QUALITY_GATE_WINDOW") as usize;
            self.quality.record(area, true, window);
        }

        let cluster = cluster_key(reason, role, task_class, job.executor);
        let change = self
            .degradation
            .record_failure(&cluster, reason, now_ms, &self.settings);
        match &change {
            BreakerChange::Opened {
                cluster,
                cooldown_ms,
            }
            | BreakerChange::Reopened {
                cluster,
                cooldown_ms,
            } => {
                self.emit(&Event::BreakerOpened {
                    cluster: cluster.clone(),
                    fail_count: self
                        .degradation
                        .breakers
                        .get(cluster)
                        .map(|b| b.fail_count)
                        .unwrap_or(0),
                    cooldown_ms: *cooldown_ms,
                });
            }
            _ => {}
        }
        self.persist_degradation();
        change
    }

    /// Record a successful job for breaker/quality purposes.
    pub(crate) fn record_success(&mut self, job: &Job, role: Role, task_class: Option<&str>) {
        if let Some(area) = &job.area {
            let window = self.settings.get_u64("QUALITY_GATE_WINDOW") as usize;
            self.quality.record(area, false, window);
        }
        // A success closes the breaker keyed by the task's last failure
        // reason; with no prior failure there is nothing to close.
        let last_reason = job
            .task_id
            .as_ref()
            .and_then(|task_id| self.board.get(task_id))
            .and_then(|t| t.last_job_reason.clone());
        if let Some(reason) = last_reason {
            let cluster = cluster_key(&reason, role, task_class, job.executor);
            if let BreakerChange::Closed { cluster } = self.degradation.record_success(&cluster) {
                self.emit(&Event::BreakerClosed { cluster });
            }
            self.persist_degradation();
        }
    }

    /// Evaluate the degradation matrix and apply the most severe match.
    pub fn apply_degradation_matrix(&mut self) {
        let now_ms = self.now_ms();
        let open_breakers = self
            .degradation
            .breakers
            .values()
            .filter(|b| b.phase == crate::breaker::BreakerPhase::Open)
            .count();
        let signals = Signals {
            queue_overload: self
                .degradation
                .fixup_fused(self.queue.queued_count(), &self.settings),
            breaker_open: open_breakers >= 1,
            failure_storm: open_breakers >= 2,
        };

        let rules = crate::breaker::default_matrix();
        let Some(rule) = crate::breaker::evaluate_matrix(&rules, &signals) else {
            self.wip_override = None;
            self.fixups_disabled = false;
            return;
        };

        tracing::warn!(rule = rule.name, "degradation matrix engaged");
        for action in &rule.actions {
            match action {
                MatrixAction::TightenWip(clamp) => self.wip_override = Some(*clamp),
                MatrixAction::DisableFixups => self.fixups_disabled = true,
                MatrixAction::RaiseQuarantine(span_ms) => {
                    if !self.degradation.in_quarantine(now_ms) {
                        self.degradation.raise_quarantine(now_ms + span_ms, rule.name);
                        self.emit(&Event::QuarantineRaised {
                            until_ms: now_ms + span_ms,
                            reason: rule.name.to_string(),
                        });
                        self.persist_degradation();
                    }
                }
            }
        }
    }

    /// Append one heartbeat line (queued/running/worker counts).
    pub fn append_heartbeat(&self) {
        let now_ms = self.now_ms();
        let window_ms = self.settings.get_u64("WORKER_ACTIVE_WINDOW_MS");
        let _ = self.heartbeat_log.append(&serde_json::json!({
            "at_ms": now_ms,
            "queued": self.queue.queued_count(),
            "running": self.queue.running_total(),
            "workers": self.workers.active_count(now_ms, window_ms),
        }));
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
