// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Verdict pipeline: everything that happens when a job reaches a
//! terminal status. Split in two so the CI subprocess never runs under
//! the engine lock:
//!
//! 1. [`Engine::begin_completion`] stores outputs, parses the SUBMIT
//!    contract, and plans the CI gate.
//! 2. The caller runs the planned CI command (if any) without the lock.
//! 3. [`Engine::finalize_completion`] applies the gate result, the
//!    hygiene gate, failure classification, board fanout, and the
//!    recovery loops.

use af_core::{
    Clock, Event, IdGen, JobId, JobStatus, PatchStats, Reason, Submit, SubmitStatus, TaskStatus,
    WorkerId,
};
use af_adapters::{classify_run, has_real_test, is_selftest, resolve_ci_command, RunOutcome};
use af_storage::{write_ci_evidence, EvidenceFiles};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::engine::Engine;
use crate::error::DispatchError;

/// Raw outputs of a finished run (internal driver or external worker).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionOutputs {
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub timed_out: bool,
    /// Reason already classified upstream (spawn errors).
    #[serde(default)]
    pub reason: Option<Reason>,
}

impl From<RunOutcome> for CompletionOutputs {
    fn from(outcome: RunOutcome) -> Self {
        Self {
            exit_code: outcome.exit_code,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            timed_out: outcome.timed_out,
            reason: None,
        }
    }
}

/// The CI command to run after `begin_completion`, if the gate applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiPlan {
    pub command: String,
    pub cwd: PathBuf,
    pub timeout_ms: u64,
}

/// Outcome of `begin_completion`: run `ci` (if any), then finalize.
#[derive(Debug, Clone)]
pub struct CompletionPlan {
    pub job_id: JobId,
    pub ci: Option<CiPlan>,
}

/// Result of the CI command run handed to `finalize_completion`.
#[derive(Debug, Clone)]
pub struct CiRunResult {
    pub command: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
}

impl<C: Clock, G: IdGen> Engine<C, G> {
    /// Store a finished run's outputs and plan the CI gate.
    ///
    /// `from_worker` guards external completions: a stale worker (lease
    /// recycled, job reassigned) is rejected.
    pub fn begin_completion(
        &mut self,
        job_id: &JobId,
        outputs: CompletionOutputs,
        from_worker: Option<&WorkerId>,
    ) -> Result<CompletionPlan, DispatchError> {
        let now_ms = self.now_ms();
        let job = self
            .queue
            .get_mut(job_id)
            .ok_or_else(|| DispatchError::rejected(Reason::Other("job_not_found".into())))?;

        if let Some(worker_id) = from_worker {
            if job.worker_id.as_ref() != Some(worker_id) || job.status != JobStatus::Running {
                return Err(DispatchError::rejected(Reason::Other(
                    "stale_completion".into(),
                )));
            }
        } else if job.status.is_terminal() {
            return Err(DispatchError::rejected(Reason::Other(
                "already_completed".into(),
            )));
        }

        job.finished_at_ms = Some(now_ms);
        job.exit_code = outputs.exit_code;
        job.stdout = outputs.stdout;
        job.stderr = outputs.stderr;
        job.lease_until_ms = None;

        // 1. Patch stats (informational).
        job.patch_stats = PatchStats::from_stdout(&job.stdout);

        // 2. Run-level classification.
        let run_reason = outputs.reason.or_else(|| {
            classify_run(&RunOutcome {
                ok: !outputs.timed_out && outputs.exit_code == Some(0),
                exit_code: outputs.exit_code,
                stdout: job.stdout.clone(),
                stderr: job.stderr.clone(),
                timed_out: outputs.timed_out,
            })
        });
        match run_reason {
            Some(reason) => {
                job.status = JobStatus::Failed;
                job.reason = Some(reason);
            }
            None => job.status = JobStatus::Done,
        }

        // 3. SUBMIT parse.
        match Submit::extract(&job.stdout) {
            Some(Ok(submit)) => {
                if !submit.schema_ok() {
                    job.status = JobStatus::Failed;
                    job.reason = Some(Reason::SchemaViolation);
                } else if submit.status != SubmitStatus::Done && job.status == JobStatus::Done {
                    job.status = JobStatus::Failed;
                    job.reason = Some(
                        submit
                            .reason_code
                            .as_deref()
                            .map(Reason::from_code)
                            .unwrap_or(Reason::Other("submit_not_done".into())),
                    );
                }
                job.submit = serde_json::to_value(&submit).ok();
            }
            Some(Err(_)) => {
                job.status = JobStatus::Failed;
                job.reason = Some(Reason::SchemaViolation);
            }
            None => {
                let strict = self.settings.get_bool("OCCLI_REQUIRE_SUBMIT");
                if strict
                    && job.executor == af_core::ExecutorKind::Opencodecli
                    && job.status == JobStatus::Done
                {
                    job.status = JobStatus::Failed;
                    job.reason = Some(Reason::MissingSubmitContract);
                }
            }
        }

        // 4. CI gate plan, only while still done.
        let mut ci = None;
        if job.status == JobStatus::Done && self.settings.get_bool("CI_GATE_ENABLED") {
            let allow_all = self.settings.get_bool("CI_GATE_ALLOW_ALL");
            let task_id = job
                .task_id
                .as_ref()
                .map(|t| t.as_str().to_string())
                .unwrap_or_default();
            match resolve_ci_command(
                &job.allowed_tests,
                &task_id,
                job.id.as_str(),
                job.area.as_deref(),
                allow_all,
            ) {
                Some(command) => {
                    let cwd = self.settings.get_str("CI_GATE_CWD");
                    let cwd = if cwd.is_empty() {
                        self.layout.root().to_path_buf()
                    } else {
                        PathBuf::from(cwd)
                    };
                    ci = Some(CiPlan {
                        command,
                        cwd,
                        timeout_ms: self.settings.get_u64("CI_GATE_TIMEOUT_MS"),
                    });
                }
                None => {
                    if has_real_test(&job.allowed_tests)
                        || job.allowed_tests.iter().any(|t| is_selftest(t))
                    {
                        // A test was required but nothing is allowed to run.
                        job.status = JobStatus::Failed;
                        job.reason = Some(Reason::CiFailed);
                        if let Err(e) = self.ci_failures_log.append(&serde_json::json!({
                            "job_id": job_id,
                            "detail": Reason::NoAllowedCommand.as_code(),
                            "at_ms": now_ms,
                        })) {
                            tracing::error!(error = %e, "failed to append ci failure");
                        }
                    }
                }
            }
        }

        let plan = CompletionPlan {
            job_id: job_id.clone(),
            ci,
        };
        if let Err(e) = self.queue.save() {
            tracing::error!(error = %e, "failed to persist queue");
        }
        Ok(plan)
    }

    /// Apply the CI result, hygiene gate, board fanout, and loops.
    pub fn finalize_completion(
        &mut self,
        job_id: &JobId,
        ci: Option<CiRunResult>,
    ) -> Result<(), DispatchError> {
        let now_ms = self.now_ms();

        // 3 (continued). CI gate evidence and verdict.
        if let Some(result) = ci {
            self.apply_ci_result(job_id, result)?;
        } else {
            let job = self
                .queue
                .get(job_id)
                .ok_or_else(|| DispatchError::rejected(Reason::Other("job_not_found".into())))?;
            if job.status == JobStatus::Done && self.settings.get_bool("CI_GATE_ENABLED") {
                // Gate enabled but nothing ran (no tests configured).
                if job.allowed_tests.is_empty() {
                    self.emit(&Event::CiGateSkipped {
                        job_id: job_id.clone(),
                        reason: Reason::CiSkipped,
                    });
                }
            }
        }

        // 4. Hygiene gate while still done.
        self.apply_hygiene(job_id);
        if let Err(e) = self.queue.save() {
            tracing::error!(error = %e, "failed to persist queue");
        }

        // 5–7. Classification, board update, loops.
        let Some(job) = self.queue.get(job_id).cloned() else {
            return Err(DispatchError::rejected(Reason::Other(
                "job_not_found".into(),
            )));
        };

        self.emit(&Event::JobFinished {
            job_id: job.id.clone(),
            status: job.status,
            exit_code: job.exit_code,
            reason: job.reason.clone(),
        });
        if let Err(e) = self.jobs_log.append(&serde_json::json!({
            "job_id": job.id,
            "task_id": job.task_id,
            "status": job.status,
            "executor": job.executor,
            "model": job.model,
            "reason": job.reason.as_ref().map(|r| r.as_code()),
            "at_ms": now_ms,
        })) {
            tracing::error!(error = %e, "failed to append job record");
        }

        self.write_thread_artifact(&job);
        self.workers.release_job(&job.id);

        let Some(task_id) = job.task_id.clone() else {
            // Direct job with no board task: nothing to fan out.
            if let Err(e) = self.queue.save() {
                tracing::error!(error = %e, "failed to persist queue");
            }
            return Ok(());
        };
        let Some(task) = self.board.get(&task_id).cloned() else {
            return Ok(());
        };

        // Breaker and quality bookkeeping.
        match (&job.status, &job.reason) {
            (JobStatus::Failed, Some(reason)) => {
                let reason = reason.clone();
                self.record_failure(&job, &reason, task.role, task.task_class.as_deref());
            }
            (JobStatus::Done, _) => {
                self.record_success(&job, task.role, task.task_class.as_deref());
            }
            _ => {}
        }

        // Planner job for a parent: split-apply happens via the explicit
        // endpoint, so the parent just leaves in_progress on failure.
        if task.kind == af_core::TaskKind::Parent {
            if job.status == JobStatus::Failed {
                self.board.set_status(
                    &task_id,
                    TaskStatus::Failed,
                    false,
                    job.reason.clone(),
                    now_ms,
                )?;
            }
            self.board
                .link_job(&task_id, job.id.clone(), job.status, now_ms)?;
            return Ok(());
        }

        // 6. Board update.
        let task_status = match job.status {
            JobStatus::Done => TaskStatus::Done,
            _ => TaskStatus::Failed,
        };
        self.board
            .set_status(&task_id, task_status, false, job.reason.clone(), now_ms)?;
        self.board
            .link_job(&task_id, job.id.clone(), job.status, now_ms)?;
        if let Some(stored) = self.board.get_mut(&task_id) {
            stored.last_job_finished_at_ms = Some(now_ms);
        }
        self.board.save()?;

        self.emit(&Event::BoardTaskCompleted {
            task_id: task_id.clone(),
            job_id: job.id.clone(),
            status: task_status,
            reason: job.reason.clone(),
        });

        // 7. Recovery loops.
        if job.status == JobStatus::Failed {
            self.run_failure_loops(&task_id, &job);
        } else {
            self.handle_success_loops(&task_id, &job);
        }

        Ok(())
    }

    fn apply_ci_result(
        &mut self,
        job_id: &JobId,
        result: CiRunResult,
    ) -> Result<(), DispatchError> {
        let slop_ms = self.settings.get_u64("CI_ANTIFORGERY_SINCE_MS");
        let evidence = write_ci_evidence(
            &self.layout.ci_gate_dir(),
            result.started_at_ms,
            &result.stdout,
            &result.stderr,
        )?;

        let job = self
            .queue
            .get_mut(job_id)
            .ok_or_else(|| DispatchError::rejected(Reason::Other("job_not_found".into())))?;

        // Anti-forgery: the command window must sit inside the job window
        // plus slop.
        let window_ok = job
            .started_at_ms
            .map(|start| result.started_at_ms + slop_ms >= start)
            .unwrap_or(true)
            && job
                .finished_at_ms
                .map(|finish| result.finished_at_ms <= finish + slop_ms)
                .unwrap_or(true);

        let passed = !result.timed_out && result.exit_code == Some(0);
        let EvidenceFiles {
            stdout_path,
            stdout_sha256,
            stderr_path,
            stderr_sha256,
        } = evidence;
        let outcome = af_core::CiGateOutcome {
            ok: passed && window_ok,
            required: true,
            command: result.command.clone(),
            exit_code: result.exit_code,
            started_at_ms: result.started_at_ms,
            finished_at_ms: result.finished_at_ms,
            stdout_path: stdout_path.to_string_lossy().into_owned(),
            stdout_sha256,
            stderr_path: stderr_path.to_string_lossy().into_owned(),
            stderr_sha256,
            evidence_valid: window_ok,
        };

        let gate_ok = outcome.ok;
        job.ci_gate = Some(outcome.clone());
        if !gate_ok && job.status == JobStatus::Done {
            job.status = JobStatus::Failed;
            job.reason = Some(Reason::CiFailed);
        }

        self.emit(&Event::CiGateResult {
            job_id: job_id.clone(),
            ok: gate_ok,
            command: result.command.clone(),
            exit_code: result.exit_code,
            evidence_valid: window_ok,
        });
        if let Err(e) = self.ci_results_log.append(&serde_json::json!({
            "job_id": job_id,
            "ok": gate_ok,
            "command": result.command,
            "exit_code": result.exit_code,
            "stdout_sha256": outcome.stdout_sha256,
            "stderr_sha256": outcome.stderr_sha256,
            "evidence_valid": window_ok,
        })) {
            tracing::error!(error = %e, "failed to append ci gate result");
        }
        if !gate_ok {
            if let Err(e) = self.ci_failures_log.append(&serde_json::json!({
                "job_id": job_id,
                "command": result.command,
                "exit_code": result.exit_code,
                "evidence_valid": window_ok,
            })) {
                tracing::error!(error = %e, "failed to append ci failure");
            }
        }
        Ok(())
    }

    /// Hygiene gate: artifacts under `artifacts/`, touched files inside
    /// the allowlist. Flips done → failed on violation.
    fn apply_hygiene(&mut self, job_id: &JobId) {
        let Some(job) = self.queue.get(job_id) else {
            return;
        };
        if job.status != JobStatus::Done {
            return;
        }
        let Some(submit_value) = job.submit.clone() else {
            return;
        };
        let Ok(submit) = serde_json::from_value::<Submit>(submit_value) else {
            return;
        };

        let pins = job
            .task_id
            .as_ref()
            .and_then(|task_id| self.board.get(task_id))
            .and_then(|task| task.effective_pins());

        let violations = submit.hygiene_violations(pins.as_ref());
        if let Some(first) = violations.into_iter().next() {
            if let Some(job) = self.queue.get_mut(job_id) {
                job.status = JobStatus::Failed;
                job.reason = Some(first);
            }
        }
    }

    /// Re-hash a job's CI evidence files against the stored digests.
    ///
    /// `Some(false)` means the logs on disk no longer match what the gate
    /// recorded; callers should treat the gate result as forged.
    pub fn verify_ci_evidence(&self, job_id: &JobId) -> Option<bool> {
        let gate = self.queue.get(job_id)?.ci_gate.as_ref()?;
        Some(
            af_storage::verify_evidence(
                std::path::Path::new(&gate.stdout_path),
                &gate.stdout_sha256,
            ) && af_storage::verify_evidence(
                std::path::Path::new(&gate.stderr_path),
                &gate.stderr_sha256,
            ),
        )
    }

    /// Persist the prompt and outputs for replay.
    fn write_thread_artifact(&self, job: &af_core::Job) {
        let Some(thread_id) = &job.thread_id else {
            return;
        };
        let path = self.layout.thread_file(thread_id);
        let artifact = serde_json::json!({
            "thread_id": thread_id,
            "job_id": job.id,
            "task_id": job.task_id,
            "executor": job.executor,
            "model": job.model,
            "prompt": job.prompt,
            "stdout": job.stdout,
            "stderr": job.stderr,
            "exit_code": job.exit_code,
            "reason": job.reason.as_ref().map(|r| r.as_code()),
        });
        if let Err(e) = af_storage::write_json_atomic(&path, &artifact) {
            tracing::error!(error = %e, "failed to write thread artifact");
        }
    }
}

#[cfg(test)]
#[path = "verdict_tests.rs"]
mod tests;
