// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{engine_with, ready_task, test_engine, TestEngine};
use crate::verdict::CompletionOutputs;
use af_core::{ExecutorKind, Settings};

fn fail_running_job(engine: &mut TestEngine, task_id: &TaskId, stderr: &str) -> JobId {
    let job = engine.dispatch(task_id).unwrap();
    {
        let stored = engine.queue.get_mut(&job.id).unwrap();
        stored.status = JobStatus::Running;
        stored.started_at_ms = Some(engine.clock.epoch_ms());
    }
    engine
        .begin_completion(
            &job.id,
            CompletionOutputs {
                exit_code: Some(1),
                stdout: String::new(),
                stderr: stderr.to_string(),
                timed_out: false,
                reason: None,
            },
            None,
        )
        .unwrap();
    engine.finalize_completion(&job.id, None).unwrap();
    job.id
}

// ── scenario: model-ladder requeue ───────────────────────────────────────────

#[test]
fn model_ladder_requeue_walks_the_pool() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::new();
    settings.set("MODEL_ROUTING_MODE", "ladder");
    settings.set("AUTO_REQUEUE_MODEL_FAILURES_MAX", "2");
    settings.set("AUTO_REQUEUE_MODEL_FAILURES_COOLDOWN_MS", "5000");
    let mut engine = engine_with(dir.path(), settings);

    let task_id = ready_task(&mut engine, dir.path(), "X");
    {
        let task = engine.board.get_mut(&task_id).unwrap();
        task.allowed_executors = vec![ExecutorKind::Opencodecli];
        task.allowed_models = vec![
            "opencode/kimi".to_string(),
            "opencode/glm".to_string(),
            "opencode/qwen".to_string(),
        ];
    }

    // Job 1 runs the first rung and gets rate limited.
    let job1 = engine.dispatch(&task_id).unwrap();
    assert_eq!(job1.model, "opencode/kimi");
    {
        let stored = engine.queue.get_mut(&job1.id).unwrap();
        stored.status = JobStatus::Running;
    }
    engine
        .begin_completion(
            &job1.id,
            CompletionOutputs {
                exit_code: Some(1),
                stderr: "429 too many requests".to_string(),
                ..Default::default()
            },
            None,
        )
        .unwrap();
    engine.finalize_completion(&job1.id, None).unwrap();

    let now = engine.now_ms();
    let task = engine.board.get(&task_id).unwrap().clone();
    assert_eq!(task.status, TaskStatus::Ready);
    assert_eq!(task.model_attempt, 1);
    assert!(task.cooldown_until_ms >= now + 5_000);

    // Job 2 runs the second rung after the cooldown.
    engine.clock.advance(std::time::Duration::from_secs(6));
    let job2 = engine.dispatch(&task_id).unwrap();
    assert_eq!(job2.model, "opencode/glm");

    // Two more model failures exhaust the ladder cap; the task stays failed.
    {
        let stored = engine.queue.get_mut(&job2.id).unwrap();
        stored.status = JobStatus::Running;
    }
    engine
        .begin_completion(
            &job2.id,
            CompletionOutputs {
                exit_code: Some(1),
                stderr: "401 unauthorized".to_string(),
                ..Default::default()
            },
            None,
        )
        .unwrap();
    engine.finalize_completion(&job2.id, None).unwrap();
    assert_eq!(engine.board.get(&task_id).unwrap().model_attempt, 2);

    engine.clock.advance(std::time::Duration::from_secs(6));
    let job3 = engine.dispatch(&task_id).unwrap();
    {
        let stored = engine.queue.get_mut(&job3.id).unwrap();
        stored.status = JobStatus::Running;
    }
    engine
        .begin_completion(
            &job3.id,
            CompletionOutputs {
                exit_code: Some(1),
                stderr: "429".to_string(),
                ..Default::default()
            },
            None,
        )
        .unwrap();
    engine.finalize_completion(&job3.id, None).unwrap();

    assert_eq!(
        engine.board.get(&task_id).unwrap().status,
        TaskStatus::Failed
    );
}

// ── timeout requeue ──────────────────────────────────────────────────────────

#[test]
fn timeout_requeues_once_with_cooldown() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");

    let job = engine.dispatch(&task_id).unwrap();
    engine.queue.get_mut(&job.id).unwrap().status = JobStatus::Running;
    engine
        .begin_completion(
            &job.id,
            CompletionOutputs {
                timed_out: true,
                ..Default::default()
            },
            None,
        )
        .unwrap();
    engine.finalize_completion(&job.id, None).unwrap();

    let task = engine.board.get(&task_id).unwrap().clone();
    assert_eq!(task.status, TaskStatus::Ready);
    assert_eq!(task.timeout_retries, 1);
    assert!(task.cooldown_until_ms > engine.now_ms());

    // Second timeout exceeds the default cap of one: terminal.
    engine.clock.advance(std::time::Duration::from_secs(120));
    let job2 = engine.dispatch(&task_id).unwrap();
    engine.queue.get_mut(&job2.id).unwrap().status = JobStatus::Running;
    engine
        .begin_completion(
            &job2.id,
            CompletionOutputs {
                timed_out: true,
                ..Default::default()
            },
            None,
        )
        .unwrap();
    engine.finalize_completion(&job2.id, None).unwrap();
    assert_eq!(
        engine.board.get(&task_id).unwrap().status,
        TaskStatus::Failed
    );
}

// ── pins fixup ───────────────────────────────────────────────────────────────

#[test]
fn pins_failure_creates_pinser_child() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    let job = engine.dispatch(&task_id).unwrap();
    engine.queue.get_mut(&job.id).unwrap().status = JobStatus::Running;

    // Executor reported insufficient pins through its submit.
    let stdout = format!(
        r#"SUBMIT:{{"schema_version":"scc.submit.v1","task_id":"{}","status":"FAILED","reason_code":"pins_insufficient"}}"#,
        task_id
    );
    engine
        .begin_completion(
            &job.id,
            CompletionOutputs {
                exit_code: Some(0),
                stdout,
                ..Default::default()
            },
            None,
        )
        .unwrap();
    engine.finalize_completion(&job.id, None).unwrap();

    let children = engine.board.children_of(&task_id);
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].role, af_core::Role::Pinser);
    assert_eq!(children[0].task_class.as_deref(), Some(PINS_FIXUP_CLASS));
    assert_eq!(engine.board.get(&task_id).unwrap().pins_fixup_count, 1);
}

#[test]
fn pinser_completion_applies_pins_and_requeues_source() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");

    // Fail the source with a pins failure to spawn the pinser child.
    let job = engine.dispatch(&task_id).unwrap();
    engine.queue.get_mut(&job.id).unwrap().status = JobStatus::Running;
    let stdout = format!(
        r#"SUBMIT:{{"schema_version":"scc.submit.v1","task_id":"{}","status":"FAILED","reason_code":"pins_insufficient"}}"#,
        task_id
    );
    engine
        .begin_completion(
            &job.id,
            CompletionOutputs {
                exit_code: Some(0),
                stdout,
                ..Default::default()
            },
            None,
        )
        .unwrap();
    engine.finalize_completion(&job.id, None).unwrap();
    let pinser_id = engine.board.children_of(&task_id)[0].id.clone();

    // Run the pinser; its stdout carries the pins payload.
    let pinser_job = engine.dispatch(&pinser_id).unwrap();
    engine.queue.get_mut(&pinser_job.id).unwrap().status = JobStatus::Running;
    engine
        .begin_completion(
            &pinser_job.id,
            CompletionOutputs {
                exit_code: Some(0),
                stdout: format!(
                    "{}\nSUBMIT:{}",
                    r#"{"pins":{"allowed_paths":["a.md"],"line_windows":[{"path":"a.md","start":1,"end":2}]}}"#,
                    af_core::test_support::submit_json(pinser_id.as_str())
                ),
                ..Default::default()
            },
            None,
        )
        .unwrap();
    engine.finalize_completion(&pinser_job.id, None).unwrap();

    let source = engine.board.get(&task_id).unwrap();
    assert_eq!(source.status, TaskStatus::Ready);
    assert_eq!(source.pins_requeue_count, 1);
    let pins = source.pins.as_ref().unwrap();
    assert_eq!(pins.line_windows.len(), 1);
}

// ── fuse ─────────────────────────────────────────────────────────────────────

#[test]
fn fixup_fuse_blocks_child_creation() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::new();
    settings.set("MODEL_POOL_FREE", "opencode/kimi-k2");
    settings.set("MODEL_POOL_PAID", "gpt-5-codex");
    settings.set("FIXUP_FUSE_QUEUE_THRESHOLD", "1");
    let mut engine = engine_with(dir.path(), settings);

    // One queued job trips the fuse.
    let other = ready_task(&mut engine, dir.path(), "other");
    engine.dispatch(&other).unwrap();

    let task_id = ready_task(&mut engine, dir.path(), "X");
    let job_id = fail_running_job(&mut engine, &task_id, "");
    // Force a ci_failed style failure through the direct path.
    {
        let stored = engine.queue.get_mut(&job_id).unwrap();
        stored.reason = Some(Reason::CiFailed);
    }
    let job = engine.queue.get(&job_id).unwrap().clone();
    engine.run_failure_loops(&task_id, &job);

    assert!(engine.board.children_of(&task_id).is_empty());
    assert_eq!(engine.board.get(&task_id).unwrap().ci_fixup_count, 0);
}

#[test]
fn ci_fixup_cap_limits_children() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    engine.board.get_mut(&task_id).unwrap().ci_fixup_count = 2;

    let job_id = fail_running_job(&mut engine, &task_id, "");
    {
        let stored = engine.queue.get_mut(&job_id).unwrap();
        stored.reason = Some(Reason::CiFailed);
    }
    let job = engine.queue.get(&job_id).unwrap().clone();
    engine.run_failure_loops(&task_id, &job);

    assert!(engine.board.children_of(&task_id).is_empty());
}

// ── sweeps ───────────────────────────────────────────────────────────────────

fn external_running_job(engine: &mut TestEngine, task_id: &TaskId, lease_until: u64) -> JobId {
    engine.board.get_mut(task_id).unwrap().runner = Some(RunnerKind::External);
    let job = engine.dispatch(task_id).unwrap();
    {
        let stored = engine.queue.get_mut(&job.id).unwrap();
        stored.status = JobStatus::Running;
        stored.lease_until_ms = Some(lease_until);
        stored.worker_id = Some(af_core::WorkerId::new("w1"));
    }
    job.id
}

#[test]
fn lease_sweep_recycles_expired_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    let now = engine.now_ms();
    let job_id = external_running_job(&mut engine, &task_id, now + 1_000);

    assert_eq!(engine.sweep_leases(), 0, "live lease untouched");

    engine.clock.advance(std::time::Duration::from_secs(2));
    assert_eq!(engine.sweep_leases(), 1);

    let job = engine.queue.get(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert!(job.worker_id.is_none());
    assert!(job.stdout.is_empty());
}

#[test]
fn stale_sweep_recovers_in_progress_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");

    // in_progress with a vanished job.
    {
        let now = engine.now_ms();
        engine
            .board
            .set_status(&task_id, TaskStatus::InProgress, false, None, now)
            .unwrap();
        let task = engine.board.get_mut(&task_id).unwrap();
        task.last_job_id = Some(JobId::new("ghost"));
        task.last_job_status = Some(JobStatus::Running);
    }

    assert_eq!(engine.sweep_stale_tasks(), 0, "not old enough yet");

    engine.clock.advance(std::time::Duration::from_secs(1_900));
    assert_eq!(engine.sweep_stale_tasks(), 1);

    let task = engine.board.get(&task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Ready);
    assert_eq!(task.last_job_reason, Some(Reason::JobMissing));
}

#[test]
fn autorescue_flips_cycling_external_jobs_to_internal() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    let now = engine.now_ms();
    let job_id = external_running_job(&mut engine, &task_id, now + 720_000);
    engine.queue.get_mut(&job_id).unwrap().attempts = 3;

    assert_eq!(engine.sweep_autorescue(), 1);

    let job = engine.queue.get(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.reason, Some(Reason::CanceledByLeader));

    let task = engine.board.get(&task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Ready);
    assert_eq!(task.runner, Some(RunnerKind::Internal));
}

#[test]
fn watchdog_reports_long_running_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    let job = engine.dispatch(&task_id).unwrap();
    {
        let stored = engine.queue.get_mut(&job.id).unwrap();
        stored.status = JobStatus::Running;
        stored.started_at_ms = Some(engine.clock.epoch_ms());
        stored.timeout_ms = 1_000;
    }

    engine.clock.advance(std::time::Duration::from_secs(10));
    engine.watchdog_tick();
    engine.watchdog_tick();

    let events = af_storage::read_jsonl(&engine.layout.state_events_log());
    let long_running: Vec<_> = events
        .iter()
        .filter(|e| e["type"] == "job:long_running")
        .collect();
    assert_eq!(long_running.len(), 1);
}

// ── operator job control ─────────────────────────────────────────────────────

#[test]
fn cancel_then_requeue_preserves_job_identity() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    engine.board.get_mut(&task_id).unwrap().runner = Some(RunnerKind::External);
    let job = engine.dispatch(&task_id).unwrap();

    engine.cancel_external(&job.id).unwrap();
    assert_eq!(
        engine.queue.get(&job.id).unwrap().reason,
        Some(Reason::CanceledByLeader)
    );

    engine.requeue_external(&job.id).unwrap();
    let requeued = engine.queue.get(&job.id).unwrap();
    assert_eq!(requeued.id, job.id);
    assert_eq!(requeued.status, JobStatus::Queued);
    assert!(requeued.reason.is_none());
}

#[test]
fn internal_jobs_cannot_be_cancelled_externally() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    let job = engine.dispatch(&task_id).unwrap();

    let err = engine.cancel_external(&job.id).unwrap_err();
    assert_eq!(err.reason_code(), "internal_job");
}
