// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{engine_with, ready_task, test_engine};
use af_core::Settings;

fn reason_of(err: &DispatchError) -> String {
    err.reason_code()
}

#[test]
fn dispatch_creates_queued_job_and_marks_in_progress() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");

    let job = engine.dispatch(&task_id).unwrap();

    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.task_id.as_ref(), Some(&task_id));
    assert!(job.context_pack_id.is_some());
    assert!(job.prompt.contains("# Context"));
    assert!(job.prompt.contains("SUBMIT:"));

    let task = engine.board.get(&task_id).unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(task.last_job_id.as_ref(), Some(&job.id));
}

#[test]
fn second_dispatch_is_rejected_with_active_job_id() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");

    let first = engine.dispatch(&task_id).unwrap();
    let err = engine.dispatch(&task_id).unwrap_err();

    match err {
        DispatchError::Rejected { reason, job_id } => {
            assert_eq!(reason, Reason::AlreadyDispatched);
            assert_eq!(job_id, Some(first.id));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    // No second job was created.
    assert_eq!(engine.queue.len(), 1);
}

#[test]
fn dispatch_requires_real_test() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    engine.board.get_mut(&task_id).unwrap().allowed_tests =
        vec!["python selftest --task-id {task_id}".to_string()];

    let err = engine.dispatch(&task_id).unwrap_err();
    assert_eq!(reason_of(&err), "missing_real_test");
}

#[test]
fn parked_lanes_do_not_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    engine.board.get_mut(&task_id).unwrap().lane = af_core::Lane::Dlq;

    let err = engine.dispatch(&task_id).unwrap_err();
    assert_eq!(reason_of(&err), "lane_parked");
}

#[test]
fn cooldown_blocks_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    let now = engine.now_ms();
    engine.board.get_mut(&task_id).unwrap().cooldown_until_ms = now + 60_000;

    let err = engine.dispatch(&task_id).unwrap_err();
    assert_eq!(reason_of(&err), "cooling_down");

    engine.clock.advance(std::time::Duration::from_secs(61));
    assert!(engine.dispatch(&task_id).is_ok());
}

#[test]
fn pins_pending_blocks_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    engine.board.get_mut(&task_id).unwrap().pins_pending = true;

    let err = engine.dispatch(&task_id).unwrap_err();
    assert_eq!(reason_of(&err), "pins_pending");
}

#[test]
fn quarantine_blocks_non_allowlisted_roles() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    let now = engine.now_ms();
    engine.degradation.raise_quarantine(now + 60_000, "storm");

    let err = engine.dispatch(&task_id).unwrap_err();
    assert_eq!(reason_of(&err), "quarantined");

    // Allowlisted class passes the same gate.
    engine.board.get_mut(&task_id).unwrap().task_class = Some("ci_fixup_v1".to_string());
    assert!(engine.dispatch(&task_id).is_ok());
}

#[test]
fn quality_gate_blocks_failing_area() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::new();
    settings.set("MODEL_POOL_PAID", "gpt-5-codex");
    settings.set("QUALITY_GATE_ENABLED", "true");
    settings.set("QUALITY_GATE_MIN_SAMPLES", "2");
    settings.set("QUALITY_GATE_FAIL_RATE", "0.5");
    let mut engine = engine_with(dir.path(), settings);
    let task_id = ready_task(&mut engine, dir.path(), "X");
    engine.board.get_mut(&task_id).unwrap().area = Some("parser".to_string());
    engine.quality.record("parser", true, 20);
    engine.quality.record("parser", true, 20);

    let err = engine.dispatch(&task_id).unwrap_err();
    assert_eq!(reason_of(&err), "quality_gate_blocked");
}

#[test]
fn missing_pins_rejected_when_required_and_nothing_inferable() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    {
        let task = engine.board.get_mut(&task_id).unwrap();
        task.files = Vec::new();
        task.pins = None;
        task.goal = "nothing inferable".to_string();
        task.title = "nothing".to_string();
    }

    let err = engine.dispatch(&task_id).unwrap_err();
    assert_eq!(reason_of(&err), "missing_files");
}

#[test]
fn breaker_open_postpones_matching_cluster() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::new();
    settings.set("MODEL_POOL_PAID", "gpt-5-codex");
    settings.set("BREAKER_OPEN_THRESHOLD", "1");
    let mut engine = engine_with(dir.path(), settings);
    let task_id = ready_task(&mut engine, dir.path(), "X");

    // The task last failed with ci_failed; its cluster breaker is open.
    {
        let task = engine.board.get_mut(&task_id).unwrap();
        task.last_job_reason = Some(Reason::CiFailed);
        task.allowed_executors = vec![ExecutorKind::Codex];
    }
    let now = engine.now_ms();
    let cluster = crate::breaker::cluster_key(
        &Reason::CiFailed,
        af_core::Role::Engineer,
        None,
        ExecutorKind::Codex,
    );
    let s = engine.settings.clone();
    engine.degradation.record_failure(&cluster, &Reason::CiFailed, now, &s);

    let err = engine.dispatch(&task_id).unwrap_err();
    assert_eq!(reason_of(&err), "breaker_open");
}

#[test]
fn designer_role_pins_codex() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    {
        let task = engine.board.get_mut(&task_id).unwrap();
        task.role = af_core::Role::Designer;
        task.allowed_executors =
            vec![ExecutorKind::Codex, ExecutorKind::Opencodecli];
    }

    let job = engine.dispatch(&task_id).unwrap();
    assert_eq!(job.executor, ExecutorKind::Codex);
}

#[test]
fn single_allowed_executor_wins() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    engine.board.get_mut(&task_id).unwrap().allowed_executors =
        vec![ExecutorKind::Opencodecli];

    let job = engine.dispatch(&task_id).unwrap();
    assert_eq!(job.executor, ExecutorKind::Opencodecli);
    assert!(job.model.starts_with("opencode/"));
}

#[test]
fn ladder_mode_uses_model_attempt_index() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::new();
    settings.set("MODEL_POOL_FREE", "opencode/kimi,opencode/glm,opencode/qwen");
    settings.set("MODEL_ROUTING_MODE", "ladder");
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
        task.model_attempt = 1;
    }

    let job = engine.dispatch(&task_id).unwrap();
    assert_eq!(job.model, "opencode/glm");
}

#[test]
fn route_decision_is_logged() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    engine.dispatch(&task_id).unwrap();

    let decisions = af_storage::read_jsonl(&engine.layout.route_decisions_log());
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0]["task_id"], task_id.as_str());
}

#[test]
fn start_next_internal_respects_caps() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::new();
    settings.set("MODEL_POOL_PAID", "gpt-5-codex");
    settings.set("EXEC_CONCURRENCY_CODEX", "1");
    let mut engine = engine_with(dir.path(), settings);

    let t1 = ready_task(&mut engine, dir.path(), "a");
    let t2 = ready_task(&mut engine, dir.path(), "b");
    for id in [&t1, &t2] {
        engine.board.get_mut(id).unwrap().allowed_executors = vec![ExecutorKind::Codex];
    }
    engine.dispatch(&t1).unwrap();
    engine.dispatch(&t2).unwrap();

    let first = engine.start_next_internal(ExecutorKind::Codex);
    assert!(first.is_some());
    assert_eq!(first.as_ref().unwrap().status, JobStatus::Running);

    // Cap of one: the second queued job must wait.
    assert!(engine.start_next_internal(ExecutorKind::Codex).is_none());
}
