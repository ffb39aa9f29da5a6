// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{engine_with, ready_task, test_engine, TestEngine};
use af_core::test_support::submit_json;
use af_core::{Settings, TaskId};

fn dispatch_and_run(engine: &mut TestEngine, task_id: &TaskId) -> JobId {
    let job = engine.dispatch(task_id).unwrap();
    engine.queue.get_mut(&job.id).unwrap().status = JobStatus::Running;
    engine.queue.get_mut(&job.id).unwrap().started_at_ms = Some(engine.now_ms());
    job.id
}

fn done_outputs(task_id: &TaskId) -> CompletionOutputs {
    CompletionOutputs {
        exit_code: Some(0),
        stdout: format!("working\nSUBMIT:{}\n", submit_json(task_id.as_str())),
        stderr: String::new(),
        timed_out: false,
        reason: None,
    }
}

fn passing_ci(engine: &TestEngine, plan: &CiPlan) -> CiRunResult {
    let now = engine.now_ms();
    CiRunResult {
        command: plan.command.clone(),
        exit_code: Some(0),
        stdout: "2 passed".to_string(),
        stderr: String::new(),
        timed_out: false,
        started_at_ms: now,
        finished_at_ms: now,
    }
}

fn failing_ci(engine: &TestEngine, plan: &CiPlan) -> CiRunResult {
    CiRunResult {
        exit_code: Some(1),
        stdout: "1 failed".to_string(),
        ..passing_ci(engine, plan)
    }
}

// ── happy path ───────────────────────────────────────────────────────────────

#[test]
fn done_job_with_passing_ci_completes_task() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    let job_id = dispatch_and_run(&mut engine, &task_id);

    let plan = engine
        .begin_completion(&job_id, done_outputs(&task_id), None)
        .unwrap();
    let ci = plan.ci.clone().expect("ci gate planned");
    assert_eq!(ci.command, "python -m pytest -q");

    let result = passing_ci(&engine, &ci);
    engine.finalize_completion(&job_id, Some(result)).unwrap();

    let job = engine.queue.get(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert!(job.ci_gate.as_ref().unwrap().ok);
    assert!(job.submit.is_some());
    assert_eq!(
        engine.board.get(&task_id).unwrap().status,
        af_core::TaskStatus::Done
    );
}

#[test]
fn thread_artifact_is_written_for_replay() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    let job_id = dispatch_and_run(&mut engine, &task_id);

    let plan = engine
        .begin_completion(&job_id, done_outputs(&task_id), None)
        .unwrap();
    let ci = plan.ci.clone().unwrap();
    let result = passing_ci(&engine, &ci);
    engine.finalize_completion(&job_id, Some(result)).unwrap();

    let thread_id = engine.queue.get(&job_id).unwrap().thread_id.clone().unwrap();
    let artifact: serde_json::Value =
        af_storage::read_json(&engine.layout.thread_file(&thread_id), serde_json::json!(null));
    assert_eq!(artifact["job_id"], job_id.as_str());
    assert!(artifact["prompt"].as_str().unwrap().contains("SUBMIT:"));
}

// ── scenario: CI gate failure creates a qa fixup ─────────────────────────────

#[test]
fn ci_failure_fails_task_and_creates_fixup_child() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    let job_id = dispatch_and_run(&mut engine, &task_id);

    let plan = engine
        .begin_completion(&job_id, done_outputs(&task_id), None)
        .unwrap();
    let ci = plan.ci.clone().unwrap();
    let result = failing_ci(&engine, &ci);
    engine.finalize_completion(&job_id, Some(result)).unwrap();

    let job = engine.queue.get(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.reason, Some(Reason::CiFailed));

    let task = engine.board.get(&task_id).unwrap();
    assert_eq!(task.status, af_core::TaskStatus::Failed);
    assert_eq!(task.ci_fixup_count, 1);

    let children = engine.board.children_of(&task_id);
    assert_eq!(children.len(), 1);
    let fixup = children[0];
    assert_eq!(fixup.role, af_core::Role::Qa);
    assert_eq!(fixup.task_class.as_deref(), Some(crate::fixup::CI_FIXUP_CLASS));
    assert_eq!(
        fixup.pointers.as_ref().unwrap().source_task_id,
        task_id
    );
    assert_eq!(fixup.priority, Some(af_core::FIXUP_PRIORITY));
    assert_eq!(fixup.status, af_core::TaskStatus::Ready);
}

#[test]
fn fixup_child_priority_carries_into_its_job() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    let job_id = dispatch_and_run(&mut engine, &task_id);

    let plan = engine
        .begin_completion(&job_id, done_outputs(&task_id), None)
        .unwrap();
    let ci = plan.ci.clone().unwrap();
    let result = failing_ci(&engine, &ci);
    engine.finalize_completion(&job_id, Some(result)).unwrap();

    let fixup_id = engine.board.children_of(&task_id)[0].id.clone();
    let fixup_job = engine.dispatch(&fixup_id).unwrap();
    assert_eq!(fixup_job.priority, 950);
}

// ── anti-forgery ─────────────────────────────────────────────────────────────

#[test]
fn ci_window_outside_job_window_invalidates_evidence() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    let job_id = dispatch_and_run(&mut engine, &task_id);

    let plan = engine
        .begin_completion(&job_id, done_outputs(&task_id), None)
        .unwrap();
    let ci = plan.ci.clone().unwrap();

    // A "result" recorded long before the job even started.
    let slop = engine.settings.get_u64("CI_ANTIFORGERY_SINCE_MS");
    let job_start = engine.queue.get(&job_id).unwrap().started_at_ms.unwrap();
    let result = CiRunResult {
        command: ci.command.clone(),
        exit_code: Some(0),
        stdout: "2 passed".to_string(),
        stderr: String::new(),
        timed_out: false,
        started_at_ms: job_start.saturating_sub(slop + 10_000),
        finished_at_ms: job_start.saturating_sub(slop + 9_000),
    };
    engine.finalize_completion(&job_id, Some(result)).unwrap();

    let job = engine.queue.get(&job_id).unwrap();
    let gate = job.ci_gate.as_ref().unwrap();
    assert!(!gate.evidence_valid);
    assert!(!gate.ok);
    assert_eq!(job.status, JobStatus::Failed);
}

#[test]
fn evidence_files_match_their_digests() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    let job_id = dispatch_and_run(&mut engine, &task_id);

    let plan = engine
        .begin_completion(&job_id, done_outputs(&task_id), None)
        .unwrap();
    let ci = plan.ci.clone().unwrap();
    let result = passing_ci(&engine, &ci);
    engine.finalize_completion(&job_id, Some(result)).unwrap();

    let gate = engine.queue.get(&job_id).unwrap().ci_gate.clone().unwrap();
    assert!(af_storage::verify_evidence(
        std::path::Path::new(&gate.stdout_path),
        &gate.stdout_sha256
    ));

    // Tampering breaks verification.
    std::fs::write(&gate.stdout_path, "forged output").unwrap();
    assert!(!af_storage::verify_evidence(
        std::path::Path::new(&gate.stdout_path),
        &gate.stdout_sha256
    ));
}

// ── submit handling ──────────────────────────────────────────────────────────

#[test]
fn missing_submit_fails_opencode_under_strict_policy() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    engine.board.get_mut(&task_id).unwrap().allowed_executors =
        vec![af_core::ExecutorKind::Opencodecli];
    let job_id = dispatch_and_run(&mut engine, &task_id);

    let outputs = CompletionOutputs {
        exit_code: Some(0),
        stdout: "did stuff, no contract".to_string(),
        ..Default::default()
    };
    let plan = engine.begin_completion(&job_id, outputs, None).unwrap();
    assert!(plan.ci.is_none());
    engine.finalize_completion(&job_id, None).unwrap();

    let job = engine.queue.get(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.reason, Some(Reason::MissingSubmitContract));
}

#[test]
fn malformed_submit_is_schema_violation() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    let job_id = dispatch_and_run(&mut engine, &task_id);

    let outputs = CompletionOutputs {
        exit_code: Some(0),
        stdout: "SUBMIT:{broken".to_string(),
        ..Default::default()
    };
    engine.begin_completion(&job_id, outputs, None).unwrap();
    engine.finalize_completion(&job_id, None).unwrap();

    assert_eq!(
        engine.queue.get(&job_id).unwrap().reason,
        Some(Reason::SchemaViolation)
    );
}

#[test]
fn touched_file_outside_pins_fails_hygiene() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    let job_id = dispatch_and_run(&mut engine, &task_id);

    let submit = submit_json(task_id.as_str()).replace(
        r#""touched_files":["a.md"]"#,
        r#""touched_files":["a.md","secrets/key.pem"]"#,
    );
    let outputs = CompletionOutputs {
        exit_code: Some(0),
        stdout: format!("SUBMIT:{submit}"),
        ..Default::default()
    };
    let plan = engine.begin_completion(&job_id, outputs, None).unwrap();
    let ci = plan.ci.clone().unwrap();
    let result = passing_ci(&engine, &ci);
    engine.finalize_completion(&job_id, Some(result)).unwrap();

    let job = engine.queue.get(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.reason, Some(Reason::TouchedFileOutsideAllowPaths));
}

#[test]
fn timeout_classification_beats_everything() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    let job_id = dispatch_and_run(&mut engine, &task_id);

    let outputs = CompletionOutputs {
        exit_code: None,
        stdout: String::new(),
        stderr: "killed".to_string(),
        timed_out: true,
        reason: None,
    };
    let plan = engine.begin_completion(&job_id, outputs, None).unwrap();
    assert!(plan.ci.is_none());
    engine.finalize_completion(&job_id, None).unwrap();

    assert_eq!(
        engine.queue.get(&job_id).unwrap().reason,
        Some(Reason::Timeout)
    );
}

#[test]
fn stale_worker_completion_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    let job_id = dispatch_and_run(&mut engine, &task_id);

    let err = engine
        .begin_completion(
            &job_id,
            done_outputs(&task_id),
            Some(&af_core::WorkerId::new("ghost")),
        )
        .unwrap_err();
    assert_eq!(err.reason_code(), "stale_completion");
}

#[test]
fn no_allowed_command_fails_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let task_id = ready_task(&mut engine, dir.path(), "X");
    engine.board.get_mut(&task_id).unwrap().allowed_tests =
        vec!["make check".to_string(), "python -m pytest -q".to_string()];
    let job_id = dispatch_and_run(&mut engine, &task_id);
    // The job carries only the disallowed command.
    engine.queue.get_mut(&job_id).unwrap().allowed_tests = vec!["make check".to_string()];

    let plan = engine
        .begin_completion(&job_id, done_outputs(&task_id), None)
        .unwrap();
    assert!(plan.ci.is_none());

    let job = engine.queue.get(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.reason, Some(Reason::CiFailed));
}

#[test]
fn ci_disabled_skips_the_gate_entirely() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::new();
    settings.set("MODEL_POOL_FREE", "opencode/kimi-k2");
    settings.set("MODEL_POOL_PAID", "gpt-5-codex");
    settings.set("CI_GATE_ENABLED", "false");
    let mut engine = engine_with(dir.path(), settings);
    let task_id = ready_task(&mut engine, dir.path(), "X");
    let job_id = dispatch_and_run(&mut engine, &task_id);

    let plan = engine
        .begin_completion(&job_id, done_outputs(&task_id), None)
        .unwrap();
    assert!(plan.ci.is_none());
    engine.finalize_completion(&job_id, None).unwrap();
    assert_eq!(engine.queue.get(&job_id).unwrap().status, JobStatus::Done);
}
