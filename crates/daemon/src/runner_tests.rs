// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::Config;
use af_core::{JobStatus, TaskStatus};
use af_engine::NewTask;
use std::os::unix::fs::PermissionsExt;

/// Fake executor binary that emits a DONE submit for whatever task id is
/// named in the prompt (the prompt carries `Task id: <id>`).
fn submit_script(dir: &std::path::Path) -> String {
    let path = dir.join("codexless");
    let body = r#"#!/bin/sh
prompt=$(cat)
task_id=$(printf '%s\n' "$prompt" | sed -n 's/^Task id: //p' | head -n1)
printf 'SUBMIT:{"schema_version":"scc.submit.v1","task_id":"%s","status":"DONE","changed_files":["a.md"],"new_files":[],"touched_files":["a.md"],"tests":{"commands":["python -m pytest -q"],"passed":true,"summary":"ok"},"artifacts":{"report_md":"artifacts/report.md","selftest_log":"artifacts/selftest.log","evidence_dir":"artifacts/evidence","patch_diff":"artifacts/patch.diff","submit_json":"artifacts/submit.json"},"exit_code":0,"needs_input":[]}\n' "$task_id"
"#;
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path.to_string_lossy().into_owned()
}

fn build_state(dir: &std::path::Path, codex_bin: String) -> AppState {
    let root = dir.join("state");
    let workspace = dir.join("repo");
    std::fs::create_dir_all(&workspace).unwrap();
    std::fs::write(workspace.join("a.md"), "# a\n").unwrap();

    let config = Config {
        root,
        workspace_root: workspace,
        codex_bin,
        opencode_bin: "opencode".to_string(),
    };
    let (state, _) = AppState::build(&config).unwrap();
    {
        let mut engine = state.engine.lock();
        engine.settings.set("MODEL_POOL_PAID", "gpt-5-codex");
        engine.settings.set("MODEL_POOL_FREE", "opencode/kimi-k2");
        // Keep the gate out of the way: these tests exercise the runner,
        // not pytest availability on the host.
        engine.settings.set("CI_GATE_ENABLED", "false");
    }
    state
}

fn make_ready_task(state: &AppState) -> af_core::TaskId {
    let engine = &mut *state.engine.lock();
    let clock = engine.clock.clone();
    let idgen = engine.idgen.clone();
    let task = engine
        .board
        .create(
            NewTask {
                title: "X".to_string(),
                goal: "update the doc".to_string(),
                kind: Some(af_core::TaskKind::Atomic),
                files: vec!["a.md".to_string()],
                allowed_tests: vec!["python -m pytest -q".to_string()],
                allowed_executors: vec!["codex".to_string()],
                ..NewTask::default()
            },
            &engine.settings,
            &clock,
            &idgen,
        )
        .unwrap();
    engine
        .board
        .set_status(&task.id, TaskStatus::Ready, false, None, clock.epoch_ms())
        .unwrap();
    task.id
}

#[tokio::test]
async fn internal_job_runs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let script = submit_script(dir.path());
    let state = build_state(dir.path(), script);

    let task_id = make_ready_task(&state);
    {
        let mut engine = state.engine.lock();
        engine.dispatch(&task_id).unwrap();
    }

    let job = {
        let mut engine = state.engine.lock();
        engine
            .start_next_internal(af_core::ExecutorKind::Codex)
            .unwrap()
    };
    run_job(state.clone(), job.clone()).await;

    let engine = state.engine.lock();
    let finished = engine.queue.get(&job.id).unwrap();
    assert_eq!(finished.status, JobStatus::Done);
    assert!(finished.submit.is_some());
    assert_eq!(
        engine.board.get(&task_id).unwrap().status,
        TaskStatus::Done
    );
}

#[tokio::test]
async fn missing_binary_fails_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let state = build_state(dir.path(), "no-such-codex-anywhere".to_string());

    let task_id = make_ready_task(&state);
    {
        let mut engine = state.engine.lock();
        engine.dispatch(&task_id).unwrap();
    }
    let job = {
        let mut engine = state.engine.lock();
        engine
            .start_next_internal(af_core::ExecutorKind::Codex)
            .unwrap()
    };
    run_job(state.clone(), job.clone()).await;

    let engine = state.engine.lock();
    let finished = engine.queue.get(&job.id).unwrap();
    assert_eq!(finished.status, JobStatus::Failed);
    assert_eq!(finished.reason, Some(af_core::Reason::MissingBinary));
}

#[tokio::test]
async fn schedule_pass_is_reentrant_safe() {
    let dir = tempfile::tempdir().unwrap();
    let script = submit_script(dir.path());
    let state = build_state(dir.path(), script);

    // Hold the gate: a pass entered while another runs must back off.
    state.sched_gate.store(true, Ordering::SeqCst);
    let task_id = make_ready_task(&state);
    {
        let mut engine = state.engine.lock();
        engine.dispatch(&task_id).unwrap();
    }
    schedule_pass(&state);
    assert_eq!(
        state.engine.lock().queue.list()[0].status,
        JobStatus::Queued,
        "gated pass must not start jobs"
    );

    state.sched_gate.store(false, Ordering::SeqCst);
    schedule_pass(&state);
    // The pass marks the job running before the spawned task completes.
    assert_eq!(
        state.engine.lock().queue.list()[0].status,
        JobStatus::Running
    );
}

#[tokio::test]
async fn run_ci_captures_window_and_output() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("marker"), "ci ran").unwrap();
    let plan = CiPlan {
        command: "cat marker".to_string(),
        cwd: dir.path().to_path_buf(),
        timeout_ms: 5_000,
    };

    let result = run_ci(&plan).await;
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.stdout, "ci ran");
    assert!(result.finished_at_ms >= result.started_at_ms);
}

#[tokio::test]
async fn run_ci_reports_unstartable_commands() {
    let plan = CiPlan {
        command: "exit 3".to_string(),
        cwd: std::path::PathBuf::from("/"),
        timeout_ms: 5_000,
    };
    let result = run_ci(&plan).await;
    assert_eq!(result.exit_code, Some(3));
}
