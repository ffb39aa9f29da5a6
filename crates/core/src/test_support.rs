// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::executor::ExecutorKind;
use crate::id::{JobId, TaskId};
use crate::job::{Job, JobStatus, RunnerKind};
use crate::pins::Pins;
use crate::role::Role;
use crate::task::{Lane, Task, TaskKind, TaskStatus};

/// A minimal atomic task in `ready`, with files, pins, and a real test.
pub fn ready_task(id: &str) -> Task {
    Task {
        id: TaskId::new(id),
        created_at_ms: 1_000_000,
        updated_at_ms: 1_000_000,
        parent_id: None,
        kind: TaskKind::Atomic,
        title: format!("task {id}"),
        goal: "do the thing".to_string(),
        role: Role::Engineer,
        allowed_executors: vec![ExecutorKind::Codex, ExecutorKind::Opencodecli],
        allowed_models: Vec::new(),
        runner: None,
        lane: Lane::Mainlane,
        priority: None,
        files: vec!["a.md".to_string()],
        skills: Vec::new(),
        pins: Some(Pins::from_files(&["a.md".to_string()])),
        pins_instance: None,
        template_id: None,
        pins_pending: false,
        allowed_tests: vec!["python -m pytest -q".to_string()],
        contract: None,
        assumptions: Vec::new(),
        area: None,
        task_class: None,
        pointers: None,
        status: TaskStatus::Ready,
        last_job_id: None,
        last_job_status: None,
        last_job_reason: None,
        last_job_finished_at_ms: None,
        timeout_retries: 0,
        model_attempt: 0,
        ci_fixup_count: 0,
        pins_fixup_count: 0,
        ci_requeue_count: 0,
        pins_requeue_count: 0,
        cooldown_until_ms: 0,
    }
}

/// A queued internal job against the given task.
pub fn queued_job(id: &str, task_id: &str) -> Job {
    Job {
        id: JobId::new(id),
        task_id: Some(TaskId::new(task_id)),
        created_at_ms: 1_000_000,
        started_at_ms: None,
        finished_at_ms: None,
        attempts: 0,
        executor: ExecutorKind::Codex,
        model: "gpt-5-codex".to_string(),
        timeout_ms: 60_000,
        runner: RunnerKind::Internal,
        worker_id: None,
        lease_until_ms: None,
        prompt: "prompt".to_string(),
        context_pack_id: None,
        thread_id: None,
        allowed_tests: vec!["python -m pytest -q".to_string()],
        area: None,
        priority: 500,
        status: JobStatus::Queued,
        exit_code: None,
        stdout: String::new(),
        stderr: String::new(),
        reason: None,
        submit: None,
        patch_stats: None,
        usage: None,
        ci_gate: None,
    }
}

/// A well-formed DONE submit payload for tests.
pub fn submit_json(task_id: &str) -> String {
    format!(
        concat!(
            r#"{{"schema_version":"scc.submit.v1","task_id":"{}","status":"DONE","#,
            r#""changed_files":["a.md"],"new_files":[],"touched_files":["a.md"],"#,
            r#""tests":{{"commands":["python -m pytest -q"],"passed":true,"summary":"2 passed"}},"#,
            r#""artifacts":{{"report_md":"artifacts/report.md","selftest_log":"artifacts/selftest.log","#,
            r#""evidence_dir":"artifacts/evidence","patch_diff":"artifacts/patch.diff","#,
            r#""submit_json":"artifacts/submit.json"}},"exit_code":0,"needs_input":[]}}"#
        ),
        task_id
    )
}
