// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health, metrics, and read-only inspectors.

use af_adapters::ExecutorDriver;
use af_core::{ExecutorKind, JobStatus, RunnerKind, TaskId};
use af_storage::{read_json, read_jsonl, tail_jsonl};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::not_found;
use crate::plane::AppState;

pub(super) async fn health() -> Response {
    Json(serde_json::json!({ "ok": true })).into_response()
}

pub(super) async fn status(State(state): State<AppState>) -> Response {
    // Probe drivers without holding the engine lock.
    let codex_ok = state.drivers.codex.health().await;
    let opencode_ok = state.drivers.opencode.health().await;

    let engine = state.engine.lock();
    let now_ms = engine.now_ms();
    Json(serde_json::json!({
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_s": state.started_at.elapsed().as_secs(),
        "executors": {
            "codex": codex_ok,
            "opencodecli": opencode_ok,
        },
        "quarantine": engine.degradation.in_quarantine(now_ms),
        "tasks": engine.board.len(),
        "jobs": engine.queue.len(),
    }))
    .into_response()
}

pub(super) async fn pools(State(state): State<AppState>) -> Response {
    let engine = state.engine.lock();
    let now_ms = engine.now_ms();
    let window_ms = engine.settings.get_u64("WORKER_ACTIVE_WINDOW_MS");
    let counts: std::collections::HashMap<String, usize> = engine
        .board
        .counts()
        .into_iter()
        .map(|(status, n)| (status.as_str().to_string(), n))
        .collect();
    Json(serde_json::json!({
        "tasks": counts,
        "workers": {
            "total": engine.workers.list().len(),
            "active": engine.workers.active_count(now_ms, window_ms),
        },
        "models": {
            "free": engine.settings.get_list("MODEL_POOL_FREE"),
            "paid": engine.settings.get_list("MODEL_POOL_PAID"),
            "vision": engine.settings.get_list("MODEL_POOL_VISION"),
        },
    }))
    .into_response()
}

pub(super) async fn metrics(State(state): State<AppState>) -> Response {
    let engine = state.engine.lock();
    let now_ms = engine.now_ms();
    let task_counts: std::collections::HashMap<String, usize> = engine
        .board
        .counts()
        .into_iter()
        .map(|(status, n)| (status.as_str().to_string(), n))
        .collect();

    let mut job_counts = std::collections::HashMap::new();
    for job in engine.queue.list() {
        *job_counts.entry(job.status.as_str()).or_insert(0usize) += 1;
    }

    let open_breakers: Vec<&String> = engine
        .degradation
        .breakers
        .iter()
        .filter(|(_, b)| b.phase == af_engine::BreakerPhase::Open)
        .map(|(cluster, _)| cluster)
        .collect();

    Json(serde_json::json!({
        "tasks": task_counts,
        "jobs": job_counts,
        "queued": engine.queue.queued_count(),
        "running": {
            "codex": engine.queue.running_count(ExecutorKind::Codex, RunnerKind::Internal),
            "opencodecli": engine.queue.running_count(ExecutorKind::Opencodecli, RunnerKind::Internal),
            "external": engine.queue.list().iter()
                .filter(|j| j.status == JobStatus::Running && j.runner == RunnerKind::External)
                .count(),
        },
        "breakers_open": open_breakers,
        "quarantine_until_ms": engine.degradation.quarantine_until_ms,
        "quarantine": engine.degradation.in_quarantine(now_ms),
        "wip_override": engine.wip_override,
    }))
    .into_response()
}

#[derive(Deserialize)]
pub(super) struct TailQuery {
    #[serde(default)]
    limit: Option<usize>,
}

pub(super) async fn events(
    State(state): State<AppState>,
    Query(query): Query<TailQuery>,
) -> Response {
    let path = state.engine.lock().layout.state_events_log();
    let events = tail_jsonl(&path, query.limit.unwrap_or(200));
    Json(serde_json::json!({ "events": events })).into_response()
}

pub(super) async fn route_decisions(
    State(state): State<AppState>,
    Query(query): Query<TailQuery>,
) -> Response {
    let path = state.engine.lock().layout.route_decisions_log();
    let decisions = tail_jsonl(&path, query.limit.unwrap_or(200));
    Json(serde_json::json!({ "decisions": decisions })).into_response()
}

pub(super) async fn learned_patterns(State(state): State<AppState>) -> Response {
    let path = state.engine.lock().layout.patterns_file();
    let patterns: serde_json::Value = read_json(&path, serde_json::json!([]));
    Json(serde_json::json!({ "patterns": patterns })).into_response()
}

/// Pins observed on the board, as candidates for templates.
pub(super) async fn pins_candidates(State(state): State<AppState>) -> Response {
    let engine = state.engine.lock();
    let candidates: Vec<serde_json::Value> = engine
        .board
        .list()
        .into_iter()
        .filter_map(|task| {
            task.effective_pins().map(|pins| {
                serde_json::json!({
                    "task_id": task.id,
                    "area": task.area,
                    "pins": pins,
                })
            })
        })
        .collect();
    Json(serde_json::json!({ "candidates": candidates })).into_response()
}

#[derive(Deserialize)]
pub(super) struct ReplayQuery {
    task_id: String,
}

/// Full trail for one task: the record, its jobs, and thread artifacts.
pub(super) async fn replay_task(
    State(state): State<AppState>,
    Query(query): Query<ReplayQuery>,
) -> Response {
    let engine = state.engine.lock();
    let task_id = TaskId::new(query.task_id);
    let Some(task) = engine.board.get(&task_id) else {
        return not_found();
    };

    let jobs: Vec<_> = engine
        .queue
        .list()
        .into_iter()
        .filter(|j| j.task_id.as_ref() == Some(&task_id))
        .collect();
    let evidence: Vec<serde_json::Value> = jobs
        .iter()
        .filter(|j| j.ci_gate.is_some())
        .map(|j| {
            serde_json::json!({
                "job_id": j.id,
                "intact": engine.verify_ci_evidence(&j.id),
            })
        })
        .collect();
    let threads: Vec<serde_json::Value> = jobs
        .iter()
        .filter_map(|j| j.thread_id.as_ref())
        .map(|thread_id| read_json(&engine.layout.thread_file(thread_id), serde_json::json!(null)))
        .collect();
    let events: Vec<serde_json::Value> = read_jsonl(&engine.layout.state_events_log())
        .into_iter()
        .filter(|e| e.get("task_id").and_then(|v| v.as_str()) == Some(task_id.as_str()))
        .collect();

    Json(serde_json::json!({
        "task": task,
        "jobs": jobs,
        "threads": threads,
        "events": events,
        "ci_evidence": evidence,
    }))
    .into_response()
}
