// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker registration, heartbeat, and the long-poll claim.

use af_core::{ExecutorKind, WorkerId};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::time::Duration;

use super::{not_found, reject};
use crate::plane::AppState;

/// Claim poll interval.
const CLAIM_POLL: Duration = Duration::from_millis(250);

/// Longest admissible claim wait.
const MAX_WAIT_MS: u64 = 60_000;

#[derive(Deserialize)]
pub(super) struct RegisterBody {
    pub name: String,
    pub executors: Vec<String>,
    #[serde(default)]
    pub models: Vec<String>,
}

pub(super) async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> Response {
    let executors: Vec<ExecutorKind> = body
        .executors
        .iter()
        .filter_map(|s| ExecutorKind::parse(s))
        .collect();
    if executors.is_empty() {
        return reject("missing_executors".to_string(), None);
    }

    let mut engine = state.engine.lock();
    let worker = engine.register_worker(body.name, executors, body.models);
    let idle_exit = engine.settings.get_u64("WORKER_IDLE_EXIT_SECONDS");
    Json(serde_json::json!({
        "worker_id": worker.id,
        "idle_exit_seconds": idle_exit,
    }))
    .into_response()
}

pub(super) async fn heartbeat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let mut engine = state.engine.lock();
    if engine.worker_heartbeat(&WorkerId::new(id)) {
        Json(serde_json::json!({ "ok": true })).into_response()
    } else {
        not_found()
    }
}

pub(super) async fn list(State(state): State<AppState>) -> Response {
    let engine = state.engine.lock();
    let now_ms = engine.now_ms();
    let window_ms = engine.settings.get_u64("WORKER_ACTIVE_WINDOW_MS");
    let workers: Vec<serde_json::Value> = engine
        .workers
        .list()
        .into_iter()
        .map(|w| {
            serde_json::json!({
                "id": w.id,
                "name": w.name,
                "executors": w.executors,
                "models": w.models,
                "last_seen_ms": w.last_seen_ms,
                "running_job_id": w.running_job_id,
                "active": w.is_active(now_ms, window_ms),
            })
        })
        .collect();
    Json(serde_json::json!({ "workers": workers })).into_response()
}

#[derive(Deserialize)]
pub(super) struct ClaimQuery {
    #[serde(default)]
    executor: Option<String>,
    #[serde(default, rename = "waitMs")]
    wait_ms: Option<u64>,
}

/// Long-poll claim: repeatedly attempt a selection until the deadline,
/// then 204.
pub(super) async fn claim(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ClaimQuery>,
) -> Response {
    let worker_id = WorkerId::new(id);
    let executor_filter = query.executor.as_deref().and_then(ExecutorKind::parse);
    let wait_ms = query.wait_ms.unwrap_or(0).min(MAX_WAIT_MS);
    let deadline = tokio::time::Instant::now() + Duration::from_millis(wait_ms);

    loop {
        let claimed = {
            let mut engine = state.engine.lock();
            if engine.workers.get(&worker_id).is_none() {
                return not_found();
            }
            engine.claim_for_worker(&worker_id, executor_filter)
        };

        if let Some(job) = claimed {
            return Json(serde_json::json!({
                "job_id": job.id,
                "task_id": job.task_id,
                "executor": job.executor,
                "model": job.model,
                "timeout_ms": job.timeout_ms,
                "lease_until_ms": job.lease_until_ms,
                "allowed_tests": job.allowed_tests,
                "prompt": job.prompt,
            }))
            .into_response();
        }

        if tokio::time::Instant::now() >= deadline {
            return StatusCode::NO_CONTENT.into_response();
        }
        tokio::time::sleep(CLAIM_POLL).await;
    }
}
