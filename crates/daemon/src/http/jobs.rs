// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job inspection, control, and external completion.

use af_core::{extract_patch_block, Clock, JobId, JobStatus, WorkerId};
use af_engine::{CompletionOutputs, NewTask};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::{dispatch_error, not_found, reject};
use crate::plane::AppState;
use crate::runner::run_ci;

#[derive(Deserialize)]
pub(super) struct ListQuery {
    #[serde(default)]
    status: Option<String>,
}

pub(super) async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let engine = state.engine.lock();
    let jobs: Vec<_> = engine
        .queue
        .list()
        .into_iter()
        .filter(|j| match &query.status {
            Some(status) => j.status.as_str() == status,
            None => true,
        })
        .collect();
    Json(serde_json::json!({ "jobs": jobs })).into_response()
}

pub(super) async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let engine = state.engine.lock();
    match engine.queue.get(&JobId::new(id)) {
        Some(job) => Json(job).into_response(),
        None => not_found(),
    }
}

pub(super) async fn get_patch(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let engine = state.engine.lock();
    match engine.queue.get(&JobId::new(id)) {
        Some(job) => match extract_patch_block(&job.stdout) {
            Some(patch) => Json(serde_json::json!({ "patch": patch })).into_response(),
            None => not_found(),
        },
        None => not_found(),
    }
}

/// Create a job directly from a goal: board task plus immediate dispatch.
pub(super) async fn create_atomic(
    State(state): State<AppState>,
    Json(mut new): Json<NewTask>,
) -> Response {
    if new.title.trim().is_empty() {
        new.title = new.goal.chars().take(64).collect();
    }
    let created = {
        let engine = &mut *state.engine.lock();
        let clock = engine.clock.clone();
        let idgen = engine.idgen.clone();
        match engine.board.create(new, &engine.settings, &clock, &idgen) {
            Ok(task) => {
                let now_ms = clock.epoch_ms();
                if let Err(e) = engine.board.set_status(
                    &task.id,
                    af_core::TaskStatus::Ready,
                    false,
                    None,
                    now_ms,
                ) {
                    return reject(e.reason_code(), None);
                }
                task.id
            }
            Err(e) => return reject(e.reason_code(), None),
        }
    };

    let result = {
        let mut engine = state.engine.lock();
        engine.dispatch(&created)
    };
    match result {
        Ok(job) => {
            state.sched_kick.notify_one();
            (StatusCode::ACCEPTED, Json(serde_json::json!({ "job": job }))).into_response()
        }
        Err(e) => dispatch_error(e),
    }
}

pub(super) async fn cancel(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let mut engine = state.engine.lock();
    match engine.cancel_external(&JobId::new(id)) {
        Ok(()) => Json(serde_json::json!({ "ok": true })).into_response(),
        Err(e) => dispatch_error(e),
    }
}

pub(super) async fn requeue(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let result = {
        let mut engine = state.engine.lock();
        engine.requeue_external(&JobId::new(id))
    };
    match result {
        Ok(()) => {
            state.sched_kick.notify_one();
            Json(serde_json::json!({ "ok": true })).into_response()
        }
        Err(e) => dispatch_error(e),
    }
}

#[derive(Deserialize)]
pub(super) struct CompleteBody {
    pub worker_id: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub timed_out: bool,
}

/// External completion: the worker reports its outputs and the server
/// runs the verdict pipeline exactly as it does for internal jobs.
pub(super) async fn complete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CompleteBody>,
) -> Response {
    let job_id = JobId::new(id);
    let worker_id = WorkerId::new(body.worker_id);
    let outputs = CompletionOutputs {
        exit_code: body.exit_code,
        stdout: body.stdout,
        stderr: body.stderr,
        timed_out: body.timed_out,
        reason: None,
    };

    let plan = {
        let mut engine = state.engine.lock();
        engine.begin_completion(&job_id, outputs, Some(&worker_id))
    };
    let plan = match plan {
        Ok(plan) => plan,
        Err(e) => return dispatch_error(e),
    };

    let ci_result = match &plan.ci {
        Some(ci) => Some(run_ci(ci).await),
        None => None,
    };

    let finalized = {
        let mut engine = state.engine.lock();
        engine.workers.release_job(&job_id);
        engine.finalize_completion(&job_id, ci_result)
    };
    match finalized {
        Ok(()) => {
            state.sched_kick.notify_one();
            let engine = state.engine.lock();
            let status = engine
                .queue
                .get(&job_id)
                .map(|j| j.status)
                .unwrap_or(JobStatus::Failed);
            Json(serde_json::json!({ "ok": true, "status": status })).into_response()
        }
        Err(e) => dispatch_error(e),
    }
}
