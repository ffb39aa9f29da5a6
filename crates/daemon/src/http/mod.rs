// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The JSON REST surface. Handlers lock the engine briefly and never
//! across a subprocess or long-poll await.

mod board;
mod jobs;
mod packs;
mod settings;
mod status;
mod workers;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::plane::AppState;

/// Build the full router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // health & inspection
        .route("/health", get(status::health))
        .route("/status", get(status::status))
        .route("/pools", get(status::pools))
        .route("/metrics", get(status::metrics))
        .route("/events", get(status::events))
        .route("/routes/decisions", get(status::route_decisions))
        .route("/learned_patterns", get(status::learned_patterns))
        .route("/pins/candidates", get(status::pins_candidates))
        .route("/replay/task", get(status::replay_task))
        // board
        .route("/board", get(board::get_board))
        .route("/board/tasks", post(board::create_task))
        .route("/board/tasks/:id", get(board::get_task))
        .route("/board/tasks/:id/status", post(board::set_status))
        .route("/board/tasks/:id/update", post(board::update_task))
        .route("/board/tasks/:id/dispatch", post(board::dispatch))
        .route("/board/tasks/:id/split", post(board::split))
        .route("/board/tasks/:id/split/apply", post(board::split_apply))
        .route("/board/clear", post(board::clear))
        // jobs
        .route("/executor/jobs", get(jobs::list_jobs))
        .route("/executor/jobs/atomic", post(jobs::create_atomic))
        .route("/executor/jobs/:id", get(jobs::get_job))
        .route("/executor/jobs/:id/patch", get(jobs::get_patch))
        .route("/executor/jobs/:id/cancel", post(jobs::cancel))
        .route("/executor/jobs/:id/requeue", post(jobs::requeue))
        .route("/executor/jobs/:id/complete", post(jobs::complete))
        // workers
        .route("/executor/workers", get(workers::list))
        .route("/executor/workers/register", post(workers::register))
        .route("/executor/workers/:id/heartbeat", post(workers::heartbeat))
        .route("/executor/workers/:id/claim", get(workers::claim))
        // context packs
        .route("/executor/contextpacks", post(packs::create))
        .route("/executor/contextpacks/:id", get(packs::fetch))
        // configuration
        .route("/config", get(settings::get_config))
        .route("/config/schema", get(settings::get_schema))
        .route("/config/set", post(settings::set_config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `400 {"error": <name>}`, optionally with the active job id.
pub(crate) fn reject(name: String, job_id: Option<af_core::JobId>) -> Response {
    let mut body = serde_json::json!({ "error": name });
    if let Some(job_id) = job_id {
        body["jobId"] = serde_json::Value::String(job_id.0);
    }
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

pub(crate) fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "not_found" })),
    )
        .into_response()
}

/// Map a dispatch-gate error onto the wire contract.
pub(crate) fn dispatch_error(err: af_engine::DispatchError) -> Response {
    let code = err.reason_code();
    match err {
        af_engine::DispatchError::Rejected { job_id, .. } => reject(code, job_id),
        _ => reject(code, None),
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
