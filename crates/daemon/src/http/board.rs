// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Board endpoints.

use af_core::{Clock, Event, TaskId, TaskStatus};
use af_engine::{NewTask, TaskPatch};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::{dispatch_error, not_found, reject};
use crate::plane::AppState;

pub(super) async fn get_board(State(state): State<AppState>) -> Response {
    let engine = state.engine.lock();
    let counts: std::collections::HashMap<String, usize> = engine
        .board
        .counts()
        .into_iter()
        .map(|(status, n)| (status.as_str().to_string(), n))
        .collect();
    Json(serde_json::json!({
        "counts": counts,
        "mission": engine.mission.text,
        "tasks": engine.board.list(),
    }))
    .into_response()
}

pub(super) async fn create_task(
    State(state): State<AppState>,
    Json(new): Json<NewTask>,
) -> Response {
    let engine = &mut *state.engine.lock();
    let clock = engine.clock.clone();
    let idgen = engine.idgen.clone();
    match engine.board.create(new, &engine.settings, &clock, &idgen) {
        Ok(task) => {
            engine.emit(&Event::TaskCreated {
                task_id: task.id.clone(),
                kind: match task.kind {
                    af_core::TaskKind::Parent => "parent".to_string(),
                    af_core::TaskKind::Atomic => "atomic".to_string(),
                },
                role: task.role,
                lane: task.lane,
                title: task.title.clone(),
            });
            (StatusCode::CREATED, Json(task)).into_response()
        }
        Err(e) => reject(e.reason_code(), None),
    }
}

pub(super) async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let engine = state.engine.lock();
    match engine.board.get(&TaskId::new(id)) {
        Some(task) => Json(task).into_response(),
        None => not_found(),
    }
}

#[derive(Deserialize)]
pub(super) struct StatusBody {
    status: String,
}

pub(super) async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusBody>,
) -> Response {
    let Some(to) = TaskStatus::parse(&body.status) else {
        return reject("invalid_status".to_string(), None);
    };
    let task_id = TaskId::new(id);

    let engine = &mut *state.engine.lock();
    let from = match engine.board.get(&task_id) {
        Some(task) => task.status,
        None => return not_found(),
    };
    // Operator-driven moves use the explicit reopen/requeue arrows.
    match engine.board.set_status(&task_id, to, true, None, engine.clock.epoch_ms()) {
        Ok(()) => {
            engine.emit(&Event::TaskStatusChanged {
                task_id: task_id.clone(),
                from,
                to,
                reason: None,
            });
            state.sched_kick.notify_one();
            Json(serde_json::json!({ "ok": true })).into_response()
        }
        Err(e) => reject(e.reason_code(), None),
    }
}

pub(super) async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> Response {
    let task_id = TaskId::new(id);
    let engine = &mut *state.engine.lock();
    let now_ms = engine.clock.epoch_ms();
    match engine.board.patch(&task_id, patch, now_ms) {
        Ok(task) => Json(task).into_response(),
        Err(af_engine::BoardError::NotFound(_)) => not_found(),
        Err(e) => reject(e.reason_code(), None),
    }
}

pub(super) async fn dispatch(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let task_id = TaskId::new(id);
    let result = {
        let mut engine = state.engine.lock();
        engine.dispatch(&task_id)
    };
    match result {
        Ok(job) => {
            state.sched_kick.notify_one();
            let engine = state.engine.lock();
            let task = engine.board.get(&task_id);
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({ "task": task, "job": job })),
            )
                .into_response()
        }
        Err(e) => dispatch_error(e),
    }
}

pub(super) async fn split(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let task_id = TaskId::new(id);
    let result = {
        let mut engine = state.engine.lock();
        engine.dispatch_split(&task_id)
    };
    match result {
        Ok(job) => {
            state.sched_kick.notify_one();
            (StatusCode::ACCEPTED, Json(serde_json::json!({ "job": job }))).into_response()
        }
        Err(e) => dispatch_error(e),
    }
}

pub(super) async fn split_apply(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let task_id = TaskId::new(id);
    let mut engine = state.engine.lock();
    match engine.apply_split(&task_id) {
        Ok(children) => Json(serde_json::json!({ "children": children })).into_response(),
        Err(af_engine::BoardError::NotFound(_)) => not_found(),
        Err(e) => reject(e.reason_code(), None),
    }
}

pub(super) async fn clear(State(state): State<AppState>) -> Response {
    let mut engine = state.engine.lock();
    match engine.board.clear() {
        Ok(removed) => Json(serde_json::json!({ "removed": removed })).into_response(),
        Err(e) => reject(e.reason_code(), None),
    }
}
