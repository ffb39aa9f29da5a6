// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration endpoints over the settings registry.

use af_core::SETTING_REGISTRY;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::reject;
use crate::plane::AppState;

pub(super) async fn get_config(State(state): State<AppState>) -> Response {
    let engine = state.engine.lock();
    Json(serde_json::json!({ "env": engine.settings.as_map() })).into_response()
}

pub(super) async fn get_schema() -> Response {
    let schema: Vec<serde_json::Value> = SETTING_REGISTRY
        .iter()
        .map(|def| {
            serde_json::json!({
                "key": def.key,
                "kind": def.kind,
                "default": def.default,
                "help": def.help,
            })
        })
        .collect();
    Json(serde_json::json!({ "keys": schema })).into_response()
}

#[derive(Deserialize)]
pub(super) struct SetBody {
    key: String,
    value: String,
}

pub(super) async fn set_config(
    State(state): State<AppState>,
    Json(body): Json<SetBody>,
) -> Response {
    if body.key.trim().is_empty() {
        return reject("missing_key".to_string(), None);
    }
    let recognized = af_core::Settings::definition(&body.key).is_some();
    {
        let mut engine = state.engine.lock();
        engine.settings.set(body.key.clone(), body.value.clone());
    }
    match state.persist_settings() {
        Ok(()) => Json(serde_json::json!({
            "ok": true,
            "key": body.key,
            "recognized": recognized,
        }))
        .into_response(),
        Err(_) => reject("store_error".to_string(), None),
    }
}
