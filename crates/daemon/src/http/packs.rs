// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Context-pack endpoints.

use af_core::{PackId, Pins};
use af_engine::{PackError, DEFAULT_PACK_BYTES};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::{not_found, reject};
use crate::plane::AppState;

#[derive(Deserialize)]
pub(super) struct CreateBody {
    #[serde(default)]
    pins: Option<Pins>,
    #[serde(default)]
    files: Vec<String>,
    #[serde(default, rename = "maxBytes")]
    max_bytes: Option<usize>,
}

pub(super) async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateBody>,
) -> Response {
    let max_bytes = body.max_bytes.unwrap_or(DEFAULT_PACK_BYTES);
    let engine = state.engine.lock();
    let idgen = engine.idgen.clone();

    let result = match &body.pins {
        Some(pins) if !pins.line_windows.is_empty() => {
            engine.packs.create_from_pins(pins, max_bytes, &idgen)
        }
        Some(pins) => engine
            .packs
            .create_from_files(&pins.allowed_paths, max_bytes, &idgen),
        None if !body.files.is_empty() => {
            engine.packs.create_from_files(&body.files, max_bytes, &idgen)
        }
        None => return reject("missing_pins".to_string(), None),
    };

    match result {
        Ok(meta) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": meta.id,
                "files": meta.files,
                "windows": meta.windows,
                "bytes": meta.bytes,
            })),
        )
            .into_response(),
        Err(PackError::EmptyPack) => reject("pins_insufficient".to_string(), None),
        Err(_) => reject("pack_error".to_string(), None),
    }
}

pub(super) async fn fetch(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let engine = state.engine.lock();
    let pack_id = PackId::new(id);
    match engine.packs.read(&pack_id) {
        Some(content) => Json(serde_json::json!({
            "id": pack_id,
            "content": content,
        }))
        .into_response(),
        None => not_found(),
    }
}
