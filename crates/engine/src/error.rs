// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine.

use af_core::{JobId, Reason, TaskId, TaskStatus};
use af_storage::StoreError;
use thiserror::Error;

/// Errors from taskboard operations.
#[derive(Debug, Error)]
pub enum BoardError {
    /// Fail-closed validation: the named reason code goes back to the caller.
    #[error("{0}")]
    Rejected(Reason),
    #[error("task not found: {0}")]
    NotFound(TaskId),
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl BoardError {
    /// Reason code surfaced over HTTP as `{"error": <name>}`.
    pub fn reason_code(&self) -> String {
        match self {
            BoardError::Rejected(reason) => reason.as_code(),
            BoardError::NotFound(_) => "task_not_found".to_string(),
            BoardError::InvalidTransition { .. } => "invalid_transition".to_string(),
            BoardError::Store(_) => "store_error".to_string(),
        }
    }
}

/// Errors from the preflight/dispatch gate.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Gate check failed. `job_id` is set for `already_dispatched` so the
    /// caller can find the active job.
    #[error("{reason}")]
    Rejected {
        reason: Reason,
        job_id: Option<JobId>,
    },
    #[error("board error: {0}")]
    Board(#[from] BoardError),
    #[error("pack error: {0}")]
    Pack(#[from] PackError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl DispatchError {
    pub fn rejected(reason: Reason) -> Self {
        DispatchError::Rejected {
            reason,
            job_id: None,
        }
    }

    pub fn reason_code(&self) -> String {
        match self {
            DispatchError::Rejected { reason, .. } => reason.as_code(),
            DispatchError::Board(e) => e.reason_code(),
            DispatchError::Pack(_) => "pack_error".to_string(),
            DispatchError::Store(_) => "store_error".to_string(),
        }
    }
}

/// Errors from the context-pack builder.
#[derive(Debug, Error)]
pub enum PackError {
    #[error("pins resolve to no readable content")]
    EmptyPack,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
