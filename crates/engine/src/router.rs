// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Model router: given a task, an executor, and an attempt index, pick a
//! model from the pools. The round-robin cursor persists to disk so
//! restarts don't collapse every route onto one model.

use af_core::{ExecutorKind, Settings, Task};
use af_storage::{update_json_locked, StoreError};
use std::collections::HashMap;
use std::path::PathBuf;

/// Routing mode, from `MODEL_ROUTING_MODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    RoundRobin,
    StrongFirst,
    Ladder,
}

impl RoutingMode {
    pub fn parse(s: &str) -> Self {
        match s {
            "strong_first" => RoutingMode::StrongFirst,
            "ladder" => RoutingMode::Ladder,
            _ => RoutingMode::RoundRobin,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingMode::RoundRobin => "rr",
            RoutingMode::StrongFirst => "strong_first",
            RoutingMode::Ladder => "ladder",
        }
    }
}

/// Strength score for ordering a pool strong-to-weak.
///
/// Models carrying the preferred tag pin to the top; otherwise the
/// parameter count parsed from the name (`70b`, `27B`) decides, with
/// lexicographic order breaking ties.
fn strength(model: &str, preferred_tag: &str) -> (u8, u64) {
    let lower = model.to_lowercase();
    if !preferred_tag.is_empty() && lower.contains(&preferred_tag.to_lowercase()) {
        return (1, u64::MAX);
    }
    (0, param_count(&lower))
}

/// Largest `<digits>b` run in the name, in billions.
fn param_count(lower: &str) -> u64 {
    let bytes = lower.as_bytes();
    let mut best = 0u64;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i < bytes.len() && bytes[i] == b'b' {
                // Must terminate the token: "70b" yes, "70bit" no.
                let terminated = i + 1 >= bytes.len() || !bytes[i + 1].is_ascii_alphanumeric();
                if terminated {
                    if let Ok(n) = lower[start..i].parse::<u64>() {
                        best = best.max(n);
                    }
                }
            }
        } else {
            i += 1;
        }
    }
    best
}

/// Sort a pool strong-to-weak.
pub fn sort_strong_first(pool: &mut [String], preferred_tag: &str) {
    pool.sort_by(|a, b| {
        strength(b, preferred_tag)
            .cmp(&strength(a, preferred_tag))
            .then_with(|| a.cmp(b))
    });
}

/// Persisted round-robin cursors, keyed by pool identity.
type RrCursors = HashMap<String, usize>;

pub struct ModelRouter {
    rr_path: PathBuf,
}

impl ModelRouter {
    pub fn new(rr_path: impl Into<PathBuf>) -> Self {
        Self {
            rr_path: rr_path.into(),
        }
    }

    /// Build the candidate pool for a task on an executor.
    ///
    /// Task-local allowed models filtered by executor prefix first; when
    /// that leaves nothing, the executor's fallback pool sorted
    /// strong-to-weak.
    pub fn pool_for(&self, task: &Task, executor: ExecutorKind, settings: &Settings) -> Vec<String> {
        let local: Vec<String> = task
            .allowed_models
            .iter()
            .filter(|m| executor.owns_model(m))
            .cloned()
            .collect();
        if !local.is_empty() {
            return local;
        }

        let mut fallback: Vec<String> = match executor {
            ExecutorKind::Opencodecli => settings.get_list("MODEL_POOL_FREE"),
            ExecutorKind::Codex => settings.get_list("MODEL_POOL_PAID"),
        }
        .into_iter()
        .filter(|m| executor.owns_model(m))
        .collect();

        sort_strong_first(&mut fallback, &settings.get_str("MODEL_PREFERRED_TAG"));
        fallback
    }

    /// Pick a model by mode and attempt index. Empty pool picks nothing.
    pub fn pick(
        &self,
        pool: &[String],
        mode: RoutingMode,
        attempt: u32,
    ) -> Result<Option<String>, StoreError> {
        if pool.is_empty() {
            return Ok(None);
        }
        let model = match mode {
            RoutingMode::StrongFirst => pool[0].clone(),
            RoutingMode::Ladder => {
                let idx = (attempt as usize).min(pool.len() - 1);
                pool[idx].clone()
            }
            RoutingMode::RoundRobin => {
                let key = pool.join(",");
                let pool_len = pool.len();
                let cursors = update_json_locked(&self.rr_path, RrCursors::new(), |cursors| {
                    let cursor = cursors.entry(key.clone()).or_insert(0);
                    *cursor = (*cursor + 1) % pool_len;
                })?;
                // The stored cursor is the *next* index; the one we use is
                // the value before increment.
                let next = cursors.get(&key).copied().unwrap_or(0);
                let used = (next + pool_len - 1) % pool_len;
                pool[used].clone()
            }
        };
        Ok(Some(model))
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
