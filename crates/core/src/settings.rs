// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime settings: an ordered string map (`runtime.env`) with a typed
//! registry of recognized keys. Unknown keys are preserved verbatim but
//! have no effect.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Value shape of a recognized setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKind {
    Port,
    U64,
    F64,
    Bool,
    Str,
    StrList,
}

/// One entry of the recognized-key registry.
#[derive(Debug, Clone, Serialize)]
pub struct SettingDef {
    pub key: &'static str,
    pub kind: SettingKind,
    pub default: &'static str,
    pub help: &'static str,
}

macro_rules! def {
    ($key:literal, $kind:ident, $default:literal, $help:literal) => {
        SettingDef {
            key: $key,
            kind: SettingKind::$kind,
            default: $default,
            help: $help,
        }
    };
}

/// Registry of every key the control plane acts on.
pub static SETTING_REGISTRY: &[SettingDef] = &[
    def!("GATEWAY_PORT", Port, "4100", "HTTP listen port"),
    def!("EXEC_CONCURRENCY_CODEX", U64, "2", "max concurrent internal codex jobs"),
    def!("EXEC_CONCURRENCY_OPENCODE", U64, "2", "max concurrent internal opencode jobs"),
    def!("EXEC_EXTERNAL_CONCURRENCY", U64, "4", "max concurrent external jobs per executor"),
    def!("EXEC_TIMEOUT_CODEX_MS", U64, "1200000", "wall-clock timeout for codex runs"),
    def!("EXEC_TIMEOUT_OPENCODE_MS", U64, "900000", "wall-clock timeout for opencode runs"),
    def!("EXTERNAL_LEASE_MS", U64, "720000", "lease granted to an external claim"),
    def!("MODEL_POOL_FREE", StrList, "", "free model pool, comma-separated"),
    def!("MODEL_POOL_PAID", StrList, "", "paid model pool, comma-separated"),
    def!("MODEL_POOL_VISION", StrList, "", "vision model pool, comma-separated"),
    def!("MODEL_ROUTING_MODE", Str, "rr", "rr | strong_first | ladder"),
    def!("MODEL_PREFERRED_TAG", Str, "", "model family pinned to the top of strength sort"),
    def!("AUTO_REQUEUE_MODEL_FAILURES", Bool, "true", "requeue on rate_limited/unauthorized/forbidden"),
    def!("AUTO_REQUEUE_MODEL_FAILURES_MAX", U64, "2", "model-ladder requeue cap"),
    def!("AUTO_REQUEUE_MODEL_FAILURES_COOLDOWN_MS", U64, "120000", "cooldown between ladder requeues"),
    def!("TIMEOUT_REQUEUE_MAX", U64, "1", "timeout requeue cap"),
    def!("TIMEOUT_REQUEUE_COOLDOWN_MS", U64, "60000", "cooldown after a timeout requeue"),
    def!("EXEC_REQUIRE_PINS", Bool, "true", "reject dispatch without effective pins"),
    def!("PINS_TWO_PHASE", Bool, "false", "split children without pins land blocked for a pinser"),
    def!("EXEC_REQUIRE_CONTRACT", Bool, "false", "reject dispatch without an acceptance contract"),
    def!("EXEC_REQUIRE_PINS_TEMPLATE", Bool, "false", "reject pins_instance without template"),
    def!("DISPATCH_IDEMPOTENCY", Bool, "true", "reject dispatch while a job is active"),
    def!("OCCLI_REQUIRE_SUBMIT", Bool, "true", "missing SUBMIT fails opencode jobs"),
    def!("CI_GATE_ENABLED", Bool, "true", "run the server-side CI gate"),
    def!("CI_GATE_STRICT", Bool, "false", "treat gate infrastructure errors as failures"),
    def!("CI_GATE_ALLOW_ALL", Bool, "false", "skip the command allowlist (trusted repos only)"),
    def!("CI_GATE_TIMEOUT_MS", U64, "1200000", "CI command timeout"),
    def!("CI_GATE_CWD", Str, "", "working directory for CI commands"),
    def!("CI_ANTIFORGERY_SINCE_MS", U64, "120000", "slop for the evidence window check"),
    def!("CI_ALLOW_SELFTEST_DEFAULT", Bool, "false", "default missing allowed_tests to the task selftest"),
    def!("CI_FIXUP_ENABLED", Bool, "true", "create qa children on ci_failed"),
    def!("CI_FIXUP_MAX_PER_TASK", U64, "2", "ci-fixup children cap per source task"),
    def!("PINS_FIXUP_ENABLED", Bool, "true", "create pinser children on pins failures"),
    def!("PINS_FIXUP_MAX_PER_TASK", U64, "2", "pins-fixup children cap per source task"),
    def!("FIXUP_FUSE_QUEUE_THRESHOLD", U64, "24", "queued jobs beyond which fixup creation fuses"),
    def!("QUALITY_GATE_ENABLED", Bool, "false", "block dispatch into failing areas"),
    def!("QUALITY_GATE_WINDOW", U64, "20", "rolling sample window per area"),
    def!("QUALITY_GATE_MIN_SAMPLES", U64, "5", "min samples before the gate can block"),
    def!("QUALITY_GATE_FAIL_RATE", F64, "0.6", "failure rate at or above which the gate blocks"),
    def!("BREAKER_OPEN_THRESHOLD", U64, "4", "failures in window before a breaker opens"),
    def!("BREAKER_COOLDOWN_MS", U64, "300000", "initial breaker cooldown"),
    def!("BREAKER_COOLDOWN_MAX_MS", U64, "3600000", "breaker cooldown cap"),
    def!(
        "QUARANTINE_ALLOWED_CLASSES",
        StrList,
        "factory_manager,ci_fixup_v1,pins_fixup_v1",
        "roles/classes dispatchable during quarantine"
    ),
    def!("STALE_TASK_AFTER_MS", U64, "1800000", "in_progress age before stale recovery"),
    def!("STALE_SWEEP_TICK_MS", U64, "60000", "stale recovery sweep interval"),
    def!("LEASE_SWEEP_TICK_MS", U64, "10000", "lease expiry sweep interval"),
    def!("AUTORESCUE_TICK_MS", U64, "30000", "external autorescue sweep interval"),
    def!("AUTORESCUE_ATTEMPTS_MAX", U64, "3", "external attempts before autorescue to internal"),
    def!("LONG_RUNNING_FACTOR", U64, "2", "multiple of the executor timeout before job_long_running"),
    def!("SPLIT_MAX_CHILDREN", U64, "30", "per-parent child budget for split-apply"),
    def!("WORKER_ACTIVE_WINDOW_MS", U64, "120000", "heartbeat window for active workers"),
    def!("WORKER_IDLE_EXIT_SECONDS", U64, "0", "advisory idle-exit hint returned to workers"),
    def!("REQUIRE_DESIGNER_STRONG", Bool, "true", "pin split planning to codex strong-first"),
    def!("EXEC_OPENCODE_SHARE", F64, "0.5", "target share of running jobs on opencode"),
];

/// The persisted `runtime.env` map with typed access.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    values: IndexMap<String, String>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: IndexMap<String, String>) -> Self {
        Self { values }
    }

    /// Look up a key's definition in the registry.
    pub fn definition(key: &str) -> Option<&'static SettingDef> {
        SETTING_REGISTRY.iter().find(|d| d.key == key)
    }

    /// Set a value. Unknown keys are stored but not acted on.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn as_map(&self) -> &IndexMap<String, String> {
        &self.values
    }

    /// Raw value with registry-default fallback.
    fn raw(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .or_else(|| Self::definition(key).map(|d| d.default).filter(|v| !v.is_empty()))
    }

    pub fn get_str(&self, key: &str) -> String {
        self.raw(key).unwrap_or_default().to_string()
    }

    pub fn get_u64(&self, key: &str) -> u64 {
        self.raw(key)
            .and_then(|v| v.trim().parse().ok())
            .or_else(|| Self::definition(key).and_then(|d| d.default.parse().ok()))
            .unwrap_or(0)
    }

    pub fn get_f64(&self, key: &str) -> f64 {
        self.raw(key)
            .and_then(|v| v.trim().parse().ok())
            .or_else(|| Self::definition(key).and_then(|d| d.default.parse().ok()))
            .unwrap_or(0.0)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        match self.raw(key).map(str::trim) {
            Some("1") | Some("true") | Some("yes") | Some("on") => true,
            Some(_) => false,
            None => false,
        }
    }

    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.raw(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
