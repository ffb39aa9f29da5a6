// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Degradation machinery: per-cluster circuit breakers, the global
//! quarantine flag, the fixup-storm fuse, and the declarative
//! degradation matrix.

use af_core::{ExecutorKind, Reason, Role, Settings};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Breaker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerPhase {
    Closed,
    Open,
    HalfOpen,
}

/// Per-cluster breaker record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerEntry {
    pub phase: BreakerPhase,
    pub fail_count: u32,
    pub opened_at_ms: u64,
    pub cooldown_until_ms: u64,
    /// Current cooldown span; doubles on each re-open, capped.
    pub cooldown_ms: u64,
    pub last_reason: String,
}

impl Default for BreakerEntry {
    fn default() -> Self {
        Self {
            phase: BreakerPhase::Closed,
            fail_count: 0,
            opened_at_ms: 0,
            cooldown_until_ms: 0,
            cooldown_ms: 0,
            last_reason: String::new(),
        }
    }
}

/// Cluster key for failure grouping: exact match on
/// `reason|role|task_class|executor`.
pub fn cluster_key(
    reason: &Reason,
    role: Role,
    task_class: Option<&str>,
    executor: ExecutorKind,
) -> String {
    format!(
        "{}|{}|{}|{}",
        reason.as_code(),
        role.as_str(),
        task_class.unwrap_or("-"),
        executor.as_str()
    )
}

/// What changed after recording an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakerChange {
    None,
    Opened { cluster: String, cooldown_ms: u64 },
    HalfOpened { cluster: String },
    Closed { cluster: String },
    Reopened { cluster: String, cooldown_ms: u64 },
}

/// Persisted degradation state: breakers plus quarantine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Degradation {
    #[serde(default)]
    pub breakers: HashMap<String, BreakerEntry>,
    #[serde(default)]
    pub quarantine_until_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quarantine_reason: Option<String>,
}

impl Degradation {
    /// Record a failure for a cluster. Opens (or re-opens) the breaker
    /// when the threshold is crossed.
    pub fn record_failure(
        &mut self,
        cluster: &str,
        reason: &Reason,
        now_ms: u64,
        settings: &Settings,
    ) -> BreakerChange {
        let threshold = settings.get_u64("BREAKER_OPEN_THRESHOLD") as u32;
        let base_cooldown = settings.get_u64("BREAKER_COOLDOWN_MS");
        let max_cooldown = settings.get_u64("BREAKER_COOLDOWN_MAX_MS");

        let entry = self.breakers.entry(cluster.to_string()).or_default();
        entry.last_reason = reason.as_code();

        match entry.phase {
            BreakerPhase::HalfOpen => {
                // Probe failed: re-open with doubled cooldown.
                entry.phase = BreakerPhase::Open;
                entry.opened_at_ms = now_ms;
                entry.cooldown_ms = (entry.cooldown_ms.saturating_mul(2))
                    .clamp(base_cooldown, max_cooldown);
                entry.cooldown_until_ms = now_ms + entry.cooldown_ms;
                BreakerChange::Reopened {
                    cluster: cluster.to_string(),
                    cooldown_ms: entry.cooldown_ms,
                }
            }
            BreakerPhase::Open => BreakerChange::None,
            BreakerPhase::Closed => {
                entry.fail_count += 1;
                if entry.fail_count >= threshold {
                    entry.phase = BreakerPhase::Open;
                    entry.opened_at_ms = now_ms;
                    entry.cooldown_ms = base_cooldown;
                    entry.cooldown_until_ms = now_ms + base_cooldown;
                    BreakerChange::Opened {
                        cluster: cluster.to_string(),
                        cooldown_ms: base_cooldown,
                    }
                } else {
                    BreakerChange::None
                }
            }
        }
    }

    /// Record a success: closes a half-open breaker and clears counters.
    pub fn record_success(&mut self, cluster: &str) -> BreakerChange {
        let Some(entry) = self.breakers.get_mut(cluster) else {
            return BreakerChange::None;
        };
        let was_half_open = entry.phase == BreakerPhase::HalfOpen;
        entry.phase = BreakerPhase::Closed;
        entry.fail_count = 0;
        entry.cooldown_until_ms = 0;
        if was_half_open {
            BreakerChange::Closed {
                cluster: cluster.to_string(),
            }
        } else {
            BreakerChange::None
        }
    }

    /// Whether a cluster is currently postponed. Expired cooldowns move
    /// the breaker to half-open (one probe allowed through).
    pub fn is_open(&mut self, cluster: &str, now_ms: u64) -> bool {
        let Some(entry) = self.breakers.get_mut(cluster) else {
            return false;
        };
        match entry.phase {
            BreakerPhase::Open => {
                if entry.cooldown_until_ms <= now_ms {
                    entry.phase = BreakerPhase::HalfOpen;
                    false
                } else {
                    true
                }
            }
            BreakerPhase::HalfOpen | BreakerPhase::Closed => false,
        }
    }

    // ── quarantine ───────────────────────────────────────────────────────────

    pub fn raise_quarantine(&mut self, until_ms: u64, reason: impl Into<String>) {
        self.quarantine_until_ms = until_ms;
        self.quarantine_reason = Some(reason.into());
    }

    pub fn clear_quarantine(&mut self) {
        self.quarantine_until_ms = 0;
        self.quarantine_reason = None;
    }

    pub fn in_quarantine(&self, now_ms: u64) -> bool {
        self.quarantine_until_ms > now_ms
    }

    /// During quarantine only allowlisted roles/classes dispatch.
    pub fn quarantine_admits(
        &self,
        role: Role,
        task_class: Option<&str>,
        now_ms: u64,
        settings: &Settings,
    ) -> bool {
        if !self.in_quarantine(now_ms) {
            return true;
        }
        let allowed = settings.get_list("QUARANTINE_ALLOWED_CLASSES");
        allowed.iter().any(|entry| {
            entry == role.as_str() || Some(entry.as_str()) == task_class
        })
    }

    /// Fixup fuse: reject new fixup children once the queue is deep.
    pub fn fixup_fused(&self, queued: u32, settings: &Settings) -> bool {
        queued >= settings.get_u64("FIXUP_FUSE_QUEUE_THRESHOLD") as u32
    }
}

// ── degradation matrix ───────────────────────────────────────────────────────

/// Signals the matrix evaluates.
#[derive(Debug, Clone, Copy, Default)]
pub struct Signals {
    pub queue_overload: bool,
    pub breaker_open: bool,
    pub failure_storm: bool,
}

/// Boolean expression over signals.
#[derive(Debug, Clone)]
pub enum Condition {
    QueueOverload,
    BreakerOpen,
    FailureStorm,
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Condition {
    pub fn eval(&self, signals: &Signals) -> bool {
        match self {
            Condition::QueueOverload => signals.queue_overload,
            Condition::BreakerOpen => signals.breaker_open,
            Condition::FailureStorm => signals.failure_storm,
            Condition::All(parts) => parts.iter().all(|c| c.eval(signals)),
            Condition::Any(parts) => parts.iter().any(|c| c.eval(signals)),
        }
    }
}

/// Actions a matrix entry may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixAction {
    /// Clamp per-executor WIP to this many running jobs.
    TightenWip(u32),
    /// Stop creating fixup children.
    DisableFixups,
    /// Raise quarantine for this many milliseconds.
    RaiseQuarantine(u64),
}

/// One declarative degradation rule.
#[derive(Debug, Clone)]
pub struct MatrixRule {
    pub name: &'static str,
    pub when: Condition,
    pub actions: Vec<MatrixAction>,
}

/// The default matrix, most severe first; first match wins.
pub fn default_matrix() -> Vec<MatrixRule> {
    vec![
        MatrixRule {
            name: "storm_and_overload",
            when: Condition::All(vec![Condition::FailureStorm, Condition::QueueOverload]),
            actions: vec![
                MatrixAction::RaiseQuarantine(15 * 60 * 1000),
                MatrixAction::TightenWip(1),
                MatrixAction::DisableFixups,
            ],
        },
        MatrixRule {
            name: "failure_storm",
            when: Condition::FailureStorm,
            actions: vec![MatrixAction::TightenWip(1), MatrixAction::DisableFixups],
        },
        MatrixRule {
            name: "queue_overload",
            when: Condition::Any(vec![Condition::QueueOverload, Condition::BreakerOpen]),
            actions: vec![MatrixAction::TightenWip(2)],
        },
    ]
}

/// Pick the most severe matching rule (declared order breaks ties).
pub fn evaluate_matrix<'a>(rules: &'a [MatrixRule], signals: &Signals) -> Option<&'a MatrixRule> {
    rules.iter().find(|rule| rule.when.eval(signals))
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
