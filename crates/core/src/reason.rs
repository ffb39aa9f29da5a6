// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Closed taxonomy of reason codes.
//!
//! Every failure surfaced by the control plane carries one of these codes.
//! Unknown codes read back from disk round-trip through [`Reason::Other`]
//! and are treated as terminal until an operator intervenes.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reason {
    // -- input validation --
    MissingTitle,
    MissingGoal,
    MissingFiles,
    MissingPins,
    MissingPinsAllowlist,
    MissingRealTest,
    RolePolicyViolation,
    MaxChildrenExceeded,

    // -- idempotency --
    AlreadyDispatched,

    // -- quality / fuse --
    QualityGateBlocked,
    Fused,
    Quarantined,
    BreakerOpen,

    // -- executor runtime --
    ExecutorError,
    Timeout,
    MissingBinary,
    WrongSubcommand,
    OccliBunInstallFailed,

    // -- model --
    RateLimited,
    Unauthorized,
    Forbidden,
    NetworkError,

    // -- contract --
    MissingSubmitContract,
    SchemaViolation,

    // -- verification --
    CiFailed,
    CiSkipped,
    TestsOnlyTaskSelftest,
    NoAllowedCommand,

    // -- pins --
    PinsInsufficient,
    MissingPinsTemplate,
    PinsApplyFailed,

    // -- hygiene --
    TouchedFileOutsideAllowPaths,
    MissingArtifact(String),
    ArtifactOutOfRoot(String),

    // -- infra --
    JobMissing,
    JobLeaseExpired,
    CanceledByLeader,

    /// Unknown reason carried through verbatim.
    Other(String),
}

impl Reason {
    pub fn as_code(&self) -> String {
        match self {
            Reason::MissingTitle => "missing_title".into(),
            Reason::MissingGoal => "missing_goal".into(),
            Reason::MissingFiles => "missing_files".into(),
            Reason::MissingPins => "missing_pins".into(),
            Reason::MissingPinsAllowlist => "missing_pins_allowlist".into(),
            Reason::MissingRealTest => "missing_real_test".into(),
            Reason::RolePolicyViolation => "role_policy_violation".into(),
            Reason::MaxChildrenExceeded => "max_children_exceeded".into(),
            Reason::AlreadyDispatched => "already_dispatched".into(),
            Reason::QualityGateBlocked => "quality_gate_blocked".into(),
            Reason::Fused => "fused".into(),
            Reason::Quarantined => "quarantined".into(),
            Reason::BreakerOpen => "breaker_open".into(),
            Reason::ExecutorError => "executor_error".into(),
            Reason::Timeout => "timeout".into(),
            Reason::MissingBinary => "missing_binary".into(),
            Reason::WrongSubcommand => "wrong_subcommand".into(),
            Reason::OccliBunInstallFailed => "occli_bun_install_failed".into(),
            Reason::RateLimited => "rate_limited".into(),
            Reason::Unauthorized => "unauthorized".into(),
            Reason::Forbidden => "forbidden".into(),
            Reason::NetworkError => "network_error".into(),
            Reason::MissingSubmitContract => "missing_submit_contract".into(),
            Reason::SchemaViolation => "schema_violation".into(),
            Reason::CiFailed => "ci_failed".into(),
            Reason::CiSkipped => "ci_skipped".into(),
            Reason::TestsOnlyTaskSelftest => "tests_only_task_selftest".into(),
            Reason::NoAllowedCommand => "no_allowed_command".into(),
            Reason::PinsInsufficient => "pins_insufficient".into(),
            Reason::MissingPinsTemplate => "missing_pins_template".into(),
            Reason::PinsApplyFailed => "pins_apply_failed".into(),
            Reason::TouchedFileOutsideAllowPaths => "touched_file_outside_allow_paths".into(),
            Reason::MissingArtifact(name) => format!("missing_artifact_{name}"),
            Reason::ArtifactOutOfRoot(name) => format!("artifact_out_of_root_{name}"),
            Reason::JobMissing => "job_missing".into(),
            Reason::JobLeaseExpired => "job_lease_expired".into(),
            Reason::CanceledByLeader => "canceled_by_leader".into(),
            Reason::Other(code) => code.clone(),
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code {
            "missing_title" => Reason::MissingTitle,
            "missing_goal" => Reason::MissingGoal,
            "missing_files" => Reason::MissingFiles,
            "missing_pins" => Reason::MissingPins,
            "missing_pins_allowlist" => Reason::MissingPinsAllowlist,
            "missing_real_test" => Reason::MissingRealTest,
            "role_policy_violation" => Reason::RolePolicyViolation,
            "max_children_exceeded" => Reason::MaxChildrenExceeded,
            "already_dispatched" => Reason::AlreadyDispatched,
            "quality_gate_blocked" => Reason::QualityGateBlocked,
            "fused" => Reason::Fused,
            "quarantined" => Reason::Quarantined,
            "breaker_open" => Reason::BreakerOpen,
            "executor_error" => Reason::ExecutorError,
            "timeout" => Reason::Timeout,
            "missing_binary" => Reason::MissingBinary,
            "wrong_subcommand" => Reason::WrongSubcommand,
            "occli_bun_install_failed" => Reason::OccliBunInstallFailed,
            "rate_limited" => Reason::RateLimited,
            "unauthorized" => Reason::Unauthorized,
            "forbidden" => Reason::Forbidden,
            "network_error" => Reason::NetworkError,
            "missing_submit_contract" => Reason::MissingSubmitContract,
            "schema_violation" => Reason::SchemaViolation,
            "ci_failed" => Reason::CiFailed,
            "ci_skipped" => Reason::CiSkipped,
            "tests_only_task_selftest" => Reason::TestsOnlyTaskSelftest,
            "no_allowed_command" => Reason::NoAllowedCommand,
            "pins_insufficient" => Reason::PinsInsufficient,
            "missing_pins_template" => Reason::MissingPinsTemplate,
            "pins_apply_failed" => Reason::PinsApplyFailed,
            "touched_file_outside_allow_paths" => Reason::TouchedFileOutsideAllowPaths,
            "job_missing" => Reason::JobMissing,
            "job_lease_expired" => Reason::JobLeaseExpired,
            "canceled_by_leader" => Reason::CanceledByLeader,
            other => {
                if let Some(name) = other.strip_prefix("missing_artifact_") {
                    Reason::MissingArtifact(name.to_string())
                } else if let Some(name) = other.strip_prefix("artifact_out_of_root_") {
                    Reason::ArtifactOutOfRoot(name.to_string())
                } else {
                    Reason::Other(other.to_string())
                }
            }
        }
    }

    /// Model-layer failures eligible for the model-ladder requeue.
    pub fn is_model_failure(&self) -> bool {
        matches!(
            self,
            Reason::RateLimited | Reason::Unauthorized | Reason::Forbidden
        )
    }

    /// Pins failures eligible for a pins-fixup child.
    pub fn is_pins_failure(&self) -> bool {
        matches!(
            self,
            Reason::PinsInsufficient | Reason::MissingPins | Reason::MissingPinsTemplate
        )
    }

    /// CI failures eligible for a ci-fixup child.
    pub fn is_ci_failure(&self) -> bool {
        matches!(self, Reason::CiFailed | Reason::CiSkipped)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_code())
    }
}

impl Serialize for Reason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_code())
    }
}

impl<'de> Deserialize<'de> for Reason {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Reason::from_code(&s))
    }
}

#[cfg(test)]
#[path = "reason_tests.rs"]
mod tests;
