// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task roles and the static rules table behind them.
//!
//! Roles are a closed enum; per-role policy is a plain lookup into
//! [`RoleRules`] rather than runtime dispatch.

use crate::executor::ExecutorKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role a task is executed under. Determines the prompt preamble and
/// which paths the executor may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Designer,
    Architect,
    Integrator,
    Engineer,
    Qa,
    Doc,
    Auditor,
    StatusReview,
    FactoryManager,
    Pinser,
}

impl Role {
    pub const ALL: [Role; 10] = [
        Role::Designer,
        Role::Architect,
        Role::Integrator,
        Role::Engineer,
        Role::Qa,
        Role::Doc,
        Role::Auditor,
        Role::StatusReview,
        Role::FactoryManager,
        Role::Pinser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Designer => "designer",
            Role::Architect => "architect",
            Role::Integrator => "integrator",
            Role::Engineer => "engineer",
            Role::Qa => "qa",
            Role::Doc => "doc",
            Role::Auditor => "auditor",
            Role::StatusReview => "status_review",
            Role::FactoryManager => "factory_manager",
            Role::Pinser => "pinser",
        }
    }

    /// Static rules for this role.
    pub fn rules(&self) -> &'static RoleRules {
        match self {
            Role::Designer => &DESIGNER,
            Role::Architect => &ARCHITECT,
            Role::Integrator => &INTEGRATOR,
            Role::Engineer => &ENGINEER,
            Role::Qa => &QA,
            Role::Doc => &DOC,
            Role::Auditor => &AUDITOR,
            Role::StatusReview => &STATUS_REVIEW,
            Role::FactoryManager => &FACTORY_MANAGER,
            Role::Pinser => &PINSER,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Engineer
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Plain per-role policy record.
pub struct RoleRules {
    /// Opening paragraph of the prompt for this role.
    pub preamble: &'static str,
    /// When set, tasks under this role may only list files with these
    /// extensions. `None` means any extension.
    pub allowed_extensions: Option<&'static [&'static str]>,
    /// Whether atomic tasks under this role require files or pins at
    /// dispatch time. Planning-only roles read the board, not the repo.
    pub requires_context: bool,
    /// Hard executor pin, if any. Split planning is pinned to codex.
    pub executor_pin: Option<ExecutorKind>,
}

static DESIGNER: RoleRules = RoleRules {
    preamble: "You are the designer. Decompose the goal into small, independently \
               verifiable tasks. Output a JSON array of task objects and nothing else.",
    allowed_extensions: None,
    requires_context: false,
    executor_pin: Some(ExecutorKind::Codex),
};

static ARCHITECT: RoleRules = RoleRules {
    preamble: "You are the architect. Decide structure and interfaces before code. \
               Keep changes inside the pinned paths.",
    allowed_extensions: None,
    requires_context: true,
    executor_pin: None,
};

static INTEGRATOR: RoleRules = RoleRules {
    preamble: "You are the integrator. Merge and reconcile existing work; do not \
               introduce new features.",
    allowed_extensions: None,
    requires_context: true,
    executor_pin: None,
};

static ENGINEER: RoleRules = RoleRules {
    preamble: "You are the engineer. Implement exactly the stated goal within the \
               pinned paths, then run the allowed tests.",
    allowed_extensions: None,
    requires_context: true,
    executor_pin: None,
};

static QA: RoleRules = RoleRules {
    preamble: "You are QA. Reproduce the failure, fix the smallest thing that makes \
               the required command pass, and prove it with test output.",
    allowed_extensions: None,
    requires_context: true,
    executor_pin: None,
};

static DOC: RoleRules = RoleRules {
    preamble: "You are the documentation writer. Touch only documentation files.",
    allowed_extensions: Some(&["md"]),
    requires_context: true,
    executor_pin: None,
};

static AUDITOR: RoleRules = RoleRules {
    preamble: "You are the auditor. Read, verify, and report; change nothing.",
    allowed_extensions: None,
    requires_context: true,
    executor_pin: None,
};

static STATUS_REVIEW: RoleRules = RoleRules {
    preamble: "You are reviewing factory status. Summarize board health and flag \
               stuck work.",
    allowed_extensions: None,
    requires_context: false,
    executor_pin: None,
};

static FACTORY_MANAGER: RoleRules = RoleRules {
    preamble: "You are the factory manager. Keep the board flowing: requeue, split, \
               or escalate as needed.",
    allowed_extensions: None,
    requires_context: false,
    executor_pin: None,
};

static PINSER: RoleRules = RoleRules {
    preamble: "You are the pinser. Produce a pins object (allowed_paths, \
               line_windows, symbols) sufficient for the source task. Output a \
               single JSON object of the form {\"pins\": {...}}.",
    allowed_extensions: None,
    requires_context: false,
    executor_pin: None,
};

#[cfg(test)]
#[path = "role_tests.rs"]
mod tests;
