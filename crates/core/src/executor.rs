// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executor kinds known to the control plane

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two CLI coder families a task may be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    /// Codex-style executor: prompt on stdin, read-only sandbox flags.
    Codex,
    /// OpenCode-style executor: prompt as argv, project config disabled via env.
    Opencodecli,
}

impl ExecutorKind {
    pub const ALL: [ExecutorKind; 2] = [ExecutorKind::Codex, ExecutorKind::Opencodecli];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorKind::Codex => "codex",
            ExecutorKind::Opencodecli => "opencodecli",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "codex" => Some(ExecutorKind::Codex),
            "opencodecli" | "occli" => Some(ExecutorKind::Opencodecli),
            _ => None,
        }
    }

    /// OpenCode models carry an explicit `opencode/` prefix in pool lists;
    /// codex models do not.
    pub fn owns_model(&self, model: &str) -> bool {
        match self {
            ExecutorKind::Codex => !model.starts_with("opencode/"),
            ExecutorKind::Opencodecli => model.starts_with("opencode/"),
        }
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
