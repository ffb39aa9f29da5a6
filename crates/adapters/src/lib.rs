// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! af-adapters: subprocess plumbing and the executor drivers the control
//! plane dispatches work through.

pub mod ci;
pub mod executor;
pub mod subprocess;

pub use ci::{has_real_test, is_selftest, resolve_ci_command, run_ci_command, CI_ALLOWED_PREFIXES};
pub use executor::codex::CodexDriver;
pub use executor::opencode::OpencodeDriver;
pub use executor::{classify_run, ExecutorDriver, ExecutorError, RunOutcome};
pub use subprocess::{spawn, ExecOutput, SpawnSpec};

#[cfg(any(test, feature = "test-support"))]
pub use executor::fake::FakeExecutor;
