// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! af-storage: crash-safe snapshots, append-only logs, and CI evidence
//! for the Agent Foundry control plane.

pub mod atomic;
pub mod evidence;
pub mod layout;
pub mod log;

pub use atomic::{read_json, update_json_locked, with_file_lock, write_json_atomic, StoreError};
pub use evidence::{sha256_hex, verify_evidence, write_ci_evidence, EvidenceFiles};
pub use layout::StateLayout;
pub use log::{read_jsonl, tail_jsonl, EventLog, JsonlWriter, LoggedEvent};
