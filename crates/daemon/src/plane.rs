// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared daemon state handed to every HTTP handler and loop.

use af_adapters::{CodexDriver, OpencodeDriver};
use af_core::{Settings, SystemClock, UuidIdGen};
use af_engine::{Engine, StartupReport};
use af_storage::{read_json, StateLayout, StoreError};
use parking_lot::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;

use crate::config::Config;

/// The production engine type.
pub type PlaneEngine = Engine<SystemClock, UuidIdGen>;

/// Concrete executor drivers, one per kind.
pub struct Drivers {
    pub codex: CodexDriver,
    pub opencode: OpencodeDriver,
}

/// Shared context for HTTP handlers and background loops.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Mutex<PlaneEngine>>,
    pub drivers: Arc<Drivers>,
    /// Re-entrancy gate for the scheduling loop.
    pub sched_gate: Arc<AtomicBool>,
    /// Kicked whenever new work may be runnable.
    pub sched_kick: Arc<Notify>,
    pub shutdown: Arc<Notify>,
    pub started_at: Instant,
}

impl AppState {
    /// Build the full control plane from configuration.
    pub fn build(config: &Config) -> Result<(Self, StartupReport), StoreError> {
        let layout = StateLayout::new(&config.root);
        let settings: Settings = read_json(&layout.runtime_env_file(), Settings::new());

        let (engine, report) = Engine::open(
            layout,
            settings,
            vec![config.workspace_root.clone()],
            SystemClock,
            UuidIdGen,
        )?;

        let drivers = Drivers {
            codex: CodexDriver::new(&config.codex_bin, &config.workspace_root),
            opencode: OpencodeDriver::new(&config.opencode_bin, &config.workspace_root),
        };

        Ok((
            Self {
                engine: Arc::new(Mutex::new(engine)),
                drivers: Arc::new(drivers),
                sched_gate: Arc::new(AtomicBool::new(false)),
                sched_kick: Arc::new(Notify::new()),
                shutdown: Arc::new(Notify::new()),
                started_at: Instant::now(),
            },
            report,
        ))
    }

    /// Persist the current settings map.
    pub fn persist_settings(&self) -> Result<(), StoreError> {
        let engine = self.engine.lock();
        af_storage::write_json_atomic(&engine.layout.runtime_env_file(), &engine.settings)
    }
}
