// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cooperative background loops. Each loop reads its interval from the
//! settings registry, mutates state under the same lock discipline as
//! the HTTP handlers, and exits on the shutdown notification.

use std::time::Duration;
use tracing::debug;

use crate::plane::AppState;
use crate::runner::schedule_pass;

/// Spawn every background loop.
pub fn spawn_all(state: &AppState) {
    tokio::spawn(scheduler_loop(state.clone()));
    tokio::spawn(lease_sweep_loop(state.clone()));
    tokio::spawn(stale_sweep_loop(state.clone()));
    tokio::spawn(autorescue_loop(state.clone()));
    tokio::spawn(watchdog_loop(state.clone()));
    tokio::spawn(heartbeat_loop(state.clone()));
}

fn tick_ms(state: &AppState, key: &str) -> u64 {
    state.engine.lock().settings.get_u64(key).max(250)
}

/// Scheduler: runs a pass every second or whenever kicked.
async fn scheduler_loop(state: AppState) {
    loop {
        tokio::select! {
            _ = state.shutdown.notified() => break,
            _ = state.sched_kick.notified() => {}
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
        schedule_pass(&state);
    }
    debug!("scheduler loop stopped");
}

async fn lease_sweep_loop(state: AppState) {
    loop {
        let interval = tick_ms(&state, "LEASE_SWEEP_TICK_MS");
        tokio::select! {
            _ = state.shutdown.notified() => break,
            _ = tokio::time::sleep(Duration::from_millis(interval)) => {}
        }
        let recycled = state.engine.lock().sweep_leases();
        if recycled > 0 {
            state.sched_kick.notify_one();
        }
    }
}

async fn stale_sweep_loop(state: AppState) {
    loop {
        let interval = tick_ms(&state, "STALE_SWEEP_TICK_MS");
        tokio::select! {
            _ = state.shutdown.notified() => break,
            _ = tokio::time::sleep(Duration::from_millis(interval)) => {}
        }
        let recovered = state.engine.lock().sweep_stale_tasks();
        if recovered > 0 {
            state.sched_kick.notify_one();
        }
    }
}

async fn autorescue_loop(state: AppState) {
    loop {
        let interval = tick_ms(&state, "AUTORESCUE_TICK_MS");
        tokio::select! {
            _ = state.shutdown.notified() => break,
            _ = tokio::time::sleep(Duration::from_millis(interval)) => {}
        }
        let rescued = state.engine.lock().sweep_autorescue();
        if rescued > 0 {
            state.sched_kick.notify_one();
        }
    }
}

/// Watchdog also re-evaluates the degradation matrix each tick.
async fn watchdog_loop(state: AppState) {
    loop {
        tokio::select! {
            _ = state.shutdown.notified() => break,
            _ = tokio::time::sleep(Duration::from_secs(15)) => {}
        }
        let mut engine = state.engine.lock();
        engine.watchdog_tick();
        engine.apply_degradation_matrix();
    }
}

async fn heartbeat_loop(state: AppState) {
    loop {
        tokio::select! {
            _ = state.shutdown.notified() => break,
            _ = tokio::time::sleep(Duration::from_secs(30)) => {}
        }
        state.engine.lock().append_heartbeat();
    }
}
