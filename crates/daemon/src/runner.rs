// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Internal job execution: drive a queued job through its executor and
//! feed the result to the verdict pipeline. The engine lock is released
//! for the whole driver run and the CI gate subprocess.

use af_adapters::ExecutorDriver;
use af_core::{Clock, ExecutorKind, Job, SystemClock};
use af_engine::{CiPlan, CiRunResult, CompletionOutputs};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, warn};

use crate::plane::AppState;

/// One scheduling pass: start every runnable internal job, spawning a
/// task per run. The boolean gate keeps passes from interleaving; the
/// pass loops until no (free-slot, queued-job) pair remains.
pub fn schedule_pass(state: &AppState) {
    if state.sched_gate.swap(true, Ordering::SeqCst) {
        return;
    }

    loop {
        let mut started = Vec::new();
        {
            let mut engine = state.engine.lock();
            for kind in ExecutorKind::ALL {
                while let Some(job) = engine.start_next_internal(kind) {
                    started.push(job);
                }
            }
        }
        if started.is_empty() {
            break;
        }
        for job in started {
            let state = state.clone();
            tokio::spawn(async move {
                run_job(state, job).await;
            });
        }
    }

    state.sched_gate.store(false, Ordering::SeqCst);
}

/// Execute one job end to end: driver run, completion, CI gate, verdict.
pub async fn run_job(state: AppState, job: Job) {
    debug!(job_id = %job.id, executor = %job.executor, model = %job.model, "running job");
    let timeout = Duration::from_millis(job.timeout_ms);

    let outcome = match job.executor {
        ExecutorKind::Codex => {
            state
                .drivers
                .codex
                .run(&job.prompt, &job.model, timeout)
                .await
        }
        ExecutorKind::Opencodecli => {
            state
                .drivers
                .opencode
                .run(&job.prompt, &job.model, timeout)
                .await
        }
    };

    let outputs = match outcome {
        Ok(run) => CompletionOutputs::from(run),
        Err(e) => CompletionOutputs {
            exit_code: None,
            stdout: String::new(),
            stderr: e.to_string(),
            timed_out: false,
            reason: Some(e.reason()),
        },
    };

    let plan = {
        let mut engine = state.engine.lock();
        engine.begin_completion(&job.id, outputs, None)
    };

    match plan {
        Ok(plan) => {
            let ci_result = match plan.ci {
                Some(ci) => Some(run_ci(&ci).await),
                None => None,
            };
            let mut engine = state.engine.lock();
            if let Err(e) = engine.finalize_completion(&job.id, ci_result) {
                warn!(job_id = %job.id, error = %e, "finalize failed");
            }
        }
        Err(e) => warn!(job_id = %job.id, error = %e, "completion rejected"),
    }

    // Completion may have freed a slot or created fixup work.
    state.sched_kick.notify_one();
}

/// Run the planned CI command and capture its window.
pub async fn run_ci(plan: &CiPlan) -> CiRunResult {
    let clock = SystemClock;
    let started_at_ms = clock.epoch_ms();
    let output = af_adapters::run_ci_command(
        &plan.command,
        &plan.cwd,
        Duration::from_millis(plan.timeout_ms),
    )
    .await;
    let finished_at_ms = clock.epoch_ms();

    match output {
        Ok(output) => CiRunResult {
            command: plan.command.clone(),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            timed_out: output.timed_out,
            started_at_ms,
            finished_at_ms,
        },
        Err(e) => CiRunResult {
            command: plan.command.clone(),
            exit_code: None,
            stdout: String::new(),
            stderr: format!("ci command failed to start: {e}"),
            timed_out: false,
            started_at_ms,
            finished_at_ms,
        },
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
