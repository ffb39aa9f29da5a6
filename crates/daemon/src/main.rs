// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent Foundry Daemon (afd)
//!
//! Long-running process that owns the taskboard, the job queue, and the
//! executor fleet, and serves the JSON control surface over HTTP.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::net::SocketAddr;

use fs2::FileExt;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use af_daemon::{config::Config, http, loops, plane::AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("afd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("afd {}", env!("CARGO_PKG_VERSION"));
                println!("Agent Foundry daemon - accepts goals over HTTP, dispatches them");
                println!("to CLI coder executors, and verifies the results.");
                println!();
                println!("USAGE:");
                println!("    afd");
                println!();
                println!("ENVIRONMENT:");
                println!("    AF_ROOT          state directory (default ./.af)");
                println!("    AF_WORKSPACE     repository the executors work on (default cwd)");
                println!("    AF_CODEX_BIN     codex-like binary (default codex)");
                println!("    AF_OPENCODE_BIN  opencode-like binary (default opencode)");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: afd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;

    // Single-instance lock on the state root.
    let layout = af_storage::StateLayout::new(&config.root);
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(layout.daemon_lock_file())?;
    if lock_file.try_lock_exclusive().is_err() {
        let pid = std::fs::read_to_string(layout.daemon_lock_file())
            .unwrap_or_default()
            .trim()
            .to_string();
        eprintln!("afd is already running");
        if !pid.is_empty() {
            eprintln!("  pid: {pid}");
        }
        std::process::exit(1);
    }
    std::fs::write(layout.daemon_lock_file(), std::process::id().to_string())?;

    let _log_guard = setup_logging(&layout)?;
    info!(root = %config.root.display(), "starting afd");

    let (state, report) = match AppState::build(&config) {
        Ok(built) => built,
        Err(e) => {
            error!(error = %e, "failed to build control plane");
            return Err(e.into());
        }
    };
    if report.demoted_jobs > 0 || report.reset_tasks > 0 {
        info!(
            demoted_jobs = report.demoted_jobs,
            reset_tasks = report.reset_tasks,
            "startup recovery complete"
        );
    }

    loops::spawn_all(&state);

    let port = state.engine.lock().settings.get_u64("GATEWAY_PORT") as u16;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("afd ready, listening on http://{addr}");
    println!("READY");

    let app = http::router(state.clone());
    let shutdown = state.shutdown.clone();
    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown.notified().await;
    });

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        result = serve => {
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        }
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = sigint.recv() => info!("SIGINT received"),
    }

    // Stop loops, flush a final snapshot, release the lock.
    state.shutdown.notify_waiters();
    {
        let engine = state.engine.lock();
        if let Err(e) = engine.board.save() {
            error!(error = %e, "final board save failed");
        }
        if let Err(e) = engine.queue.save() {
            error!(error = %e, "final queue save failed");
        }
        engine.persist_degradation();
    }
    info!("afd stopped");
    Ok(())
}

/// File logging with env-filter; guard must outlive the process body.
fn setup_logging(
    layout: &af_storage::StateLayout,
) -> std::io::Result<tracing_appender::non_blocking::WorkerGuard> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(layout.daemon_log_file())?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}
