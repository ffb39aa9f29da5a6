// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::fake::FakeExecutor;
use super::*;

#[test]
fn timeout_wins_classification() {
    let outcome = FakeExecutor::timed_out();
    assert_eq!(classify_run(&outcome), Some(Reason::Timeout));
}

#[test]
fn ok_run_classifies_to_none() {
    assert_eq!(classify_run(&FakeExecutor::done("output")), None);
}

#[yare::parameterized(
    rate_limit     = { "Error: rate limit exceeded", Reason::RateLimited },
    http_429       = { "upstream returned 429", Reason::RateLimited },
    unauthorized   = { "401 Unauthorized", Reason::Unauthorized },
    forbidden      = { "403 Forbidden for model", Reason::Forbidden },
    network        = { "network unreachable", Reason::NetworkError },
    conn_refused   = { "connection refused", Reason::NetworkError },
    subcommand     = { "error: unrecognized subcommand 'exec'", Reason::WrongSubcommand },
    bun            = { "bun install failed with code 1", Reason::OccliBunInstallFailed },
    plain_failure  = { "something else went wrong", Reason::ExecutorError },
)]
fn stderr_sniffing(stderr: &str, expected: Reason) {
    let outcome = FakeExecutor::failed(1, stderr);
    assert_eq!(classify_run(&outcome), Some(expected));
}

#[test]
fn executor_error_reasons() {
    assert_eq!(
        ExecutorError::MissingBinary("codex".into()).reason(),
        Reason::MissingBinary
    );
    assert_eq!(
        ExecutorError::Spawn("boom".into()).reason(),
        Reason::ExecutorError
    );
}

#[test]
fn io_not_found_maps_to_missing_binary() {
    let err = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
    assert!(matches!(
        ExecutorError::from_io("codex", err),
        ExecutorError::MissingBinary(_)
    ));

    let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
    assert!(matches!(
        ExecutorError::from_io("codex", err),
        ExecutorError::Spawn(_)
    ));
}
