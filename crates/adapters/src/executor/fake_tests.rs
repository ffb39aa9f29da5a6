// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn replays_script_in_order() {
    let fake = FakeExecutor::new(ExecutorKind::Codex);
    fake.push_outcome(FakeExecutor::failed(1, "rate limit"));
    fake.push_outcome(FakeExecutor::done("second"));

    let first = fake.run("p1", "m", Duration::from_secs(1)).await.unwrap();
    assert!(!first.ok);
    let second = fake.run("p2", "m", Duration::from_secs(1)).await.unwrap();
    assert_eq!(second.stdout, "second");
}

#[tokio::test]
async fn records_invocations() {
    let fake = FakeExecutor::new(ExecutorKind::Opencodecli);
    fake.run("the prompt", "opencode/kimi-k2", Duration::from_secs(9))
        .await
        .unwrap();

    let runs = fake.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].prompt, "the prompt");
    assert_eq!(runs[0].model, "opencode/kimi-k2");
    assert_eq!(runs[0].timeout, Duration::from_secs(9));
}

#[tokio::test]
async fn dry_script_defaults_to_success() {
    let fake = FakeExecutor::new(ExecutorKind::Codex);
    let outcome = fake.run("p", "m", Duration::from_secs(1)).await.unwrap();
    assert!(outcome.ok);
}

#[tokio::test]
async fn scripted_error_surfaces() {
    let fake = FakeExecutor::new(ExecutorKind::Codex);
    fake.push_error("spawn exploded");
    let err = fake.run("p", "m", Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, ExecutorError::Spawn(_)));
}

#[tokio::test]
async fn health_is_settable() {
    let fake = FakeExecutor::new(ExecutorKind::Codex);
    assert!(fake.health().await);
    fake.set_healthy(false);
    assert!(!fake.health().await);
}
