// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn captures_stdout_and_exit() {
    let spec = SpawnSpec::new(
        vec!["sh".into(), "-c".into(), "printf hello".into()],
        Duration::from_secs(5),
    );
    let output = spawn(spec).await.unwrap();
    assert_eq!(output.exit_code, Some(0));
    assert_eq!(output.stdout, "hello");
    assert!(output.ok());
}

#[tokio::test]
async fn nonzero_exit_is_not_ok() {
    let spec = SpawnSpec::new(
        vec!["sh".into(), "-c".into(), "echo err >&2; exit 3".into()],
        Duration::from_secs(5),
    );
    let output = spawn(spec).await.unwrap();
    assert_eq!(output.exit_code, Some(3));
    assert_eq!(output.stderr.trim(), "err");
    assert!(!output.ok());
}

#[tokio::test]
async fn stdin_is_piped() {
    let spec = SpawnSpec {
        argv: vec!["cat".into()],
        stdin: Some("piped prompt".into()),
        env: Vec::new(),
        cwd: None,
        timeout: Duration::from_secs(5),
    };
    let output = spawn(spec).await.unwrap();
    assert_eq!(output.stdout, "piped prompt");
}

#[tokio::test]
async fn env_and_cwd_apply() {
    let dir = tempfile::tempdir().unwrap();
    let spec = SpawnSpec {
        argv: vec!["sh".into(), "-c".into(), "printf '%s' \"$MARKER\"; pwd".into()],
        stdin: None,
        env: vec![("MARKER".into(), "x1".into())],
        cwd: Some(dir.path().to_path_buf()),
        timeout: Duration::from_secs(5),
    };
    let output = spawn(spec).await.unwrap();
    assert!(output.stdout.starts_with("x1"));
    let cwd = output.stdout.trim_start_matches("x1").trim();
    assert_eq!(
        std::fs::canonicalize(cwd).unwrap(),
        std::fs::canonicalize(dir.path()).unwrap()
    );
}

#[tokio::test]
async fn timeout_kills_and_flags() {
    let spec = SpawnSpec::new(
        vec!["sleep".into(), "30".into()],
        Duration::from_millis(150),
    );
    let output = spawn(spec).await.unwrap();
    assert!(output.timed_out);
    assert_eq!(output.exit_code, None);
    assert!(!output.ok());
}

#[tokio::test]
async fn missing_binary_is_io_error() {
    let spec = SpawnSpec::new(
        vec!["definitely-not-a-binary-xyz".into()],
        Duration::from_secs(1),
    );
    let err = spawn(spec).await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
}

#[tokio::test]
async fn empty_argv_is_invalid_input() {
    let err = spawn(SpawnSpec::new(Vec::new(), Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
}
