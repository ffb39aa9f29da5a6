// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn paths_are_rooted() {
    let layout = StateLayout::new("/var/af");
    assert_eq!(
        layout.tasks_file(),
        PathBuf::from("/var/af/artifacts/taskboard/tasks.json")
    );
    assert_eq!(
        layout.jobs_state_file(),
        PathBuf::from("/var/af/artifacts/executor_logs/jobs_state.json")
    );
    assert_eq!(
        layout.contextpack_file("abc"),
        PathBuf::from("/var/af/artifacts/executor_logs/contextpacks/abc.md")
    );
    assert_eq!(
        layout.thread_file("abc"),
        PathBuf::from("/var/af/artifacts/executor_logs/threads/abc.json")
    );
}

#[test]
fn ensure_creates_directories() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StateLayout::new(dir.path());
    layout.ensure().unwrap();

    assert!(layout.taskboard_dir().is_dir());
    assert!(layout.contextpacks_dir().is_dir());
    assert!(layout.threads_dir().is_dir());
    assert!(layout.ci_gate_dir().is_dir());
}
