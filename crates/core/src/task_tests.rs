// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::ready_task;

// ── transitions ──────────────────────────────────────────────────────────────

#[yare::parameterized(
    backlog_ready       = { TaskStatus::Backlog, TaskStatus::Ready, true },
    ready_in_progress   = { TaskStatus::Ready, TaskStatus::InProgress, true },
    in_progress_done    = { TaskStatus::InProgress, TaskStatus::Done, true },
    in_progress_failed  = { TaskStatus::InProgress, TaskStatus::Failed, true },
    in_progress_blocked = { TaskStatus::InProgress, TaskStatus::Blocked, true },
    blocked_ready       = { TaskStatus::Blocked, TaskStatus::Ready, true },
    split_in_progress   = { TaskStatus::NeedsSplit, TaskStatus::InProgress, true },
    done_failed         = { TaskStatus::Done, TaskStatus::Failed, false },
    failed_done         = { TaskStatus::Failed, TaskStatus::Done, false },
    backlog_done        = { TaskStatus::Backlog, TaskStatus::Done, false },
    ready_failed        = { TaskStatus::Ready, TaskStatus::Failed, false },
)]
fn transition_table(from: TaskStatus, to: TaskStatus, allowed: bool) {
    assert_eq!(from.can_transition(to, false), allowed);
}

#[test]
fn failed_to_ready_only_via_requeue() {
    assert!(!TaskStatus::Failed.can_transition(TaskStatus::Ready, false));
    assert!(TaskStatus::Failed.can_transition(TaskStatus::Ready, true));
}

#[test]
fn done_reopens_only_explicitly() {
    assert!(!TaskStatus::Done.can_transition(TaskStatus::Ready, false));
    assert!(TaskStatus::Done.can_transition(TaskStatus::Ready, true));
}

#[test]
fn status_parse_roundtrip() {
    for status in TaskStatus::ALL {
        assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(TaskStatus::parse("bogus"), None);
}

// ── lanes & priority ─────────────────────────────────────────────────────────

#[test]
fn lane_priority_defaults() {
    assert_eq!(Lane::Fastlane.default_priority(), 900);
    assert_eq!(Lane::Mainlane.default_priority(), 500);
    assert_eq!(Lane::Batchlane.default_priority(), 100);
}

#[test]
fn parked_lanes() {
    assert!(Lane::Quarantine.is_parked());
    assert!(Lane::Dlq.is_parked());
    assert!(!Lane::Mainlane.is_parked());
}

#[test]
fn explicit_priority_beats_lane_default() {
    let mut task = ready_task("t1");
    assert_eq!(task.effective_priority(), 500);
    task.priority = Some(42);
    assert_eq!(task.effective_priority(), 42);
    task.lane = Lane::Fastlane;
    assert_eq!(task.effective_priority(), 42);
}

// ── job bookkeeping ──────────────────────────────────────────────────────────

#[test]
fn active_job_detection() {
    let mut task = ready_task("t1");
    assert!(!task.has_active_job());

    task.last_job_id = Some(crate::JobId::new("j1"));
    task.last_job_status = Some(crate::JobStatus::Running);
    assert!(task.has_active_job());

    task.last_job_status = Some(crate::JobStatus::Failed);
    assert!(!task.has_active_job());
}

#[test]
fn cooldown_window() {
    let mut task = ready_task("t1");
    task.cooldown_until_ms = 5_000;
    assert!(task.in_cooldown(4_999));
    assert!(!task.in_cooldown(5_000));
}

#[test]
fn effective_pins_merges_template_and_instance() {
    let mut task = ready_task("t1");
    task.pins_instance = Some(Pins {
        allowed_paths: vec!["b.md".to_string()],
        ..Pins::default()
    });

    let effective = task.effective_pins().unwrap();
    assert!(effective.allowed_paths.contains(&"a.md".to_string()));
    assert!(effective.allowed_paths.contains(&"b.md".to_string()));
}

#[test]
fn serde_skips_empty_options() {
    let task = ready_task("t1");
    let json = serde_json::to_string(&task).unwrap();
    assert!(!json.contains("parent_id"));
    assert!(!json.contains("last_job_id"));
    let back: Task = serde_json::from_str(&json).unwrap();
    assert_eq!(back.id, task.id);
    assert_eq!(back.status, TaskStatus::Ready);
}
