// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{engine_with, test_engine};
use af_core::{JobStatus, Settings, TaskKind, TaskStatus};

fn planner_stdout(n: usize) -> String {
    let items: Vec<String> = (0..n)
        .map(|i| {
            format!(
                r#"{{"title":"t{i}","goal":"g{i}","files":["f{i}.md"],"allowedTests":["pytest"]}}"#
            )
        })
        .collect();
    format!("Plan:\n[{}]\nDone.", items.join(","))
}

// ── parse_split_children ─────────────────────────────────────────────────────

#[test]
fn parses_array_with_trailing_prose() {
    let children = parse_split_children(&planner_stdout(2), 30).unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0].title, "t0");
    assert_eq!(children[1].files, vec!["f1.md"]);
}

#[test]
fn prefers_agent_message_text() {
    let embedded = r#"[{"title":"from-msg","goal":"g","files":["x.md"],"allowedTests":["pytest"]}]"#
        .replace('"', "\\\"");
    let stdout = format!(
        "{{\"text\":\"plan {embedded} ok\"}}\n[{{\"title\":\"from-raw\",\"goal\":\"g\",\"files\":[\"y.md\"],\"allowedTests\":[\"pytest\"]}}]"
    );
    let children = parse_split_children(&stdout, 30).unwrap();
    assert_eq!(children[0].title, "from-msg");
}

#[test]
fn dedups_by_title_before_budget() {
    let item = r#"{"title":"same","goal":"g","files":["x.md"],"allowedTests":["pytest"]}"#;
    let stdout = format!("[{}]", vec![item; 40].join(","));
    let children = parse_split_children(&stdout, 30).unwrap();
    assert_eq!(children.len(), 1);
}

#[test]
fn over_budget_is_rejected() {
    let err = parse_split_children(&planner_stdout(31), 30).unwrap_err();
    assert_eq!(err.reason_code(), "max_children_exceeded");
}

#[test]
fn no_array_is_schema_violation() {
    let err = parse_split_children("no json here", 30).unwrap_err();
    assert_eq!(err.reason_code(), "schema_violation");
}

#[test]
fn blank_entries_are_skipped() {
    let stdout = r#"[{"title":"","goal":"g"},{"title":"ok","goal":"g","files":["x.md"],"allowedTests":["pytest"]}]"#;
    let children = parse_split_children(stdout, 30).unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].title, "ok");
}

// ── pins payload ─────────────────────────────────────────────────────────────

#[test]
fn parses_pins_object_line() {
    let stdout = r#"thinking
{"pins":{"allowed_paths":["src/lib.rs"],"max_files":1}}
done"#;
    let pins = parse_pins_payload(stdout).unwrap();
    assert_eq!(pins.allowed_paths, vec!["src/lib.rs"]);
    assert_eq!(pins.max_files, Some(1));
}

#[test]
fn parses_pretty_printed_pins() {
    let stdout = "{\n  \"pins\": {\n    \"allowed_paths\": [\"a.md\"]\n  }\n}";
    let pins = parse_pins_payload(stdout).unwrap();
    assert_eq!(pins.allowed_paths, vec!["a.md"]);
}

#[test]
fn missing_pins_payload_is_none() {
    assert!(parse_pins_payload("{\"other\": 1}").is_none());
    assert!(parse_pins_payload("prose only").is_none());
}

// ── apply_split (scenario: split-apply creates atomic children) ──────────────

fn parent_with_done_planner(
    engine: &mut crate::test_helpers::TestEngine,
    stdout: &str,
) -> af_core::TaskId {
    let clock = engine.clock.clone();
    let idgen = engine.idgen.clone();
    let parent = engine
        .board
        .create(
            NewTask {
                title: "big feature".to_string(),
                goal: "do many things".to_string(),
                kind: Some(TaskKind::Parent),
                ..NewTask::default()
            },
            &engine.settings.clone(),
            &clock,
            &idgen,
        )
        .unwrap();

    let job = engine.dispatch_split(&parent.id).unwrap();
    engine.queue.get_mut(&job.id).unwrap().status = JobStatus::Running;
    engine
        .begin_completion(
            &job.id,
            crate::verdict::CompletionOutputs {
                exit_code: Some(0),
                stdout: stdout.to_string(),
                ..Default::default()
            },
            None,
        )
        .unwrap();
    engine.finalize_completion(&job.id, None).unwrap();
    parent.id
}

#[test]
fn apply_split_creates_ready_children() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = test_engine(dir.path());
    let parent_id = parent_with_done_planner(
        &mut engine,
        r#"prose [{"title":"t1","goal":"g1","files":["x.md"],"allowedTests":["pytest"]},{"title":"t2","goal":"g2","files":["y.md"],"allowedTests":["pytest"]}] more prose"#,
    );

    let children = engine.apply_split(&parent_id).unwrap();
    assert_eq!(children.len(), 2);
    for child in &children {
        assert_eq!(child.kind, TaskKind::Atomic);
        assert_eq!(child.status, TaskStatus::Ready);
        assert_eq!(child.parent_id.as_ref(), Some(&parent_id));
    }
    assert_eq!(
        engine.board.get(&parent_id).unwrap().status,
        TaskStatus::Ready
    );
}

#[test]
fn two_phase_pins_blocks_pinless_children() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::new();
    settings.set("MODEL_POOL_PAID", "gpt-5-codex");
    settings.set("PINS_TWO_PHASE", "true");
    let mut engine = engine_with(dir.path(), settings);

    let parent_id = parent_with_done_planner(
        &mut engine,
        r#"[{"title":"no-context","goal":"g","allowedTests":["pytest"]}]"#,
    );

    let children = engine.apply_split(&parent_id).unwrap();
    assert_eq!(children.len(), 1);
    assert!(children[0].pins_pending);
    assert_eq!(children[0].status, TaskStatus::Blocked);
}
