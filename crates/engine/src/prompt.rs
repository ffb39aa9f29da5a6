// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt assembly: role preamble, mission, goal, contract, pins, context
//! pack, and the submit-contract instructions, in that order.

use af_core::{Task, SUBMIT_SCHEMA_VERSION};

/// Standing instructions appended to every executor prompt.
fn submit_instructions(task_id: &str) -> String {
    format!(
        "When finished, emit exactly one line starting with `SUBMIT:` followed by a \
         JSON object with schema_version \"{SUBMIT_SCHEMA_VERSION}\", task_id \"{task_id}\", \
         status DONE|NEED_INPUT|FAILED, changed_files, new_files, touched_files, \
         tests {{commands, passed, summary}}, and artifacts \
         {{report_md, selftest_log, evidence_dir, patch_diff, submit_json}}, with \
         every artifact path under artifacts/. Touch only files inside your pinned paths."
    )
}

/// Assemble the full prompt for a job.
pub fn build_prompt(
    task: &Task,
    mission: Option<&str>,
    pack_text: Option<&str>,
    handbook: Option<&str>,
) -> String {
    let mut out = String::new();

    out.push_str(task.role.rules().preamble);
    out.push_str("\n\n");

    if let Some(mission) = mission {
        if !mission.is_empty() {
            out.push_str("# Mission\n");
            out.push_str(mission);
            out.push_str("\n\n");
        }
    }

    out.push_str("# Task\n");
    out.push_str(&format!("Title: {}\n", task.title));
    out.push_str(&format!("Task id: {}\n\n", task.id));
    out.push_str(&task.goal);
    out.push_str("\n\n");

    if let Some(contract) = &task.contract {
        out.push_str("# Acceptance\n");
        out.push_str(contract);
        out.push_str("\n\n");
    }

    if !task.assumptions.is_empty() {
        out.push_str("# Assumptions\n");
        for assumption in &task.assumptions {
            out.push_str(&format!("- {assumption}\n"));
        }
        out.push('\n');
    }

    if !task.allowed_tests.is_empty() {
        out.push_str("# Allowed tests\n");
        for test in &task.allowed_tests {
            out.push_str(&format!("- {test}\n"));
        }
        out.push('\n');
    }

    if let Some(pins) = task.effective_pins() {
        if let Ok(json) = serde_json::to_string_pretty(&pins) {
            out.push_str("# Pins\n```json\n");
            out.push_str(&json);
            out.push_str("\n```\n\n");
        }
    }

    if let Some(pack) = pack_text {
        out.push_str("# Context\n");
        out.push_str(pack);
        out.push('\n');
    }

    if let Some(handbook) = handbook {
        if !handbook.is_empty() {
            out.push_str("# Handbook\n");
            out.push_str(handbook);
            out.push_str("\n\n");
        }
    }

    out.push_str("# Output contract\n");
    out.push_str(&submit_instructions(task.id.as_str()));
    out.push('\n');

    out
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
