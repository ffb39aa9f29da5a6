// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Split handling: parse a planner's JSON array into child tasks.

use af_core::{first_balanced_array, Reason};
use serde::Deserialize;

use crate::board::NewTask;
use crate::error::BoardError;

/// One planner array element, tolerant of extra fields.
#[derive(Debug, Clone, Deserialize)]
pub struct SplitChild {
    pub title: String,
    pub goal: String,
    #[serde(default)]
    pub role: Option<af_core::Role>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default, alias = "allowedTests")]
    pub allowed_tests: Vec<String>,
    #[serde(default)]
    pub pins: Option<af_core::Pins>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub area: Option<String>,
}

/// Extract child specs from planner stdout.
///
/// Agent-message JSON text is scanned first, then the raw stream; the
/// first balanced top-level array wins either way. Children dedup by
/// normalized title before the per-parent budget applies.
pub fn parse_split_children(
    stdout: &str,
    max_children: usize,
) -> Result<Vec<SplitChild>, BoardError> {
    let payload = agent_message_text(stdout)
        .and_then(|text| first_balanced_array(&text).map(str::to_owned))
        .or_else(|| first_balanced_array(stdout).map(str::to_owned))
        .ok_or(BoardError::Rejected(Reason::SchemaViolation))?;

    let raw: Vec<SplitChild> = serde_json::from_str(&payload)
        .map_err(|_| BoardError::Rejected(Reason::SchemaViolation))?;

    let mut seen = std::collections::HashSet::new();
    let mut children = Vec::new();
    for child in raw {
        if child.title.trim().is_empty() || child.goal.trim().is_empty() {
            continue;
        }
        if seen.insert(child.title.trim().to_lowercase()) {
            children.push(child);
        }
    }

    if children.len() > max_children {
        return Err(BoardError::Rejected(Reason::MaxChildrenExceeded));
    }
    Ok(children)
}

/// Concatenated agent-message text fields from a JSON output stream.
fn agent_message_text(stdout: &str) -> Option<String> {
    let mut collected = String::new();
    for line in stdout.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') {
            continue;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
            continue;
        };
        for field in ["text", "message", "content"] {
            if let Some(text) = value.get(field).and_then(|v| v.as_str()) {
                collected.push_str(text);
                collected.push('\n');
            }
        }
    }
    (!collected.is_empty()).then_some(collected)
}

/// Turn a split child into a board create request under a parent.
pub fn child_to_new_task(child: SplitChild, parent_id: &af_core::TaskId) -> NewTask {
    NewTask {
        title: child.title,
        goal: child.goal,
        kind: Some(af_core::TaskKind::Atomic),
        role: child.role,
        parent_id: Some(parent_id.clone()),
        files: child.files,
        allowed_tests: child.allowed_tests,
        pins: child.pins,
        skills: child.skills,
        area: child.area,
        ..NewTask::default()
    }
}

/// Parse a pinser's `{"pins": {...}}` payload from stdout.
///
/// Tries the whole stream as one JSON object first (pretty-printed
/// output), then line by line.
pub fn parse_pins_payload(stdout: &str) -> Option<af_core::Pins> {
    let candidates = std::iter::once(stdout.trim()).chain(stdout.lines().map(str::trim));
    for candidate in candidates {
        if !candidate.starts_with('{') {
            continue;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) else {
            continue;
        };
        if let Some(pins) = value.get("pins") {
            if let Ok(pins) = serde_json::from_value::<af_core::Pins>(pins.clone()) {
                return Some(pins);
            }
        }
    }
    None
}

use af_core::{Clock, Event, IdGen, JobStatus, TaskId, TaskStatus};

use crate::engine::Engine;

impl<C: Clock, G: IdGen> Engine<C, G> {
    /// Split-apply: consume the completed planner job's stdout and create
    /// the parent's atomic children.
    pub fn apply_split(&mut self, parent_id: &TaskId) -> Result<Vec<af_core::Task>, BoardError> {
        let now_ms = self.clock.epoch_ms();
        let parent = self
            .board
            .get(parent_id)
            .ok_or_else(|| BoardError::NotFound(parent_id.clone()))?
            .clone();

        let job = parent
            .last_job_id
            .as_ref()
            .and_then(|id| self.queue.get(id))
            .ok_or(BoardError::Rejected(Reason::JobMissing))?;
        if job.status != JobStatus::Done {
            return Err(BoardError::Rejected(Reason::Other(
                "split_job_not_done".into(),
            )));
        }
        let stdout = job.stdout.clone();

        let budget = self.settings.get_u64("SPLIT_MAX_CHILDREN") as usize;
        let specs = parse_split_children(&stdout, budget)?;
        let two_phase = self.settings.get_bool("PINS_TWO_PHASE");

        let clock = self.clock.clone();
        let idgen = self.idgen.clone();
        let mut children = Vec::new();
        for spec in specs {
            let missing_context = spec.files.is_empty() && spec.pins.is_none();
            let new = child_to_new_task(spec, parent_id);
            let child = if two_phase && missing_context {
                self.board
                    .create_pins_pending(new, &self.settings, &clock, &idgen)?
            } else {
                let created = self.board.create(new, &self.settings, &clock, &idgen)?;
                self.board
                    .set_status(&created.id, TaskStatus::Ready, false, None, now_ms)?;
                self.board
                    .get(&created.id)
                    .cloned()
                    .unwrap_or(created)
            };
            children.push(child);
        }

        self.board
            .set_status(parent_id, TaskStatus::Ready, true, None, now_ms)?;
        self.emit(&Event::TaskSplitApplied {
            task_id: parent_id.clone(),
            children: children.iter().map(|c| c.id.clone()).collect(),
        });
        Ok(children)
    }
}

#[cfg(test)]
#[path = "split_tests.rs"]
mod tests;
