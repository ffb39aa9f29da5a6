// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The taskboard: persistent set of tasks with fail-closed creation,
//! lifecycle transitions, and parent/child relationships. Every mutation
//! flushes to the snapshot file before the caller observes the result.

use af_core::{
    Clock, IdGen, Lane, Pins, Reason, Role, RunnerKind, Settings, Task, TaskId, TaskKind,
    TaskPointers, TaskStatus,
};
use af_storage::{read_json, write_json_atomic};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::BoardError;

/// Extensions recognized by file inference over title+goal text.
const INFERABLE_EXTENSIONS: &[&str] = &[
    "md", "mjs", "js", "ts", "tsx", "py", "json", "yaml", "yml", "toml", "ps1", "sh",
];

/// Task creation request, as accepted over HTTP and from split-apply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub kind: Option<TaskKind>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default, alias = "parentId")]
    pub parent_id: Option<TaskId>,
    #[serde(default, alias = "allowedExecutors")]
    pub allowed_executors: Vec<String>,
    #[serde(default, alias = "allowedModels")]
    pub allowed_models: Vec<String>,
    #[serde(default)]
    pub runner: Option<RunnerKind>,
    #[serde(default)]
    pub lane: Option<Lane>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub pins: Option<Pins>,
    #[serde(default, alias = "pinsInstance")]
    pub pins_instance: Option<Pins>,
    #[serde(default, alias = "templateId")]
    pub template_id: Option<String>,
    #[serde(default, alias = "allowedTests")]
    pub allowed_tests: Vec<String>,
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default, alias = "taskClass")]
    pub task_class: Option<String>,
    #[serde(default)]
    pub pointers: Option<TaskPointers>,
}

/// Partial patch of mutable task fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub runner: Option<RunnerKind>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub files: Option<Vec<String>>,
    #[serde(default)]
    pub skills: Option<Vec<String>>,
    #[serde(default)]
    pub pointers: Option<TaskPointers>,
    #[serde(default)]
    pub pins: Option<Pins>,
    #[serde(default, alias = "pinsInstance")]
    pub pins_instance: Option<Pins>,
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default, alias = "allowedTests")]
    pub allowed_tests: Option<Vec<String>>,
    #[serde(default, alias = "allowedModels")]
    pub allowed_models: Option<Vec<String>>,
    #[serde(default)]
    pub lane: Option<Lane>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default, alias = "taskClass")]
    pub task_class: Option<String>,
}

/// Persistent task set with a server-managed snapshot file.
pub struct Taskboard {
    tasks: HashMap<TaskId, Task>,
    path: PathBuf,
}

impl Taskboard {
    /// Load the board snapshot (empty board when absent).
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tasks: Vec<Task> = read_json(&path, Vec::new());
        Self {
            tasks: tasks.into_iter().map(|t| (t.id.clone(), t)).collect(),
            path,
        }
    }

    /// Flush the snapshot. Called while the caller still holds the board lock.
    pub fn save(&self) -> Result<(), BoardError> {
        let mut tasks: Vec<&Task> = self.tasks.values().collect();
        tasks.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then(a.id.0.cmp(&b.id.0)));
        write_json_atomic(&self.path, &tasks)?;
        Ok(())
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    pub fn list(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.values().collect();
        tasks.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then(a.id.0.cmp(&b.id.0)));
        tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks by status, for `/board` counts.
    pub fn counts(&self) -> HashMap<TaskStatus, usize> {
        let mut counts = HashMap::new();
        for task in self.tasks.values() {
            *counts.entry(task.status).or_insert(0) += 1;
        }
        counts
    }

    pub fn children_of(&self, parent: &TaskId) -> Vec<&Task> {
        let mut children: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.parent_id.as_ref() == Some(parent))
            .collect();
        children.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then(a.id.0.cmp(&b.id.0)));
        children
    }

    /// Fixup children of a class pointing at a source task.
    pub fn fixups_of(&self, source: &TaskId, class: &str) -> usize {
        self.tasks
            .values()
            .filter(|t| {
                t.task_class.as_deref() == Some(class)
                    && t.pointers.as_ref().map(|p| &p.source_task_id) == Some(source)
            })
            .count()
    }

    /// Create a task, enforcing the fail-closed rules.
    pub fn create(
        &mut self,
        new: NewTask,
        settings: &Settings,
        clock: &impl Clock,
        idgen: &impl IdGen,
    ) -> Result<Task, BoardError> {
        let task = self.build_task(new, settings, clock, idgen, false)?;
        self.tasks.insert(task.id.clone(), task.clone());
        self.save()?;
        Ok(task)
    }

    /// Two-phase pins creation: the task lands `blocked` with
    /// `pins_pending` set, waiting for a pinser to fill its pins.
    pub fn create_pins_pending(
        &mut self,
        new: NewTask,
        settings: &Settings,
        clock: &impl Clock,
        idgen: &impl IdGen,
    ) -> Result<Task, BoardError> {
        let mut task = self.build_task(new, settings, clock, idgen, true)?;
        task.pins_pending = true;
        task.status = TaskStatus::Blocked;
        self.tasks.insert(task.id.clone(), task.clone());
        self.save()?;
        Ok(task)
    }

    fn build_task(
        &self,
        new: NewTask,
        settings: &Settings,
        clock: &impl Clock,
        idgen: &impl IdGen,
        allow_missing_context: bool,
    ) -> Result<Task, BoardError> {
        if new.title.trim().is_empty() {
            return Err(BoardError::Rejected(Reason::MissingTitle));
        }
        if new.goal.trim().is_empty() {
            return Err(BoardError::Rejected(Reason::MissingGoal));
        }

        let kind = new.kind.unwrap_or(TaskKind::Atomic);
        let role = new.role.unwrap_or_default();

        let mut files = new.files;
        files.truncate(af_core::task::MAX_FILES);
        let mut skills = new.skills;
        skills.truncate(af_core::task::MAX_SKILLS);
        let mut allowed_models = new.allowed_models;
        allowed_models.truncate(af_core::task::MAX_MODELS);

        let mut pins = new.pins;

        // Pins present but with an empty allowlist are a hard error, not
        // something to silently repair.
        if let Some(p) = &pins {
            if p.allowed_paths.is_empty() && p.line_windows.is_empty() {
                return Err(BoardError::Rejected(Reason::MissingPinsAllowlist));
            }
        }
        // Provided pins still get the server-managed defaults.
        pins = pins.map(|p| p.with_defaults(af_core::task::MAX_FILES));

        if kind == TaskKind::Atomic && role.rules().requires_context && !allow_missing_context {
            if files.is_empty() && pins.is_none() {
                files = infer_files(&format!("{} {}", new.title, new.goal));
                files.truncate(af_core::task::MAX_FILES);
            }
            if files.is_empty() && pins.is_none() {
                return Err(BoardError::Rejected(Reason::MissingFiles));
            }
        }

        if let Some(extensions) = role.rules().allowed_extensions {
            let outside = files.iter().any(|f| {
                !extensions
                    .iter()
                    .any(|ext| f.rsplit('.').next() == Some(*ext))
            });
            if outside {
                return Err(BoardError::Rejected(Reason::RolePolicyViolation));
            }
        }

        let mut allowed_tests = new.allowed_tests;
        if kind == TaskKind::Atomic && settings.get_bool("CI_GATE_ENABLED") {
            if allowed_tests.is_empty() && settings.get_bool("CI_ALLOW_SELFTEST_DEFAULT") {
                allowed_tests.push("python selftest --task-id {task_id}".to_string());
            }
            if !af_adapters::has_real_test(&allowed_tests)
                && !settings.get_bool("CI_ALLOW_SELFTEST_DEFAULT")
            {
                return Err(BoardError::Rejected(Reason::MissingRealTest));
            }
        }

        // Default pins from files, bounded and with the fixed forbidden list.
        if pins.is_none() && !files.is_empty() {
            pins = Some(Pins::from_files(&files));
        }

        // Child pins must stay inside the parent's allowlist.
        if let (Some(parent_id), Some(child_pins)) = (&new.parent_id, &pins) {
            if let Some(parent) = self.tasks.get(parent_id) {
                if let Some(parent_pins) = parent.effective_pins() {
                    if !child_pins.is_subset_of(&parent_pins) {
                        return Err(BoardError::Rejected(Reason::PinsInsufficient));
                    }
                }
            }
        }

        let now_ms = clock.epoch_ms();
        let executors = parse_executors(&new.allowed_executors);

        Ok(Task {
            id: TaskId::new(idgen.next()),
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            parent_id: new.parent_id,
            kind,
            title: new.title,
            goal: new.goal,
            role,
            allowed_executors: executors,
            allowed_models,
            runner: new.runner,
            lane: new.lane.unwrap_or_default(),
            priority: new.priority,
            files,
            skills,
            pins,
            pins_instance: new.pins_instance,
            template_id: new.template_id,
            pins_pending: false,
            allowed_tests,
            contract: new.contract,
            assumptions: new.assumptions,
            area: new.area,
            task_class: new.task_class,
            pointers: new.pointers,
            status: match kind {
                TaskKind::Parent => TaskStatus::NeedsSplit,
                TaskKind::Atomic => TaskStatus::Backlog,
            },
            last_job_id: None,
            last_job_status: None,
            last_job_reason: None,
            last_job_finished_at_ms: None,
            timeout_retries: 0,
            model_attempt: 0,
            ci_fixup_count: 0,
            pins_fixup_count: 0,
            ci_requeue_count: 0,
            pins_requeue_count: 0,
            cooldown_until_ms: 0,
        })
    }

    /// Validated status transition.
    pub fn set_status(
        &mut self,
        id: &TaskId,
        to: TaskStatus,
        requeue: bool,
        reason: Option<Reason>,
        now_ms: u64,
    ) -> Result<(), BoardError> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| BoardError::NotFound(id.clone()))?;
        let from = task.status;
        if from == to {
            return Ok(());
        }
        if !from.can_transition(to, requeue) {
            return Err(BoardError::InvalidTransition { from, to });
        }
        task.status = to;
        task.updated_at_ms = now_ms;
        if let Some(reason) = reason {
            task.last_job_reason = Some(reason);
        }
        self.save()?;
        Ok(())
    }

    /// Partial patch of mutable fields.
    pub fn patch(
        &mut self,
        id: &TaskId,
        patch: TaskPatch,
        now_ms: u64,
    ) -> Result<Task, BoardError> {
        // Status changes go through the transition table first.
        if let Some(to) = patch.status {
            self.set_status(id, to, false, None, now_ms)?;
        }

        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| BoardError::NotFound(id.clone()))?;

        if let Some(runner) = patch.runner {
            task.runner = Some(runner);
        }
        if let Some(goal) = patch.goal {
            task.goal = goal;
        }
        if let Some(mut files) = patch.files {
            files.truncate(af_core::task::MAX_FILES);
            task.files = files;
        }
        if let Some(mut skills) = patch.skills {
            skills.truncate(af_core::task::MAX_SKILLS);
            task.skills = skills;
        }
        if let Some(pointers) = patch.pointers {
            task.pointers = Some(pointers);
        }
        if let Some(pins) = patch.pins {
            task.pins = Some(pins);
            task.pins_pending = false;
        }
        if let Some(pins_instance) = patch.pins_instance {
            task.pins_instance = Some(pins_instance);
        }
        if let Some(contract) = patch.contract {
            task.contract = Some(contract);
        }
        if let Some(tests) = patch.allowed_tests {
            task.allowed_tests = tests;
        }
        if let Some(mut models) = patch.allowed_models {
            models.truncate(af_core::task::MAX_MODELS);
            task.allowed_models = models;
        }
        if let Some(lane) = patch.lane {
            task.lane = lane;
        }
        if let Some(priority) = patch.priority {
            task.priority = Some(priority);
        }
        if let Some(area) = patch.area {
            task.area = Some(area);
        }
        if let Some(class) = patch.task_class {
            task.task_class = Some(class);
        }
        task.updated_at_ms = now_ms;

        let updated = task.clone();
        self.save()?;
        Ok(updated)
    }

    /// Record job linkage on a task (dispatch and verdict bookkeeping).
    pub fn link_job(
        &mut self,
        id: &TaskId,
        job_id: af_core::JobId,
        status: af_core::JobStatus,
        now_ms: u64,
    ) -> Result<(), BoardError> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| BoardError::NotFound(id.clone()))?;
        task.last_job_id = Some(job_id);
        task.last_job_status = Some(status);
        task.updated_at_ms = now_ms;
        self.save()?;
        Ok(())
    }

    pub fn remove(&mut self, id: &TaskId) -> Result<Task, BoardError> {
        let task = self
            .tasks
            .remove(id)
            .ok_or_else(|| BoardError::NotFound(id.clone()))?;
        self.save()?;
        Ok(task)
    }

    /// Explicit operator clear: the only bulk deletion path.
    pub fn clear(&mut self) -> Result<usize, BoardError> {
        let count = self.tasks.len();
        self.tasks.clear();
        self.save()?;
        Ok(count)
    }
}

fn parse_executors(raw: &[String]) -> Vec<af_core::ExecutorKind> {
    let parsed: Vec<_> = raw
        .iter()
        .filter_map(|s| af_core::ExecutorKind::parse(s))
        .collect();
    if parsed.is_empty() {
        af_core::ExecutorKind::ALL.to_vec()
    } else {
        parsed
    }
}

/// Infer repo-relative files from free text: tokens with a recognized
/// extension, stripped of surrounding punctuation.
pub fn infer_files(text: &str) -> Vec<String> {
    let mut files = Vec::new();
    for token in text.split_whitespace() {
        let cleaned = token
            .trim_matches(|c: char| {
                !(c.is_ascii_alphanumeric() || matches!(c, '.' | '/' | '_' | '-'))
            })
            .trim_end_matches('.');
        let Some((stem, ext)) = cleaned.rsplit_once('.') else {
            continue;
        };
        if !stem.is_empty()
            && INFERABLE_EXTENSIONS.contains(&ext)
            && !cleaned.starts_with('/')
            && !files.contains(&cleaned.to_string())
        {
            files.push(cleaned.to_string());
        }
    }
    files
}

#[cfg(test)]
#[path = "board_tests.rs"]
mod tests;
