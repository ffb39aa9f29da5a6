// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests.

use af_core::{Clock, FakeClock, SequentialIdGen, Settings};
use af_storage::StateLayout;
use std::path::Path;

use crate::board::NewTask;
use crate::engine::Engine;

pub(crate) type TestEngine = Engine<FakeClock, SequentialIdGen>;

/// Engine over a temp dir with small, deterministic pools.
pub(crate) fn test_engine(dir: &Path) -> TestEngine {
    let mut settings = Settings::new();
    settings.set("MODEL_POOL_PAID", "gpt-5-codex,gpt-5");
    settings.set(
        "MODEL_POOL_FREE",
        "opencode/kimi-k2,opencode/glm-4.6,opencode/qwen3-32b",
    );
    settings.set("MODEL_ROUTING_MODE", "strong_first");
    engine_with(dir, settings)
}

pub(crate) fn engine_with(dir: &Path, settings: Settings) -> TestEngine {
    let layout = StateLayout::new(dir);
    let (engine, _) = Engine::open(
        layout,
        settings,
        vec![dir.to_path_buf()],
        FakeClock::new(),
        SequentialIdGen::new("id"),
    )
    .unwrap();
    engine
}

/// Seed a repo-relative file under the allowed root.
pub(crate) fn seed_file(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// A well-formed atomic task request over `a.md`.
pub(crate) fn atomic_request(title: &str) -> NewTask {
    NewTask {
        title: title.to_string(),
        goal: "update the document".to_string(),
        kind: Some(af_core::TaskKind::Atomic),
        files: vec!["a.md".to_string()],
        allowed_tests: vec!["python -m pytest -q".to_string()],
        ..NewTask::default()
    }
}

/// Create a ready atomic task on the engine's board over a seeded file.
pub(crate) fn ready_task(engine: &mut TestEngine, dir: &Path, title: &str) -> af_core::TaskId {
    seed_file(dir, "a.md", "# a\nline two\nline three\n");
    let clock = engine.clock.clone();
    let idgen = engine.idgen.clone();
    let task = engine
        .board
        .create(atomic_request(title), &engine.settings.clone(), &clock, &idgen)
        .unwrap();
    engine
        .board
        .set_status(
            &task.id,
            af_core::TaskStatus::Ready,
            false,
            None,
            clock.epoch_ms(),
        )
        .unwrap();
    task.id
}
