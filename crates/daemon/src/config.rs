// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: state root, executor binaries, and the
//! workspace the executors (and the pack builder) operate on.
//!
//! Resolution order: `afd.toml` under the state root, then environment
//! overrides, then defaults. Runtime knobs live in the settings registry
//! instead (`runtime.env.json`, served via `/config`).

use serde::Deserialize;
use std::path::PathBuf;

/// On-disk daemon config file (`afd.toml`), all fields optional.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    codex_bin: Option<String>,
    #[serde(default)]
    opencode_bin: Option<String>,
    #[serde(default)]
    workspace_root: Option<PathBuf>,
}

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// State root: snapshots, logs, packs, evidence live under here.
    pub root: PathBuf,
    /// Repository the executors work on (pack builder allowed root and
    /// executor cwd).
    pub workspace_root: PathBuf,
    pub codex_bin: String,
    pub opencode_bin: String,
}

impl Config {
    /// Load configuration for the current process.
    pub fn load() -> std::io::Result<Self> {
        let root = std::env::var_os("AF_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".af"));
        Self::load_from(root)
    }

    /// Load with an explicit root (tests and embedders).
    pub fn load_from(root: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&root)?;

        let file: ConfigFile = std::fs::read_to_string(root.join("afd.toml"))
            .ok()
            .and_then(|text| toml::from_str(&text).ok())
            .unwrap_or_default();

        let workspace_root = std::env::var_os("AF_WORKSPACE")
            .map(PathBuf::from)
            .or(file.workspace_root)
            .unwrap_or(std::env::current_dir()?);

        Ok(Self {
            root,
            workspace_root,
            codex_bin: std::env::var("AF_CODEX_BIN")
                .ok()
                .or(file.codex_bin)
                .unwrap_or_else(|| "codex".to_string()),
            opencode_bin: std::env::var("AF_OPENCODE_BIN")
                .ok()
                .or(file.opencode_bin)
                .unwrap_or_else(|| "opencode".to_string()),
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
