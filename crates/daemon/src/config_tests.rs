// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn defaults_without_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_from(dir.path().to_path_buf()).unwrap();
    assert_eq!(config.codex_bin, "codex");
    assert_eq!(config.opencode_bin, "opencode");
    assert_eq!(config.root, dir.path());
}

#[test]
fn config_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("afd.toml"),
        "codex_bin = \"codexless\"\nopencode_bin = \"opencodeless\"\n",
    )
    .unwrap();

    let config = Config::load_from(dir.path().to_path_buf()).unwrap();
    assert_eq!(config.codex_bin, "codexless");
    assert_eq!(config.opencode_bin, "opencodeless");
}

#[test]
fn malformed_config_file_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("afd.toml"), "this is { not toml").unwrap();
    let config = Config::load_from(dir.path().to_path_buf()).unwrap();
    assert_eq!(config.codex_bin, "codex");
}

#[test]
fn workspace_root_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = dir.path().join("repo");
    std::fs::create_dir_all(&workspace).unwrap();
    std::fs::write(
        dir.path().join("afd.toml"),
        format!("workspace_root = \"{}\"\n", workspace.display()),
    )
    .unwrap();

    let config = Config::load_from(dir.path().to_path_buf()).unwrap();
    assert_eq!(config.workspace_root, workspace);
}

#[test]
fn load_creates_the_root() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("nested").join("state");
    Config::load_from(root.clone()).unwrap();
    assert!(root.is_dir());
}
