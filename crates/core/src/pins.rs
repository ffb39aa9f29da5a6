// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pins: the task-level allowlist of paths, line windows, and symbols
//! that bounds executor context. The control plane is fail-closed on
//! missing or insufficient pins.

use serde::{Deserialize, Serialize};

/// Paths never eligible for pinning regardless of the allowlist.
pub const DEFAULT_FORBIDDEN_PATHS: &[&str] = &[".git", "node_modules", "dist", "build", "coverage"];

/// An inclusive `[start, end]` line range within one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineWindow {
    pub path: String,
    pub start: u32,
    pub end: u32,
}

impl LineWindow {
    /// Clamp the window against a file of `len` lines.
    ///
    /// Returns the inclusive 1-based `(start, end)` actually readable, or
    /// `None` when the window falls entirely past the end of the file.
    pub fn clamp(&self, len: u32) -> Option<(u32, u32)> {
        if len == 0 {
            return None;
        }
        let start = self.start.max(1);
        let end = self.end.min(len);
        if start > end {
            return None;
        }
        Some((start, end))
    }
}

/// Task-level context allowlist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pins {
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub line_windows: Vec<LineWindow>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_loc: Option<u32>,
    #[serde(default)]
    pub forbidden_paths: Vec<String>,
}

impl Pins {
    /// Default pins derived from a task's file list.
    pub fn from_files(files: &[String]) -> Self {
        Self {
            allowed_paths: files.to_vec(),
            line_windows: Vec::new(),
            symbols: Vec::new(),
            max_files: Some(files.len() as u32),
            max_loc: None,
            forbidden_paths: DEFAULT_FORBIDDEN_PATHS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Fill in the server-managed defaults on caller-provided pins:
    /// `max_files` from the allowlist length when unset, and the fixed
    /// forbidden list when empty.
    pub fn with_defaults(mut self, max_files_cap: usize) -> Self {
        if self.max_files.is_none() {
            self.max_files = Some(self.allowed_paths.len().min(max_files_cap) as u32);
        }
        if self.forbidden_paths.is_empty() {
            self.forbidden_paths = DEFAULT_FORBIDDEN_PATHS
                .iter()
                .map(|s| s.to_string())
                .collect();
        }
        self
    }

    /// Merge a pins template with a per-task instance.
    ///
    /// Paths and symbols take set union; line windows concatenate with
    /// dedup; `max_files`/`max_loc` prefer the instance when present.
    pub fn merge(template: &Pins, instance: &Pins) -> Pins {
        let mut allowed_paths = template.allowed_paths.clone();
        for p in &instance.allowed_paths {
            if !allowed_paths.contains(p) {
                allowed_paths.push(p.clone());
            }
        }

        let mut symbols = template.symbols.clone();
        for s in &instance.symbols {
            if !symbols.contains(s) {
                symbols.push(s.clone());
            }
        }

        let mut line_windows = template.line_windows.clone();
        for w in &instance.line_windows {
            if !line_windows.contains(w) {
                line_windows.push(w.clone());
            }
        }

        let mut forbidden_paths = template.forbidden_paths.clone();
        for p in &instance.forbidden_paths {
            if !forbidden_paths.contains(p) {
                forbidden_paths.push(p.clone());
            }
        }

        Pins {
            allowed_paths,
            line_windows,
            symbols,
            max_files: instance.max_files.or(template.max_files),
            max_loc: instance.max_loc.or(template.max_loc),
            forbidden_paths,
        }
    }

    /// True when every allowed path here is covered by some allowed path
    /// of `parent` (prefix match on path components).
    pub fn is_subset_of(&self, parent: &Pins) -> bool {
        self.allowed_paths
            .iter()
            .all(|p| parent.allowed_paths.iter().any(|pp| path_covers(pp, p)))
    }

    /// Whether this allowlist admits `path`: must match some allowed
    /// prefix and no forbidden prefix.
    pub fn allows(&self, path: &str) -> bool {
        let forbidden = self
            .forbidden_paths
            .iter()
            .map(String::as_str)
            .chain(DEFAULT_FORBIDDEN_PATHS.iter().copied());
        for f in forbidden {
            if path_covers(f, path) {
                return false;
            }
        }
        self.allowed_paths.iter().any(|p| path_covers(p, path))
    }

    pub fn is_empty(&self) -> bool {
        self.allowed_paths.is_empty() && self.line_windows.is_empty()
    }
}

/// True when `prefix` covers `path` on whole path components:
/// `src` covers `src/lib.rs` but not `src-old/lib.rs`.
pub fn path_covers(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return false;
    }
    path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
#[path = "pins_tests.rs"]
mod tests;
