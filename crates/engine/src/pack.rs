// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Context-pack builder: turns pins or a file list into a size-bounded,
//! allowlist-checked markdown artifact. Path resolution is fail-closed:
//! anything escaping the allowed roots is silently dropped.

use af_core::{IdGen, PackId, Pins};
use af_storage::StateLayout;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PackError;

/// Default pack budget.
pub const DEFAULT_PACK_BYTES: usize = 220 * 1024;

/// Absolute cap regardless of the requested budget.
pub const HARD_PACK_BYTES: usize = 400 * 1024;

/// Per-file cap in file mode.
const PER_FILE_BYTES: usize = 60 * 1024;

/// Pins JSON header cap.
const PINS_HEADER_BYTES: usize = 4 * 1024;

/// Metadata of a built pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackMeta {
    pub id: PackId,
    pub files: u32,
    pub windows: u32,
    pub bytes: u64,
    pub path: PathBuf,
}

pub struct ContextPackBuilder {
    layout: StateLayout,
    allowed_roots: Vec<PathBuf>,
}

impl ContextPackBuilder {
    pub fn new(layout: StateLayout, allowed_roots: Vec<PathBuf>) -> Self {
        Self {
            layout,
            allowed_roots,
        }
    }

    /// Resolve a repo-relative path against the allowed roots.
    ///
    /// Returns the first root under which the path exists after
    /// canonicalization, or `None` (dropped) for escapes and misses.
    fn resolve(&self, rel: &str) -> Option<PathBuf> {
        if rel.is_empty() || Path::new(rel).is_absolute() {
            return None;
        }
        for root in &self.allowed_roots {
            let Ok(root_canon) = root.canonicalize() else {
                continue;
            };
            let candidate = root.join(rel);
            let Ok(canon) = candidate.canonicalize() else {
                continue;
            };
            if canon.starts_with(&root_canon) && canon.is_file() {
                return Some(canon);
            }
        }
        None
    }

    /// Build a pack from pins: pins JSON header, then one fenced block
    /// per clamped line window.
    pub fn create_from_pins(
        &self,
        pins: &Pins,
        max_bytes: usize,
        idgen: &impl IdGen,
    ) -> Result<PackMeta, PackError> {
        let budget = max_bytes.min(HARD_PACK_BYTES);
        let mut out = String::new();

        let mut header = serde_json::to_string_pretty(pins).unwrap_or_default();
        header.truncate(PINS_HEADER_BYTES);
        out.push_str("## pins\n```json\n");
        out.push_str(&header);
        out.push_str("\n```\n\n");

        let mut files = std::collections::BTreeSet::new();
        let mut windows = 0u32;

        for window in &pins.line_windows {
            if !pins.allows(&window.path) {
                continue;
            }
            let Some(path) = self.resolve(&window.path) else {
                continue;
            };
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            let lines: Vec<&str> = content.lines().collect();
            let Some((start, end)) = window.clamp(lines.len() as u32) else {
                continue;
            };

            let slice = lines[(start as usize - 1)..(end as usize)].join("\n");
            let block = format!(
                "## {} (lines {}-{})\n```\n{}\n```\n\n",
                window.path, start, end, slice
            );
            if out.len() + block.len() > budget {
                break;
            }
            out.push_str(&block);
            files.insert(window.path.clone());
            windows += 1;
        }

        if windows == 0 {
            return Err(PackError::EmptyPack);
        }
        self.write(out, files.len() as u32, windows, idgen)
    }

    /// Build a pack from whole files, capped per file.
    pub fn create_from_files(
        &self,
        rel_paths: &[String],
        max_bytes: usize,
        idgen: &impl IdGen,
    ) -> Result<PackMeta, PackError> {
        let budget = max_bytes.min(HARD_PACK_BYTES);
        let mut out = String::new();
        let mut included = 0u32;

        for rel in rel_paths {
            let Some(path) = self.resolve(rel) else {
                continue;
            };
            let Ok(mut content) = fs::read_to_string(&path) else {
                continue;
            };
            if content.len() > PER_FILE_BYTES {
                content.truncate(PER_FILE_BYTES);
            }
            let block = format!("## {}\n```\n{}\n```\n\n", rel, content);
            if out.len() + block.len() > budget {
                break;
            }
            out.push_str(&block);
            included += 1;
        }

        if included == 0 {
            return Err(PackError::EmptyPack);
        }
        self.write(out, included, 0, idgen)
    }

    fn write(
        &self,
        content: String,
        files: u32,
        windows: u32,
        idgen: &impl IdGen,
    ) -> Result<PackMeta, PackError> {
        let id = PackId::new(idgen.next());
        let path = self.layout.contextpack_file(id.as_str());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = content.len() as u64;
        fs::write(&path, content)?;
        Ok(PackMeta {
            id,
            files,
            windows,
            bytes,
            path,
        })
    }

    /// Fetch a pack's text by id. Packs are immutable once written.
    pub fn read(&self, id: &PackId) -> Option<String> {
        fs::read_to_string(self.layout.contextpack_file(id.as_str())).ok()
    }
}

#[cfg(test)]
#[path = "pack_tests.rs"]
mod tests;
