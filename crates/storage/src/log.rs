// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only JSONL event streams.
//!
//! Each line is one JSON object. Event lines carry a `t` (ISO-8601) and
//! `level` envelope around the tagged event payload. Appends are
//! synchronous: once `append` returns, the line is on disk, so observers
//! that fire after an append can never see a missing line. Readers skip
//! corrupt lines rather than failing.

use af_core::{Event, EventLevel};
use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use crate::StoreError;

/// Envelope written around each event line.
#[derive(Serialize)]
struct Envelope<'a> {
    t: String,
    level: EventLevel,
    #[serde(flatten)]
    event: &'a Event,
}

/// An event line read back from disk.
///
/// Unrecognized `type` tags land in `Unknown` verbatim instead of
/// failing the read.
#[derive(Debug, Clone)]
pub enum LoggedEvent {
    Known {
        t: String,
        level: EventLevel,
        event: Event,
    },
    Unknown(serde_json::Value),
}

impl LoggedEvent {
    pub fn decode(value: serde_json::Value) -> Self {
        let t = value
            .get("t")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let level = value
            .get("level")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(EventLevel::Info);
        match serde_json::from_value::<Event>(value.clone()) {
            Ok(event) => LoggedEvent::Known { t, level, event },
            Err(_) => LoggedEvent::Unknown(value),
        }
    }
}

/// Append-only writer for one JSONL file.
pub struct JsonlWriter {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlWriter {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_owned(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize one value as a line and flush it to disk.
    pub fn append<T: Serialize>(&self, value: &T) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

/// The audit event stream: a [`JsonlWriter`] that stamps the envelope.
pub struct EventLog {
    writer: JsonlWriter,
}

impl EventLog {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            writer: JsonlWriter::open(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.writer.path()
    }

    /// Append one event with its default level.
    pub fn append(&self, event: &Event) -> Result<(), StoreError> {
        self.append_with_level(event, event.level())
    }

    pub fn append_with_level(&self, event: &Event, level: EventLevel) -> Result<(), StoreError> {
        self.writer.append(&Envelope {
            t: Utc::now().to_rfc3339(),
            level,
            event,
        })
    }
}

/// Read every parseable line of a JSONL file. Corrupt lines are skipped
/// with a warning; a missing file reads as empty.
pub fn read_jsonl(path: &Path) -> Vec<serde_json::Value> {
    let Ok(file) = File::open(path) else {
        return Vec::new();
    };
    let mut values = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let Ok(line) = line else { break };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str(trimmed) {
            Ok(value) => values.push(value),
            Err(e) => {
                warn!(path = %path.display(), line = idx + 1, error = %e, "skipping corrupt log line");
            }
        }
    }
    values
}

/// Last `n` parseable lines of a JSONL file.
pub fn tail_jsonl(path: &Path, n: usize) -> Vec<serde_json::Value> {
    let mut values = read_jsonl(path);
    if values.len() > n {
        values.drain(..values.len() - n);
    }
    values
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
