// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic JSON snapshot store.
//!
//! Writes go to a temp file, the previous file rotates to `.bak`, and the
//! temp renames into place. Readers therefore see either the previous or
//! the next complete version, never a partial write; a corrupt main file
//! falls back to `.bak` on read. An `O_CREAT|O_EXCL` lock file serializes
//! writers across processes.

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

/// Poll interval while waiting on the lock file.
const LOCK_POLL: Duration = Duration::from_millis(50);

/// Default lock acquisition timeout.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(4);

/// Errors from the snapshot store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("lock_timeout: {path} held for more than {timeout_ms}ms")]
    LockTimeout { path: PathBuf, timeout_ms: u64 },
}

fn bak_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Read a JSON snapshot, falling back to `.bak` on parse failure and to
/// `fallback` when neither file yields a value.
pub fn read_json<T: DeserializeOwned>(path: &Path, fallback: T) -> T {
    match try_parse(path) {
        Some(value) => value,
        None => {
            let bak = bak_path(path);
            match try_parse(&bak) {
                Some(value) => {
                    warn!(
                        path = %path.display(),
                        "snapshot unreadable, recovered from .bak",
                    );
                    value
                }
                None => fallback,
            }
        }
    }
}

fn try_parse<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = fs::read(path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt snapshot");
            None
        }
    }
}

/// Write a JSON snapshot atomically: temp file, rotate `.bak`, rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let nonce: u32 = rand::rng().random();
    let tmp_path = PathBuf::from({
        let mut name = path.as_os_str().to_owned();
        name.push(format!(".tmp.{}.{:08x}", std::process::id(), nonce));
        name
    });

    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&serde_json::to_vec_pretty(value)?)?;
        file.sync_all()?;
    }

    let bak = bak_path(path);
    if path.exists() {
        fs::rename(path, &bak)?;
    }
    fs::rename(&tmp_path, path)?;
    let _ = fs::remove_file(&bak);

    Ok(())
}

/// RAII guard for the inter-process lock file.
struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Run `f` while holding the `<file>.lock` exclusion file.
///
/// The lock is acquired with `O_CREAT|O_EXCL`, polled every 50ms up to
/// `timeout`, and removed when the guard drops.
pub fn with_file_lock<R>(
    path: &Path,
    timeout: Duration,
    f: impl FnOnce() -> R,
) -> Result<R, StoreError> {
    let lock = lock_path(path);
    if let Some(parent) = lock.parent() {
        fs::create_dir_all(parent)?;
    }

    let deadline = Instant::now() + timeout;
    let _guard = loop {
        match OpenOptions::new().write(true).create_new(true).open(&lock) {
            Ok(mut file) => {
                let _ = write!(file, "{}", std::process::id());
                break LockGuard { path: lock.clone() };
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if Instant::now() >= deadline {
                    return Err(StoreError::LockTimeout {
                        path: lock,
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
                std::thread::sleep(LOCK_POLL);
            }
            Err(e) => return Err(e.into()),
        }
    };

    Ok(f())
}

/// Read-modify-write a snapshot under the file lock.
pub fn update_json_locked<T, F>(path: &Path, fallback: T, f: F) -> Result<T, StoreError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce(&mut T),
{
    with_file_lock(path, LOCK_TIMEOUT, || {
        let mut value = read_json(path, fallback);
        f(&mut value);
        write_json_atomic(path, &value).map(|()| value)
    })?
}

#[cfg(test)]
#[path = "atomic_tests.rs"]
mod tests;
