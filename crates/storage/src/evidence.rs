// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Anti-forgery evidence for CI gate runs.
//!
//! Gate stdout/stderr are persisted as log files and their SHA-256
//! digests stored alongside the result. A later re-hash that disagrees
//! with the stored digest invalidates the evidence.

use rand::Rng;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use crate::StoreError;

/// Persisted evidence for one gate run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceFiles {
    pub stdout_path: PathBuf,
    pub stdout_sha256: String,
    pub stderr_path: PathBuf,
    pub stderr_sha256: String,
}

/// Hex SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Write `ci_<epoch>_<nonce>.{stdout,stderr}.log` under `dir` and return
/// paths plus digests.
pub fn write_ci_evidence(
    dir: &Path,
    start_epoch_ms: u64,
    stdout: &str,
    stderr: &str,
) -> Result<EvidenceFiles, StoreError> {
    fs::create_dir_all(dir)?;
    let nonce: u32 = rand::rng().random();
    let stem = format!("ci_{start_epoch_ms}_{nonce:08x}");

    let stdout_path = dir.join(format!("{stem}.stdout.log"));
    let stderr_path = dir.join(format!("{stem}.stderr.log"));
    fs::write(&stdout_path, stdout)?;
    fs::write(&stderr_path, stderr)?;

    Ok(EvidenceFiles {
        stdout_sha256: sha256_hex(stdout.as_bytes()),
        stderr_sha256: sha256_hex(stderr.as_bytes()),
        stdout_path,
        stderr_path,
    })
}

/// Re-hash an evidence file and compare against the stored digest.
/// Unreadable files never verify.
pub fn verify_evidence(path: &Path, expected_sha256: &str) -> bool {
    match fs::read(path) {
        Ok(bytes) => sha256_hex(&bytes) == expected_sha256,
        Err(_) => false,
    }
}

#[cfg(test)]
#[path = "evidence_tests.rs"]
mod tests;
