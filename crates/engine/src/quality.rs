// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Quality gate: rolling failure rates per area.

use af_core::Settings;
use std::collections::{HashMap, VecDeque};

/// Rolling per-area samples (true = failed).
#[derive(Debug, Default)]
pub struct QualityTracker {
    samples: HashMap<String, VecDeque<bool>>,
}

impl QualityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished job for an area.
    pub fn record(&mut self, area: &str, failed: bool, window: usize) {
        let samples = self.samples.entry(area.to_string()).or_default();
        samples.push_back(failed);
        while samples.len() > window.max(1) {
            samples.pop_front();
        }
    }

    /// Failure rate for an area, if any samples exist.
    pub fn failure_rate(&self, area: &str) -> Option<(f64, usize)> {
        let samples = self.samples.get(area)?;
        if samples.is_empty() {
            return None;
        }
        let failed = samples.iter().filter(|s| **s).count();
        Some((failed as f64 / samples.len() as f64, samples.len()))
    }

    /// Whether dispatch into this area is blocked under current settings.
    pub fn should_block(&self, area: &str, settings: &Settings) -> bool {
        if !settings.get_bool("QUALITY_GATE_ENABLED") {
            return false;
        }
        let min_samples = settings.get_u64("QUALITY_GATE_MIN_SAMPLES") as usize;
        let threshold = settings.get_f64("QUALITY_GATE_FAIL_RATE");
        match self.failure_rate(area) {
            Some((rate, samples)) => samples >= min_samples && rate >= threshold,
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "quality_tests.rs"]
mod tests;
