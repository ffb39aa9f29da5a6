// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Text scanning helpers for executor output: balanced JSON array
//! extraction (planner splits) and patch-block extraction.

/// Extract the first balanced top-level JSON array from `text`.
///
/// Walks the stream tracking bracket depth while respecting string
/// literals and escapes, so brackets inside strings and trailing prose do
/// not confuse it. Candidates that balance but fail to parse as JSON are
/// skipped and the scan continues.
pub fn first_balanced_array(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut search_from = 0;

    while let Some(rel) = text[search_from..].find('[') {
        let start = search_from + rel;
        if let Some(end) = balanced_end(bytes, start) {
            let candidate = &text[start..=end];
            if serde_json::from_str::<serde_json::Value>(candidate)
                .map(|v| v.is_array())
                .unwrap_or(false)
            {
                return Some(candidate);
            }
            // Balanced but not valid JSON; resume after this opener.
        }
        search_from = start + 1;
    }
    None
}

/// Find the index of the `]` closing the array opened at `start`.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

const PATCH_BEGIN: &str = "*** Begin Patch";
const PATCH_END: &str = "*** End Patch";

/// Extract the body of the first `*** Begin Patch` … `*** End Patch`
/// block, exclusive of the markers. Returns `None` when no complete
/// block is present.
pub fn extract_patch_block(text: &str) -> Option<&str> {
    let begin = text.find(PATCH_BEGIN)?;
    let body_start = begin + PATCH_BEGIN.len();
    let end_rel = text[body_start..].find(PATCH_END)?;
    Some(text[body_start..body_start + end_rel].trim_matches('\n'))
}

#[cfg(test)]
#[path = "scan_tests.rs"]
mod tests;
