// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn defaults_come_from_registry() {
    let settings = Settings::new();
    assert_eq!(settings.get_u64("GATEWAY_PORT"), 4100);
    assert_eq!(settings.get_u64("EXEC_CONCURRENCY_CODEX"), 2);
    assert!(settings.get_bool("CI_GATE_ENABLED"));
    assert!(!settings.get_bool("CI_GATE_STRICT"));
    assert_eq!(settings.get_str("MODEL_ROUTING_MODE"), "rr");
}

#[test]
fn set_overrides_default() {
    let mut settings = Settings::new();
    settings.set("GATEWAY_PORT", "9000");
    assert_eq!(settings.get_u64("GATEWAY_PORT"), 9000);
    settings.set("CI_GATE_ENABLED", "false");
    assert!(!settings.get_bool("CI_GATE_ENABLED"));
}

#[test]
fn unknown_keys_are_preserved() {
    let mut settings = Settings::new();
    settings.set("SOME_FUTURE_KNOB", "7");
    assert_eq!(settings.as_map().get("SOME_FUTURE_KNOB").unwrap(), "7");
    assert!(Settings::definition("SOME_FUTURE_KNOB").is_none());
}

#[test]
fn unparseable_number_falls_back_to_default() {
    let mut settings = Settings::new();
    settings.set("EXEC_CONCURRENCY_CODEX", "lots");
    assert_eq!(settings.get_u64("EXEC_CONCURRENCY_CODEX"), 2);
}

#[test]
fn list_parsing_trims_and_drops_empties() {
    let mut settings = Settings::new();
    settings.set("MODEL_POOL_PAID", "gpt-5-codex, opencode/kimi-k2,, ");
    assert_eq!(
        settings.get_list("MODEL_POOL_PAID"),
        vec!["gpt-5-codex", "opencode/kimi-k2"]
    );
}

#[test]
fn quarantine_allowlist_default() {
    let settings = Settings::new();
    let classes = settings.get_list("QUARANTINE_ALLOWED_CLASSES");
    assert_eq!(classes, vec!["factory_manager", "ci_fixup_v1", "pins_fixup_v1"]);
}

#[yare::parameterized(
    one   = { "1", true },
    yes   = { "yes", true },
    on    = { "on", true },
    zero  = { "0", false },
    nope  = { "banana", false },
)]
fn bool_parsing(value: &str, expected: bool) {
    let mut settings = Settings::new();
    settings.set("QUALITY_GATE_ENABLED", value);
    assert_eq!(settings.get_bool("QUALITY_GATE_ENABLED"), expected);
}

#[test]
fn float_setting() {
    let settings = Settings::new();
    assert!((settings.get_f64("QUALITY_GATE_FAIL_RATE") - 0.6).abs() < f64::EPSILON);
}

#[test]
fn serde_roundtrip_preserves_order_and_unknowns() {
    let mut settings = Settings::new();
    settings.set("GATEWAY_PORT", "9000");
    settings.set("MYSTERY", "42");
    let json = serde_json::to_string(&settings).unwrap();
    let back: Settings = serde_json::from_str(&json).unwrap();
    assert_eq!(back.get_u64("GATEWAY_PORT"), 9000);
    assert_eq!(back.as_map().get("MYSTERY").unwrap(), "42");
}
