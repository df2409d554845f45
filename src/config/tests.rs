//! Configuration tests
//!
//! The round-trip test is a compile-time guard: when a field is added to
//! `Config`, it fails until `to_toml()` and `FileConfig` both know about it.

use super::*;

// ─────────────────────────────────────────────────────────────────────────────
// Round-trip tests
// ─────────────────────────────────────────────────────────────────────────────

/// Verify that the serialized config template parses back as a FileConfig.
#[test]
fn test_config_roundtrip_default() {
    let config = Config::default();
    let toml_str = config.to_toml();

    let parsed: Result<FileConfig, _> = toml::from_str(&toml_str);
    assert!(
        parsed.is_ok(),
        "Default config should round-trip.\nTOML:\n{}\nError: {:?}",
        toml_str,
        parsed.err()
    );
}

/// Every value written by to_toml() survives the round trip unchanged.
#[test]
fn test_config_roundtrip_preserves_values() {
    let mut config = Config::default();
    config.bind_addr = "127.0.0.1:9999".parse().unwrap();
    config.db_path = PathBuf::from("/tmp/shepherd-test.db");
    config.logging.level = "debug".to_string();
    config.checker.interval_secs = 3;
    config.aggregator.flush_secs = 15;
    config.rollup.lookback_secs = 1200;

    let file: FileConfig = toml::from_str(&config.to_toml()).unwrap();
    let reloaded = Config::from_file_config(file);

    assert_eq!(reloaded.bind_addr, config.bind_addr);
    assert_eq!(reloaded.db_path, config.db_path);
    assert_eq!(reloaded.logging.level, "debug");
    assert_eq!(reloaded.checker.interval_secs, 3);
    assert_eq!(reloaded.aggregator.flush_secs, 15);
    assert_eq!(reloaded.rollup.lookback_secs, 1200);
}

// ─────────────────────────────────────────────────────────────────────────────
// Merging behavior
// ─────────────────────────────────────────────────────────────────────────────

/// Absent sections and fields fall back to defaults.
#[test]
fn test_partial_file_config_keeps_defaults() {
    let file: FileConfig = toml::from_str(
        r#"
        bind_addr = "127.0.0.1:8600"

        [aggregator]
        flush_secs = 30
        "#,
    )
    .unwrap();

    let config = Config::from_file_config(file);
    assert_eq!(config.bind_addr, "127.0.0.1:8600".parse().unwrap());
    assert_eq!(config.aggregator.flush_secs, 30);
    // untouched fields keep their defaults
    assert_eq!(config.aggregator.channel_capacity, 10_000);
    assert_eq!(config.checker.interval_secs, 10);
    assert_eq!(config.rollup.cadence_120_secs, 120);
    assert_eq!(config.rollup.cadence_300_secs, 300);
    assert_eq!(config.db_path, PathBuf::from("./data/metrics.db"));
}

/// An unparseable bind address in the file falls back to the default rather
/// than poisoning the whole config.
#[test]
fn test_invalid_bind_addr_falls_back() {
    let file: FileConfig = toml::from_str(r#"bind_addr = "not-an-addr""#).unwrap();
    let config = Config::from_file_config(file);
    assert_eq!(config.bind_addr, Config::default().bind_addr);
}

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_defaults_match_the_wire_contract() {
    let config = Config::default();
    // the orchestrator's documented default bind
    assert_eq!(config.bind_addr.port(), 8500);
    assert_eq!(config.checker.interval_secs, 10);
    assert_eq!(config.aggregator.flush_secs, 60);
    assert_eq!(config.aggregator.channel_capacity, 10_000);
    assert_eq!(config.rollup.lookback_secs, 600);
}

#[test]
fn test_log_rotation_parsing() {
    assert_eq!(LogRotation::from_str("hourly"), LogRotation::Hourly);
    assert_eq!(LogRotation::from_str("DAILY"), LogRotation::Daily);
    assert_eq!(LogRotation::from_str("never"), LogRotation::Never);
    // unknown values default to daily
    assert_eq!(LogRotation::from_str("weekly"), LogRotation::Daily);
}
