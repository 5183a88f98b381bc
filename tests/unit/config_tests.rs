//! Unit tests for runner configuration.

use std::io::Write;
use std::time::Duration;

use peerlink::config::RunnerConfig;
use peerlink::protocol::codec::MAX_FRAME_BYTES;
use peerlink::AppError;

#[test]
fn empty_toml_yields_defaults() {
    let config = RunnerConfig::from_toml_str("").expect("defaults are valid");

    assert_eq!(config, RunnerConfig::default());
    assert_eq!(config.max_frame_bytes, MAX_FRAME_BYTES);
    assert_eq!(config.shutdown_timeout(), Duration::from_secs(10));
    assert_eq!(config.ipc_name, "peerlink");
    assert_eq!(config.label(), "runner");
}

#[test]
fn full_toml_is_parsed() {
    let toml = r#"
name = "left"
max_frame_bytes = 4096
shutdown_timeout_seconds = 3
ipc_name = "peerlink-test"
"#;
    let config = RunnerConfig::from_toml_str(toml).expect("valid config");

    assert_eq!(config.label(), "left");
    assert_eq!(config.max_frame_bytes, 4096);
    assert_eq!(config.shutdown_timeout(), Duration::from_secs(3));
    assert_eq!(config.ipc_name, "peerlink-test");
}

#[test]
fn zero_frame_limit_is_rejected() {
    let err = RunnerConfig::from_toml_str("max_frame_bytes = 0").expect_err("invalid");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("max_frame_bytes")));
}

#[test]
fn blank_ipc_name_is_rejected() {
    let err = RunnerConfig::from_toml_str("ipc_name = \"  \"").expect_err("invalid");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("ipc_name")));
}

#[test]
fn malformed_toml_is_a_config_error() {
    let err = RunnerConfig::from_toml_str("max_frame_bytes = \"big\"").expect_err("wrong type");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn named_keeps_other_defaults() {
    let config = RunnerConfig::named("ctl");
    assert_eq!(config.label(), "ctl");
    assert_eq!(config.max_frame_bytes, MAX_FRAME_BYTES);
}

#[test]
fn load_from_path_reads_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "name = \"from-file\"\nshutdown_timeout_seconds = 1").expect("write config");

    let config = RunnerConfig::load_from_path(file.path()).expect("load config");
    assert_eq!(config.label(), "from-file");
    assert_eq!(config.shutdown_timeout_seconds, 1);
}

#[test]
fn load_from_missing_path_is_a_config_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = RunnerConfig::load_from_path(dir.path().join("missing.toml"))
        .expect_err("file does not exist");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("failed to read config")));
}
