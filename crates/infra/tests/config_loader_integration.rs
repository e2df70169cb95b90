//! Integration tests for configuration loader
//!
//! Tests the end-to-end behavior of loading configuration from files and
//! feeding it to the client.

use std::io::Write;

use steadfast_domain::SteadfastError;
use steadfast_infra::{config, ApiError, ResilientClient};
use tempfile::NamedTempFile;

fn write_config(contents: &str, extension: &str) -> std::path::PathBuf {
    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    temp_file.write_all(contents.as_bytes()).expect("Failed to write to temp file");

    let path = temp_file.path().with_extension(extension);
    std::fs::copy(temp_file.path(), &path).expect("Failed to copy file");
    path
}

#[test]
fn test_load_config_from_toml_file() {
    let path = write_config(
        r#"
base_url = "https://api.example.com/v1"
failure_threshold = 3
reset_timeout_ms = 1000
half_open_retries = 1
max_concurrent = 2
cache_ttl_ms = 60000
max_retries = 2
base_retry_delay_ms = 250
request_timeout_ms = 10000
offline_queue_timeout_ms = 120000
offline_poll_interval_ms = 500
user_agent = "steadfast-it/1.0"
"#,
        "toml",
    );

    let result = config::load_from_file(Some(path.clone()));
    std::fs::remove_file(&path).ok();

    let config = result.expect("Failed to load config from TOML file");
    assert_eq!(config.base_url.as_deref(), Some("https://api.example.com/v1"));
    assert_eq!(config.failure_threshold, 3);
    assert_eq!(config.reset_timeout_ms, 1000);
    assert_eq!(config.half_open_retries, 1);
    assert_eq!(config.max_concurrent, 2);
    assert_eq!(config.cache_ttl_ms, 60000);
    assert_eq!(config.max_retries, 2);
    assert_eq!(config.base_retry_delay_ms, 250);
    assert_eq!(config.request_timeout_ms, 10000);
    assert_eq!(config.offline_queue_timeout_ms, 120000);
    assert_eq!(config.offline_poll_interval_ms, 500);
    assert_eq!(config.user_agent.as_deref(), Some("steadfast-it/1.0"));
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_config_with_minimal_fields() {
    let path = write_config("{}", "json");

    let result = config::load_from_file(Some(path.clone()));
    std::fs::remove_file(&path).ok();

    let config = result.expect("Empty document should yield defaults");
    assert_eq!(config, steadfast_domain::ClientConfig::default());
}

#[test]
fn test_loaded_config_builds_client() {
    let path = write_config(r#"{ "base_url": "http://localhost:9", "max_concurrent": 1 }"#, "json");

    let result = config::load_from_file(Some(path.clone()));
    std::fs::remove_file(&path).ok();

    let client = ResilientClient::new(result.unwrap()).expect("client should build");
    assert_eq!(client.config().max_concurrent, 1);
    assert_eq!(client.queue_metrics().active, 0);
}

#[test]
fn test_invalid_values_rejected_by_client() {
    let path = write_config(r#"{ "base_url": "ftp://example.com", "failure_threshold": 0 }"#, "json");

    let result = config::load_from_file(Some(path.clone()));
    std::fs::remove_file(&path).ok();

    let config = result.expect("Parsing does not validate");
    assert!(matches!(config.validate(), Err(SteadfastError::Config(_))));
    assert!(matches!(ResilientClient::new(config), Err(ApiError::Config(_))));
}

#[test]
fn test_load_config_from_nonexistent_file() {
    let result = config::load_from_file(Some("/nonexistent/path/steadfast.json".into()));
    assert!(matches!(result, Err(SteadfastError::Config(_))));
}

#[test]
fn test_load_config_with_invalid_format() {
    let path = write_config("base_url: https://example.com", "yaml");

    let result = config::load_from_file(Some(path.clone()));
    std::fs::remove_file(&path).ok();

    match result {
        Err(SteadfastError::Config(msg)) => assert!(msg.contains("Unsupported")),
        other => panic!("expected unsupported format error, got {:?}", other),
    }
}
