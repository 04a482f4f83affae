//! Tests for settings reload

use crate::Result;
use crate::config::Settings;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_reload_settings_updates_values() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.json");

    fs::write(&config_path, r#"{"url": "http://first:9090"}"#).unwrap();
    let first = Settings::load(&config_path)?;
    assert_eq!(first.bridge.url(), Some("http://first:9090"));

    fs::write(
        &config_path,
        r#"{"url": "http://second:9090", "token": "abc"}"#,
    )
    .unwrap();
    let second = Settings::load(&config_path)?;
    assert_eq!(second.bridge.url(), Some("http://second:9090"));
    assert_eq!(second.bridge.token(), Some("abc"));

    Ok(())
}

#[test]
fn test_reload_settings_preserves_defaults() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.json");

    fs::write(&config_path, r#"{"transport": {"ackTimeoutMs": 100}}"#).unwrap();
    let settings = Settings::load(&config_path)?;

    assert_eq!(settings.transport.ack_timeout_ms, 100);
    assert_eq!(settings.transport.reconnection_delay_ms, 1000);
    assert!(settings.bridge.url().is_none());

    Ok(())
}

#[test]
fn test_reload_after_file_removed_gives_defaults() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.json");

    fs::write(&config_path, r#"{"url": "http://x:9090"}"#).unwrap();
    assert!(Settings::load(&config_path)?.bridge.url().is_some());

    fs::remove_file(&config_path).unwrap();
    assert_eq!(Settings::load(&config_path)?, Settings::default());

    Ok(())
}
