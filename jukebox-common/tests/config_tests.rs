//! Configuration file loading tests
//!
//! Tests that touch XDG_CONFIG_HOME are marked with #[serial] so they do not race
//! on the process environment.

use jukebox_common::config::TomlConfig;
use serial_test::serial;
use std::env;
use std::fs;
use std::io::Write;

#[test]
fn test_load_explicit_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[http]
address = "0.0.0.0"
port = 9090

[player]
bus_name = "org.mpris.MediaPlayer2.mpv"

[logging]
level = "debug"
"#
    )
    .unwrap();

    let config = TomlConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.http.address, "0.0.0.0");
    assert_eq!(config.http.port, 9090);
    assert_eq!(config.player.bus_name, "org.mpris.MediaPlayer2.mpv");
    assert_eq!(config.logging.level, "debug");
    // Untouched sections keep defaults
    assert_eq!(config.fanout.subscriber_capacity, 32);
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let result = TomlConfig::load(Some(&missing));
    assert!(result.is_err());
}

#[test]
fn test_malformed_file_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[http\nport = ").unwrap();

    assert!(TomlConfig::load(Some(file.path())).is_err());
}

#[cfg(target_os = "linux")]
#[test]
#[serial]
fn test_user_config_dir_is_searched() {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("jukebox");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("config.toml"), "[http]\nport = 7070\n").unwrap();

    let previous = env::var("XDG_CONFIG_HOME").ok();
    env::set_var("XDG_CONFIG_HOME", dir.path());

    let config = TomlConfig::load(None).unwrap();

    match previous {
        Some(value) => env::set_var("XDG_CONFIG_HOME", value),
        None => env::remove_var("XDG_CONFIG_HOME"),
    }

    assert_eq!(config.http.port, 7070);
}
