//! Configuration loading and root folder resolution
//!
//! Tests touching SCOUT_ROOT_FOLDER are marked #[serial] so that they never
//! race on the process environment.

use scout_common::config::{
    load_toml_config, read_toml_config, write_toml_config, RootFolderInitializer,
    RootFolderResolver, TomlConfig, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
#[serial]
fn test_cli_argument_wins() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/from-env");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/from-toml")),
        ..Default::default()
    };

    let resolved = RootFolderResolver::new("test")
        .with_cli_arg(Some(PathBuf::from("/tmp/from-cli")))
        .with_toml_config(&config)
        .resolve();

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(resolved, PathBuf::from("/tmp/from-cli"));
}

#[test]
#[serial]
fn test_env_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/from-env");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/from-toml")),
        ..Default::default()
    };

    let resolved = RootFolderResolver::new("test")
        .with_toml_config(&config)
        .resolve();

    env::remove_var(ROOT_FOLDER_ENV);
    assert_eq!(resolved, PathBuf::from("/tmp/from-env"));
}

#[test]
#[serial]
fn test_toml_then_default() {
    env::remove_var(ROOT_FOLDER_ENV);
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/from-toml")),
        ..Default::default()
    };

    let from_toml = RootFolderResolver::new("test")
        .with_toml_config(&config)
        .resolve();
    assert_eq!(from_toml, PathBuf::from("/tmp/from-toml"));

    let fallback = RootFolderResolver::new("test").resolve();
    assert!(!fallback.as_os_str().is_empty());
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let config = load_toml_config(Some(&dir.path().join("absent.toml")));

    assert!(config.openai_api_key.is_none());
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.server.port, 5740);
}

#[test]
fn test_malformed_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "server = [not valid").unwrap();

    assert!(read_toml_config(&path).is_err());
    let config = load_toml_config(Some(&path));
    assert_eq!(config.server.port, 5740);
}

#[test]
fn test_write_then_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = TomlConfig::default();
    config.scraper_service_url = Some("http://scraper:8000".to_string());
    config.session_retention_minutes = Some(15);
    config.collection.max_retries = Some(2);
    write_toml_config(&config, &path).unwrap();

    let loaded = load_toml_config(Some(&path));
    assert_eq!(loaded.scraper_service_url.as_deref(), Some("http://scraper:8000"));
    assert_eq!(loaded.session_retention_minutes, Some(15));
    assert_eq!(loaded.collection, config.collection);
    assert!(!path.with_extension("toml.tmp").exists());
}

#[test]
fn test_initializer_creates_root_folder() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("a").join("b");
    let init = RootFolderInitializer::new(root.clone());

    init.ensure_directory_exists().unwrap();
    assert!(root.is_dir());
    assert_eq!(init.database_path(), root.join("scout.db"));
    // Idempotent
    init.ensure_directory_exists().unwrap();
}
