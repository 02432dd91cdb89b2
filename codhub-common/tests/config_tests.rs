//! Configuration loading and root folder resolution tests
//!
//! Tests that touch CODHUB_ROOT_FOLDER are marked #[serial] so they never
//! race on the process environment.

use codhub_common::config::{
    database_path, load_toml_config, load_toml_config_or_default, resolve_root_folder,
    write_toml_config, TomlConfig, ROOT_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
#[serial]
fn test_cli_argument_has_highest_priority() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/codhub-from-env");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/codhub-from-toml")),
        ..TomlConfig::default()
    };

    let resolved = resolve_root_folder(Some(Path::new("/tmp/codhub-from-cli")), &toml);
    assert_eq!(resolved, PathBuf::from("/tmp/codhub-from-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_env_var_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/codhub-from-env");
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/codhub-from-toml")),
        ..TomlConfig::default()
    };

    let resolved = resolve_root_folder(None, &toml);
    assert_eq!(resolved, PathBuf::from("/tmp/codhub-from-env"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_toml_used_when_no_cli_or_env() {
    env::remove_var(ROOT_FOLDER_ENV);
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/codhub-from-toml")),
        ..TomlConfig::default()
    };

    assert_eq!(
        resolve_root_folder(None, &toml),
        PathBuf::from("/tmp/codhub-from-toml")
    );
}

#[test]
#[serial]
fn test_default_root_folder_is_not_empty() {
    env::remove_var(ROOT_FOLDER_ENV);
    let resolved = resolve_root_folder(None, &TomlConfig::default());
    assert!(!resolved.as_os_str().is_empty());
    assert!(database_path(&resolved).ends_with("codhub.db"));
}

#[test]
fn test_missing_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    let config = load_toml_config_or_default(Some(&missing));
    assert_eq!(config, TomlConfig::default());
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.http.bind, "127.0.0.1:5740");
}

#[test]
fn test_invalid_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "this is = = not toml").unwrap();

    assert!(load_toml_config(&path).is_err());
    assert_eq!(load_toml_config_or_default(Some(&path)), TomlConfig::default());
}

#[test]
fn test_partial_file_fills_missing_sections() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("partial.toml");
    std::fs::write(
        &path,
        r#"
        [sync]
        batch_size = 25
        max_run_seconds = 60
        "#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.sync.batch_size, Some(25));
    assert_eq!(config.sync.max_run_seconds, Some(60));
    assert_eq!(config.sync.max_iterations, None);
    assert_eq!(config.logging.level, "info");
    assert!(config.root_folder.is_none());
}

#[test]
fn test_write_then_load_preserves_values() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("codhub-reconcile.toml");

    let mut config = TomlConfig::default();
    config.root_folder = Some(PathBuf::from("/srv/codhub"));
    config.logging.level = "debug".to_string();
    config.sync.stale_lock_minutes = Some(10);

    write_toml_config(&config, &path).unwrap();
    assert_eq!(load_toml_config(&path).unwrap(), config);
}
