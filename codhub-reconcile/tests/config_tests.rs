//! Sync limit resolution tests
//!
//! Environment variables are process-global, so every test that touches
//! them runs serially.

mod helpers;

use helpers::create_test_db;
use serial_test::serial;

use codhub_common::config::TomlConfig;
use codhub_reconcile::config::{env_var_name, setting_key, SyncLimits};
use codhub_reconcile::db::settings::{delete_setting, set_setting};

fn clear_env() {
    for name in [
        "batch_size",
        "max_iterations",
        "max_records",
        "max_run_seconds",
        "max_lock_wait_ms",
        "stale_lock_minutes",
        "progress_grace_seconds",
    ] {
        std::env::remove_var(env_var_name(name));
    }
}

fn toml_with_batch_size(batch_size: u32) -> TomlConfig {
    toml::from_str(&format!("[sync]\nbatch_size = {}\n", batch_size)).unwrap()
}

#[tokio::test]
#[serial]
async fn test_seeded_database_values_resolve_to_defaults() {
    clear_env();
    let (_dir, pool) = create_test_db().await.unwrap();

    let limits = SyncLimits::resolve(&pool, &TomlConfig::default()).await.unwrap();
    assert_eq!(limits, SyncLimits::default());
}

#[tokio::test]
#[serial]
async fn test_database_beats_env_and_toml() {
    clear_env();
    let (_dir, pool) = create_test_db().await.unwrap();
    set_setting(&pool, &setting_key("batch_size"), 250).await.unwrap();
    std::env::set_var(env_var_name("batch_size"), "40");

    let limits = SyncLimits::resolve(&pool, &toml_with_batch_size(60)).await.unwrap();
    assert_eq!(limits.batch_size, 250);

    clear_env();
}

#[tokio::test]
#[serial]
async fn test_env_used_when_database_value_missing_or_invalid() {
    clear_env();
    let (_dir, pool) = create_test_db().await.unwrap();
    delete_setting(&pool, &setting_key("batch_size")).await.unwrap();
    set_setting(&pool, &setting_key("max_records"), "lots").await.unwrap();
    std::env::set_var(env_var_name("batch_size"), "40");
    std::env::set_var(env_var_name("max_records"), "1200");

    let limits = SyncLimits::resolve(&pool, &toml_with_batch_size(60)).await.unwrap();
    assert_eq!(limits.batch_size, 40);
    assert_eq!(limits.max_records, 1200);

    clear_env();
}

#[tokio::test]
#[serial]
async fn test_toml_used_below_database_and_env() {
    clear_env();
    let (_dir, pool) = create_test_db().await.unwrap();
    delete_setting(&pool, &setting_key("batch_size")).await.unwrap();

    let limits = SyncLimits::resolve(&pool, &toml_with_batch_size(60)).await.unwrap();
    assert_eq!(limits.batch_size, 60);
}

#[tokio::test]
#[serial]
async fn test_zero_values_fall_through_to_default() {
    clear_env();
    let (_dir, pool) = create_test_db().await.unwrap();
    set_setting(&pool, &setting_key("batch_size"), 0).await.unwrap();
    std::env::set_var(env_var_name("batch_size"), "0");

    let limits = SyncLimits::resolve(&pool, &toml_with_batch_size(0)).await.unwrap();
    assert_eq!(limits.batch_size, SyncLimits::default().batch_size);

    clear_env();
}
