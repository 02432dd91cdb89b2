//! Progress store integration tests

mod helpers;

use chrono::{Duration, Utc};
use helpers::*;
use sqlx::SqlitePool;
use uuid::Uuid;

use codhub_common::events::{EventBus, SyncPhase};
use codhub_common::time::to_rfc3339;
use codhub_reconcile::db::sessions;
use codhub_reconcile::services::{ProgressStore, SyncOrchestrator};

fn store(pool: &SqlitePool) -> ProgressStore {
    ProgressStore::new(pool.clone(), Duration::seconds(5), 500)
}

/// Run one reconciliation for tenant 1 with a single matchable row
async fn finished_run(pool: &SqlitePool) {
    insert_user(pool, 1).await.unwrap();
    let op = insert_operation(pool, 1, "Loja", None, None).await.unwrap();
    let account = insert_account(pool, 1, "boreal", "active").await.unwrap();
    link_account(pool, op, account).await.unwrap();
    insert_order(pool, op, &OrderFixture::new("#10")).await.unwrap();
    insert_staging(pool, "staging_boreal", account, &StagingFixture::new().order_number("10"))
        .await
        .unwrap();

    SyncOrchestrator::new(pool.clone(), EventBus::new(16), test_limits())
        .reconcile(1, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_never_synced_tenant_gets_idle_snapshot() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let session = store(&pool).get(42).await.unwrap();

    assert_eq!(session.user_id, 42);
    assert_eq!(session.phase, SyncPhase::Preparing);
    assert_eq!(session.version, 0);
    assert_eq!(session.percentage, 0);
    assert!(!session.is_running);
    assert!(sessions::load_session(&pool, 42).await.unwrap().is_none(), "reads do not create rows");
}

#[tokio::test]
async fn test_counters_survive_inside_grace_window() {
    let (_dir, pool) = create_test_db().await.unwrap();
    finished_run(&pool).await;

    let session = store(&pool).get(1).await.unwrap();
    assert_eq!(session.phase, SyncPhase::Completed);
    assert_eq!(session.processed, 1);
    assert_eq!(session.percentage, 100);
}

#[tokio::test]
async fn test_stale_counters_are_reset_on_read() {
    let (_dir, pool) = create_test_db().await.unwrap();
    finished_run(&pool).await;

    sqlx::query("UPDATE sync_sessions SET end_time = ? WHERE user_id = 1")
        .bind(to_rfc3339(&(Utc::now() - Duration::minutes(1))))
        .execute(&pool)
        .await
        .unwrap();
    let before = sessions::load_session(&pool, 1).await.unwrap().unwrap();

    let session = store(&pool).get(1).await.unwrap();
    assert_eq!(session.phase, SyncPhase::Preparing);
    assert_eq!(session.processed, 0);
    assert_eq!(session.percentage, 0);
    assert!(session.provider_progress.is_empty());
    assert_eq!(session.version, before.version + 1);

    let stored = sessions::load_session(&pool, 1).await.unwrap().unwrap();
    assert_eq!(stored.processed, 0);
    assert_eq!(stored.version, session.version);
}

#[tokio::test]
async fn test_reset_releases_running_session() {
    let (_dir, pool) = create_test_db().await.unwrap();
    insert_user(&pool, 1).await.unwrap();
    let now = Utc::now();
    sessions::try_acquire(&pool, 1, None, Uuid::new_v4(), now, now - Duration::minutes(30))
        .await
        .unwrap()
        .unwrap();

    let session = store(&pool).reset(1).await.unwrap();
    assert!(!session.is_running);
    assert!(session.run_id.is_none());
    assert!(!has_running_session(&pool, 1).await.unwrap());

    let reacquired = sessions::try_acquire(&pool, 1, None, Uuid::new_v4(), now, now - Duration::minutes(30))
        .await
        .unwrap();
    assert!(reacquired.is_some());
}

#[tokio::test]
async fn test_reset_of_unknown_tenant_creates_idle_row() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let session = store(&pool).reset(9).await.unwrap();

    assert_eq!(session.user_id, 9);
    assert_eq!(session.version, 1);
    assert_eq!(session.phase, SyncPhase::Preparing);
}

#[tokio::test]
async fn test_cleanup_marks_interrupted_runs_failed() {
    let (_dir, pool) = create_test_db().await.unwrap();
    let now = Utc::now();
    for user_id in [1, 2] {
        sessions::try_acquire(&pool, user_id, None, Uuid::new_v4(), now, now - Duration::minutes(30))
            .await
            .unwrap()
            .unwrap();
    }

    let cleaned = store(&pool).cleanup_interrupted().await.unwrap();
    assert_eq!(cleaned, 2);

    let session = store(&pool).get(2).await.unwrap();
    assert_eq!(session.phase, SyncPhase::Error);
    assert!(!session.is_running);
    assert_eq!(session.message.as_deref(), Some("interrupted by restart"));

    assert_eq!(store(&pool).cleanup_interrupted().await.unwrap(), 0);
}
