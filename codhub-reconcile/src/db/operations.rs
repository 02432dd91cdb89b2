//! Operation and warehouse account queries
//!
//! Every query is scoped by the owning tenant so one tenant's run can never
//! see another tenant's operations or accounts.

use sqlx::{Row, SqlitePool};
use codhub_common::Result;

use crate::models::{Operation, WarehouseAccount};

/// Promote the tenant's pending accounts that are linked to at least one of its operations
///
/// Returns the number of accounts promoted.
pub async fn promote_linked_pending_accounts(pool: &SqlitePool, user_id: i64) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE warehouse_accounts
        SET status = 'active'
        WHERE user_id = ?
          AND status = 'pending'
          AND EXISTS (
              SELECT 1
              FROM operation_warehouse_accounts owa
              JOIN operations o ON o.id = owa.operation_id
              WHERE owa.account_id = warehouse_accounts.id
                AND o.user_id = ?
          )
        "#,
    )
    .bind(user_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Active warehouse accounts owned by the tenant
pub async fn load_active_accounts(pool: &SqlitePool, user_id: i64) -> Result<Vec<WarehouseAccount>> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, provider, status
        FROM warehouse_accounts
        WHERE user_id = ? AND status = 'active'
        ORDER BY id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<WarehouseAccount> {
            Ok(WarehouseAccount {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                provider: row.try_get("provider")?,
                status: row.try_get("status")?,
            })
        })
        .collect()
}

/// `(account_id, operation)` pairs for every link where both sides belong to the tenant
pub async fn load_account_operations(pool: &SqlitePool, user_id: i64) -> Result<Vec<(i64, Operation)>> {
    let rows = sqlx::query(
        r#"
        SELECT owa.account_id, o.id, o.user_id, o.name, o.order_prefix, o.integration_started_at
        FROM operation_warehouse_accounts owa
        JOIN operations o ON o.id = owa.operation_id
        JOIN warehouse_accounts a ON a.id = owa.account_id
        WHERE o.user_id = ? AND a.user_id = ?
        ORDER BY owa.account_id, o.id
        "#,
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<(i64, Operation)> {
            Ok((
                row.try_get("account_id")?,
                Operation {
                    id: row.try_get("id")?,
                    user_id: row.try_get("user_id")?,
                    name: row.try_get("name")?,
                    order_prefix: row.try_get("order_prefix")?,
                    integration_started_at: row.try_get("integration_started_at")?,
                },
            ))
        })
        .collect()
}
