//! Tenant operations and warehouse accounts

use serde::{Deserialize, Serialize};

/// A tenant's storefront operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    /// Storefront order-number prefix (e.g. `LI-`)
    pub order_prefix: Option<String>,
    /// Earliest active-integration timestamp; older orders are out of matching scope
    pub integration_started_at: Option<String>,
}

/// A tenant's account at a warehouse/carrier/payment provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseAccount {
    pub id: i64,
    pub user_id: i64,
    /// Provider key (`atlas`, `boreal`, ...)
    pub provider: String,
    /// `pending` or `active`
    pub status: String,
}
