//! Tenant order status vocabulary

use serde::{Deserialize, Serialize};

/// Status of a canonical order as the tenant sees it
///
/// Provider adapters translate their own vocabulary into this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    InTransit,
    OutForDelivery,
    Delivered,
    Refused,
    Returned,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Refused => "refused",
            OrderStatus::Returned => "returned",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Parse a stored status value
    pub fn parse(value: &str) -> Option<Self> {
        let status = match value.trim() {
            "pending" => OrderStatus::Pending,
            "confirmed" => OrderStatus::Confirmed,
            "shipped" => OrderStatus::Shipped,
            "in_transit" => OrderStatus::InTransit,
            "out_for_delivery" => OrderStatus::OutForDelivery,
            "delivered" => OrderStatus::Delivered,
            "refused" => OrderStatus::Refused,
            "returned" => OrderStatus::Returned,
            "cancelled" => OrderStatus::Cancelled,
            _ => return None,
        };
        Some(status)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical lookup key for a provider status string
///
/// Lowercases, trims and folds spaces and dashes to underscores so
/// `"Out For-Delivery"` and `"out_for_delivery"` compare equal.
pub fn status_key(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}
