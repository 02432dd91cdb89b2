//! Ember payment platform adapter
//!
//! Payment events enrich the order like carrier events do; their status
//! vocabulary maps onto the order lifecycle where it has a counterpart.

use super::{ContactPaths, NoMatchPolicy, ProviderAdapter};
use crate::models::order_status::status_key;
use crate::models::OrderStatus;

pub struct EmberAdapter;

impl ProviderAdapter for EmberAdapter {
    fn key(&self) -> &'static str {
        "ember"
    }

    fn table(&self) -> &'static str {
        "staging_ember"
    }

    fn supports_order_link(&self) -> bool {
        false
    }

    fn no_match_policy(&self) -> NoMatchPolicy {
        NoMatchPolicy::Retry
    }

    fn contact_paths(&self) -> ContactPaths {
        ContactPaths {
            name: &["/payer/name", "/billing/name"],
            email: &["/payer/email", "/billing/email"],
            phone: &["/payer/phone", "/billing/phone"],
        }
    }

    fn order_number_paths(&self) -> &'static [&'static str] {
        &["/metadata/order_number", "/description"]
    }

    fn map_status(&self, raw: &str) -> Option<OrderStatus> {
        let status = match status_key(raw).as_str() {
            "waiting_payment" | "pending" => OrderStatus::Pending,
            "paid" | "approved" | "captured" => OrderStatus::Confirmed,
            "refunded" => OrderStatus::Returned,
            "chargeback" | "disputed" => OrderStatus::Refused,
            "canceled" | "cancelled" | "voided" | "expired" => OrderStatus::Cancelled,
            _ => return None,
        };
        Some(status)
    }
}
