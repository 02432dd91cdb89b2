//! Delta carrier adapter
//!
//! Like Atlas, Delta is only queried through a date-bounded export, so
//! unmatched rows are closed as failed matches.

use super::{ContactPaths, NoMatchPolicy, ProviderAdapter};
use crate::models::order_status::status_key;
use crate::models::OrderStatus;

pub struct DeltaAdapter;

impl ProviderAdapter for DeltaAdapter {
    fn key(&self) -> &'static str {
        "delta"
    }

    fn table(&self) -> &'static str {
        "staging_delta"
    }

    fn supports_order_link(&self) -> bool {
        true
    }

    fn no_match_policy(&self) -> NoMatchPolicy {
        NoMatchPolicy::Terminal
    }

    fn contact_paths(&self) -> ContactPaths {
        ContactPaths {
            name: &["/shipTo/contactName"],
            email: &["/shipTo/emailAddress"],
            phone: &["/shipTo/phoneNumber"],
        }
    }

    fn order_number_paths(&self) -> &'static [&'static str] {
        &["/customerReference"]
    }

    // Delta sends numeric event codes alongside the textual ones
    fn map_status(&self, raw: &str) -> Option<OrderStatus> {
        let status = match status_key(raw).as_str() {
            "10" | "registered" => OrderStatus::Confirmed,
            "20" | "collected" => OrderStatus::Shipped,
            "30" | "in_transit" => OrderStatus::InTransit,
            "40" | "out_for_delivery" => OrderStatus::OutForDelivery,
            "50" | "delivered" => OrderStatus::Delivered,
            "60" | "refused" => OrderStatus::Refused,
            "70" | "returned" => OrderStatus::Returned,
            "90" | "cancelled" => OrderStatus::Cancelled,
            _ => return None,
        };
        Some(status)
    }
}
