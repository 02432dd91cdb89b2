//! Boreal carrier adapter

use super::{ContactPaths, NoMatchPolicy, ProviderAdapter};
use crate::models::order_status::status_key;
use crate::models::OrderStatus;

pub struct BorealAdapter;

impl ProviderAdapter for BorealAdapter {
    fn key(&self) -> &'static str {
        "boreal"
    }

    fn table(&self) -> &'static str {
        "staging_boreal"
    }

    fn supports_order_link(&self) -> bool {
        true
    }

    fn no_match_policy(&self) -> NoMatchPolicy {
        NoMatchPolicy::Retry
    }

    fn contact_paths(&self) -> ContactPaths {
        ContactPaths {
            name: &["/consignee/name"],
            email: &["/consignee/mail", "/consignee/email"],
            phone: &["/consignee/mobile", "/consignee/phone"],
        }
    }

    fn map_status(&self, raw: &str) -> Option<OrderStatus> {
        let status = match status_key(raw).as_str() {
            "new" | "pending" => OrderStatus::Pending,
            "accepted" | "confirmed" => OrderStatus::Confirmed,
            "shipped" | "handed_over" => OrderStatus::Shipped,
            "in_transit" | "transit" => OrderStatus::InTransit,
            "with_courier" | "out_for_delivery" => OrderStatus::OutForDelivery,
            "delivered" | "completed" => OrderStatus::Delivered,
            "refused" | "rejected" => OrderStatus::Refused,
            "returned" | "rto" => OrderStatus::Returned,
            "cancelled" | "canceled" => OrderStatus::Cancelled,
            _ => return None,
        };
        Some(status)
    }
}
