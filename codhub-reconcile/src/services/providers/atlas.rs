//! Atlas carrier adapter
//!
//! Atlas only exposes a date-bounded full-text export, so a row that matches
//! nothing now will not match later either: no-match is terminal.

use super::{ContactPaths, NoMatchPolicy, ProviderAdapter};
use crate::models::order_status::status_key;
use crate::models::OrderStatus;

pub struct AtlasAdapter;

impl ProviderAdapter for AtlasAdapter {
    fn key(&self) -> &'static str {
        "atlas"
    }

    fn table(&self) -> &'static str {
        "staging_atlas"
    }

    fn supports_order_link(&self) -> bool {
        true
    }

    fn no_match_policy(&self) -> NoMatchPolicy {
        NoMatchPolicy::Terminal
    }

    fn contact_paths(&self) -> ContactPaths {
        ContactPaths {
            name: &["/customer/fullName", "/customer/name"],
            email: &["/customer/email"],
            phone: &["/customer/phone", "/customer/mobile"],
        }
    }

    fn order_number_paths(&self) -> &'static [&'static str] {
        &["/reference", "/shopOrderRef"]
    }

    fn map_status(&self, raw: &str) -> Option<OrderStatus> {
        let status = match status_key(raw).as_str() {
            "created" | "awaiting_pickup" => OrderStatus::Confirmed,
            "picked_up" | "dispatched" => OrderStatus::Shipped,
            "in_transit" | "at_hub" => OrderStatus::InTransit,
            "out_for_delivery" => OrderStatus::OutForDelivery,
            "delivered" => OrderStatus::Delivered,
            "refused" | "delivery_refused" => OrderStatus::Refused,
            "returned" | "returned_to_sender" => OrderStatus::Returned,
            "cancelled" | "canceled" => OrderStatus::Cancelled,
            _ => return None,
        };
        Some(status)
    }
}
