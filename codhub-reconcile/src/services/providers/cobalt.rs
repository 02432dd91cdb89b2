//! Cobalt carrier adapter
//!
//! Cobalt reports in Portuguese and its staging table has no order link column.

use super::{ContactPaths, NoMatchPolicy, ProviderAdapter};
use crate::models::order_status::status_key;
use crate::models::OrderStatus;

pub struct CobaltAdapter;

impl ProviderAdapter for CobaltAdapter {
    fn key(&self) -> &'static str {
        "cobalt"
    }

    fn table(&self) -> &'static str {
        "staging_cobalt"
    }

    fn supports_order_link(&self) -> bool {
        false
    }

    fn no_match_policy(&self) -> NoMatchPolicy {
        NoMatchPolicy::Retry
    }

    fn contact_paths(&self) -> ContactPaths {
        ContactPaths {
            name: &["/destinatario/nome"],
            email: &["/destinatario/email"],
            phone: &["/destinatario/telefone", "/destinatario/celular"],
        }
    }

    fn order_number_paths(&self) -> &'static [&'static str] {
        &["/pedido/numero"]
    }

    fn map_status(&self, raw: &str) -> Option<OrderStatus> {
        let status = match status_key(raw).as_str() {
            "aguardando" | "pendente" => OrderStatus::Pending,
            "aprovado" | "confirmado" => OrderStatus::Confirmed,
            "postado" | "enviado" => OrderStatus::Shipped,
            "em_transito" => OrderStatus::InTransit,
            "saiu_para_entrega" => OrderStatus::OutForDelivery,
            "entregue" => OrderStatus::Delivered,
            "recusado" => OrderStatus::Refused,
            "devolvido" => OrderStatus::Returned,
            "cancelado" => OrderStatus::Cancelled,
            _ => return None,
        };
        Some(status)
    }
}
