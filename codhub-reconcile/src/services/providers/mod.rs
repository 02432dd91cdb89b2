//! Provider adapters
//!
//! Every staging provider is reconciled by the same generic loop; an adapter
//! only says where its rows live, how its payload spells recipient fields,
//! how its statuses map to the tenant vocabulary, and what happens to a row
//! that matches nothing.

pub mod atlas;
pub mod boreal;
pub mod cobalt;
pub mod delta;
pub mod ember;

use std::sync::Arc;

use crate::models::staging_record::string_at;
use crate::models::{OrderStatus, RecipientContact, StagingRecord};

/// What to do with a staging row that matches no canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoMatchPolicy {
    /// Close the row and stamp `raw_payload.failedMatch`
    Terminal,
    /// Leave the row unprocessed for a later run
    Retry,
}

/// JSON pointers into `raw_payload` for providers that nest recipient data
#[derive(Debug, Clone, Copy, Default)]
pub struct ContactPaths {
    pub name: &'static [&'static str],
    pub email: &'static [&'static str],
    pub phone: &'static [&'static str],
}

/// Provider-specific knowledge used by the generic reconciler
pub trait ProviderAdapter: Send + Sync {
    /// Provider key; also the `provider_data` sub-key and `warehouse_accounts.provider`
    fn key(&self) -> &'static str;

    /// Staging table name
    fn table(&self) -> &'static str;

    /// Staging table carries `matched_order_id`
    fn supports_order_link(&self) -> bool;

    fn no_match_policy(&self) -> NoMatchPolicy;

    /// Alternate recipient locations inside `raw_payload`
    fn contact_paths(&self) -> ContactPaths;

    /// Alternate order-number locations inside `raw_payload`
    fn order_number_paths(&self) -> &'static [&'static str] {
        &[]
    }

    /// Translate a provider status; `None` leaves the canonical status as is
    fn map_status(&self, raw: &str) -> Option<OrderStatus>;

    /// Recipient fields: primary `recipient` block first, then payload alternates
    fn extract_contact(&self, record: &StagingRecord) -> RecipientContact {
        let primary = record
            .recipient
            .as_ref()
            .map(|r| RecipientContact {
                name: string_at(r, "/name"),
                email: string_at(r, "/email"),
                phone: string_at(r, "/phone"),
            })
            .unwrap_or_default();

        let paths = self.contact_paths();
        let first = |pointers: &[&str]| {
            pointers
                .iter()
                .find_map(|p| string_at(&record.raw_payload, p))
        };
        let alternate = RecipientContact {
            name: first(paths.name),
            email: first(paths.email),
            phone: first(paths.phone),
        };

        primary.or(alternate)
    }

    /// Storefront order number as the provider recorded it
    fn extract_order_number(&self, record: &StagingRecord) -> Option<String> {
        record
            .order_number
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.order_number_paths()
                    .iter()
                    .find_map(|p| string_at(&record.raw_payload, p))
            })
    }
}

/// Every staging provider, in reconciliation order
pub fn all_providers() -> Vec<Arc<dyn ProviderAdapter>> {
    vec![
        Arc::new(atlas::AtlasAdapter),
        Arc::new(boreal::BorealAdapter),
        Arc::new(cobalt::CobaltAdapter),
        Arc::new(delta::DeltaAdapter),
        Arc::new(ember::EmberAdapter),
    ]
}

/// Look up an adapter by provider key
pub fn provider_by_key(key: &str) -> Option<Arc<dyn ProviderAdapter>> {
    all_providers().into_iter().find(|p| p.key() == key)
}
