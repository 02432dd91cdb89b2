//! Order matcher
//!
//! Cascading identity resolution of a staging record against the canonical
//! orders of one operation. Strategies run in a fixed order and the first
//! one that yields a candidate wins:
//!
//! 1. Order-number variants (exact)
//! 2. Email (normalized)
//! 3. Phone: exact, then 9-digit suffix (long phones) or reverse suffix (short phones)
//! 4. Name contained in either direction, amount within ±1.0
//!
//! At most one order is ever returned.

use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use codhub_common::Result;

use crate::db::orders;
use crate::models::{CanonicalOrder, MatchStrategy};
use crate::services::normalizer::{
    normalize_email, normalize_name, normalize_phone, order_number_variants, usable_name,
    usable_phone, PHONE_SUFFIX_DIGITS,
};

/// Maximum |total - value| for a name+value match
pub const NAME_VALUE_TOLERANCE: f64 = 1.0;

/// Absorbs float noise such as `50.9 - 49.9 = 1.0000000000000036`
const AMOUNT_EPSILON: f64 = 1e-6;

/// Identity fields of one staging record, scoped to its resolved operation
#[derive(Debug, Clone, Default)]
pub struct MatchQuery<'a> {
    pub operation_id: i64,
    /// The operation's configured order prefix
    pub order_prefix: Option<&'a str>,
    pub order_number: Option<&'a str>,
    pub email: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub name: Option<&'a str>,
    pub value: Option<f64>,
    /// Only orders placed on or after this timestamp are candidates
    pub integration_date: Option<&'a str>,
}

/// A matched order and the strategy that found it
#[derive(Debug, Clone, PartialEq)]
pub struct OrderMatch {
    pub order: CanonicalOrder,
    pub strategy: MatchStrategy,
}

/// One order's normalized stored phone
#[derive(Debug, Clone, PartialEq)]
pub struct PhoneEntry {
    pub order_id: i64,
    pub phone: String,
}

type PhoneIndexKey = (i64, Option<String>);

/// Order matcher
///
/// Holds a lazily built per-operation phone index, so one matcher should
/// live for exactly one run.
pub struct OrderMatcher {
    db: SqlitePool,
    phone_index: RwLock<HashMap<PhoneIndexKey, Arc<Vec<PhoneEntry>>>>,
}

impl OrderMatcher {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            phone_index: RwLock::new(HashMap::new()),
        }
    }

    /// Find the single canonical order a staging record belongs to
    pub async fn find_match(&self, query: &MatchQuery<'_>) -> Result<Option<OrderMatch>> {
        let since = query.integration_date.filter(|d| !d.trim().is_empty());

        if let Some(order) = self.match_order_number(query, since).await? {
            return Ok(Some(OrderMatch {
                order,
                strategy: MatchStrategy::OrderNumber,
            }));
        }

        let email = normalize_email(query.email);
        if !email.is_empty() {
            if let Some(order) = orders::find_by_email(&self.db, query.operation_id, &email, since).await? {
                return Ok(Some(OrderMatch {
                    order,
                    strategy: MatchStrategy::Email,
                }));
            }
        }

        let phone = normalize_phone(query.phone);
        if usable_phone(&phone) {
            let index = self.phone_index_for(query.operation_id, since).await?;
            if let Some((order_id, strategy)) = match_phone(&index, &phone) {
                if let Some(order) = orders::get_order(&self.db, order_id).await? {
                    return Ok(Some(OrderMatch { order, strategy }));
                }
            }
        }

        let name = normalize_name(query.name);
        if let Some(value) = query.value.filter(|v| *v > 0.0) {
            if usable_name(&name) {
                let candidates = orders::find_by_total_window(
                    &self.db,
                    query.operation_id,
                    value,
                    NAME_VALUE_TOLERANCE + AMOUNT_EPSILON,
                    since,
                )
                .await?;
                if let Some(order) = pick_name_value(candidates, &name, value) {
                    return Ok(Some(OrderMatch {
                        order,
                        strategy: MatchStrategy::NameValue,
                    }));
                }
            }
        }

        Ok(None)
    }

    async fn match_order_number(
        &self,
        query: &MatchQuery<'_>,
        since: Option<&str>,
    ) -> Result<Option<CanonicalOrder>> {
        let variants = order_number_variants(query.order_number, query.order_prefix);
        if variants.is_empty() {
            return Ok(None);
        }
        let candidates =
            orders::find_by_order_numbers(&self.db, query.operation_id, &variants, since).await?;
        Ok(pick_by_variant(candidates, &variants))
    }

    async fn phone_index_for(
        &self,
        operation_id: i64,
        since: Option<&str>,
    ) -> Result<Arc<Vec<PhoneEntry>>> {
        let key: PhoneIndexKey = (operation_id, since.map(str::to_string));

        if let Some(index) = self.phone_index.read().await.get(&key) {
            return Ok(Arc::clone(index));
        }

        let mut guard = self.phone_index.write().await;
        if let Some(index) = guard.get(&key) {
            return Ok(Arc::clone(index));
        }

        let stored = orders::load_stored_phones(&self.db, operation_id, since).await?;
        let entries: Vec<PhoneEntry> = stored
            .into_iter()
            .filter_map(|row| {
                row.phones
                    .iter()
                    .map(|p| normalize_phone(p.as_deref()))
                    .find(|p| !p.is_empty())
                    .map(|phone| PhoneEntry {
                        order_id: row.order_id,
                        phone,
                    })
            })
            .collect();

        debug!(operation_id, entries = entries.len(), "Phone index built");
        let index = Arc::new(entries);
        guard.insert(key, Arc::clone(&index));
        Ok(index)
    }
}

/// Candidate matching the earliest variant; candidates are most recent first
pub fn pick_by_variant(candidates: Vec<CanonicalOrder>, variants: &[String]) -> Option<CanonicalOrder> {
    let position = variants.iter().find_map(|variant| {
        candidates
            .iter()
            .position(|order| &order.order_number == variant)
    })?;
    candidates.into_iter().nth(position)
}

/// Phone cascade over an index ordered most recent first
///
/// `phone` is normalized and usable. Exact matches beat suffix matches.
pub fn match_phone(entries: &[PhoneEntry], phone: &str) -> Option<(i64, MatchStrategy)> {
    if let Some(entry) = entries.iter().find(|e| e.phone == phone) {
        return Some((entry.order_id, MatchStrategy::PhoneExact));
    }

    if phone.len() >= PHONE_SUFFIX_DIGITS {
        let suffix = &phone[phone.len() - PHONE_SUFFIX_DIGITS..];
        entries
            .iter()
            .find(|e| e.phone.len() >= PHONE_SUFFIX_DIGITS && e.phone.ends_with(suffix))
            .map(|e| (e.order_id, MatchStrategy::PhoneSuffix))
    } else {
        entries
            .iter()
            .find(|e| e.phone.ends_with(phone))
            .map(|e| (e.order_id, MatchStrategy::PhoneReverseSuffix))
    }
}

/// Name+value pick: usable stored name contained in either direction, smallest
/// amount gap, then most recent
pub fn pick_name_value(candidates: Vec<CanonicalOrder>, name: &str, value: f64) -> Option<CanonicalOrder> {
    let mut best: Option<(f64, CanonicalOrder)> = None;

    for order in candidates {
        let Some(total) = order.total else {
            continue;
        };
        let diff = (total - value).abs();
        if diff > NAME_VALUE_TOLERANCE + AMOUNT_EPSILON {
            continue;
        }
        let stored = normalize_name(order.customer_name.as_deref());
        if !usable_name(&stored) || !(stored.contains(name) || name.contains(&stored)) {
            continue;
        }
        // Strictly smaller keeps the earlier (more recent) order on ties
        if best.as_ref().map_or(true, |(best_diff, _)| diff < *best_diff) {
            best = Some((diff, order));
        }
    }

    best.map(|(_, order)| order)
}
