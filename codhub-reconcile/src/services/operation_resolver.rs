//! Warehouse account → operation resolution
//!
//! Built once per run from the tenant's own links, then queried for every
//! staging row. An order number carrying a configured prefix selects that
//! operation; otherwise an account linked to exactly one operation resolves
//! to it; anything else is unresolved.

use sqlx::SqlitePool;
use std::collections::HashMap;
use codhub_common::Result;
use tracing::debug;

use crate::models::Operation;

/// Per-run `{account_id -> linked operations}` cache
#[derive(Debug, Clone, Default)]
pub struct OperationResolver {
    by_account: HashMap<i64, Vec<Operation>>,
}

impl OperationResolver {
    /// Build the cache from `(account_id, operation)` link pairs
    pub fn from_links(links: impl IntoIterator<Item = (i64, Operation)>) -> Self {
        let mut by_account: HashMap<i64, Vec<Operation>> = HashMap::new();
        for (account_id, operation) in links {
            let operations = by_account.entry(account_id).or_default();
            if !operations.iter().any(|op| op.id == operation.id) {
                operations.push(operation);
            }
        }
        for operations in by_account.values_mut() {
            operations.sort_by_key(|op| op.id);
        }
        Self { by_account }
    }

    /// Load the tenant's links
    pub async fn load(pool: &SqlitePool, user_id: i64) -> Result<Self> {
        let links = crate::db::operations::load_account_operations(pool, user_id).await?;
        let resolver = Self::from_links(links);
        debug!(
            user_id,
            accounts = resolver.account_count(),
            "Operation resolution cache built"
        );
        Ok(resolver)
    }

    /// Accounts with at least one linked operation
    pub fn account_count(&self) -> usize {
        self.by_account.len()
    }

    #[cfg(test)]
    fn operations_for(&self, account_id: i64) -> &[Operation] {
        self.by_account
            .get(&account_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Pick the operation a staging row belongs to
    ///
    /// Prefix comparison is case-insensitive and ignores a leading `#` on
    /// both sides. The longest matching prefix wins; equal lengths go to the
    /// lowest operation id.
    pub fn resolve(&self, account_id: i64, order_number: Option<&str>) -> Option<&Operation> {
        let candidates = self.by_account.get(&account_id)?;

        if let Some(number) = order_number.map(clean_order_number).filter(|n| !n.is_empty()) {
            let mut best: Option<(&Operation, usize)> = None;
            for operation in candidates {
                let Some(prefix) = operation.order_prefix.as_deref().map(clean_order_number) else {
                    continue;
                };
                if prefix.is_empty() || !number.starts_with(&prefix) {
                    continue;
                }
                let len = prefix.chars().count();
                if best.map_or(true, |(_, best_len)| len > best_len) {
                    best = Some((operation, len));
                }
            }
            if let Some((operation, _)) = best {
                return Some(operation);
            }
        }

        match candidates.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

fn clean_order_number(value: &str) -> String {
    value.trim().trim_start_matches('#').trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(id: i64, prefix: Option<&str>) -> Operation {
        Operation {
            id,
            user_id: 1,
            name: format!("op-{}", id),
            order_prefix: prefix.map(str::to_string),
            integration_started_at: None,
        }
    }

    #[test]
    fn test_prefix_selects_operation() {
        let resolver = OperationResolver::from_links(vec![
            (10, op(1, Some("LI-"))),
            (10, op(2, Some("BR-"))),
        ]);
        assert_eq!(resolver.resolve(10, Some("BR-1001")).map(|o| o.id), Some(2));
        assert_eq!(resolver.resolve(10, Some("#li-77")).map(|o| o.id), Some(1));
    }

    #[test]
    fn test_longest_prefix_wins() {
        let resolver = OperationResolver::from_links(vec![
            (10, op(1, Some("LI"))),
            (10, op(2, Some("LIX-"))),
        ]);
        assert_eq!(resolver.resolve(10, Some("LIX-5")).map(|o| o.id), Some(2));
        assert_eq!(resolver.resolve(10, Some("LI-5")).map(|o| o.id), Some(1));
    }

    #[test]
    fn test_single_link_fallback() {
        let resolver = OperationResolver::from_links(vec![(10, op(1, Some("LI-")))]);
        assert_eq!(resolver.resolve(10, Some("ZZ-1")).map(|o| o.id), Some(1));
        assert_eq!(resolver.resolve(10, None).map(|o| o.id), Some(1));
    }

    #[test]
    fn test_ambiguous_without_prefix_is_unresolved() {
        let resolver = OperationResolver::from_links(vec![
            (10, op(1, None)),
            (10, op(2, Some("BR-"))),
        ]);
        assert!(resolver.resolve(10, Some("1001")).is_none());
        assert!(resolver.resolve(10, None).is_none());
    }

    #[test]
    fn test_unknown_account_is_unresolved() {
        let resolver = OperationResolver::from_links(vec![(10, op(1, None))]);
        assert!(resolver.resolve(99, Some("1001")).is_none());
        assert!(resolver.operations_for(99).is_empty());
    }

    #[test]
    fn test_duplicate_links_collapse() {
        let resolver = OperationResolver::from_links(vec![(10, op(1, None)), (10, op(1, None))]);
        assert_eq!(resolver.operations_for(10).len(), 1);
        assert_eq!(resolver.resolve(10, Some("1001")).map(|o| o.id), Some(1));
    }
}
