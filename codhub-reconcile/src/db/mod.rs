//! Database access for codhub-reconcile
//!
//! Tables are created by `codhub_common::db`; these modules only read and
//! update them.

pub mod operations;
pub mod orders;
pub mod sessions;
pub mod settings;
pub mod staging;

/// `?, ?, ?` for an `IN (...)` list of `n` bound values
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(0), "");
    }
}
