//! Identifier normalization
//!
//! Pure, total functions: absent or garbage input yields an empty string
//! (or an empty list), never an error. The same functions normalize both the
//! staging side and the canonical-order side of every comparison.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Trailing extension: `ext 123`, `ext. 123`, `x123`, `ramal 5`, `extension 9`
static PHONE_EXTENSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?:extension|ext\.?|ramal|x)\s*[:.]?\s*\d+\s*$")
        .expect("PHONE_EXTENSION is a valid regex pattern")
});

/// Alphabetic order-number prefix with an optional separator (`LI-`, `SHOP_`, `AB `)
static ALPHA_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z]+[-_ ]?").expect("ALPHA_PREFIX is a valid regex pattern")
});

/// Minimum normalized phone length considered for matching
pub const MIN_PHONE_DIGITS: usize = 7;

/// Phones at least this long match on their last this-many digits
pub const PHONE_SUFFIX_DIGITS: usize = 9;

/// Minimum normalized name length considered for matching
pub const MIN_NAME_CHARS: usize = 3;

/// Digits only, extension removed; country codes are kept
pub fn normalize_phone(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    let without_extension = PHONE_EXTENSION.replace(raw, "");
    without_extension.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Lowercased and trimmed
pub fn normalize_email(raw: Option<&str>) -> String {
    raw.map(|s| s.trim().to_lowercase()).unwrap_or_default()
}

/// Lowercased, diacritics stripped, inner whitespace collapsed, trimmed
pub fn normalize_name(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    let stripped: String = raw
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A normalized name long enough to match on
pub fn usable_name(normalized: &str) -> bool {
    normalized.chars().count() >= MIN_NAME_CHARS
}

/// A normalized phone long enough to match on
pub fn usable_phone(normalized: &str) -> bool {
    normalized.len() >= MIN_PHONE_DIGITS
}

/// Order-number spellings to try, most literal first
///
/// `raw` is trimmed and loses any leading `#` before the variants are built:
/// `raw`, `#raw`, without alpha prefix, `#` without prefix, without dashes,
/// `#` without dashes, `<operation prefix>-<base>`, `#<operation prefix>-<base>`.
/// The dash is not doubled when the prefix already ends in a separator.
/// Duplicates and empty strings are dropped, order is kept.
pub fn order_number_variants(raw: Option<&str>, operation_prefix: Option<&str>) -> Vec<String> {
    let raw = raw.unwrap_or("").trim().trim_start_matches('#').trim();
    if raw.is_empty() {
        return Vec::new();
    }

    let base = ALPHA_PREFIX.replace(raw, "").to_string();
    let without_dashes = raw.replace('-', "");
    let prefixed_base = operation_prefix
        .map(|p| p.trim().trim_start_matches('#'))
        .filter(|p| !p.is_empty() && !base.is_empty())
        .map(|p| {
            if p.ends_with(|c| c == '-' || c == '_') {
                format!("{}{}", p, base)
            } else {
                format!("{}-{}", p, base)
            }
        });

    let mut candidates = vec![
        raw.to_string(),
        format!("#{}", raw),
        base.clone(),
        format!("#{}", base),
        without_dashes.clone(),
        format!("#{}", without_dashes),
    ];
    if let Some(prefixed) = prefixed_base {
        candidates.push(prefixed.clone());
        candidates.push(format!("#{}", prefixed));
    }

    let mut variants: Vec<String> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if candidate.is_empty() || candidate == "#" || variants.contains(&candidate) {
            continue;
        }
        variants.push(candidate);
    }
    variants
}
