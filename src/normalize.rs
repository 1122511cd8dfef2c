//! Text normalization shared by every name comparison in the crate.
//!
//! Pattern matching and metadata-row detection both go through [`normalize`],
//! so "Depreciación", "DEPRECIACION " and "depreciacion" are the same text
//! everywhere.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Labels that mark header or total rows rather than accounts.
const METADATA_LABELS: &[&str] = &[
    "total",
    "totales",
    "total general",
    "codigo",
    "cuenta",
    "descripcion",
    "nombre de la cuenta",
];

/// Lowercases, trims, strips combining diacritical marks (NFD) and collapses
/// inner whitespace runs to a single space.
pub fn normalize(text: &str) -> String {
    let stripped = strip_marks(text).to_lowercase();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// NFD decomposition with combining marks removed. Case and whitespace are
/// left alone, so regex sources keep their escapes.
pub fn strip_marks(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Missing text normalizes to the empty string.
pub fn normalize_opt(text: Option<&str>) -> String {
    text.map(normalize).unwrap_or_default()
}

pub fn is_metadata_label(text: &str) -> bool {
    let normalized = normalize(text);
    METADATA_LABELS.contains(&normalized.as_str())
}
