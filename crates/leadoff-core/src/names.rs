// Player name normalization for watchlist membership tests.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalize a player display name for comparison.
///
/// Decomposes to NFD and drops combining marks (so "Peña" and "Pena"
/// compare equal), lowercases, trims, and collapses runs of internal
/// whitespace to a single space.
pub fn normalize_name(name: &str) -> String {
    let stripped: String = name
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
