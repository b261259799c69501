//! Literal placeholder substitution for extract and post queries.
//!
//! Keys are matched verbatim (`{table}`, `:since`, whatever the definition
//! uses) and values are inserted without escaping. Substitution runs in the
//! map's insertion order, so a value that contains another key's text is
//! replaced again only if that key comes later.

use indexmap::IndexMap;

/// Placeholder key to replacement text, applied in insertion order.
pub type Placeholders = IndexMap<String, String>;

/// Replace every occurrence of every placeholder key in `query`.
pub fn hydrate(query: &str, placeholders: &Placeholders) -> String {
    placeholders
        .iter()
        .fold(query.to_string(), |acc, (key, value)| {
            if key.is_empty() {
                acc
            } else {
                acc.replace(key.as_str(), value)
            }
        })
}

/// Like [`hydrate`], then append ` OFFSET <n>` when an offset is given.
///
/// The batch loop reads through a single cursor and never calls this.
pub fn hydrate_with_offset(query: &str, placeholders: &Placeholders, offset: Option<u64>) -> String {
    let hydrated = hydrate(query, placeholders);
    match offset {
        Some(n) => format!("{} OFFSET {n}", hydrated.trim_end().trim_end_matches(';')),
        None => hydrated,
    }
}
