//! Display-text helpers
//!
//! Upstream media catalogs deliver titles with HTML entities intact
//! (`&amp;`, `&#39;`, `&quot;`). Everything user-facing decodes them first.

/// Decode HTML entities in a media title for display.
pub fn decode_title(raw: &str) -> String {
    html_escape::decode_html_entities(raw).into_owned()
}
