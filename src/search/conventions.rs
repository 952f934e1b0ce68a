//! Backend schema conventions: query escaping and facet field naming

use crate::search::error::{SearchError, SearchResult};

/// Suffix of the backend field that carries the facet copy of an attribute
pub const FACET_FIELD_SUFFIX: &str = "_facet";

/// Document id field
pub const ATTRIBUTE_ID: &str = "id";
/// Document name field
pub const ATTRIBUTE_NAME: &str = "name";
/// Document title field
pub const ATTRIBUTE_TITLE: &str = "title";
/// Document description field
pub const ATTRIBUTE_DESCRIPTION: &str = "description";
/// Document URI path field
pub const ATTRIBUTE_URI_PATH: &str = "uripath";

/// Fields with dedicated accessors on [`Document`](crate::search::Document)
pub const RESERVED_ATTRIBUTES: [&str; 5] = [
    ATTRIBUTE_ID,
    ATTRIBUTE_NAME,
    ATTRIBUTE_TITLE,
    ATTRIBUTE_DESCRIPTION,
    ATTRIBUTE_URI_PATH,
];

/// Returns `true` for characters that are part of the backend query syntax
fn is_reserved(c: char) -> bool {
    matches!(
        c,
        '\\' | '+'
            | '-'
            | '!'
            | '('
            | ')'
            | ':'
            | '^'
            | '['
            | ']'
            | '"'
            | '{'
            | '}'
            | '<'
            | '>'
            | '~'
            | '*'
            | '?'
            | '|'
            | '&'
            | ';'
    ) || c.is_whitespace()
}

/// Escapes every reserved query character (and whitespace) with a backslash.
///
/// Every raw value must pass through here before it is embedded into a
/// backend query string.
pub fn escape_query_chars(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    let mut escaped = String::with_capacity(input.len() + 16);
    for c in input.chars() {
        if is_reserved(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Converts an attribute id into the facet field name used in the backend schema
pub fn facet_field_name(attribute_id: &str) -> SearchResult<String> {
    if attribute_id.trim().is_empty() {
        return Err(SearchError::InvalidArgument(
            "attribute id must not be empty".to_string(),
        ));
    }
    Ok(format!("{}{}", attribute_id, FACET_FIELD_SUFFIX))
}

/// Converts a backend facet field name back into an attribute id
pub fn facet_attribute_id(field_name: &str) -> &str {
    field_name
        .strip_suffix(FACET_FIELD_SUFFIX)
        .unwrap_or(field_name)
}

/// Local-params prefix marking a filter as excludable by its own facet
pub(crate) fn tag_local_param(attribute_id: &str) -> String {
    format!("{{!tag={}}}", attribute_id)
}

/// Local-params prefix excluding a tagged filter from a facet's counts
pub(crate) fn exclude_local_param(attribute_id: &str) -> String {
    format!("{{!ex={}}}", attribute_id)
}
