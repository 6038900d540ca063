//! Ref node detection and classification.
//!
//! A ref string carries no explicit kind, so classification is an ordered
//! series of checks: web URIs first, then anything that looks like a file,
//! then the local fallback. The order matters — a schemeless path is both a
//! plausible file path and an invalid URI, and must land on File.

use serde_json::Value;

use crate::types::RefKind;

/// Classify a `$ref` string.
pub fn classify(value: &str) -> RefKind {
    if is_web_uri(value) {
        return RefKind::Web;
    }
    if value.starts_with("file:") || has_document_extension(value) || is_plausible_path(value) {
        return RefKind::File;
    }
    if value.starts_with('#') || !is_uri(value) {
        return RefKind::Local;
    }
    RefKind::Unknown
}

/// True iff `value` is an object (not an array) whose single key is `$ref`
/// with a string value.
///
/// With `allow_siblings` (merge mode), extra keys alongside `$ref` are
/// tolerated and kept through substitution.
pub fn is_ref_node(value: &Value, allow_siblings: bool) -> bool {
    let Value::Object(map) = value else {
        return false;
    };
    let has_string_ref = matches!(map.get("$ref"), Some(Value::String(_)));
    if allow_siblings {
        has_string_ref
    } else {
        has_string_ref && map.len() == 1
    }
}

/// The `$ref` string of a ref node, if `value` is one.
pub fn ref_value(value: &Value, allow_siblings: bool) -> Option<&str> {
    if is_ref_node(value, allow_siblings) {
        value.get("$ref").and_then(Value::as_str)
    } else {
        None
    }
}

fn is_web_uri(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    matches!(rest, Some(r) if !r.is_empty())
}

/// Syntactic URI check: an RFC 3986 scheme followed by a colon. The scheme
/// must be at least two characters so a Windows drive prefix (`C:\...`)
/// doesn't count.
fn is_uri(value: &str) -> bool {
    let Some(colon) = value.find(':') else {
        return false;
    };
    let scheme = &value[..colon];
    scheme.len() >= 2
        && scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// True if the part before any pointer fragment ends in a document extension.
fn has_document_extension(value: &str) -> bool {
    let file_part = value.split('#').next().unwrap_or(value);
    file_part.len() > ".json".len() && file_part.to_ascii_lowercase().ends_with(".json")
}

/// Loose filesystem path check. Rejects anything carrying a fragment,
/// query, scheme, or control characters; a Windows drive prefix is allowed.
fn is_plausible_path(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    let rest = strip_windows_drive(value);
    !rest
        .chars()
        .any(|c| matches!(c, ':' | '#' | '?' | '*' | '"' | '<' | '>' | '|') || c.is_control())
}

fn strip_windows_drive(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
    {
        &value[2..]
    } else {
        value
    }
}
