//! JSON-Pointer-like path lookup and in-place mutation.
//!
//! Pointers here are laxer than RFC 6901: anything before and including a
//! `#` is stripped, the leading slash is optional, and an empty pointer
//! addresses the whole document. `~0`/`~1` escapes are honored.

use serde_json::Value;

/// Get the value a pointer addresses inside `doc`.
///
/// Returns `None` if any segment is absent. A bare `#` or empty pointer
/// returns the whole document.
pub fn get_path_value<'a>(doc: &'a Value, pointer: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in segments(pointer) {
        current = lookup(current, &segment)?;
    }
    Some(current)
}

/// Set the value at the location a pointer addresses, in place.
///
/// Returns false if the parent location does not exist or is not a
/// container; the document is left untouched in that case.
pub fn set_path_value(doc: &mut Value, pointer: &str, value: Value) -> bool {
    let segs: Vec<String> = segments(pointer).collect();
    set_segments(doc, &segs, value)
}

/// Get the value at a path of raw, already-split key segments.
///
/// Unlike [`get_path_value`] the segments are taken literally; keys
/// containing `#`, `/`, or `~` need no escaping.
pub(crate) fn get_segments<'a>(doc: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path {
        current = lookup(current, segment)?;
    }
    Some(current)
}

/// Set the value at a path of raw key segments, in place. An empty path
/// replaces the whole document.
pub(crate) fn set_segments(doc: &mut Value, path: &[String], value: Value) -> bool {
    let Some((last, parents)) = path.split_last() else {
        *doc = value;
        return true;
    };

    let mut current = doc;
    for segment in parents {
        match lookup_mut(current, segment) {
            Some(next) => current = next,
            None => return false,
        }
    }

    match current {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            true
        }
        Value::Array(arr) => match last.parse::<usize>() {
            Ok(idx) if idx < arr.len() => {
                arr[idx] = value;
                true
            }
            _ => false,
        },
        _ => false,
    }
}

/// The ref string with any pointer fragment removed, i.e. everything before
/// the first `#`.
pub fn ref_file_path(ref_value: &str) -> &str {
    match ref_value.find('#') {
        Some(idx) => &ref_value[..idx],
        None => ref_value,
    }
}

/// The pointer fragment of a ref string, `#` included, if present.
pub fn ref_fragment(ref_value: &str) -> Option<&str> {
    ref_value.find('#').map(|idx| &ref_value[idx..])
}

fn unescape_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

fn segments(pointer: &str) -> impl Iterator<Item = String> + '_ {
    let path = match pointer.find('#') {
        Some(idx) => &pointer[idx + 1..],
        None => pointer,
    };
    let path = path.strip_prefix('/').unwrap_or(path);
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(unescape_segment)
}

fn lookup<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(arr) => segment.parse::<usize>().ok().and_then(|i| arr.get(i)),
        _ => None,
    }
}

fn lookup_mut<'a>(value: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(arr) => {
            let idx = segment.parse::<usize>().ok()?;
            arr.get_mut(idx)
        }
        _ => None,
    }
}
