//! Built-in file and web loaders.
//!
//! Both take a ref string that has already been classified and produce the
//! parsed target document; pointer fragments are applied by the resolver
//! after the whole target has been dereferenced. The web loader requires the
//! `remote` feature (enabled by default).

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::DerefError;
use crate::pointer::ref_file_path;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Host of the JSON-Schema meta-schemas. Refs into it are never fetched;
/// the web loader reports them as absent.
pub const META_SCHEMA_HOST: &str = "json-schema.org";

/// Resolve a file ref to the path to read: fragment stripped, `file:` scheme
/// removed, relative paths joined onto `base_folder`, canonicalized when the
/// target exists.
pub fn resolve_file_path(ref_value: &str, base_folder: &Path) -> PathBuf {
    let mut file_part = ref_file_path(ref_value);
    if let Some(rest) = file_part.strip_prefix("file://") {
        file_part = rest;
    } else if let Some(rest) = file_part.strip_prefix("file:") {
        file_part = rest;
    }

    let path = Path::new(file_part);
    let full = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_folder.join(path)
    };
    full.canonicalize().unwrap_or(full)
}

/// Read and parse a JSON document from disk.
///
/// # Errors
///
/// `FileNotFound` if the file doesn't exist, `ReadError` on I/O failure,
/// `InvalidJson` if the content doesn't parse.
pub fn load_file(path: &Path) -> Result<Value, DerefError> {
    if !path.exists() {
        return Err(DerefError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| DerefError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| DerefError::InvalidJson {
        origin: path.display().to_string(),
        source,
    })
}

/// Fetch and parse a JSON document from a fragment-stripped URL.
///
/// Returns `Ok(None)` without fetching when the URL points at the
/// JSON-Schema meta-schema host.
///
/// # Errors
///
/// `NetworkError` on connection failure, timeout, or a non-success status.
#[cfg(feature = "remote")]
pub fn load_url(url: &str) -> Result<Option<Value>, DerefError> {
    if host_of(url).as_deref() == Some(META_SCHEMA_HOST) {
        return Ok(None);
    }

    let network_err = |source| DerefError::NetworkError {
        url: url.to_string(),
        source,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(network_err)?;

    let response = client
        .get(url)
        .send()
        .map_err(network_err)?
        .error_for_status()
        .map_err(network_err)?;

    response.json().map(Some).map_err(network_err)
}

/// Lowercased host of a web URI, port and userinfo stripped.
pub fn host_of(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .filter(|a| !a.is_empty())?;
    let host = authority.rsplit('@').next()?;
    let host = host.split(':').next()?;
    Some(host.to_ascii_lowercase())
}

/// Canonical `host+path` identifier of a web URI, used as the cycle
/// identifier and cache key basis. Query and fragment are dropped, the host
/// lowercased.
pub fn host_and_path(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let rest = rest.split(['?', '#']).next().unwrap_or(rest);
    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    if authority.is_empty() {
        return None;
    }
    Some(format!("{}{}", authority.to_ascii_lowercase(), path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn load_file_valid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"type": "object"}}"#).unwrap();

        let doc = load_file(file.path()).unwrap();
        assert_eq!(doc["type"], "object");
    }

    #[test]
    fn load_file_not_found() {
        let result = load_file(Path::new("/nonexistent/path.json"));
        assert!(matches!(result, Err(DerefError::FileNotFound { .. })));
    }

    #[test]
    fn load_file_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid json").unwrap();

        let result = load_file(file.path());
        assert!(matches!(result, Err(DerefError::InvalidJson { .. })));
    }

    #[test]
    fn resolve_file_path_relative() {
        let base = Path::new("/some/dir");
        assert_eq!(
            resolve_file_path("types/buyer.json", base),
            Path::new("/some/dir/types/buyer.json")
        );
    }

    #[test]
    fn resolve_file_path_absolute() {
        let base = Path::new("/some/dir");
        assert_eq!(
            resolve_file_path("/other/schema.json", base),
            Path::new("/other/schema.json")
        );
    }

    #[test]
    fn resolve_file_path_strips_fragment_and_scheme() {
        let base = Path::new("/some/dir");
        assert_eq!(
            resolve_file_path("./b.json#/definitions/foo", base),
            Path::new("/some/dir/b.json")
        );
        assert_eq!(
            resolve_file_path("file:/abs/b.json", base),
            Path::new("/abs/b.json")
        );
        assert_eq!(
            resolve_file_path("file:///abs/b.json", base),
            Path::new("/abs/b.json")
        );
    }

    #[test]
    fn host_of_variants() {
        assert_eq!(
            host_of("https://Example.COM/schema.json"),
            Some("example.com".into())
        );
        assert_eq!(
            host_of("http://example.com:8080/x"),
            Some("example.com".into())
        );
        assert_eq!(host_of("not a url"), None);
    }

    #[test]
    fn host_and_path_drops_query_and_fragment() {
        assert_eq!(
            host_and_path("https://Example.com/a/b.json?v=1#/defs/foo"),
            Some("example.com/a/b.json".into())
        );
        assert_eq!(
            host_and_path("http://example.com"),
            Some("example.com".into())
        );
    }

    #[cfg(feature = "remote")]
    #[test]
    fn load_url_refuses_meta_schema_host() {
        let result = load_url("http://json-schema.org/draft-04/schema").unwrap();
        assert_eq!(result, None);
    }
}
