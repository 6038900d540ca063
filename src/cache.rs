//! Memoization of built-in loader results.
//!
//! File entries are keyed by canonical absolute path and live as long as the
//! cache itself; web entries are keyed by the fragment-stripped request URL
//! and expire after a TTL. [`resolve`](crate::resolve) scopes a fresh cache
//! to each call; [`resolve_with_cache`](crate::resolve_with_cache) lets
//! callers share one across calls. The maps are mutex-guarded so a single
//! cache may back concurrent resolve calls; racing writers are idempotent
//! (same key, deep-equal value).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

struct WebEntry {
    value: Value,
    expires_at: Instant,
}

/// Stores parsed loader results. Values handed out are deep copies, so two
/// resolved branches sharing a cached source never alias.
#[derive(Default)]
pub struct Cache {
    files: Mutex<HashMap<PathBuf, Value>>,
    web: Mutex<HashMap<String, WebEntry>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached parsed document for a canonical file path.
    pub fn get_file(&self, path: &Path) -> Option<Value> {
        self.files.lock().ok()?.get(path).cloned()
    }

    pub fn put_file(&self, path: &Path, value: Value) {
        if let Ok(mut files) = self.files.lock() {
            files.entry(path.to_path_buf()).or_insert(value);
        }
    }

    /// Cached response body for a fragment-stripped URL. Expired entries are
    /// removed on lookup.
    pub fn get_web(&self, url: &str) -> Option<Value> {
        let mut web = self.web.lock().ok()?;
        match web.get(url) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                web.remove(url);
                None
            }
            None => None,
        }
    }

    pub fn put_web(&self, url: &str, value: Value, ttl: Duration) {
        if let Ok(mut web) = self.web.lock() {
            web.insert(
                url.to_string(),
                WebEntry {
                    value,
                    expires_at: Instant::now() + ttl,
                },
            );
        }
    }

    /// Drop all entries.
    pub fn clear(&self) {
        if let Ok(mut files) = self.files.lock() {
            files.clear();
        }
        if let Ok(mut web) = self.web.lock() {
            web.clear();
        }
    }
}
