//! Core types for `$ref` dereferencing.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default lifetime of a cached web loader result (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(300_000);

/// Kind of a `$ref` value.
///
/// Determined by [`classify`](crate::classify::classify); the order of checks
/// there matters because ref strings are ambiguous without a scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    /// An absolute `http`/`https` URI, fetched over the network.
    Web,
    /// A filesystem path or `file:` URI, read from disk.
    File,
    /// A pointer into the document currently being processed.
    Local,
    /// A URI with an unrecognized scheme, e.g. `db://id123`. Delegated to an
    /// external loader if one is configured.
    Unknown,
}

/// Error type an external loader may return.
pub type LoaderError = Box<dyn std::error::Error + Send + Sync>;

/// External resolver for refs the built-in loaders cannot handle.
///
/// Invoked for [`RefKind::Unknown`] refs, and as a fallback when a built-in
/// file or web loader errors or declines. Returning `Ok(None)` means "not for
/// me, leave the ref as-is". An `Err` aborts the whole call when
/// `fail_on_missing` is set, otherwise the ref is treated as absent.
pub trait RefLoader: Send + Sync {
    fn load(&self, reference: &str, options: &LoaderOptions) -> Result<Option<Value>, LoaderError>;
}

impl<F> RefLoader for F
where
    F: Fn(&str, &LoaderOptions) -> Result<Option<Value>, LoaderError> + Send + Sync,
{
    fn load(&self, reference: &str, options: &LoaderOptions) -> Result<Option<Value>, LoaderError> {
        self(reference, options)
    }
}

/// The filtered public configuration passed to an external loader.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Base folder relative file refs resolve against.
    pub base_folder: PathBuf,
    /// Whether the built-in loader cache is enabled.
    pub cache: bool,
    /// Lifetime of cached web results.
    pub cache_ttl: Duration,
}

/// Options for [`resolve`](crate::resolve). All optional.
#[derive(Clone)]
pub struct DerefOptions {
    /// Directory relative file refs resolve against.
    /// Defaults to the process working directory.
    pub base_folder: Option<PathBuf>,
    /// Enable the built-in loader cache. Default: `true`.
    pub cache: bool,
    /// How long a web loader result stays cached. Default: 5 minutes.
    pub cache_ttl: Duration,
    /// Abort the whole call on the first unresolvable ref.
    /// Default: `false` (missing refs are left as-is).
    pub fail_on_missing: bool,
    /// Keep sibling keys of a `$ref` node, letting them override
    /// identically-named keys of the resolved value. Default: `false`
    /// (siblings are discarded).
    pub merge_additional_properties: bool,
    /// Strip `$id` from substituted values. Default: `false`.
    pub remove_ids: bool,
    /// External loader for [`RefKind::Unknown`] refs and built-in loader
    /// failures.
    pub loader: Option<Arc<dyn RefLoader>>,
}

impl Default for DerefOptions {
    fn default() -> Self {
        Self {
            base_folder: None,
            cache: true,
            cache_ttl: DEFAULT_CACHE_TTL,
            fail_on_missing: false,
            merge_additional_properties: false,
            remove_ids: false,
            loader: None,
        }
    }
}

impl DerefOptions {
    /// Create options with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base folder for relative file refs.
    pub fn base_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.base_folder = Some(folder.into());
        self
    }

    /// Enable or disable the built-in loader cache.
    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    /// Set how long web loader results stay cached.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Abort on the first unresolvable ref instead of leaving it as-is.
    pub fn fail_on_missing(mut self, fail: bool) -> Self {
        self.fail_on_missing = fail;
        self
    }

    /// Keep sibling keys of `$ref` nodes in the output.
    pub fn merge_additional_properties(mut self, merge: bool) -> Self {
        self.merge_additional_properties = merge;
        self
    }

    /// Strip `$id` keys from substituted values.
    pub fn remove_ids(mut self, remove: bool) -> Self {
        self.remove_ids = remove;
        self
    }

    /// Set an external loader.
    pub fn loader(mut self, loader: impl RefLoader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// The subset of options an external loader is allowed to see.
    pub(crate) fn loader_options(&self, base_folder: &std::path::Path) -> LoaderOptions {
        LoaderOptions {
            base_folder: base_folder.to_path_buf(),
            cache: self.cache,
            cache_ttl: self.cache_ttl,
        }
    }
}

impl fmt::Debug for DerefOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerefOptions")
            .field("base_folder", &self.base_folder)
            .field("cache", &self.cache)
            .field("cache_ttl", &self.cache_ttl)
            .field("fail_on_missing", &self.fail_on_missing)
            .field(
                "merge_additional_properties",
                &self.merge_additional_properties,
            )
            .field("remove_ids", &self.remove_ids)
            .field("loader", &self.loader.as_ref().map(|_| "<loader>"))
            .finish()
    }
}
