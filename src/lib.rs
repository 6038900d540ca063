//! json-deref
//!
//! Dereferences `$ref` pointers in JSON-Schema-like documents into fully
//! inlined, self-contained values. Refs may point at another location in the
//! same document, another file on disk, or a remote document over HTTP, with
//! arbitrary nesting and mixing of the three.
//!
//! This library resolves refs; it never validates the result against the
//! JSON Schema meta-schema.
//!
//! # Example
//!
//! ```
//! use json_deref::{resolve, DerefOptions};
//! use serde_json::json;
//!
//! let schema = json!({
//!     "definitions": {
//!         "id": { "type": "string", "minLength": 1 }
//!     },
//!     "properties": {
//!         "id": { "$ref": "#/definitions/id" }
//!     }
//! });
//!
//! let resolved = resolve(&schema, &DerefOptions::new()).unwrap();
//! assert_eq!(
//!     resolved["properties"]["id"],
//!     json!({ "type": "string", "minLength": 1 })
//! );
//! ```
//!
//! # Ref kinds
//!
//! | Kind | Example | Resolved by |
//! |------|---------|-------------|
//! | Local | `#/definitions/foo` | pointer lookup in the same document |
//! | File | `./types/buyer.json#/defs/id` | reading and parsing the file |
//! | Web | `https://example.com/s.json` | HTTP GET (feature `remote`) |
//! | Unknown | `db://id123` | the configured external loader |
//!
//! Missing refs are left as-is unless `fail_on_missing` is set. Any ref
//! cycle fails the whole call: a cyclic document has no finite inlined form.

mod cache;
mod classify;
mod error;
mod loader;
mod pointer;
mod resolver;
mod types;

pub use cache::Cache;
pub use classify::{classify, is_ref_node, ref_value};
pub use error::DerefError;
pub use loader::{load_file, resolve_file_path, META_SCHEMA_HOST};
pub use pointer::{get_path_value, ref_file_path, set_path_value};
pub use resolver::{resolve, resolve_with_cache};
pub use types::{
    DerefOptions, LoaderError, LoaderOptions, RefKind, RefLoader, DEFAULT_CACHE_TTL,
};

#[cfg(feature = "remote")]
pub use loader::load_url;
