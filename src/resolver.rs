//! The dereferencing engine.
//!
//! Depth-first, pre-order traversal that classifies each ref node, checks it
//! against the in-flight resolution history, dispatches to the right loader,
//! recursively dereferences the fetched target, and splices the result back
//! into the tree. The engine rescans after every splice, so refs introduced
//! by a substitution are resolved too; locations found missing or circular
//! are remembered per call and never re-attempted, which bounds the loop.
//!
//! The current base folder and current-document identifier travel in an
//! immutable [`Context`] value cloned per recursive call. Nothing is restored
//! on the way out because nothing shared is mutated on the way in.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::cache::Cache;
use crate::classify::{classify, ref_value};
use crate::error::DerefError;
use crate::loader;
use crate::pointer::{get_path_value, get_segments, ref_fragment, set_segments};
use crate::types::{DerefOptions, RefKind};

/// Dereference all `$ref` nodes in `schema` into their resolved values.
///
/// The input is never mutated; resolution operates on a private deep copy.
/// Local refs resolve by pointer lookup inside the document, file refs
/// against `options.base_folder` (rebased per file as resolution descends),
/// web refs over HTTP, and anything else through the configured external
/// loader. The built-in loader cache is scoped to this one call; use
/// [`resolve_with_cache`] to share a cache across calls.
///
/// # Errors
///
/// `CircularReference` if any ref cycle exists anywhere in the document
/// (all-or-nothing: there is no partial success once a cycle is found),
/// `MissingReference` for the first unresolvable ref when
/// `options.fail_on_missing` is set, and loader I/O or parse errors
/// otherwise. Without `fail_on_missing`, unresolvable refs are left intact.
pub fn resolve(schema: &Value, options: &DerefOptions) -> Result<Value, DerefError> {
    let cache = Cache::new();
    resolve_with_cache(schema, options, &cache)
}

/// Like [`resolve`], but memoizing loader results in a caller-owned cache.
pub fn resolve_with_cache(
    schema: &Value,
    options: &DerefOptions,
    cache: &Cache,
) -> Result<Value, DerefError> {
    let mut doc = schema.clone();
    let ctx = Context {
        cwd: base_folder(options),
        current: document_id(&doc),
    };
    let mut state = State::default();

    let outcome = deref_document(&mut doc, None, &ctx, options, cache, &mut state)?;

    if state.circular {
        return Err(DerefError::CircularReference {
            refs: state.circular_refs,
        });
    }

    Ok(match outcome {
        Outcome::Replaced(value) => value,
        Outcome::Done => doc,
    })
}

/// Per-call resolution state, shared down the recursion.
#[derive(Default)]
struct State {
    /// Canonical identifiers of refs currently being resolved along the
    /// active call path. Push on entry, pop on exit.
    history: Vec<String>,
    /// Ref strings no loader could produce a value for, in discovery order.
    missing: Vec<String>,
    /// Once true, the whole call fails. Never cleared.
    circular: bool,
    circular_refs: Vec<String>,
    /// Total cycle detections, duplicates included. Lets a caller tell
    /// whether a cycle fired inside one particular fetch.
    cycles_seen: usize,
}

/// Immutable per-document context. Cloned with new values as resolution
/// enters a file from another directory; the caller's copy is untouched.
#[derive(Clone)]
struct Context {
    /// Directory relative file refs resolve against.
    cwd: PathBuf,
    /// Canonical identifier of the document being processed, used to qualify
    /// local ref identifiers in the cycle history.
    current: String,
}

enum Outcome {
    /// Traversal ran to completion; the document was mutated in place.
    Done,
    /// The document root was itself a ref node and was wholesale-replaced.
    Replaced(Value),
}

enum Fetch {
    Resolved(Value),
    Missing,
    Circular,
}

/// Dereference one document. `outer_root` is the document local refs resolve
/// against when `doc` is a subtree lifted out of a larger document; `None`
/// means `doc` is its own root.
fn deref_document(
    doc: &mut Value,
    outer_root: Option<&Value>,
    ctx: &Context,
    options: &DerefOptions,
    cache: &Cache,
    state: &mut State,
) -> Result<Outcome, DerefError> {
    // Whole-document ref: the root is replaced and traversal terminates.
    if let Some(rv) = ref_value(doc, options.merge_additional_properties).map(str::to_string) {
        let cycles_before = state.cycles_seen;
        let fetch = {
            let root = outer_root.unwrap_or(&*doc);
            resolve_ref(&rv, root, ctx, options, cache, state)?
        };
        return match fetch {
            Fetch::Resolved(value) if state.cycles_seen == cycles_before => {
                let spliced = splice(value, &*doc, options);
                record_resolved(&rv, state);
                Ok(Outcome::Replaced(spliced))
            }
            // A cycle fired somewhere inside this branch; the call is going
            // to fail, so leave the ref intact rather than splice a
            // partially-resolved value.
            Fetch::Resolved(_) | Fetch::Circular => Ok(Outcome::Done),
            Fetch::Missing => {
                record_missing(&rv, options, state)?;
                Ok(Outcome::Done)
            }
        };
    }

    let mut skipped: HashSet<Vec<String>> = HashSet::new();

    while let Some((location, rv)) = find_next_ref(doc, options, &skipped, &state.missing) {
        let cycles_before = state.cycles_seen;
        let fetch = {
            let root = outer_root.unwrap_or(&*doc);
            resolve_ref(&rv, root, ctx, options, cache, state)?
        };
        match fetch {
            Fetch::Resolved(value) if state.cycles_seen == cycles_before => {
                let node = get_segments(doc, &location).cloned().unwrap_or(Value::Null);
                let spliced = splice(value, &node, options);
                set_segments(doc, &location, spliced);
                record_resolved(&rv, state);
            }
            Fetch::Resolved(_) | Fetch::Circular => {
                skipped.insert(location);
            }
            Fetch::Missing => {
                record_missing(&rv, options, state)?;
                skipped.insert(location);
            }
        }
    }

    Ok(Outcome::Done)
}

/// Find the next unprocessed ref node in pre-order over object keys and
/// array indices. Locations already skipped, and refs already known missing,
/// are passed over (their subtrees are still descended into: in merge mode a
/// ref node carries sibling values that may hold further refs).
///
/// Locations are raw key-segment paths, not pointer strings: keys are taken
/// literally, so a key containing `#` or `/` addresses cleanly.
fn find_next_ref(
    doc: &Value,
    options: &DerefOptions,
    skipped: &HashSet<Vec<String>>,
    missing: &[String],
) -> Option<(Vec<String>, String)> {
    fn walk(
        value: &Value,
        path: &mut Vec<String>,
        options: &DerefOptions,
        skipped: &HashSet<Vec<String>>,
        missing: &[String],
    ) -> Option<(Vec<String>, String)> {
        match value {
            Value::Object(map) => {
                if let Some(rv) = ref_value(value, options.merge_additional_properties) {
                    if !skipped.contains(path.as_slice()) && !missing.iter().any(|m| m == rv) {
                        return Some((path.clone(), rv.to_string()));
                    }
                }
                for (key, child) in map {
                    path.push(key.clone());
                    let found = walk(child, path, options, skipped, missing);
                    path.pop();
                    if found.is_some() {
                        return found;
                    }
                }
                None
            }
            Value::Array(arr) => {
                for (i, child) in arr.iter().enumerate() {
                    path.push(i.to_string());
                    let found = walk(child, path, options, skipped, missing);
                    path.pop();
                    if found.is_some() {
                        return found;
                    }
                }
                None
            }
            _ => None,
        }
    }

    walk(doc, &mut Vec::new(), options, skipped, missing)
}

/// Resolve one ref to its fully-dereferenced target value. The ref's
/// canonical identifier stays on the history for the duration, which is what
/// catches mutual and self recursion across ref kinds.
fn resolve_ref(
    rv: &str,
    local_root: &Value,
    ctx: &Context,
    options: &DerefOptions,
    cache: &Cache,
    state: &mut State,
) -> Result<Fetch, DerefError> {
    let kind = classify(rv);

    // A bare "#" means the containing document itself: always circular.
    if kind == RefKind::Local && rv == "#" {
        record_circular(state, rv);
        return Ok(Fetch::Circular);
    }

    let id = cycle_id(kind, rv, ctx);
    if let Some(id) = &id {
        if state.history.contains(id) {
            record_circular(state, rv);
            return Ok(Fetch::Circular);
        }
        state.history.push(id.clone());
    }

    let result = fetch_target(kind, rv, local_root, ctx, options, cache, state);

    if id.is_some() {
        state.history.pop();
    }
    result
}

/// Canonical cycle identifier for a ref, or `None` when one cannot be formed.
fn cycle_id(kind: RefKind, rv: &str, ctx: &Context) -> Option<String> {
    match kind {
        RefKind::Web => loader::host_and_path(rv),
        RefKind::File => {
            let path = loader::resolve_file_path(rv, &ctx.cwd);
            let fragment = ref_fragment(rv).unwrap_or("");
            Some(format!("{}{}", path.display(), fragment))
        }
        RefKind::Local | RefKind::Unknown => Some(format!("{}:{}", ctx.current, rv)),
    }
}

/// Route a classified ref to its resolver.
fn fetch_target(
    kind: RefKind,
    rv: &str,
    local_root: &Value,
    ctx: &Context,
    options: &DerefOptions,
    cache: &Cache,
    state: &mut State,
) -> Result<Fetch, DerefError> {
    match kind {
        // Pure pointer lookup, never I/O, no external fallback.
        RefKind::Local => {
            let Some(target) = get_path_value(local_root, rv) else {
                return Ok(Fetch::Missing);
            };
            let mut target = target.clone();
            let outcome =
                deref_document(&mut target, Some(local_root), ctx, options, cache, state)?;
            Ok(Fetch::Resolved(match outcome {
                Outcome::Replaced(value) => value,
                Outcome::Done => target,
            }))
        }
        RefKind::File => fetch_file(rv, ctx, options, cache, state),
        RefKind::Web => fetch_web(rv, ctx, options, cache, state),
        RefKind::Unknown => external_fetch(rv, ctx, options, cache, state),
    }
}

fn fetch_file(
    rv: &str,
    ctx: &Context,
    options: &DerefOptions,
    cache: &Cache,
    state: &mut State,
) -> Result<Fetch, DerefError> {
    let path = loader::resolve_file_path(rv, &ctx.cwd);

    let cached = if options.cache {
        cache.get_file(&path)
    } else {
        None
    };
    let mut target = match cached {
        Some(value) => value,
        None => match loader::load_file(&path) {
            Ok(value) => {
                if options.cache {
                    cache.put_file(&path, value.clone());
                }
                value
            }
            Err(err) => return builtin_failure(rv, err, ctx, options, cache, state),
        },
    };

    // The loaded file is its own root: its local refs resolve against it,
    // and its relative file refs against its own directory.
    let file_ctx = Context {
        cwd: path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| ctx.cwd.clone()),
        current: path.display().to_string(),
    };

    let outcome = deref_document(&mut target, None, &file_ctx, options, cache, state)?;
    let resolved = match outcome {
        Outcome::Replaced(value) => value,
        Outcome::Done => target,
    };
    apply_fragment(resolved, rv)
}

#[cfg(feature = "remote")]
fn fetch_web(
    rv: &str,
    ctx: &Context,
    options: &DerefOptions,
    cache: &Cache,
    state: &mut State,
) -> Result<Fetch, DerefError> {
    let request_url = crate::pointer::ref_file_path(rv);

    let cached = if options.cache {
        cache.get_web(request_url)
    } else {
        None
    };
    let target = match cached {
        Some(value) => Some(value),
        None => match loader::load_url(request_url) {
            Ok(Some(value)) => {
                if options.cache {
                    cache.put_web(request_url, value.clone(), options.cache_ttl);
                }
                Some(value)
            }
            // Meta-schema host: permanently unresolvable, never fetched.
            Ok(None) => None,
            Err(err) => return builtin_failure(rv, err, ctx, options, cache, state),
        },
    };

    let Some(mut target) = target else {
        return external_fetch(rv, ctx, options, cache, state);
    };

    // Web documents keep the caller's base folder for relative file refs.
    let web_ctx = Context {
        cwd: ctx.cwd.clone(),
        current: loader::host_and_path(rv).unwrap_or_else(|| rv.to_string()),
    };

    let outcome = deref_document(&mut target, None, &web_ctx, options, cache, state)?;
    let resolved = match outcome {
        Outcome::Replaced(value) => value,
        Outcome::Done => target,
    };
    apply_fragment(resolved, rv)
}

#[cfg(not(feature = "remote"))]
fn fetch_web(
    rv: &str,
    ctx: &Context,
    options: &DerefOptions,
    cache: &Cache,
    state: &mut State,
) -> Result<Fetch, DerefError> {
    // No built-in web loader compiled in; only an external loader can help.
    external_fetch(rv, ctx, options, cache, state)
}

/// A built-in loader errored: fall back to the external loader when one is
/// configured, otherwise the error is fatal for the whole call.
fn builtin_failure(
    rv: &str,
    err: DerefError,
    ctx: &Context,
    options: &DerefOptions,
    cache: &Cache,
    state: &mut State,
) -> Result<Fetch, DerefError> {
    if options.loader.is_some() {
        external_fetch(rv, ctx, options, cache, state)
    } else {
        Err(err)
    }
}

fn external_fetch(
    rv: &str,
    ctx: &Context,
    options: &DerefOptions,
    cache: &Cache,
    state: &mut State,
) -> Result<Fetch, DerefError> {
    let Some(external) = &options.loader else {
        return Ok(Fetch::Missing);
    };

    match external.load(rv, &options.loader_options(&ctx.cwd)) {
        Ok(Some(mut value)) => {
            // The loader's value is its own root: its local refs resolve
            // inside it and carry its identity in the cycle history, never
            // the caller's.
            let ext_ctx = Context {
                cwd: ctx.cwd.clone(),
                current: document_id(&value),
            };
            let outcome = deref_document(&mut value, None, &ext_ctx, options, cache, state)?;
            Ok(Fetch::Resolved(match outcome {
                Outcome::Replaced(replaced) => replaced,
                Outcome::Done => value,
            }))
        }
        Ok(None) => Ok(Fetch::Missing),
        Err(err) if options.fail_on_missing => Err(DerefError::LoaderFailed {
            reference: rv.to_string(),
            message: err.to_string(),
        }),
        Err(_) => Ok(Fetch::Missing),
    }
}

/// Apply the substitution policy: default discards the ref node's siblings;
/// merge mode overlays them onto an object result. `remove_ids` strips a
/// top-level `$id` from the spliced value.
fn splice(mut resolved: Value, node: &Value, options: &DerefOptions) -> Value {
    if options.merge_additional_properties {
        if let (Value::Object(target), Value::Object(source)) = (&mut resolved, node) {
            for (key, value) in source {
                if key != "$ref" {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
    }
    if options.remove_ids {
        if let Value::Object(map) = &mut resolved {
            map.remove("$id");
        }
    }
    resolved
}

/// Apply a trailing pointer fragment to a fully-dereferenced target.
fn apply_fragment(resolved: Value, rv: &str) -> Result<Fetch, DerefError> {
    match ref_fragment(rv) {
        Some(fragment) => match get_path_value(&resolved, fragment) {
            Some(value) => Ok(Fetch::Resolved(value.clone())),
            None => Ok(Fetch::Missing),
        },
        None => Ok(Fetch::Resolved(resolved)),
    }
}

fn record_circular(state: &mut State, rv: &str) {
    state.circular = true;
    state.cycles_seen += 1;
    if !state.circular_refs.iter().any(|r| r == rv) {
        state.circular_refs.push(rv.to_string());
    }
}

fn record_missing(rv: &str, options: &DerefOptions, state: &mut State) -> Result<(), DerefError> {
    if !state.missing.iter().any(|m| m == rv) {
        state.missing.push(rv.to_string());
    }
    if options.fail_on_missing {
        return Err(DerefError::MissingReference {
            reference: rv.to_string(),
        });
    }
    Ok(())
}

fn record_resolved(rv: &str, state: &mut State) {
    state.missing.retain(|m| m != rv);
}

fn base_folder(options: &DerefOptions) -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    match &options.base_folder {
        Some(folder) if folder.is_absolute() => folder.clone(),
        Some(folder) => cwd.join(folder),
        None => cwd,
    }
}

/// Identifier of the root document under resolution, used to qualify local
/// ref identifiers in the cycle history.
fn document_id(doc: &Value) -> String {
    let mut hasher = DefaultHasher::new();
    doc.to_string().hash(&mut hasher);
    format!("doc:{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn no_refs_is_identity() {
        let doc = json!({
            "type": "object",
            "properties": { "name": { "type": "string" } }
        });
        let resolved = resolve(&doc, &DerefOptions::new()).unwrap();
        assert_eq!(resolved, doc);
    }

    #[test]
    fn local_ref_substituted() {
        let doc = json!({
            "a": { "$ref": "#/b" },
            "b": { "type": "string" }
        });
        let resolved = resolve(&doc, &DerefOptions::new()).unwrap();
        assert_eq!(
            resolved,
            json!({
                "a": { "type": "string" },
                "b": { "type": "string" }
            })
        );
    }

    #[test]
    fn input_document_is_not_mutated() {
        let doc = json!({
            "a": { "$ref": "#/b" },
            "b": { "type": "string" }
        });
        let before = doc.clone();
        let _ = resolve(&doc, &DerefOptions::new()).unwrap();
        assert_eq!(doc, before);
    }

    #[test]
    fn chained_local_refs() {
        let doc = json!({
            "a": { "$ref": "#/b" },
            "b": { "$ref": "#/c" },
            "c": { "type": "number" }
        });
        let resolved = resolve(&doc, &DerefOptions::new()).unwrap();
        assert_eq!(resolved["a"], json!({ "type": "number" }));
        assert_eq!(resolved["b"], json!({ "type": "number" }));
    }

    #[test]
    fn mutual_cycle_fails() {
        let doc = json!({
            "a": { "$ref": "#/b" },
            "b": { "$ref": "#/a" }
        });
        let result = resolve(&doc, &DerefOptions::new());
        assert!(matches!(
            result,
            Err(DerefError::CircularReference { .. })
        ));
    }

    #[test]
    fn root_self_reference_fails() {
        let doc = json!({ "$ref": "#" });
        let result = resolve(&doc, &DerefOptions::new());
        assert!(matches!(
            result,
            Err(DerefError::CircularReference { refs }) if refs == vec!["#".to_string()]
        ));
    }

    #[test]
    fn ref_into_own_subtree_fails() {
        let doc = json!({ "a": { "b": { "$ref": "#/a" } } });
        let result = resolve(&doc, &DerefOptions::new());
        assert!(matches!(
            result,
            Err(DerefError::CircularReference { .. })
        ));
    }

    #[test]
    fn lenient_missing_leaves_ref_intact() {
        let doc = json!({ "$ref": "#/does/not/exist" });
        let resolved = resolve(&doc, &DerefOptions::new()).unwrap();
        assert_eq!(resolved, doc);
    }

    #[test]
    fn strict_missing_errors() {
        let doc = json!({ "$ref": "#/does/not/exist" });
        let result = resolve(&doc, &DerefOptions::new().fail_on_missing(true));
        assert!(matches!(
            result,
            Err(DerefError::MissingReference { reference }) if reference == "#/does/not/exist"
        ));
    }

    #[test]
    fn extra_keys_disable_ref_node() {
        let doc = json!({
            "a": { "$ref": "#/b", "description": "kept?" },
            "b": { "type": "string" }
        });
        // Extra keys alongside $ref mean the node is not a ref node at all
        let resolved = resolve(&doc, &DerefOptions::new()).unwrap();
        assert_eq!(resolved["a"], json!({ "$ref": "#/b", "description": "kept?" }));
    }

    #[test]
    fn merge_mode_keeps_and_overrides_siblings() {
        let doc = json!({
            "a": { "$ref": "#/b", "description": "mine", "extra": 1 },
            "b": { "type": "string", "description": "theirs" }
        });
        let options = DerefOptions::new().merge_additional_properties(true);
        let resolved = resolve(&doc, &options).unwrap();
        assert_eq!(
            resolved["a"],
            json!({ "type": "string", "description": "mine", "extra": 1 })
        );
    }

    #[test]
    fn remove_ids_strips_id() {
        let doc = json!({
            "a": { "$ref": "#/b" },
            "b": { "$id": "b-schema", "type": "string" }
        });
        let options = DerefOptions::new().remove_ids(true);
        let resolved = resolve(&doc, &options).unwrap();
        assert_eq!(resolved["a"], json!({ "type": "string" }));
    }

    #[test]
    fn refs_inside_arrays() {
        let doc = json!({
            "anyOf": [{ "$ref": "#/defs/a" }, { "$ref": "#/defs/b" }],
            "defs": { "a": { "type": "string" }, "b": { "type": "null" } }
        });
        let resolved = resolve(&doc, &DerefOptions::new()).unwrap();
        assert_eq!(resolved["anyOf"][0], json!({ "type": "string" }));
        assert_eq!(resolved["anyOf"][1], json!({ "type": "null" }));
    }

    #[test]
    fn key_containing_hash_above_a_ref() {
        let doc = json!({
            "x#y": { "$ref": "#/b" },
            "b": { "type": "string" }
        });
        let resolved = resolve(&doc, &DerefOptions::new()).unwrap();
        assert_eq!(
            resolved,
            json!({
                "x#y": { "type": "string" },
                "b": { "type": "string" }
            })
        );
    }

    #[test]
    fn key_containing_slash_above_a_ref() {
        let doc = json!({
            "a/b": { "inner": { "$ref": "#/c" } },
            "c": { "type": "number" }
        });
        let resolved = resolve(&doc, &DerefOptions::new()).unwrap();
        assert_eq!(resolved["a/b"]["inner"], json!({ "type": "number" }));
    }

    #[test]
    fn non_string_ref_is_not_a_ref_node() {
        let doc = json!({ "a": { "$ref": 42 } });
        let resolved = resolve(&doc, &DerefOptions::new()).unwrap();
        assert_eq!(resolved, doc);
    }

    #[test]
    fn splice_default_discards_node() {
        let resolved = json!({ "type": "string" });
        let node = json!({ "$ref": "#/b", "x": 1 });
        let out = splice(resolved, &node, &DerefOptions::new());
        assert_eq!(out, json!({ "type": "string" }));
    }

    #[test]
    fn cycle_id_qualifies_local_refs_by_document() {
        let ctx_a = Context {
            cwd: PathBuf::from("/tmp"),
            current: "doc:a".into(),
        };
        let ctx_b = Context {
            cwd: PathBuf::from("/tmp"),
            current: "doc:b".into(),
        };
        // Same pointer in different documents must not collide
        assert_ne!(
            cycle_id(RefKind::Local, "#/x", &ctx_a),
            cycle_id(RefKind::Local, "#/x", &ctx_b)
        );
    }

    #[test]
    fn cycle_id_for_web_is_host_and_path() {
        let ctx = Context {
            cwd: PathBuf::from("/tmp"),
            current: "doc:x".into(),
        };
        assert_eq!(
            cycle_id(RefKind::Web, "https://Example.com/s.json#/a", &ctx),
            Some("example.com/s.json".into())
        );
    }
}
