//! Schema identity and reference resolution.
//!
//! The resolver owns every registered document. Registration walks the
//! document's schema positions and indexes each nested identifier (`$id`,
//! or `id` for draft-04 documents) and plain-name anchor under its full
//! URI. References resolve against a base identifier; a JSON-pointer
//! fragment is then walked token by token, re-basing at each schema node
//! that declares an identifier. Tokens below a value keyword (`enum`,
//! `const`, `default`, ...) never re-base, since what lies there is data,
//! not schema.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use schemata_types::path::{escape_token, split_pointer};
use schemata_types::SchemaId;

use crate::error::SchemaError;
use crate::uri;
use crate::vm::equal::equal;

/// A registered root document.
#[derive(Debug)]
pub struct SchemaDoc {
    /// Canonical identifier; empty for anonymous documents.
    pub id: String,
    pub schema: Value,
}

/// A schema node in context: document, JSON pointer and base identifier.
///
/// Two environments are the same compilation unit when they share the
/// document instance, the pointer and the base.
#[derive(Debug, Clone)]
pub struct SchemaEnv {
    pub doc: Arc<SchemaDoc>,
    pub pointer: String,
    pub base_id: String,
}

/// Memoization key of a [`SchemaEnv`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvKey {
    doc: usize,
    pointer: String,
    base_id: String,
}

impl EnvKey {
    pub fn belongs_to(&self, doc: &Arc<SchemaDoc>) -> bool {
        self.doc == Arc::as_ptr(doc) as usize
    }
}

impl SchemaEnv {
    fn root(doc: Arc<SchemaDoc>) -> Self {
        let base_id = doc.id.clone();
        Self {
            doc,
            pointer: String::new(),
            base_id,
        }
    }

    pub fn node(&self) -> Option<&Value> {
        self.doc.schema.pointer(&self.pointer)
    }

    pub fn key(&self) -> EnvKey {
        EnvKey {
            doc: Arc::as_ptr(&self.doc) as usize,
            pointer: self.pointer.clone(),
            base_id: self.base_id.clone(),
        }
    }
}

impl fmt::Display for SchemaEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.doc.id, self.pointer)
    }
}

/// What a JSON value is, seen from the schema grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Schema,
    /// `items`: a schema or an array of schemas.
    SchemaOrArray,
    SchemaArray,
    SchemaMap,
    Value,
}

fn position(keyword: &str) -> Position {
    match keyword {
        "items" => Position::SchemaOrArray,
        "additionalItems" | "additionalProperties" | "propertyNames" | "contains" | "not" | "if" | "then"
        | "else" => Position::Schema,
        "allOf" | "anyOf" | "oneOf" => Position::SchemaArray,
        "properties" | "patternProperties" | "definitions" | "$defs" | "dependencies" => Position::SchemaMap,
        _ => Position::Value,
    }
}

/// Position of `child`, reached from a value at `from` through `token`.
fn step(from: Position, token: &str, child: &Value) -> Position {
    match from {
        Position::Schema => match position(token) {
            Position::SchemaOrArray if child.is_array() => Position::SchemaArray,
            Position::SchemaOrArray => Position::Schema,
            other => other,
        },
        Position::SchemaArray | Position::SchemaMap => Position::Schema,
        Position::SchemaOrArray | Position::Value => Position::Value,
    }
}

#[derive(Debug, Clone)]
struct Location {
    doc: Arc<SchemaDoc>,
    pointer: String,
    base_id: String,
}

impl Location {
    fn env(&self) -> SchemaEnv {
        SchemaEnv {
            doc: self.doc.clone(),
            pointer: self.pointer.clone(),
            base_id: self.base_id.clone(),
        }
    }

    fn node(&self) -> Option<&Value> {
        self.doc.schema.pointer(&self.pointer)
    }
}

/// An identifier found while indexing a document.
struct Found {
    uri: String,
    pointer: String,
    base_id: String,
}

/// Known documents and their identifier index.
#[derive(Debug)]
pub struct Resolver {
    schema_id: SchemaId,
    docs: HashMap<String, Arc<SchemaDoc>>,
    index: HashMap<String, Location>,
    anonymous: HashMap<String, Arc<SchemaDoc>>,
}

impl Resolver {
    pub fn new(schema_id: SchemaId) -> Self {
        Self {
            schema_id,
            docs: HashMap::new(),
            index: HashMap::new(),
            anonymous: HashMap::new(),
        }
    }

    /// The identifier a schema object declares, if any.
    pub fn id_of<'v>(&self, map: &'v Map<String, Value>) -> Option<&'v str> {
        self.schema_id
            .keywords()
            .iter()
            .find_map(|kw| map.get(*kw).and_then(Value::as_str))
    }

    /// Register a document, optionally under a caller-chosen key.
    ///
    /// Registering a document equal to the one already held under the same
    /// key or identifier returns the existing document.
    pub fn register(&mut self, schema: Value, key: Option<&str>) -> Result<SchemaEnv, SchemaError> {
        let key = key.map(uri::normalize_id).filter(|k| !k.is_empty());
        let declared = schema
            .as_object()
            .and_then(|map| self.id_of(map))
            .map(|id| uri::resolve(key.as_deref().unwrap_or(""), id))
            .filter(|id| !id.is_empty());
        let id = declared.clone().or_else(|| key.clone()).unwrap_or_default();

        if let Some(key) = &key {
            if let Some(existing) = self.docs.get(key) {
                if existing.id == id && equal(&existing.schema, &schema) {
                    return Ok(SchemaEnv::root(existing.clone()));
                }
                return Err(SchemaError::DuplicateKey { key: key.clone() });
            }
        }
        if let Some(declared) = &declared {
            let existing = self
                .docs
                .get(declared)
                .map(|doc| &doc.schema)
                .or_else(|| self.index.get(declared).and_then(Location::node));
            if let Some(existing) = existing {
                if !equal(existing, &schema) {
                    return Err(SchemaError::AmbiguousIdentifier { id: declared.clone() });
                }
                if let (Some(key), Some(doc)) = (&key, self.docs.get(declared).cloned()) {
                    self.docs.insert(key.clone(), doc);
                }
                if let Some(env) = self.get(declared) {
                    return Ok(env);
                }
            }
        }

        let doc = Arc::new(SchemaDoc { id, schema });
        let found = self.collect(&doc)?;

        if !doc.id.is_empty() {
            self.docs.insert(doc.id.clone(), doc.clone());
        }
        if let Some(key) = key {
            self.docs.insert(key, doc.clone());
        }
        let nested = found.len();
        for entry in found {
            self.index.insert(
                entry.uri,
                Location {
                    doc: doc.clone(),
                    pointer: entry.pointer,
                    base_id: entry.base_id,
                },
            );
        }
        debug!(id = %doc.id, nested, "registered schema");
        Ok(SchemaEnv::root(doc))
    }

    /// Register a schema given without a key. Schemas without an identifier
    /// are deduplicated by content.
    pub fn register_anonymous(&mut self, schema: Value) -> Result<SchemaEnv, SchemaError> {
        let has_id = schema.as_object().and_then(|map| self.id_of(map)).is_some();
        if has_id {
            return self.register(schema, None);
        }
        let text = schema.to_string();
        if let Some(doc) = self.anonymous.get(&text) {
            return Ok(SchemaEnv::root(doc.clone()));
        }
        let env = self.register(schema, None)?;
        self.anonymous.insert(text, env.doc.clone());
        Ok(env)
    }

    /// Index nested identifiers, rejecting conflicting claims.
    fn collect(&self, doc: &Arc<SchemaDoc>) -> Result<Vec<Found>, SchemaError> {
        let mut found = Vec::new();
        self.walk_ids(&doc.schema, Position::Schema, String::new(), &doc.id, &mut found);

        let mut local: HashMap<&str, &str> = HashMap::new();
        for entry in &found {
            let node = doc.schema.pointer(&entry.pointer);
            let conflict = |other: Option<&Value>| match (node, other) {
                (Some(a), Some(b)) => !equal(a, b),
                _ => false,
            };
            if let Some(pointer) = local.insert(&entry.uri, &entry.pointer) {
                if conflict(doc.schema.pointer(pointer)) {
                    return Err(SchemaError::AmbiguousIdentifier { id: entry.uri.clone() });
                }
            }
            if entry.pointer.is_empty() && entry.uri == doc.id {
                continue;
            }
            if conflict(self.index.get(&entry.uri).and_then(Location::node))
                || conflict(self.docs.get(&entry.uri).map(|d| &d.schema))
            {
                return Err(SchemaError::AmbiguousIdentifier { id: entry.uri.clone() });
            }
        }
        Ok(found)
    }

    fn walk_ids(&self, node: &Value, at: Position, pointer: String, base: &str, out: &mut Vec<Found>) {
        let mut base = base.to_string();
        if at == Position::Schema {
            if let Some(id) = node.as_object().and_then(|map| self.id_of(map)) {
                let full = uri::resolve(&base, id);
                let (_, fragment) = uri::split_fragment(&full);
                let anchor = !uri::is_pointer_fragment(fragment);
                out.push(Found {
                    uri: full.clone(),
                    pointer: pointer.clone(),
                    base_id: if anchor { base.clone() } else { full.clone() },
                });
                if !anchor {
                    base = full;
                }
            }
        }
        if at == Position::Value {
            return;
        }
        match node {
            Value::Object(map) => {
                for (token, child) in map {
                    let next = step(at, token, child);
                    let child_pointer = format!("{pointer}/{}", escape_token(token));
                    self.walk_ids(child, next, child_pointer, &base, out);
                }
            }
            Value::Array(items) if at == Position::SchemaArray => {
                for (i, child) in items.iter().enumerate() {
                    self.walk_ids(child, Position::Schema, format!("{pointer}/{i}"), &base, out);
                }
            }
            _ => {}
        }
    }

    /// Resolve `reference` against `base`. `current` is the document the
    /// reference appears in, for fragment-only references inside documents
    /// that were never registered by identifier.
    pub fn resolve_ref(
        &self,
        base: &str,
        reference: &str,
        current: Option<&Arc<SchemaDoc>>,
    ) -> Result<SchemaEnv, SchemaError> {
        let full = uri::resolve(base, reference);
        if let Some(location) = self.index.get(&full) {
            return Ok(location.env());
        }
        let (doc_part, fragment) = uri::split_fragment(&full);
        let missing = || SchemaError::MissingSchema {
            missing_ref: full.clone(),
            missing_schema: doc_part.to_string(),
        };

        let start = match current {
            Some(doc) if doc.id == doc_part => SchemaEnv::root(doc.clone()),
            _ => match self.docs.get(doc_part) {
                Some(doc) => SchemaEnv::root(doc.clone()),
                None => self.index.get(doc_part).map(Location::env).ok_or_else(missing)?,
            },
        };
        if fragment.is_empty() {
            return Ok(start);
        }
        if !uri::is_pointer_fragment(fragment) {
            return Err(missing());
        }
        let tokens = split_pointer(&uri::percent_decode(fragment)).ok_or_else(missing)?;
        self.walk_pointer(start, &tokens).ok_or_else(missing)
    }

    fn walk_pointer(&self, start: SchemaEnv, tokens: &[String]) -> Option<SchemaEnv> {
        let mut node = start.node()?;
        let mut at = Position::Schema;
        let mut pointer = start.pointer.clone();
        let mut base_id = start.base_id.clone();
        for token in tokens {
            let child = match node {
                Value::Object(map) => map.get(token)?,
                Value::Array(items) => items.get(token.parse::<usize>().ok()?)?,
                _ => return None,
            };
            at = step(at, token, child);
            pointer.push('/');
            pointer.push_str(&escape_token(token));
            if at == Position::Schema {
                if let Some(id) = child.as_object().and_then(|map| self.id_of(map)) {
                    let full = uri::resolve(&base_id, id);
                    if uri::is_pointer_fragment(uri::split_fragment(&full).1) {
                        base_id = full;
                    }
                }
            }
            node = child;
        }
        Some(SchemaEnv {
            doc: start.doc,
            pointer,
            base_id,
        })
    }

    /// Look up a document by key or identifier, or a node by full URI.
    pub fn get(&self, key: &str) -> Option<SchemaEnv> {
        self.resolve_ref("", key, None).ok()
    }

    pub fn contains(&self, id: &str) -> bool {
        let id = uri::normalize_id(id);
        self.docs.contains_key(&id) || self.index.contains_key(&id)
    }

    /// Forget a document and every identifier it declared.
    pub fn remove(&mut self, key: &str) -> Option<Arc<SchemaDoc>> {
        let key = uri::normalize_id(key);
        let doc = self
            .docs
            .get(&key)
            .cloned()
            .or_else(|| self.index.get(&key).map(|loc| loc.doc.clone()))?;
        self.docs.retain(|_, d| !Arc::ptr_eq(d, &doc));
        self.index.retain(|_, loc| !Arc::ptr_eq(&loc.doc, &doc));
        self.anonymous.retain(|_, d| !Arc::ptr_eq(d, &doc));
        debug!(id = %doc.id, "removed schema");
        Some(doc)
    }

    /// Forget a schema registered without key or identifier.
    pub fn remove_anonymous(&mut self, schema: &Value) -> Option<Arc<SchemaDoc>> {
        self.anonymous.remove(&schema.to_string())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.docs.keys().map(String::as_str)
    }
}

/// Keywords whose values never count against the inlining budget.
const SIMPLE_INLINED: &[&str] = &[
    "type",
    "format",
    "pattern",
    "maxLength",
    "minLength",
    "maxProperties",
    "minProperties",
    "maxItems",
    "minItems",
    "maximum",
    "minimum",
    "uniqueItems",
    "multipleOf",
    "required",
    "enum",
];

/// Whether a referenced schema may be pasted into the referencing validator.
///
/// Without a `limit` any schema free of `$ref` qualifies. With one, the
/// schema's keyword count (nested schemas included) must stay within it.
pub fn inlineable(schema: &Value, limit: Option<usize>) -> bool {
    match limit {
        None => !has_ref(schema),
        Some(limit) => count_keys(schema).is_some_and(|count| count <= limit),
    }
}

fn has_ref(schema: &Value) -> bool {
    match schema {
        Value::Object(map) => map.contains_key("$ref") || map.values().any(has_ref),
        Value::Array(items) => items.iter().any(has_ref),
        _ => false,
    }
}

/// Keyword count, or `None` when a `$ref` makes the cost unbounded.
fn count_keys(schema: &Value) -> Option<usize> {
    let map = match schema {
        Value::Object(map) => map,
        Value::Array(items) => {
            return items.iter().try_fold(0usize, |acc, item| Some(acc + count_keys(item)?));
        }
        _ => return Some(0),
    };
    let mut count = 0usize;
    for (key, value) in map {
        if key == "$ref" {
            return None;
        }
        count += 1;
        if SIMPLE_INLINED.contains(&key.as_str()) {
            continue;
        }
        if value.is_object() || value.is_array() {
            count += count_keys(value)?;
        }
    }
    Some(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolver() -> Resolver {
        Resolver::new(SchemaId::Auto)
    }

    #[test]
    fn registers_and_resolves_pointers() {
        let mut r = resolver();
        let env = r
            .register(
                json!({
                    "$id": "http://example.com/root.json",
                    "definitions": { "a": { "type": "integer" } }
                }),
                None,
            )
            .expect("register");
        assert_eq!(env.base_id, "http://example.com/root.json");

        let target = r
            .resolve_ref(&env.base_id, "#/definitions/a", Some(&env.doc))
            .expect("resolve");
        assert_eq!(target.pointer, "/definitions/a");
        assert_eq!(target.node(), Some(&json!({ "type": "integer" })));
    }

    #[test]
    fn nested_ids_rebase_and_index() {
        let mut r = resolver();
        r.register(
            json!({
                "$id": "http://x.y/root.json",
                "definitions": {
                    "item": {
                        "$id": "item.json",
                        "definitions": { "n": { "type": "number" } }
                    }
                }
            }),
            None,
        )
        .expect("register");

        let item = r.resolve_ref("", "http://x.y/item.json", None).expect("item");
        assert_eq!(item.pointer, "/definitions/item");
        assert_eq!(item.base_id, "http://x.y/item.json");

        let n = r
            .resolve_ref("http://x.y/item.json", "#/definitions/n", None)
            .expect("n");
        assert_eq!(n.pointer, "/definitions/item/definitions/n");

        // Walking from the root re-bases at the nested identifier.
        let via_root = r
            .resolve_ref("http://x.y/root.json", "#/definitions/item/definitions/n", None)
            .expect("via root");
        assert_eq!(via_root.base_id, "http://x.y/item.json");
    }

    #[test]
    fn values_do_not_rescope() {
        let mut r = resolver();
        r.register(
            json!({
                "$id": "http://x.y/root.json",
                "enum": [{ "$id": "http://x.y/fake.json" }]
            }),
            None,
        )
        .expect("register");
        assert!(!r.contains("http://x.y/fake.json"));
        let inside = r.resolve_ref("http://x.y/root.json", "#/enum/0", None).expect("value");
        assert_eq!(inside.base_id, "http://x.y/root.json");
    }

    #[test]
    fn anchors_resolve() {
        let mut r = resolver();
        r.register(
            json!({
                "$id": "http://x.y/root.json",
                "definitions": { "a": { "$id": "#foo", "type": "string" } }
            }),
            None,
        )
        .expect("register");
        let env = r.resolve_ref("http://x.y/root.json", "#foo", None).expect("anchor");
        assert_eq!(env.pointer, "/definitions/a");
        assert_eq!(env.base_id, "http://x.y/root.json");
    }

    #[test]
    fn reregistration_is_idempotent() {
        let mut r = resolver();
        let a = r.register(json!({ "$id": "A", "type": "string" }), None).expect("first");
        let b = r.register(json!({ "$id": "A", "type": "string" }), None).expect("second");
        assert!(Arc::ptr_eq(&a.doc, &b.doc));
    }

    #[test]
    fn conflicting_identifiers_are_rejected() {
        let mut r = resolver();
        r.register(json!({ "$id": "A", "type": "string" }), None).expect("first");
        let err = r.register(json!({ "$id": "A", "type": "number" }), None).unwrap_err();
        assert!(matches!(err, SchemaError::AmbiguousIdentifier { id } if id == "A"));

        let err = r
            .register(
                json!({
                    "definitions": {
                        "x": { "$id": "http://dup/", "type": "string" },
                        "y": { "$id": "http://dup/", "type": "number" }
                    }
                }),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, SchemaError::AmbiguousIdentifier { .. }));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut r = resolver();
        r.register(json!({ "type": "string" }), Some("k")).expect("first");
        let err = r.register(json!({ "type": "number" }), Some("k")).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateKey { key } if key == "k"));
    }

    #[test]
    fn missing_documents_name_the_document() {
        let r = resolver();
        let err = r.resolve_ref("http://x.y/root.json", "defs.json#/a", None).unwrap_err();
        match err {
            SchemaError::MissingSchema {
                missing_ref,
                missing_schema,
            } => {
                assert_eq!(missing_ref, "http://x.y/defs.json#/a");
                assert_eq!(missing_schema, "http://x.y/defs.json");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn percent_encoded_pointers() {
        let mut r = resolver();
        let env = r
            .register(json!({ "definitions": { "a b": { "type": "null" }, "c/d": true } }), None)
            .expect("register");
        let spaced = r.resolve_ref("", "#/definitions/a%20b", Some(&env.doc)).expect("space");
        assert_eq!(spaced.node(), Some(&json!({ "type": "null" })));
        let slashed = r.resolve_ref("", "#/definitions/c~1d", Some(&env.doc)).expect("slash");
        assert_eq!(slashed.pointer, "/definitions/c~1d");
    }

    #[test]
    fn removal_forgets_nested_ids() {
        let mut r = resolver();
        r.register(
            json!({ "$id": "http://a/", "definitions": { "b": { "$id": "http://b/" } } }),
            None,
        )
        .expect("register");
        assert!(r.contains("http://b/"));
        assert!(r.remove("http://a/").is_some());
        assert!(!r.contains("http://b/"));
    }

    #[test]
    fn inlining_budget() {
        assert!(inlineable(&json!({ "type": "string", "minLength": 1 }), None));
        assert!(!inlineable(&json!({ "items": { "$ref": "#" } }), None));
        assert!(inlineable(&json!({ "type": "integer", "enum": [1, 2, 3] }), Some(2)));
        assert!(!inlineable(&json!({ "properties": { "a": {}, "b": {} } }), Some(2)));
        assert!(!inlineable(&json!({ "not": { "$ref": "#" } }), Some(100)));
        assert!(inlineable(&json!(true), Some(0)));
    }
}
