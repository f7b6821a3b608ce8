//! The validator factory.
//!
//! An [`Engine`] owns everything compilation needs: the registered schema
//! documents, the keyword registry, the format table and the cache of
//! compiled artifacts. Options are fixed at construction.
//!
//! ```
//! use schemata_core::{Engine, Options};
//! use serde_json::json;
//!
//! let engine = Engine::new(Options::default());
//! let validator = engine.compile(json!({ "type": "integer", "minimum": 5 }))?;
//! assert!(validator.is_valid(&json!(5))?);
//! let result = validator.check(&json!(4))?;
//! assert_eq!(result.errors()[0].keyword, "minimum");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::debug;

use schemata_types::{ErrorRecord, Options, ValidationErrors};

use crate::compiler::{CompileCache, Compiler};
use crate::error::{CompileAsyncError, Error, SchemaError};
use crate::keywords::shape::check_schema;
use crate::keywords::{Format, Formats, KeywordDefinition, KeywordRegistry, Rule};
use crate::loader::{Fetches, Loader};
use crate::resolver::{Resolver, SchemaEnv};
use crate::uri;
use crate::validator::{Validation, Validator};

/// Compiles schemas into [`Validator`]s and keeps them.
pub struct Engine {
    opts: Options,
    state: Mutex<State>,
    loader: Option<Arc<dyn Loader>>,
    fetches: Fetches,
}

struct State {
    resolver: Resolver,
    keywords: KeywordRegistry,
    formats: Formats,
    cache: CompileCache,
}

impl State {
    fn compile(&mut self, opts: &Options, env: &SchemaEnv) -> Result<Arc<Validator>, SchemaError> {
        if let Some(validator) = self.cache.get(env) {
            debug!(schema = %env, "validator cache hit");
            return Ok(validator);
        }
        let State {
            resolver,
            keywords,
            formats,
            cache,
        } = self;
        Compiler::new(opts, keywords, formats, resolver, cache).compile(env)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Engine {
    /// An engine with the built-in keywords and an empty format table.
    pub fn new(opts: Options) -> Self {
        Self {
            state: Mutex::new(State {
                resolver: Resolver::new(opts.schema_id),
                keywords: KeywordRegistry::new(),
                formats: Formats::new(),
                cache: CompileCache::default(),
            }),
            opts,
            loader: None,
            fetches: Fetches::new(),
        }
    }

    /// Fetch missing documents through `loader` in
    /// [`compile_async`](Engine::compile_async).
    pub fn with_loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, SchemaError> {
        self.state.lock().map_err(|_| SchemaError::LockPoisoned)
    }

    /// Register a document for later `$ref`s and lookups, under `key` and
    /// under its own identifier. Compilation is deferred to first use.
    pub fn add_schema(&self, schema: Value, key: Option<&str>) -> Result<(), SchemaError> {
        self.validate_schema(&schema)?;
        let mut state = self.state()?;
        let env = state.resolver.register(schema, key)?;
        debug!(key, id = %env.doc.id, "added schema");
        Ok(())
    }

    /// Compile a schema, reusing the artifact when the same schema was
    /// compiled before.
    pub fn compile(&self, schema: Value) -> Result<Arc<Validator>, SchemaError> {
        self.validate_schema(&schema)?;
        let mut state = self.state()?;
        let env = state.resolver.register_anonymous(schema)?;
        state.compile(&self.opts, &env)
    }

    /// Compile a schema, fetching documents it references but the engine
    /// lacks through the loader, then retrying.
    pub async fn compile_async(&self, schema: Value) -> Result<Arc<Validator>, CompileAsyncError> {
        let mut loaded: Vec<String> = Vec::new();
        loop {
            let err = match self.compile(schema.clone()) {
                Ok(validator) => return Ok(validator),
                Err(err) => err,
            };
            let missing = match &err {
                SchemaError::MissingSchema {
                    missing_ref,
                    missing_schema,
                } if !missing_schema.is_empty() => Some((missing_ref.clone(), missing_schema.clone())),
                _ => None,
            };
            let (Some((missing_ref, uri)), Some(loader)) = (missing, &self.loader) else {
                return Err(err.into());
            };
            if loaded.contains(&uri) {
                return Err(CompileAsyncError::StillMissing { uri, missing_ref });
            }

            debug!(uri = %uri, missing_ref = %missing_ref, "compilation waits on schema");
            let schema = self
                .fetches
                .fetch(loader.as_ref(), &uri)
                .await
                .map_err(|source| CompileAsyncError::Load {
                    uri: uri.clone(),
                    source,
                })?;
            if !self.has_schema(&uri)? {
                self.add_schema(Value::clone(&schema), Some(&uri))?;
            }
            loaded.push(uri);
        }
    }

    /// The validator for a registered document or identified node,
    /// compiled on first request.
    pub fn get_schema(&self, key: &str) -> Result<Option<Arc<Validator>>, SchemaError> {
        let mut state = self.state()?;
        let Some(env) = state.resolver.get(key) else {
            return Ok(None);
        };
        state.compile(&self.opts, &env).map(Some)
    }

    pub fn has_schema(&self, key: &str) -> Result<bool, SchemaError> {
        Ok(self.state()?.resolver.contains(key))
    }

    /// Keys and identifiers of registered documents.
    pub fn schema_ids(&self) -> Result<Vec<String>, SchemaError> {
        let state = self.state()?;
        let mut ids: Vec<String> = state.resolver.ids().map(str::to_string).collect();
        ids.sort();
        Ok(ids)
    }

    /// Forget a document and the artifacts compiled from it. Validators
    /// already handed out keep working.
    pub fn remove_schema(&self, key: &str) -> Result<bool, SchemaError> {
        let mut state = self.state()?;
        let Some(doc) = state.resolver.remove(key) else {
            return Ok(false);
        };
        state.cache.purge(&doc);
        Ok(true)
    }

    /// Forget a schema passed to [`compile`](Engine::compile).
    pub fn remove_compiled(&self, schema: &Value) -> Result<bool, SchemaError> {
        let mut state = self.state()?;
        let id = schema
            .as_object()
            .and_then(|map| state.resolver.id_of(map))
            .map(|id| uri::resolve("", id));
        let doc = match id {
            Some(id) => state.resolver.remove(&id),
            None => state.resolver.remove_anonymous(schema),
        };
        let Some(doc) = doc else {
            return Ok(false);
        };
        state.cache.purge(&doc);
        Ok(true)
    }

    /// Validate `data` against the registered schema `key`.
    pub fn validate(&self, key: &str, data: &mut Value) -> Result<Validation, Error> {
        let validator = self.get_schema(key)?.ok_or_else(|| SchemaError::MissingSchema {
            missing_ref: key.to_string(),
            missing_schema: key.to_string(),
        })?;
        Ok(validator.validate(data)?)
    }

    /// Check that `schema` is well formed.
    pub fn validate_schema(&self, schema: &Value) -> Result<(), SchemaError> {
        check_schema(schema).map_err(|err| SchemaError::invalid(err.path, err.reason))
    }

    /// Register a user keyword. A metaschema, when given, must itself be a
    /// valid schema; keyword values are checked against it at compile time.
    pub fn add_keyword(&self, def: KeywordDefinition) -> Result<(), SchemaError> {
        let keyword = def.keyword.clone();
        let reject = |reason: String| SchemaError::KeywordRegistration {
            keyword: keyword.clone(),
            reason,
        };
        let metaschema = match &def.metaschema {
            None => None,
            Some(meta) => {
                self.validate_schema(meta)
                    .map_err(|err| reject(format!("invalid metaschema: {err}")))?;
                let validator = self
                    .compile(meta.clone())
                    .map_err(|err| reject(format!("metaschema does not compile: {err}")))?;
                Some(validator)
            }
        };
        self.state()?
            .keywords
            .register(Rule::from_definition(def, metaschema))
    }

    pub fn remove_keyword(&self, keyword: &str) -> Result<bool, SchemaError> {
        Ok(self.state()?.keywords.remove(keyword).is_some())
    }

    /// Install a format for the `format` keyword, replacing any previous
    /// one of the same name. Affects schemas compiled afterwards.
    pub fn add_format(&self, name: impl Into<String>, format: Format) -> Result<(), SchemaError> {
        self.state()?.formats.insert(name, format);
        Ok(())
    }

    /// `data/a must be >= 5, data must have required property 'b'`.
    pub fn errors_text(errors: &[ErrorRecord]) -> String {
        ValidationErrors::new(errors.to_vec()).text(", ")
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Engine");
        s.field("options", &self.opts);
        if let Ok(state) = self.state.lock() {
            s.field("schemas", &state.resolver.ids().count())
                .field("compiled", &state.cache.len());
        }
        s.field("loader", &self.loader.is_some()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compiling_twice_reuses_the_artifact() {
        let engine = Engine::default();
        let a = engine.compile(json!({ "type": "string" })).expect("compile");
        let b = engine.compile(json!({ "type": "string" })).expect("compile");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn validates_by_key() {
        let engine = Engine::default();
        engine
            .add_schema(json!({ "required": ["id"] }), Some("thing"))
            .expect("add");
        let result = engine.validate("thing", &mut json!({})).expect("validate");
        assert!(!result.is_valid());
        assert_eq!(result.errors()[0].params["missingProperty"], json!("id"));
        assert!(matches!(
            engine.validate("other", &mut json!({})),
            Err(Error::Schema(SchemaError::MissingSchema { .. }))
        ));
    }

    #[test]
    fn removing_a_schema_drops_its_artifacts() {
        let engine = Engine::default();
        engine
            .add_schema(json!({ "$id": "http://example.com/a", "type": "integer" }), None)
            .expect("add");
        let first = engine.get_schema("http://example.com/a").expect("get").expect("present");
        assert!(engine.remove_schema("http://example.com/a").expect("remove"));
        assert!(engine.get_schema("http://example.com/a").expect("get").is_none());
        assert!(first.is_valid(&json!(1)).expect("still runs"));

        engine
            .add_schema(json!({ "$id": "http://example.com/a", "type": "string" }), None)
            .expect("re-add after removal");
        let second = engine.get_schema("http://example.com/a").expect("get").expect("present");
        assert!(second.is_valid(&json!("x")).expect("run"));
    }

    #[test]
    fn malformed_schemas_are_rejected_up_front() {
        let engine = Engine::default();
        let err = engine.compile(json!({ "minLength": -1 })).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidSchema { ref path, .. } if path == "/minLength"), "{err}");
    }

    #[test]
    fn keyword_metaschema_must_be_a_schema() {
        let engine = Engine::default();
        let err = engine
            .add_keyword(KeywordDefinition::predicate("even", |_, _, _| Ok(true)).with_metaschema(json!(5)))
            .unwrap_err();
        assert!(matches!(err, SchemaError::KeywordRegistration { ref keyword, .. } if keyword == "even"));
    }

    #[test]
    fn errors_text_joins_messages() {
        let engine = Engine::new(Options::all_errors());
        let validator = engine
            .compile(json!({
                "properties": { "a": { "minimum": 5 } },
                "required": ["b"]
            }))
            .expect("compile");
        let result = validator.check(&json!({ "a": 1 })).expect("run");
        assert_eq!(
            Engine::errors_text(result.errors()),
            "data must have required property 'b', data/a must be >= 5"
        );
        assert_eq!(Engine::errors_text(&[]), "No errors");
    }
}
