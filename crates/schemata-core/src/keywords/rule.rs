//! A keyword rule and the public definition users register.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use schemata_types::{JsonType, TypeSet};

use super::{CodeFn, CompileFn, CompiledCheck, MacroFn, PredicateFn};
use crate::compiler::KeywordCx;
use crate::error::{ExtensionError, SchemaError};
use crate::validator::Validator;

/// How a keyword does its work.
#[derive(Clone)]
pub enum Implementation {
    Predicate(PredicateFn),
    Compiled(CompileFn),
    Macro(MacroFn),
    Code(CodeFn),
}

impl Implementation {
    pub fn kind(&self) -> &'static str {
        match self {
            Implementation::Predicate(_) => "predicate",
            Implementation::Compiled(_) => "compiled",
            Implementation::Macro(_) => "macro",
            Implementation::Code(_) => "code",
        }
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Implementation::{}", self.kind())
    }
}

/// A user keyword, as passed to [`Engine::add_keyword`](crate::Engine::add_keyword).
///
/// ```no_run
/// use schemata_core::{Engine, KeywordDefinition, Options};
/// use schemata_types::JsonType;
/// use serde_json::json;
///
/// let engine = Engine::new(Options::default());
/// engine.add_keyword(
///     KeywordDefinition::predicate("even", |schema, data, _parent| {
///         let want = schema.as_bool().unwrap_or(false);
///         Ok(!want || data.as_i64().is_some_and(|n| n % 2 == 0))
///     })
///     .for_types([JsonType::Integer])
///     .with_metaschema(json!({ "type": "boolean" })),
/// )?;
/// # Ok::<(), schemata_core::SchemaError>(())
/// ```
#[derive(Debug, Clone)]
pub struct KeywordDefinition {
    pub keyword: String,
    pub types: Option<Vec<JsonType>>,
    pub implementation: Implementation,
    /// Schema the keyword's value must satisfy.
    pub metaschema: Option<Value>,
    /// Keywords that must appear next to this one.
    pub dependencies: Vec<String>,
    /// Message of the default error; `{keyword}` is substituted.
    pub message: Option<String>,
}

impl KeywordDefinition {
    fn new(keyword: impl Into<String>, implementation: Implementation) -> Self {
        Self {
            keyword: keyword.into(),
            types: None,
            implementation,
            metaschema: None,
            dependencies: Vec::new(),
            message: None,
        }
    }

    /// Checked at validation time with `(keyword value, data, parent schema)`.
    pub fn predicate(
        keyword: impl Into<String>,
        f: impl Fn(&Value, &Value, &Value) -> Result<bool, ExtensionError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(keyword, Implementation::Predicate(Arc::new(f)))
    }

    /// Specialized at compile time, once per distinct keyword value.
    pub fn compiled(
        keyword: impl Into<String>,
        f: impl Fn(&Value, &Value) -> Result<CompiledCheck, ExtensionError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(keyword, Implementation::Compiled(Arc::new(f)))
    }

    /// Rewritten into another schema before compilation.
    pub fn rewrite(
        keyword: impl Into<String>,
        f: impl Fn(&Value, &Value) -> Result<Value, ExtensionError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(keyword, Implementation::Macro(Arc::new(f)))
    }

    /// Emits its own instructions.
    pub fn code(
        keyword: impl Into<String>,
        f: impl Fn(&mut KeywordCx<'_, '_>) -> Result<(), SchemaError> + Send + Sync + 'static,
    ) -> Self {
        Self::new(keyword, Implementation::Code(Arc::new(f)))
    }

    pub fn for_types(mut self, types: impl IntoIterator<Item = JsonType>) -> Self {
        self.types = Some(types.into_iter().collect());
        self
    }

    pub fn with_metaschema(mut self, metaschema: Value) -> Self {
        self.metaschema = Some(metaschema);
        self
    }

    pub fn with_dependencies<S: Into<String>>(mut self, deps: impl IntoIterator<Item = S>) -> Self {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

pub(crate) const DEFAULT_MESSAGE: &str = "must pass \"{keyword}\" keyword validation";

/// A registered keyword.
#[derive(Debug, Clone)]
pub struct Rule {
    pub keyword: String,
    /// Types the keyword applies to; `None` applies to every value.
    pub types: Option<TypeSet>,
    pub implementation: Implementation,
    pub metaschema: Option<Arc<Validator>>,
    pub dependencies: Vec<String>,
    pub message: String,
    /// Sibling keywords this rule also handles, such as `then` for `if`.
    pub implements: Vec<String>,
}

impl Rule {
    pub(crate) fn builtin(
        keyword: &str,
        ty: Option<JsonType>,
        code: fn(&mut KeywordCx<'_, '_>) -> Result<(), SchemaError>,
    ) -> Self {
        Self {
            keyword: keyword.to_string(),
            types: ty.map(TypeSet::single),
            implementation: Implementation::Code(Arc::new(code)),
            metaschema: None,
            dependencies: Vec::new(),
            message: DEFAULT_MESSAGE.to_string(),
            implements: Vec::new(),
        }
    }

    pub(crate) fn implementing(mut self, keywords: &[&str]) -> Self {
        self.implements = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    pub(crate) fn from_definition(def: KeywordDefinition, metaschema: Option<Arc<Validator>>) -> Self {
        Self {
            keyword: def.keyword,
            types: def.types.map(|types| types.into_iter().collect()),
            implementation: def.implementation,
            metaschema,
            dependencies: def.dependencies,
            message: def.message.unwrap_or_else(|| DEFAULT_MESSAGE.to_string()),
            implements: Vec::new(),
        }
    }

    /// Whether a schema object triggers this rule.
    pub fn applies(&self, schema: &Map<String, Value>) -> bool {
        schema.contains_key(&self.keyword) || self.implements.iter().any(|k| schema.contains_key(k))
    }

    pub fn is_macro(&self) -> bool {
        matches!(self.implementation, Implementation::Macro(_))
    }

    /// Check a keyword value against the rule's metaschema.
    pub(crate) fn check_value(&self, value: &Value) -> Result<(), SchemaError> {
        let Some(meta) = &self.metaschema else {
            return Ok(());
        };
        let validation = meta.check(value).map_err(|e| SchemaError::Extension(Box::new(e)))?;
        validation.into_result().map_err(|errors| SchemaError::KeywordSchema {
            keyword: self.keyword.clone(),
            errors,
        })
    }
}
