//! Error types for compilation, validation and loading.

use std::sync::Arc;

use thiserror::Error;

use schemata_types::ValidationErrors;

use crate::codegen::CodegenError;

/// Failure raised by user keyword code, passed through untouched.
pub type ExtensionError = Box<dyn std::error::Error + Send + Sync>;

/// Schema-definition and resolution failures.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid schema at {path}: {reason}")]
    InvalidSchema { path: String, reason: String },

    #[error("keyword {keyword} has an invalid value: {reason}")]
    InvalidKeywordValue { keyword: String, reason: String },

    #[error("schema with identifier {id:?} already exists and differs")]
    AmbiguousIdentifier { id: String },

    #[error("schema with key {key:?} already exists")]
    DuplicateKey { key: String },

    #[error("unknown keyword {keyword:?} at {path}")]
    UnknownKeyword { keyword: String, path: String },

    #[error("keyword {keyword} cannot apply to type {types}")]
    IncompatibleKeyword { keyword: String, types: String },

    #[error("keyword {keyword} requires keyword {dependency}")]
    MissingKeywordDependency { keyword: String, dependency: String },

    #[error("keyword {keyword} value does not match its schema: {errors}")]
    KeywordSchema { keyword: String, errors: ValidationErrors },

    #[error("unknown format {format:?}")]
    UnknownFormat { format: String },

    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("can't resolve reference {missing_ref} (missing schema {missing_schema:?})")]
    MissingSchema { missing_ref: String, missing_schema: String },

    #[error("reference cycle without intervening keywords: {chain}")]
    RefCycle { chain: String },

    #[error("synchronous schema references async schema {reference}")]
    AsyncRefFromSync { reference: String },

    #[error("macro expansion of {keyword} exceeded depth {limit}")]
    MacroDepthExceeded { keyword: String, limit: usize },

    #[error("cannot register keyword {keyword:?}: {reason}")]
    KeywordRegistration { keyword: String, reason: String },

    #[error("engine state lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error(transparent)]
    Extension(ExtensionError),
}

impl SchemaError {
    pub fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        SchemaError::InvalidSchema {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn keyword_value(keyword: impl Into<String>, reason: impl Into<String>) -> Self {
        SchemaError::InvalidKeywordValue {
            keyword: keyword.into(),
            reason: reason.into(),
        }
    }

    /// The document to fetch before retrying, for `MissingSchema`.
    pub fn missing_schema(&self) -> Option<&str> {
        match self {
            SchemaError::MissingSchema { missing_schema, .. } => Some(missing_schema),
            _ => None,
        }
    }
}

/// A validation run that could not produce a verdict.
///
/// Failing data is not an error: it shows up in
/// [`Validation`](crate::Validation). These cover user keyword failures and
/// runaway recursion.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error(transparent)]
    Extension(ExtensionError),

    #[error("validator call depth exceeded {limit}")]
    DepthExceeded { limit: usize },

    #[error("validator referenced before its compilation finished")]
    Unlinked,
}

/// Outcome of an async validation that did not accept the data.
#[derive(Debug, Error)]
pub enum AsyncValidateError {
    #[error("validation failed: {0}")]
    Invalid(ValidationErrors),

    #[error(transparent)]
    Aborted(#[from] ValidateError),
}

/// Either kind of failure from [`Engine::validate`](crate::Engine::validate),
/// which compiles on first use.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Validate(#[from] ValidateError),
}

/// Failure to fetch a schema document.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("schema {0:?} not found")]
    NotFound(String),

    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {uri}: {source}")]
    Parse {
        uri: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("fetching {uri}: {message}")]
    Fetch { uri: String, message: String },
}

/// Failure of [`Engine::compile_async`](crate::Engine::compile_async).
#[derive(Debug, Error)]
pub enum CompileAsyncError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("loading {uri}: {source}")]
    Load {
        uri: String,
        #[source]
        source: Arc<LoadError>,
    },

    #[error("schema {uri} was loaded but reference {missing_ref} is still unresolved")]
    StillMissing { uri: String, missing_ref: String },
}
