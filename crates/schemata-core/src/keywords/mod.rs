//! Keyword rules: the registry, the extension ABI and the built-in set.
//!
//! Every keyword is a [`Rule`] with exactly one [`Implementation`]:
//!
//! - **Predicate**: `(schema, data, parent) -> bool`, called at validation time
//! - **Compiled**: `(schema, parent) -> check`, called once per distinct
//!   keyword value at compile time; the check runs at validation time
//! - **Macro**: `(schema, parent) -> schema`, a rewrite applied before
//!   compilation
//! - **Code**: emits IR through a [`KeywordCx`](crate::compiler::KeywordCx)
//!
//! Built-in keywords are `Code` rules.

pub mod builtin;
pub mod format;
pub mod registry;
pub mod rule;
pub mod shape;

use std::sync::Arc;

use serde_json::Value;

use crate::compiler::KeywordCx;
use crate::error::{ExtensionError, SchemaError};

pub use format::{Format, FormatCheck, FormatSource, Formats};
pub use registry::{KeywordRegistry, RuleGroup};
pub use rule::{Implementation, KeywordDefinition, Rule};

/// `(keyword value, data, parent schema) -> valid`.
pub type PredicateFn = Arc<dyn Fn(&Value, &Value, &Value) -> Result<bool, ExtensionError> + Send + Sync>;

/// A check specialized for one keyword value.
pub type CompiledCheck = Arc<dyn Fn(&Value) -> Result<bool, ExtensionError> + Send + Sync>;

/// `(keyword value, parent schema) -> check`.
pub type CompileFn = Arc<dyn Fn(&Value, &Value) -> Result<CompiledCheck, ExtensionError> + Send + Sync>;

/// `(keyword value, parent schema) -> replacement schema`.
pub type MacroFn = Arc<dyn Fn(&Value, &Value) -> Result<Value, ExtensionError> + Send + Sync>;

/// Emits the keyword's logic.
pub type CodeFn = Arc<dyn Fn(&mut KeywordCx<'_, '_>) -> Result<(), SchemaError> + Send + Sync>;

/// Keywords that carry no validation logic of their own.
pub const ANNOTATIONS: &[&str] = &[
    "$schema",
    "$id",
    "id",
    "$comment",
    "$async",
    "title",
    "description",
    "default",
    "definitions",
    "$defs",
    "examples",
    "readOnly",
    "writeOnly",
    "contentMediaType",
    "contentEncoding",
];
