//! schemata-core: compiles JSON Schemas into reusable validators.
//!
//! This crate provides:
//!
//! - **Resolver**: schema identity, `$id`/`$ref` resolution, JSON pointers
//! - **Keywords**: the rule registry, built-in keywords and the extension
//!   ABI (predicate, compiled, macro and code-emitting keywords)
//! - **Codegen**: the instruction tree, its builder, optimizer and renderer
//! - **Compiler**: walks a schema and emits one program per schema node
//! - **Validator**: the compiled artifact, run by a small interpreter
//! - **Engine**: the factory owning all of the above
//! - **Loader**: async fetching of missing documents

pub mod codegen;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod keywords;
pub mod loader;
pub mod resolver;
pub mod uri;
pub mod validator;
pub mod vm;

pub use compiler::{KeywordCx, KeywordError, Sub};
pub use engine::Engine;
pub use error::{
    AsyncValidateError, CompileAsyncError, Error, ExtensionError, LoadError, SchemaError, ValidateError,
};
pub use keywords::{Format, FormatSource, Formats, KeywordDefinition, KeywordRegistry};
pub use loader::{DirLoader, Loader};
pub use validator::{Validation, Validator};

pub use schemata_types::{
    CoerceTypes, ErrorRecord, ExtendRefs, JsonType, Options, SchemaId, TypeSet, UnknownFormats,
    ValidationErrors,
};
