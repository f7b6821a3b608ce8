//! schemata-types: pure data types shared by the schemata compiler.
//!
//! This crate provides:
//!
//! - **JsonType / TypeSet**: the seven type names of the `type` keyword
//! - **Options**: engine configuration, deserializable from camelCase JSON
//! - **ErrorRecord**: the wire shape of a validation error
//! - **PathSeg**: JSON-pointer segments and escaping

pub mod error;
pub mod options;
pub mod path;
pub mod types;

pub use error::{ErrorRecord, ValidationErrors};
pub use options::{CoerceTypes, ExtendRefs, Options, SchemaId, UnknownFormats};
pub use path::PathSeg;
pub use types::{JsonType, TypeSet, UnknownType};
