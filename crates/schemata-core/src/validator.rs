//! The compiled validator artifact.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use serde_json::Value;
use tracing::trace;

use schemata_types::{ErrorRecord, Options, ValidationErrors};

use crate::codegen::Program;
use crate::error::{AsyncValidateError, ValidateError};
use crate::vm::{self, Abort};

/// Handle to a validator that may still be compiling.
///
/// Recursive schemas link to themselves through this cell before their own
/// compilation finishes; it is filled exactly once, before the top-level
/// compile returns.
pub type Link = OnceLock<Arc<Validator>>;

/// A compiled schema.
///
/// Calling [`validate`](Validator::validate) is safe from many threads. The
/// errors of each call come back in its [`Validation`]; the shared
/// [`errors`](Validator::errors) slot only mirrors the most recent call.
pub struct Validator {
    program: Program,
    schema: Value,
    is_async: bool,
    source: Option<String>,
    max_call_depth: usize,
    mutates: bool,
    last_errors: Mutex<Option<Vec<ErrorRecord>>>,
}

/// Result of one validation run.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    valid: bool,
    errors: Vec<ErrorRecord>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn into_errors(self) -> ValidationErrors {
        ValidationErrors::new(self.errors)
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.valid {
            Ok(())
        } else {
            Err(self.into_errors())
        }
    }
}

impl Validator {
    pub(crate) fn new(program: Program, schema: Value, is_async: bool, source: Option<String>, opts: &Options) -> Self {
        Self {
            program,
            schema,
            is_async,
            source,
            max_call_depth: opts.max_call_depth,
            mutates: opts.mutates_data(),
            last_errors: Mutex::new(None),
        }
    }

    pub(crate) fn program(&self) -> &Program {
        &self.program
    }

    /// The schema node this validator was compiled from.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Whether the schema is marked `$async`.
    pub fn is_async(&self) -> bool {
        self.is_async
    }

    /// Rendered program text, when compiled with `keepSource`.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Validate `data`, applying coercion, defaults and property removal in
    /// place when the engine enables them.
    pub fn validate(&self, data: &mut Value) -> Result<Validation, ValidateError> {
        let mut errors = Vec::new();
        let valid = match vm::run(&self.program, data, &[], &mut errors, 0, self.max_call_depth) {
            Ok(valid) => valid,
            Err(Abort::Thrown(thrown)) => {
                errors.extend(thrown);
                false
            }
            Err(Abort::Extension(err)) => return Err(ValidateError::Extension(err)),
            Err(Abort::Depth(limit)) => return Err(ValidateError::DepthExceeded { limit }),
            Err(Abort::Unlinked) => return Err(ValidateError::Unlinked),
        };
        trace!(valid, errors = errors.len(), "validated");
        self.store_errors(&errors);
        Ok(Validation { valid, errors })
    }

    /// Validate a copy of `data`. Coercions and defaults land on the copy,
    /// which is discarded.
    pub fn check(&self, data: &Value) -> Result<Validation, ValidateError> {
        let mut copy = data.clone();
        self.validate(&mut copy)
    }

    pub fn is_valid(&self, data: &Value) -> Result<bool, ValidateError> {
        Ok(self.check(data)?.is_valid())
    }

    /// Validate and hand back the (possibly rewritten) data, or the errors.
    pub async fn validate_async(&self, mut data: Value) -> Result<Value, AsyncValidateError> {
        let validation = self.validate(&mut data)?;
        match validation.into_result() {
            Ok(()) => Ok(data),
            Err(errors) => Err(AsyncValidateError::Invalid(errors)),
        }
    }

    /// Errors of the most recent call, shared by all callers.
    pub fn errors(&self) -> Option<Vec<ErrorRecord>> {
        self.last_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether validation may write to the data.
    pub fn mutates_data(&self) -> bool {
        self.mutates
    }

    fn store_errors(&self, errors: &[ErrorRecord]) {
        let mut slot = self.last_errors.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = if errors.is_empty() {
            None
        } else {
            Some(errors.to_vec())
        };
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("schema", &self.schema)
            .field("is_async", &self.is_async)
            .field("size", &self.program.size())
            .finish()
    }
}
