//! Validation error records.
//!
//! The serialized shape is fixed for downstream tooling:
//!
//! ```json
//! {
//!   "keyword": "minimum",
//!   "instancePath": "/age",
//!   "schemaPath": "#/properties/age/minimum",
//!   "message": "must be >= 5",
//!   "params": { "comparison": ">=", "limit": 5 }
//! }
//! ```
//!
//! `schema` and `data` are only present when the engine runs in verbose mode.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single failed keyword evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    /// Keyword that failed (`"false schema"` for a boolean `false` schema).
    pub keyword: String,
    /// JSON pointer to the offending value in the data.
    pub instance_path: String,
    /// `#`-prefixed JSON pointer to the keyword in the schema.
    pub schema_path: String,
    /// Human-readable message.
    pub message: String,
    /// Keyword-specific parameters.
    pub params: Map<String, Value>,
    /// The keyword's schema value (verbose mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// The offending data value (verbose mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance_path.is_empty() {
            write!(f, "data {}", self.message)
        } else {
            write!(f, "data{} {}", self.instance_path, self.message)
        }
    }
}

/// The errors of one failed validation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    errors: Vec<ErrorRecord>,
}

impl ValidationErrors {
    pub fn new(errors: Vec<ErrorRecord>) -> Self {
        Self { errors }
    }

    /// Returns the number of errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns true if there are no errors.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns a slice of all errors.
    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    /// Consumes self and returns the inner Vec.
    pub fn into_inner(self) -> Vec<ErrorRecord> {
        self.errors
    }

    /// Join all messages with `separator`, or `"No errors"` when empty.
    pub fn text(&self, separator: &str) -> String {
        if self.errors.is_empty() {
            return "No errors".to_string();
        }
        self.errors
            .iter()
            .map(ErrorRecord::to_string)
            .collect::<Vec<_>>()
            .join(separator)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text(", "))
    }
}

impl std::error::Error for ValidationErrors {}

impl From<Vec<ErrorRecord>> for ValidationErrors {
    fn from(errors: Vec<ErrorRecord>) -> Self {
        Self { errors }
    }
}

impl IntoIterator for ValidationErrors {
    type Item = ErrorRecord;
    type IntoIter = std::vec::IntoIter<ErrorRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(path: &str, message: &str) -> ErrorRecord {
        ErrorRecord {
            keyword: "minimum".into(),
            instance_path: path.into(),
            schema_path: "#/minimum".into(),
            message: message.into(),
            params: Map::new(),
            schema: None,
            data: None,
        }
    }

    #[test]
    fn serializes_without_verbose_fields() {
        let value = serde_json::to_value(record("/a", "must be >= 5")).expect("serialize");
        assert_eq!(
            value,
            json!({
                "keyword": "minimum",
                "instancePath": "/a",
                "schemaPath": "#/minimum",
                "message": "must be >= 5",
                "params": {}
            })
        );
    }

    #[test]
    fn text_joins_messages() {
        let errors = ValidationErrors::new(vec![record("", "must be >= 5"), record("/b", "must be string")]);
        assert_eq!(errors.text(", "), "data must be >= 5, data/b must be string");
        assert_eq!(ValidationErrors::default().text(", "), "No errors");
    }
}
