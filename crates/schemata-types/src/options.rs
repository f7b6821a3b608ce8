//! Engine configuration.
//!
//! Options are fixed for the lifetime of an engine: every artifact the engine
//! produces is compiled under the same settings. They deserialize from the
//! camelCase JSON shape callers already use:
//!
//! ```json
//! { "allErrors": true, "coerceTypes": "array", "inlineRefLimit": 8 }
//! ```

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Default cap on nested validator calls during one validation run.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 512;

/// Compiler and validator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    /// Collect every error instead of stopping at the first one.
    pub all_errors: bool,
    /// Attach the keyword's schema value and the offending data to errors.
    pub verbose: bool,
    /// In-place type coercion before type checks.
    pub coerce_types: CoerceTypes,
    /// Inline referenced schemas that contain no `$ref`.
    pub inline_refs: bool,
    /// Keyword-count budget for inlining; `None` means no budget.
    pub inline_ref_limit: Option<usize>,
    /// Reject keywords that can never apply under the node's `type`.
    pub strict_type_checks: bool,
    /// Reject keywords the registry does not know.
    pub strict_keywords: bool,
    /// What to do with a `format` the format table does not know.
    pub unknown_formats: UnknownFormats,
    /// Treatment of keywords next to `$ref`.
    pub extend_refs: ExtendRefs,
    /// Insert `default` values for missing `properties`.
    pub use_defaults: bool,
    /// Remove properties rejected by `additionalProperties: false`.
    pub remove_additional: bool,
    /// Which keyword declares identifiers.
    pub schema_id: SchemaId,
    /// Decimal digits of tolerance for `multipleOf` on non-integers.
    pub multiple_of_precision: Option<u32>,
    /// Keep the rendered program text on each artifact.
    pub keep_source: bool,
    /// Maximum nesting of validator calls in one run.
    pub max_call_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            all_errors: false,
            verbose: false,
            coerce_types: CoerceTypes::Off,
            inline_refs: true,
            inline_ref_limit: None,
            strict_type_checks: false,
            strict_keywords: false,
            unknown_formats: UnknownFormats::Fail,
            extend_refs: ExtendRefs::Ignore,
            use_defaults: false,
            remove_additional: false,
            schema_id: SchemaId::Auto,
            multiple_of_precision: None,
            keep_source: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl Options {
    /// Collect-all mode.
    pub fn all_errors() -> Self {
        Self {
            all_errors: true,
            ..Self::default()
        }
    }

    /// Whether compiled code may write to the data it validates.
    pub fn mutates_data(&self) -> bool {
        self.coerce_types != CoerceTypes::Off || self.use_defaults || self.remove_additional
    }
}

/// Type coercion mode.
///
/// Serialized as `false`, `true` or `"array"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoerceTypes {
    /// No coercion.
    #[default]
    Off,
    /// Scalars convert between string, number, integer, boolean and null.
    Scalar,
    /// Scalars, plus wrapping a scalar into `[x]` and unwrapping `[x]`.
    Array,
}

impl Serialize for CoerceTypes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CoerceTypes::Off => serializer.serialize_bool(false),
            CoerceTypes::Scalar => serializer.serialize_bool(true),
            CoerceTypes::Array => serializer.serialize_str("array"),
        }
    }
}

impl<'de> Deserialize<'de> for CoerceTypes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Mode(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Flag(false) => Ok(CoerceTypes::Off),
            Repr::Flag(true) => Ok(CoerceTypes::Scalar),
            Repr::Mode(mode) if mode == "array" => Ok(CoerceTypes::Array),
            Repr::Mode(mode) => Err(de::Error::custom(format!(
                "coerceTypes must be a boolean or \"array\", got {mode:?}"
            ))),
        }
    }
}

/// Unknown `format` handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownFormats {
    /// Compilation fails.
    #[default]
    Fail,
    /// The keyword is skipped with a warning.
    Ignore,
}

/// Keywords next to `$ref`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtendRefs {
    /// Siblings are ignored with a warning.
    #[default]
    Ignore,
    /// Siblings are a schema error.
    Fail,
    /// Siblings are validated alongside the reference.
    Apply,
}

/// Identifier keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SchemaId {
    #[serde(rename = "$id")]
    DollarId,
    #[serde(rename = "id")]
    Id,
    /// `$id`, falling back to `id`.
    #[default]
    #[serde(rename = "auto")]
    Auto,
}

impl SchemaId {
    /// Keywords that may declare an identifier, in lookup order.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            SchemaId::DollarId => &["$id"],
            SchemaId::Id => &["id"],
            SchemaId::Auto => &["$id", "id"],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_fill_missing_fields() {
        let opts: Options = serde_json::from_value(json!({ "allErrors": true })).expect("options");
        assert!(opts.all_errors);
        assert!(opts.inline_refs);
        assert_eq!(opts.coerce_types, CoerceTypes::Off);
        assert_eq!(opts.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
    }

    #[test]
    fn coerce_types_forms() {
        let parse = |v| serde_json::from_value::<CoerceTypes>(v);
        assert_eq!(parse(json!(false)).expect("false"), CoerceTypes::Off);
        assert_eq!(parse(json!(true)).expect("true"), CoerceTypes::Scalar);
        assert_eq!(parse(json!("array")).expect("array"), CoerceTypes::Array);
        assert!(parse(json!("always")).is_err());
        assert_eq!(serde_json::to_value(CoerceTypes::Array).expect("ser"), json!("array"));
    }

    #[test]
    fn enum_options_parse() {
        let opts: Options = serde_json::from_value(json!({
            "extendRefs": "apply",
            "unknownFormats": "ignore",
            "schemaId": "id",
            "inlineRefLimit": 4
        }))
        .expect("options");
        assert_eq!(opts.extend_refs, ExtendRefs::Apply);
        assert_eq!(opts.unknown_formats, UnknownFormats::Ignore);
        assert_eq!(opts.schema_id.keywords(), &["id"]);
        assert_eq!(opts.inline_ref_limit, Some(4));
    }

    #[test]
    fn mutation_detection() {
        assert!(!Options::default().mutates_data());
        let opts = Options {
            coerce_types: CoerceTypes::Scalar,
            ..Options::default()
        };
        assert!(opts.mutates_data());
    }
}
