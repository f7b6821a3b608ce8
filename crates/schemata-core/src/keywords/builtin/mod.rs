//! Built-in keywords.
//!
//! Each is a `Code` rule emitting IR through a
//! [`KeywordCx`](crate::compiler::KeywordCx). Messages and parameters
//! follow the usual JSON Schema validator conventions, so
//! `{"minimum": 5}` on `3` reports `must be >= 5` with
//! `{"comparison": ">=", "limit": 5}`.

mod array;
mod number;
mod object;
mod string;
mod untyped;

use serde_json::{Number, Value};

use schemata_types::JsonType;

use super::rule::Rule;
use crate::compiler::KeywordCx;
use crate::error::SchemaError;

/// The built-in rules in evaluation order.
pub(crate) fn rules() -> Vec<Rule> {
    let num = Some(JsonType::Number);
    let string = Some(JsonType::String);
    let array = Some(JsonType::Array);
    let object = Some(JsonType::Object);
    vec![
        Rule::builtin("maximum", num, number::maximum).implementing(&["exclusiveMaximum"]),
        Rule::builtin("minimum", num, number::minimum).implementing(&["exclusiveMinimum"]),
        Rule::builtin("multipleOf", num, number::multiple_of),
        Rule::builtin("maxLength", string, string::max_length),
        Rule::builtin("minLength", string, string::min_length),
        Rule::builtin("pattern", string, string::pattern),
        Rule::builtin("format", string, string::format),
        Rule::builtin("maxItems", array, array::max_items),
        Rule::builtin("minItems", array, array::min_items),
        Rule::builtin("items", array, array::items).implementing(&["additionalItems"]),
        Rule::builtin("contains", array, array::contains),
        Rule::builtin("uniqueItems", array, array::unique_items),
        Rule::builtin("maxProperties", object, object::max_properties),
        Rule::builtin("minProperties", object, object::min_properties),
        Rule::builtin("required", object, object::required),
        Rule::builtin("dependencies", object, object::dependencies),
        Rule::builtin("propertyNames", object, object::property_names),
        Rule::builtin("properties", object, object::properties)
            .implementing(&["patternProperties", "additionalProperties"]),
        Rule::builtin("$ref", None, untyped::reference),
        Rule::builtin("const", None, untyped::constant),
        Rule::builtin("enum", None, untyped::enumeration),
        Rule::builtin("not", None, untyped::not),
        Rule::builtin("anyOf", None, untyped::any_of),
        Rule::builtin("oneOf", None, untyped::one_of),
        Rule::builtin("allOf", None, untyped::all_of),
        Rule::builtin("if", None, untyped::if_then_else).implementing(&["then", "else"]),
    ]
}

/// A schema that accepts everything.
fn always_passes(schema: &Value) -> bool {
    match schema {
        Value::Bool(b) => *b,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn number_value<'v>(keyword: &str, value: &'v Value) -> Result<&'v Number, SchemaError> {
    match value {
        Value::Number(n) => Ok(n),
        _ => Err(SchemaError::keyword_value(keyword, "must be a number")),
    }
}

/// The keyword value as a count: a non-negative integer.
fn count(cx: &KeywordCx<'_, '_>) -> Result<u64, SchemaError> {
    cx.schema()
        .as_u64()
        .ok_or_else(|| SchemaError::keyword_value(cx.keyword(), "must be a non-negative integer"))
}

/// The keyword value as an array of strings.
fn strings<'v>(cx: &KeywordCx<'v, '_>) -> Result<Vec<&'v str>, SchemaError> {
    let bad = || SchemaError::keyword_value(cx.keyword(), "must be an array of strings");
    let Value::Array(items) = cx.schema() else {
        return Err(bad());
    };
    items.iter().map(|item| item.as_str().ok_or_else(bad)).collect()
}
