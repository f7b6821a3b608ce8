//! Structural checks on schema documents.
//!
//! Verifies that each built-in keyword holds a value of the right kind
//! (`minLength` a non-negative integer, `required` an array of unique
//! strings, `allOf` a non-empty array of schemas, ...) and recurses into
//! nested schemas. Unknown keywords are left alone.

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use schemata_types::path::escape_token;
use schemata_types::TypeSet;

/// The first structural problem found in a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {reason}")]
pub struct ShapeError {
    /// JSON pointer to the offending value.
    pub path: String,
    pub reason: String,
}

/// Check that `schema` is a structurally valid schema.
pub fn check_schema(schema: &Value) -> Result<(), ShapeError> {
    check(schema, "")
}

fn fail(path: &str, reason: impl Into<String>) -> ShapeError {
    ShapeError {
        path: if path.is_empty() { "/".to_string() } else { path.to_string() },
        reason: reason.into(),
    }
}

fn check(schema: &Value, path: &str) -> Result<(), ShapeError> {
    match schema {
        Value::Bool(_) => Ok(()),
        Value::Object(map) => {
            for (keyword, value) in map {
                let at = format!("{path}/{}", escape_token(keyword));
                check_keyword(keyword, value, &at)?;
            }
            Ok(())
        }
        _ => Err(fail(path, "schema must be an object or a boolean")),
    }
}

fn check_keyword(keyword: &str, value: &Value, at: &str) -> Result<(), ShapeError> {
    match keyword {
        "$id" | "id" | "$ref" | "$schema" | "$comment" | "title" | "description" | "format" => {
            string(value, at).map(drop)
        }
        "pattern" => regex(string(value, at)?, at),
        "type" => TypeSet::from_schema(value)
            .map(drop)
            .map_err(|e| fail(at, e.to_string())),
        "maxLength" | "minLength" | "maxItems" | "minItems" | "maxProperties" | "minProperties" => {
            match value.as_u64() {
                Some(_) => Ok(()),
                None => Err(fail(at, "must be a non-negative integer")),
            }
        }
        "maximum" | "minimum" => number(value, at),
        "exclusiveMaximum" | "exclusiveMinimum" => match value {
            Value::Bool(_) => Ok(()),
            other => number(other, at),
        },
        "multipleOf" => match value.as_f64() {
            Some(n) if n > 0.0 => Ok(()),
            _ => Err(fail(at, "must be a number greater than 0")),
        },
        "uniqueItems" | "$async" => match value {
            Value::Bool(_) => Ok(()),
            _ => Err(fail(at, "must be a boolean")),
        },
        "required" => unique_strings(value, at),
        "enum" => match value {
            Value::Array(_) => Ok(()),
            _ => Err(fail(at, "must be an array")),
        },
        "allOf" | "anyOf" | "oneOf" => match value {
            Value::Array(items) if !items.is_empty() => schemas(items, at),
            _ => Err(fail(at, "must be a non-empty array of schemas")),
        },
        "items" => match value {
            Value::Array(items) => schemas(items, at),
            other => check(other, at),
        },
        "additionalItems" | "additionalProperties" | "propertyNames" | "contains" | "not" | "if" | "then"
        | "else" => check(value, at),
        "properties" | "definitions" | "$defs" => schema_map(object(value, at)?, at),
        "patternProperties" => {
            let map = object(value, at)?;
            for pattern in map.keys() {
                regex(pattern, at)?;
            }
            schema_map(map, at)
        }
        "dependencies" => {
            for (name, dep) in object(value, at)? {
                let dep_at = format!("{at}/{}", escape_token(name));
                match dep {
                    Value::Array(_) => unique_strings(dep, &dep_at)?,
                    other => check(other, &dep_at)?,
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn string<'v>(value: &'v Value, at: &str) -> Result<&'v str, ShapeError> {
    value.as_str().ok_or_else(|| fail(at, "must be a string"))
}

fn number(value: &Value, at: &str) -> Result<(), ShapeError> {
    if value.is_number() {
        Ok(())
    } else {
        Err(fail(at, "must be a number"))
    }
}

fn object<'v>(value: &'v Value, at: &str) -> Result<&'v Map<String, Value>, ShapeError> {
    value.as_object().ok_or_else(|| fail(at, "must be an object"))
}

fn regex(pattern: &str, at: &str) -> Result<(), ShapeError> {
    Regex::new(pattern)
        .map(drop)
        .map_err(|e| fail(at, format!("invalid pattern {pattern:?}: {e}")))
}

fn unique_strings(value: &Value, at: &str) -> Result<(), ShapeError> {
    let Value::Array(items) = value else {
        return Err(fail(at, "must be an array of strings"));
    };
    let mut seen = Vec::with_capacity(items.len());
    for item in items {
        let s = item.as_str().ok_or_else(|| fail(at, "must be an array of strings"))?;
        if seen.contains(&s) {
            return Err(fail(at, format!("duplicate entry {s:?}")));
        }
        seen.push(s);
    }
    Ok(())
}

fn schemas(items: &[Value], at: &str) -> Result<(), ShapeError> {
    for (i, item) in items.iter().enumerate() {
        check(item, &format!("{at}/{i}"))?;
    }
    Ok(())
}

fn schema_map(map: &Map<String, Value>, at: &str) -> Result<(), ShapeError> {
    for (name, sub) in map {
        check(sub, &format!("{at}/{}", escape_token(name)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!(true))]
    #[case(json!({ "type": ["string", "null"], "minLength": 2 }))]
    #[case(json!({ "items": [{}, false], "additionalItems": { "type": "integer" } }))]
    #[case(json!({ "dependencies": { "a": ["b"], "c": { "required": ["d"] } } }))]
    #[case(json!({ "x-custom": [1, 2, 3] }))]
    fn accepts(#[case] schema: Value) {
        assert_eq!(check_schema(&schema), Ok(()));
    }

    #[rstest]
    #[case(json!(3), "/")]
    #[case(json!({ "minLength": -1 }), "/minLength")]
    #[case(json!({ "type": "text" }), "/type")]
    #[case(json!({ "required": ["a", "a"] }), "/required")]
    #[case(json!({ "anyOf": [] }), "/anyOf")]
    #[case(json!({ "properties": { "a": { "multipleOf": 0 } } }), "/properties/a/multipleOf")]
    #[case(json!({ "patternProperties": { "(": {} } }), "/patternProperties")]
    fn rejects(#[case] schema: Value, #[case] path: &str) {
        let err = check_schema(&schema).unwrap_err();
        assert_eq!(err.path, path);
    }
}
