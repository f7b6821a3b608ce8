use serde_json::{Map, Value};

use crate::codegen::{CmpOp, Cond, Init, ScopeRef, Stmt, Test};
use crate::compiler::{KeywordCx, KeywordError, Sub};
use crate::error::SchemaError;

use super::string::length;
use super::{always_passes, strings};

pub(super) fn max_properties(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    length(cx, CmpOp::Le, "must NOT have more than {limit} properties")
}

pub(super) fn min_properties(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    length(cx, CmpOp::Ge, "must NOT have fewer than {limit} properties")
}

pub(super) fn required(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    let names = strings(cx)?;
    let data = cx.data();
    let errs = cx.errors_at_start();
    for name in names {
        cx.fail_with(
            Cond::test(data, Test::HasProperty(name.to_string())).not(),
            KeywordError::new("must have required property '{missingProperty}'").param("missingProperty", name),
        );
        cx.gate(errs);
    }
    Ok(())
}

/// Property dependencies (`{"a": ["b"]}`) and schema dependencies
/// (`{"a": {...}}`).
pub(super) fn dependencies(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    let Value::Object(deps) = cx.schema() else {
        return Err(SchemaError::keyword_value("dependencies", "must be an object"));
    };
    let data = cx.data();
    let errs = cx.errors_at_start();
    for (property, dep) in deps {
        match dep {
            Value::Array(names) => {
                let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
                if names.is_empty() {
                    continue;
                }
                let message = format!(
                    "must have {} {} when property {} is present",
                    if names.len() == 1 { "property" } else { "properties" },
                    names.join(", "),
                    property
                );
                let depth = cx.code().depth();
                cx.code().if_(Cond::test(data, Test::HasProperty(property.clone())));
                for name in &names {
                    cx.fail_with(
                        Cond::test(data, Test::HasProperty(name.to_string())).not(),
                        KeywordError::new(message.clone())
                            .param("property", property.as_str())
                            .param("missingProperty", *name)
                            .param("depsCount", names.len())
                            .param("deps", names.join(", ")),
                    );
                    cx.gate(errs);
                }
                cx.code().close_to(depth);
                cx.gate(errs);
            }
            schema if always_passes(schema) => {}
            schema @ (Value::Object(_) | Value::Bool(_)) => {
                cx.code().if_(Cond::test(data, Test::HasProperty(property.clone())));
                cx.subschema(schema, Sub::new().segment(property))?;
                cx.code().end_if();
                cx.gate(errs);
            }
            _ => {
                return Err(SchemaError::keyword_value(
                    "dependencies",
                    format!("dependency of {property:?} must be an array or a schema"),
                ));
            }
        }
    }
    Ok(())
}

pub(super) fn property_names(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    let schema = cx.schema();
    if always_passes(schema) {
        return Ok(());
    }
    let data = cx.data();
    let (_, key) = cx.code().for_each(data, 0);
    let name = cx.code().let_("propertyName", Init::KeyAsData { key, at: data });
    let before = cx.checkpoint();
    cx.subschema(schema, Sub::new().data(name).composite())?;
    cx.code().if_(Cond::ErrorsSince(before));
    cx.composite_error(
        before,
        KeywordError::new("property name must be valid").param_var("propertyName", key),
    );
    if !cx.all_errors() {
        cx.code().break_();
    }
    cx.code().end_if();
    cx.code().end_for();
    Ok(())
}

/// What to do with properties matched by neither `properties` nor
/// `patternProperties`.
enum Additional<'s> {
    Reject,
    Schema(&'s Value),
}

/// `properties`, `patternProperties` and `additionalProperties`, with
/// defaults and removal of additional properties when enabled.
pub(super) fn properties(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    let parent = cx.parent();
    let props = object_of(parent, "properties")?;
    let patterns = object_of(parent, "patternProperties")?;
    let additional = match parent.get("additionalProperties") {
        None => None,
        Some(Value::Bool(false)) => Some(Additional::Reject),
        Some(schema) if always_passes(schema) => None,
        Some(schema @ Value::Object(_)) => Some(Additional::Schema(schema)),
        Some(_) => {
            return Err(SchemaError::keyword_value(
                "additionalProperties",
                "must be a boolean or a schema",
            ));
        }
    };
    let data = cx.data();
    let errs = cx.errors_at_start();

    if cx.options().use_defaults {
        for (name, schema) in props.into_iter().flatten() {
            if let Some(value) = schema.get("default") {
                cx.code().push(Stmt::SetDefault {
                    data,
                    key: name.clone(),
                    value: value.clone(),
                });
            }
        }
    }

    for (name, schema) in props.into_iter().flatten() {
        if always_passes(schema) {
            continue;
        }
        cx.code().if_(Cond::test(data, Test::HasProperty(name.clone())));
        let child = cx.code().let_("data", Init::Property {
            parent: data,
            key: name.clone(),
        });
        cx.subschema(schema, Sub::new().segment(name).data(child))?;
        cx.code().end_if();
        cx.gate(errs);
    }

    let mut matchers: Vec<(&str, ScopeRef, &Value)> = Vec::new();
    for (pattern, schema) in patterns.into_iter().flatten() {
        let re = cx.regex(pattern)?;
        matchers.push((pattern.as_str(), re, schema));
    }
    let patterned = matchers.iter().any(|(_, _, schema)| !always_passes(schema));
    if !patterned && additional.is_none() {
        return Ok(());
    }

    let (item, key) = cx.code().for_each(data, 0);
    for (pattern, re, schema) in &matchers {
        if always_passes(schema) {
            continue;
        }
        cx.code().if_(Cond::test(key, Test::Pattern(*re)));
        cx.subschema(schema, Sub::new().keyword("patternProperties").segment(pattern).data(item))?;
        cx.code().end_if();
    }
    if let Some(additional) = additional {
        let mut known = Vec::new();
        if let Some(props) = props {
            known.push(Cond::test(key, Test::KeyIn(props.keys().cloned().collect())));
        }
        for (_, re, _) in &matchers {
            known.push(Cond::test(key, Test::Pattern(*re)));
        }
        cx.code().if_(Cond::Any(known).not());
        match additional {
            Additional::Reject if cx.options().remove_additional => {
                cx.code().push(Stmt::RemoveProperty { data, key });
            }
            Additional::Reject => cx.error(
                KeywordError::new("must NOT have additional properties")
                    .param_var("additionalProperty", key)
                    .keyword("additionalProperties"),
            ),
            Additional::Schema(schema) => {
                cx.subschema(schema, Sub::new().keyword("additionalProperties").data(item))?;
            }
        }
        cx.code().end_if();
    }
    cx.break_on_errors(errs);
    cx.code().end_for();
    Ok(())
}

fn object_of<'s>(parent: &'s Map<String, Value>, keyword: &str) -> Result<Option<&'s Map<String, Value>>, SchemaError> {
    match parent.get(keyword) {
        None => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(SchemaError::keyword_value(keyword, "must be an object")),
    }
}
