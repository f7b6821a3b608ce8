use serde_json::Value;

use schemata_types::JsonType;

use crate::codegen::{Cond, Init, Param, Test};
use crate::compiler::{KeywordCx, KeywordError, Sub};
use crate::error::SchemaError;

use super::always_passes;

pub(super) fn reference(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    let reference = cx
        .schema()
        .as_str()
        .ok_or_else(|| SchemaError::keyword_value("$ref", "must be a string"))?;
    cx.reference(reference)
}

pub(super) fn constant(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    let value = cx.schema();
    let data = cx.data();
    cx.fail_with(
        Cond::test(data, Test::Equals(value.clone())).not(),
        KeywordError::new("must be equal to constant").param("allowedValue", value.clone()),
    );
    Ok(())
}

pub(super) fn enumeration(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    let Value::Array(allowed) = cx.schema() else {
        return Err(SchemaError::keyword_value("enum", "must be an array"));
    };
    let data = cx.data();
    cx.fail_with(
        Cond::test(data, Test::OneOf(allowed.clone())).not(),
        KeywordError::new("must be equal to one of the allowed values").param("allowedValues", allowed.clone()),
    );
    Ok(())
}

pub(super) fn not(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    let schema = cx.schema();
    let before = cx.checkpoint();
    cx.subschema(schema, Sub::new().composite())?;
    cx.code().if_(Cond::ErrorsSince(before));
    cx.reset_errors(before);
    cx.code().else_();
    cx.error(KeywordError::new("must NOT be valid"));
    cx.code().end_if();
    Ok(())
}

fn branches<'v>(cx: &KeywordCx<'v, '_>) -> Result<&'v [Value], SchemaError> {
    match cx.schema() {
        Value::Array(items) if !items.is_empty() => Ok(items),
        _ => Err(SchemaError::keyword_value(cx.keyword(), "must be a non-empty array of schemas")),
    }
}

/// Branches run until one passes.
pub(super) fn any_of(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    let branches = branches(cx)?;
    if branches.iter().any(always_passes) {
        return Ok(());
    }
    let errs = cx.errors_at_start();
    let valid = cx.code().let_("valid", Init::Const(Value::Bool(false)));
    let depth = cx.code().depth();
    for (i, schema) in branches.iter().enumerate() {
        let before = cx.checkpoint();
        cx.subschema(schema, Sub::new().segment(i).composite())?;
        cx.code().assign(valid, Init::Cond(Cond::no_errors_since(before)));
        if i + 1 < branches.len() {
            cx.code().if_(Cond::Var(valid).not());
        }
    }
    cx.code().close_to(depth);

    cx.code().if_(Cond::Var(valid));
    cx.reset_errors(errs);
    cx.code().else_();
    cx.composite_error(errs, KeywordError::new("must match a schema in anyOf"));
    cx.code().end_if();
    Ok(())
}

/// Branches run until a second one passes. `passing` ends up as the index
/// of the passing branch, or a nested pair of the two that did.
pub(super) fn one_of(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    let branches = branches(cx)?;
    let errs = cx.errors_at_start();
    let valid = cx.code().let_("valid", Init::Const(Value::Bool(false)));
    let passing = cx.code().let_("passing", Init::Const(Value::Null));
    let depth = cx.code().depth();
    for (i, schema) in branches.iter().enumerate() {
        let before = cx.checkpoint();
        cx.subschema(schema, Sub::new().segment(i).composite())?;
        let ok = cx.code().let_("ok", Init::Cond(Cond::no_errors_since(before)));
        cx.code().if_(Cond::All(vec![Cond::Var(ok), Cond::Var(valid)]));
        cx.code().assign(valid, Init::Const(Value::Bool(false)));
        cx.code()
            .assign(passing, Init::Array(vec![Param::Var(passing), Param::Lit(Value::from(i))]));
        cx.code().else_if(Cond::Var(ok));
        cx.code().assign(valid, Init::Const(Value::Bool(true)));
        cx.code().assign(passing, Init::Const(Value::from(i)));
        cx.code().end_if();
        if i + 1 < branches.len() {
            // still undecided: nothing passed yet, or exactly one branch did
            cx.code()
                .if_(Cond::Any(vec![Cond::Var(valid), Cond::is_type(passing, JsonType::Null)]));
        }
    }
    cx.code().close_to(depth);

    cx.code().if_(Cond::Var(valid));
    cx.reset_errors(errs);
    cx.code().else_();
    cx.composite_error(
        errs,
        KeywordError::new("must match exactly one schema in oneOf").param_var("passingSchemas", passing),
    );
    cx.code().end_if();
    Ok(())
}

pub(super) fn all_of(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    let branches = branches(cx)?;
    let errs = cx.errors_at_start();
    for (i, schema) in branches.iter().enumerate() {
        if always_passes(schema) {
            continue;
        }
        cx.subschema(schema, Sub::new().segment(i))?;
        cx.gate(errs);
    }
    Ok(())
}

/// `if` with `then` and `else`. Without either `if` checks nothing, and
/// `then`/`else` without `if` are ignored.
pub(super) fn if_then_else(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    let parent = cx.parent();
    let Some(condition) = parent.get("if") else {
        return Ok(());
    };
    let then = parent.get("then").filter(|s| !always_passes(s));
    let otherwise = parent.get("else").filter(|s| !always_passes(s));
    if then.is_none() && otherwise.is_none() {
        return Ok(());
    }
    let before = cx.checkpoint();
    cx.subschema(condition, Sub::new().composite())?;
    let if_valid = cx.code().let_("ifValid", Init::Cond(Cond::no_errors_since(before)));
    cx.reset_errors(before);

    let clauses = [
        ("then", then, Cond::Var(if_valid)),
        ("else", otherwise, Cond::Var(if_valid).not()),
    ];
    for (keyword, schema, cond) in clauses {
        let Some(schema) = schema else {
            continue;
        };
        cx.code().if_(cond);
        let clause = cx.checkpoint();
        cx.subschema(schema, Sub::new().keyword(keyword))?;
        cx.code().if_(Cond::ErrorsSince(clause));
        cx.composite_error(
            clause,
            KeywordError::new("must match \"{failingKeyword}\" schema")
                .param("failingKeyword", keyword)
                .keyword("if"),
        );
        cx.code().end_if();
        cx.code().end_if();
    }
    Ok(())
}
