use serde_json::Value;

use crate::codegen::{CmpOp, Cond, Init, Stmt, Test};
use crate::compiler::{KeywordCx, KeywordError, Sub};
use crate::error::SchemaError;

use super::always_passes;
use super::string::length;

pub(super) fn max_items(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    length(cx, CmpOp::Le, "must NOT have more than {limit} items")
}

pub(super) fn min_items(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    length(cx, CmpOp::Ge, "must NOT have fewer than {limit} items")
}

/// `items` in both forms, plus `additionalItems` after a tuple.
pub(super) fn items(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    let data = cx.data();
    let errs = cx.errors_at_start();
    match cx.schema() {
        Value::Null => Ok(()),
        Value::Array(tuple) => {
            for (i, schema) in tuple.iter().enumerate() {
                if always_passes(schema) {
                    continue;
                }
                cx.code().if_(Cond::test(data, Test::Length { op: CmpOp::Gt, limit: i as u64 }));
                let item = cx.code().let_("item", Init::Item { parent: data, index: i });
                cx.subschema(schema, Sub::new().segment(i).data(item))?;
                cx.code().end_if();
                cx.gate(errs);
            }
            additional_items(cx, tuple.len())
        }
        schema => {
            if always_passes(schema) {
                return Ok(());
            }
            let (item, _) = cx.code().for_each(data, 0);
            cx.subschema(schema, Sub::new().data(item))?;
            cx.break_on_errors(errs);
            cx.code().end_for();
            Ok(())
        }
    }
}

fn additional_items(cx: &mut KeywordCx<'_, '_>, len: usize) -> Result<(), SchemaError> {
    let data = cx.data();
    let errs = cx.errors_at_start();
    match cx.parent().get("additionalItems") {
        None => Ok(()),
        Some(Value::Bool(false)) => {
            cx.fail_with(
                Cond::test(data, Test::Length { op: CmpOp::Gt, limit: len as u64 }),
                KeywordError::new("must NOT have more than {limit} items")
                    .param("limit", len)
                    .keyword("additionalItems"),
            );
            Ok(())
        }
        Some(schema) if always_passes(schema) => Ok(()),
        Some(schema) => {
            let (item, _) = cx.code().for_each(data, len);
            cx.subschema(schema, Sub::new().keyword("additionalItems").data(item))?;
            cx.break_on_errors(errs);
            cx.code().end_for();
            Ok(())
        }
    }
}

pub(super) fn contains(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    let data = cx.data();
    let schema = cx.schema();
    let errs = cx.errors_at_start();
    let valid = cx.code().let_("valid", Init::Const(Value::Bool(false)));
    let (item, _) = cx.code().for_each(data, 0);
    let before = cx.checkpoint();
    cx.subschema(schema, Sub::new().data(item).composite())?;
    cx.code().if_(Cond::no_errors_since(before));
    cx.code().assign(valid, Init::Const(Value::Bool(true)));
    cx.code().break_();
    cx.code().end_if();
    cx.code().end_for();

    cx.code().if_(Cond::Var(valid));
    cx.reset_errors(errs);
    cx.code().else_();
    cx.composite_error(
        errs,
        KeywordError::new("must contain at least {minContains} valid item(s)").param("minContains", 1),
    );
    cx.code().end_if();
    Ok(())
}

pub(super) fn unique_items(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    match cx.schema() {
        Value::Bool(true) => {}
        Value::Bool(false) => return Ok(()),
        _ => return Err(SchemaError::keyword_value("uniqueItems", "must be a boolean")),
    }
    let data = cx.data();
    let i = cx.code().name("i");
    let j = cx.code().name("j");
    cx.code().push(Stmt::FindDuplicate { data, i, j });
    cx.fail_with(
        Cond::Var(i),
        KeywordError::new("must NOT have duplicate items (items ## {j} and {i} are identical)")
            .param_var("i", i)
            .param_var("j", j),
    );
    Ok(())
}
