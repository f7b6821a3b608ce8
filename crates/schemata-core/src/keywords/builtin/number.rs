use serde_json::{Number, Value};

use crate::codegen::{CmpOp, Cond, Test};
use crate::compiler::{KeywordCx, KeywordError};
use crate::error::SchemaError;
use crate::vm::equal::compare_numbers;

use super::number_value;

pub(super) fn maximum(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    limit(cx, "maximum", "exclusiveMaximum", true)
}

pub(super) fn minimum(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    limit(cx, "minimum", "exclusiveMinimum", false)
}

/// `maximum`/`minimum` together with their exclusive sibling, which is
/// either a boolean modifier (draft-04) or a bound of its own. With both
/// bounds present only the stricter one is checked.
fn limit(cx: &mut KeywordCx<'_, '_>, inclusive: &str, exclusive: &str, upper: bool) -> Result<(), SchemaError> {
    let parent = cx.parent();
    let bound = parent.get(inclusive).map(|v| number_value(inclusive, v)).transpose()?;
    let (keyword, limit, strict): (&str, &Number, bool) = match (bound, parent.get(exclusive)) {
        (None, None | Some(Value::Bool(_))) => return Ok(()),
        (Some(b), None | Some(Value::Bool(false))) => (inclusive, b, false),
        (Some(b), Some(Value::Bool(true))) => (exclusive, b, true),
        (b, Some(Value::Number(e))) => match b {
            Some(b) if !stricter(e, b, upper) => (inclusive, b, false),
            _ => (exclusive, e, true),
        },
        (_, Some(_)) => {
            return Err(SchemaError::keyword_value(exclusive, "must be a number or a boolean"));
        }
    };
    let op = match (upper, strict) {
        (true, true) => CmpOp::Lt,
        (true, false) => CmpOp::Le,
        (false, true) => CmpOp::Gt,
        (false, false) => CmpOp::Ge,
    };
    let data = cx.data();
    cx.fail_with(
        Cond::test(data, Test::Compare { op, limit: limit.clone() }).not(),
        KeywordError::new("must be {comparison} {limit}")
            .param("comparison", op.symbol())
            .param("limit", limit.clone())
            .keyword(keyword),
    );
    Ok(())
}

/// Whether the exclusive bound `e` excludes at least what the inclusive
/// bound `b` does.
fn stricter(e: &Number, b: &Number, upper: bool) -> bool {
    match compare_numbers(e, b) {
        Some(ordering) if upper => ordering.is_le(),
        Some(ordering) => ordering.is_ge(),
        None => true,
    }
}

pub(super) fn multiple_of(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    let divisor = number_value("multipleOf", cx.schema())?;
    if divisor.as_f64().is_none_or(|d| d <= 0.0) {
        return Err(SchemaError::keyword_value("multipleOf", "must be greater than 0"));
    }
    let data = cx.data();
    let precision = cx.options().multiple_of_precision;
    cx.fail_with(
        Cond::test(
            data,
            Test::MultipleOf {
                divisor: divisor.clone(),
                precision,
            },
        )
        .not(),
        KeywordError::new("must be multiple of {multipleOf}").param("multipleOf", divisor.clone()),
    );
    Ok(())
}
