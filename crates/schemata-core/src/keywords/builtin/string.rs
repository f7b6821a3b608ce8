use tracing::warn;

use schemata_types::UnknownFormats;

use crate::codegen::{CmpOp, Cond, ScopeValue, Test};
use crate::compiler::{KeywordCx, KeywordError};
use crate::error::SchemaError;

use super::count;

pub(super) fn max_length(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    length(cx, CmpOp::Le, "must NOT have more than {limit} characters")
}

pub(super) fn min_length(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    length(cx, CmpOp::Ge, "must NOT have fewer than {limit} characters")
}

/// Length limits shared by strings, arrays and objects.
pub(super) fn length(cx: &mut KeywordCx<'_, '_>, op: CmpOp, message: &str) -> Result<(), SchemaError> {
    let limit = count(cx)?;
    let data = cx.data();
    cx.fail_with(
        Cond::test(data, Test::Length { op, limit }).not(),
        KeywordError::new(message).param("limit", limit),
    );
    Ok(())
}

pub(super) fn pattern(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    let pattern = cx
        .schema()
        .as_str()
        .ok_or_else(|| SchemaError::keyword_value("pattern", "must be a string"))?;
    let re = cx.regex(pattern)?;
    let data = cx.data();
    cx.fail_with(
        Cond::test(data, Test::Pattern(re)).not(),
        KeywordError::new("must match pattern \"{pattern}\"").param("pattern", pattern),
    );
    Ok(())
}

pub(super) fn format(cx: &mut KeywordCx<'_, '_>) -> Result<(), SchemaError> {
    let name = cx
        .schema()
        .as_str()
        .ok_or_else(|| SchemaError::keyword_value("format", "must be a string"))?;
    let Some(format) = cx.format(name) else {
        return match cx.options().unknown_formats {
            UnknownFormats::Fail => Err(SchemaError::UnknownFormat {
                format: name.to_string(),
            }),
            UnknownFormats::Ignore => {
                warn!(format = name, path = %cx.schema_path(), "unknown format ignored");
                Ok(())
            }
        };
    };
    let check = cx.scope_value(Some(format!("format:{name}")), ScopeValue::Format(format.predicate()));
    let data = cx.data();
    cx.fail_with(
        Cond::test(data, Test::Format(check)).not(),
        KeywordError::new("must match format \"{format}\"").param("format", name),
    );
    Ok(())
}
