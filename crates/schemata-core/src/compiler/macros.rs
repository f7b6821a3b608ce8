//! Expansion of macro keywords.
//!
//! A macro keyword is replaced by the schema its function returns. When
//! the expansion's keywords don't collide with the host object they are
//! merged into it; otherwise the expansion is appended to the host's
//! `allOf`. Expansions may themselves hold macro keywords, up to
//! [`MAX_MACRO_DEPTH`] levels.

use std::borrow::Cow;

use serde_json::{Map, Value};
use tracing::trace;

use crate::error::SchemaError;
use crate::keywords::{Implementation, KeywordRegistry, MacroFn};

pub(crate) const MAX_MACRO_DEPTH: usize = 16;

pub(crate) fn expand<'m>(
    keywords: &KeywordRegistry,
    map: &'m Map<String, Value>,
    path: &str,
    depth: usize,
) -> Result<Cow<'m, Map<String, Value>>, SchemaError> {
    let macros: Vec<(&String, &MacroFn)> = map
        .keys()
        .filter_map(|k| match keywords.lookup(k).map(|r| &r.implementation) {
            Some(Implementation::Macro(f)) => Some((k, f)),
            _ => None,
        })
        .collect();
    let Some((first, _)) = macros.first() else {
        return Ok(Cow::Borrowed(map));
    };
    if depth >= MAX_MACRO_DEPTH {
        return Err(SchemaError::MacroDepthExceeded {
            keyword: first.to_string(),
            limit: MAX_MACRO_DEPTH,
        });
    }

    let parent = Value::Object(map.clone());
    let mut out = map.clone();
    let mut appended = Vec::new();
    for (keyword, _) in &macros {
        out.remove(*keyword);
    }
    for (keyword, f) in macros {
        let value = map.get(keyword).unwrap_or(&Value::Null);
        let expansion = f(value, &parent).map_err(SchemaError::Extension)?;
        trace!(keyword = %keyword, path, depth, "expanded macro keyword");
        let expansion = match expansion {
            Value::Object(inner) => Value::Object(expand(keywords, &inner, path, depth + 1)?.into_owned()),
            other => other,
        };
        match expansion {
            Value::Bool(true) => {}
            Value::Object(inner) if inner.keys().all(|k| !out.contains_key(k)) => out.extend(inner),
            other @ (Value::Object(_) | Value::Bool(false)) => appended.push(other),
            other => {
                return Err(SchemaError::invalid(
                    path,
                    format!("macro keyword {keyword} expanded to a non-schema value {other}"),
                ));
            }
        }
    }

    if !appended.is_empty() {
        match out.get_mut("allOf") {
            Some(Value::Array(items)) => items.extend(appended),
            Some(_) => return Err(SchemaError::invalid(path, "allOf must be an array")),
            None => {
                out.insert("allOf".to_string(), Value::Array(appended));
            }
        }
    }
    Ok(Cow::Owned(out))
}
