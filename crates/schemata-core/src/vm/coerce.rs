//! In-place type coercion.
//!
//! Target types are tried in the order the schema lists them; the first
//! conversion that applies wins. With `wrap_arrays`, a one-element array is
//! first unwrapped and a scalar may be wrapped into `[x]`.

use serde_json::{Number, Value};

use schemata_types::JsonType;

/// Coerce `value` to one of `to`. On failure `value` is left untouched.
pub fn coerce(value: &mut Value, to: &[JsonType], wrap_arrays: bool) -> bool {
    let mut candidate = value.clone();

    if wrap_arrays {
        if let Value::Array(items) = &candidate {
            if items.len() == 1 && !to.contains(&JsonType::Array) {
                candidate = items[0].clone();
                if to.iter().any(|ty| ty.matches(&candidate)) {
                    *value = candidate;
                    return true;
                }
            }
        }
    }

    for ty in to {
        if let Some(converted) = convert(&candidate, *ty, wrap_arrays) {
            *value = converted;
            return true;
        }
    }
    false
}

fn convert(value: &Value, ty: JsonType, wrap_arrays: bool) -> Option<Value> {
    match (ty, value) {
        (JsonType::String, Value::Number(n)) => Some(Value::String(number_text(n))),
        (JsonType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
        (JsonType::String, Value::Null) => Some(Value::String(String::new())),

        (JsonType::Number | JsonType::Integer, Value::Bool(b)) => Some(Value::from(u8::from(*b))),
        (JsonType::Number | JsonType::Integer, Value::Null) => Some(Value::from(0)),
        (JsonType::Number, Value::String(s)) => parse_number(s),
        (JsonType::Integer, Value::String(s)) => parse_number(s).filter(|v| JsonType::Integer.matches(v)),

        (JsonType::Boolean, Value::String(s)) if s == "true" => Some(Value::Bool(true)),
        (JsonType::Boolean, Value::String(s)) if s == "false" => Some(Value::Bool(false)),
        (JsonType::Boolean, Value::Null) => Some(Value::Bool(false)),
        (JsonType::Boolean, Value::Number(n)) => match n.as_f64() {
            Some(f) if f == 0.0 => Some(Value::Bool(false)),
            Some(f) if f == 1.0 => Some(Value::Bool(true)),
            _ => None,
        },

        (JsonType::Null, Value::String(s)) if s.is_empty() => Some(Value::Null),
        (JsonType::Null, Value::Bool(false)) => Some(Value::Null),
        (JsonType::Null, Value::Number(n)) if n.as_f64() == Some(0.0) => Some(Value::Null),

        (JsonType::Array, scalar) if wrap_arrays && !scalar.is_array() && !scalar.is_object() => {
            Some(Value::Array(vec![scalar.clone()]))
        }
        _ => None,
    }
}

/// Integral numbers print without a fraction, like `String(5)`.
fn number_text(n: &Number) -> String {
    if let Some(f) = n.as_f64().filter(|_| n.is_f64()) {
        if f.fract() == 0.0 && f.abs() < 1e21 {
            return format!("{}", f as i128);
        }
    }
    n.to_string()
}

/// A trimmed, non-empty, finite decimal. Integral values become integers.
fn parse_number(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Value::from(i));
    }
    let f = trimmed.parse::<f64>().ok().filter(|f| f.is_finite())?;
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        return Some(Value::from(f as i64));
    }
    Number::from_f64(f).map(Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!("5"), &[JsonType::Integer], json!(5))]
    #[case(json!(" 2.5 "), &[JsonType::Number], json!(2.5))]
    #[case(json!(true), &[JsonType::Number], json!(1))]
    #[case(json!(null), &[JsonType::String], json!(""))]
    #[case(json!(1), &[JsonType::Boolean], json!(true))]
    #[case(json!("false"), &[JsonType::Boolean], json!(false))]
    #[case(json!(""), &[JsonType::Null], json!(null))]
    #[case(json!(5), &[JsonType::String], json!("5"))]
    #[case(json!(true), &[JsonType::Number, JsonType::String], json!(1))]
    #[case(json!(true), &[JsonType::String, JsonType::Number], json!("true"))]
    fn scalar_coercions(#[case] mut input: Value, #[case] to: &[JsonType], #[case] expected: Value) {
        assert!(coerce(&mut input, to, false));
        assert_eq!(input, expected);
    }

    #[rstest]
    #[case(json!("abc"), &[JsonType::Number])]
    #[case(json!(""), &[JsonType::Integer])]
    #[case(json!("2.5"), &[JsonType::Integer])]
    #[case(json!("yes"), &[JsonType::Boolean])]
    #[case(json!({}), &[JsonType::String])]
    #[case(json!([1]), &[JsonType::Integer])]
    fn rejected_coercions(#[case] mut input: Value, #[case] to: &[JsonType]) {
        let before = input.clone();
        assert!(!coerce(&mut input, to, false));
        assert_eq!(input, before);
    }

    #[test]
    fn array_mode_wraps_and_unwraps() {
        let mut wrapped = json!("x");
        assert!(coerce(&mut wrapped, &[JsonType::Array], true));
        assert_eq!(wrapped, json!(["x"]));

        let mut unwrapped = json!(["7"]);
        assert!(coerce(&mut unwrapped, &[JsonType::Integer], true));
        assert_eq!(unwrapped, json!(7));

        let mut plain = json!([3]);
        assert!(coerce(&mut plain, &[JsonType::Number], true));
        assert_eq!(plain, json!(3));
    }
}
