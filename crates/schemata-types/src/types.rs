//! JSON data types as seen by the `type` keyword.
//!
//! `integer` is not a separate JSON type on the wire: it is any number with
//! no fractional part, so `1.0` is an integer and matches both `integer`
//! and `number`.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// One of the seven type names a schema may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JsonType {
    Null,
    Boolean,
    Object,
    Array,
    Number,
    Integer,
    String,
}

/// A type name that is not one of the seven known types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown type name: {0:?}")]
pub struct UnknownType(pub String);

impl JsonType {
    /// All types, in the order they are reported.
    pub const ALL: [JsonType; 7] = [
        JsonType::Null,
        JsonType::Boolean,
        JsonType::Object,
        JsonType::Array,
        JsonType::Number,
        JsonType::Integer,
        JsonType::String,
    ];

    /// Parse a type name as written in a schema.
    pub fn parse(name: &str) -> Result<Self, UnknownType> {
        match name {
            "null" => Ok(JsonType::Null),
            "boolean" => Ok(JsonType::Boolean),
            "object" => Ok(JsonType::Object),
            "array" => Ok(JsonType::Array),
            "number" => Ok(JsonType::Number),
            "integer" => Ok(JsonType::Integer),
            "string" => Ok(JsonType::String),
            other => Err(UnknownType(other.to_string())),
        }
    }

    /// The name used in schemas and error messages.
    pub fn name(self) -> &'static str {
        match self {
            JsonType::Null => "null",
            JsonType::Boolean => "boolean",
            JsonType::Object => "object",
            JsonType::Array => "array",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::String => "string",
        }
    }

    /// The most specific type of a value (`integer` for integral numbers).
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => JsonType::Null,
            Value::Bool(_) => JsonType::Boolean,
            Value::Object(_) => JsonType::Object,
            Value::Array(_) => JsonType::Array,
            Value::String(_) => JsonType::String,
            Value::Number(n) => {
                if n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0) {
                    JsonType::Integer
                } else {
                    JsonType::Number
                }
            }
        }
    }

    /// Whether `value` satisfies this type name.
    pub fn matches(self, value: &Value) -> bool {
        match (self, JsonType::of(value)) {
            (JsonType::Number, JsonType::Integer) => true,
            (expected, actual) => expected == actual,
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A small set of [`JsonType`]s, kept in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TypeSet(u8);

impl TypeSet {
    /// The empty set.
    pub const fn empty() -> Self {
        TypeSet(0)
    }

    /// A set holding a single type.
    pub fn single(ty: JsonType) -> Self {
        TypeSet(ty.bit())
    }

    /// Parse the value of a `type` keyword: a name or an array of names.
    pub fn from_schema(value: &Value) -> Result<Self, UnknownType> {
        match value {
            Value::String(name) => Ok(TypeSet::single(JsonType::parse(name)?)),
            Value::Array(items) => {
                let mut set = TypeSet::empty();
                for item in items {
                    let name = item
                        .as_str()
                        .ok_or_else(|| UnknownType(item.to_string()))?;
                    set.insert(JsonType::parse(name)?);
                }
                Ok(set)
            }
            other => Err(UnknownType(other.to_string())),
        }
    }

    pub fn insert(&mut self, ty: JsonType) {
        self.0 |= ty.bit();
    }

    pub fn contains(self, ty: JsonType) -> bool {
        self.0 & ty.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate members in declaration order.
    pub fn iter(self) -> impl Iterator<Item = JsonType> {
        JsonType::ALL.into_iter().filter(move |ty| self.contains(*ty))
    }

    /// Whether a value satisfies any member of the set.
    pub fn matches(self, value: &Value) -> bool {
        self.iter().any(|ty| ty.matches(value))
    }

    /// Whether data of this set can ever reach a rule group for `group`.
    ///
    /// The number group also serves `integer`, and `number` data may be
    /// integral.
    pub fn admits(self, group: JsonType) -> bool {
        match group {
            JsonType::Number | JsonType::Integer => {
                self.contains(JsonType::Number) || self.contains(JsonType::Integer)
            }
            other => self.contains(other),
        }
    }
}

impl FromIterator<JsonType> for TypeSet {
    fn from_iter<I: IntoIterator<Item = JsonType>>(iter: I) -> Self {
        let mut set = TypeSet::empty();
        for ty in iter {
            set.insert(ty);
        }
        set
    }
}

impl fmt::Display for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(JsonType::name).collect();
        f.write_str(&names.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integral_floats_are_integers() {
        assert_eq!(JsonType::of(&json!(1.0)), JsonType::Integer);
        assert_eq!(JsonType::of(&json!(1.5)), JsonType::Number);
        assert!(JsonType::Number.matches(&json!(3)));
        assert!(!JsonType::Integer.matches(&json!(3.25)));
    }

    #[test]
    fn parse_type_keyword() {
        let set = TypeSet::from_schema(&json!(["string", "null"])).expect("valid types");
        assert!(set.contains(JsonType::String));
        assert!(set.contains(JsonType::Null));
        assert_eq!(set.len(), 2);
        assert_eq!(set.to_string(), "null,string");
    }

    #[test]
    fn unknown_type_name_is_rejected() {
        assert!(TypeSet::from_schema(&json!("text")).is_err());
        assert!(TypeSet::from_schema(&json!([1])).is_err());
    }

    #[test]
    fn number_group_admits_integer() {
        let set = TypeSet::single(JsonType::Integer);
        assert!(set.admits(JsonType::Number));
        assert!(!set.admits(JsonType::String));
        assert!(TypeSet::single(JsonType::Number).admits(JsonType::Integer));
    }
}
