//! Side table of non-literal runtime values referenced by the IR.
//!
//! Regexes, format predicates, linked sub-validators and user closures
//! cannot live in the instruction tree itself, so the builder stores them
//! here and the program refers to them by [`ScopeRef`]. The scope moves into
//! the finished artifact and is never mutated afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::keywords::{CompiledCheck, FormatCheck, PredicateFn};
use crate::validator::Link;

/// Index of a value in a [`ValueScope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeRef(pub(crate) u32);

/// A value injected into the program.
#[derive(Clone)]
pub enum ScopeValue {
    Regex(Arc<Regex>),
    Format(FormatCheck),
    /// A validator that may still be compiling when it is linked.
    Validator(Arc<Link>),
    Predicate(PredicateFn),
    Closure(CompiledCheck),
    /// Schema values handed to user predicates.
    Json(Value),
}

impl ScopeValue {
    fn prefix(&self) -> &'static str {
        match self {
            ScopeValue::Regex(_) => "pattern",
            ScopeValue::Format(_) => "format",
            ScopeValue::Validator(_) => "validate",
            ScopeValue::Predicate(_) => "func",
            ScopeValue::Closure(_) => "check",
            ScopeValue::Json(_) => "schema",
        }
    }
}

impl fmt::Debug for ScopeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeValue::Regex(re) => write!(f, "Regex({:?})", re.as_str()),
            ScopeValue::Json(value) => write!(f, "Json({value})"),
            other => f.write_str(other.prefix()),
        }
    }
}

/// Named runtime values, deduplicated by key.
#[derive(Debug, Default, Clone)]
pub struct ValueScope {
    entries: Vec<(String, ScopeValue)>,
    by_key: HashMap<String, ScopeRef>,
    counters: HashMap<&'static str, u32>,
}

impl ValueScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value. When `key` is given and already present, the existing
    /// entry is returned instead.
    pub fn insert(&mut self, key: Option<String>, value: ScopeValue) -> ScopeRef {
        if let Some(existing) = key.as_ref().and_then(|k| self.by_key.get(k)) {
            return *existing;
        }
        let prefix = value.prefix();
        let counter = self.counters.entry(prefix).or_insert(0);
        let name = format!("{prefix}{counter}");
        *counter += 1;

        let id = ScopeRef(self.entries.len() as u32);
        self.entries.push((name, value));
        if let Some(key) = key {
            self.by_key.insert(key, id);
        }
        id
    }

    /// The entry stored under `key`.
    pub fn find(&self, key: &str) -> Option<ScopeRef> {
        self.by_key.get(key).copied()
    }

    pub fn get(&self, id: ScopeRef) -> Option<&ScopeValue> {
        self.entries.get(id.0 as usize).map(|(_, value)| value)
    }

    /// Generated name of an entry, for rendering.
    pub fn name(&self, id: ScopeRef) -> &str {
        self.entries
            .get(id.0 as usize)
            .map(|(name, _)| name.as_str())
            .unwrap_or("?")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScopeRef, &str, &ScopeValue)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, (name, value))| (ScopeRef(i as u32), name.as_str(), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dedups_by_key() {
        let mut scope = ValueScope::new();
        let re = Arc::new(Regex::new("^a").expect("regex"));
        let first = scope.insert(Some("pattern:^a".into()), ScopeValue::Regex(re.clone()));
        let second = scope.insert(Some("pattern:^a".into()), ScopeValue::Regex(re));
        assert_eq!(first, second);
        assert_eq!(scope.len(), 1);
    }

    #[test]
    fn names_count_per_prefix() {
        let mut scope = ValueScope::new();
        let a = scope.insert(None, ScopeValue::Json(json!(1)));
        let b = scope.insert(None, ScopeValue::Json(json!(2)));
        let re = scope.insert(None, ScopeValue::Regex(Arc::new(Regex::new("x").expect("regex"))));
        assert_eq!(scope.name(a), "schema0");
        assert_eq!(scope.name(b), "schema1");
        assert_eq!(scope.name(re), "pattern0");
    }
}
