//! The keyword registry: rules grouped by the data type they apply to.
//!
//! Groups run in a fixed order (number, string, array, object, then any
//! integer, null or boolean groups added by user keywords) with the
//! untyped group last. An integer group is guarded by its own type check,
//! so its rules never see fractional numbers. Rules keep their registration order inside a group, so built-ins
//! always run before user keywords of the same group.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use schemata_types::JsonType;

use super::rule::Rule;
use super::{builtin, ANNOTATIONS};
use crate::error::SchemaError;

/// Rules that apply to one data type, or to any type when `ty` is `None`.
#[derive(Debug, Clone)]
pub struct RuleGroup {
    pub ty: Option<JsonType>,
    pub rules: Vec<Arc<Rule>>,
}

#[derive(Debug, Clone)]
pub struct KeywordRegistry {
    groups: Vec<RuleGroup>,
    rules: HashMap<String, Arc<Rule>>,
    /// Sibling keyword → the rule that handles it.
    implemented: HashMap<String, String>,
}

impl Default for KeywordRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordRegistry {
    /// A registry holding the built-in keywords.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for rule in builtin::rules() {
            registry.insert(rule);
        }
        debug!(keywords = registry.rules.len(), "built-in keywords installed");
        registry
    }

    /// A registry with no keywords at all.
    pub fn empty() -> Self {
        let group = |ty| RuleGroup {
            ty,
            rules: Vec::new(),
        };
        Self {
            groups: vec![
                group(Some(JsonType::Number)),
                group(Some(JsonType::String)),
                group(Some(JsonType::Array)),
                group(Some(JsonType::Object)),
                group(None),
            ],
            rules: HashMap::new(),
            implemented: HashMap::new(),
        }
    }

    /// Add a user keyword.
    ///
    /// The name must be unused, not an annotation, and spelled like an
    /// identifier (`$` and `-` allowed); every dependency must already be
    /// known.
    pub fn register(&mut self, rule: Rule) -> Result<(), SchemaError> {
        let reject = |reason: String| SchemaError::KeywordRegistration {
            keyword: rule.keyword.clone(),
            reason,
        };
        if !valid_name(&rule.keyword) {
            return Err(reject("invalid keyword name".to_string()));
        }
        if self.is_known(&rule.keyword) {
            return Err(reject("keyword is already defined".to_string()));
        }
        if let Some(dep) = rule.dependencies.iter().find(|d| !self.is_known(d)) {
            return Err(reject(format!("unknown dependency {dep:?}")));
        }
        debug!(keyword = %rule.keyword, kind = rule.implementation.kind(), "registered keyword");
        self.insert(rule);
        Ok(())
    }

    /// Remove a user keyword. Built-ins can be removed too.
    pub fn remove(&mut self, keyword: &str) -> Option<Arc<Rule>> {
        let rule = self.rules.remove(keyword)?;
        for group in &mut self.groups {
            group.rules.retain(|r| !Arc::ptr_eq(r, &rule));
        }
        self.implemented.retain(|_, owner| owner != keyword);
        Some(rule)
    }

    fn insert(&mut self, rule: Rule) {
        let rule = Arc::new(rule);
        let targets: Vec<Option<JsonType>> = match rule.types {
            None => vec![None],
            // integer keywords get a group of their own unless the number
            // group already runs them
            Some(types) => types
                .iter()
                .filter(|&ty| !(ty == JsonType::Integer && types.contains(JsonType::Number)))
                .map(Some)
                .collect(),
        };
        for ty in targets {
            let index = self.group_index(ty);
            self.groups[index].rules.push(rule.clone());
        }
        for sibling in &rule.implements {
            self.implemented.insert(sibling.clone(), rule.keyword.clone());
        }
        self.rules.insert(rule.keyword.clone(), rule);
    }

    /// Index of the group for `ty`, created ahead of the untyped group when
    /// missing.
    fn group_index(&mut self, ty: Option<JsonType>) -> usize {
        if let Some(index) = self.groups.iter().position(|g| g.ty == ty) {
            return index;
        }
        let at = self.groups.len().saturating_sub(1);
        self.groups.insert(
            at,
            RuleGroup {
                ty,
                rules: Vec::new(),
            },
        );
        at
    }

    pub fn lookup(&self, keyword: &str) -> Option<&Arc<Rule>> {
        self.rules.get(keyword)
    }

    pub fn groups(&self) -> &[RuleGroup] {
        &self.groups
    }

    /// Rules of the group for `ty`; `None` gives the untyped group.
    /// Integral data also runs the number group.
    pub fn applicable_to(&self, ty: Option<JsonType>) -> &[Arc<Rule>] {
        self.groups
            .iter()
            .find(|g| g.ty == ty)
            .map(|g| g.rules.as_slice())
            .unwrap_or(&[])
    }

    /// A rule name, a sibling handled by a rule, or an annotation.
    pub fn is_known(&self, keyword: &str) -> bool {
        self.is_validation_keyword(keyword) || ANNOTATIONS.contains(&keyword)
    }

    /// Whether the keyword carries validation logic. `type` is checked by
    /// the compiler itself rather than by a rule.
    pub fn is_validation_keyword(&self, keyword: &str) -> bool {
        keyword == TYPE_KEYWORD || self.rules.contains_key(keyword) || self.implemented.contains_key(keyword)
    }
}

const TYPE_KEYWORD: &str = "type";

fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '-'))
}
