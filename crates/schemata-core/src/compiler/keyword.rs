//! The context handed to code-emitting keywords.

use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Value};

use schemata_types::path::escape_token;
use schemata_types::Options;

use super::{CompileCx, Compiler};
use crate::codegen::{CodeBuilder, Cond, ErrorSpec, Init, Name, Param, ScopeRef, ScopeValue, Stmt};
use crate::error::SchemaError;
use crate::keywords::{Format, Rule};

/// An error a keyword reports at validation time.
///
/// The message is a template: `{name}` is replaced by parameter `name`.
#[derive(Debug, Clone)]
pub struct KeywordError {
    message: String,
    params: Vec<(String, Param)>,
    keyword: Option<String>,
    data: Option<Name>,
}

impl KeywordError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            params: Vec::new(),
            keyword: None,
            data: None,
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.push((name.into(), Param::Lit(value.into())));
        self
    }

    /// A parameter read from a slot when the error is recorded.
    pub fn param_var(mut self, name: impl Into<String>, slot: Name) -> Self {
        self.params.push((name.into(), Param::Var(slot)));
        self
    }

    /// Report under another keyword, such as `additionalProperties` from
    /// the rule for `properties`.
    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    /// Report at another data location.
    pub fn at(mut self, data: Name) -> Self {
        self.data = Some(data);
        self
    }
}

/// Where a subschema sits relative to the keyword applying it.
#[derive(Debug, Clone, Default)]
pub struct Sub {
    keyword: Option<String>,
    segments: Vec<String>,
    data: Option<Name>,
    composite: bool,
}

impl Sub {
    pub fn new() -> Self {
        Self::default()
    }

    /// The subschema hangs off another keyword (`then` from `if`).
    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    /// Path segment below the keyword: an index or a property name.
    pub fn segment(mut self, segment: impl ToString) -> Self {
        self.segments.push(segment.to_string());
        self
    }

    /// Validate the data in this slot instead of the current data.
    pub fn data(mut self, data: Name) -> Self {
        self.data = Some(data);
        self
    }

    /// Errors of the subschema may be discarded afterwards.
    pub fn composite(mut self) -> Self {
        self.composite = true;
        self
    }
}

/// Emission context for one keyword of one schema object.
pub struct KeywordCx<'a, 'e> {
    compiler: &'a mut Compiler<'e>,
    code: &'a mut CodeBuilder,
    rule: &'a Rule,
    schema: &'a Value,
    parent: &'a Map<String, Value>,
    ctx: &'a CompileCx,
    errs: Name,
    verdict: Option<Cond>,
}

impl<'a, 'e> KeywordCx<'a, 'e> {
    pub(crate) fn new(
        compiler: &'a mut Compiler<'e>,
        code: &'a mut CodeBuilder,
        rule: &'a Rule,
        schema: &'a Value,
        parent: &'a Map<String, Value>,
        ctx: &'a CompileCx,
        errs: Name,
    ) -> Self {
        Self {
            compiler,
            code,
            rule,
            schema,
            parent,
            ctx,
            errs,
            verdict: None,
        }
    }

    pub fn code(&mut self) -> &mut CodeBuilder {
        self.code
    }

    pub fn keyword(&self) -> &'a str {
        &self.rule.keyword
    }

    /// The keyword's value; `null` when the rule was triggered by a
    /// sibling it implements.
    pub fn schema(&self) -> &'a Value {
        self.schema
    }

    /// The schema object holding the keyword.
    pub fn parent(&self) -> &'a Map<String, Value> {
        self.parent
    }

    /// Slot holding the data under validation.
    pub fn data(&self) -> Name {
        self.ctx.data
    }

    pub fn options(&self) -> &'e Options {
        self.compiler.options()
    }

    pub fn all_errors(&self) -> bool {
        self.options().all_errors
    }

    pub fn is_composite(&self) -> bool {
        self.ctx.composite
    }

    pub fn is_async(&self) -> bool {
        self.ctx.is_async
    }

    /// Nesting level of the schema object.
    pub fn level(&self) -> usize {
        self.ctx.level
    }

    /// Schema path of the keyword.
    pub fn schema_path(&self) -> String {
        format!("{}/{}", self.ctx.schema_path, escape_token(&self.rule.keyword))
    }

    /// Checkpoint taken before the keyword started.
    pub fn errors_at_start(&self) -> Name {
        self.errs
    }

    /// Record the current error count.
    pub fn checkpoint(&mut self) -> Name {
        self.code.let_("errs", Init::ErrorCount)
    }

    /// Drop errors recorded after `checkpoint`.
    pub fn reset_errors(&mut self, checkpoint: Name) {
        self.code.push(Stmt::Truncate(checkpoint));
    }

    /// The keyword passes when `cond` holds. Unless the keyword reported
    /// errors of its own, failing it records the default error.
    pub fn pass_if(&mut self, cond: Cond) {
        self.verdict = Some(match self.verdict.take() {
            Some(prev) => Cond::All(vec![prev, cond]),
            None => cond,
        });
    }

    /// Record the default error when `cond` holds.
    pub fn fail(&mut self, cond: Cond) {
        let error = self.default_error();
        self.fail_with(cond, error);
    }

    /// Record `error` when `cond` holds.
    pub fn fail_with(&mut self, cond: Cond, error: KeywordError) {
        self.code.if_(cond);
        self.error(error);
        self.code.end_if();
    }

    /// Record `error` here, leaving the call when errors end it.
    pub fn error(&mut self, error: KeywordError) {
        let spec = self.spec(error);
        self.compiler.report(self.code, spec);
        self.compiler.exit(self.code, self.ctx);
    }

    /// Record the error of a composite keyword whose subschemas reported
    /// since `since`. Without `allErrors` only the composite error is kept.
    pub fn composite_error(&mut self, since: Name, error: KeywordError) {
        if !self.all_errors() {
            self.reset_errors(since);
        }
        self.error(error);
    }

    /// Open a block that runs only while no errors have been recorded since
    /// `since`, when a later error would be discarded anyway. The rule's
    /// blocks are closed after it returns.
    pub fn gate(&mut self, since: Name) {
        if !self.all_errors() && self.ctx.composite {
            self.code.if_(Cond::no_errors_since(since));
        }
    }

    /// Leave the enclosing loop once errors were recorded since `since`,
    /// unless every error is wanted.
    pub fn break_on_errors(&mut self, since: Name) {
        if !self.all_errors() {
            self.code.if_(Cond::ErrorsSince(since));
            self.code.break_();
            self.code.end_if();
        }
    }

    /// Emit the checks of a subschema.
    pub fn subschema(&mut self, schema: &Value, sub: Sub) -> Result<(), SchemaError> {
        let keyword = sub.keyword.as_deref().unwrap_or(&self.rule.keyword);
        let mut schema_path = format!("{}/{}", self.ctx.schema_path, escape_token(keyword));
        for segment in &sub.segments {
            schema_path.push('/');
            schema_path.push_str(&escape_token(segment));
        }
        let child = CompileCx {
            data: sub.data.unwrap_or(self.ctx.data),
            level: self.ctx.level + 1,
            schema_path,
            composite: self.ctx.composite || sub.composite,
            no_rescope: false,
            ..self.ctx.clone()
        };
        self.compiler.node(self.code, schema, &child)
    }

    /// Emit a reference to another schema.
    pub fn reference(&mut self, reference: &str) -> Result<(), SchemaError> {
        self.compiler.reference(self.code, reference, self.ctx)
    }

    /// Compile `pattern` once per program.
    pub fn regex(&mut self, pattern: &str) -> Result<ScopeRef, SchemaError> {
        let key = format!("pattern:{pattern}");
        if let Some(found) = self.code.scope().find(&key) {
            return Ok(found);
        }
        let re = Regex::new(pattern).map_err(|source| SchemaError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(self.scope_value(Some(key), ScopeValue::Regex(Arc::new(re))))
    }

    pub fn format(&self, name: &str) -> Option<Format> {
        self.compiler.formats().lookup(name)
    }

    /// Inject a runtime value; values with the same `key` are shared.
    pub fn scope_value(&mut self, key: Option<String>, value: ScopeValue) -> ScopeRef {
        self.code.scope_value(key, value)
    }

    pub fn default_error(&self) -> KeywordError {
        KeywordError::new(self.rule.message.clone()).param("keyword", self.rule.keyword.clone())
    }

    fn spec(&self, error: KeywordError) -> ErrorSpec {
        let keyword = error.keyword.unwrap_or_else(|| self.rule.keyword.clone());
        let verbose = self.options().verbose;
        ErrorSpec {
            schema_path: format!("{}/{}", self.ctx.schema_path, escape_token(&keyword)),
            schema: verbose.then(|| self.parent.get(&keyword).cloned().unwrap_or(Value::Null)),
            keyword,
            message: error.message,
            params: error.params,
            data: error.data.unwrap_or(self.ctx.data),
            with_data: verbose,
        }
    }

    /// Emit the default error for a failed verdict.
    pub(crate) fn finish(mut self) {
        let Some(verdict) = self.verdict.take() else {
            return;
        };
        let errs = self.errs;
        self.code
            .if_(Cond::All(vec![verdict.not(), Cond::no_errors_since(errs)]));
        let error = self.default_error();
        self.error(error);
        self.code.end_if();
    }
}
