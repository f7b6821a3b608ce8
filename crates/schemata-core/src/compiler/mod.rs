//! Turns schema environments into validator programs.
//!
//! One [`Compiler`] run compiles a root environment and, through `$ref`,
//! everything it reaches. Each environment is compiled once per cache:
//! the first visit installs an empty [`Link`] before building, so a
//! reference back into a schema still being compiled (recursion) receives
//! that link and calls through it once it is filled.
//!
//! Per schema object the emitted program checks `type` first, then runs
//! the rule groups in registry order, each behind a guard on the data
//! type. Without `allErrors` the first error ends the call, except inside
//! composite contexts (`anyOf`, `not`, ...) where later checks are gated
//! on no new errors instead.

mod keyword;
mod macros;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use schemata_types::{CoerceTypes, ExtendRefs, JsonType, Options, TypeSet};

use crate::codegen::render::render;
use crate::codegen::{optimize, CodeBuilder, Cond, ErrorSpec, Init, Name, Param, ScopeValue, Stmt, Test};
use crate::error::SchemaError;
use crate::keywords::{CompileFn, CompiledCheck, FormatSource, Implementation, KeywordRegistry, Rule};
use crate::resolver::{inlineable, EnvKey, Resolver, SchemaDoc, SchemaEnv};
use crate::uri;
use crate::validator::{Link, Validator};

pub use keyword::{KeywordCx, KeywordError, Sub};

/// Compiled artifacts shared across compiler runs.
#[derive(Default)]
pub(crate) struct CompileCache {
    links: HashMap<EnvKey, Arc<Link>>,
    /// `(keyword, keyword value)` → check built by a compiled keyword.
    closures: HashMap<(String, String), CompiledCheck>,
}

impl CompileCache {
    pub(crate) fn get(&self, env: &SchemaEnv) -> Option<Arc<Validator>> {
        self.links.get(&env.key()).and_then(|link| link.get().cloned())
    }

    /// Drop every artifact compiled from `doc`.
    pub(crate) fn purge(&mut self, doc: &Arc<SchemaDoc>) {
        self.links.retain(|key, _| !key.belongs_to(doc));
    }

    pub(crate) fn len(&self) -> usize {
        self.links.len()
    }
}

/// Where in the schema and the data a node is being compiled.
#[derive(Debug, Clone)]
pub(crate) struct CompileCx {
    /// Slot holding the data under validation.
    pub data: Name,
    /// Error checkpoint taken at the start of the call.
    pub call_errs: Name,
    pub level: usize,
    /// `#`-prefixed JSON pointer of the node within its document.
    pub schema_path: String,
    pub base_id: String,
    pub root: Arc<SchemaDoc>,
    /// Inside `anyOf`, `oneOf`, `not`, `contains`, `if` or `propertyNames`,
    /// where errors may be discarded later.
    pub composite: bool,
    /// The node's own identifier is already applied to `base_id`.
    pub no_rescope: bool,
    pub is_async: bool,
}

pub(crate) struct Compiler<'e> {
    opts: &'e Options,
    keywords: &'e KeywordRegistry,
    formats: &'e dyn FormatSource,
    resolver: &'e Resolver,
    cache: &'e mut CompileCache,
    /// Links installed by this run, dropped again if it fails.
    created: Vec<EnvKey>,
}

impl<'e> Compiler<'e> {
    pub(crate) fn new(
        opts: &'e Options,
        keywords: &'e KeywordRegistry,
        formats: &'e dyn FormatSource,
        resolver: &'e Resolver,
        cache: &'e mut CompileCache,
    ) -> Self {
        Self {
            opts,
            keywords,
            formats,
            resolver,
            cache,
            created: Vec::new(),
        }
    }

    /// Compile `env` and everything it references.
    pub(crate) fn compile(mut self, env: &SchemaEnv) -> Result<Arc<Validator>, SchemaError> {
        let result = self.link(env).and_then(|link| {
            link.get()
                .cloned()
                .ok_or_else(|| SchemaError::invalid(env.to_string(), "validator left unlinked"))
        });
        if let Err(err) = &result {
            debug!(schema = %env, error = %err, dropped = self.created.len(), "compilation failed");
            for key in self.created.drain(..) {
                self.cache.links.remove(&key);
            }
        }
        result
    }

    fn link(&mut self, env: &SchemaEnv) -> Result<Arc<Link>, SchemaError> {
        let key = env.key();
        if let Some(link) = self.cache.links.get(&key) {
            return Ok(link.clone());
        }
        let link = Arc::new(Link::new());
        self.cache.links.insert(key.clone(), link.clone());
        self.created.push(key);

        let validator = self.build(env)?;
        if link.set(Arc::new(validator)).is_err() {
            return Err(SchemaError::invalid(env.to_string(), "validator linked twice"));
        }
        Ok(link)
    }

    fn build(&mut self, env: &SchemaEnv) -> Result<Validator, SchemaError> {
        let node = env
            .node()
            .ok_or_else(|| SchemaError::invalid(env.to_string(), "no schema at this location"))?;
        let is_async = is_async_schema(node);

        let mut code = CodeBuilder::new();
        let data = code.let_("data", Init::Root);
        let errs = code.let_("errs", Init::ErrorCount);
        let ctx = CompileCx {
            data,
            call_errs: errs,
            level: 0,
            schema_path: format!("#{}", env.pointer),
            base_id: env.base_id.clone(),
            root: env.doc.clone(),
            composite: false,
            no_rescope: true,
            is_async,
        };
        self.node(&mut code, node, &ctx)?;
        if is_async {
            code.if_(Cond::ErrorsSince(errs));
            code.push(Stmt::Throw { since: errs });
            code.end_if();
            code.return_(Cond::Const(true));
        } else {
            code.return_(Cond::no_errors_since(errs));
        }

        let mut program = code.finish()?;
        let emitted = program.size();
        program.body = optimize(std::mem::take(&mut program.body));
        let source = self.opts.keep_source.then(|| render(&program));
        debug!(
            schema = %env,
            emitted,
            size = program.size(),
            scope = program.scope.len(),
            is_async,
            "compiled validator"
        );
        Ok(Validator::new(program, node.clone(), is_async, source, self.opts))
    }

    /// Emit the checks of one schema node.
    pub(crate) fn node(&mut self, code: &mut CodeBuilder, schema: &Value, ctx: &CompileCx) -> Result<(), SchemaError> {
        match schema {
            Value::Bool(true) => Ok(()),
            Value::Bool(false) => {
                self.report(
                    code,
                    ErrorSpec {
                        keyword: "false schema".to_string(),
                        schema_path: ctx.schema_path.clone(),
                        message: "boolean schema is false".to_string(),
                        params: Vec::new(),
                        data: ctx.data,
                        schema: self.opts.verbose.then_some(Value::Bool(false)),
                        with_data: self.opts.verbose,
                    },
                );
                self.exit(code, ctx);
                Ok(())
            }
            Value::Object(map) => self.object(code, map, ctx),
            _ => Err(SchemaError::invalid(&ctx.schema_path, "schema must be an object or a boolean")),
        }
    }

    fn object(&mut self, code: &mut CodeBuilder, map: &Map<String, Value>, ctx: &CompileCx) -> Result<(), SchemaError> {
        let rescoped;
        let ctx = match self.resolver.id_of(map) {
            Some(id) if !ctx.no_rescope => {
                let full = uri::resolve(&ctx.base_id, id);
                if uri::is_pointer_fragment(uri::split_fragment(&full).1) {
                    rescoped = CompileCx {
                        base_id: full,
                        no_rescope: true,
                        ..ctx.clone()
                    };
                    &rescoped
                } else {
                    ctx
                }
            }
            _ => ctx,
        };

        let keywords = self.keywords;
        let map = macros::expand(keywords, map, &ctx.schema_path, 0)?;
        let map = map.as_ref();

        if self.opts.strict_keywords {
            if let Some(unknown) = map.keys().find(|k| !keywords.is_known(k)) {
                return Err(SchemaError::UnknownKeyword {
                    keyword: unknown.clone(),
                    path: ctx.schema_path.clone(),
                });
            }
        }

        if map.contains_key("$ref") && self.opts.extend_refs != ExtendRefs::Apply {
            let siblings: Vec<&str> = map
                .keys()
                .map(String::as_str)
                .filter(|k| *k != "$ref" && keywords.is_validation_keyword(k))
                .collect();
            if !siblings.is_empty() {
                if self.opts.extend_refs == ExtendRefs::Fail {
                    return Err(SchemaError::invalid(
                        &ctx.schema_path,
                        format!("$ref cannot have sibling keywords: {}", siblings.join(", ")),
                    ));
                }
                warn!(path = %ctx.schema_path, ignored = ?siblings, "$ref: keywords ignored in schema");
            }
            if let Some(rule) = keywords.lookup("$ref") {
                self.rule(code, rule, map, ctx)?;
            }
            return Ok(());
        }

        let types = match map.get("type") {
            Some(value) => Some(parse_types(value, &ctx.schema_path)?),
            None => None,
        };
        let declared: Option<TypeSet> = types.as_ref().map(|t| t.iter().copied().collect());

        let errs = code.let_("errs", Init::ErrorCount);
        let depth = code.depth();
        let gate = !self.opts.all_errors && ctx.composite;

        if let (Some(types), Some(value)) = (&types, map.get("type")) {
            self.type_check(code, types, value, ctx);
            if gate {
                code.if_(Cond::no_errors_since(errs));
            }
        }

        for group in keywords.groups() {
            let rules: Vec<&Arc<Rule>> = group
                .rules
                .iter()
                .filter(|r| !r.is_macro() && r.applies(map))
                .collect();
            let Some(first) = rules.first() else {
                continue;
            };
            if let (Some(ty), Some(set)) = (group.ty, declared) {
                if !set.admits(ty) {
                    if self.opts.strict_type_checks {
                        return Err(SchemaError::IncompatibleKeyword {
                            keyword: first.keyword.clone(),
                            types: set.to_string(),
                        });
                    }
                    trace!(keyword = %first.keyword, types = %set, "rule group unreachable");
                    continue;
                }
            }

            let group_depth = code.depth();
            if let Some(ty) = group.ty {
                let enforced = !self.opts.all_errors
                    && declared.is_some_and(|set| set.iter().all(|t| served_by(t, ty)));
                if !enforced {
                    code.if_(Cond::is_type(ctx.data, ty));
                }
            }
            for (i, rule) in rules.iter().enumerate() {
                self.rule(code, rule, map, ctx)?;
                if gate && i + 1 < rules.len() {
                    code.if_(Cond::no_errors_since(errs));
                }
            }
            code.close_to(group_depth);
            if gate {
                code.if_(Cond::no_errors_since(errs));
            }
        }
        code.close_to(depth);
        Ok(())
    }

    fn type_check(&mut self, code: &mut CodeBuilder, types: &[JsonType], value: &Value, ctx: &CompileCx) {
        let set: TypeSet = types.iter().copied().collect();
        let spec = ErrorSpec {
            keyword: "type".to_string(),
            schema_path: format!("{}/type", ctx.schema_path),
            message: "must be {type}".to_string(),
            params: vec![("type".to_string(), Param::Lit(value.clone()))],
            data: ctx.data,
            schema: self.opts.verbose.then(|| value.clone()),
            with_data: self.opts.verbose,
        };

        code.if_(Cond::Type { data: ctx.data, types: set }.not());
        match self.opts.coerce_types {
            CoerceTypes::Off => {
                self.report(code, spec);
                self.exit(code, ctx);
            }
            mode => {
                let coerced = code.name("coerced");
                code.push(Stmt::Coerce {
                    data: ctx.data,
                    to: types.to_vec(),
                    wrap_arrays: mode == CoerceTypes::Array,
                    result: coerced,
                });
                code.if_(Cond::Var(coerced).not());
                self.report(code, spec);
                self.exit(code, ctx);
                code.end_if();
            }
        }
        code.end_if();
    }

    fn rule(
        &mut self,
        code: &mut CodeBuilder,
        rule: &Rule,
        map: &Map<String, Value>,
        ctx: &CompileCx,
    ) -> Result<(), SchemaError> {
        if let Some(dep) = rule.dependencies.iter().find(|d| !map.contains_key(*d)) {
            return Err(SchemaError::MissingKeywordDependency {
                keyword: rule.keyword.clone(),
                dependency: dep.clone(),
            });
        }
        let value = map.get(&rule.keyword).unwrap_or(&Value::Null);
        if map.contains_key(&rule.keyword) {
            rule.check_value(value)?;
        }
        let check = match &rule.implementation {
            Implementation::Compiled(f) => Some(self.closure(&rule.keyword, f, value, map)?),
            _ => None,
        };

        let depth = code.depth();
        let errs = code.let_("errs", Init::ErrorCount);
        let mut cx = KeywordCx::new(self, code, rule, value, map, ctx, errs);
        match &rule.implementation {
            Implementation::Code(f) => f(&mut cx)?,
            Implementation::Predicate(f) => {
                let func = cx.scope_value(Some(format!("func:{}", rule.keyword)), ScopeValue::Predicate(f.clone()));
                let schema = cx.scope_value(Some(format!("schema:{value}")), ScopeValue::Json(value.clone()));
                let parent = Value::Object(map.clone());
                let parent = cx.scope_value(Some(format!("schema:{parent}")), ScopeValue::Json(parent));
                let data = cx.data();
                cx.pass_if(Cond::test(data, Test::Predicate { func, schema, parent }));
            }
            Implementation::Compiled(_) => {
                if let Some(check) = check {
                    let id = cx.scope_value(
                        Some(format!("check:{}:{value}", rule.keyword)),
                        ScopeValue::Closure(check),
                    );
                    let data = cx.data();
                    cx.pass_if(Cond::test(data, Test::Closure(id)));
                }
            }
            Implementation::Macro(_) => {}
        }
        cx.finish();
        code.close_to(depth);
        Ok(())
    }

    /// The check a compiled keyword builds for `value`, made once per
    /// distinct value.
    fn closure(
        &mut self,
        keyword: &str,
        f: &CompileFn,
        value: &Value,
        parent: &Map<String, Value>,
    ) -> Result<CompiledCheck, SchemaError> {
        let key = (keyword.to_string(), value.to_string());
        if let Some(check) = self.cache.closures.get(&key) {
            return Ok(check.clone());
        }
        let check = f(value, &Value::Object(parent.clone())).map_err(SchemaError::Extension)?;
        trace!(keyword, "compiled keyword closure");
        self.cache.closures.insert(key, check.clone());
        Ok(check)
    }

    /// Emit a `$ref`: inline the target or call its validator.
    pub(crate) fn reference(&mut self, code: &mut CodeBuilder, reference: &str, ctx: &CompileCx) -> Result<(), SchemaError> {
        let target = self.resolver.resolve_ref(&ctx.base_id, reference, Some(&ctx.root))?;
        self.check_ref_cycle(&target)?;
        let node = target
            .node()
            .ok_or_else(|| SchemaError::invalid(target.to_string(), "reference target vanished"))?;
        let target_async = is_async_schema(node);
        if target_async && !ctx.is_async {
            return Err(SchemaError::AsyncRefFromSync {
                reference: reference.to_string(),
            });
        }

        if self.opts.inline_refs && !target_async && inlineable(node, self.opts.inline_ref_limit) {
            trace!(reference, target = %target, "inlining reference");
            let child = CompileCx {
                level: ctx.level + 1,
                schema_path: format!("#{}", target.pointer),
                base_id: target.base_id.clone(),
                root: target.doc.clone(),
                no_rescope: true,
                ..ctx.clone()
            };
            return self.node(code, node, &child);
        }

        let link = self.link(&target)?;
        let validator = code.scope_value(
            Some(format!("validator:{target}@{}", target.base_id)),
            ScopeValue::Validator(link),
        );
        let valid = code.let_("valid", Init::Const(Value::Bool(false)));
        let call = Stmt::Call {
            target: validator,
            data: ctx.data,
            result: valid,
        };
        if target_async {
            code.try_();
            code.push(call);
            code.catch_();
            code.assign(valid, Init::Const(Value::Bool(false)));
            code.end_try();
        } else {
            code.push(call);
        }
        if !self.opts.all_errors && !ctx.composite {
            code.if_(Cond::Var(valid).not());
            self.exit(code, ctx);
            code.end_if();
        }
        Ok(())
    }

    /// Follow a chain of references that do nothing but refer onward.
    fn check_ref_cycle(&self, target: &SchemaEnv) -> Result<(), SchemaError> {
        let mut seen = vec![target.key()];
        let mut chain = vec![target.to_string()];
        let mut env = target.clone();
        loop {
            let Some(Value::Object(map)) = env.node() else {
                return Ok(());
            };
            let Some(Value::String(next)) = map.get("$ref") else {
                return Ok(());
            };
            let bare = self.opts.extend_refs != ExtendRefs::Apply
                || map
                    .keys()
                    .all(|k| k == "$ref" || !self.keywords.is_validation_keyword(k));
            if !bare {
                return Ok(());
            }
            let Ok(next) = self.resolver.resolve_ref(&env.base_id, next, Some(&env.doc)) else {
                return Ok(());
            };
            chain.push(next.to_string());
            let key = next.key();
            if seen.contains(&key) {
                return Err(SchemaError::RefCycle {
                    chain: chain.join(" -> "),
                });
            }
            seen.push(key);
            env = next;
        }
    }

    pub(crate) fn report(&self, code: &mut CodeBuilder, spec: ErrorSpec) {
        code.push(Stmt::Error(Box::new(spec)));
    }

    /// Leave the call after an error, when errors end it.
    pub(crate) fn exit(&self, code: &mut CodeBuilder, ctx: &CompileCx) {
        if self.opts.all_errors || ctx.composite {
            return;
        }
        if ctx.is_async {
            code.push(Stmt::Throw { since: ctx.call_errs });
        } else {
            code.return_(Cond::Const(false));
        }
    }

    pub(crate) fn options(&self) -> &'e Options {
        self.opts
    }

    pub(crate) fn formats(&self) -> &'e dyn FormatSource {
        self.formats
    }
}

fn is_async_schema(schema: &Value) -> bool {
    schema.get("$async").and_then(Value::as_bool).unwrap_or(false)
}

/// Whether every value of declared type `ty` belongs to `group`.
fn served_by(ty: JsonType, group: JsonType) -> bool {
    ty == group || (ty == JsonType::Integer && group == JsonType::Number)
}

/// `type` as written: a name or an array of names, order kept.
fn parse_types(value: &Value, path: &str) -> Result<Vec<JsonType>, SchemaError> {
    let bad = |reason: String| SchemaError::invalid(format!("{path}/type"), reason);
    let names: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let mut types = Vec::with_capacity(names.len());
    for name in names {
        let name = name.as_str().ok_or_else(|| bad(format!("type names must be strings, got {name}")))?;
        let ty = JsonType::parse(name).map_err(|e| bad(e.to_string()))?;
        if !types.contains(&ty) {
            types.push(ty);
        }
    }
    if types.is_empty() {
        return Err(bad("type must name at least one type".to_string()));
    }
    Ok(types)
}
