//! Interpreter for compiled programs.
//!
//! One [`Machine`] runs per artifact invocation. Data slots are paths into
//! the value the artifact was called with, so keywords that rewrite data
//! (coercion, defaults, property removal) mutate the caller's value in
//! place and later keywords see the change. Errors go straight into the
//! caller's list; `ErrorsSince` checkpoints are indices into it.

pub mod coerce;
pub mod equal;
pub mod number;

use std::collections::HashMap;

use serde_json::{Map, Value};

use schemata_types::path::pointer;
use schemata_types::{ErrorRecord, PathSeg};

use crate::codegen::ir::{render_message, Block, Cond, ErrorSpec, Init, Name, Param, Stmt, Test};
use crate::codegen::optimize::truthy;
use crate::codegen::{Program, ScopeRef, ScopeValue};
use crate::error::ExtensionError;

/// Why a run stopped before returning a verdict.
#[derive(Debug)]
pub enum Abort {
    /// An async validator rejected; the errors travel with the unwind.
    Thrown(Vec<ErrorRecord>),
    /// User keyword code failed.
    Extension(ExtensionError),
    /// Validator calls nested deeper than the limit.
    Depth(usize),
    /// A linked validator was never filled in.
    Unlinked,
}

enum Flow {
    Next,
    Break,
    Return(bool),
}

#[derive(Clone)]
enum Slot {
    Unset,
    Value(Value),
    /// A location in the data, relative to the call root.
    Data(Vec<PathSeg>),
    /// A property name validated as data, reported at the object `at`.
    Key { name: Value, at: Vec<PathSeg> },
}

/// Run `program` against `root`.
///
/// `prefix` is the instance path of `root` within the caller's data and
/// `depth` the current call nesting.
pub fn run(
    program: &Program,
    root: &mut Value,
    prefix: &[PathSeg],
    errors: &mut Vec<ErrorRecord>,
    depth: usize,
    max_depth: usize,
) -> Result<bool, Abort> {
    let start = errors.len();
    let mut machine = Machine {
        program,
        root,
        prefix,
        errors,
        slots: vec![Slot::Unset; program.slot_count()],
        depth,
        max_depth,
    };
    match machine.block(&program.body)? {
        Flow::Return(valid) => Ok(valid),
        Flow::Next | Flow::Break => Ok(machine.errors.len() == start),
    }
}

struct Machine<'a> {
    program: &'a Program,
    root: &'a mut Value,
    prefix: &'a [PathSeg],
    errors: &'a mut Vec<ErrorRecord>,
    slots: Vec<Slot>,
    depth: usize,
    max_depth: usize,
}

fn walk<'v>(mut value: &'v Value, path: &[PathSeg]) -> Option<&'v Value> {
    for seg in path {
        value = match seg {
            PathSeg::Key(key) => value.as_object()?.get(key)?,
            PathSeg::Index(i) => value.as_array()?.get(*i)?,
        };
    }
    Some(value)
}

fn walk_mut<'v>(mut value: &'v mut Value, path: &[PathSeg]) -> Option<&'v mut Value> {
    for seg in path {
        value = match seg {
            PathSeg::Key(key) => value.as_object_mut()?.get_mut(key)?,
            PathSeg::Index(i) => value.as_array_mut()?.get_mut(*i)?,
        };
    }
    Some(value)
}

impl Machine<'_> {
    fn slot(&self, name: Name) -> &Slot {
        self.slots.get(name.index()).unwrap_or(&Slot::Unset)
    }

    fn set(&mut self, name: Name, slot: Slot) {
        if let Some(target) = self.slots.get_mut(name.index()) {
            *target = slot;
        }
    }

    /// The value a slot stands for.
    fn value(&self, name: Name) -> Option<&Value> {
        match self.slot(name) {
            Slot::Unset => None,
            Slot::Value(v) => Some(v),
            Slot::Data(path) => walk(&*self.root, path),
            Slot::Key { name, .. } => Some(name),
        }
    }

    fn value_mut(&mut self, name: Name) -> Option<&mut Value> {
        let path = match self.slots.get_mut(name.index())? {
            Slot::Data(path) => path.clone(),
            Slot::Value(v) | Slot::Key { name: v, .. } => return Some(v),
            Slot::Unset => return None,
        };
        walk_mut(&mut *self.root, &path)
    }

    fn location(&self, name: Name) -> Vec<PathSeg> {
        let mut path = self.prefix.to_vec();
        match self.slot(name) {
            Slot::Data(p) | Slot::Key { at: p, .. } => path.extend(p.iter().cloned()),
            Slot::Unset | Slot::Value(_) => {}
        }
        path
    }

    fn count(&self, name: Name) -> usize {
        self.value(name)
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(0)
    }

    fn scope(&self, id: ScopeRef) -> Option<&ScopeValue> {
        self.program.scope.get(id)
    }

    fn block(&mut self, body: &Block) -> Result<Flow, Abort> {
        for stmt in body {
            match self.stmt(stmt)? {
                Flow::Next => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Next)
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<Flow, Abort> {
        match stmt {
            Stmt::Let { name, init } | Stmt::Assign { name, init } => {
                let slot = self.init(init)?;
                self.set(*name, slot);
            }
            Stmt::If { branches, otherwise } => {
                for (cond, body) in branches {
                    if self.cond(cond)? {
                        return self.block(body);
                    }
                }
                return self.block(otherwise);
            }
            Stmt::ForEach {
                data,
                item,
                key,
                from,
                body,
            } => return self.for_each(*data, *item, *key, *from, body),
            Stmt::Try { body, catch } => {
                return match self.block(body) {
                    Err(Abort::Thrown(thrown)) => {
                        self.errors.extend(thrown);
                        self.block(catch)
                    }
                    other => other,
                };
            }
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Return(cond) => return Ok(Flow::Return(self.cond(cond)?)),
            Stmt::Throw { since } => {
                let since = self.count(*since).min(self.errors.len());
                return Err(Abort::Thrown(self.errors.split_off(since)));
            }
            Stmt::Call { target, data, result } => {
                let valid = self.call(*target, *data)?;
                self.set(*result, Slot::Value(Value::Bool(valid)));
            }
            Stmt::Error(spec) => {
                let record = self.error(spec);
                self.errors.push(record);
            }
            Stmt::Truncate(since) => {
                let since = self.count(*since);
                self.errors.truncate(since);
            }
            Stmt::Coerce {
                data,
                to,
                wrap_arrays,
                result,
            } => {
                let coerced = self
                    .value_mut(*data)
                    .is_some_and(|value| coerce::coerce(value, to, *wrap_arrays));
                self.set(*result, Slot::Value(Value::Bool(coerced)));
            }
            Stmt::SetDefault { data, key, value } => {
                if let Some(object) = self.value_mut(*data).and_then(Value::as_object_mut) {
                    object.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
            Stmt::RemoveProperty { data, key } => {
                let key = self.value(*key).and_then(Value::as_str).map(str::to_string);
                if let (Some(key), Some(object)) = (key, self.value_mut(*data).and_then(Value::as_object_mut)) {
                    object.remove(&key);
                }
            }
            Stmt::FindDuplicate { data, i, j } => {
                let found = self.value(*data).and_then(Value::as_array).and_then(|items| find_duplicate(items));
                let (vi, vj) = match found {
                    Some((i, j)) => (Value::from(i), Value::from(j)),
                    None => (Value::Null, Value::Null),
                };
                self.set(*i, Slot::Value(vi));
                self.set(*j, Slot::Value(vj));
            }
        }
        Ok(Flow::Next)
    }

    fn for_each(&mut self, data: Name, item: Name, key: Name, from: usize, body: &Block) -> Result<Flow, Abort> {
        let Slot::Data(base) = self.slot(data).clone() else {
            return Ok(Flow::Next);
        };
        enum Keys {
            Indices(usize),
            Names(Vec<String>),
        }
        let keys = match self.value(data) {
            Some(Value::Array(items)) => Keys::Indices(items.len()),
            Some(Value::Object(map)) => Keys::Names(map.keys().cloned().collect()),
            _ => return Ok(Flow::Next),
        };

        let visit = |machine: &mut Self, seg: PathSeg, key_value: Value| -> Result<Option<Flow>, Abort> {
            let mut path = base.clone();
            path.push(seg);
            machine.set(item, Slot::Data(path));
            machine.set(key, Slot::Value(key_value));
            match machine.block(body)? {
                Flow::Next => Ok(None),
                Flow::Break => Ok(Some(Flow::Next)),
                ret @ Flow::Return(_) => Ok(Some(ret)),
            }
        };

        match keys {
            Keys::Indices(len) => {
                for i in from..len {
                    if let Some(flow) = visit(self, PathSeg::Index(i), Value::from(i))? {
                        return Ok(flow);
                    }
                }
            }
            Keys::Names(names) => {
                for name in names {
                    let present = self
                        .value(data)
                        .and_then(Value::as_object)
                        .is_some_and(|map| map.contains_key(&name));
                    if !present {
                        continue;
                    }
                    if let Some(flow) = visit(self, PathSeg::Key(name.clone()), Value::String(name))? {
                        return Ok(flow);
                    }
                }
            }
        }
        Ok(Flow::Next)
    }

    fn call(&mut self, target: ScopeRef, data: Name) -> Result<bool, Abort> {
        let Some(ScopeValue::Validator(link)) = self.scope(target) else {
            return Err(Abort::Unlinked);
        };
        let Some(validator) = link.get().cloned() else {
            return Err(Abort::Unlinked);
        };
        if self.depth + 1 > self.max_depth {
            return Err(Abort::Depth(self.max_depth));
        }
        let location = self.location(data);
        let depth = self.depth + 1;
        let max_depth = self.max_depth;

        let path = match self.slots.get_mut(data.index()) {
            Some(Slot::Data(path)) => path.clone(),
            Some(Slot::Value(v) | Slot::Key { name: v, .. }) => {
                return run(validator.program(), v, &location, self.errors, depth, max_depth);
            }
            Some(Slot::Unset) | None => return Ok(true),
        };
        match walk_mut(&mut *self.root, &path) {
            Some(value) => run(validator.program(), value, &location, self.errors, depth, max_depth),
            None => Ok(true),
        }
    }

    fn init(&mut self, init: &Init) -> Result<Slot, Abort> {
        Ok(match init {
            Init::Const(v) => Slot::Value(v.clone()),
            Init::ErrorCount => Slot::Value(Value::from(self.errors.len())),
            Init::Root => Slot::Data(Vec::new()),
            Init::Property { parent, key } => self.child(*parent, PathSeg::Key(key.clone())),
            Init::Item { parent, index } => self.child(*parent, PathSeg::Index(*index)),
            Init::KeyAsData { key, at } => {
                let name = self.value(*key).cloned().unwrap_or(Value::Null);
                let at = match self.slot(*at) {
                    Slot::Data(p) | Slot::Key { at: p, .. } => p.clone(),
                    _ => Vec::new(),
                };
                Slot::Key { name, at }
            }
            Init::Cond(cond) => Slot::Value(Value::Bool(self.cond(cond)?)),
            Init::Array(items) => Slot::Value(Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Param::Lit(v) => v.clone(),
                        Param::Var(name) => self.value(*name).cloned().unwrap_or(Value::Null),
                    })
                    .collect(),
            )),
        })
    }

    fn child(&self, parent: Name, seg: PathSeg) -> Slot {
        match self.slot(parent) {
            Slot::Data(path) => {
                let mut path = path.clone();
                path.push(seg);
                Slot::Data(path)
            }
            _ => Slot::Unset,
        }
    }

    fn cond(&mut self, cond: &Cond) -> Result<bool, Abort> {
        Ok(match cond {
            Cond::Const(b) => *b,
            Cond::Var(name) => self.value(*name).is_some_and(truthy),
            Cond::Not(inner) => !self.cond(inner)?,
            Cond::All(items) => {
                for item in items {
                    if !self.cond(item)? {
                        return Ok(false);
                    }
                }
                true
            }
            Cond::Any(items) => {
                for item in items {
                    if self.cond(item)? {
                        return Ok(true);
                    }
                }
                false
            }
            Cond::Type { data, types } => self.value(*data).is_some_and(|v| types.matches(v)),
            Cond::ErrorsSince(name) => self.errors.len() > self.count(*name),
            Cond::Test { data, test } => self.test(*data, test)?,
        })
    }

    fn test(&self, data: Name, test: &Test) -> Result<bool, Abort> {
        let Some(value) = self.value(data) else {
            return Ok(!matches!(
                test,
                Test::HasProperty(_) | Test::Equals(_) | Test::OneOf(_) | Test::KeyIn(_)
            ));
        };
        Ok(match test {
            Test::Compare { op, limit } => match value {
                Value::Number(n) => number::compare(n, *op, limit),
                _ => true,
            },
            Test::MultipleOf { divisor, precision } => match value {
                Value::Number(n) => number::is_multiple_of(n, divisor, *precision),
                _ => true,
            },
            Test::Length { op, limit } => {
                let len = match value {
                    Value::String(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    Value::Object(map) => map.len(),
                    _ => return Ok(true),
                };
                number::compare_len(len as u64, *op, *limit)
            }
            Test::Pattern(id) => match (value, self.scope(*id)) {
                (Value::String(s), Some(ScopeValue::Regex(re))) => re.is_match(s),
                _ => true,
            },
            Test::Format(id) => match (value, self.scope(*id)) {
                (Value::String(s), Some(ScopeValue::Format(check))) => check(s),
                _ => true,
            },
            Test::HasProperty(key) => value.as_object().is_some_and(|map| map.contains_key(key)),
            Test::Equals(expected) => equal::equal(value, expected),
            Test::OneOf(allowed) => allowed.iter().any(|a| equal::equal(value, a)),
            Test::KeyIn(keys) => value.as_str().is_some_and(|s| keys.iter().any(|k| k == s)),
            Test::Predicate { func, schema, parent } => {
                let (Some(ScopeValue::Predicate(func)), Some(ScopeValue::Json(schema)), Some(ScopeValue::Json(parent))) =
                    (self.scope(*func), self.scope(*schema), self.scope(*parent))
                else {
                    return Err(Abort::Unlinked);
                };
                func(schema, value, parent).map_err(Abort::Extension)?
            }
            Test::Closure(id) => match self.scope(*id) {
                Some(ScopeValue::Closure(check)) => check(value).map_err(Abort::Extension)?,
                _ => return Err(Abort::Unlinked),
            },
        })
    }

    fn error(&self, spec: &ErrorSpec) -> ErrorRecord {
        let params: Vec<(String, Value)> = spec
            .params
            .iter()
            .map(|(key, param)| {
                let value = match param {
                    Param::Lit(v) => v.clone(),
                    Param::Var(name) => self.value(*name).cloned().unwrap_or(Value::Null),
                };
                (key.clone(), value)
            })
            .collect();
        let message = render_message(&spec.message, &params);
        ErrorRecord {
            keyword: spec.keyword.clone(),
            instance_path: pointer(&self.location(spec.data)),
            schema_path: spec.schema_path.clone(),
            message,
            params: params.into_iter().collect::<Map<String, Value>>(),
            schema: spec.schema.clone(),
            data: if spec.with_data {
                self.value(spec.data).cloned()
            } else {
                None
            },
        }
    }
}

/// Last pair `(i, j)` with `j < i` of equal items, scanning from the end.
fn find_duplicate(items: &[Value]) -> Option<(usize, usize)> {
    if items.iter().all(Value::is_string) {
        let mut last: HashMap<&str, usize> = HashMap::new();
        let mut found = None;
        for (i, item) in items.iter().enumerate() {
            let text = item.as_str().unwrap_or_default();
            if let Some(&j) = last.get(text) {
                found = Some((i, j));
            }
            last.insert(text, i);
        }
        return found;
    }
    last_equal_pair(items)
}

/// The highest `i` equal to an earlier item, with the nearest such `j`.
fn last_equal_pair(items: &[Value]) -> Option<(usize, usize)> {
    for i in (1..items.len()).rev() {
        for j in (0..i).rev() {
            if equal::equal(&items[i], &items[j]) {
                return Some((i, j));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{CmpOp, CodeBuilder};
    use schemata_types::JsonType;
    use serde_json::json;

    fn errors_of(program: &Program, mut data: Value) -> (bool, Vec<ErrorRecord>) {
        let mut errors = Vec::new();
        let valid = run(program, &mut data, &[], &mut errors, 0, 16).expect("run");
        (valid, errors)
    }

    fn spec(data: Name, keyword: &str) -> Stmt {
        Stmt::Error(Box::new(ErrorSpec {
            keyword: keyword.to_string(),
            schema_path: format!("#/{keyword}"),
            message: "must be >= {limit}".to_string(),
            params: vec![("limit".into(), Param::Lit(json!(5)))],
            data,
            schema: None,
            with_data: false,
        }))
    }

    #[test]
    fn records_errors_at_item_paths() {
        let mut code = CodeBuilder::new();
        let data = code.let_("data", Init::Root);
        let errs = code.let_("errs", Init::ErrorCount);
        let (item, _key) = code.for_each(data, 0);
        code.if_(Cond::test(item, Test::Compare { op: CmpOp::Ge, limit: 5.into() }).not());
        code.push(spec(item, "minimum"));
        code.end_if();
        code.end_for();
        code.return_(Cond::no_errors_since(errs));
        let program = code.finish().expect("finish");

        let (valid, errors) = errors_of(&program, json!([7, 3, 1]));
        assert!(!valid);
        let paths: Vec<_> = errors.iter().map(|e| e.instance_path.as_str()).collect();
        assert_eq!(paths, vec!["/1", "/2"]);
        assert_eq!(errors[0].message, "must be >= 5");

        let (valid, errors) = errors_of(&program, json!([5, 6]));
        assert!(valid);
        assert!(errors.is_empty());
    }

    #[test]
    fn try_merges_thrown_errors() {
        let mut code = CodeBuilder::new();
        let data = code.let_("data", Init::Root);
        let errs = code.let_("errs", Init::ErrorCount);
        code.try_();
        code.push(spec(data, "minimum"));
        code.push(Stmt::Throw { since: errs });
        code.catch_();
        code.return_(Cond::Const(false));
        code.end_try();
        code.return_(Cond::Const(true));
        let program = code.finish().expect("finish");

        let (valid, errors) = errors_of(&program, json!(1));
        assert!(!valid);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn coercion_mutates_in_place() {
        let mut code = CodeBuilder::new();
        let data = code.let_("data", Init::Root);
        let child = code.let_(
            "data",
            Init::Property {
                parent: data,
                key: "n".into(),
            },
        );
        let ok = code.name("coerced");
        code.push(Stmt::Coerce {
            data: child,
            to: vec![JsonType::Integer],
            wrap_arrays: false,
            result: ok,
        });
        code.return_(Cond::Var(ok));
        let program = code.finish().expect("finish");

        let mut value = json!({ "n": "5" });
        let mut errors = Vec::new();
        assert!(run(&program, &mut value, &[], &mut errors, 0, 4).expect("run"));
        assert_eq!(value, json!({ "n": 5 }));
    }

    #[test]
    fn duplicates_report_last_pair() {
        assert_eq!(find_duplicate(&[json!(1), json!(2), json!(1)]), Some((2, 0)));
        assert_eq!(find_duplicate(&[json!("a"), json!("b"), json!("a"), json!("b")]), Some((3, 1)));
        assert_eq!(find_duplicate(&[json!({"a": 1}), json!({"a": 1.0})]), Some((1, 0)));
        assert_eq!(find_duplicate(&[json!(1), json!("1")]), None);
        assert_eq!(find_duplicate(&[json!("x"), json!("x"), json!("y")]), Some((1, 0)));
    }

    #[test]
    fn mixed_duplicates_use_the_same_pair_order() {
        let items = [json!({"a": 1, "b": [2]}), json!(1), json!({"b": [2.0], "a": 1}), json!(1.0)];
        assert_eq!(find_duplicate(&items), Some((3, 1)));
        assert_eq!(find_duplicate(&items[..3]), Some((2, 0)));
        assert_eq!(find_duplicate(&[json!(null), json!(false), json!(0)]), None);

        for strings in [
            vec!["a", "b", "a", "b"],
            vec!["x", "x", "x"],
            vec!["p", "q", "r", "q", "p"],
            vec!["solo"],
        ] {
            let items: Vec<Value> = strings.into_iter().map(Value::from).collect();
            assert_eq!(find_duplicate(&items), last_equal_pair(&items), "{items:?}");
        }
    }

    #[test]
    fn unlinked_call_aborts() {
        let mut code = CodeBuilder::new();
        let data = code.let_("data", Init::Root);
        let link = std::sync::Arc::new(crate::validator::Link::new());
        let target = code.scope_value(None, ScopeValue::Validator(link));
        let result = code.name("valid");
        code.push(Stmt::Call { target, data, result });
        code.return_(Cond::Var(result));
        let program = code.finish().expect("finish");
        let mut errors = Vec::new();
        assert!(matches!(
            run(&program, &mut json!(1), &[], &mut errors, 0, 4),
            Err(Abort::Unlinked)
        ));
    }
}
