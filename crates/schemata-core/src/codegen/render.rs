//! Human-readable rendering of a program, kept on artifacts with `keepSource`.

use std::fmt::Write;

use super::ir::{Cond, Init, Name, Param, Stmt, Test};
use super::Program;

/// Render the whole program.
pub fn render(program: &Program) -> String {
    let mut printer = Printer {
        program,
        out: String::new(),
        indent: 0,
    };
    for (_, name, value) in program.scope.iter() {
        printer.line(&format!("scope {name} = {value:?}"));
    }
    printer.block(&program.body);
    printer.out
}

struct Printer<'a> {
    program: &'a Program,
    out: String,
    indent: usize,
}

impl Printer<'_> {
    fn name(&self, name: Name) -> &str {
        self.program
            .names
            .get(name.index())
            .map(String::as_str)
            .unwrap_or("?")
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn nested(&mut self, header: &str, body: &[Stmt]) {
        self.line(header);
        self.indent += 1;
        self.block(body);
        self.indent -= 1;
    }

    fn block(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let { name, init } => {
                let text = format!("let {} = {};", self.name(*name), self.init(init));
                self.line(&text);
            }
            Stmt::Assign { name, init } => {
                let text = format!("{} = {};", self.name(*name), self.init(init));
                self.line(&text);
            }
            Stmt::If { branches, otherwise } => {
                for (i, (cond, body)) in branches.iter().enumerate() {
                    let keyword = if i == 0 { "if" } else { "} else if" };
                    let header = format!("{keyword} {} {{", self.cond(cond));
                    self.nested(&header, body);
                }
                if !otherwise.is_empty() {
                    self.nested("} else {", otherwise);
                }
                self.line("}");
            }
            Stmt::ForEach {
                data,
                item,
                key,
                from,
                body,
            } => {
                let header = format!(
                    "for ({}, {}) in {}[{from}..] {{",
                    self.name(*key),
                    self.name(*item),
                    self.name(*data)
                );
                self.nested(&header, body);
                self.line("}");
            }
            Stmt::Try { body, catch } => {
                self.nested("try {", body);
                self.nested("} catch {", catch);
                self.line("}");
            }
            Stmt::Break => self.line("break;"),
            Stmt::Return(cond) => {
                let text = format!("return {};", self.cond(cond));
                self.line(&text);
            }
            Stmt::Throw { since } => {
                let text = format!("throw errors[{}..];", self.name(*since));
                self.line(&text);
            }
            Stmt::Call { target, data, result } => {
                let text = format!(
                    "{} = {}({});",
                    self.name(*result),
                    self.program.scope.name(*target),
                    self.name(*data)
                );
                self.line(&text);
            }
            Stmt::Error(spec) => {
                let mut params = String::new();
                for (key, param) in &spec.params {
                    let value = match param {
                        Param::Lit(v) => v.to_string(),
                        Param::Var(n) => self.name(*n).to_string(),
                    };
                    let _ = write!(params, ", {key}: {value}");
                }
                let text = format!(
                    "error({:?} at {} {:?}{params});",
                    spec.keyword,
                    self.name(spec.data),
                    spec.schema_path
                );
                self.line(&text);
            }
            Stmt::Truncate(since) => {
                let text = format!("errors.truncate({});", self.name(*since));
                self.line(&text);
            }
            Stmt::Coerce {
                data,
                to,
                wrap_arrays,
                result,
            } => {
                let types: Vec<_> = to.iter().map(|t| t.name()).collect();
                let text = format!(
                    "{} = coerce({}, [{}], arrays: {wrap_arrays});",
                    self.name(*result),
                    self.name(*data),
                    types.join(", ")
                );
                self.line(&text);
            }
            Stmt::SetDefault { data, key, value } => {
                let text = format!("default({}, {key:?}, {value});", self.name(*data));
                self.line(&text);
            }
            Stmt::RemoveProperty { data, key } => {
                let text = format!("delete {}[{}];", self.name(*data), self.name(*key));
                self.line(&text);
            }
            Stmt::FindDuplicate { data, i, j } => {
                let text = format!(
                    "({}, {}) = duplicates({});",
                    self.name(*i),
                    self.name(*j),
                    self.name(*data)
                );
                self.line(&text);
            }
        }
    }

    fn init(&self, init: &Init) -> String {
        match init {
            Init::Const(v) => v.to_string(),
            Init::ErrorCount => "errors.len()".to_string(),
            Init::Root => "data".to_string(),
            Init::Property { parent, key } => format!("{}[{key:?}]", self.name(*parent)),
            Init::Item { parent, index } => format!("{}[{index}]", self.name(*parent)),
            Init::KeyAsData { key, at } => format!("key({} at {})", self.name(*key), self.name(*at)),
            Init::Cond(cond) => self.cond(cond),
            Init::Array(items) => {
                let parts: Vec<_> = items
                    .iter()
                    .map(|item| match item {
                        Param::Lit(v) => v.to_string(),
                        Param::Var(n) => self.name(*n).to_string(),
                    })
                    .collect();
                format!("[{}]", parts.join(", "))
            }
        }
    }

    fn cond(&self, cond: &Cond) -> String {
        match cond {
            Cond::Const(b) => b.to_string(),
            Cond::Var(n) => self.name(*n).to_string(),
            Cond::Not(inner) => format!("!{}", self.cond(inner)),
            Cond::All(items) => self.junction(items, " && "),
            Cond::Any(items) => self.junction(items, " || "),
            Cond::Type { data, types } => format!("is({}, {types})", self.name(*data)),
            Cond::ErrorsSince(n) => format!("(errors.len() > {})", self.name(*n)),
            Cond::Test { data, test } => self.test(*data, test),
        }
    }

    fn junction(&self, items: &[Cond], op: &str) -> String {
        let parts: Vec<_> = items.iter().map(|c| self.cond(c)).collect();
        format!("({})", parts.join(op))
    }

    fn test(&self, data: Name, test: &Test) -> String {
        let d = self.name(data);
        let scope = &self.program.scope;
        match test {
            Test::Compare { op, limit } => format!("({d} {} {limit})", op.symbol()),
            Test::MultipleOf { divisor, .. } => format!("multiple_of({d}, {divisor})"),
            Test::Length { op, limit } => format!("(len({d}) {} {limit})", op.symbol()),
            Test::Pattern(r) => format!("{}.test({d})", scope.name(*r)),
            Test::Format(r) => format!("{}({d})", scope.name(*r)),
            Test::HasProperty(key) => format!("has({d}, {key:?})"),
            Test::Equals(v) => format!("equal({d}, {v})"),
            Test::OneOf(values) => format!("in({d}, {})", serde_json::Value::Array(values.clone())),
            Test::KeyIn(keys) => format!("in({d}, {keys:?})"),
            Test::Predicate { func, schema, parent } => format!(
                "{}({}, {d}, {})",
                scope.name(*func),
                scope.name(*schema),
                scope.name(*parent)
            ),
            Test::Closure(r) => format!("{}({d})", scope.name(*r)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::CodeBuilder;
    use schemata_types::JsonType;

    #[test]
    fn renders_nested_blocks() {
        let mut code = CodeBuilder::new();
        let data = code.let_("data", Init::Root);
        code.if_(Cond::is_type(data, JsonType::String).not());
        code.return_(Cond::Const(false));
        code.end_if();
        code.return_(Cond::Const(true));
        let text = render(&code.finish().expect("finish"));
        assert_eq!(
            text,
            "let data0 = data;\nif !is(data0, string) {\n  return false;\n}\nreturn true;\n"
        );
    }
}
