//! Peephole optimizer over the IR.
//!
//! Passes repeat until nothing changes (bounded by [`MAX_PASSES`]):
//!
//! - constant conditions fold and dead branches disappear
//! - empty `if`, loop and `try` blocks are dropped
//! - a constant `let` read once by a condition or error parameter is
//!   substituted in place, unused side-effect-free `let`s are removed
//! - statements after `return`/`break`/`throw` in the same block are dropped

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use super::ir::{Block, Cond, ErrorSpec, Init, Name, Param, Stmt};

const MAX_PASSES: usize = 8;

/// Optimize a program body.
pub fn optimize(mut body: Block) -> Block {
    for _ in 0..MAX_PASSES {
        let usage = Usage::collect(&body);
        let mut pass = Pass::new(&usage);
        body = pass.block(body);
        if !pass.changed {
            break;
        }
    }
    body
}

#[derive(Default, Clone, Copy)]
struct Counts {
    lets: u32,
    writes: u32,
    /// Reads that accept a substituted constant.
    value_reads: u32,
    /// Reads that need a live slot (data positions, checkpoints).
    slot_reads: u32,
}

#[derive(Default)]
struct Usage {
    counts: HashMap<Name, Counts>,
    consts: HashMap<Name, Value>,
    pure_lets: HashSet<Name>,
}

impl Usage {
    fn collect(body: &[Stmt]) -> Self {
        let mut usage = Usage::default();
        usage.block(body);
        usage
    }

    fn entry(&mut self, name: Name) -> &mut Counts {
        self.counts.entry(name).or_default()
    }

    fn block(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let { name, init } => {
                self.entry(*name).lets += 1;
                if let Init::Const(value) = init {
                    self.consts.insert(*name, value.clone());
                }
                if init_is_pure(init) {
                    self.pure_lets.insert(*name);
                }
                self.init(init);
            }
            Stmt::Assign { name, init } => {
                self.entry(*name).writes += 1;
                self.init(init);
            }
            Stmt::If { branches, otherwise } => {
                for (cond, body) in branches {
                    self.cond(cond);
                    self.block(body);
                }
                self.block(otherwise);
            }
            Stmt::ForEach {
                data, item, key, body, ..
            } => {
                self.entry(*data).slot_reads += 1;
                self.entry(*item).writes += 1;
                self.entry(*key).writes += 1;
                self.block(body);
            }
            Stmt::Try { body, catch } => {
                self.block(body);
                self.block(catch);
            }
            Stmt::Break => {}
            Stmt::Return(cond) => self.cond(cond),
            Stmt::Throw { since } | Stmt::Truncate(since) => self.entry(*since).slot_reads += 1,
            Stmt::Call { data, result, .. } => {
                self.entry(*data).slot_reads += 1;
                self.entry(*result).writes += 1;
            }
            Stmt::Error(spec) => {
                self.entry(spec.data).slot_reads += 1;
                for (_, param) in &spec.params {
                    if let Param::Var(name) = param {
                        self.entry(*name).value_reads += 1;
                    }
                }
            }
            Stmt::Coerce { data, result, .. } => {
                self.entry(*data).slot_reads += 1;
                self.entry(*result).writes += 1;
            }
            Stmt::SetDefault { data, .. } => self.entry(*data).slot_reads += 1,
            Stmt::RemoveProperty { data, key } => {
                self.entry(*data).slot_reads += 1;
                self.entry(*key).slot_reads += 1;
            }
            Stmt::FindDuplicate { data, i, j } => {
                self.entry(*data).slot_reads += 1;
                self.entry(*i).writes += 1;
                self.entry(*j).writes += 1;
            }
        }
    }

    fn init(&mut self, init: &Init) {
        match init {
            Init::Const(_) | Init::ErrorCount | Init::Root => {}
            Init::Property { parent, .. } | Init::Item { parent, .. } => self.entry(*parent).slot_reads += 1,
            Init::KeyAsData { key, at } => {
                self.entry(*key).slot_reads += 1;
                self.entry(*at).slot_reads += 1;
            }
            Init::Cond(cond) => self.cond(cond),
            Init::Array(items) => {
                for item in items {
                    if let Param::Var(name) = item {
                        self.entry(*name).value_reads += 1;
                    }
                }
            }
        }
    }

    fn cond(&mut self, cond: &Cond) {
        match cond {
            Cond::Const(_) => {}
            Cond::Var(name) => self.entry(*name).value_reads += 1,
            Cond::Not(inner) => self.cond(inner),
            Cond::All(items) | Cond::Any(items) => items.iter().for_each(|c| self.cond(c)),
            Cond::Type { data, .. } | Cond::Test { data, .. } => self.entry(*data).slot_reads += 1,
            Cond::ErrorsSince(name) => self.entry(*name).slot_reads += 1,
        }
    }
}

fn init_is_pure(init: &Init) -> bool {
    match init {
        Init::Cond(cond) => cond.is_pure(),
        _ => true,
    }
}

/// JavaScript-style truthiness, the rule `Cond::Var` follows.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

struct Pass {
    inline: HashMap<Name, Value>,
    dead: HashSet<Name>,
    changed: bool,
}

impl Pass {
    fn new(usage: &Usage) -> Self {
        let mut inline = HashMap::new();
        let mut dead = HashSet::new();
        for (name, counts) in &usage.counts {
            if counts.lets != 1 || counts.writes != 0 {
                continue;
            }
            let reads = counts.value_reads + counts.slot_reads;
            if reads == 0 && usage.pure_lets.contains(name) {
                dead.insert(*name);
            } else if counts.slot_reads == 0 && counts.value_reads == 1 {
                if let Some(value) = usage.consts.get(name) {
                    inline.insert(*name, value.clone());
                }
            }
        }
        Self {
            inline,
            dead,
            changed: false,
        }
    }

    fn block(&mut self, body: Block) -> Block {
        let mut out: Block = Vec::with_capacity(body.len());
        for stmt in body {
            if out.last().is_some_and(Stmt::diverges) {
                self.changed = true;
                continue;
            }
            match stmt {
                Stmt::Let { name, .. } if self.inline.contains_key(&name) || self.dead.contains(&name) => {
                    self.changed = true;
                }
                Stmt::Let { name, init } => out.push(Stmt::Let {
                    name,
                    init: self.init(init),
                }),
                Stmt::Assign { name, init } => out.push(Stmt::Assign {
                    name,
                    init: self.init(init),
                }),
                Stmt::If { branches, otherwise } => self.if_stmt(branches, otherwise, &mut out),
                Stmt::ForEach {
                    data,
                    item,
                    key,
                    from,
                    body,
                } => {
                    let body = self.block(body);
                    if body.is_empty() {
                        self.changed = true;
                    } else {
                        out.push(Stmt::ForEach {
                            data,
                            item,
                            key,
                            from,
                            body,
                        });
                    }
                }
                Stmt::Try { body, catch } => {
                    let body = self.block(body);
                    if body.is_empty() {
                        self.changed = true;
                    } else {
                        let catch = self.block(catch);
                        out.push(Stmt::Try { body, catch });
                    }
                }
                Stmt::Return(cond) => out.push(Stmt::Return(self.cond(cond))),
                Stmt::Error(spec) => out.push(Stmt::Error(Box::new(self.error(*spec)))),
                other => out.push(other),
            }
        }
        out
    }

    fn if_stmt(&mut self, branches: Vec<(Cond, Block)>, otherwise: Block, out: &mut Block) {
        let mut kept: Vec<(Cond, Block)> = Vec::with_capacity(branches.len());
        let mut taken: Option<Block> = None;
        for (cond, body) in branches {
            match self.cond(cond) {
                Cond::Const(false) => self.changed = true,
                Cond::Const(true) => {
                    self.changed = true;
                    taken = Some(self.block(body));
                    break;
                }
                cond => {
                    let body = self.block(body);
                    kept.push((cond, body));
                }
            }
        }
        let otherwise = match taken {
            Some(body) => body,
            None => self.block(otherwise),
        };

        while otherwise.is_empty()
            && kept
                .last()
                .is_some_and(|(cond, body)| body.is_empty() && cond.is_pure())
        {
            kept.pop();
            self.changed = true;
        }

        if kept.is_empty() {
            out.extend(otherwise);
            return;
        }

        // `if c {} else { x }` becomes `if !c { x }`.
        if kept.len() == 1 && kept[0].1.is_empty() && !otherwise.is_empty() {
            self.changed = true;
            let (cond, _) = kept.remove(0);
            out.push(Stmt::If {
                branches: vec![(cond.not(), otherwise)],
                otherwise: Vec::new(),
            });
            return;
        }

        out.push(Stmt::If {
            branches: kept,
            otherwise,
        });
    }

    fn init(&mut self, init: Init) -> Init {
        match init {
            Init::Cond(cond) => Init::Cond(self.cond(cond)),
            Init::Array(mut items) => {
                for item in items.iter_mut() {
                    if let Param::Var(name) = item {
                        if let Some(value) = self.inline.get(name) {
                            *item = Param::Lit(value.clone());
                            self.changed = true;
                        }
                    }
                }
                Init::Array(items)
            }
            other => other,
        }
    }

    fn error(&mut self, mut spec: ErrorSpec) -> ErrorSpec {
        for (_, param) in spec.params.iter_mut() {
            if let Param::Var(name) = param {
                if let Some(value) = self.inline.get(name) {
                    *param = Param::Lit(value.clone());
                    self.changed = true;
                }
            }
        }
        spec
    }

    fn cond(&mut self, cond: Cond) -> Cond {
        match cond {
            Cond::Var(name) => match self.inline.get(&name) {
                Some(value) => {
                    self.changed = true;
                    Cond::Const(truthy(value))
                }
                None => Cond::Var(name),
            },
            Cond::Not(inner) => {
                let inner = self.cond(*inner);
                if matches!(inner, Cond::Const(_) | Cond::Not(_)) {
                    self.changed = true;
                }
                inner.not()
            }
            Cond::All(items) => self.junction(items, true),
            Cond::Any(items) => self.junction(items, false),
            other => other,
        }
    }

    /// Fold `All` (`conjunction`) or `Any`. The identity element drops out,
    /// the absorbing element cuts the list short.
    fn junction(&mut self, items: Vec<Cond>, conjunction: bool) -> Cond {
        let mut kept = Vec::with_capacity(items.len());
        let mut absorbed = false;
        for item in items {
            let item = self.cond(item);
            match item {
                Cond::Const(b) if b == conjunction => self.changed = true,
                Cond::Const(_) => {
                    self.changed = true;
                    absorbed = true;
                    break;
                }
                Cond::All(nested) if conjunction => {
                    self.changed = true;
                    kept.extend(nested);
                }
                Cond::Any(nested) if !conjunction => {
                    self.changed = true;
                    kept.extend(nested);
                }
                other => kept.push(other),
            }
        }
        if absorbed {
            if kept.iter().all(Cond::is_pure) {
                return Cond::Const(!conjunction);
            }
            kept.push(Cond::Const(!conjunction));
        }
        match kept.len() {
            0 => Cond::Const(conjunction),
            1 => kept.remove(0),
            _ if conjunction => Cond::All(kept),
            _ => Cond::Any(kept),
        }
    }
}
