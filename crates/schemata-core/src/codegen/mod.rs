//! Structured program emitter.
//!
//! The [`CodeBuilder`] knows nothing about schemas. It allocates variable
//! slots, keeps a stack of open control blocks (`if`/`else if`/`else`,
//! `for`, `try`/`catch`) and a [`ValueScope`] of injected runtime values.
//! [`CodeBuilder::finish`] closes the program; [`optimize`] then folds it and
//! the VM interprets the result.
//!
//! ```text
//! let mut code = CodeBuilder::new();
//! let data = code.let_("data", Init::Root);
//! code.if_(Cond::is_type(data, JsonType::String).not());
//! code.push(Stmt::Return(Cond::Const(false)));
//! code.end_if();
//! code.return_(Cond::Const(true));
//! let program = code.finish()?;
//! ```

pub mod ir;
pub mod optimize;
pub mod render;
pub mod scope;

use std::collections::HashMap;

pub use ir::{Block, CmpOp, Cond, ErrorSpec, Init, Name, Param, Stmt, Test};
pub use optimize::optimize;
pub use scope::{ScopeRef, ScopeValue, ValueScope};

/// A control block was opened or closed out of order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed code block: {0}")]
pub struct CodegenError(pub String);

/// A finished program: statements, slot names and injected values.
#[derive(Debug, Clone)]
pub struct Program {
    pub body: Block,
    pub names: Vec<String>,
    pub scope: ValueScope,
}

impl Program {
    pub fn slot_count(&self) -> usize {
        self.names.len()
    }

    /// Total number of statements, nested ones included.
    pub fn size(&self) -> usize {
        count_stmts(&self.body)
    }
}

pub(crate) fn count_stmts(block: &[Stmt]) -> usize {
    block
        .iter()
        .map(|stmt| {
            1 + match stmt {
                Stmt::If { branches, otherwise } => {
                    branches.iter().map(|(_, b)| count_stmts(b)).sum::<usize>() + count_stmts(otherwise)
                }
                Stmt::ForEach { body, .. } => count_stmts(body),
                Stmt::Try { body, catch } => count_stmts(body) + count_stmts(catch),
                _ => 0,
            }
        })
        .sum()
}

enum FrameKind {
    Root,
    If {
        done: Vec<(Cond, Block)>,
        /// `None` once `else_` has been emitted.
        cond: Option<Cond>,
    },
    For {
        data: Name,
        item: Name,
        key: Name,
        from: usize,
    },
    Try {
        /// Set once `catch_` has been emitted.
        body: Option<Block>,
    },
}

struct Frame {
    kind: FrameKind,
    body: Block,
}

/// Emits IR through a stack of open blocks.
pub struct CodeBuilder {
    frames: Vec<Frame>,
    names: Vec<String>,
    prefixes: HashMap<String, u32>,
    scope: ValueScope,
    misuse: Option<String>,
}

impl Default for CodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame {
                kind: FrameKind::Root,
                body: Vec::new(),
            }],
            names: Vec::new(),
            prefixes: HashMap::new(),
            scope: ValueScope::new(),
            misuse: None,
        }
    }

    /// Allocate a fresh slot. Names get a per-prefix counter suffix, so
    /// `name("valid")` twice yields `valid0` and `valid1`.
    pub fn name(&mut self, prefix: &str) -> Name {
        let counter = self.prefixes.entry(prefix.to_string()).or_insert(0);
        self.names.push(format!("{prefix}{counter}"));
        *counter += 1;
        Name((self.names.len() - 1) as u32)
    }

    /// Allocate a slot and initialize it.
    pub fn let_(&mut self, prefix: &str, init: Init) -> Name {
        let name = self.name(prefix);
        self.push(Stmt::Let { name, init });
        name
    }

    pub fn assign(&mut self, name: Name, init: Init) {
        self.push(Stmt::Assign { name, init });
    }

    /// Append a statement to the innermost open block.
    pub fn push(&mut self, stmt: Stmt) {
        if let Some(frame) = self.frames.last_mut() {
            frame.body.push(stmt);
        }
    }

    pub fn if_(&mut self, cond: Cond) -> &mut Self {
        self.open(FrameKind::If {
            done: Vec::new(),
            cond: Some(cond),
        });
        self
    }

    pub fn else_if(&mut self, cond: Cond) -> &mut Self {
        match self.frames.last_mut() {
            Some(Frame {
                kind: FrameKind::If { done, cond: current @ Some(_) },
                body,
            }) => {
                if let Some(prev) = current.replace(cond) {
                    done.push((prev, std::mem::take(body)));
                }
            }
            _ => self.misused("else_if without open if"),
        }
        self
    }

    pub fn else_(&mut self) -> &mut Self {
        match self.frames.last_mut() {
            Some(Frame {
                kind: FrameKind::If { done, cond: current @ Some(_) },
                body,
            }) => {
                if let Some(prev) = current.take() {
                    done.push((prev, std::mem::take(body)));
                }
            }
            _ => self.misused("else without open if"),
        }
        self
    }

    pub fn end_if(&mut self) -> &mut Self {
        if !matches!(self.frames.last(), Some(Frame { kind: FrameKind::If { .. }, .. })) {
            self.misused("end_if without open if");
            return self;
        }
        if let Some(Frame {
            kind: FrameKind::If { mut done, cond },
            body,
        }) = self.frames.pop()
        {
            let otherwise = match cond {
                Some(cond) => {
                    done.push((cond, body));
                    Vec::new()
                }
                None => body,
            };
            self.push(Stmt::If {
                branches: done,
                otherwise,
            });
        }
        self
    }

    /// Open a loop over `data` starting at index `from`. Returns the item
    /// and key slots.
    pub fn for_each(&mut self, data: Name, from: usize) -> (Name, Name) {
        let item = self.name("item");
        let key = self.name("key");
        self.open(FrameKind::For { data, item, key, from });
        (item, key)
    }

    pub fn end_for(&mut self) -> &mut Self {
        if !matches!(self.frames.last(), Some(Frame { kind: FrameKind::For { .. }, .. })) {
            self.misused("end_for without open for");
            return self;
        }
        if let Some(Frame {
            kind: FrameKind::For { data, item, key, from },
            body,
        }) = self.frames.pop()
        {
            self.push(Stmt::ForEach {
                data,
                item,
                key,
                from,
                body,
            });
        }
        self
    }

    pub fn try_(&mut self) -> &mut Self {
        self.open(FrameKind::Try { body: None });
        self
    }

    pub fn catch_(&mut self) -> &mut Self {
        match self.frames.last_mut() {
            Some(Frame {
                kind: FrameKind::Try { body: saved @ None },
                body,
            }) => {
                *saved = Some(std::mem::take(body));
            }
            _ => self.misused("catch without open try"),
        }
        self
    }

    pub fn end_try(&mut self) -> &mut Self {
        if !matches!(self.frames.last(), Some(Frame { kind: FrameKind::Try { .. }, .. })) {
            self.misused("end_try without open try");
            return self;
        }
        if let Some(Frame {
            kind: FrameKind::Try { body: saved },
            body,
        }) = self.frames.pop()
        {
            let (body, catch) = match saved {
                Some(saved) => (saved, body),
                None => (body, Vec::new()),
            };
            self.push(Stmt::Try { body, catch });
        }
        self
    }

    pub fn break_(&mut self) {
        self.push(Stmt::Break);
    }

    pub fn return_(&mut self, cond: Cond) {
        self.push(Stmt::Return(cond));
    }

    /// Number of open blocks, the root included.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Close open blocks until `depth` remain.
    pub fn close_to(&mut self, depth: usize) {
        while self.frames.len() > depth.max(1) {
            match self.frames.last().map(|f| &f.kind) {
                Some(FrameKind::If { .. }) => {
                    self.end_if();
                }
                Some(FrameKind::For { .. }) => {
                    self.end_for();
                }
                Some(FrameKind::Try { .. }) => {
                    self.end_try();
                }
                Some(FrameKind::Root) | None => break,
            }
        }
    }

    /// Inject a runtime value. Values with the same `key` are shared.
    pub fn scope_value(&mut self, key: Option<String>, value: ScopeValue) -> ScopeRef {
        self.scope.insert(key, value)
    }

    pub fn scope(&self) -> &ValueScope {
        &self.scope
    }

    /// Close the program. Every block opened must have been closed.
    pub fn finish(mut self) -> Result<Program, CodegenError> {
        if let Some(message) = self.misuse.take() {
            return Err(CodegenError(message));
        }
        if self.frames.len() != 1 {
            return Err(CodegenError(format!("{} block(s) left open", self.frames.len() - 1)));
        }
        let body = self.frames.pop().map(|f| f.body).unwrap_or_default();
        Ok(Program {
            body,
            names: self.names,
            scope: self.scope,
        })
    }

    fn open(&mut self, kind: FrameKind) {
        self.frames.push(Frame {
            kind,
            body: Vec::new(),
        });
    }

    fn misused(&mut self, message: &str) {
        if self.misuse.is_none() {
            self.misuse = Some(message.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn names_get_suffixes() {
        let mut code = CodeBuilder::new();
        let a = code.name("valid");
        let b = code.name("valid");
        let c = code.name("errs");
        let program = code.finish().expect("finish");
        assert_eq!(program.names[a.index()], "valid0");
        assert_eq!(program.names[b.index()], "valid1");
        assert_eq!(program.names[c.index()], "errs0");
    }

    #[test]
    fn if_else_chain() {
        let mut code = CodeBuilder::new();
        let v = code.let_("v", Init::Const(json!(1)));
        code.if_(Cond::Var(v));
        code.break_();
        code.else_if(Cond::Const(false));
        code.return_(Cond::Const(false));
        code.else_();
        code.return_(Cond::Const(true));
        code.end_if();
        let program = code.finish().expect("finish");

        match &program.body[1] {
            Stmt::If { branches, otherwise } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(branches[0].1, vec![Stmt::Break]);
                assert_eq!(otherwise, &vec![Stmt::Return(Cond::Const(true))]);
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn try_catch_and_loops() {
        let mut code = CodeBuilder::new();
        let data = code.let_("data", Init::Root);
        let (_item, _key) = code.for_each(data, 2);
        code.try_();
        code.break_();
        code.catch_();
        code.return_(Cond::Const(false));
        code.end_try();
        code.end_for();
        let program = code.finish().expect("finish");
        match &program.body[1] {
            Stmt::ForEach { from, body, .. } => {
                assert_eq!(*from, 2);
                assert!(matches!(&body[0], Stmt::Try { body, catch } if body.len() == 1 && catch.len() == 1));
            }
            other => panic!("expected loop, got {other:?}"),
        }
    }

    #[test]
    fn close_to_unwinds_gates() {
        let mut code = CodeBuilder::new();
        let depth = code.depth();
        code.if_(Cond::Const(true));
        code.if_(Cond::Const(true));
        code.try_();
        code.close_to(depth);
        assert_eq!(code.depth(), depth);
        assert!(code.finish().is_ok());
    }

    #[test]
    fn misuse_is_reported() {
        let mut code = CodeBuilder::new();
        code.end_if();
        assert!(code.finish().is_err());

        let mut code = CodeBuilder::new();
        code.if_(Cond::Const(true));
        assert!(code.finish().is_err());
    }
}
