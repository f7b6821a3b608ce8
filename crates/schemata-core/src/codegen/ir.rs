//! Instruction tree produced by the [`CodeBuilder`](super::CodeBuilder).
//!
//! A compiled validator is a [`Block`] of [`Stmt`]s over numbered variable
//! slots. Slots hold either a plain JSON value (flags, counters, keys) or a
//! reference to a location in the data being validated. Conditions are pure
//! except for [`Test::Predicate`] and [`Test::Closure`], which call user code
//! and may fail.

use serde_json::{Number, Value};

use schemata_types::{JsonType, TypeSet};

use super::scope::ScopeRef;

/// A variable slot allocated by the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(pub(crate) u32);

impl Name {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A sequence of statements.
pub type Block = Vec<Stmt>;

/// How a slot gets its value.
#[derive(Debug, Clone, PartialEq)]
pub enum Init {
    /// A constant.
    Const(Value),
    /// The number of errors recorded so far (a checkpoint).
    ErrorCount,
    /// The data the artifact was called with.
    Root,
    /// Property `key` of the object in `parent`.
    Property { parent: Name, key: String },
    /// Element `index` of the array in `parent`.
    Item { parent: Name, index: usize },
    /// The string held in `key`, treated as data located at `at`.
    KeyAsData { key: Name, at: Name },
    /// The outcome of a condition.
    Cond(Cond),
    /// An array of parameter values.
    Array(Vec<Param>),
}

/// Numeric comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// A boolean condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    Const(bool),
    /// Truthiness of a slot.
    Var(Name),
    Not(Box<Cond>),
    All(Vec<Cond>),
    Any(Vec<Cond>),
    /// The value in `data` has one of `types`.
    Type { data: Name, types: TypeSet },
    /// Errors were recorded after the checkpoint in the slot.
    ErrorsSince(Name),
    /// A keyword-level check of the value in `data`.
    Test { data: Name, test: Test },
}

impl Cond {
    /// Logical negation, folding constants and double negation.
    pub fn not(self) -> Cond {
        match self {
            Cond::Const(b) => Cond::Const(!b),
            Cond::Not(inner) => *inner,
            other => Cond::Not(Box::new(other)),
        }
    }

    /// No errors were recorded after the checkpoint.
    pub fn no_errors_since(checkpoint: Name) -> Cond {
        Cond::ErrorsSince(checkpoint).not()
    }

    pub fn test(data: Name, test: Test) -> Cond {
        Cond::Test { data, test }
    }

    pub fn is_type(data: Name, ty: JsonType) -> Cond {
        Cond::Type {
            data,
            types: TypeSet::single(ty),
        }
    }

    /// Whether evaluating the condition can run user code.
    pub fn is_pure(&self) -> bool {
        match self {
            Cond::Const(_) | Cond::Var(_) | Cond::Type { .. } | Cond::ErrorsSince(_) => true,
            Cond::Not(inner) => inner.is_pure(),
            Cond::All(items) | Cond::Any(items) => items.iter().all(Cond::is_pure),
            Cond::Test { test, .. } => test.is_pure(),
        }
    }
}

/// Keyword checks over a single value.
///
/// Checks only look at values of the type they are about: a length test on
/// a number, for instance, is always true. Type guards are emitted around
/// them separately.
#[derive(Debug, Clone, PartialEq)]
pub enum Test {
    /// `value <op> limit` for numbers.
    Compare { op: CmpOp, limit: Number },
    /// The number is a multiple of `divisor`.
    MultipleOf { divisor: Number, precision: Option<u32> },
    /// Characters of a string, elements of an array or properties of an
    /// object compared against `limit`.
    Length { op: CmpOp, limit: u64 },
    /// The string matches the regex in scope.
    Pattern(ScopeRef),
    /// The string satisfies the format predicate in scope.
    Format(ScopeRef),
    /// The object has property `key`.
    HasProperty(String),
    /// The value is deeply equal to a constant.
    Equals(Value),
    /// The value is deeply equal to one of the constants.
    OneOf(Vec<Value>),
    /// The string is one of the names.
    KeyIn(Vec<String>),
    /// User predicate `(schema, data, parent_schema) -> bool`.
    Predicate {
        func: ScopeRef,
        schema: ScopeRef,
        parent: ScopeRef,
    },
    /// User closure compiled for one keyword value.
    Closure(ScopeRef),
}

impl Test {
    pub fn is_pure(&self) -> bool {
        !matches!(self, Test::Predicate { .. } | Test::Closure(_))
    }
}

/// A value used in error parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Lit(Value),
    /// The value held in a slot at the time the error is recorded.
    Var(Name),
}

/// Everything needed to record one error at run time.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorSpec {
    pub keyword: String,
    pub schema_path: String,
    /// Message template; `{name}` is replaced by the parameter `name`.
    pub message: String,
    pub params: Vec<(String, Param)>,
    /// Slot whose location becomes the error's instance path.
    pub data: Name,
    /// Keyword schema value, attached in verbose mode.
    pub schema: Option<Value>,
    /// Attach the data value (verbose mode).
    pub with_data: bool,
}

/// A statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let { name: Name, init: Init },
    Assign { name: Name, init: Init },
    If {
        branches: Vec<(Cond, Block)>,
        otherwise: Block,
    },
    /// Iterate the elements (from index `from`) of an array or the
    /// properties of an object in `data`. `key` receives the index or the
    /// property name.
    ForEach {
        data: Name,
        item: Name,
        key: Name,
        from: usize,
        body: Block,
    },
    /// Run `body`; errors thrown by an async validator are appended to the
    /// error list and `catch` runs instead of unwinding.
    Try { body: Block, catch: Block },
    Break,
    Return(Cond),
    /// Throw the errors recorded since the checkpoint (async validators).
    Throw { since: Name },
    /// Invoke the validator in scope on `data`, storing the outcome.
    Call {
        target: ScopeRef,
        data: Name,
        result: Name,
    },
    Error(Box<ErrorSpec>),
    /// Drop errors recorded after the checkpoint.
    Truncate(Name),
    /// Try to convert `data` in place to the first of `to` that applies.
    Coerce {
        data: Name,
        to: Vec<JsonType>,
        wrap_arrays: bool,
        result: Name,
    },
    /// Insert `key: value` into the object in `data` if missing.
    SetDefault { data: Name, key: String, value: Value },
    /// Remove the property named by `key` from the object in `data`.
    RemoveProperty { data: Name, key: Name },
    /// Find the last pair of equal elements; `i > j`, both null when unique.
    FindDuplicate { data: Name, i: Name, j: Name },
}

impl Stmt {
    /// Whether control never continues past this statement.
    pub fn diverges(&self) -> bool {
        matches!(self, Stmt::Break | Stmt::Return(_) | Stmt::Throw { .. })
    }
}

/// Render a message template against resolved parameters.
///
/// Strings are inserted bare, arrays joined with `,`, everything else as JSON.
pub fn render_message(template: &str, params: &[(String, Value)]) -> String {
    let mut out = template.to_string();
    for (name, value) in params {
        let needle = format!("{{{name}}}");
        if out.contains(&needle) {
            out = out.replace(&needle, &display_value(value));
        }
    }
    out
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(display_value).collect::<Vec<_>>().join(","),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn negation_folds() {
        assert_eq!(Cond::Const(true).not(), Cond::Const(false));
        let var = Cond::Var(Name(1));
        assert_eq!(var.clone().not().not(), var);
    }

    #[test]
    fn purity() {
        let pure = Cond::test(Name(0), Test::HasProperty("a".into()));
        assert!(pure.is_pure());
        let closure = Cond::All(vec![pure, Cond::test(Name(0), Test::Closure(ScopeRef(0)))]);
        assert!(!closure.is_pure());
    }

    #[test]
    fn renders_templates() {
        let params = vec![
            ("comparison".to_string(), json!(">=")),
            ("limit".to_string(), json!(5)),
        ];
        assert_eq!(render_message("must be {comparison} {limit}", &params), "must be >= 5");
        let types = vec![("type".to_string(), json!(["string", "null"]))];
        assert_eq!(render_message("must be {type}", &types), "must be string,null");
    }
}
