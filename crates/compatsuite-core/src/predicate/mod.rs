//! Restricted filter expressions over task attributes
//!
//! Expressions are tokenized, parsed into a small tree and type checked
//! once; evaluation is a tree walk that cannot fail. Nothing here ever
//! hands text to an interpreter.
//!
//! ```text
//! action.startswith("Build") and platform != "Windows"
//! path in ["Alamofire", "Kingfisher"]
//! ```

mod ast;
mod lexer;
mod parser;

use std::collections::BTreeMap;

use crate::error::PredicateError;

pub use ast::{BoolOp, CompareOp, Expr, Literal, StringMethod, Type};

/// Attributes every execution task may carry
pub const TASK_ATTRIBUTES: &[&str] = &[
    "repository",
    "path",
    "url",
    "branch",
    "maintainer",
    "version",
    "commit",
    "action",
    "configuration",
    "workspace",
    "project",
    "scheme",
    "target",
    "destination",
    "platform",
    "job",
];

/// Attribute values of one task; absent keys are missing values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(BTreeMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A parsed, type-checked boolean expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPredicate {
    source: String,
    root: Expr,
}

impl CompiledPredicate {
    /// Expression text as given
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    pub fn evaluate(&self, attributes: &Attributes) -> bool {
        evaluate(self, attributes)
    }
}

/// Compile an expression against [`TASK_ATTRIBUTES`]
pub fn compile(expression: &str) -> Result<CompiledPredicate, PredicateError> {
    compile_with(expression, TASK_ATTRIBUTES)
}

/// Compile an expression against an explicit attribute vocabulary
pub fn compile_with(
    expression: &str,
    known: &[&str],
) -> Result<CompiledPredicate, PredicateError> {
    let root = parser::parse(expression, known)?;
    let ty = parser::type_of(expression, &root)?;
    if ty != Type::Bool {
        return Err(PredicateError::NotBoolean {
            expr: expression.to_string(),
            found: ty.to_string(),
        });
    }
    Ok(CompiledPredicate {
        source: expression.to_string(),
        root,
    })
}

/// Evaluate a compiled predicate over a task's attributes
pub fn evaluate(predicate: &CompiledPredicate, attributes: &Attributes) -> bool {
    matches!(eval(&predicate.root, attributes), Value::Bool(true))
}

/// Runtime value; `Missing` stands in for an attribute the task lacks
#[derive(Debug, Clone, Copy)]
enum Value<'a> {
    Str(&'a str),
    Bool(bool),
    List(&'a [String]),
    Missing,
}

fn eval<'a>(expr: &'a Expr, attributes: &'a Attributes) -> Value<'a> {
    match expr {
        Expr::Literal(Literal::Str(s)) => Value::Str(s),
        Expr::Literal(Literal::Bool(b)) => Value::Bool(*b),
        Expr::Literal(Literal::List(items)) => Value::List(items),
        Expr::Attr(name) => attributes.get(name).map_or(Value::Missing, Value::Str),
        Expr::Compare { op, lhs, rhs } => {
            let lhs = eval(lhs, attributes);
            let rhs = eval(rhs, attributes);
            Value::Bool(match op {
                CompareOp::Eq => equals(lhs, rhs),
                CompareOp::Ne => !equals(lhs, rhs),
                CompareOp::In => contains(rhs, lhs),
                CompareOp::NotIn => !contains(rhs, lhs),
            })
        }
        Expr::Logical { op, lhs, rhs } => {
            let lhs = truthy(eval(lhs, attributes));
            Value::Bool(match op {
                BoolOp::And => lhs && truthy(eval(rhs, attributes)),
                BoolOp::Or => lhs || truthy(eval(rhs, attributes)),
            })
        }
        Expr::Not(inner) => Value::Bool(!truthy(eval(inner, attributes))),
        Expr::Method {
            receiver,
            method,
            arg,
        } => {
            let result = match (eval(receiver, attributes), eval(arg, attributes)) {
                (Value::Str(s), Value::Str(affix)) => match method {
                    StringMethod::StartsWith => s.starts_with(affix),
                    StringMethod::EndsWith => s.ends_with(affix),
                },
                _ => false,
            };
            Value::Bool(result)
        }
    }
}

fn truthy(value: Value<'_>) -> bool {
    matches!(value, Value::Bool(true))
}

fn equals(lhs: Value<'_>, rhs: Value<'_>) -> bool {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ => false,
    }
}

fn contains(haystack: Value<'_>, needle: Value<'_>) -> bool {
    match (haystack, needle) {
        (Value::Str(h), Value::Str(n)) => h.contains(n),
        (Value::List(items), Value::Str(n)) => items.iter().any(|item| item == n),
        _ => false,
    }
}

/// Include/exclude predicate lists for one filtering level.
///
/// An element passes when no exclude predicate matches and either the
/// include list is empty or at least one include predicate matches.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    include: Vec<CompiledPredicate>,
    exclude: Vec<CompiledPredicate>,
}

impl Filter {
    /// Compile both lists; the first bad expression aborts
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self, PredicateError> {
        let compile_all = |exprs: &[S]| {
            exprs
                .iter()
                .map(|e| compile(e.as_ref()))
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self {
            include: compile_all(include)?,
            exclude: compile_all(exclude)?,
        })
    }

    /// Filter that lets everything through
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn allows(&self, attributes: &Attributes) -> bool {
        if self.exclude.iter().any(|p| p.evaluate(attributes)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.evaluate(attributes))
    }
}
