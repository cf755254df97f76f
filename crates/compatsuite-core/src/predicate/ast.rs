//! Expression tree of the filter language

use std::fmt;

/// Literal values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Str(String),
    Bool(bool),
    /// Only valid as the right operand of `in` / `not in`
    List(Vec<String>),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    In,
    NotIn,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::In => "in",
            Self::NotIn => "not in",
        })
    }
}

/// Binary boolean operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

/// Supported string methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringMethod {
    StartsWith,
    EndsWith,
}

impl StringMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "startswith" => Some(Self::StartsWith),
            "endswith" => Some(Self::EndsWith),
            _ => None,
        }
    }
}

/// A parsed filter expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(Literal),
    /// Reference to a task attribute
    Attr(String),
    Compare {
        op: CompareOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Logical {
        op: BoolOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    Method {
        receiver: Box<Expr>,
        method: StringMethod,
        arg: Box<Expr>,
    },
}

impl Expr {
    /// Height of the tree, a leaf counting as 1. Walks with an explicit
    /// stack so arbitrarily tall trees can be measured.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1usize)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            match node {
                Expr::Literal(_) | Expr::Attr(_) => {}
                Expr::Not(inner) => stack.push((inner, depth + 1)),
                Expr::Compare { lhs, rhs, .. } | Expr::Logical { lhs, rhs, .. } => {
                    stack.push((lhs, depth + 1));
                    stack.push((rhs, depth + 1));
                }
                Expr::Method { receiver, arg, .. } => {
                    stack.push((receiver, depth + 1));
                    stack.push((arg, depth + 1));
                }
            }
        }
        deepest
    }
}

/// Static type of an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Str,
    Bool,
    List,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Str => "string",
            Self::Bool => "boolean",
            Self::List => "list",
        })
    }
}
