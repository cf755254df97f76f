//! Recursive-descent parser and type checker for filter expressions
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparisons
//! (`==`, `!=`, `in`, `not in`), method calls, primaries.
//!
//! Trees never grow taller than [`MAX_DEPTH`], so the recursive type
//! checker and evaluator run in bounded stack.

use crate::error::PredicateError;

use super::ast::{BoolOp, CompareOp, Expr, Literal, StringMethod, Type};
use super::lexer::{tokenize, Token, TokenKind};

/// Deepest nesting a filter expression may have
pub const MAX_DEPTH: usize = 256;

/// Parse an expression, resolving attribute names against `known`
pub fn parse(expr: &str, known: &[&str]) -> Result<Expr, PredicateError> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser {
        expr,
        tokens,
        pos: 0,
        known,
        nesting: 0,
    };

    let root = parser.parse_or()?;
    if parser.peek().is_some() {
        return Err(parser.unexpected("end of expression"));
    }
    Ok(root)
}

/// Infer the type of an expression, rejecting ill-typed operands
pub fn type_of(expr: &str, node: &Expr) -> Result<Type, PredicateError> {
    let mismatch = |message: String| PredicateError::TypeMismatch {
        expr: expr.to_string(),
        message,
    };

    match node {
        Expr::Literal(Literal::Str(_)) | Expr::Attr(_) => Ok(Type::Str),
        Expr::Literal(Literal::Bool(_)) => Ok(Type::Bool),
        Expr::Literal(Literal::List(_)) => Ok(Type::List),
        Expr::Compare { op, lhs, rhs } => {
            let left = type_of(expr, lhs)?;
            let right = type_of(expr, rhs)?;
            match op {
                CompareOp::Eq | CompareOp::Ne => {
                    if left == Type::List || right == Type::List {
                        return Err(mismatch(format!("cannot use '{}' on a list", op)));
                    }
                    if left != right {
                        return Err(mismatch(format!(
                            "cannot compare {} with {} using '{}'",
                            left, right, op
                        )));
                    }
                }
                CompareOp::In | CompareOp::NotIn => {
                    if left != Type::Str {
                        return Err(mismatch(format!(
                            "left operand of '{}' must be a string, found {}",
                            op, left
                        )));
                    }
                    if right == Type::Bool {
                        return Err(mismatch(format!(
                            "right operand of '{}' must be a string or a list, found {}",
                            op, right
                        )));
                    }
                }
            }
            Ok(Type::Bool)
        }
        Expr::Logical { op, lhs, rhs } => {
            let name = match op {
                BoolOp::And => "and",
                BoolOp::Or => "or",
            };
            for side in [lhs, rhs] {
                let ty = type_of(expr, side)?;
                if ty != Type::Bool {
                    return Err(mismatch(format!(
                        "operands of '{}' must be boolean, found {}",
                        name, ty
                    )));
                }
            }
            Ok(Type::Bool)
        }
        Expr::Not(inner) => {
            let ty = type_of(expr, inner)?;
            if ty != Type::Bool {
                return Err(mismatch(format!(
                    "operand of 'not' must be boolean, found {}",
                    ty
                )));
            }
            Ok(Type::Bool)
        }
        Expr::Method { receiver, arg, .. } => {
            let recv = type_of(expr, receiver)?;
            let arg = type_of(expr, arg)?;
            if recv != Type::Str || arg != Type::Str {
                return Err(mismatch(format!(
                    "string methods take a string receiver and argument, found {} and {}",
                    recv, arg
                )));
            }
            Ok(Type::Bool)
        }
    }
}

struct Parser<'a> {
    expr: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    known: &'a [&'a str],
    /// Open `parse_or` calls
    nesting: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn peek_second_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos + 1).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), PredicateError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", kind.describe())))
        }
    }

    fn unexpected(&self, expected: &str) -> PredicateError {
        match self.peek() {
            Some(token) => PredicateError::UnexpectedToken {
                expr: self.expr.to_string(),
                found: token.kind.describe(),
                offset: token.offset,
                expected: expected.to_string(),
            },
            None => PredicateError::UnexpectedEnd {
                expr: self.expr.to_string(),
                expected: expected.to_string(),
            },
        }
    }

    fn too_deep(&self) -> PredicateError {
        PredicateError::TooDeep {
            expr: self.expr.to_string(),
            limit: MAX_DEPTH,
        }
    }

    /// Reject `node` if it makes the tree taller than [`MAX_DEPTH`]
    fn bounded(&self, node: Expr) -> Result<Expr, PredicateError> {
        if node.depth() > MAX_DEPTH {
            return Err(self.too_deep());
        }
        Ok(node)
    }

    fn parse_or(&mut self) -> Result<Expr, PredicateError> {
        if self.nesting >= MAX_DEPTH {
            return Err(self.too_deep());
        }
        self.nesting += 1;
        let parsed = self.parse_disjunction();
        self.nesting -= 1;
        parsed
    }

    fn parse_disjunction(&mut self) -> Result<Expr, PredicateError> {
        let mut lhs = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let rhs = self.parse_and()?;
            lhs = self.bounded(Expr::Logical {
                op: BoolOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            })?;
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, PredicateError> {
        let mut lhs = self.parse_not()?;
        while self.eat(&TokenKind::And) {
            let rhs = self.parse_not()?;
            lhs = self.bounded(Expr::Logical {
                op: BoolOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            })?;
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, PredicateError> {
        let mut negations = 0usize;
        while self.eat(&TokenKind::Not) {
            negations += 1;
            if negations > MAX_DEPTH {
                return Err(self.too_deep());
            }
        }
        let mut expr = self.parse_comparison()?;
        for _ in 0..negations {
            expr = self.bounded(Expr::Not(Box::new(expr)))?;
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, PredicateError> {
        let lhs = self.parse_postfix()?;

        let op = match self.peek_kind() {
            Some(TokenKind::EqEq) => CompareOp::Eq,
            Some(TokenKind::NotEq) => CompareOp::Ne,
            Some(TokenKind::In) => CompareOp::In,
            Some(TokenKind::Not) if self.peek_second_kind() == Some(&TokenKind::In) => {
                self.pos += 1;
                CompareOp::NotIn
            }
            _ => return Ok(lhs),
        };
        self.pos += 1;

        let tuple = matches!(self.peek_kind(), Some(TokenKind::LParen))
            && matches!(
                self.peek_second_kind(),
                Some(TokenKind::Str(_) | TokenKind::RParen)
            );
        let rhs = match op {
            CompareOp::In | CompareOp::NotIn if tuple => {
                self.pos += 1;
                self.parse_tuple()?
            }
            _ => self.parse_postfix()?,
        };

        self.bounded(Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, PredicateError> {
        let mut expr = self.parse_primary()?;

        while self.eat(&TokenKind::Dot) {
            let name = match self.peek_kind() {
                Some(TokenKind::Ident(name)) => name.clone(),
                _ => return Err(self.unexpected("method name")),
            };
            self.pos += 1;
            let method =
                StringMethod::from_name(&name).ok_or_else(|| PredicateError::UnknownMethod {
                    expr: self.expr.to_string(),
                    name: name.clone(),
                })?;

            self.expect(TokenKind::LParen)?;
            let arg = self.parse_or()?;
            self.expect(TokenKind::RParen)?;

            expr = self.bounded(Expr::Method {
                receiver: Box::new(expr),
                method,
                arg: Box::new(arg),
            })?;
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, PredicateError> {
        let Some(token) = self.advance() else {
            return Err(self.unexpected("a value"));
        };

        match token.kind {
            TokenKind::Str(value) => Ok(Expr::Literal(Literal::Str(value))),
            TokenKind::True => Ok(Expr::Literal(Literal::Bool(true))),
            TokenKind::False => Ok(Expr::Literal(Literal::Bool(false))),
            TokenKind::Ident(name) => {
                if !self.known.contains(&name.as_str()) {
                    return Err(PredicateError::UnknownAttribute {
                        expr: self.expr.to_string(),
                        name,
                        known: self.known.join(", "),
                    });
                }
                Ok(Expr::Attr(name))
            }
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => self.parse_list(TokenKind::RBracket),
            _ => {
                self.pos -= 1;
                Err(self.unexpected("a value"))
            }
        }
    }

    /// Parenthesised strings after `in`: `('a')` is the string `a`,
    /// while `('a',)`, `('a', 'b')` and `()` are tuples
    fn parse_tuple(&mut self) -> Result<Expr, PredicateError> {
        let (mut items, trailing_comma) = self.parse_items(TokenKind::RParen)?;
        if items.len() == 1 && !trailing_comma {
            return Ok(Expr::Literal(Literal::Str(items.remove(0))));
        }
        Ok(Expr::Literal(Literal::List(items)))
    }

    fn parse_list(&mut self, close: TokenKind) -> Result<Expr, PredicateError> {
        let (items, _) = self.parse_items(close)?;
        Ok(Expr::Literal(Literal::List(items)))
    }

    /// String items up to `close`; the opening bracket is already consumed.
    /// Also reports whether the last item was followed by a comma.
    fn parse_items(&mut self, close: TokenKind) -> Result<(Vec<String>, bool), PredicateError> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            if self.eat(&close) {
                break;
            }
            match self.peek_kind() {
                Some(TokenKind::Str(value)) => {
                    items.push(value.clone());
                    self.pos += 1;
                }
                _ => return Err(self.unexpected("a string literal")),
            }
            trailing_comma = self.eat(&TokenKind::Comma);
            if !trailing_comma {
                self.expect(close)?;
                break;
            }
        }
        Ok((items, trailing_comma))
    }
}
