//! Parameter expressions.
//!
//! Expressions are the bodies of `{...}` values and `.param` assignments:
//! numeric literals with magnitude suffixes, parameter references, the four
//! arithmetic operators with parentheses or braces for grouping, and calls to
//! functions from a [`FunctionRegistry`]. Stochastic functions draw from a
//! random stream seeded by the caller, so resolution is reproducible.

pub mod registry;
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fmt::Display;

use arcstr::ArcStr;
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use unicase::UniCase;

use crate::conv::take_number;
pub use registry::{Function, FunctionRegistry};

/// The result type of expression evaluation.
pub type EvalResult<T> = Result<T, EvalError>;

/// An error resolving an expression.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    /// A parameter depends on itself.
    #[error("cyclic parameter `{name}` (resolution chain: {})", .chain.join(" -> "))]
    CyclicParameter {
        /// The parameter that was reached twice.
        name: ArcStr,
        /// The parameters being resolved, outermost first, ending with `name`.
        chain: Vec<ArcStr>,
    },
    /// The expression is malformed, or calls an unknown function.
    #[error("syntax error in `{expr}` at offset {offset}: {reason}")]
    ExpressionSyntax {
        /// The expression text.
        expr: ArcStr,
        /// The byte offset of the problem.
        offset: usize,
        /// What went wrong.
        reason: ArcStr,
    },
    /// A referenced parameter is not in the table.
    #[error("undefined parameter `{0}`")]
    UndefinedParameter(ArcStr),
    /// A function rejected its arguments.
    #[error("invalid argument to `{function}`: {reason}")]
    InvalidArgument {
        /// The function name.
        function: ArcStr,
        /// What went wrong.
        reason: ArcStr,
    },
}

/// A binary arithmetic operator.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A numeric literal, with its magnitude suffix applied.
    Num(f64),
    /// A parameter reference.
    Var(ArcStr),
    /// Unary negation.
    Neg(Box<Expr>),
    /// A binary operation.
    BinOp {
        /// The operator.
        op: BinOp,
        /// The left operand.
        left: Box<Expr>,
        /// The right operand.
        right: Box<Expr>,
    },
    /// A function call.
    Call {
        /// The function name, as written.
        name: ArcStr,
        /// The arguments.
        args: Vec<Expr>,
    },
}

/// A mapping from parameter names to expression strings.
///
/// Names are case-insensitive. Inserting an existing name replaces its
/// expression but keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamTable {
    values: IndexMap<UniCase<ArcStr>, ArcStr>,
}

/// Resolves expressions against a [`ParamTable`].
///
/// Each parameter is resolved at most once per evaluator, so a stochastic
/// parameter referenced twice yields the same sample both times.
pub struct Evaluator<'a> {
    table: &'a ParamTable,
    registry: &'a FunctionRegistry,
    rng: StdRng,
    stack: Vec<ArcStr>,
    resolved: HashMap<UniCase<ArcStr>, f64>,
}

/// Resolves `expr` against `table` with the default functions.
///
/// The same arguments always give the same result.
pub fn resolve(expr: &str, table: &ParamTable, seed: u64) -> EvalResult<f64> {
    Evaluator::new(table, seed).resolve(expr)
}

impl BinOp {
    fn apply(&self, left: f64, right: f64) -> f64 {
        match self {
            Self::Add => left + right,
            Self::Sub => left - right,
            Self::Mul => left * right,
            Self::Div => left / right,
        }
    }
}

impl Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        };
        write!(f, "{op}")
    }
}

impl Expr {
    /// Parses an expression.
    pub fn parse(expr: &str) -> EvalResult<Self> {
        let mut parser = ExprParser { src: expr, pos: 0 };
        let ast = parser.expr()?;
        parser.skip_ws();
        if parser.pos < expr.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(ast)
    }

    /// The names of all parameters referenced by this expression.
    pub fn vars(&self) -> Vec<&ArcStr> {
        let mut vars = Vec::new();
        self.collect_vars(&mut vars);
        vars
    }

    fn collect_vars<'a>(&'a self, vars: &mut Vec<&'a ArcStr>) {
        match self {
            Self::Num(_) => {}
            Self::Var(name) => vars.push(name),
            Self::Neg(inner) => inner.collect_vars(vars),
            Self::BinOp { left, right, .. } => {
                left.collect_vars(vars);
                right.collect_vars(vars);
            }
            Self::Call { args, .. } => args.iter().for_each(|arg| arg.collect_vars(vars)),
        }
    }
}

struct ExprParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.rest().chars().next()
    }

    fn bump(&mut self, c: char) {
        self.pos += c.len_utf8();
    }

    fn error(&self, reason: impl Into<ArcStr>) -> EvalError {
        EvalError::ExpressionSyntax {
            expr: self.src.into(),
            offset: self.pos,
            reason: reason.into(),
        }
    }

    fn expr(&mut self) -> EvalResult<Expr> {
        let mut left = self.term()?;
        while let Some(op) = self.peek().and_then(|c| match c {
            '+' => Some(BinOp::Add),
            '-' => Some(BinOp::Sub),
            _ => None,
        }) {
            self.pos += 1;
            let right = self.term()?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn term(&mut self) -> EvalResult<Expr> {
        let mut left = self.unary()?;
        while let Some(op) = self.peek().and_then(|c| match c {
            '*' => Some(BinOp::Mul),
            '/' => Some(BinOp::Div),
            _ => None,
        }) {
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> EvalResult<Expr> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some('+') => {
                self.pos += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> EvalResult<Expr> {
        match self.peek() {
            None => Err(self.error("unexpected end of expression")),
            Some(open @ ('(' | '{')) => {
                self.bump(open);
                let inner = self.expr()?;
                let close = if open == '(' { ')' } else { '}' };
                self.expect(close)?;
                Ok(inner)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => {
                let Some((value, rest)) = take_number(self.rest()) else {
                    return Err(self.error("malformed number"));
                };
                self.pos = self.src.len() - rest.len();
                Ok(Expr::Num(value))
            }
            Some(c) if c.is_alphabetic() || c == '_' => {
                let name = self.ident();
                if self.peek() == Some('(') {
                    self.pos += 1;
                    let args = self.call_args()?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(c) => Err(self.error(arcstr::format!("unexpected `{c}`"))),
        }
    }

    fn ident(&mut self) -> ArcStr {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let name = ArcStr::from(&rest[..len]);
        self.pos += len;
        name
    }

    fn call_args(&mut self) -> EvalResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.peek() == Some(')') {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(')') => {
                    self.pos += 1;
                    return Ok(args);
                }
                _ => return Err(self.error("expected `,` or `)`")),
            }
        }
    }

    fn expect(&mut self, c: char) -> EvalResult<()> {
        if self.peek() == Some(c) {
            self.bump(c);
            Ok(())
        } else {
            Err(self.error(arcstr::format!("expected `{c}`")))
        }
    }
}

impl ParamTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the expression of a parameter, returning the previous one.
    pub fn insert(&mut self, name: impl Into<ArcStr>, expr: impl Into<ArcStr>) -> Option<ArcStr> {
        self.values.insert(UniCase::new(name.into()), expr.into())
    }

    /// The expression of a parameter.
    pub fn get(&self, name: &str) -> Option<&ArcStr> {
        self.values.get(&UniCase::new(ArcStr::from(name)))
    }

    /// Returns `true` if the table declares `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The number of parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over the parameters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&ArcStr, &ArcStr)> {
        self.values.iter().map(|(k, v)| (&**k, v))
    }
}

impl<K: Into<ArcStr>, V: Into<ArcStr>> FromIterator<(K, V)> for ParamTable {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut table = Self::new();
        table.extend(iter);
        table
    }
}

impl<K: Into<ArcStr>, V: Into<ArcStr>> Extend<(K, V)> for ParamTable {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<'a> Evaluator<'a> {
    /// Creates an evaluator using the default functions.
    pub fn new(table: &'a ParamTable, seed: u64) -> Self {
        Self::with_registry(table, FunctionRegistry::builtin(), seed)
    }

    /// Creates an evaluator using the given functions.
    pub fn with_registry(table: &'a ParamTable, registry: &'a FunctionRegistry, seed: u64) -> Self {
        Self {
            table,
            registry,
            rng: StdRng::seed_from_u64(seed),
            stack: Vec::new(),
            resolved: HashMap::new(),
        }
    }

    /// Parses and evaluates `expr`.
    pub fn resolve(&mut self, expr: &str) -> EvalResult<f64> {
        let ast = Expr::parse(expr)?;
        self.eval(&ast)
    }

    /// Resolves the named parameter.
    pub fn resolve_param(&mut self, name: &str) -> EvalResult<f64> {
        let key = UniCase::new(ArcStr::from(name));
        if let Some(value) = self.resolved.get(&key) {
            return Ok(*value);
        }
        if self.stack.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            let mut chain = self.stack.clone();
            chain.push(name.into());
            return Err(EvalError::CyclicParameter {
                name: name.into(),
                chain,
            });
        }
        let table = self.table;
        let Some(expr) = table.get(name) else {
            return Err(EvalError::UndefinedParameter(name.into()));
        };
        self.stack.push(name.into());
        let value = self.resolve(expr);
        self.stack.pop();
        let value = value?;
        self.resolved.insert(key, value);
        Ok(value)
    }

    /// Evaluates a parsed expression.
    pub fn eval(&mut self, expr: &Expr) -> EvalResult<f64> {
        match expr {
            Expr::Num(value) => Ok(*value),
            Expr::Var(name) => self.resolve_param(name),
            Expr::Neg(inner) => Ok(-self.eval(inner)?),
            Expr::BinOp { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(op.apply(left, right))
            }
            Expr::Call { name, args } => {
                let Some(function) = self.registry.get(name) else {
                    return Err(EvalError::ExpressionSyntax {
                        expr: name.clone(),
                        offset: 0,
                        reason: arcstr::format!("unknown function `{name}`"),
                    });
                };
                if function.arity() != args.len() {
                    return Err(EvalError::ExpressionSyntax {
                        expr: name.clone(),
                        offset: 0,
                        reason: arcstr::format!(
                            "`{name}` takes {} argument(s), found {}",
                            function.arity(),
                            args.len()
                        ),
                    });
                }
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<EvalResult<Vec<_>>>()?;
                function
                    .call(&mut self.rng, &values)
                    .map_err(|reason| EvalError::InvalidArgument {
                        function: name.clone(),
                        reason,
                    })
            }
        }
    }
}
