// Licensed under the Apache-2.0 license

//! Symbolic parameter expressions retained from elaboration.
//!
//! The front end keeps the source expression next to every elaborated value
//! that was computed from a parameter (array dimensions, instance parameter
//! bindings, property values). The parameter classification engine
//! re-evaluates these expressions to recover which root parameters they
//! depend on.
//!
//! Expressions use a small C-like grammar:
//!
//! ```text
//! expr    := or
//! or      := xor ('|' xor)*
//! xor     := and ('^' and)*
//! and     := shift ('&' shift)*
//! shift   := sum (('<<' | '>>') sum)*
//! sum     := product (('+' | '-') product)*
//! product := unary (('*' | '/' | '%') unary)*
//! unary   := ('-' | '~' | '!') unary | number | identifier | '(' expr ')'
//! ```

use anyhow::{anyhow, bail};
use serde::Deserialize;
use winnow::ascii::{digit1, multispace0};
use winnow::combinator::{alt, delimited, preceded, repeat};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{one_of, take_while};
use winnow::ModalResult;

use crate::value::Value;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    Neg,
    Not,
    LogicalNot,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
        }
    }

    pub(crate) fn apply(&self, lhs: &Value, rhs: &Value) -> Result<Value, anyhow::Error> {
        match self {
            BinaryOp::Add => lhs.try_add(rhs),
            BinaryOp::Sub => lhs.try_sub(rhs),
            BinaryOp::Mul => lhs.try_times(rhs),
            BinaryOp::Div => lhs.try_divide(rhs),
            BinaryOp::Mod => lhs.try_modulus(rhs),
            BinaryOp::Shl => lhs.try_lshift(rhs),
            BinaryOp::Shr => lhs.try_rshift(rhs),
            BinaryOp::And => lhs.try_and(rhs),
            BinaryOp::Or => lhs.try_or(rhs),
            BinaryOp::Xor => lhs.try_xor(rhs),
        }
    }
}

impl UnaryOp {
    pub(crate) fn apply(&self, operand: &Value) -> Result<Value, anyhow::Error> {
        match self {
            UnaryOp::Neg => operand.try_neg(),
            UnaryOp::Not => operand.try_not(),
            UnaryOp::LogicalNot => Ok(operand.logical_not()),
        }
    }
}

/// A parameter-valued expression.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(try_from = "String")]
pub enum Expr {
    Literal(Value),
    /// Reference to a parameter visible from the expression's scope.
    Param(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn param(name: &str) -> Self {
        Expr::Param(name.to_string())
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// Parse an expression from its textual form.
    pub fn parse(src: &str) -> Result<Expr, anyhow::Error> {
        let mut input = src;
        let expr =
            or_expr(&mut input).map_err(|e| anyhow!("Invalid expression `{src}`: {e:?}"))?;
        if !input.trim().is_empty() {
            bail!("Invalid expression `{src}`: unexpected `{}`", input.trim());
        }
        Ok(expr)
    }

    /// Names of every parameter referenced by this expression, in order of appearance.
    pub fn param_refs(&self) -> Vec<&str> {
        let mut refs = vec![];
        self.collect_refs(&mut refs);
        refs
    }

    fn collect_refs<'a>(&'a self, refs: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Param(name) => refs.push(name),
            Expr::Unary(_, operand) => operand.collect_refs(refs),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_refs(refs);
                rhs.collect_refs(refs);
            }
        }
    }
}

impl TryFrom<String> for Expr {
    type Error = anyhow::Error;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Expr::parse(&value)
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Param(name) => write!(f, "{}", name),
            Expr::Unary(op, operand) => {
                let sym = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "~",
                    UnaryOp::LogicalNot => "!",
                };
                write!(f, "{}{}", sym, operand)
            }
            Expr::Binary(op, lhs, rhs) => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
        }
    }
}

//=============================================================================
// Parser
//=============================================================================

fn number(input: &mut &str) -> ModalResult<u64> {
    alt((
        preceded(
            alt(("0x", "0X")),
            take_while(1.., |c: char| c.is_ascii_hexdigit() || c == '_'),
        )
        .try_map(|s: &str| u64::from_str_radix(&s.replace('_', ""), 16)),
        digit1.try_map(|s: &str| s.parse::<u64>()),
    ))
    .parse_next(input)
}

fn identifier(input: &mut &str) -> ModalResult<String> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .map(|s: &str| s.to_string())
        .parse_next(input)
}

fn unary(input: &mut &str) -> ModalResult<Expr> {
    delimited(
        multispace0,
        alt((
            number.map(|n| Expr::Literal(Value::U64(n))),
            identifier.map(Expr::Param),
            delimited('(', or_expr, (multispace0, ')')),
            preceded('-', unary).map(|e| Expr::Unary(UnaryOp::Neg, Box::new(e))),
            preceded('~', unary).map(|e| Expr::Unary(UnaryOp::Not, Box::new(e))),
            preceded('!', unary).map(|e| Expr::Unary(UnaryOp::LogicalNot, Box::new(e))),
        )),
        multispace0,
    )
    .parse_next(input)
}

/// Left-associative binary level: `next (op next)*`.
fn fold_level<'s>(
    input: &mut &'s str,
    next: fn(&mut &'s str) -> ModalResult<Expr>,
    op: impl Parser<&'s str, BinaryOp, ErrMode<ContextError>>,
) -> ModalResult<Expr> {
    let init = next(input)?;
    repeat(0.., (op, next))
        .fold(
            move || init.clone(),
            |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
        )
        .parse_next(input)
}

fn product(input: &mut &str) -> ModalResult<Expr> {
    fold_level(
        input,
        unary,
        alt((
            "*".value(BinaryOp::Mul),
            "/".value(BinaryOp::Div),
            "%".value(BinaryOp::Mod),
        )),
    )
}

fn sum(input: &mut &str) -> ModalResult<Expr> {
    fold_level(
        input,
        product,
        alt(("+".value(BinaryOp::Add), "-".value(BinaryOp::Sub))),
    )
}

fn shift(input: &mut &str) -> ModalResult<Expr> {
    fold_level(
        input,
        sum,
        alt(("<<".value(BinaryOp::Shl), ">>".value(BinaryOp::Shr))),
    )
}

fn and_expr(input: &mut &str) -> ModalResult<Expr> {
    fold_level(input, shift, "&".value(BinaryOp::And))
}

fn xor_expr(input: &mut &str) -> ModalResult<Expr> {
    fold_level(input, and_expr, "^".value(BinaryOp::Xor))
}

fn or_expr(input: &mut &str) -> ModalResult<Expr> {
    fold_level(input, xor_expr, "|".value(BinaryOp::Or))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param_ref() {
        assert_eq!(Expr::parse("N_PORTS").unwrap(), Expr::param("N_PORTS"));
        assert_eq!(Expr::parse("  N_PORTS ").unwrap(), Expr::param("N_PORTS"));
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(Expr::parse("42").unwrap(), Expr::literal(42u64));
        assert_eq!(Expr::parse("0x1_00").unwrap(), Expr::literal(0x100u64));
    }

    #[test]
    fn test_precedence() {
        let expr = Expr::parse("N * 2 + 1").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                BinaryOp::Add,
                Expr::binary(BinaryOp::Mul, Expr::param("N"), Expr::literal(2u64)),
                Expr::literal(1u64),
            )
        );
        assert_eq!(expr.to_string(), "((N * 2) + 1)");
    }

    #[test]
    fn test_parens_and_unary() {
        let expr = Expr::parse("(A + B) << ~C").unwrap();
        assert_eq!(expr.param_refs(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_left_associative() {
        assert_eq!(
            Expr::parse("A - B - 1").unwrap(),
            Expr::binary(
                BinaryOp::Sub,
                Expr::binary(BinaryOp::Sub, Expr::param("A"), Expr::param("B")),
                Expr::literal(1u64),
            )
        );
        assert_eq!(
            Expr::parse("1 << N | M & 0xf").unwrap().to_string(),
            "((1 << N) | (M & 15))"
        );
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(Expr::parse("N )").is_err());
        assert!(Expr::parse("").is_err());
        assert!(Expr::parse("N +").is_err());
    }
}
