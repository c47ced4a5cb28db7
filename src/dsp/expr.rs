// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The small boolean expression language used by a DSP plugin block's
//! `disable` key: an identifier names a boolean flag in the graph's
//! runtime environment (e.g. `swap_lr_disabled`), and `!`, `&&`, `||` and
//! parentheses combine flags. A block whose expression evaluates to `true`
//! is skipped by the graph for that run. A missing variable evaluates to
//! `false` rather than erroring.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum DisableExpr {
    Flag(String),
    Not(Box<DisableExpr>),
    And(Box<DisableExpr>, Box<DisableExpr>),
    Or(Box<DisableExpr>, Box<DisableExpr>),
    Literal(bool),
}

#[derive(Debug, thiserror::Error)]
pub enum ExprParseError {
    #[error("unexpected end of expression")]
    UnexpectedEof,
    #[error("unexpected token {0:?}")]
    UnexpectedToken(String),
    #[error("unbalanced parentheses")]
    Unbalanced,
}

impl fmt::Display for DisableExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisableExpr::Flag(name) => write!(f, "{name}"),
            DisableExpr::Not(inner) => write!(f, "!{inner}"),
            DisableExpr::And(a, b) => write!(f, "({a} && {b})"),
            DisableExpr::Or(a, b) => write!(f, "({a} || {b})"),
            DisableExpr::Literal(b) => write!(f, "{b}"),
        }
    }
}

impl DisableExpr {
    /// Parse a disable expression from a DSP ini value. An empty string is
    /// not a valid expression — the caller decides whether a missing
    /// `disable` key means "never disabled" (see [`crate::dsp::ini`]).
    pub fn parse(input: &str) -> Result<Self, ExprParseError> {
        let tokens = tokenize(input);
        let mut pos = 0;
        let expr = parse_or(&tokens, &mut pos)?;
        if pos != tokens.len() {
            return Err(ExprParseError::UnexpectedToken(tokens[pos].clone()));
        }
        Ok(expr)
    }

    /// Evaluate against a flag environment. Unknown flags default to `false`
    /// (not disabled), matching a freshly started graph with no flags set.
    pub fn eval(&self, env: &HashMap<String, bool>) -> bool {
        match self {
            DisableExpr::Flag(name) => *env.get(name).unwrap_or(&false),
            DisableExpr::Not(inner) => !inner.eval(env),
            DisableExpr::And(a, b) => a.eval(env) && b.eval(env),
            DisableExpr::Or(a, b) => a.eval(env) || b.eval(env),
            DisableExpr::Literal(b) => *b,
        }
    }
}

fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '(' | ')' | '!' => {
                tokens.push(c.to_string());
                chars.next();
            }
            '&' | '|' => {
                chars.next();
                if chars.peek() == Some(&c) {
                    chars.next();
                }
                tokens.push(format!("{c}{c}"));
            }
            _ => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(ident);
            }
        }
    }
    tokens
}

fn parse_or(tokens: &[String], pos: &mut usize) -> Result<DisableExpr, ExprParseError> {
    let mut lhs = parse_and(tokens, pos)?;
    while tokens.get(*pos).map(String::as_str) == Some("||") {
        *pos += 1;
        let rhs = parse_and(tokens, pos)?;
        lhs = DisableExpr::Or(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_and(tokens: &[String], pos: &mut usize) -> Result<DisableExpr, ExprParseError> {
    let mut lhs = parse_unary(tokens, pos)?;
    while tokens.get(*pos).map(String::as_str) == Some("&&") {
        *pos += 1;
        let rhs = parse_unary(tokens, pos)?;
        lhs = DisableExpr::And(Box::new(lhs), Box::new(rhs));
    }
    Ok(lhs)
}

fn parse_unary(tokens: &[String], pos: &mut usize) -> Result<DisableExpr, ExprParseError> {
    if tokens.get(*pos).map(String::as_str) == Some("!") {
        *pos += 1;
        return Ok(DisableExpr::Not(Box::new(parse_unary(tokens, pos)?)));
    }
    parse_primary(tokens, pos)
}

fn parse_primary(tokens: &[String], pos: &mut usize) -> Result<DisableExpr, ExprParseError> {
    let tok = tokens.get(*pos).ok_or(ExprParseError::UnexpectedEof)?;
    if tok == "(" {
        *pos += 1;
        let inner = parse_or(tokens, pos)?;
        if tokens.get(*pos).map(String::as_str) != Some(")") {
            return Err(ExprParseError::Unbalanced);
        }
        *pos += 1;
        return Ok(inner);
    }
    *pos += 1;
    match tok.as_str() {
        "true" => Ok(DisableExpr::Literal(true)),
        "false" => Ok(DisableExpr::Literal(false)),
        ident => Ok(DisableExpr::Flag(ident.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_flag_reads_environment() {
        let expr = DisableExpr::parse("swap_lr_disabled").unwrap();
        let mut env = HashMap::new();
        assert!(!expr.eval(&env));
        env.insert("swap_lr_disabled".to_string(), true);
        assert!(expr.eval(&env));
    }

    #[test]
    fn negation_and_combinators() {
        let expr = DisableExpr::parse("!a && (b || c)").unwrap();
        let mut env = HashMap::new();
        env.insert("a".to_string(), false);
        env.insert("b".to_string(), false);
        env.insert("c".to_string(), true);
        assert!(expr.eval(&env));

        env.insert("a".to_string(), true);
        assert!(!expr.eval(&env));
    }

    #[test]
    fn unbalanced_parens_is_an_error() {
        assert!(DisableExpr::parse("(a && b").is_err());
    }
}
