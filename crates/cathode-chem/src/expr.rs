//! Stoichiometric amount expressions
//!
//! Amounts such as `1-x`, `0.5*(1-y)` or `2/3` are polynomials over
//! single-letter variables. This module parses, combines, substitutes and
//! prints them; division is only defined by constants, which covers every
//! amount that occurs in a formula.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

const EPSILON: f64 = 1e-9;

/// Errors raised while parsing or evaluating an amount expression
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    /// Two or more letters in a row: prose or a misparsed symbol, not a variable
    #[error("word in expression: {0}")]
    Word(String),

    #[error("syntax error in expression: {0}")]
    Syntax(String),

    #[error("division by a non-constant expression")]
    NonConstantDivisor,

    #[error("division by zero")]
    DivisionByZero,

    #[error("unbound variable: {0}")]
    Unbound(char),
}

/// A polynomial with f64 coefficients.
///
/// Each monomial is the sorted list of its variables (repeated for powers);
/// the empty monomial is the constant term.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Expr {
    terms: BTreeMap<Vec<char>, f64>,
}

impl Expr {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        let mut expr = Self::zero();
        expr.add_term(Vec::new(), value);
        expr
    }

    pub fn variable(name: char) -> Self {
        let mut expr = Self::zero();
        expr.add_term(vec![name], 1.0);
        expr
    }

    /// Parse an amount string such as `0.67`, `1-x`, `2(1-x)/3` or `(0.5)*(1)`.
    pub fn parse(input: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expression()?;
        if parser.pos != parser.tokens.len() {
            return Err(ExprError::Syntax(input.to_string()));
        }
        Ok(expr)
    }

    fn add_term(&mut self, monomial: Vec<char>, coefficient: f64) {
        let entry = self.terms.entry(monomial).or_insert(0.0);
        *entry += coefficient;
        if entry.abs() < EPSILON {
            self.terms.retain(|_, c| c.abs() >= EPSILON);
        }
    }

    pub fn add(&self, other: &Expr) -> Expr {
        let mut out = self.clone();
        for (monomial, coefficient) in &other.terms {
            out.add_term(monomial.clone(), *coefficient);
        }
        out
    }

    pub fn sub(&self, other: &Expr) -> Expr {
        self.add(&other.scale(-1.0))
    }

    pub fn mul(&self, other: &Expr) -> Expr {
        let mut out = Expr::zero();
        for (m1, c1) in &self.terms {
            for (m2, c2) in &other.terms {
                let mut monomial: Vec<char> = m1.iter().chain(m2.iter()).copied().collect();
                monomial.sort_unstable();
                out.add_term(monomial, c1 * c2);
            }
        }
        out
    }

    pub fn scale(&self, factor: f64) -> Expr {
        let mut out = Expr::zero();
        for (monomial, coefficient) in &self.terms {
            out.add_term(monomial.clone(), coefficient * factor);
        }
        out
    }

    pub fn div(&self, other: &Expr) -> Result<Expr, ExprError> {
        let divisor = other.as_constant().ok_or(ExprError::NonConstantDivisor)?;
        if divisor.abs() < EPSILON {
            return Err(ExprError::DivisionByZero);
        }
        Ok(self.scale(1.0 / divisor))
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// Numeric value when the expression has no variables
    pub fn as_constant(&self) -> Option<f64> {
        match self.terms.len() {
            0 => Some(0.0),
            1 => self.terms.get(&Vec::new()).copied(),
            _ => None,
        }
    }

    pub fn constant_term(&self) -> f64 {
        self.terms.get(&Vec::new()).copied().unwrap_or(0.0)
    }

    pub fn variables(&self) -> BTreeSet<char> {
        self.terms.keys().flatten().copied().collect()
    }

    pub fn contains_variable(&self, name: char) -> bool {
        self.terms.keys().any(|m| m.contains(&name))
    }

    /// Drop every term mentioning `name`
    pub fn without_variable(&self, name: char) -> Expr {
        let mut out = self.clone();
        out.terms.retain(|m, _| !m.contains(&name));
        out
    }

    /// Replace a variable by a number
    pub fn substitute(&self, name: char, value: f64) -> Expr {
        let mut out = Expr::zero();
        for (monomial, coefficient) in &self.terms {
            let power = monomial.iter().filter(|c| **c == name).count();
            let rest: Vec<char> = monomial.iter().copied().filter(|c| *c != name).collect();
            out.add_term(rest, coefficient * value.powi(power as i32));
        }
        out
    }

    /// Evaluate with all variables bound
    pub fn evaluate(&self, bindings: &BTreeMap<char, f64>) -> Result<f64, ExprError> {
        let mut total = 0.0;
        for (monomial, coefficient) in &self.terms {
            let mut term = *coefficient;
            for name in monomial {
                term *= bindings.get(name).ok_or(ExprError::Unbound(*name))?;
            }
            total += term;
        }
        Ok(total)
    }

    fn term_strings(&self) -> Vec<(bool, String)> {
        self.terms
            .iter()
            .map(|(monomial, coefficient)| {
                let negative = *coefficient < 0.0;
                let magnitude = coefficient.abs();
                let body = if monomial.is_empty() {
                    format_number(magnitude)
                } else {
                    let vars: Vec<String> = monomial.iter().map(|c| c.to_string()).collect();
                    let vars = vars.join("*");
                    if (magnitude - 1.0).abs() < EPSILON {
                        vars
                    } else {
                        format!("{}*{}", format_number(magnitude), vars)
                    }
                };
                (negative, body)
            })
            .collect()
    }

    /// Display form with a positive term moved to the front when possible,
    /// so `-x+1` reads `1-x`.
    pub fn to_positive_first_string(&self) -> String {
        let mut terms = self.term_strings();
        if let Some(pos) = terms.iter().position(|(negative, _)| !negative) {
            let first = terms.remove(pos);
            terms.insert(0, first);
        }
        join_terms(&terms)
    }
}

fn join_terms(terms: &[(bool, String)]) -> String {
    if terms.is_empty() {
        return "0".to_string();
    }
    let mut out = String::new();
    for (i, (negative, body)) in terms.iter().enumerate() {
        if *negative {
            out.push('-');
        } else if i > 0 {
            out.push('+');
        }
        out.push_str(body);
    }
    out
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", join_terms(&self.term_strings()))
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Print a number as an integer when integral, otherwise with up to six
/// significant digits and no trailing zeros.
pub fn format_number(value: f64) -> String {
    if (value - value.round()).abs() < EPSILON {
        return format!("{}", value.round() as i64);
    }
    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (5 - magnitude).max(0) as usize;
    let text = format!("{:.*}", decimals, value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    text.to_string()
}

// ============================================================================
// Parser
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Var(char),
    Plus,
    Minus,
    Star,
    Slash,
    Open,
    Close,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::Syntax(input.to_string()))?;
                tokens.push(Token::Number(value));
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' | '−' | '–' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' | '·' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            c if c.is_alphabetic() => {
                let start = i;
                while i < chars.len() && chars[i].is_alphabetic() {
                    i += 1;
                }
                if i - start > 1 {
                    return Err(ExprError::Word(chars[start..i].iter().collect()));
                }
                tokens.push(Token::Var(c));
            }
            _ => return Err(ExprError::Syntax(input.to_string())),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expression(&mut self) -> Result<Expr, ExprError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value = value.add(&self.term()?);
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value = value.sub(&self.term()?);
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<Expr, ExprError> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value = value.mul(&self.unary()?);
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    value = value.div(&self.unary()?)?;
                }
                // implicit multiplication: 2x, 0.5(1-x), x(1+y), (1-x)2
                Some(Token::Var(_)) | Some(Token::Open) | Some(Token::Number(_)) => {
                    value = value.mul(&self.primary()?);
                }
                _ => return Ok(value),
            }
        }
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(self.unary()?.scale(-1.0))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Number(value)) => Ok(Expr::constant(value)),
            Some(Token::Var(name)) => Ok(Expr::variable(name)),
            Some(Token::Open) => {
                let inner = self.expression()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(ExprError::Syntax("unclosed parenthesis".to_string())),
                }
            }
            other => Err(ExprError::Syntax(format!("unexpected token {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_constants() {
        let two_thirds = Expr::parse("2/3").unwrap().as_constant().unwrap();
        assert!((two_thirds - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(Expr::parse("(0.5)*(1)").unwrap().as_constant(), Some(0.5));
        assert!(Expr::parse("").is_err());
    }

    #[test]
    fn test_parse_variables() {
        let expr = Expr::parse("(1-x)*(1)").unwrap();
        assert_eq!(expr.to_string(), "1-x");
        assert_eq!(expr.variables().into_iter().collect::<Vec<_>>(), vec!['x']);

        let expr = Expr::parse("2(1-x)/3").unwrap();
        assert_eq!(expr.to_string(), "0.666667-0.666667*x");
    }

    #[test]
    fn test_word_is_rejected() {
        assert_eq!(Expr::parse("1-ab"), Err(ExprError::Word("ab".to_string())));
    }

    #[test]
    fn test_division_by_variable_fails() {
        assert_eq!(Expr::parse("1/x"), Err(ExprError::NonConstantDivisor));
        assert_eq!(Expr::parse("1/0"), Err(ExprError::DivisionByZero));
    }

    #[test]
    fn test_substitute_and_evaluate() {
        let expr = Expr::parse("1-x").unwrap();
        assert_eq!(expr.substitute('x', 0.25).as_constant(), Some(0.75));

        let mut bindings = BTreeMap::new();
        assert_eq!(expr.evaluate(&bindings), Err(ExprError::Unbound('x')));
        bindings.insert('x', 1.0);
        assert!(expr.evaluate(&bindings).unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_combine_like_terms() {
        let a = Expr::parse("(0.5-x)").unwrap();
        let b = Expr::parse("(x)").unwrap();
        assert_eq!(a.add(&b).as_constant(), Some(0.5));
        assert!(a.sub(&a).is_zero());
    }

    #[test]
    fn test_positive_first() {
        let expr = Expr::parse("x-1").unwrap();
        assert_eq!(expr.to_string(), "-1+x");
        assert_eq!(expr.to_positive_first_string(), "x-1");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(0.67), "0.67");
        assert_eq!(format_number(1.0 / 3.0), "0.333333");
        assert_eq!(format_number(-0.5), "-0.5");
    }
}
