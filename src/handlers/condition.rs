//! Decision Conditions
//!
//! A small, side-effect free boolean expression language evaluated
//! against an [`ExecutionContext`]. Nothing here can execute code.
//!
//! ```text
//! expr    := or
//! or      := and (("||" | "or") and)*
//! and     := not (("&&" | "and") not)*
//! not     := ("!" | "not") not | compare
//! compare := primary (("==" | "!=" | "<" | "<=" | ">" | ">=") primary)?
//! primary := number | string | true | false | null | path | "(" expr ")"
//! path    := ident ("." (ident | digits))*
//! ```
//!
//! Strings use single or double quotes. Referencing a missing variable or
//! ordering values of different types is an evaluation error. Nesting
//! (parentheses, negations and operator chains) is capped at
//! [`MAX_NESTING`] levels.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::execution::ExecutionContext;

/// Deepest nesting a condition may use.
pub const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConditionError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("missing variable '{0}'")]
    MissingVariable(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(Value),
    Path(String),
    Compare(CompareOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Path(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, CompareOp, Box<Expr>),
}

/// A parsed condition, reusable across evaluations.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, ConditionError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ConditionError::Syntax("empty condition".into()));
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(ConditionError::Syntax(format!("unexpected token {:?}", token)));
        }

        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates to a boolean; non-boolean results are a type mismatch.
    pub fn evaluate(&self, context: &ExecutionContext) -> Result<bool, ConditionError> {
        let value = eval(&self.expr, context)?;
        as_bool(&value, "condition result")
    }
}

/// Parses and evaluates in one step.
pub fn evaluate(source: &str, context: &ExecutionContext) -> Result<bool, ConditionError> {
    Condition::parse(source)?.evaluate(context)
}

fn tokenize(source: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            _ if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Compare(CompareOp::Eq));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Compare(CompareOp::Ne));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' | '>' => {
                let inclusive = next == Some('=');
                let op = match (c, inclusive) {
                    ('<', false) => CompareOp::Lt,
                    ('<', true) => CompareOp::Le,
                    ('>', false) => CompareOp::Gt,
                    _ => CompareOp::Ge,
                };
                tokens.push(Token::Compare(op));
                i += if inclusive { 2 } else { 1 };
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '\'' | '"' => {
                let (text, end) = read_string(&chars, i)?;
                tokens.push(Token::Literal(Value::String(text)));
                i = end;
            }
            _ if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Literal(parse_number(&text)?));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(keyword_or_path(word)?);
            }
            other => {
                return Err(ConditionError::Syntax(format!(
                    "unexpected character '{}' at position {}",
                    other, i
                )));
            }
        }
    }

    Ok(tokens)
}

fn read_string(chars: &[char], start: usize) -> Result<(String, usize), ConditionError> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                text.push(chars[i + 1]);
                i += 2;
            }
            c if c == quote => return Ok((text, i + 1)),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }

    Err(ConditionError::Syntax("unterminated string literal".into()))
}

fn parse_number(text: &str) -> Result<Value, ConditionError> {
    if let Ok(n) = text.parse::<i64>() {
        return Ok(Value::from(n));
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| ConditionError::Syntax(format!("invalid number '{}'", text)))
}

fn keyword_or_path(word: String) -> Result<Token, ConditionError> {
    let token = match word.as_str() {
        "true" => Token::Literal(Value::Bool(true)),
        "false" => Token::Literal(Value::Bool(false)),
        "null" => Token::Literal(Value::Null),
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        _ => {
            if word.split('.').any(str::is_empty) {
                return Err(ConditionError::Syntax(format!("invalid path '{}'", word)));
            }
            Token::Path(word)
        }
    };
    Ok(token)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Goes one level deeper; callers restore `depth` on the way out.
    fn enter(&mut self) -> Result<(), ConditionError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ConditionError::Syntax("condition nested too deeply".into()));
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let base = self.depth;
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            self.enter()?;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let base = self.depth;
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            self.enter()?;
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ConditionError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            self.enter()?;
            let inner = self.parse_not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, ConditionError> {
        let left = self.parse_primary()?;
        if let Some(Token::Compare(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.parse_primary()?;
            return Ok(Expr::Compare(Box::new(left), op, Box::new(right)));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, ConditionError> {
        match self.advance() {
            Some(Token::Literal(value)) => Ok(Expr::Literal(value)),
            Some(Token::Path(path)) => Ok(Expr::Path(path)),
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ConditionError::Syntax("expected ')'".into())),
                }
            }
            Some(token) => Err(ConditionError::Syntax(format!("unexpected token {:?}", token))),
            None => Err(ConditionError::Syntax("unexpected end of condition".into())),
        }
    }
}

fn eval(expr: &Expr, context: &ExecutionContext) -> Result<Value, ConditionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(path) => context
            .lookup(path)
            .cloned()
            .ok_or_else(|| ConditionError::MissingVariable(path.clone())),
        Expr::Not(inner) => {
            let value = eval(inner, context)?;
            Ok(Value::Bool(!as_bool(&value, "operand of 'not'")?))
        }
        Expr::And(left, right) => {
            if !as_bool(&eval(left, context)?, "operand of 'and'")? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(as_bool(&eval(right, context)?, "operand of 'and'")?))
        }
        Expr::Or(left, right) => {
            if as_bool(&eval(left, context)?, "operand of 'or'")? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(as_bool(&eval(right, context)?, "operand of 'or'")?))
        }
        Expr::Compare(left, op, right) => {
            let left = eval(left, context)?;
            let right = eval(right, context)?;
            compare(&left, *op, &right).map(Value::Bool)
        }
    }
}

fn as_bool(value: &Value, what: &str) -> Result<bool, ConditionError> {
    value
        .as_bool()
        .ok_or_else(|| ConditionError::TypeMismatch(format!("{} must be boolean, got {}", what, value)))
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> Result<bool, ConditionError> {
    match op {
        CompareOp::Eq => Ok(values_equal(left, right)),
        CompareOp::Ne => Ok(!values_equal(left, right)),
        _ => {
            let ordering = match (left, right) {
                (Value::Number(a), Value::Number(b)) => {
                    a.as_f64().partial_cmp(&b.as_f64())
                }
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            };
            let ordering = ordering.ok_or_else(|| {
                ConditionError::TypeMismatch(format!("cannot compare {} {} {}", left, op, right))
            })?;

            Ok(match op {
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::Le => ordering.is_le(),
                CompareOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}
