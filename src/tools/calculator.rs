//! Arithmetic expression evaluator for the `calculate` tool.
//!
//! Accepts numbers, `+ - * /`, parentheses and spaces. Any other character
//! is rejected before parsing starts.
//!
//! Grammar:
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := factor (('*' | '/') factor)*
//! factor := ('+' | '-') factor | number | '(' expr ')'
//! ```

use std::fmt;

/// Characters an expression may contain.
pub const ALLOWED_CHARS: &str = "0123456789+-*/.() ";

/// Maximum parenthesis / unary nesting depth.
const MAX_DEPTH: usize = 64;

/// Reasons an expression could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalcError {
    /// The input contains a character outside [`ALLOWED_CHARS`].
    DisallowedCharacter(char),
    /// The input is empty or whitespace.
    Empty,
    /// A number literal could not be parsed.
    InvalidNumber(String),
    /// The input ended where an operand was expected.
    UnexpectedEnd,
    /// A token appeared where it is not allowed.
    UnexpectedToken(char),
    /// Too many nested parentheses or signs.
    TooDeep,
    /// Division by zero.
    DivisionByZero,
}

impl fmt::Display for CalcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DisallowedCharacter(c) => write!(f, "disallowed character '{c}'"),
            Self::Empty => write!(f, "empty expression"),
            Self::InvalidNumber(n) => write!(f, "invalid number '{n}'"),
            Self::UnexpectedEnd => write!(f, "unexpected end of expression"),
            Self::UnexpectedToken(c) => write!(f, "unexpected '{c}'"),
            Self::TooDeep => write!(f, "expression nested too deeply"),
            Self::DivisionByZero => write!(f, "division by zero"),
        }
    }
}

impl std::error::Error for CalcError {}

/// Checks that `expression` only uses allowed characters.
///
/// # Errors
///
/// Returns the first disallowed character found.
pub fn check_characters(expression: &str) -> Result<(), CalcError> {
    match expression.chars().find(|c| !ALLOWED_CHARS.contains(*c)) {
        Some(c) => Err(CalcError::DisallowedCharacter(c)),
        None => Ok(()),
    }
}

/// Evaluates an arithmetic expression.
///
/// # Errors
///
/// Returns an error for disallowed characters, malformed input, or
/// division by zero.
pub fn evaluate(expression: &str) -> Result<f64, CalcError> {
    check_characters(expression)?;
    if expression.trim().is_empty() {
        return Err(CalcError::Empty);
    }

    let mut parser = Parser {
        chars: expression.chars().filter(|c| *c != ' ').collect(),
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    match parser.peek() {
        Some(c) => Err(CalcError::UnexpectedToken(c)),
        None => Ok(value),
    }
}

/// Formats a result the way people write numbers: integers without a
/// trailing `.0`.
#[must_use]
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn expr(&mut self) -> Result<f64, CalcError> {
        let mut value = self.term()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            if op == '+' {
                value += rhs;
            } else {
                value -= rhs;
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.factor()?;
        while let Some(op @ ('*' | '/')) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            if op == '*' {
                value *= rhs;
            } else {
                if rhs == 0.0 {
                    return Err(CalcError::DivisionByZero);
                }
                value /= rhs;
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64, CalcError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CalcError::TooDeep);
        }
        let result = self.factor_inner();
        self.depth -= 1;
        result
    }

    fn factor_inner(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            None => Err(CalcError::UnexpectedEnd),
            Some('+') => {
                self.pos += 1;
                self.factor()
            }
            Some('-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some('(') => {
                self.pos += 1;
                let value = self.expr()?;
                match self.bump() {
                    Some(')') => Ok(value),
                    Some(c) => Err(CalcError::UnexpectedToken(c)),
                    None => Err(CalcError::UnexpectedEnd),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) => Err(CalcError::UnexpectedToken(c)),
        }
    }

    fn number(&mut self) -> Result<f64, CalcError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse()
            .map_err(|_| CalcError::InvalidNumber(literal))
    }
}
