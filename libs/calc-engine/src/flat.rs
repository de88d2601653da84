//! Flat evaluator - bracket-free arithmetic
//!
//! Input is normalized text containing only digits, decimal points and the
//! four binary operators. Evaluation happens in two steps:
//!
//! 1. [`scan`] splits the text into a number list and an operator list
//! 2. [`reduce`] folds `*` and `/` left to right, then `+` and `-`
//!
//! After a well-formed scan `numbers.len() == operators.len() + 1`; a
//! malformed tail shows up during reduction as [`CalcError::OperatorUnderflow`].

use crate::error::{CalcError, Result};
use tracing::debug;

/// Binary arithmetic operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Operator::Add),
            '-' => Some(Operator::Sub),
            '*' => Some(Operator::Mul),
            '/' => Some(Operator::Div),
            _ => None,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Sub => '-',
            Operator::Mul => '*',
            Operator::Div => '/',
        }
    }

    /// `*` and `/` bind tighter than `+` and `-`
    pub fn is_multiplicative(self) -> bool {
        matches!(self, Operator::Mul | Operator::Div)
    }

    fn apply(self, lhs: f64, rhs: f64) -> Result<f64> {
        match self {
            Operator::Add => Ok(lhs + rhs),
            Operator::Sub => Ok(lhs - rhs),
            Operator::Mul => Ok(lhs * rhs),
            Operator::Div => {
                if rhs == 0.0 {
                    return Err(CalcError::DivisionByZero);
                }
                Ok(lhs / rhs)
            },
        }
    }
}

/// One element of a flat expression
///
/// Raw text is a run of `Char`s; the bracket resolver splices the value of
/// each collapsed group back in as a `Value`, so negative and fractional
/// group results survive without a round trip through text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Piece {
    Char(char),
    Value(f64),
}

/// Split text into pieces
pub fn pieces(text: &str) -> Vec<Piece> {
    text.chars().map(Piece::Char).collect()
}

/// Operands and operators of a flat expression, in scan order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatTokens {
    pub numbers: Vec<f64>,
    pub operators: Vec<Operator>,
}

/// Scan a flat expression into number and operator lists
///
/// Checks run in a fixed order: emptiness, then characters and operands,
/// then operator adjacency.
pub fn scan(expression: &[Piece]) -> Result<FlatTokens> {
    if expression.is_empty() {
        return Err(CalcError::EmptyExpression);
    }

    let mut tokens = FlatTokens::default();
    let mut operand = String::new();
    // A spliced value closed the current operand
    let mut after_value = false;

    for piece in expression {
        match *piece {
            Piece::Value(value) => {
                if after_value || !operand.is_empty() {
                    return Err(CalcError::MissingOperator);
                }
                tokens.numbers.push(value);
                after_value = true;
            },
            Piece::Char(c) if c.is_ascii_digit() || c == '.' => {
                if after_value {
                    return Err(CalcError::MissingOperator);
                }
                operand.push(c);
            },
            Piece::Char(c) => {
                let op = Operator::from_char(c).ok_or(CalcError::InvalidCharacter(c))?;
                close_operand(&mut operand, &mut tokens.numbers)?;
                tokens.operators.push(op);
                after_value = false;
            },
        }
    }
    close_operand(&mut operand, &mut tokens.numbers)?;

    // Only an identical symbol directly repeated is rejected here;
    // mixed pairs like `+-` surface later as a missing operand.
    let mut previous: Option<char> = None;
    for piece in expression {
        match *piece {
            Piece::Char(c) if Operator::from_char(c).is_some() => {
                if previous == Some(c) {
                    return Err(CalcError::ConsecutiveOperator(c));
                }
                previous = Some(c);
            },
            _ => previous = None,
        }
    }

    Ok(tokens)
}

fn close_operand(operand: &mut String, numbers: &mut Vec<f64>) -> Result<()> {
    if operand.is_empty() {
        return Ok(());
    }
    let value = operand
        .parse::<f64>()
        .map_err(|_| CalcError::MalformedNumber(operand.clone()))?;
    numbers.push(value);
    operand.clear();
    Ok(())
}

/// Reduce scanned tokens to a single value
pub fn reduce(tokens: FlatTokens) -> Result<f64> {
    let FlatTokens {
        mut numbers,
        mut operators,
    } = tokens;

    reduce_tier(&mut numbers, &mut operators, Operator::is_multiplicative)?;
    reduce_tier(&mut numbers, &mut operators, |op| !op.is_multiplicative())?;

    match numbers.as_slice() {
        [value] => Ok(*value),
        _ => Err(CalcError::NoResult),
    }
}

/// Fold every operator of one precedence tier, strictly left to right.
/// The cursor stays put after a fold so chains like `8/2/2` resolve in order.
fn reduce_tier(
    numbers: &mut Vec<f64>,
    operators: &mut Vec<Operator>,
    in_tier: impl Fn(Operator) -> bool,
) -> Result<()> {
    let mut i = 0;
    while i < operators.len() {
        let op = operators[i];
        if !in_tier(op) {
            i += 1;
            continue;
        }
        if i + 1 >= numbers.len() {
            return Err(CalcError::OperatorUnderflow(op.symbol()));
        }
        let rhs = numbers.remove(i + 1);
        numbers[i] = op.apply(numbers[i], rhs)?;
        operators.remove(i);
    }
    Ok(())
}

/// Evaluate a flat piece sequence
pub fn evaluate_pieces(expression: &[Piece]) -> Result<f64> {
    let tokens = scan(expression)?;
    debug!(
        "Scanned flat expression: {} numbers, {} operators",
        tokens.numbers.len(),
        tokens.operators.len()
    );
    reduce(tokens)
}

/// Evaluate a normalized, bracket-free expression
pub fn evaluate_flat(expression: &str) -> Result<f64> {
    let value = evaluate_pieces(&pieces(expression))?;
    debug!("Flat '{}' = {}", expression, value);
    Ok(value)
}
