//! Bracket resolver
//!
//! Wraps the expression in one implicit outer pair, then walks it left to
//! right with a stack of opening positions. Every closing bracket collapses
//! the innermost group through the flat evaluator and splices the value in
//! place of the whole `(...)` span.

use crate::error::{CalcError, Result};
use crate::flat::{evaluate_pieces, Piece};
use tracing::debug;

const OPEN: char = '(';
const CLOSE: char = ')';

/// Resolve all bracketed groups of a normalized expression and evaluate it
pub fn resolve(normalized: &str) -> Result<f64> {
    let mut expr = Vec::with_capacity(normalized.len() + 2);
    expr.push(Piece::Char(OPEN));
    expr.extend(normalized.chars().map(Piece::Char));
    expr.push(Piece::Char(CLOSE));

    let mut open_positions: Vec<usize> = Vec::new();
    let mut cursor = 0;

    while cursor < expr.len() {
        match expr[cursor] {
            Piece::Char(OPEN) => {
                open_positions.push(cursor);
                cursor += 1;
            },
            Piece::Char(CLOSE) => {
                let start = open_positions
                    .pop()
                    .ok_or_else(|| CalcError::unbalanced("closing bracket without opening"))?;
                let value = evaluate_pieces(&expr[start + 1..cursor])?;
                debug!("Collapsed group at {}..={} to {}", start, cursor, value);
                expr[start] = Piece::Value(value);
                expr.drain(start + 1..=cursor);
                cursor = start + 1;
            },
            _ => cursor += 1,
        }
    }

    if !open_positions.is_empty() {
        return Err(CalcError::unbalanced(format!(
            "{} opening bracket(s) never closed",
            open_positions.len()
        )));
    }

    evaluate_pieces(&expr)
}
