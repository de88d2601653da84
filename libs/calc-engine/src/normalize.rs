//! Input normalization
//!
//! Strips whitespace and converts locale decimal commas to periods.
//! Character validation is left to the flat evaluator.

/// Normalize raw expression text
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect()
}
