//! Evaluation facade
//!
//! `normalize -> resolve brackets -> flat evaluation`, returning the value
//! together with an error kind and status code. Any stage failure ends the
//! evaluation with that stage's error; there are no partial results.

use crate::brackets::resolve;
use crate::error::{CalcError, ErrorKind, Result, STATUS_OK};
use crate::normalize::normalize;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Result of evaluating one expression
///
/// `value` is meaningful only on success, `error` only on failure.
/// `status_code` is always set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub value: f64,
    pub error: Option<ErrorKind>,
    pub status_code: u16,
}

impl EvaluationOutcome {
    pub fn success(value: f64) -> Self {
        Self {
            value,
            error: None,
            status_code: STATUS_OK,
        }
    }

    pub fn failure(kind: ErrorKind) -> Self {
        Self {
            value: 0.0,
            error: Some(kind),
            status_code: kind.status_code(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl From<Result<f64>> for EvaluationOutcome {
    fn from(result: Result<f64>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(e) => Self::failure(e.kind()),
        }
    }
}

/// Evaluate raw expression text, keeping the detailed error
pub fn try_evaluate(raw: &str) -> Result<f64> {
    let normalized = normalize(raw);
    debug!("Normalized '{}' to '{}'", raw, normalized);
    if normalized.is_empty() {
        return Err(CalcError::EmptyExpression);
    }
    resolve(&normalized)
}

/// Evaluate raw expression text
///
/// # Example
/// ```
/// use calc_engine::evaluate;
///
/// let outcome = evaluate("(2 + 3) * 4");
/// assert_eq!(outcome.value, 20.0);
/// assert_eq!(outcome.status_code, 200);
/// ```
pub fn evaluate(raw: &str) -> EvaluationOutcome {
    try_evaluate(raw).into()
}
