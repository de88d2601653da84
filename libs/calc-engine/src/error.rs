//! Error types for calc-engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// HTTP-style status code reported for a successful evaluation
pub const STATUS_OK: u16 = 200;

/// Failure category of an evaluation, mirrored by a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Normalized text has zero length
    EmptyExpression,
    /// Alphabetic or otherwise unsupported character present
    InvalidCharacter,
    /// Same operator symbol repeated with no operand between
    ConsecutiveOperator,
    /// Divisor equals zero
    DivisionByZero,
    /// Operator with a missing operand
    OperatorUnderflow,
    /// Closing bracket without an opening one, or vice versa
    UnbalancedBrackets,
    /// Digit run that is not a number, e.g. `1.2.3`
    MalformedNumber,
    /// Persistence collaborator failure
    InternalFailure,
}

impl ErrorKind {
    /// Representative status code for this kind
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::EmptyExpression => 404,
            ErrorKind::InvalidCharacter => 422,
            ErrorKind::ConsecutiveOperator => 422,
            ErrorKind::DivisionByZero => 422,
            ErrorKind::OperatorUnderflow => 404,
            ErrorKind::UnbalancedBrackets => 422,
            ErrorKind::MalformedNumber => 404,
            ErrorKind::InternalFailure => 500,
        }
    }
}

/// Calculation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("Expression is empty")]
    EmptyExpression,

    #[error("Invalid character '{0}' in expression")]
    InvalidCharacter(char),

    #[error("Operator '{0}' repeated without an operand between")]
    ConsecutiveOperator(char),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Operator '{0}' is missing an operand")]
    OperatorUnderflow(char),

    #[error("Operand follows a bracketed group without an operator")]
    MissingOperator,

    #[error("Nothing left to evaluate")]
    NoResult,

    #[error("Unbalanced brackets: {0}")]
    UnbalancedBrackets(String),

    #[error("Malformed number: {0}")]
    MalformedNumber(String),

    #[error("Internal failure: {0}")]
    Internal(String),
}

impl CalcError {
    pub fn unbalanced(msg: impl Into<String>) -> Self {
        Self::UnbalancedBrackets(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Failure category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CalcError::EmptyExpression => ErrorKind::EmptyExpression,
            CalcError::InvalidCharacter(_) => ErrorKind::InvalidCharacter,
            CalcError::ConsecutiveOperator(_) => ErrorKind::ConsecutiveOperator,
            CalcError::DivisionByZero => ErrorKind::DivisionByZero,
            CalcError::OperatorUnderflow(_) | CalcError::MissingOperator | CalcError::NoResult => {
                ErrorKind::OperatorUnderflow
            },
            CalcError::UnbalancedBrackets(_) => ErrorKind::UnbalancedBrackets,
            CalcError::MalformedNumber(_) => ErrorKind::MalformedNumber,
            CalcError::Internal(_) => ErrorKind::InternalFailure,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }
}

/// Persistence collaborator errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Record already exists: user {user_id}, expression {expression_id}")]
    Duplicate { user_id: i64, expression_id: i64 },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<StoreError> for CalcError {
    fn from(err: StoreError) -> Self {
        CalcError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CalcError>;
