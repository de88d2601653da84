//! calc-engine - arithmetic expression evaluation and composite aggregation
//!
//! # Features
//!
//! - **Expression evaluation**: `+ - * /` with precedence, parentheses,
//!   whitespace and decimal-comma tolerance
//! - **Composite requests**: independent units evaluated concurrently under a
//!   shared deadline, summed into one aggregate
//! - **Result storage**: pluggable [`ResultStore`] with in-memory and SQLite
//!   implementations
//!
//! # Example
//!
//! ```rust
//! use calc_engine::{evaluate, CompositeEvaluator, EngineConfig, ErrorKind, MemoryResultStore};
//! use std::sync::Arc;
//!
//! # let rt = tokio::runtime::Builder::new_current_thread()
//! #     .enable_all()
//! #     .build()
//! #     .unwrap();
//! # rt.block_on(async {
//! // Single expression
//! let outcome = evaluate("2 + 3 * 4");
//! assert_eq!(outcome.value, 14.0);
//!
//! let outcome = evaluate("5 / 0");
//! assert_eq!(outcome.error, Some(ErrorKind::DivisionByZero));
//! assert_eq!(outcome.status_code, 422);
//!
//! // Composite request, persisted per user
//! let store = Arc::new(MemoryResultStore::new());
//! let evaluator = CompositeEvaluator::new(store, EngineConfig::default());
//! let units = vec!["(1+2)*3".to_string(), "4/2".to_string()];
//! let submission = evaluator.submit(7, units).await.unwrap();
//! assert_eq!(submission.expression_id, 1);
//! assert_eq!(submission.result.aggregate_value, 11.0);
//! # });
//! ```
//!
//! # Pipeline
//!
//! ```text
//! raw text ──▶ normalize ──▶ brackets::resolve ──▶ flat::evaluate_pieces ──▶ value
//! ```
//!
//! # Status codes
//!
//! | Kind | Code |
//! |------|------|
//! | success | 200 |
//! | `EmptyExpression`, `OperatorUnderflow`, `MalformedNumber` | 404 |
//! | `InvalidCharacter`, `ConsecutiveOperator`, `DivisionByZero`, `UnbalancedBrackets` | 422 |
//! | `InternalFailure` | 500 |

pub mod brackets;
pub mod composite;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod flat;
pub mod normalize;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;

// Re-exports for convenience
pub use composite::{
    evaluate_composite, legacy_units, CompositeEvaluator, CompositeResult, CompositeState,
    Submission, UnitReport, UnitStatus,
};
pub use config::{EngineConfig, UnitSplit};
pub use error::{CalcError, ErrorKind, Result, StoreError, STATUS_OK};
pub use evaluator::{evaluate, try_evaluate, EvaluationOutcome};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteResultStore;
pub use store::{MemoryResultStore, NewRecord, PersistableRecord, ResultStore};
