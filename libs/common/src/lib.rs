//! Shared plumbing for the calc workspace: layered configuration loading and
//! logging setup.

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
