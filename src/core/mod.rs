//! Core domain layer: error taxonomy, result helpers, and domain types

pub mod error;
pub mod result;
pub mod types;

pub use error::{AppError, AppResult, ErrorKind, ErrorSeverity};
