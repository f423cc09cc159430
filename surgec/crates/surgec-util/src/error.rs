//! Core error types for surgec-util.

use thiserror::Error;

/// Error type for symbol interning operations.
#[derive(Debug, Error)]
pub enum InternError {
    /// Symbol index does not name a table entry.
    #[error("symbol not found: index {index}")]
    NotFound { index: u32 },
}

/// Error type for span operations.
#[derive(Debug, Error)]
pub enum SpanError {
    /// Invalid span range.
    #[error("invalid span: start {start} > end {end}")]
    InvalidRange { start: u32, end: u32 },
}
