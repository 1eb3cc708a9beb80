//! Centralized error handling for m3u-merge
//!
//! This module unifies the error types raised by the aggregation pipeline.
//!
//! # Error Categories
//!
//! - **Configuration Errors**: missing sources or output, invalid tuning values.
//!   These are the only errors that abort a run.
//! - **Source Errors**: a playlist source could not be fetched or read. The
//!   aggregator logs them and skips the source.
//! - **Ledger Errors**: the health ledger store could not be opened or written.
//!
//! Probe failures are deliberately absent: they are recorded in the health
//! ledger as outcomes, never raised.
//!
//! # Usage
//!
//! ```rust
//! use m3u_merge::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Err(AppError::configuration("no sources configured"))
//! }
//! assert!(example_function().is_err());
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Source Results
pub type SourceResult<T> = Result<T, SourceError>;

/// Convenience type alias for Ledger Results
pub type LedgerResult<T> = Result<T, LedgerError>;
