//! Error type definitions for m3u-merge
//!
//! This module defines the error types used throughout the pipeline,
//! providing a hierarchical error system that keeps fatal and recoverable
//! failures apart.

use thiserror::Error;

/// Top-level application error type
///
/// Only `Configuration` and `InsufficientChannels` are expected to reach the
/// caller of a run; everything else is logged and recovered where it happens.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or invalid configuration, raised before any output is written
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Source handling errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Health ledger persistence errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Too few channels survived ranking to produce a trustworthy playlist
    #[error("Refusing to write playlist: {channels} channels ranked, at least {minimum} required")]
    InsufficientChannels { channels: usize, minimum: usize },

    /// Filesystem errors while writing output
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Playlist source specific errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// Source answered with a non-success status
    #[error("HTTP error: {status} fetching {url}")]
    Http { url: String, status: u16 },

    /// Source did not answer in time
    #[error("Connection timeout: {url}")]
    Timeout { url: String },

    /// Transport level failure (DNS, connect, TLS, body read)
    #[error("Request failed: {url} - {message}")]
    Request { url: String, message: String },

    /// Local file or directory could not be read
    #[error("Read failed: {path} - {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Source returned nothing usable
    #[error("Empty playlist: {name}")]
    Empty { name: String },
}

/// Health ledger persistence errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Database errors from sqlx
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store could not be opened
    #[error("Ledger connection failed: {message}")]
    ConnectionFailed { message: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl SourceError {
    /// Map a reqwest failure onto the source taxonomy
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::Http {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            Self::Request {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_message() {
        let err = AppError::configuration("no sources configured");
        assert_eq!(
            err.to_string(),
            "Configuration error: no sources configured"
        );
    }

    #[test]
    fn test_source_error_converts() {
        let err: AppError = SourceError::Empty {
            name: "hk".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::Source(_)));
    }

    #[test]
    fn test_insufficient_channels_message() {
        let err = AppError::InsufficientChannels {
            channels: 0,
            minimum: 5,
        };
        assert!(err.to_string().contains("at least 5 required"));
    }
}
