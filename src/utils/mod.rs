//! Utility modules shared across the pipeline
//!
//! - `channel_normalizer` canonical channel identities from display names
//! - `jitter` randomized backoff spreading
//! - `retry` backoff policy for transient probe failures

pub mod channel_normalizer;
pub mod jitter;
pub mod retry;

pub use channel_normalizer::{normalize, NameNormalizer};
pub use retry::RetryConfig;
