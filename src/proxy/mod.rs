//! Channel selection and output: classification, pooling, ranking, emission

pub mod channel_pool;
pub mod filter_engine;
pub mod generator;
pub mod ranker;

pub use channel_pool::{Admission, ChannelPool, PoolEntry, PoolStats};
pub use filter_engine::{CategoryClassifier, Classification};
pub use generator::{write_atomic, M3uGenerator};
pub use ranker::Ranker;
