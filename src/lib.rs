//! m3u-merge: aggregate IPTV playlists into one ranked, deduplicated M3U.
//!
//! Pipeline: fetch sources, parse EXTINF/address blocks, normalize channel
//! names into identities, drop blocked categories, probe every candidate URL
//! concurrently, score against cross-run health history and emit the top
//! URLs per channel.

pub mod config;
pub mod database;
pub mod errors;
pub mod ingestor;
pub mod models;
pub mod proxy;
pub mod services;
pub mod utils;

pub use config::Config;
pub use errors::{AppError, AppResult};
pub use services::aggregator::{Aggregator, RunReport};
