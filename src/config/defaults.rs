/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Config file defaults
pub const DEFAULT_CONFIG_FILE: &str = "m3u-merge.toml";
pub const ENV_PREFIX: &str = "M3U_MERGE";

// Output defaults
pub const DEFAULT_OUTPUT_PATH: &str = "./live.m3u";
pub const DEFAULT_MIN_CHANNELS: usize = 1;

// Source fetching defaults
pub const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SOURCE_CONCURRENCY: usize = 8;

// Probe defaults
pub const DEFAULT_PROBE_TIMEOUT_SECS: f64 = 5.0;
pub const DEFAULT_PROBE_WORKERS: usize = 20;
pub const DEFAULT_LATENCY_CEILING_SECS: f64 = 3.0;
pub const DEFAULT_THROUGHPUT_FLOOR_KBPS: f64 = 128.0;
pub const DEFAULT_BYTE_BUDGET: usize = 256 * 1024;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 250;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 2000;
pub const DEFAULT_BACKOFF_JITTER_PERCENT: u8 = 25;
pub const DEFAULT_FOLLOW_HLS: bool = true;
pub const DEFAULT_USER_AGENT: &str = concat!("m3u-merge/", env!("CARGO_PKG_VERSION"));

// Ranking defaults
pub const DEFAULT_TOP_K: usize = 3;

// Ledger defaults
pub const DEFAULT_LEDGER_URL: &str = "sqlite://./m3u-merge-health.db";
pub const DEFAULT_LEDGER_MAX_CONNECTIONS: u32 = 4;
pub const DEFAULT_QUARANTINE_THRESHOLD: u32 = 5;
pub const DEFAULT_STALENESS_WINDOW_HOURS: u64 = 72;
pub const DEFAULT_EMA_ALPHA: f64 = 0.3;
pub const MAX_STALENESS_WINDOW_HOURS: u64 = 24 * 365 * 10;
pub const MAX_RETENTION_DAYS: u64 = 365 * 100;

// Scoring defaults
pub const DEFAULT_WEIGHT_UHD: f64 = 40.0;
pub const DEFAULT_WEIGHT_FHD: f64 = 30.0;
pub const DEFAULT_WEIGHT_HD: f64 = 20.0;
pub const DEFAULT_WEIGHT_SD: f64 = 10.0;
pub const DEFAULT_WEIGHT_UNKNOWN: f64 = 10.0;
pub const DEFAULT_WEIGHT_LATENCY: f64 = 20.0;
pub const DEFAULT_WEIGHT_THROUGHPUT: f64 = 15.0;
pub const DEFAULT_THROUGHPUT_SATURATION_KBPS: f64 = 4000.0;
pub const DEFAULT_WEIGHT_STABILITY: f64 = 15.0;
pub const DEFAULT_WEIGHT_RECENCY: f64 = 5.0;
pub const DEFAULT_SECURE_TRANSPORT_BONUS: f64 = 2.0;
pub const DEFAULT_STREAM_EXTENSION_BONUS: f64 = 1.0;
pub const DEFAULT_MULTICAST_RELAY_PENALTY: f64 = 5.0;
