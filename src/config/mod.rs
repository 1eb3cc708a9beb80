use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};

pub mod defaults;

use defaults::*;

/// A playlist input, tagged by `kind` in the config file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Remote playlist fetched with a plain GET
    Http { name: String, url: String },
    /// Local playlist file
    File { name: String, path: PathBuf },
    /// Every `.m3u`/`.m3u8` file in a directory
    Directory { name: String, path: PathBuf },
    /// Hand-maintained channel blocks kept in the config itself
    Inline { name: String, content: String },
}

impl SourceConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::Http { name, .. }
            | Self::File { name, .. }
            | Self::Directory { name, .. }
            | Self::Inline { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
    /// Additional files that receive an identical copy of the playlist
    #[serde(default)]
    pub mirror_paths: Vec<PathBuf>,
    /// Refuse to write when fewer channels than this survive ranking
    #[serde(default = "default_min_channels")]
    pub min_channels: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_source_concurrency")]
    pub concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Per-attempt bound on a single probe
    #[serde(default = "default_probe_timeout_secs")]
    pub timeout_secs: f64,
    /// Maximum probes in flight
    #[serde(default = "default_probe_workers")]
    pub workers: usize,
    /// Time-to-first-byte above this marks the stream unusable
    #[serde(default = "default_latency_ceiling_secs")]
    pub latency_ceiling_secs: f64,
    /// Measured throughput below this marks the stream unusable
    #[serde(default = "default_throughput_floor_kbps")]
    pub throughput_floor_kbps: f64,
    /// Bytes read from the body to measure throughput
    #[serde(default = "default_byte_budget")]
    pub byte_budget: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_follow_hls")]
    pub follow_hls: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Optional budget for the whole probe phase
    #[serde(default)]
    pub run_deadline_secs: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_url")]
    pub database_url: String,
    #[serde(default = "default_ledger_max_connections")]
    pub max_connections: u32,
    /// Consecutive failures at which a URL is quarantined
    #[serde(default = "default_quarantine_threshold")]
    pub quarantine_threshold: u32,
    /// Age after which the recency bonus reaches zero
    #[serde(default = "default_staleness_window_hours")]
    pub staleness_window_hours: u64,
    /// Smoothing factor for the rolling latency and bitrate averages
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f64,
    /// Purge records not probed for this many days; never purge when unset
    #[serde(default)]
    pub retention_days: Option<u64>,
}

/// Built-in keyword list sets
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PolicyProfile {
    /// Shopping networks and shopping terms across locales
    #[default]
    Standard,
    /// Standard plus advertising and promotion terms
    Strict,
    /// Shopping-network brand names only
    Permissive,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolicyConfig {
    #[serde(default)]
    pub profile: PolicyProfile,
    #[serde(default)]
    pub extra_whitelist: Vec<String>,
    #[serde(default)]
    pub extra_blocklist: Vec<String>,
    #[serde(default)]
    pub extra_quality_tokens: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_weight_uhd")]
    pub uhd: f64,
    #[serde(default = "default_weight_fhd")]
    pub fhd: f64,
    #[serde(default = "default_weight_hd")]
    pub hd: f64,
    #[serde(default = "default_weight_sd")]
    pub sd: f64,
    #[serde(default = "default_weight_unknown")]
    pub unknown: f64,
    #[serde(default = "default_weight_latency")]
    pub latency: f64,
    #[serde(default = "default_weight_throughput")]
    pub throughput: f64,
    #[serde(default = "default_throughput_saturation_kbps")]
    pub throughput_saturation_kbps: f64,
    #[serde(default = "default_weight_stability")]
    pub stability: f64,
    #[serde(default = "default_weight_recency")]
    pub recency: f64,
    #[serde(default = "default_secure_transport_bonus")]
    pub secure_transport_bonus: f64,
    #[serde(default = "default_stream_extension_bonus")]
    pub stream_extension_bonus: f64,
    #[serde(default = "default_multicast_relay_penalty")]
    pub multicast_relay_penalty: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

fn default_output_path() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_PATH)
}
fn default_min_channels() -> usize {
    DEFAULT_MIN_CHANNELS
}
fn default_source_timeout_secs() -> u64 {
    DEFAULT_SOURCE_TIMEOUT_SECS
}
fn default_source_concurrency() -> usize {
    DEFAULT_SOURCE_CONCURRENCY
}
fn default_probe_timeout_secs() -> f64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}
fn default_probe_workers() -> usize {
    DEFAULT_PROBE_WORKERS
}
fn default_latency_ceiling_secs() -> f64 {
    DEFAULT_LATENCY_CEILING_SECS
}
fn default_throughput_floor_kbps() -> f64 {
    DEFAULT_THROUGHPUT_FLOOR_KBPS
}
fn default_byte_budget() -> usize {
    DEFAULT_BYTE_BUDGET
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_initial_backoff_ms() -> u64 {
    DEFAULT_INITIAL_BACKOFF_MS
}
fn default_max_backoff_ms() -> u64 {
    DEFAULT_MAX_BACKOFF_MS
}
fn default_follow_hls() -> bool {
    DEFAULT_FOLLOW_HLS
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_top_k() -> usize {
    DEFAULT_TOP_K
}
fn default_ledger_url() -> String {
    DEFAULT_LEDGER_URL.to_string()
}
fn default_ledger_max_connections() -> u32 {
    DEFAULT_LEDGER_MAX_CONNECTIONS
}
fn default_quarantine_threshold() -> u32 {
    DEFAULT_QUARANTINE_THRESHOLD
}
fn default_staleness_window_hours() -> u64 {
    DEFAULT_STALENESS_WINDOW_HOURS
}
fn default_ema_alpha() -> f64 {
    DEFAULT_EMA_ALPHA
}
fn default_weight_uhd() -> f64 {
    DEFAULT_WEIGHT_UHD
}
fn default_weight_fhd() -> f64 {
    DEFAULT_WEIGHT_FHD
}
fn default_weight_hd() -> f64 {
    DEFAULT_WEIGHT_HD
}
fn default_weight_sd() -> f64 {
    DEFAULT_WEIGHT_SD
}
fn default_weight_unknown() -> f64 {
    DEFAULT_WEIGHT_UNKNOWN
}
fn default_weight_latency() -> f64 {
    DEFAULT_WEIGHT_LATENCY
}
fn default_weight_throughput() -> f64 {
    DEFAULT_WEIGHT_THROUGHPUT
}
fn default_throughput_saturation_kbps() -> f64 {
    DEFAULT_THROUGHPUT_SATURATION_KBPS
}
fn default_weight_stability() -> f64 {
    DEFAULT_WEIGHT_STABILITY
}
fn default_weight_recency() -> f64 {
    DEFAULT_WEIGHT_RECENCY
}
fn default_secure_transport_bonus() -> f64 {
    DEFAULT_SECURE_TRANSPORT_BONUS
}
fn default_stream_extension_bonus() -> f64 {
    DEFAULT_STREAM_EXTENSION_BONUS
}
fn default_multicast_relay_penalty() -> f64 {
    DEFAULT_MULTICAST_RELAY_PENALTY
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            mirror_paths: Vec::new(),
            min_channels: DEFAULT_MIN_CHANNELS,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_SOURCE_TIMEOUT_SECS,
            concurrency: DEFAULT_SOURCE_CONCURRENCY,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            workers: DEFAULT_PROBE_WORKERS,
            latency_ceiling_secs: DEFAULT_LATENCY_CEILING_SECS,
            throughput_floor_kbps: DEFAULT_THROUGHPUT_FLOOR_KBPS,
            byte_budget: DEFAULT_BYTE_BUDGET,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            follow_hls: DEFAULT_FOLLOW_HLS,
            user_agent: default_user_agent(),
            run_deadline_secs: None,
        }
    }
}

/// Seconds to a `Duration`, falling back to `default` for values `validate` rejects
fn seconds_or(value: f64, default: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_else(|_| Duration::from_secs_f64(default))
}

fn is_positive_seconds(value: f64) -> bool {
    value.is_finite() && value > 0.0 && Duration::try_from_secs_f64(value).is_ok()
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        seconds_or(self.timeout_secs, DEFAULT_PROBE_TIMEOUT_SECS)
    }

    pub fn latency_ceiling(&self) -> Duration {
        seconds_or(self.latency_ceiling_secs, DEFAULT_LATENCY_CEILING_SECS)
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

impl LedgerConfig {
    /// Staleness window in seconds, saturating
    pub fn staleness_window_secs(&self) -> i64 {
        i64::try_from(self.staleness_window_hours.saturating_mul(3600)).unwrap_or(i64::MAX)
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: default_ledger_url(),
            max_connections: DEFAULT_LEDGER_MAX_CONNECTIONS,
            quarantine_threshold: DEFAULT_QUARANTINE_THRESHOLD,
            staleness_window_hours: DEFAULT_STALENESS_WINDOW_HOURS,
            ema_alpha: DEFAULT_EMA_ALPHA,
            retention_days: None,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            uhd: DEFAULT_WEIGHT_UHD,
            fhd: DEFAULT_WEIGHT_FHD,
            hd: DEFAULT_WEIGHT_HD,
            sd: DEFAULT_WEIGHT_SD,
            unknown: DEFAULT_WEIGHT_UNKNOWN,
            latency: DEFAULT_WEIGHT_LATENCY,
            throughput: DEFAULT_WEIGHT_THROUGHPUT,
            throughput_saturation_kbps: DEFAULT_THROUGHPUT_SATURATION_KBPS,
            stability: DEFAULT_WEIGHT_STABILITY,
            recency: DEFAULT_WEIGHT_RECENCY,
            secure_transport_bonus: DEFAULT_SECURE_TRANSPORT_BONUS,
            stream_extension_bonus: DEFAULT_STREAM_EXTENSION_BONUS,
            multicast_relay_penalty: DEFAULT_MULTICAST_RELAY_PENALTY,
        }
    }
}

impl ScoringConfig {
    fn validate(&self) -> AppResult<()> {
        let weights = [
            ("uhd", self.uhd),
            ("fhd", self.fhd),
            ("hd", self.hd),
            ("sd", self.sd),
            ("unknown", self.unknown),
            ("latency", self.latency),
            ("throughput", self.throughput),
            ("stability", self.stability),
            ("recency", self.recency),
            ("secure_transport_bonus", self.secure_transport_bonus),
            ("stream_extension_bonus", self.stream_extension_bonus),
            ("multicast_relay_penalty", self.multicast_relay_penalty),
        ];
        if let Some((name, _)) = weights.iter().find(|(_, w)| !w.is_finite()) {
            return Err(AppError::configuration(format!(
                "scoring.{name} must be a finite number"
            )));
        }
        if !(self.throughput_saturation_kbps.is_finite() && self.throughput_saturation_kbps > 0.0) {
            return Err(AppError::configuration(
                "scoring.throughput_saturation_kbps must be positive",
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            output: OutputConfig::default(),
            fetch: FetchConfig::default(),
            probe: ProbeConfig::default(),
            ranking: RankingConfig::default(),
            ledger: LedgerConfig::default(),
            policy: PolicyConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file layered under
    /// `M3U_MERGE__SECTION__KEY` environment variables.
    pub fn load(path: &Path) -> AppResult<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
        } else {
            debug!(
                "Configuration file {} not found, using defaults and environment",
                path.display()
            );
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("failed to read configuration: {e}")))?;

        settings
            .try_deserialize::<Config>()
            .map_err(|e| AppError::configuration(format!("invalid configuration: {e}")))
    }

    /// Reject configurations that could only produce an empty or garbage run.
    pub fn validate(&self) -> AppResult<()> {
        if self.sources.is_empty() {
            return Err(AppError::configuration("no playlist sources configured"));
        }
        if self.output.path.as_os_str().is_empty() {
            return Err(AppError::configuration("output path is empty"));
        }
        for source in &self.sources {
            if source.name().trim().is_empty() {
                return Err(AppError::configuration("every source needs a name"));
            }
        }
        if self.probe.workers == 0 {
            return Err(AppError::configuration("probe.workers must be at least 1"));
        }
        if self.probe.max_attempts == 0 {
            return Err(AppError::configuration(
                "probe.max_attempts must be at least 1",
            ));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(AppError::configuration("fetch.timeout_secs must be positive"));
        }
        if !is_positive_seconds(self.probe.timeout_secs) {
            return Err(AppError::configuration(
                "probe.timeout_secs must be a positive number of seconds",
            ));
        }
        if !is_positive_seconds(self.probe.latency_ceiling_secs) {
            return Err(AppError::configuration(
                "probe.latency_ceiling_secs must be a positive number of seconds",
            ));
        }
        if let Some(deadline) = self.probe.run_deadline_secs {
            if !is_positive_seconds(deadline) {
                return Err(AppError::configuration(
                    "probe.run_deadline_secs must be a positive number of seconds",
                ));
            }
        }
        if !(self.probe.throughput_floor_kbps.is_finite() && self.probe.throughput_floor_kbps >= 0.0) {
            return Err(AppError::configuration(
                "probe.throughput_floor_kbps must be zero or more",
            ));
        }
        if self.probe.byte_budget == 0 {
            return Err(AppError::configuration("probe.byte_budget must be positive"));
        }
        if self.ranking.top_k == 0 {
            return Err(AppError::configuration("ranking.top_k must be at least 1"));
        }
        if !(self.ledger.ema_alpha > 0.0 && self.ledger.ema_alpha <= 1.0) {
            return Err(AppError::configuration(
                "ledger.ema_alpha must be in (0, 1]",
            ));
        }
        if self.ledger.quarantine_threshold == 0 {
            return Err(AppError::configuration(
                "ledger.quarantine_threshold must be at least 1",
            ));
        }
        if self.ledger.staleness_window_hours == 0
            || self.ledger.staleness_window_hours > MAX_STALENESS_WINDOW_HOURS
        {
            return Err(AppError::configuration(format!(
                "ledger.staleness_window_hours must be between 1 and {MAX_STALENESS_WINDOW_HOURS}"
            )));
        }
        if let Some(days) = self.ledger.retention_days {
            if days > MAX_RETENTION_DAYS {
                return Err(AppError::configuration(format!(
                    "ledger.retention_days must be at most {MAX_RETENTION_DAYS}"
                )));
            }
        }
        self.scoring.validate()?;
        Ok(())
    }

    /// Default configuration with example sources, as written by `init-config`
    pub fn example() -> Self {
        Self {
            sources: vec![
                SourceConfig::Http {
                    name: "hk".to_string(),
                    url: "https://iptv-org.github.io/iptv/regions/hk.m3u".to_string(),
                },
                SourceConfig::Http {
                    name: "tw".to_string(),
                    url: "https://iptv-org.github.io/iptv/regions/tw.m3u".to_string(),
                },
                SourceConfig::Http {
                    name: "movies".to_string(),
                    url: "https://iptv-org.github.io/iptv/categories/movies.m3u".to_string(),
                },
                SourceConfig::Inline {
                    name: "custom".to_string(),
                    content: "#EXTINF:-1 tvg-name=\"CATCHPLAY Movies\" group-title=\"电影\",CATCHPLAY 电影台\nhttps://example.com/CH_CATCHPLAY/index.m3u8\n".to_string(),
                },
            ],
            ..Self::default()
        }
    }

    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| AppError::internal(format!("failed to serialize configuration: {e}")))
    }
}
