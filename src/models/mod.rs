//! Core data model shared by every pipeline stage

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One EXTINF/address pair as read from a playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChannelRecord {
    pub declared_name: String,
    pub attributes: BTreeMap<String, String>,
    pub url: String,
    pub source_id: String,
}

impl RawChannelRecord {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn group_title(&self) -> Option<&str> {
        self.attribute("group-title")
    }
}

/// Canonical key for one logical channel across naming variants.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelIdentity(String);

impl ChannelIdentity {
    pub(crate) fn new(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ChannelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Resolution tier announced by the channel name.
///
/// Ordered from least to most preferred; `Unknown` sorts lowest so that a
/// declared tier always wins a tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclaredQuality {
    Unknown,
    Sd,
    Hd720,
    Fhd1080,
    Uhd4k,
}

impl DeclaredQuality {
    /// Tier announced by one folded quality token, if the token names one.
    /// Codec tokens (HEVC, H264) carry no tier.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "4K" | "8K" | "2160P" | "UHD" | "4K超高清" | "超高清" => Some(Self::Uhd4k),
            "1080P" | "1080I" | "FHD" | "蓝光" | "藍光" | "超清" => Some(Self::Fhd1080),
            "720P" | "HD" | "高清" | "高画质" | "高畫質" => Some(Self::Hd720),
            "576P" | "576I" | "480P" | "SD" | "标清" | "標清" => Some(Self::Sd),
            _ => None,
        }
    }
}

impl fmt::Display for DeclaredQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unknown => "unknown",
            Self::Sd => "SD",
            Self::Hd720 => "720p",
            Self::Fhd1080 => "1080p",
            Self::Uhd4k => "4K",
        };
        f.write_str(label)
    }
}

/// One concrete stream address belonging to exactly one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateUrl {
    pub url: String,
    pub identity: ChannelIdentity,
    pub declared_quality: DeclaredQuality,
    pub attributes: BTreeMap<String, String>,
}

impl CandidateUrl {
    pub fn is_secure(&self) -> bool {
        self.url
            .get(..8)
            .map(|prefix| prefix.eq_ignore_ascii_case("https://"))
            .unwrap_or(false)
    }
}

/// Why a probe was judged not alive. Logged, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ProbeFailure {
    Timeout,
    Connect { message: String },
    HttpStatus { status: u16 },
    HtmlContent,
    EmptyBody,
    ShortBody { bytes: usize },
    InvalidPlaylist { message: String },
    UnsupportedScheme { scheme: String },
    TooSlow { latency_secs: f64 },
    LowThroughput { kbps: f64 },
}

impl ProbeFailure {
    /// Failures worth another attempt within the same run
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect { .. } => true,
            Self::HttpStatus { status } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Connect { message } => write!(f, "connection failed: {message}"),
            Self::HttpStatus { status } => write!(f, "HTTP {status}"),
            Self::HtmlContent => write!(f, "HTML page instead of media"),
            Self::EmptyBody => write!(f, "empty response body"),
            Self::ShortBody { bytes } => write!(f, "body ended after {bytes} bytes"),
            Self::InvalidPlaylist { message } => write!(f, "invalid HLS playlist: {message}"),
            Self::UnsupportedScheme { scheme } => write!(f, "unsupported scheme {scheme}"),
            Self::TooSlow { latency_secs } => write!(f, "first byte after {latency_secs:.2}s"),
            Self::LowThroughput { kbps } => write!(f, "throughput {kbps:.0} kbps"),
        }
    }
}

/// Outcome of one probe attempt. Folded into a `HealthRecord`, never stored raw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub url: String,
    pub alive: bool,
    pub latency_seconds: f64,
    pub throughput_kbps: Option<f64>,
    /// Unix seconds
    pub timestamp: i64,
    pub failure: Option<ProbeFailure>,
}

impl ProbeResult {
    pub fn alive(url: &str, latency_seconds: f64, throughput_kbps: Option<f64>, timestamp: i64) -> Self {
        Self {
            url: url.to_string(),
            alive: true,
            latency_seconds,
            throughput_kbps,
            timestamp,
            failure: None,
        }
    }

    /// A dead probe carries zero metrics.
    pub fn dead(url: &str, failure: ProbeFailure, timestamp: i64) -> Self {
        Self {
            url: url.to_string(),
            alive: false,
            latency_seconds: 0.0,
            throughput_kbps: None,
            timestamp,
            failure: Some(failure),
        }
    }
}

/// Cross-run history of one URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub url: String,
    pub success_count: u32,
    pub fail_count: u32,
    pub average_latency: f64,
    pub average_bitrate: f64,
    /// Unix seconds, 0 when the URL never succeeded
    pub last_success_timestamp: i64,
    /// Unix seconds of the most recent probe of any outcome
    pub last_probe_timestamp: i64,
    pub consecutive_failures: u32,
}

impl HealthRecord {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            success_count: 0,
            fail_count: 0,
            average_latency: 0.0,
            average_bitrate: 0.0,
            last_success_timestamp: 0,
            last_probe_timestamp: 0,
            consecutive_failures: 0,
        }
    }

    pub fn has_succeeded(&self) -> bool {
        self.success_count > 0 && self.last_success_timestamp > 0
    }

    pub fn is_quarantined(&self, threshold: u32) -> bool {
        self.consecutive_failures >= threshold
    }
}

/// One ranked address with the score that placed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedUrl {
    pub url: String,
    pub score: f64,
}

/// The unit written to the merged playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedChannel {
    pub identity: ChannelIdentity,
    pub ordered_urls: Vec<RankedUrl>,
    pub declared_name: String,
    pub group_title: String,
    pub attributes: BTreeMap<String, String>,
    /// Set when no candidate was alive and the last known good URL was used
    pub fallback: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_from_token() {
        assert_eq!(DeclaredQuality::from_token("超高清"), Some(DeclaredQuality::Uhd4k));
        assert_eq!(DeclaredQuality::from_token("1080P"), Some(DeclaredQuality::Fhd1080));
        assert_eq!(DeclaredQuality::from_token("HD"), Some(DeclaredQuality::Hd720));
        assert_eq!(DeclaredQuality::from_token("标清"), Some(DeclaredQuality::Sd));
        assert_eq!(DeclaredQuality::from_token("HEVC"), None);
    }

    #[test]
    fn test_quality_ordering() {
        assert!(DeclaredQuality::Uhd4k > DeclaredQuality::Fhd1080);
        assert!(DeclaredQuality::Fhd1080 > DeclaredQuality::Hd720);
        assert!(DeclaredQuality::Hd720 > DeclaredQuality::Sd);
        assert!(DeclaredQuality::Sd > DeclaredQuality::Unknown);
    }

    #[test]
    fn test_transient_failures() {
        assert!(ProbeFailure::Timeout.is_transient());
        assert!(ProbeFailure::HttpStatus { status: 503 }.is_transient());
        assert!(ProbeFailure::HttpStatus { status: 429 }.is_transient());
        assert!(!ProbeFailure::HttpStatus { status: 404 }.is_transient());
        assert!(!ProbeFailure::HtmlContent.is_transient());
    }

    #[test]
    fn test_quarantine_threshold() {
        let mut record = HealthRecord::new("http://a");
        record.consecutive_failures = 2;
        assert!(!record.is_quarantined(3));
        record.consecutive_failures = 3;
        assert!(record.is_quarantined(3));
    }
}
