//! Candidate scoring
//!
//! Combines static signals (declared quality tier, URL heuristics) with this
//! run's probe metrics and the URL's ledger history into one comparable
//! number. Each term is monotonic in its signal:
//!
//! - quality tier: 4K > 1080p > 720p > SD
//! - latency: `w * (1 - latency / ceiling)`, negative above the ceiling and
//!   floored at `-w`
//! - throughput: `w * (1 - e^(-(kbps - floor) / saturation))` above the floor
//! - stability: `w * (successes + 1) / (probes + 2)`
//! - recency: `w * (1 - age / window)`, zero once the window has passed

use crate::config::{Config, ScoringConfig};
use crate::models::{CandidateUrl, DeclaredQuality, HealthRecord, ProbeResult};

const STREAM_EXTENSIONS: &[&str] = &[".m3u8", ".ts", ".flv", ".mpd"];
const MULTICAST_RELAY_SEGMENTS: &[&str] = &["/udp/", "/rtp/", "/igmp/"];

#[derive(Debug, Clone)]
pub struct Scorer {
    weights: ScoringConfig,
    latency_ceiling_secs: f64,
    throughput_floor_kbps: f64,
    staleness_window_secs: i64,
}

impl Scorer {
    pub fn new(
        weights: ScoringConfig,
        latency_ceiling_secs: f64,
        throughput_floor_kbps: f64,
        staleness_window_secs: i64,
    ) -> Self {
        Self {
            weights,
            latency_ceiling_secs: latency_ceiling_secs.max(f64::EPSILON),
            throughput_floor_kbps,
            staleness_window_secs: staleness_window_secs.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.scoring.clone(),
            config.probe.latency_ceiling_secs,
            config.probe.throughput_floor_kbps,
            config.ledger.staleness_window_secs(),
        )
    }

    /// Full score. `now` is Unix seconds.
    pub fn score(
        &self,
        candidate: &CandidateUrl,
        probe: &ProbeResult,
        health: Option<&HealthRecord>,
        now: i64,
    ) -> f64 {
        let mut score = self.static_score(candidate);
        if probe.alive {
            score += self.latency_term(probe.latency_seconds);
            if let Some(kbps) = probe.throughput_kbps {
                score += self.throughput_term(kbps);
            }
        }
        score + self.stability_term(health) + self.recency_term(health, now)
    }

    /// Quality tier plus URL heuristics
    pub fn static_score(&self, candidate: &CandidateUrl) -> f64 {
        self.tier_weight(candidate.declared_quality) + self.url_heuristics(&candidate.url)
    }

    pub fn tier_weight(&self, quality: DeclaredQuality) -> f64 {
        match quality {
            DeclaredQuality::Uhd4k => self.weights.uhd,
            DeclaredQuality::Fhd1080 => self.weights.fhd,
            DeclaredQuality::Hd720 => self.weights.hd,
            DeclaredQuality::Sd => self.weights.sd,
            DeclaredQuality::Unknown => self.weights.unknown,
        }
    }

    fn url_heuristics(&self, url: &str) -> f64 {
        let lower = url.to_ascii_lowercase();
        let path = lower.split(['?', '#']).next().unwrap_or("");
        let mut bonus = 0.0;

        if lower.starts_with("https://") {
            bonus += self.weights.secure_transport_bonus;
        }
        if STREAM_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            bonus += self.weights.stream_extension_bonus;
        }
        if MULTICAST_RELAY_SEGMENTS.iter().any(|seg| path.contains(seg)) {
            bonus -= self.weights.multicast_relay_penalty;
        }
        bonus
    }

    fn latency_term(&self, latency_secs: f64) -> f64 {
        let w = self.weights.latency;
        (w * (1.0 - latency_secs.max(0.0) / self.latency_ceiling_secs)).max(-w)
    }

    fn throughput_term(&self, kbps: f64) -> f64 {
        if kbps < self.throughput_floor_kbps {
            return 0.0;
        }
        let saturation = self.weights.throughput_saturation_kbps.max(1.0);
        self.weights.throughput * (1.0 - (-(kbps - self.throughput_floor_kbps) / saturation).exp())
    }

    fn stability_term(&self, health: Option<&HealthRecord>) -> f64 {
        let (success, fail) = health
            .map(|h| (h.success_count as f64, h.fail_count as f64))
            .unwrap_or((0.0, 0.0));
        self.weights.stability * (success + 1.0) / (success + fail + 2.0)
    }

    fn recency_term(&self, health: Option<&HealthRecord>, now: i64) -> f64 {
        let Some(last_success) = health.map(|h| h.last_success_timestamp).filter(|ts| *ts > 0)
        else {
            return 0.0;
        };
        let age = (now - last_success).max(0);
        if age >= self.staleness_window_secs {
            return 0.0;
        }
        self.weights.recency * (1.0 - age as f64 / self.staleness_window_secs as f64)
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
