//! In-memory health ledger
//!
//! Cross-run per-URL history, loaded from the ledger store at run start and
//! written back at run end. Probe completions from many concurrent tasks
//! update it; each update holds only the shard lock for its own URL key.
//!
//! Responsibilities:
//! - Fold every probe outcome into the URL's record (one success or failure
//!   increment, rolling averages on success, fail-streak bookkeeping)
//! - Answer quarantine and last-known-good questions for the ranker
//! - Apply the optional retention window
//!
//! Records are keyed by URL, never by channel identity, so a URL keeps its
//! history when the channel it is listed under is renamed.

use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::LedgerConfig;
use crate::models::{HealthRecord, ProbeResult};

pub struct HealthLedger {
    records: DashMap<String, HealthRecord>,
    ema_alpha: f64,
    quarantine_threshold: u32,
}

impl HealthLedger {
    pub fn new(ema_alpha: f64, quarantine_threshold: u32) -> Self {
        Self {
            records: DashMap::new(),
            ema_alpha: ema_alpha.clamp(f64::MIN_POSITIVE, 1.0),
            quarantine_threshold: quarantine_threshold.max(1),
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.ema_alpha, config.quarantine_threshold)
    }

    /// Seed from persisted records, replacing any with the same URL
    pub fn load(&self, records: impl IntoIterator<Item = HealthRecord>) {
        let mut loaded = 0usize;
        for record in records {
            self.records.insert(record.url.clone(), record);
            loaded += 1;
        }
        debug!("Loaded {} health records", loaded);
    }

    /// Fold one probe outcome into its URL's record and return the updated copy
    pub fn record(&self, result: &ProbeResult) -> HealthRecord {
        let mut entry = self
            .records
            .entry(result.url.clone())
            .or_insert_with(|| HealthRecord::new(&result.url));
        let record = entry.value_mut();

        if result.alive {
            let first_sample = record.success_count == 0;
            record.success_count = record.success_count.saturating_add(1);
            record.average_latency = if first_sample {
                result.latency_seconds
            } else {
                self.ema(record.average_latency, result.latency_seconds)
            };
            if let Some(kbps) = result.throughput_kbps {
                record.average_bitrate = if record.average_bitrate <= 0.0 {
                    kbps
                } else {
                    self.ema(record.average_bitrate, kbps)
                };
            }
            record.last_success_timestamp = result.timestamp;
            if record.consecutive_failures >= self.quarantine_threshold {
                info!(url = %record.url, "URL recovered from quarantine");
            }
            record.consecutive_failures = 0;
        } else {
            record.fail_count = record.fail_count.saturating_add(1);
            record.consecutive_failures = record.consecutive_failures.saturating_add(1);
            if record.consecutive_failures == self.quarantine_threshold {
                debug!(
                    url = %record.url,
                    failures = record.consecutive_failures,
                    "URL entered quarantine"
                );
            }
        }
        record.last_probe_timestamp = result.timestamp;

        record.clone()
    }

    fn ema(&self, average: f64, sample: f64) -> f64 {
        self.ema_alpha * sample + (1.0 - self.ema_alpha) * average
    }

    pub fn get(&self, url: &str) -> Option<HealthRecord> {
        self.records.get(url).map(|r| r.value().clone())
    }

    pub fn is_quarantined(&self, url: &str) -> bool {
        self.records
            .get(url)
            .map(|r| r.is_quarantined(self.quarantine_threshold))
            .unwrap_or(false)
    }

    pub fn quarantine_threshold(&self) -> u32 {
        self.quarantine_threshold
    }

    /// Every record, ordered by URL
    pub fn snapshot(&self) -> Vec<HealthRecord> {
        let mut records: Vec<HealthRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.url.cmp(&b.url));
        records
    }

    /// Drop records whose last probe is older than `cutoff` (Unix seconds)
    pub fn purge_older_than(&self, cutoff: i64) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, record| record.last_probe_timestamp >= cutoff);
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
