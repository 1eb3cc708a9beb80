//! Run orchestration
//!
//! One run: validate configuration, load the ledger, fetch and parse every
//! source into a channel pool, probe every candidate, persist the ledger,
//! rank each channel and write the merged playlist.
//!
//! Each stage receives what it needs explicitly. The pool is built once and
//! only read afterwards; the ranked list is a fresh value built from the pool,
//! the probe outcome and the ledger. Nothing is shared between runs except
//! what the ledger store persists.
//!
//! Either a complete playlist is written or nothing is: configuration errors
//! abort before any network traffic, and the minimum-channel guard runs
//! before the first byte of output.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::{LedgerStore, MemoryLedgerStore, SqliteLedgerStore};
use crate::errors::{AppError, AppResult};
use crate::ingestor::{parse_playlist, FetchedPlaylist, ParseStats, SourceFetcher};
use crate::models::RankedChannel;
use crate::proxy::channel_pool::{ChannelPool, PoolStats};
use crate::proxy::filter_engine::CategoryClassifier;
use crate::proxy::generator::M3uGenerator;
use crate::proxy::ranker::Ranker;
use crate::services::health_ledger::HealthLedger;
use crate::services::probe_scheduler::{ProbeOutcome, ProbeScheduler, ProbeStats};
use crate::services::scorer::Scorer;
use crate::services::stream_prober::StreamProber;
use crate::utils::NameNormalizer;

/// Summary of one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub sources_ok: usize,
    pub sources_failed: Vec<String>,
    pub parse: ParseStats,
    pub pool: PoolStats,
    pub channels_pooled: usize,
    pub candidates: usize,
    pub probes: ProbeStats,
    pub channels_ranked: usize,
    pub fallbacks: usize,
    pub channels_lost: Vec<String>,
    pub ledger_records: usize,
    pub ledger_purged: usize,
    pub output_path: PathBuf,
}

/// Ranked channels plus the channels that could not be ranked
#[derive(Debug, Default)]
pub struct RankingResult {
    pub channels: Vec<RankedChannel>,
    pub fallbacks: usize,
    pub lost: Vec<String>,
}

pub struct Aggregator {
    config: Config,
    store: Arc<dyn LedgerStore>,
}

impl Aggregator {
    pub fn new(config: Config, store: Arc<dyn LedgerStore>) -> Self {
        Self { config, store }
    }

    /// Validate the configuration and open the SQLite ledger it names.
    ///
    /// An unusable ledger degrades the run to process-local history; only
    /// configuration errors abort here.
    pub async fn from_config(config: Config) -> AppResult<Self> {
        config.validate()?;
        let store: Arc<dyn LedgerStore> = match SqliteLedgerStore::connect(&config.ledger).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                warn!(
                    error = %e,
                    "Could not open health ledger, history will not survive this run"
                );
                Arc::new(MemoryLedgerStore::new())
            }
        };
        Ok(Self::new(config, store))
    }

    /// Execute the whole pipeline once
    pub async fn run(&self) -> AppResult<RunReport> {
        self.config.validate()?;
        let mut report = RunReport {
            output_path: self.config.output.path.clone(),
            ..RunReport::default()
        };

        let ledger = self.load_ledger().await;

        let fetcher = SourceFetcher::new(&self.config.fetch, &self.config.probe.user_agent);
        let fetched = fetcher.fetch_all(&self.config.sources).await;
        report.sources_ok = self.config.sources.len() - fetched.failed.len();
        report.sources_failed = fetched.failed.iter().map(|(name, _)| name.clone()).collect();

        let (pool, parse_stats) = self.build_pool(&fetched.playlists)?;
        report.parse = parse_stats;
        report.pool = pool.stats().clone();
        report.channels_pooled = pool.len();
        report.candidates = pool.candidate_count();

        let probes = self.probe(&pool, &ledger).await;
        report.probes = probes.stats.clone();

        let now = chrono::Utc::now().timestamp();
        report.ledger_purged = self.apply_retention(&ledger, now).await;
        self.persist_ledger(&ledger).await;
        report.ledger_records = ledger.len();

        let ranking = self.rank(&pool, &probes, &ledger, now);
        report.channels_ranked = ranking.channels.len();
        report.fallbacks = ranking.fallbacks;
        report.channels_lost = ranking.lost;

        M3uGenerator::new(self.config.output.min_channels)
            .write(
                &ranking.channels,
                &self.config.output.path,
                &self.config.output.mirror_paths,
            )
            .await?;

        info!(
            sources = report.sources_ok,
            channels = report.channels_ranked,
            fallbacks = report.fallbacks,
            lost = report.channels_lost.len(),
            "Run complete"
        );
        Ok(report)
    }

    async fn load_ledger(&self) -> HealthLedger {
        let ledger = HealthLedger::from_config(&self.config.ledger);
        match self.store.load().await {
            Ok(records) => ledger.load(records),
            Err(e) => warn!(error = %e, "Could not load health ledger, starting empty"),
        }
        ledger
    }

    /// Parse, normalize and classify every fetched playlist into one pool
    pub fn build_pool(&self, playlists: &[FetchedPlaylist]) -> AppResult<(ChannelPool, ParseStats)> {
        let normalizer = NameNormalizer::new(&self.config.policy.extra_quality_tokens)
            .map_err(|e| AppError::configuration(format!("invalid quality token: {e}")))?;
        let classifier = CategoryClassifier::new(&self.config.policy);

        let mut pool = ChannelPool::new();
        let mut totals = ParseStats::default();

        for playlist in playlists {
            let mut parser = parse_playlist(&playlist.content, &playlist.source_id);
            for record in parser.by_ref() {
                pool.offer(&record, &normalizer, &classifier);
            }

            let stats = parser.stats();
            if stats.anomalies() > 0 {
                info!(
                    source = %playlist.source_id,
                    orphan_addresses = stats.orphan_addresses,
                    unaddressed_entries = stats.unaddressed_entries,
                    "Dropped malformed playlist entries"
                );
            }
            debug!(source = %playlist.source_id, records = stats.records, "Parsed playlist");
            totals.merge(&stats);
        }

        info!(
            channels = pool.len(),
            candidates = pool.candidate_count(),
            blocked = pool.stats().blocked,
            "Built channel pool"
        );
        Ok((pool, totals))
    }

    async fn probe(&self, pool: &ChannelPool, ledger: &HealthLedger) -> ProbeOutcome {
        let prober = StreamProber::new(&self.config.probe);
        ProbeScheduler::new(
            prober,
            self.config.probe.workers,
            self.config.probe.run_deadline(),
        )
        .probe_all(pool.urls(), ledger)
        .await
    }

    async fn apply_retention(&self, ledger: &HealthLedger, now: i64) -> usize {
        let Some(days) = self.config.ledger.retention_days else {
            return 0;
        };
        let cutoff = now - (days as i64) * 86_400;
        let purged = ledger.purge_older_than(cutoff);
        if let Err(e) = self.store.purge_older_than(cutoff).await {
            warn!(error = %e, "Could not purge expired health records");
        }
        if purged > 0 {
            info!("Purged {} health records older than {} days", purged, days);
        }
        purged
    }

    async fn persist_ledger(&self, ledger: &HealthLedger) {
        if let Err(e) = self.store.save(&ledger.snapshot()).await {
            warn!(error = %e, "Could not persist health ledger");
        }
    }

    /// Rank every pooled channel against this run's probes and the ledger
    pub fn rank(
        &self,
        pool: &ChannelPool,
        probes: &ProbeOutcome,
        ledger: &HealthLedger,
        now: i64,
    ) -> RankingResult {
        let scorer = Scorer::from_config(&self.config);
        let ranker = Ranker::new(&scorer, ledger, self.config.ranking.top_k, now);

        let mut result = RankingResult::default();
        for entry in pool.entries() {
            match ranker.rank(entry, probes) {
                Some(channel) => {
                    if channel.fallback {
                        result.fallbacks += 1;
                    }
                    result.channels.push(channel);
                }
                None => result.lost.push(entry.identity.to_string()),
            }
        }
        result
    }
}
