//! Per-channel ranking
//!
//! Candidates alive this run and not quarantined are scored and sorted;
//! the top K survive. Equal scores are broken by declared quality (higher
//! first), then secure transport first, then URL string, so the output is
//! fully determined by the probe results and ledger state.
//!
//! When no candidate is alive the channel falls back to its last known good
//! URL (most recent successful probe on record) instead of disappearing.

use std::cmp::Ordering;

use tracing::warn;

use crate::models::{
    CandidateUrl, HealthRecord, ProbeFailure, ProbeResult, RankedChannel, RankedUrl,
};
use crate::proxy::channel_pool::PoolEntry;
use crate::services::health_ledger::HealthLedger;
use crate::services::probe_scheduler::ProbeOutcome;
use crate::services::scorer::Scorer;

pub struct Ranker<'a> {
    scorer: &'a Scorer,
    ledger: &'a HealthLedger,
    top_k: usize,
    /// Unix seconds used for every recency calculation of this run
    now: i64,
}

struct Scored<'c> {
    candidate: &'c CandidateUrl,
    score: f64,
}

impl<'a> Ranker<'a> {
    pub fn new(scorer: &'a Scorer, ledger: &'a HealthLedger, top_k: usize, now: i64) -> Self {
        Self {
            scorer,
            ledger,
            top_k: top_k.max(1),
            now,
        }
    }

    /// Rank one channel. `None` means nothing alive and no history to fall back on.
    pub fn rank(&self, entry: &PoolEntry, probes: &ProbeOutcome) -> Option<RankedChannel> {
        let mut scored: Vec<Scored<'_>> = entry
            .candidates
            .iter()
            .filter(|c| probes.is_alive(&c.url) && !self.ledger.is_quarantined(&c.url))
            .filter_map(|candidate| {
                let probe = probes.get(&candidate.url)?;
                let health = self.ledger.get(&candidate.url);
                Some(Scored {
                    candidate,
                    score: self.scorer.score(candidate, probe, health.as_ref(), self.now),
                })
            })
            .collect();

        if scored.is_empty() {
            return self.fallback(entry, probes);
        }

        scored.sort_by(compare_scored);
        scored.truncate(self.top_k);

        Some(self.ranked_channel(
            entry,
            scored
                .into_iter()
                .map(|s| RankedUrl {
                    url: s.candidate.url.clone(),
                    score: s.score,
                })
                .collect(),
            false,
        ))
    }

    fn fallback(&self, entry: &PoolEntry, probes: &ProbeOutcome) -> Option<RankedChannel> {
        let history: Vec<(&CandidateUrl, HealthRecord)> = entry
            .candidates
            .iter()
            .filter_map(|c| self.ledger.get(&c.url).map(|h| (c, h)))
            .filter(|(_, h)| h.has_succeeded())
            .collect();

        let threshold = self.ledger.quarantine_threshold();
        let best = last_known_good(history.iter().filter(|(_, h)| !h.is_quarantined(threshold)))
            .or_else(|| last_known_good(history.iter()));

        let Some((candidate, health)) = best else {
            warn!(
                identity = %entry.identity,
                candidates = entry.candidates.len(),
                "Channel lost: no candidate alive and no previous success on record"
            );
            return None;
        };

        warn!(
            identity = %entry.identity,
            url = %candidate.url,
            last_success = health.last_success_timestamp,
            "No candidate alive, falling back to last known good URL"
        );

        let dead;
        let probe = match probes.get(&candidate.url) {
            Some(probe) => probe,
            None => {
                dead = ProbeResult::dead(&candidate.url, ProbeFailure::Timeout, self.now);
                &dead
            }
        };
        let score = self.scorer.score(candidate, probe, Some(health), self.now);

        Some(self.ranked_channel(
            entry,
            vec![RankedUrl {
                url: candidate.url.clone(),
                score,
            }],
            true,
        ))
    }

    fn ranked_channel(
        &self,
        entry: &PoolEntry,
        ordered_urls: Vec<RankedUrl>,
        fallback: bool,
    ) -> RankedChannel {
        RankedChannel {
            identity: entry.identity.clone(),
            ordered_urls,
            declared_name: entry.display_name.clone(),
            group_title: entry.group_title.clone(),
            attributes: entry.attributes.clone(),
            fallback,
        }
    }
}

fn compare_scored(a: &Scored<'_>, b: &Scored<'_>) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.candidate.declared_quality.cmp(&a.candidate.declared_quality))
        .then_with(|| b.candidate.is_secure().cmp(&a.candidate.is_secure()))
        .then_with(|| a.candidate.url.cmp(&b.candidate.url))
}

/// Most recent success wins; equal timestamps resolve by URL
fn last_known_good<'h, 'c: 'h>(
    history: impl Iterator<Item = &'h (&'c CandidateUrl, HealthRecord)>,
) -> Option<(&'c CandidateUrl, &'h HealthRecord)> {
    history
        .map(|(c, h)| (*c, h))
        .max_by(|(ca, ha), (cb, hb)| {
            ha.last_success_timestamp
                .cmp(&hb.last_success_timestamp)
                .then_with(|| cb.url.cmp(&ca.url))
        })
}
