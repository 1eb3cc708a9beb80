//! Bounded probe fan-out
//!
//! One probe task per candidate URL, at most `workers` in flight. Each
//! result is folded into the health ledger as soon as it arrives. A slow
//! probe never cancels its siblings; the per-probe timeout is the only
//! cancellation, plus the optional deadline for the whole phase.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use crate::models::ProbeResult;
use crate::services::health_ledger::HealthLedger;
use crate::services::stream_prober::StreamProber;

/// Probe results of one run, keyed by URL
#[derive(Debug, Default)]
pub struct ProbeOutcome {
    pub results: HashMap<String, ProbeResult>,
    pub stats: ProbeStats,
}

impl ProbeOutcome {
    pub fn get(&self, url: &str) -> Option<&ProbeResult> {
        self.results.get(url)
    }

    /// Whether `url` was probed alive this run. Unfinished probes are not.
    pub fn is_alive(&self, url: &str) -> bool {
        self.results.get(url).map(|r| r.alive).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProbeStats {
    pub scheduled: usize,
    pub alive: usize,
    pub dead: usize,
    /// Still running when the phase deadline passed
    pub unfinished: usize,
    pub elapsed_secs: f64,
}

pub struct ProbeScheduler {
    prober: StreamProber,
    workers: usize,
    deadline: Option<Duration>,
}

impl ProbeScheduler {
    pub fn new(prober: StreamProber, workers: usize, deadline: Option<Duration>) -> Self {
        Self {
            prober,
            workers: workers.max(1),
            deadline,
        }
    }

    /// Probe every URL and record each completion in `ledger`
    pub async fn probe_all(&self, urls: Vec<String>, ledger: &HealthLedger) -> ProbeOutcome {
        let started = Instant::now();
        let scheduled = urls.len();
        info!(
            "Probing {} candidate URLs with {} workers",
            scheduled, self.workers
        );

        let prober = self.prober.clone();
        let probes = stream::iter(urls)
            .map(move |url| {
                let prober = prober.clone();
                async move { prober.probe_with_retry(&url).await }
            })
            .buffer_unordered(self.workers);
        futures::pin_mut!(probes);

        let deadline = self
            .deadline
            .map(|budget| tokio::time::Instant::now() + budget);
        let mut outcome = ProbeOutcome::default();

        loop {
            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, probes.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(
                            finished = outcome.results.len(),
                            scheduled, "Probe phase deadline reached, abandoning remaining probes"
                        );
                        break;
                    }
                },
                None => probes.next().await,
            };
            let Some(result) = next else { break };

            ledger.record(&result);
            if result.alive {
                outcome.stats.alive += 1;
            } else {
                outcome.stats.dead += 1;
            }
            outcome.results.insert(result.url.clone(), result);
        }

        outcome.stats.scheduled = scheduled;
        outcome.stats.unfinished = scheduled.saturating_sub(outcome.results.len());
        outcome.stats.elapsed_secs = started.elapsed().as_secs_f64();

        info!(
            alive = outcome.stats.alive,
            dead = outcome.stats.dead,
            unfinished = outcome.stats.unfinished,
            "Probe phase finished in {:.1}s",
            outcome.stats.elapsed_secs
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn prober() -> StreamProber {
        StreamProber::new(&ProbeConfig {
            timeout_secs: 2.0,
            max_attempts: 1,
            throughput_floor_kbps: 0.0,
            ..ProbeConfig::default()
        })
    }

    #[tokio::test]
    async fn test_results_are_recorded_in_ledger() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok.ts"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 512]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/down.ts"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let ledger = HealthLedger::new(0.3, 5);
        let ok = format!("{}/ok.ts", server.uri());
        let down = format!("{}/down.ts", server.uri());

        let outcome = ProbeScheduler::new(prober(), 4, None)
            .probe_all(vec![ok.clone(), down.clone()], &ledger)
            .await;

        assert_eq!(outcome.stats.alive, 1);
        assert_eq!(outcome.stats.dead, 1);
        assert!(outcome.is_alive(&ok));
        assert!(!outcome.is_alive(&down));
        assert_eq!(ledger.get(&ok).unwrap().success_count, 1);
        assert_eq!(ledger.get(&down).unwrap().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_deadline_leaves_slow_probes_unrecorded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fast.ts"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 512]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/slow.ts"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(1500)))
            .mount(&server)
            .await;

        let ledger = HealthLedger::new(0.3, 5);
        let fast = format!("{}/fast.ts", server.uri());
        let slow = format!("{}/slow.ts", server.uri());

        let outcome = ProbeScheduler::new(prober(), 4, Some(Duration::from_millis(500)))
            .probe_all(vec![slow.clone(), fast.clone()], &ledger)
            .await;

        assert!(outcome.is_alive(&fast));
        assert!(!outcome.is_alive(&slow));
        assert_eq!(outcome.stats.unfinished, 1);
        assert!(ledger.get(&slow).is_none());
    }
}
