//! Stream liveness probing
//!
//! A probe is a bounded GET of one candidate URL. It answers two questions:
//! is the address reachable and serving media (not an error page), and is it
//! usable (first byte arrives under the latency ceiling, a short read clears
//! the throughput floor). Throughput from a short read is a best-effort
//! signal and does not guarantee sustained bitrate.
//!
//! Probes never fail: every network error becomes a dead [`ProbeResult`]
//! with zero metrics. The prober holds no mutable state, so any number of
//! probes may run concurrently against one instance.

use std::time::{Duration, Instant};

use futures::StreamExt;
use m3u8_rs::Playlist;
use reqwest::{header, Client, Response};
use tokio::time::sleep;
use tracing::{debug, trace};
use url::Url;

use crate::config::ProbeConfig;
use crate::models::{ProbeFailure, ProbeResult};
use crate::utils::RetryConfig;

/// Master -> variant -> segment
const MAX_HLS_HOPS: usize = 2;

/// Bytes inspected when sniffing for an HTML page
const SNIFF_LEN: usize = 512;

/// One MPEG-TS packet. A complete media body shorter than this is not a stream.
const MIN_MEDIA_BYTES: usize = 188;

/// Liveness prober for HTTP(S) stream addresses
#[derive(Debug, Clone)]
pub struct StreamProber {
    client: Client,
    timeout: Duration,
    latency_ceiling: Duration,
    throughput_floor_kbps: f64,
    byte_budget: usize,
    follow_hls: bool,
    retry: RetryConfig,
}

/// A bounded prefix of one response body
struct BodySample {
    bytes: Vec<u8>,
    elapsed: Duration,
    /// The body ended before the byte budget was reached
    complete: bool,
    content_type: String,
}

impl BodySample {
    fn throughput_kbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64().max(0.001);
        (self.bytes.len() as f64 * 8.0) / 1000.0 / secs
    }
}

enum Hop {
    Variant(Url),
    Segment(Url),
}

impl StreamProber {
    pub fn new(config: &ProbeConfig) -> Self {
        let timeout = config.timeout();
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            timeout,
            latency_ceiling: config.latency_ceiling(),
            throughput_floor_kbps: config.throughput_floor_kbps,
            byte_budget: config.byte_budget.max(1),
            follow_hls: config.follow_hls,
            retry: RetryConfig::from_probe_config(config),
        }
    }

    /// One probe attempt, bounded by the configured timeout
    pub async fn probe(&self, url: &str) -> ProbeResult {
        let outcome = match tokio::time::timeout(self.timeout, self.probe_inner(url)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProbeFailure::Timeout),
        };
        let timestamp = chrono::Utc::now().timestamp();

        match outcome {
            Ok((latency, throughput)) => {
                debug!(
                    stream_url = %url,
                    latency_ms = latency.as_millis() as u64,
                    throughput_kbps = throughput.map(|t| t.round() as u64),
                    "Probe succeeded"
                );
                ProbeResult::alive(url, latency.as_secs_f64(), throughput, timestamp)
            }
            Err(failure) => {
                debug!(stream_url = %url, reason = %failure, "Probe failed");
                ProbeResult::dead(url, failure, timestamp)
            }
        }
    }

    /// Probe, retrying transient failures with exponential backoff
    pub async fn probe_with_retry(&self, url: &str) -> ProbeResult {
        let mut attempt = 1;
        loop {
            let result = self.probe(url).await;
            let retryable = result
                .failure
                .as_ref()
                .map(ProbeFailure::is_transient)
                .unwrap_or(false);

            if !retryable || attempt >= self.retry.max_attempts {
                if attempt > 1 {
                    debug!(
                        stream_url = %url,
                        alive = result.alive,
                        "Probe finished after {} attempts",
                        attempt
                    );
                }
                return result;
            }

            let delay = self.retry.delay_for(attempt);
            trace!(stream_url = %url, attempt, ?delay, "Retrying probe");
            sleep(delay).await;
            attempt += 1;
        }
    }

    async fn probe_inner(&self, url: &str) -> Result<(Duration, Option<f64>), ProbeFailure> {
        let mut target = parse_stream_url(url)?;

        let started = Instant::now();
        let response = self.get(&target).await?;
        let latency = started.elapsed();

        let mut sample = self.read_sample(response).await?;
        let mut followed_segment = false;
        let mut hops = 0;

        while self.follow_hls && is_hls(&sample) {
            if hops == MAX_HLS_HOPS {
                return Err(ProbeFailure::InvalidPlaylist {
                    message: "too many nested playlists".to_string(),
                });
            }
            hops += 1;

            let hop = next_hop(&target, &sample.bytes)?;
            let next = match &hop {
                Hop::Variant(next) | Hop::Segment(next) => next.clone(),
            };
            trace!(stream_url = %url, next = %next, "Following HLS playlist");

            let response = self.get(&next).await?;
            sample = self.read_sample(response).await?;
            target = next;

            if let Hop::Segment(_) = hop {
                followed_segment = true;
                break;
            }
        }

        if latency > self.latency_ceiling {
            return Err(ProbeFailure::TooSlow {
                latency_secs: latency.as_secs_f64(),
            });
        }

        if sample.bytes.is_empty() {
            return Err(ProbeFailure::EmptyBody);
        }
        // an unfollowed playlist is legitimately short
        if sample.complete && sample.bytes.len() < MIN_MEDIA_BYTES && !is_hls(&sample) {
            return Err(ProbeFailure::ShortBody {
                bytes: sample.bytes.len(),
            });
        }

        let throughput = if followed_segment || !sample.complete {
            Some(sample.throughput_kbps())
        } else {
            None
        };

        if let Some(kbps) = throughput {
            if kbps < self.throughput_floor_kbps {
                return Err(ProbeFailure::LowThroughput { kbps });
            }
        }

        Ok((latency, throughput))
    }

    async fn get(&self, url: &Url) -> Result<Response, ProbeFailure> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeFailure::HttpStatus {
                status: status.as_u16(),
            });
        }

        Ok(response)
    }

    /// Read at most `byte_budget` bytes and reject HTML pages
    async fn read_sample(&self, response: Response) -> Result<BodySample, ProbeFailure> {
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.contains("text/html") {
            return Err(ProbeFailure::HtmlContent);
        }

        let started = Instant::now();
        let mut stream = response.bytes_stream();
        let mut bytes = Vec::with_capacity(self.byte_budget.min(64 * 1024));
        let mut complete = true;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(transport_failure)?;
            let take = (self.byte_budget - bytes.len()).min(chunk.len());
            bytes.extend_from_slice(&chunk[..take]);
            if bytes.len() >= self.byte_budget {
                complete = false;
                break;
            }
        }

        if looks_like_html(&bytes) {
            return Err(ProbeFailure::HtmlContent);
        }

        Ok(BodySample {
            bytes,
            elapsed: started.elapsed(),
            complete,
            content_type,
        })
    }
}

fn parse_stream_url(url: &str) -> Result<Url, ProbeFailure> {
    let scheme = url.split("://").next().unwrap_or("").to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(ProbeFailure::UnsupportedScheme { scheme });
    }
    Url::parse(url).map_err(|e| ProbeFailure::Connect {
        message: format!("invalid address: {e}"),
    })
}

fn transport_failure(err: reqwest::Error) -> ProbeFailure {
    if err.is_timeout() {
        ProbeFailure::Timeout
    } else {
        ProbeFailure::Connect {
            message: err.to_string(),
        }
    }
}

fn body_prefix(bytes: &[u8]) -> String {
    let end = bytes.len().min(SNIFF_LEN);
    let text = String::from_utf8_lossy(&bytes[..end]);
    text.trim_start_matches('\u{feff}').trim_start().to_string()
}

fn looks_like_html(bytes: &[u8]) -> bool {
    let prefix = body_prefix(bytes).to_ascii_lowercase();
    prefix.starts_with("<!doctype html") || prefix.starts_with("<html")
}

fn is_hls(sample: &BodySample) -> bool {
    sample.content_type.contains("mpegurl") || body_prefix(&sample.bytes).starts_with("#EXTM3U")
}

/// Pick the next address from an HLS playlist
fn next_hop(base: &Url, body: &[u8]) -> Result<Hop, ProbeFailure> {
    let invalid = |message: &str| ProbeFailure::InvalidPlaylist {
        message: message.to_string(),
    };

    match m3u8_rs::parse_playlist_res(body) {
        Ok(Playlist::MasterPlaylist(master)) => {
            let variant = master
                .variants
                .iter()
                .filter(|v| !v.is_i_frame)
                .max_by_key(|v| v.bandwidth)
                .ok_or_else(|| invalid("master playlist has no variants"))?;
            resolve(base, &variant.uri).map(Hop::Variant)
        }
        Ok(Playlist::MediaPlaylist(media)) => {
            let segment = media
                .segments
                .first()
                .ok_or_else(|| invalid("media playlist has no segments"))?;
            resolve(base, &segment.uri).map(Hop::Segment)
        }
        Err(_) => Err(invalid("unparseable playlist")),
    }
}

fn resolve(base: &Url, uri: &str) -> Result<Url, ProbeFailure> {
    base.join(uri.trim()).map_err(|e| ProbeFailure::InvalidPlaylist {
        message: format!("bad playlist entry {uri}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> ProbeConfig {
        ProbeConfig {
            timeout_secs: 2.0,
            latency_ceiling_secs: 1.5,
            throughput_floor_kbps: 0.0,
            byte_budget: 16 * 1024,
            initial_backoff_ms: 10,
            max_backoff_ms: 20,
            ..ProbeConfig::default()
        }
    }

    async fn mount(server: &MockServer, at: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(response)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_short_media_body_is_alive_without_throughput() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/live.ts",
            ResponseTemplate::new(200)
                .insert_header("content-type", "video/mp2t")
                .set_body_bytes(vec![0x47u8; 4096]),
        )
        .await;

        let result = StreamProber::new(&config())
            .probe(&format!("{}/live.ts", server.uri()))
            .await;
        assert!(result.alive, "{:?}", result.failure);
        assert_eq!(result.throughput_kbps, None);
        assert!(result.latency_seconds >= 0.0);
    }

    #[tokio::test]
    async fn test_budget_read_measures_throughput() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/live.ts",
            ResponseTemplate::new(200).set_body_bytes(vec![0x47u8; 64 * 1024]),
        )
        .await;

        let result = StreamProber::new(&config())
            .probe(&format!("{}/live.ts", server.uri()))
            .await;
        assert!(result.alive);
        assert!(result.throughput_kbps.unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_low_throughput_is_dead() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/slow.ts",
            ResponseTemplate::new(200).set_body_bytes(vec![0x47u8; 64 * 1024]),
        )
        .await;

        let prober = StreamProber::new(&ProbeConfig {
            throughput_floor_kbps: 1e12,
            ..config()
        });
        let result = prober.probe(&format!("{}/slow.ts", server.uri())).await;
        assert!(!result.alive);
        assert!(matches!(result.failure, Some(ProbeFailure::LowThroughput { .. })));
        assert_eq!(result.latency_seconds, 0.0);
    }

    #[tokio::test]
    async fn test_empty_and_truncated_bodies_are_dead() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/empty.ts",
            ResponseTemplate::new(200).insert_header("content-type", "video/mp2t"),
        )
        .await;
        mount(
            &server,
            "/error.ts",
            ResponseTemplate::new(200)
                .insert_header("content-type", "video/mp2t")
                .set_body_string("stream offline"),
        )
        .await;
        mount(
            &server,
            "/packet.ts",
            ResponseTemplate::new(200)
                .insert_header("content-type", "video/mp2t")
                .set_body_bytes(vec![0x47u8; 188]),
        )
        .await;

        let prober = StreamProber::new(&config());
        let empty = prober.probe(&format!("{}/empty.ts", server.uri())).await;
        assert!(!empty.alive);
        assert_eq!(empty.failure, Some(ProbeFailure::EmptyBody));

        let error = prober.probe(&format!("{}/error.ts", server.uri())).await;
        assert!(!error.alive);
        assert_eq!(error.failure, Some(ProbeFailure::ShortBody { bytes: 14 }));

        let packet = prober.probe(&format!("{}/packet.ts", server.uri())).await;
        assert!(packet.alive, "{:?}", packet.failure);
    }

    #[tokio::test]
    async fn test_unfollowed_playlist_is_alive() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/index.m3u8",
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/vnd.apple.mpegurl")
                .set_body_string("#EXTM3U\n#EXTINF:6.0,\nseg1.ts\n"),
        )
        .await;

        let prober = StreamProber::new(&ProbeConfig {
            follow_hls: false,
            ..config()
        });
        let result = prober.probe(&format!("{}/index.m3u8", server.uri())).await;
        assert!(result.alive, "{:?}", result.failure);
    }

    #[tokio::test]
    async fn test_http_error_and_html_are_dead() {
        let server = MockServer::start().await;
        mount(&server, "/gone", ResponseTemplate::new(404)).await;
        mount(
            &server,
            "/portal",
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string("<html>login</html>"),
        )
        .await;
        mount(
            &server,
            "/disguised",
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/octet-stream")
                .set_body_string("\n  <!DOCTYPE html><html></html>"),
        )
        .await;

        let prober = StreamProber::new(&config());
        let gone = prober.probe(&format!("{}/gone", server.uri())).await;
        assert_eq!(gone.failure, Some(ProbeFailure::HttpStatus { status: 404 }));

        let portal = prober.probe(&format!("{}/portal", server.uri())).await;
        assert_eq!(portal.failure, Some(ProbeFailure::HtmlContent));

        let disguised = prober.probe(&format!("{}/disguised", server.uri())).await;
        assert_eq!(disguised.failure, Some(ProbeFailure::HtmlContent));
    }

    #[tokio::test]
    async fn test_timeout_and_latency_ceiling() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/stalled",
            ResponseTemplate::new(200).set_delay(Duration::from_secs(5)),
        )
        .await;
        mount(
            &server,
            "/sluggish",
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0x47u8; 1316])
                .set_delay(Duration::from_millis(400)),
        )
        .await;

        let prober = StreamProber::new(&ProbeConfig {
            timeout_secs: 1.0,
            latency_ceiling_secs: 0.2,
            ..config()
        });

        let started = Instant::now();
        let stalled = prober.probe(&format!("{}/stalled", server.uri())).await;
        assert_eq!(stalled.failure, Some(ProbeFailure::Timeout));
        assert!(started.elapsed() < Duration::from_secs(3));

        let sluggish = prober.probe(&format!("{}/sluggish", server.uri())).await;
        assert!(matches!(sluggish.failure, Some(ProbeFailure::TooSlow { .. })));
    }

    #[tokio::test]
    async fn test_hls_master_follows_highest_bandwidth_variant() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/ch/master.m3u8",
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/vnd.apple.mpegurl")
                .set_body_string(
                    "#EXTM3U\n\
                     #EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360\n\
                     low/index.m3u8\n\
                     #EXT-X-STREAM-INF:BANDWIDTH=3000000,RESOLUTION=1920x1080\n\
                     high/index.m3u8\n",
                ),
        )
        .await;
        mount(
            &server,
            "/ch/high/index.m3u8",
            ResponseTemplate::new(200).set_body_string(
                "#EXTM3U\n\
                 #EXT-X-VERSION:3\n\
                 #EXT-X-TARGETDURATION:6\n\
                 #EXT-X-MEDIA-SEQUENCE:1\n\
                 #EXTINF:6.0,\n\
                 seg1.ts\n\
                 #EXTINF:6.0,\n\
                 seg2.ts\n",
            ),
        )
        .await;
        mount(
            &server,
            "/ch/high/seg1.ts",
            ResponseTemplate::new(200).set_body_bytes(vec![0x47u8; 8 * 1024]),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/ch/low/index.m3u8"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = StreamProber::new(&config())
            .probe(&format!("{}/ch/master.m3u8", server.uri()))
            .await;
        assert!(result.alive, "{:?}", result.failure);
        // segment was followed, so throughput is reported even for a short body
        assert!(result.throughput_kbps.is_some());
    }

    #[tokio::test]
    async fn test_hls_without_segments_is_invalid() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/empty.m3u8",
            ResponseTemplate::new(200).set_body_string(
                "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n#EXT-X-ENDLIST\n",
            ),
        )
        .await;

        let result = StreamProber::new(&config())
            .probe(&format!("{}/empty.m3u8", server.uri()))
            .await;
        assert!(matches!(result.failure, Some(ProbeFailure::InvalidPlaylist { .. })));
    }

    #[tokio::test]
    async fn test_unsupported_scheme_and_refused_connection() {
        let prober = StreamProber::new(&config());

        let rtmp = prober.probe("rtmp://example.com/live").await;
        assert_eq!(
            rtmp.failure,
            Some(ProbeFailure::UnsupportedScheme {
                scheme: "rtmp".to_string()
            })
        );

        let refused = prober.probe("http://127.0.0.1:1/live.ts").await;
        assert!(!refused.alive);
        assert!(refused.failure.unwrap().is_transient());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky.ts"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        mount(
            &server,
            "/flaky.ts",
            ResponseTemplate::new(200).set_body_bytes(vec![0x47u8; 1024]),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/missing.ts"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let prober = StreamProber::new(&ProbeConfig {
            max_attempts: 3,
            ..config()
        });

        let flaky = prober.probe_with_retry(&format!("{}/flaky.ts", server.uri())).await;
        assert!(flaky.alive, "{:?}", flaky.failure);

        let missing = prober.probe_with_retry(&format!("{}/missing.ts", server.uri())).await;
        assert_eq!(missing.failure, Some(ProbeFailure::HttpStatus { status: 404 }));
    }
}
