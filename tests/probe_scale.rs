use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use m3u_merge::config::{Config, SourceConfig};
use m3u_merge::database::MemoryLedgerStore;
use m3u_merge::Aggregator;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHANNELS: usize = 50;
const URLS_PER_CHANNEL: usize = 10;
const WORKERS: usize = 20;
const RESPONSE_DELAY: Duration = Duration::from_millis(200);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn probes_are_bounded_by_worker_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/ch\d+/\d+\.ts$"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "video/mp2t")
                .set_body_bytes(vec![0x47u8; 1316])
                .set_delay(RESPONSE_DELAY),
        )
        .mount(&server)
        .await;

    let uri = server.uri();
    let mut content = String::from("#EXTM3U\n");
    for channel in 0..CHANNELS {
        writeln!(content, "#EXTINF:-1 group-title=\"News\",News {channel}").unwrap();
        for n in 0..URLS_PER_CHANNEL {
            writeln!(content, "{uri}/ch{channel}/{n}.ts").unwrap();
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let mut config = Config {
        sources: vec![SourceConfig::Inline {
            name: "bulk".to_string(),
            content,
        }],
        ..Config::default()
    };
    config.output.path = dir.path().join("live.m3u");
    config.probe.workers = WORKERS;
    config.probe.timeout_secs = 5.0;
    config.probe.max_attempts = 1;
    config.probe.throughput_floor_kbps = 0.0;

    let started = Instant::now();
    let report = Aggregator::new(config, Arc::new(MemoryLedgerStore::new()))
        .run()
        .await
        .unwrap();
    let elapsed = started.elapsed();

    let total = CHANNELS * URLS_PER_CHANNEL;
    assert_eq!(report.candidates, total);
    assert_eq!(report.probes.scheduled, total);
    assert_eq!(report.probes.alive, total);
    assert_eq!(report.channels_ranked, CHANNELS);
    assert_eq!(report.ledger_records, total);

    // 25 waves of 20 probes at 200ms each; serial probing would take 100s
    let waves = (total / WORKERS) as u32;
    assert!(elapsed >= RESPONSE_DELAY * waves * 9 / 10, "took {elapsed:?}");
    assert!(elapsed < Duration::from_secs(30), "took {elapsed:?}");

    let playlist = std::fs::read_to_string(dir.path().join("live.m3u")).unwrap();
    let url_lines = playlist.lines().filter(|l| !l.starts_with('#')).count();
    assert_eq!(url_lines, CHANNELS * 3);
}
