//! Playlist source fetching
//!
//! Every configured source is turned into raw playlist text. Failures are
//! reported per source so the caller can skip them and keep going.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::{FetchConfig, SourceConfig};
use crate::errors::{SourceError, SourceResult};

/// Raw text of one source, ready for parsing
#[derive(Debug, Clone)]
pub struct FetchedPlaylist {
    pub source_id: String,
    pub content: String,
}

/// Outcome of fetching every configured source
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub playlists: Vec<FetchedPlaylist>,
    pub failed: Vec<(String, SourceError)>,
}

#[derive(Clone)]
pub struct SourceFetcher {
    client: Client,
    concurrency: usize,
}

impl SourceFetcher {
    pub fn new(config: &FetchConfig, user_agent: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(user_agent)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            concurrency: config.concurrency.max(1),
        }
    }

    /// Fetch all sources concurrently. Results keep configuration order so
    /// first-seen display names are stable between runs.
    pub async fn fetch_all(&self, sources: &[SourceConfig]) -> FetchOutcome {
        let fetcher = self.clone();
        let results: Vec<(usize, String, SourceResult<Vec<FetchedPlaylist>>)> =
            stream::iter(sources.to_vec().into_iter().enumerate())
                .map(move |(index, source)| {
                    let fetcher = fetcher.clone();
                    async move {
                        let result = fetcher.fetch(&source).await;
                        (index, source.name().to_string(), result)
                    }
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        let mut results = results;
        results.sort_by_key(|(index, _, _)| *index);

        let mut outcome = FetchOutcome::default();
        for (_, name, result) in results {
            match result {
                Ok(mut playlists) => outcome.playlists.append(&mut playlists),
                Err(e) => {
                    warn!(source = %name, error = %e, "Skipping playlist source");
                    outcome.failed.push((name, e));
                }
            }
        }

        info!(
            "Fetched {} playlists ({} sources failed)",
            outcome.playlists.len(),
            outcome.failed.len()
        );
        outcome
    }

    /// Fetch one source. A directory source may yield several playlists.
    pub async fn fetch(&self, source: &SourceConfig) -> SourceResult<Vec<FetchedPlaylist>> {
        let playlists = match source {
            SourceConfig::Http { name, url } => {
                vec![self.fetch_http(name, url).await?]
            }
            SourceConfig::File { name, path } => vec![read_file(name, path).await?],
            SourceConfig::Directory { name, path } => read_directory(name, path).await?,
            SourceConfig::Inline { name, content } => vec![FetchedPlaylist {
                source_id: name.clone(),
                content: content.clone(),
            }],
        };

        let playlists: Vec<FetchedPlaylist> = playlists
            .into_iter()
            .filter(|p| !p.content.trim().is_empty())
            .collect();

        if playlists.is_empty() {
            return Err(SourceError::Empty {
                name: source.name().to_string(),
            });
        }
        Ok(playlists)
    }

    async fn fetch_http(&self, name: &str, url: &str) -> SourceResult<FetchedPlaylist> {
        debug!(source = name, %url, "Fetching playlist");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceError::from_reqwest(url, e))?;

        debug!(source = name, bytes = bytes.len(), "Fetched playlist");
        Ok(FetchedPlaylist {
            source_id: name.to_string(),
            content: decode_text(&bytes),
        })
    }
}

async fn read_file(name: &str, path: &Path) -> SourceResult<FetchedPlaylist> {
    let bytes = tokio::fs::read(path).await.map_err(|e| SourceError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(FetchedPlaylist {
        source_id: name.to_string(),
        content: decode_text(&bytes),
    })
}

async fn read_directory(name: &str, dir: &Path) -> SourceResult<Vec<FetchedPlaylist>> {
    let io_err = |e| SourceError::Io {
        path: dir.display().to_string(),
        source: e,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut paths: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        if is_playlist_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut playlists = Vec::with_capacity(paths.len());
    for path in paths {
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        match read_file(&format!("{name}/{file_name}"), &path).await {
            Ok(playlist) => playlists.push(playlist),
            Err(e) => warn!(source = name, error = %e, "Skipping unreadable playlist file"),
        }
    }
    Ok(playlists)
}

fn is_playlist_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("m3u") || e.eq_ignore_ascii_case("m3u8"))
            .unwrap_or(false)
}

/// Lossy UTF-8 decode with any leading byte order mark removed
pub fn decode_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_prefix('\u{feff}').unwrap_or(&text).to_string()
}
