//! Merged playlist emission
//!
//! Renders ranked channels as an extended M3U document and writes it
//! atomically: the full document goes to a sibling temp file which is then
//! renamed over the destination, so readers see either the old playlist or
//! the new one.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::{AppError, AppResult};
use crate::models::RankedChannel;

/// Attributes carried through to the output, in emission order
const CARRIED_ATTRIBUTES: &[&str] = &["tvg-id", "tvg-logo", "tvg-chno", "tvg-country", "tvg-language"];

pub struct M3uGenerator {
    min_channels: usize,
}

impl M3uGenerator {
    pub fn new(min_channels: usize) -> Self {
        Self { min_channels }
    }

    /// Render channels in identity order
    pub fn render(&self, channels: &[RankedChannel]) -> String {
        let mut sorted: Vec<&RankedChannel> = channels.iter().collect();
        sorted.sort_by(|a, b| a.identity.cmp(&b.identity));

        let mut m3u = String::from("#EXTM3U\n");

        for channel in sorted {
            let mut extinf = String::from("#EXTINF:-1");

            for key in CARRIED_ATTRIBUTES {
                if let Some(value) = channel.attributes.get(*key).filter(|v| !v.trim().is_empty()) {
                    extinf.push_str(&format!(" {}=\"{}\"", key, sanitize_attribute(value)));
                }
            }

            let tvg_name = channel
                .attributes
                .get("tvg-name")
                .filter(|v| !v.trim().is_empty())
                .map(String::as_str)
                .unwrap_or(channel.declared_name.as_str());
            extinf.push_str(&format!(" tvg-name=\"{}\"", sanitize_attribute(tvg_name)));

            if !channel.group_title.is_empty() {
                extinf.push_str(&format!(
                    " group-title=\"{}\"",
                    sanitize_attribute(&channel.group_title)
                ));
            }

            extinf.push_str(&format!(",{}\n", display_name(channel)));
            m3u.push_str(&extinf);

            for ranked in &channel.ordered_urls {
                m3u.push_str(&ranked.url);
                m3u.push('\n');
            }
        }

        m3u
    }

    /// Refuse to emit a playlist with too few channels
    pub fn check_minimum(&self, channels: &[RankedChannel]) -> AppResult<()> {
        if channels.len() < self.min_channels {
            return Err(AppError::InsufficientChannels {
                channels: channels.len(),
                minimum: self.min_channels,
            });
        }
        Ok(())
    }

    /// Guard, render and write to the primary path and every mirror
    pub async fn write(
        &self,
        channels: &[RankedChannel],
        path: &Path,
        mirrors: &[PathBuf],
    ) -> AppResult<String> {
        self.check_minimum(channels)?;
        let content = self.render(channels);

        write_atomic(path, &content).await?;
        for mirror in mirrors {
            write_atomic(mirror, &content).await?;
        }

        info!(
            channels = channels.len(),
            mirrors = mirrors.len(),
            "Wrote merged playlist to {}",
            path.display()
        );
        Ok(content)
    }
}

fn display_name(channel: &RankedChannel) -> String {
    let name = channel.declared_name.replace(['\r', '\n'], " ");
    let name = name.trim();
    if name.is_empty() {
        channel.identity.to_string()
    } else {
        name.to_string()
    }
}

fn sanitize_attribute(value: &str) -> String {
    value.replace(['\r', '\n'], " ").replace('"', "'")
}

/// Write `content` to a sibling temp file, then rename it over `path`
pub async fn write_atomic(path: &Path, content: &str) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| AppError::configuration(format!("{} is not a file path", path.display())))?
        .to_string_lossy();
    let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

    tokio::fs::write(&tmp_path, content.as_bytes()).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }

    debug!("Atomically replaced {}", path.display());
    Ok(())
}
