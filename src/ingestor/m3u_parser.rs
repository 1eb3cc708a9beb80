//! EXTINF/address playlist parser
//!
//! Turns loosely structured playlist text into [`RawChannelRecord`]s. The
//! parser is an iterator over the borrowed text, so it is lazy and parsing the
//! same text again always yields the same records.
//!
//! Rules:
//! - `#EXTINF` announces a channel; every address line that follows belongs to
//!   it until the next announcement, so one block may list fallback URLs.
//! - Other `#` lines, blank lines and lines that are not `scheme://...`
//!   addresses are noise: skipped without cancelling the announcement.
//! - An announcement that never receives an address is dropped, as is an
//!   address that appears before any announcement.
//! - Broken attribute quoting never aborts the parse; the affected attribute
//!   is treated as absent.

use std::collections::BTreeMap;
use std::str::Lines;

use serde::Serialize;
use tracing::debug;

use crate::models::RawChannelRecord;

const EXTINF_MARKER: &str = "#EXTINF";

/// Metadata parsed from one `#EXTINF` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtInf {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
}

/// Counters for anomalies seen while parsing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    pub records: usize,
    pub orphan_addresses: usize,
    pub unaddressed_entries: usize,
    pub noise_lines: usize,
}

impl ParseStats {
    pub fn anomalies(&self) -> usize {
        self.orphan_addresses + self.unaddressed_entries
    }

    pub fn merge(&mut self, other: &ParseStats) {
        self.records += other.records;
        self.orphan_addresses += other.orphan_addresses;
        self.unaddressed_entries += other.unaddressed_entries;
        self.noise_lines += other.noise_lines;
    }
}

#[derive(Debug)]
struct PendingEntry {
    extinf: ExtInf,
    line_num: usize,
    addresses: usize,
}

/// Lazy parser over playlist text
pub struct M3uParser<'a> {
    lines: Lines<'a>,
    source_id: &'a str,
    line_num: usize,
    pending: Option<PendingEntry>,
    stats: ParseStats,
}

/// Parse playlist text. Calling again on the same text restarts the sequence.
pub fn parse_playlist<'a>(content: &'a str, source_id: &'a str) -> M3uParser<'a> {
    M3uParser::new(content, source_id)
}

impl<'a> M3uParser<'a> {
    pub fn new(content: &'a str, source_id: &'a str) -> Self {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        Self {
            lines: content.lines(),
            source_id,
            line_num: 0,
            pending: None,
            stats: ParseStats::default(),
        }
    }

    /// Anomaly counters for the lines consumed so far
    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    fn close_pending(&mut self) {
        if let Some(entry) = self.pending.take() {
            if entry.addresses == 0 {
                debug!(
                    source = self.source_id,
                    line = entry.line_num,
                    name = %entry.extinf.name,
                    "Dropping EXTINF entry without an address"
                );
                self.stats.unaddressed_entries += 1;
            }
        }
    }
}

impl Iterator for M3uParser<'_> {
    type Item = RawChannelRecord;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(raw_line) = self.lines.next() {
            self.line_num += 1;
            let line = raw_line.trim();

            if line.is_empty() {
                continue;
            }

            if starts_with_ignore_case(line, EXTINF_MARKER) {
                self.close_pending();
                self.pending = Some(PendingEntry {
                    extinf: parse_extinf_line(line),
                    line_num: self.line_num,
                    addresses: 0,
                });
                continue;
            }

            if line.starts_with('#') || !is_address(line) {
                self.stats.noise_lines += 1;
                continue;
            }

            match self.pending.as_mut() {
                Some(entry) => {
                    entry.addresses += 1;
                    self.stats.records += 1;
                    return Some(RawChannelRecord {
                        declared_name: entry.extinf.name.clone(),
                        attributes: entry.extinf.attributes.clone(),
                        url: line.to_string(),
                        source_id: self.source_id.to_string(),
                    });
                }
                None => {
                    debug!(
                        source = self.source_id,
                        line = self.line_num,
                        "Skipping address without EXTINF metadata"
                    );
                    self.stats.orphan_addresses += 1;
                }
            }
        }

        self.close_pending();
        None
    }
}

fn starts_with_ignore_case(line: &str, prefix: &str) -> bool {
    line.get(..prefix.len())
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}

/// True for lines that begin with a URI scheme token followed by `://`
pub fn is_address(line: &str) -> bool {
    let Some(pos) = line.find("://") else {
        return false;
    };
    let scheme = &line[..pos];
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => chars
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')),
        _ => false,
    }
}

/// Parse `#EXTINF:<duration> key="value" ...,<display name>`
pub fn parse_extinf_line(line: &str) -> ExtInf {
    let body = line
        .get(EXTINF_MARKER.len()..)
        .unwrap_or("")
        .trim_start_matches(':');

    let (attrs_part, name) = match display_name_split(body) {
        Some(pos) => (&body[..pos], body[pos + 1..].trim()),
        None => (body, ""),
    };

    let attributes = parse_extinf_attributes(attrs_part);
    let name = if name.is_empty() {
        attributes
            .get("tvg-name")
            .map(|n| n.trim().to_string())
            .unwrap_or_default()
    } else {
        name.to_string()
    };

    ExtInf { name, attributes }
}

/// Position of the comma that starts the display name: the last comma outside
/// quotes, or simply the last comma when quoting is unbalanced.
fn display_name_split(body: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut last_unquoted = None;
    for (idx, ch) in body.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => last_unquoted = Some(idx),
            _ => {}
        }
    }
    if in_quotes {
        body.rfind(',')
    } else {
        last_unquoted
    }
}

/// Parse `key="value"` and `key=value` pairs. A value whose closing quote is
/// missing is discarded along with the rest of the line.
pub fn parse_extinf_attributes(attrs_part: &str) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    let mut chars = attrs_part.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| !c.is_whitespace() && *c != '=') {
            key.push(c);
        }
        if chars.peek().is_none() && key.is_empty() {
            break;
        }
        if chars.next_if_eq(&'=').is_none() {
            // bare token such as the duration
            if chars.peek().is_none() {
                break;
            }
            continue;
        }

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '"' {
                    closed = true;
                    break;
                }
                value.push(c);
            }
            if !closed {
                break;
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                value.push(c);
            }
        }

        if is_attribute_key(&key) {
            attributes.insert(key.to_ascii_lowercase(), value.trim().to_string());
        }
    }

    attributes
}

fn is_attribute_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Vec<RawChannelRecord> {
        parse_playlist(content, "test").collect()
    }

    #[test]
    fn test_parse_basic_pairs() {
        let content = "#EXTM3U\n\
            #EXTINF:-1 tvg-id=\"cctv1\" tvg-logo=\"http://logo/1.png\" group-title=\"央视\",CCTV-1 HD\n\
            http://a.example/cctv1.m3u8\n\
            #EXTINF:-1,TVB Jade\n\
            https://b.example/jade.m3u8\n";

        let records = parse(content);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].declared_name, "CCTV-1 HD");
        assert_eq!(records[0].attribute("tvg-id"), Some("cctv1"));
        assert_eq!(records[0].group_title(), Some("央视"));
        assert_eq!(records[0].url, "http://a.example/cctv1.m3u8");
        assert_eq!(records[0].source_id, "test");
        assert_eq!(records[1].declared_name, "TVB Jade");
        assert!(records[1].attributes.is_empty());
    }

    #[test]
    fn test_multiple_addresses_share_one_announcement() {
        let content = "#EXTINF:-1,Phoenix\n\
            http://a/1.m3u8\n\
            #EXTVLCOPT:http-user-agent=Mozilla\n\
            http://a/2.m3u8\n\
            rtmp://a/3\n";

        let records = parse(content);
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.declared_name == "Phoenix"));
        assert_eq!(records[2].url, "rtmp://a/3");
    }

    #[test]
    fn test_noise_does_not_cancel_pending_announcement() {
        let content = "#EXTINF:-1,Astro AOD\n\
            not an address\n\
            \n\
            # some comment\n\
            http://50.7.161.82:8278/streams/d/AstroAOD/playlist.m3u8\n";

        let mut parser = parse_playlist(content, "custom");
        let records: Vec<_> = parser.by_ref().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].declared_name, "Astro AOD");
        assert_eq!(parser.stats().noise_lines, 2);
        assert_eq!(parser.stats().anomalies(), 0);
    }

    #[test]
    fn test_unaddressed_and_orphan_entries_are_dropped() {
        let content = "http://orphan/stream\n\
            #EXTINF:-1,Lost Channel\n\
            #EXTINF:-1,Kept Channel\n\
            http://kept/stream\n\
            #EXTINF:-1,Trailing Channel\n";

        let mut parser = parse_playlist(content, "s");
        let records: Vec<_> = parser.by_ref().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].declared_name, "Kept Channel");

        let stats = parser.stats();
        assert_eq!(stats.orphan_addresses, 1);
        assert_eq!(stats.unaddressed_entries, 2);
        assert_eq!(stats.records, 1);
    }

    #[test]
    fn test_parse_is_restartable() {
        let content = "#EXTINF:-1,A\nhttp://a\n#EXTINF:-1,B\nhttp://b\n";
        assert_eq!(parse(content), parse(content));
    }

    #[test]
    fn test_unbalanced_quotes_fall_back_to_absent_attribute() {
        let extinf =
            parse_extinf_line("#EXTINF:-1 tvg-id=\"ok\" group-title=\"Broken,Movie Channel");
        assert_eq!(extinf.attributes.get("tvg-id").map(String::as_str), Some("ok"));
        assert!(!extinf.attributes.contains_key("group-title"));
        assert_eq!(extinf.name, "Movie Channel");
    }

    #[test]
    fn test_comma_inside_quoted_attribute() {
        let extinf = parse_extinf_line("#EXTINF:-1 group-title=\"News,Info\",BBC News");
        assert_eq!(extinf.name, "BBC News");
        assert_eq!(
            extinf.attributes.get("group-title").map(String::as_str),
            Some("News,Info")
        );
    }

    #[test]
    fn test_name_falls_back_to_tvg_name() {
        let extinf = parse_extinf_line("#EXTINF:-1 tvg-name=\"Astro 双星\" group-title=\"Astro\",");
        assert_eq!(extinf.name, "Astro 双星");
    }

    #[test]
    fn test_is_address() {
        assert!(is_address("http://a/b"));
        assert!(is_address("HTTPS://a/b"));
        assert!(is_address("rtsp://a"));
        assert!(is_address("udp+x://a"));
        assert!(!is_address("a/b"));
        assert!(!is_address("://nothing"));
        assert!(!is_address("1http://a"));
    }

    #[test]
    fn test_bom_and_crlf_are_tolerated() {
        let content = "\u{feff}#EXTM3U\r\n#EXTINF:-1,Alpha\r\nhttp://alpha/live\r\n";
        let records = parse(content);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "http://alpha/live");
    }
}
