//! Channel pool: identity -> candidate URLs
//!
//! Built once from every parsed record before probing starts and handed
//! read-only to the probe and ranking stages. Entries are only created
//! together with their first candidate, so no identity is ever empty.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::debug;

use crate::models::{CandidateUrl, ChannelIdentity, DeclaredQuality, RawChannelRecord};
use crate::proxy::filter_engine::{CategoryClassifier, Classification};
use crate::utils::NameNormalizer;

/// Everything known about one logical channel
#[derive(Debug, Clone, PartialEq)]
pub struct PoolEntry {
    pub identity: ChannelIdentity,
    /// First-seen declared name
    pub display_name: String,
    /// First non-empty group title
    pub group_title: String,
    /// First-seen value per attribute key
    pub attributes: BTreeMap<String, String>,
    /// Unique by exact URL, in first-seen order
    pub candidates: Vec<CandidateUrl>,
}

impl PoolEntry {
    fn new(identity: ChannelIdentity, record: &RawChannelRecord) -> Self {
        Self {
            identity,
            display_name: record.declared_name.trim().to_string(),
            group_title: String::new(),
            attributes: BTreeMap::new(),
            candidates: Vec::new(),
        }
    }

    fn absorb_metadata(&mut self, record: &RawChannelRecord) {
        if self.group_title.is_empty() {
            if let Some(group) = record.group_title() {
                self.group_title = group.trim().to_string();
            }
        }
        for (key, value) in &record.attributes {
            if !value.trim().is_empty() {
                self.attributes
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }
    }
}

/// What happened to one record offered to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Added,
    /// Normalized to an empty identity
    Unnamed,
    Blocked,
    /// URL already listed under the same identity
    DuplicateUrl,
    /// URL already claimed by a different identity
    ClaimedElsewhere,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub records: usize,
    pub admitted: usize,
    pub unnamed: usize,
    pub blocked: usize,
    pub duplicate_urls: usize,
    pub claimed_elsewhere: usize,
}

#[derive(Debug, Default)]
pub struct ChannelPool {
    entries: BTreeMap<ChannelIdentity, PoolEntry>,
    url_owner: HashMap<String, ChannelIdentity>,
    stats: PoolStats,
}

impl ChannelPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize, classify and fold one record into the pool
    pub fn offer(
        &mut self,
        record: &RawChannelRecord,
        normalizer: &NameNormalizer,
        classifier: &CategoryClassifier,
    ) -> Admission {
        self.stats.records += 1;

        let identity = normalizer.normalize(&record.declared_name);
        if identity.is_empty() {
            self.stats.unnamed += 1;
            debug!(source = %record.source_id, name = %record.declared_name, "Dropping unnamed channel");
            return Admission::Unnamed;
        }

        if classifier.classify(&identity, &record.declared_name) == Classification::Blocked {
            self.stats.blocked += 1;
            debug!(
                identity = %identity,
                term = classifier.blocking_term(&identity, &record.declared_name).unwrap_or(""),
                "Blocked channel"
            );
            return Admission::Blocked;
        }

        let quality = normalizer.declared_quality(&record.declared_name);
        self.insert(identity, quality, record)
    }

    fn insert(
        &mut self,
        identity: ChannelIdentity,
        declared_quality: DeclaredQuality,
        record: &RawChannelRecord,
    ) -> Admission {
        if let Some(owner) = self.url_owner.get(&record.url) {
            if *owner == identity {
                self.stats.duplicate_urls += 1;
                if let Some(entry) = self.entries.get_mut(&identity) {
                    entry.absorb_metadata(record);
                }
                return Admission::DuplicateUrl;
            }
            self.stats.claimed_elsewhere += 1;
            debug!(
                url = %record.url,
                owner = %owner,
                identity = %identity,
                "URL already belongs to another channel"
            );
            return Admission::ClaimedElsewhere;
        }

        let candidate = CandidateUrl {
            url: record.url.clone(),
            identity: identity.clone(),
            declared_quality,
            attributes: record.attributes.clone(),
        };

        let entry = self
            .entries
            .entry(identity.clone())
            .or_insert_with(|| PoolEntry::new(identity.clone(), record));
        entry.absorb_metadata(record);
        entry.candidates.push(candidate);

        self.url_owner.insert(record.url.clone(), identity);
        self.stats.admitted += 1;
        Admission::Added
    }

    /// Entries in identity order
    pub fn entries(&self) -> impl Iterator<Item = &PoolEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn candidate_count(&self) -> usize {
        self.url_owner.len()
    }

    /// Every candidate URL, each once, in identity then first-seen order
    pub fn urls(&self) -> Vec<String> {
        self.entries
            .values()
            .flat_map(|e| e.candidates.iter().map(|c| c.url.clone()))
            .collect()
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }
}
