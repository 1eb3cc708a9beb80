//! Category classification
//!
//! Decides whether a channel is admitted or blocked using keyword lists with
//! a fixed precedence: the protected whitelist is consulted first and a hit
//! there always admits, the blocklist is consulted only when no whitelist
//! term matched, and no hit on either list admits.
//!
//! Matching is case-insensitive substring matching over both the declared
//! name and the normalized identity.

use serde::Serialize;

use crate::config::{PolicyConfig, PolicyProfile};
use crate::models::ChannelIdentity;

/// Premium movie brands, regional broadcasters and drama/series terms
const PROTECTED_TERMS: &[&str] = &[
    "CATCHPLAY", "HBO", "CINEMAX", "CINEMA", "MOVIE", "FILM", "电影", "電影", "影院", "影视",
    "影視", "TVB", "翡翠", "明珠", "ASTRO", "凤凰", "鳳凰", "星空", "DRAMA", "SERIES", "剧场",
    "劇場", "剧集", "劇集", "电视剧", "電視劇", "戏剧", "戲劇",
];

/// Shopping network brand names
const SHOPPING_BRANDS: &[&str] = &[
    "QVC", "HSN", "MOMO", "东森购物", "東森購物", "好易购", "快乐购", "快樂購", "优购物",
    "優購物", "聚鲨", "家有购物", "央广购物", "央廣購物", "风尚购物", "環球購物", "环球购物",
    "TELESHOPPING", "JEWELRY TV", "SHOPHQ", "TVSN",
];

/// Generic shopping terms across locales
const SHOPPING_TERMS: &[&str] = &["购物", "購物", "SHOP", "MALL", "家购", "导购", "導購", "特卖", "特賣"];

/// Advertising and promotion terms, blocked by the strict profile only
const PROMOTION_TERMS: &[&str] = &["广告", "廣告", "推广", "推廣", "PROMO", "ADVERT", "INFOMERCIAL"];

/// Admission verdict for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Admitted,
    Blocked,
}

/// Keyword classifier for one policy profile
#[derive(Debug, Clone)]
pub struct CategoryClassifier {
    whitelist: Vec<String>,
    blocklist: Vec<String>,
}

impl CategoryClassifier {
    pub fn new(policy: &PolicyConfig) -> Self {
        let mut blocklist: Vec<&str> = SHOPPING_BRANDS.to_vec();
        match policy.profile {
            PolicyProfile::Permissive => {}
            PolicyProfile::Standard => blocklist.extend_from_slice(SHOPPING_TERMS),
            PolicyProfile::Strict => {
                blocklist.extend_from_slice(SHOPPING_TERMS);
                blocklist.extend_from_slice(PROMOTION_TERMS);
            }
        }

        Self {
            whitelist: build_terms(PROTECTED_TERMS.iter().copied(), &policy.extra_whitelist),
            blocklist: build_terms(blocklist.into_iter(), &policy.extra_blocklist),
        }
    }

    /// Whitelist first, then blocklist, otherwise admitted.
    pub fn classify(&self, identity: &ChannelIdentity, raw_name: &str) -> Classification {
        let raw_upper = raw_name.to_uppercase();
        let haystacks = [raw_upper.as_str(), identity.as_str()];

        if matches_any(&self.whitelist, &haystacks) {
            return Classification::Admitted;
        }
        if matches_any(&self.blocklist, &haystacks) {
            return Classification::Blocked;
        }
        Classification::Admitted
    }

    /// The first blocklist term that matches, for logging
    pub fn blocking_term(&self, identity: &ChannelIdentity, raw_name: &str) -> Option<&str> {
        let raw_upper = raw_name.to_uppercase();
        self.blocklist
            .iter()
            .find(|term| raw_upper.contains(term.as_str()) || identity.as_str().contains(term.as_str()))
            .map(String::as_str)
    }
}

impl Default for CategoryClassifier {
    fn default() -> Self {
        Self::new(&PolicyConfig::default())
    }
}

fn build_terms<'a>(builtin: impl Iterator<Item = &'a str>, extra: &[String]) -> Vec<String> {
    let mut terms: Vec<String> = builtin
        .map(str::to_string)
        .chain(extra.iter().map(|t| t.trim().to_uppercase()))
        .filter(|t| !t.is_empty())
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

fn matches_any(terms: &[String], haystacks: &[&str]) -> bool {
    terms
        .iter()
        .any(|term| haystacks.iter().any(|h| h.contains(term.as_str())))
}
