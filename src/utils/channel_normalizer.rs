//! Channel name normalization
//!
//! Collapses naming variants of one channel ("CCTV-1 HD", "CCTV1高清",
//! "CCTV 1") into a single [`ChannelIdentity`]. Steps run in a fixed order:
//!
//! 1. fold full-width ASCII to half-width and upper-case everything
//! 2. strip resolution/quality tokens (Latin and CJK)
//! 3. strip bracketed and parenthesised annotations
//! 4. collapse separator runs to one space
//! 5. trim
//!
//! followed by joining brand-number pairs ("CCTV 1" -> "CCTV1") and dropping
//! spaces that touch CJK text ("CCTV1 综合" -> "CCTV1综合"), since CJK names
//! are written without word spacing. The whole pass repeats until the output
//! stops changing, which makes the function idempotent even when a removal
//! exposes a new token.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{ChannelIdentity, DeclaredQuality};

const MAX_PASSES: usize = 8;

const CJK_CLASS: &str = r"[\p{Han}\p{Hiragana}\p{Katakana}]";

/// Latin quality tokens that may touch digits ("CCTV1HD") but not letters
const LETTER_QUALITY_TOKENS: &[&str] = &["UHD", "FHD", "HD", "SD", "HEVC"];

/// Quality tokens that start with a digit and need a full alphanumeric boundary
const NUMERIC_QUALITY_TOKENS: &[&str] = &[
    "4K", "8K", "2160P", "1080P", "1080I", "720P", "576P", "576I", "480P", "H264", "H265",
];

/// CJK quality tokens, removed wherever they occur. Longest first.
const CJK_QUALITY_TOKENS: &[&str] = &[
    "4K超高清", "超高清", "高畫質", "高画质", "高清", "超清", "標清", "标清", "藍光", "蓝光",
];

/// Name normalizer with compiled patterns
pub struct NameNormalizer {
    letter_quality: Regex,
    numeric_quality: Regex,
    substring_tokens: Vec<String>,
    annotations: Regex,
    separators: Regex,
    brand_number: Regex,
    space_before_cjk: Regex,
    space_after_cjk: Regex,
}

impl NameNormalizer {
    /// Create a normalizer, extending the built-in quality tokens.
    ///
    /// ASCII extras are matched as whole tokens, anything else as substrings.
    pub fn new(extra_quality_tokens: &[String]) -> Result<Self, regex::Error> {
        let mut numeric: Vec<String> = NUMERIC_QUALITY_TOKENS.iter().map(|t| t.to_string()).collect();
        let mut substring_tokens: Vec<String> =
            CJK_QUALITY_TOKENS.iter().map(|t| t.to_string()).collect();

        for token in extra_quality_tokens {
            let token = fold_case(token.trim());
            if token.is_empty() {
                continue;
            }
            if token.is_ascii() {
                numeric.push(regex::escape(&token));
            } else {
                substring_tokens.push(token);
            }
        }
        substring_tokens.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
        substring_tokens.dedup();

        Ok(Self {
            letter_quality: Regex::new(&format!(
                r"(^|[^A-Z])({})($|[^A-Z])",
                LETTER_QUALITY_TOKENS.join("|")
            ))?,
            numeric_quality: Regex::new(&format!(
                r"(^|[^A-Z0-9])({})($|[^A-Z0-9])",
                numeric.join("|")
            ))?,
            substring_tokens,
            annotations: Regex::new(
                r"\([^()]*\)|\[[^\[\]]*\]|（[^（）]*）|【[^【】]*】|\{[^{}]*\}|「[^「」]*」|<[^<>]*>",
            )?,
            separators: Regex::new(r#"[\s\-_.|/\\·•:：,，、~'"()\[\]（）【】{}<>「」]+"#)?,
            brand_number: Regex::new(r"([A-Z]) ([0-9])")?,
            space_before_cjk: Regex::new(&format!(r"([A-Z0-9+]) ({CJK_CLASS})"))?,
            space_after_cjk: Regex::new(&format!(r"({CJK_CLASS}) ([A-Z0-9+]|{CJK_CLASS})"))?,
        })
    }

    /// Create with the built-in token lists only
    pub fn with_default_config() -> Result<Self, regex::Error> {
        Self::new(&[])
    }

    /// Canonicalize a raw display name. An empty identity means "unnamed".
    pub fn normalize(&self, raw: &str) -> ChannelIdentity {
        let mut current = raw.to_string();
        for _ in 0..MAX_PASSES {
            let next = self.normalize_pass(&current);
            if next == current {
                break;
            }
            current = next;
        }
        ChannelIdentity::new(current)
    }

    /// Highest resolution tier named by a quality token in `raw`.
    ///
    /// Uses the same token boundaries as [`normalize`](Self::normalize), so a
    /// fragment it keeps in the identity ("HDTV") never declares a tier.
    pub fn declared_quality(&self, raw: &str) -> DeclaredQuality {
        let name = fold_case(raw);
        let mut tokens = Vec::new();
        collect_tokens(&self.letter_quality, &name, &mut tokens);
        collect_tokens(&self.numeric_quality, &name, &mut tokens);
        for token in &self.substring_tokens {
            if name.contains(token.as_str()) {
                tokens.push(token.as_str());
            }
        }

        tokens
            .into_iter()
            .filter_map(DeclaredQuality::from_token)
            .max()
            .unwrap_or(DeclaredQuality::Unknown)
    }

    fn normalize_pass(&self, input: &str) -> String {
        // 1. case fold
        let mut name = fold_case(input);

        // 2. quality tokens
        name = replace_until_stable(&self.letter_quality, &name, "${1} ${3}");
        name = replace_until_stable(&self.numeric_quality, &name, "${1} ${3}");
        for token in &self.substring_tokens {
            if name.contains(token.as_str()) {
                name = name.replace(token.as_str(), " ");
            }
        }

        // 3. annotations
        name = replace_until_stable(&self.annotations, &name, " ");

        // 4. separators, 5. trim
        name = self.separators.replace_all(&name, " ").trim().to_string();

        // brand-number families
        name = self.brand_number.replace_all(&name, "${1}${2}").into_owned();

        // CJK word boundaries
        name = replace_until_stable(&self.space_before_cjk, &name, "${1}${2}");
        replace_until_stable(&self.space_after_cjk, &name, "${1}${2}")
    }
}

/// Every token matched by a boundary pattern, including adjacent ones
fn collect_tokens<'a>(regex: &Regex, text: &'a str, tokens: &mut Vec<&'a str>) {
    let mut start = 0;
    while let Some(token) = regex.captures_at(text, start).and_then(|caps| caps.get(2)) {
        tokens.push(token.as_str());
        start = token.end();
    }
}

fn replace_until_stable(regex: &Regex, input: &str, replacement: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = regex.replace_all(&current, replacement).into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Full-width ASCII to half-width, ideographic space to space, upper case
fn fold_case(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\u{3000}' => ' ',
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            _ => c,
        })
        .collect::<String>()
        .to_uppercase()
}

fn default_normalizer() -> &'static NameNormalizer {
    static NORMALIZER: OnceLock<NameNormalizer> = OnceLock::new();
    NORMALIZER.get_or_init(|| {
        NameNormalizer::with_default_config().expect("built-in normalizer patterns are valid")
    })
}

/// Normalize with the built-in token lists
pub fn normalize(raw: &str) -> ChannelIdentity {
    default_normalizer().normalize(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cctv_variants_collapse() {
        let expected = normalize("CCTV-1");
        assert_eq!(expected.as_str(), "CCTV1");
        assert_eq!(normalize("CCTV1 HD"), expected);
        assert_eq!(normalize("CCTV 1 高清"), expected);
        assert_eq!(normalize("CCTV1高清"), expected);
        assert_eq!(normalize("cctv-1 [1080p]"), expected);
        assert_eq!(normalize("CCTV-1 (备用线路)"), expected);
        assert_eq!(normalize("ＣＣＴＶ－１"), expected);

        let general = normalize("CCTV-1 综合");
        assert_eq!(general.as_str(), "CCTV1综合");
        assert_eq!(normalize("CCTV1综合"), general);
        assert_eq!(normalize("CCTV-1综合 HD"), general);
        assert_eq!(normalize("CCTV 1 综合 高清"), general);
    }

    #[test]
    fn test_cjk_spacing_is_not_significant() {
        let phoenix = normalize("凤凰卫视 中文台");
        assert_eq!(phoenix.as_str(), "凤凰卫视中文台");
        assert_eq!(normalize("凤凰 卫视中文台"), phoenix);

        let hunan = normalize("湖南卫视 1");
        assert_eq!(normalize("湖南卫视1"), hunan);
        assert_eq!(normalize("湖南卫视-1"), hunan);

        assert_eq!(normalize("CCTV-5+ 体育赛事"), normalize("CCTV5+体育赛事"));
        // Latin words keep their spacing
        assert_eq!(normalize("Discovery Science").as_str(), "DISCOVERY SCIENCE");
    }

    #[test]
    fn test_brand_number_separator_styles() {
        let a = normalize("BRAND 1");
        assert_eq!(normalize("BRAND-1"), a);
        assert_eq!(normalize("BRAND1"), a);
        assert_eq!(normalize("brand_1"), a);
        assert_eq!(a.as_str(), "BRAND1");
    }

    #[test]
    fn test_idempotence() {
        let samples = [
            "CCTV-1 HD",
            "CCTV-5+ 体育赛事 [4K]",
            "H(x)D Channel",
            "Astro AOD 311",
            "翡翠台 (TVB) 高清",
            "  RU: TLC   HD  ",
            "【港澳】凤凰卫视中文台",
            "HBO Hits 1080p HEVC",
            "Channel 5 +1",
            "",
            "HD",
        ];
        for raw in samples {
            let once = normalize(raw);
            let twice = normalize(once.as_str());
            assert_eq!(once, twice, "normalize not idempotent for {raw:?}");
        }
    }

    #[test]
    fn test_quality_tokens_inside_words_survive() {
        assert_eq!(normalize("HDTV Sports").as_str(), "HDTV SPORTS");
        assert_eq!(normalize("Discovery Science").as_str(), "DISCOVERY SCIENCE");
    }

    #[test]
    fn test_declared_quality_uses_token_boundaries() {
        let n = NameNormalizer::with_default_config().unwrap();
        assert_eq!(n.declared_quality("CCTV-4K 超高清"), DeclaredQuality::Uhd4k);
        assert_eq!(n.declared_quality("HBO 1080p HEVC"), DeclaredQuality::Fhd1080);
        assert_eq!(n.declared_quality("CCTV-1 HD"), DeclaredQuality::Hd720);
        assert_eq!(n.declared_quality("CCTV1HD"), DeclaredQuality::Hd720);
        assert_eq!(n.declared_quality("CCTV1高清"), DeclaredQuality::Hd720);
        assert_eq!(n.declared_quality("TVB 标清"), DeclaredQuality::Sd);
        // adjacent tokens are all seen
        assert_eq!(n.declared_quality("Movie SD HD"), DeclaredQuality::Hd720);
        assert_eq!(n.declared_quality("CCTV1"), DeclaredQuality::Unknown);
        assert_eq!(n.declared_quality("HDTV Sports"), DeclaredQuality::Unknown);
        assert_eq!(n.declared_quality("Discovery Science"), DeclaredQuality::Unknown);
        assert_eq!(n.declared_quality("Channel 720"), DeclaredQuality::Unknown);
    }

    #[test]
    fn test_unnamed_channels_normalize_to_empty() {
        assert!(normalize("").is_empty());
        assert!(normalize("  HD  ").is_empty());
        assert!(normalize("(backup) [4K]").is_empty());
    }

    #[test]
    fn test_extra_quality_tokens() {
        let normalizer = NameNormalizer::new(&["50FPS".to_string(), "高码率".to_string()]).unwrap();
        assert_eq!(normalizer.normalize("CCTV-5 50fps").as_str(), "CCTV5");
        assert_eq!(normalizer.normalize("CCTV5高码率").as_str(), "CCTV5");
    }

    #[test]
    fn test_deterministic_across_instances() {
        let a = NameNormalizer::with_default_config().unwrap();
        let b = NameNormalizer::with_default_config().unwrap();
        assert_eq!(a.normalize("Phoenix (HK) HD"), b.normalize("Phoenix (HK) HD"));
    }
}
