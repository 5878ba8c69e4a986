//! Data-driven spam and geo rules. Adding a rule means adding a table
//! entry or a config value, never a new branch in the classifier.

use monitor_core::{ConfigError, Post, RuleSettings};
use regex::{Regex, RegexSet};
use std::collections::HashSet;

/// Promotional and referral phrases. All case-insensitive.
pub const DEFAULT_SPAM_PATTERNS: &[&str] = &[
    r"(?i)\breferral\s+(link|code)s?\b",
    r"(?i)\buse\s+my\s+(referral\s+|promo\s+|invite\s+)?(code|link)\b",
    r"(?i)\bpromo\s*codes?\b",
    r"(?i)\bsign[\s-]?up\s+bonus\b",
    r"(?i)\baffiliate\b",
    r"(?i)\bclick\s+here\b",
    r"(?i)\blimited(-time|\s+time)?\s+offer\b",
    r"(?i)\bget\s+paid\b",
    r"(?i)\bearn\s+money\s+fast\b",
    r"(?i)\bmake\s+money\b",
    r"(?i)\bguaranteed\s+(profits?|returns?)\b",
    r"(?i)\btrading\s+signals?\b",
    r"(?i)\bpump\s+(and|&|n)\s+dump\b",
    r"(?i)\bmoonshot\b",
    r"(?i)\blambo\b",
    r"(?i)\[(store|selling|ad)\]",
    r"(?i)\bdm\s+me\b",
    r"(?i)\btelegram\s+group\b",
    r"(?i)\bbuy\s+(now|cheap)\b",
    r"(?i)\bcoupons?\b",
    r"(?i)\bdiscount\s+codes?\b",
    r"(?i)\b\d{1,2}\s?%\s+off\b",
    r"(?i)[?&](ref|referral|invite)(_?code)?=",
    r"(?i)/(ref|invite|referral)/[a-z0-9_-]+",
];

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn is_emoji(c: char) -> bool {
    matches!(c as u32,
        0x1F300..=0x1FAFF | 0x2600..=0x27BF | 0x1F000..=0x1F2FF | 0x2B50 | 0x2B55)
}

#[derive(Debug, Clone)]
pub struct SpamRules {
    patterns: RegexSet,
    /// Emoji count at or above which a post is spam
    max_emoji: usize,
    /// Share of upper-case letters at or above which a post is spam
    caps_ratio: f64,
    /// The caps rule ignores texts with fewer letters than this
    caps_min_letters: usize,
}

impl SpamRules {
    pub fn new(extra_patterns: &[String]) -> Result<Self, ConfigError> {
        let patterns: Vec<&str> = DEFAULT_SPAM_PATTERNS
            .iter()
            .copied()
            .chain(extra_patterns.iter().map(String::as_str))
            .collect();

        // Compile one by one first so a bad extra pattern is named in the error
        for pattern in &patterns {
            compile(pattern)?;
        }
        let patterns = RegexSet::new(&patterns).map_err(|e| ConfigError::InvalidPattern {
            pattern: "spam rule set".to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            patterns,
            max_emoji: 8,
            caps_ratio: 0.7,
            caps_min_letters: 20,
        })
    }

    #[cfg(test)]
    pub(crate) fn rule_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_spam(&self, text: &str) -> bool {
        self.patterns.is_match(text) || self.too_many_emoji(text) || self.shouting(text)
    }

    fn too_many_emoji(&self, text: &str) -> bool {
        text.chars().filter(|c| is_emoji(*c)).count() >= self.max_emoji
    }

    fn shouting(&self, text: &str) -> bool {
        let (letters, upper) = text
            .chars()
            .filter(|c| c.is_alphabetic())
            .fold((0usize, 0usize), |(l, u), c| (l + 1, u + c.is_uppercase() as usize));
        letters >= self.caps_min_letters && upper as f64 / letters as f64 >= self.caps_ratio
    }
}

/// India relevance: a known subreddit, a word-boundary term in the text, or
/// a naming pattern on the subreddit or author.
#[derive(Debug, Clone)]
pub struct GeoRules {
    subreddits: HashSet<String>,
    terms: Option<Regex>,
    name_patterns: Vec<Regex>,
}

impl GeoRules {
    pub fn new(rules: &RuleSettings) -> Result<Self, ConfigError> {
        let subreddits = rules
            .india_subreddits
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        let escaped: Vec<String> = rules
            .india_keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();
        let terms = if escaped.is_empty() {
            None
        } else {
            Some(compile(&format!(r"(?i)\b({})\b", escaped.join("|")))?)
        };

        let name_patterns = rules
            .india_name_patterns
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            subreddits,
            terms,
            name_patterns,
        })
    }

    pub fn is_relevant(&self, post: &Post, text: &str) -> bool {
        self.subreddits.contains(&post.subreddit.to_lowercase())
            || self.terms.as_ref().is_some_and(|re| re.is_match(text))
            || self
                .name_patterns
                .iter()
                .any(|re| re.is_match(&post.subreddit) || re.is_match(&post.author))
    }
}
