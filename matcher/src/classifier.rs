use crate::competitors::CompetitorCatalogue;
use crate::keywords::MatchTargets;
use crate::rules::{GeoRules, SpamRules};
use monitor_core::{ClassificationResult, ConfigError, Post, RuleSettings};
use tracing::debug;

/// Stateless post classifier. Same post and targets always give the same result.
#[derive(Debug, Clone)]
pub struct Classifier {
    spam: SpamRules,
    geo: GeoRules,
}

impl Classifier {
    pub fn new(spam: SpamRules, geo: GeoRules) -> Self {
        Self { spam, geo }
    }

    pub fn from_rules(rules: &RuleSettings) -> Result<Self, ConfigError> {
        Ok(Self::new(
            SpamRules::new(&rules.extra_spam_patterns)?,
            GeoRules::new(rules)?,
        ))
    }

    pub fn classify(
        &self,
        post: &Post,
        targets: &MatchTargets,
        competitors: &CompetitorCatalogue,
    ) -> ClassificationResult {
        let text = post.text();
        let lowered = text.to_lowercase();

        let contains = |keyword: &&String| lowered.contains(keyword.to_lowercase().as_str());

        let matched_primary = targets
            .primary
            .iter()
            .filter(contains)
            .cloned()
            .collect::<std::collections::BTreeSet<_>>();
        let matched_secondary = targets
            .secondary
            .iter()
            .filter(contains)
            .filter(|k| !matched_primary.contains(*k))
            .cloned()
            .collect();

        let result = ClassificationResult {
            matched_primary,
            matched_secondary,
            matched_competitors: competitors.mentioned_in(&lowered),
            is_spam: self.spam.is_spam(&text),
            is_india_relevant: self.geo.is_relevant(post, &text),
            competitor_community: competitors
                .community_owner(&post.subreddit)
                .map(str::to_string),
        };

        debug!(
            post_id = %post.id,
            primary = result.matched_primary.len(),
            secondary = result.matched_secondary.len(),
            competitors = result.matched_competitors.len(),
            spam = result.is_spam,
            india = result.is_india_relevant,
            "Classified post"
        );

        result
    }
}
