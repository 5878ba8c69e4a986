use monitor_core::{CompetitorRegion, CompetitorSpec};
use std::collections::BTreeSet;

/// Lower-case alphanumerics only, so `r/Crypto_Com` and "Crypto.com" compare equal.
pub fn normalize_community(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone)]
struct Competitor {
    name: String,
    #[cfg_attr(not(test), allow(dead_code))]
    region: CompetitorRegion,
    needle: String,
    communities: BTreeSet<String>,
}

/// Named rivals: mentions are tracked, their own communities are never opportunities.
#[derive(Debug, Clone, Default)]
pub struct CompetitorCatalogue {
    competitors: Vec<Competitor>,
}

impl CompetitorCatalogue {
    pub fn from_specs(specs: &[CompetitorSpec]) -> Self {
        let competitors = specs
            .iter()
            .filter(|spec| !spec.name.trim().is_empty())
            .map(|spec| {
                let mut communities: BTreeSet<String> = spec
                    .communities
                    .iter()
                    .map(|c| normalize_community(c))
                    .filter(|c| !c.is_empty())
                    .collect();
                communities.insert(normalize_community(&spec.name));

                Competitor {
                    name: spec.name.trim().to_string(),
                    region: spec.region,
                    needle: spec.name.trim().to_lowercase(),
                    communities,
                }
            })
            .collect();

        Self { competitors }
    }

    pub fn len(&self) -> usize {
        self.competitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.competitors.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.competitors.iter().map(|c| c.name.as_str())
    }

    #[cfg(test)]
    pub(crate) fn names_in_region(&self, region: CompetitorRegion) -> Vec<&str> {
        self.competitors
            .iter()
            .filter(|c| c.region == region)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Competitor names contained in `lowered_text`, which must already be lower-case.
    pub fn mentioned_in(&self, lowered_text: &str) -> BTreeSet<String> {
        self.competitors
            .iter()
            .filter(|c| lowered_text.contains(&c.needle))
            .map(|c| c.name.clone())
            .collect()
    }

    /// The competitor whose official community `subreddit` is, if any.
    pub fn community_owner(&self, subreddit: &str) -> Option<&str> {
        let normalized = normalize_community(subreddit);
        if normalized.is_empty() {
            return None;
        }
        self.competitors
            .iter()
            .find(|c| c.communities.contains(&normalized))
            .map(|c| c.name.as_str())
    }
}
