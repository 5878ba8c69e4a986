use crate::competitors::CompetitorCatalogue;
use crate::loader::KeywordEntry;
use monitor_core::KeywordPriority;
use std::collections::HashSet;

/// Keywords active for one tick: every primary keyword plus one secondary window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchTargets {
    pub primary: Vec<String>,
    pub secondary: Vec<String>,
}

impl MatchTargets {
    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.primary.iter().chain(self.secondary.iter())
    }

    pub fn len(&self) -> usize {
        self.primary.len() + self.secondary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Primary and secondary keyword lists plus the competitor catalogue.
///
/// The lists never change after construction. Rotation only selects which
/// contiguous chunk of the secondary list a tick uses.
#[derive(Debug, Clone)]
pub struct KeywordSet {
    primary: Vec<String>,
    secondary: Vec<String>,
    competitors: CompetitorCatalogue,
    chunk_size: usize,
}

impl KeywordSet {
    /// Keywords are lower-cased and de-duplicated. A keyword listed as both
    /// primary and secondary stays primary.
    pub fn new(
        primary: Vec<String>,
        secondary: Vec<String>,
        competitors: CompetitorCatalogue,
        chunk_size: usize,
    ) -> Self {
        let mut seen = HashSet::new();
        let mut keep = |list: Vec<String>| -> Vec<String> {
            list.into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty() && seen.insert(k.clone()))
                .collect()
        };
        let primary = keep(primary);
        let secondary = keep(secondary);

        Self {
            primary,
            secondary,
            competitors,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Entries whose priority is unset fall into the tier given by their
    /// position: the first `primary_count` become primary.
    pub fn from_entries(
        entries: Vec<KeywordEntry>,
        primary_count: usize,
        competitors: CompetitorCatalogue,
        chunk_size: usize,
    ) -> Self {
        let has_priorities = entries.iter().any(|e| e.priority.is_some());
        let (primary, secondary): (Vec<_>, Vec<_>) = if has_priorities {
            entries
                .into_iter()
                .partition(|e| e.priority == Some(KeywordPriority::Primary))
        } else {
            let mut entries = entries;
            let split = primary_count.min(entries.len());
            let secondary = entries.split_off(split);
            (entries, secondary)
        };

        Self::new(
            primary.into_iter().map(|e| e.keyword).collect(),
            secondary.into_iter().map(|e| e.keyword).collect(),
            competitors,
            chunk_size,
        )
    }

    pub fn primary(&self) -> &[String] {
        &self.primary
    }

    pub fn secondary(&self) -> &[String] {
        &self.secondary
    }

    pub fn competitors(&self) -> &CompetitorCatalogue {
        &self.competitors
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn len(&self) -> usize {
        self.primary.len() + self.secondary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of secondary windows; zero when there are no secondary keywords.
    pub fn window_count(&self) -> usize {
        self.secondary.len().div_ceil(self.chunk_size)
    }

    pub fn match_targets(&self, tick_index: u64) -> MatchTargets {
        let windows = self.window_count();
        let secondary = if windows == 0 {
            Vec::new()
        } else {
            let window = (tick_index % windows as u64) as usize;
            let start = window * self.chunk_size;
            let end = (start + self.chunk_size).min(self.secondary.len());
            self.secondary[start..end].to_vec()
        };

        MatchTargets {
            primary: self.primary.clone(),
            secondary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn words(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    fn set(primary: usize, secondary: usize, chunk: usize) -> KeywordSet {
        KeywordSet::new(
            words("p", primary),
            words("s", secondary),
            CompetitorCatalogue::default(),
            chunk,
        )
    }

    #[test]
    fn test_rotation_covers_secondary_list() {
        for (len, chunk) in [(45, 20), (40, 20), (7, 3), (1, 1), (100, 7)] {
            let keywords = set(2, len, chunk);
            let windows = keywords.window_count();
            assert_eq!(windows, len.div_ceil(chunk));

            let covered: BTreeSet<String> = (0..windows as u64)
                .flat_map(|tick| keywords.match_targets(tick).secondary)
                .collect();
            let expected: BTreeSet<String> = keywords.secondary().iter().cloned().collect();
            assert_eq!(covered, expected, "len={} chunk={}", len, chunk);
        }
    }

    #[test]
    fn test_windows_are_contiguous_and_wrap() {
        let keywords = set(1, 5, 2);
        assert_eq!(keywords.match_targets(0).secondary, vec!["s0", "s1"]);
        assert_eq!(keywords.match_targets(1).secondary, vec!["s2", "s3"]);
        assert_eq!(keywords.match_targets(2).secondary, vec!["s4"]);
        assert_eq!(keywords.match_targets(3), keywords.match_targets(0));
    }

    #[test]
    fn test_primary_always_present() {
        let keywords = set(3, 50, 20);
        for tick in 0..10 {
            assert_eq!(keywords.match_targets(tick).primary, vec!["p0", "p1", "p2"]);
        }
    }

    #[test]
    fn test_empty_and_small_secondary() {
        let empty = set(2, 0, 20);
        assert_eq!(empty.window_count(), 0);
        assert!(empty.match_targets(7).secondary.is_empty());
        assert_eq!(empty.match_targets(7).len(), 2);

        let small = set(0, 4, 20);
        for tick in 0..3 {
            assert_eq!(small.match_targets(tick).secondary.len(), 4);
        }
    }

    #[test]
    fn test_duplicates_collapse_into_primary() {
        let keywords = KeywordSet::new(
            vec!["Bitcoin".to_string(), "bitcoin".to_string()],
            vec!["BITCOIN".to_string(), "wallet".to_string(), " ".to_string()],
            CompetitorCatalogue::default(),
            0,
        );
        assert_eq!(keywords.primary(), ["bitcoin"]);
        assert_eq!(keywords.secondary(), ["wallet"]);
        assert_eq!(keywords.chunk_size(), 1);
    }

    #[test]
    fn test_from_entries_uses_position_without_priorities() {
        let entries = (0..5)
            .map(|i| KeywordEntry {
                keyword: format!("k{}", i),
                volume: 0,
                priority: None,
            })
            .collect();
        let keywords = KeywordSet::from_entries(entries, 2, CompetitorCatalogue::default(), 20);
        assert_eq!(keywords.primary(), ["k0", "k1"]);
        assert_eq!(keywords.secondary(), ["k2", "k3", "k4"]);
    }
}
