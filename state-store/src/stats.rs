use crate::persist::{load_or_default, save_json};
use chrono::NaiveDate;
use monitor_core::{ClassificationResult, KeywordPriority, ReportMode, StateError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Counters for one calendar day (process-local time).
///
/// `india_matches` and `global_matches` partition the alerted posts, so
/// their sum is `total_matches`. The `india_*` counters are the
/// India-relevant subset of their global counterparts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    #[serde(default)]
    pub total_matches: u64,
    #[serde(default)]
    pub primary_matches: u64,
    #[serde(default)]
    pub india_matches: u64,
    #[serde(default)]
    pub india_primary_matches: u64,
    #[serde(default)]
    pub global_matches: u64,
    #[serde(default)]
    pub keywords: BTreeMap<String, u64>,
    #[serde(default)]
    pub competitors: BTreeMap<String, u64>,
    #[serde(default)]
    pub india_keywords: BTreeMap<String, u64>,
    #[serde(default)]
    pub india_competitors: BTreeMap<String, u64>,
    #[serde(default)]
    pub filtered_spam: u64,
    #[serde(default)]
    pub filtered_competitor_community: u64,
    #[serde(default)]
    pub india_filtered_spam: u64,
    #[serde(default)]
    pub india_filtered_competitor_community: u64,
    #[serde(default)]
    pub report_sent: bool,
}

impl DailyStats {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            total_matches: 0,
            primary_matches: 0,
            india_matches: 0,
            india_primary_matches: 0,
            global_matches: 0,
            keywords: BTreeMap::new(),
            competitors: BTreeMap::new(),
            india_keywords: BTreeMap::new(),
            india_competitors: BTreeMap::new(),
            filtered_spam: 0,
            filtered_competitor_community: 0,
            india_filtered_spam: 0,
            india_filtered_competitor_community: 0,
            report_sent: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    Spam,
    CompetitorCommunity,
}

/// Aggregated view of one day for a report message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportData {
    pub date: NaiveDate,
    pub mode: ReportMode,
    /// Alerted posts counted by this report (India-relevant only in India mode)
    pub total_matches: u64,
    pub primary_matches: u64,
    pub india_matches: u64,
    pub global_matches: u64,
    pub top_keywords: Vec<(String, u64)>,
    pub top_competitors: Vec<(String, u64)>,
    pub filtered_spam: u64,
    pub filtered_competitor_community: u64,
}

fn bump(map: &mut BTreeMap<String, u64>, key: &str) {
    *map.entry(key.to_string()).or_insert(0) += 1;
}

/// Highest counts first; ties by name so reports are stable.
fn top_n(map: &BTreeMap<String, u64>, n: usize) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(n);
    entries
}

#[derive(Debug)]
pub struct StatsTracker {
    dir: PathBuf,
    path: PathBuf,
    current: DailyStats,
}

impl StatsTracker {
    /// Resume the persisted record, or start a fresh one for `today`.
    /// A resumed record from an earlier day is rolled over on the next tick.
    pub fn open(dir: impl AsRef<Path>, today: NaiveDate) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let path = dir.join(crate::STATS_FILE);
        let stored: Option<DailyStats> = load_or_default(&path);
        let current = stored.unwrap_or_else(|| DailyStats::new(today));
        info!(date = %current.date, matches = current.total_matches, "Loaded daily stats");
        Self { dir, path, current }
    }

    pub fn current(&self) -> &DailyStats {
        &self.current
    }

    pub fn date(&self) -> NaiveDate {
        self.current.date
    }

    pub fn archive_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("daily_stats_{}.json", date.format("%Y-%m-%d")))
    }

    /// Archive the current record and start an empty one when `new_date`
    /// is after the tracked date. Returns the archived record.
    ///
    /// The archived record is returned exactly as it was; nothing recorded
    /// before the change is touched. An earlier `new_date` (clock stepped
    /// back) keeps counting into the tracked day.
    pub fn rollover(&mut self, new_date: NaiveDate) -> Result<Option<DailyStats>, StateError> {
        if new_date == self.current.date {
            return Ok(None);
        }
        if new_date < self.current.date {
            warn!(
                tracked = %self.current.date,
                date = %new_date,
                "Clock moved back a day, keeping current stats"
            );
            return Ok(None);
        }

        let previous = std::mem::replace(&mut self.current, DailyStats::new(new_date));
        let archive = self.archive_path(previous.date);
        if let Err(e) = save_json(&archive, &previous) {
            warn!(path = %archive.display(), error = %e, "Failed to archive daily stats");
        }
        info!(
            from = %previous.date,
            to = %new_date,
            matches = previous.total_matches,
            "Daily stats rolled over"
        );

        self.persist()?;
        Ok(Some(previous))
    }

    /// Count an alerted post. Rolls over first if `date` is a later day.
    pub fn record(
        &mut self,
        classification: &ClassificationResult,
        date: NaiveDate,
    ) -> Result<(), StateError> {
        if date > self.current.date {
            warn!(tracked = %self.current.date, date = %date, "Recording into a new day without rollover");
            self.rollover(date)?;
        }

        let stats = &mut self.current;
        let primary = classification.priority() == KeywordPriority::Primary;
        stats.total_matches += 1;
        if primary {
            stats.primary_matches += 1;
        }
        if classification.is_india_relevant {
            stats.india_matches += 1;
            if primary {
                stats.india_primary_matches += 1;
            }
        } else {
            stats.global_matches += 1;
        }

        for keyword in classification.matched_keywords() {
            bump(&mut stats.keywords, keyword);
            if classification.is_india_relevant {
                bump(&mut stats.india_keywords, keyword);
            }
        }
        for competitor in &classification.matched_competitors {
            bump(&mut stats.competitors, competitor);
            if classification.is_india_relevant {
                bump(&mut stats.india_competitors, competitor);
            }
        }

        self.persist()
    }

    /// Count a post that matched but was not alerted on. Keyword, competitor
    /// and geo counters are left alone.
    pub fn record_filtered(
        &mut self,
        reason: FilterReason,
        india: bool,
        date: NaiveDate,
    ) -> Result<(), StateError> {
        if date > self.current.date {
            self.rollover(date)?;
        }
        let stats = &mut self.current;
        match reason {
            FilterReason::Spam => {
                stats.filtered_spam += 1;
                if india {
                    stats.india_filtered_spam += 1;
                }
            }
            FilterReason::CompetitorCommunity => {
                stats.filtered_competitor_community += 1;
                if india {
                    stats.india_filtered_competitor_community += 1;
                }
            }
        }
        self.persist()
    }

    /// Every count in an India report covers India-relevant posts only.
    pub fn report(&self, mode: ReportMode, top: usize) -> ReportData {
        let stats = &self.current;
        let (total_matches, primary_matches, keywords, competitors, spam, community) = match mode {
            ReportMode::India => (
                stats.india_matches,
                stats.india_primary_matches,
                &stats.india_keywords,
                &stats.india_competitors,
                stats.india_filtered_spam,
                stats.india_filtered_competitor_community,
            ),
            ReportMode::Global => (
                stats.total_matches,
                stats.primary_matches,
                &stats.keywords,
                &stats.competitors,
                stats.filtered_spam,
                stats.filtered_competitor_community,
            ),
        };

        ReportData {
            date: stats.date,
            mode,
            total_matches,
            primary_matches,
            india_matches: stats.india_matches,
            global_matches: stats.global_matches,
            top_keywords: top_n(keywords, top),
            top_competitors: top_n(competitors, top),
            filtered_spam: spam,
            filtered_competitor_community: community,
        }
    }

    pub fn report_sent(&self) -> bool {
        self.current.report_sent
    }

    pub fn mark_report_sent(&mut self) -> Result<(), StateError> {
        self.current.report_sent = true;
        self.persist()
    }

    fn persist(&self) -> Result<(), StateError> {
        save_json(&self.path, &Some(&self.current))
    }
}
