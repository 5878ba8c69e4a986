//! The scan loop: rotate keywords, fetch, classify, dedup, count and alert.

use crate::format::{format_alert, format_report};
use crate::{deliver, SharedState};
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, NaiveTime, Utc};
use matcher::{Classifier, KeywordSet, MatchTargets};
use monitor_core::retry::calculate_delay;
use monitor_core::{
    AlertSink, ConfigError, CoreError, ErrorExt, Post, PostSource, RetryConfig, RetryExecutor,
    RetryMetrics, ScanSettings,
};
use state_store::FilterReason;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// What happened to a single fetched post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    Duplicate,
    Stale,
    Unmatched,
    Spam,
    CompetitorCommunity,
    Alerted,
    AlertFailed,
    /// Marking the post seen did not reach disk, so it was not alerted
    PersistFailed,
}

/// Counters for one tick, logged at the end of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub paused: bool,
    pub interrupted: bool,
    pub window: u64,
    pub keywords: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub fetched: usize,
    pub duplicates: usize,
    pub stale: usize,
    pub unmatched: usize,
    pub spam: usize,
    pub competitor_community: usize,
    pub alerted: usize,
    pub alert_failures: usize,
    pub persist_failures: usize,
    pub report_sent: bool,
}

impl TickSummary {
    pub fn scanned(&self) -> bool {
        self.batches > 0
    }

    fn count(&mut self, outcome: PostOutcome) {
        match outcome {
            PostOutcome::Duplicate => self.duplicates += 1,
            PostOutcome::Stale => self.stale += 1,
            PostOutcome::Unmatched => self.unmatched += 1,
            PostOutcome::Spam => self.spam += 1,
            PostOutcome::CompetitorCommunity => self.competitor_community += 1,
            PostOutcome::Alerted => self.alerted += 1,
            PostOutcome::AlertFailed => self.alert_failures += 1,
            PostOutcome::PersistFailed => self.persist_failures += 1,
        }
    }
}

/// How often an in-flight fetch re-reads the run flag.
const HALT_POLL: Duration = Duration::from_millis(250);

/// Unseen posts of one fetched batch, marked seen with a single write.
struct Claim {
    fresh: HashSet<String>,
    saved: bool,
}

pub struct Scheduler {
    source: Arc<dyn PostSource>,
    sink: Arc<dyn AlertSink>,
    keywords: Arc<KeywordSet>,
    classifier: Arc<Classifier>,
    shared: SharedState,
    settings: ScanSettings,
    report_time: NaiveTime,
    fetch_retry: RetryExecutor,
    send_retry: RetryExecutor,
    shutdown: watch::Receiver<bool>,
    rotation_index: u64,
    consecutive_failures: u32,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn PostSource>,
        sink: Arc<dyn AlertSink>,
        keywords: Arc<KeywordSet>,
        classifier: Arc<Classifier>,
        shared: SharedState,
        settings: ScanSettings,
        retry: RetryConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, ConfigError> {
        let report_time = settings.report_time()?;
        let send_retry = RetryConfig {
            max_delay_ms: retry.max_delay_ms.min(RetryConfig::telegram().max_delay_ms),
            ..retry.clone()
        };

        Ok(Self {
            source,
            sink,
            keywords,
            classifier,
            shared,
            settings,
            report_time,
            fetch_retry: RetryExecutor::new(retry),
            send_retry: RetryExecutor::new(send_retry),
            shutdown,
            rotation_index: 0,
            consecutive_failures: 0,
        })
    }

    pub fn rotation_index(&self) -> u64 {
        self.rotation_index
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Retry counters of every fetch since start.
    pub fn fetch_metrics(&self) -> RetryMetrics {
        self.fetch_retry.get_metrics()
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn is_running(&self) -> bool {
        self.shared.control.lock().await.is_running()
    }

    /// Tick interval plus backoff after ticks whose fetches all failed.
    pub fn next_wait(&self) -> Duration {
        let interval = self.settings.interval();
        if self.consecutive_failures == 0 {
            return interval;
        }
        let backoff = calculate_delay(self.consecutive_failures - 1, self.fetch_retry.config())
            .min(Duration::from_secs(self.settings.max_failure_backoff_secs));
        interval + backoff
    }

    pub async fn run(mut self) {
        info!(
            interval_secs = self.settings.interval_secs,
            primary = self.keywords.primary().len(),
            secondary = self.keywords.secondary().len(),
            windows = self.keywords.window_count(),
            "Scan loop started"
        );

        let wake = self.shared.wake.clone();
        loop {
            if self.shutdown_requested() {
                break;
            }

            self.tick_at(Local::now()).await;

            let wait = self.next_wait();
            debug!(wait_secs = wait.as_secs(), "Waiting for next tick");
            tokio::select! {
                _ = sleep(wait) => {}
                _ = wake.notified() => debug!("Woken early by operator command"),
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        let metrics = self.fetch_metrics();
        info!(
            ticks_scanned = self.rotation_index,
            fetch_retries = metrics.total_retries,
            failed_fetches = metrics.failed_operations,
            "Scan loop stopped"
        );
    }

    /// One pass of the loop at wall-clock time `now`.
    pub async fn tick_at(&mut self, now: DateTime<Local>) -> TickSummary {
        let started = Instant::now();
        let today = now.date_naive();
        let mut summary = TickSummary {
            window: self.rotation_index,
            ..Default::default()
        };

        self.roll_day(today).await;

        if !self.is_running().await {
            summary.paused = true;
            debug!("Monitoring paused, skipping scan");
            return summary;
        }

        summary.report_sent = self.maybe_send_daily_report(now).await;

        let targets = self.keywords.match_targets(self.rotation_index);
        let queries: Vec<String> = targets.all().cloned().collect();
        summary.keywords = queries.len();
        let now_utc = now.with_timezone(&Utc);

        'batches: for batch in queries.chunks(self.settings.fetch_batch_size.max(1)) {
            if self.halt_requested().await {
                summary.interrupted = true;
                break;
            }

            let fetched = tokio::select! {
                fetched = self.fetch(batch) => fetched,
                _ = self.halted() => {
                    info!(keywords = batch.len(), "Fetch abandoned, scan halted");
                    summary.interrupted = true;
                    break 'batches;
                }
            };
            summary.batches += 1;
            let posts = match fetched {
                Ok(posts) => posts,
                Err(e) => {
                    summary.failed_batches += 1;
                    e.log_warn();
                    warn!(batch = summary.batches, keywords = batch.len(), "Fetch failed, skipping batch");
                    continue;
                }
            };
            summary.fetched += posts.len();

            let mut claim = self.claim(&posts).await;
            for post in &posts {
                if self.halt_requested().await {
                    summary.interrupted = true;
                    self.release_unhandled(&claim).await;
                    break 'batches;
                }
                let outcome = if !claim.fresh.remove(&post.id) {
                    PostOutcome::Duplicate
                } else if !claim.saved {
                    PostOutcome::PersistFailed
                } else {
                    self.process_post(post, &targets, now_utc, today).await
                };
                summary.count(outcome);
            }
        }

        if summary.scanned() {
            self.rotation_index += 1;
            if summary.failed_batches == summary.batches {
                self.consecutive_failures += 1;
            } else {
                self.consecutive_failures = 0;
            }
        }

        info!(
            window = summary.window,
            keywords = summary.keywords,
            batches = summary.batches,
            failed_batches = summary.failed_batches,
            fetched = summary.fetched,
            duplicates = summary.duplicates,
            stale = summary.stale,
            unmatched = summary.unmatched,
            spam = summary.spam,
            competitor_community = summary.competitor_community,
            alerted = summary.alerted,
            alert_failures = summary.alert_failures,
            persist_failures = summary.persist_failures,
            fetch_retries_total = self.fetch_retry.get_metrics().total_retries,
            interrupted = summary.interrupted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scan tick complete"
        );
        summary
    }

    async fn halt_requested(&self) -> bool {
        self.shutdown_requested() || !self.is_running().await
    }

    /// Resolves once shutdown is requested or monitoring is paused.
    async fn halted(&self) {
        let mut shutdown = self.shutdown.clone();
        let mut sender_alive = true;
        loop {
            let stopping = *shutdown.borrow_and_update();
            if stopping || !self.is_running().await {
                return;
            }
            if sender_alive {
                tokio::select! {
                    changed = shutdown.changed() => sender_alive = changed.is_ok(),
                    _ = sleep(HALT_POLL) => {}
                }
            } else {
                sleep(HALT_POLL).await;
            }
        }
    }

    async fn fetch(&self, batch: &[String]) -> Result<Vec<Post>, CoreError> {
        let source = self.source.as_ref();
        let timeout = self.settings.fetch_timeout();
        self.fetch_retry
            .execute("reddit_fetch", || async move {
                match tokio::time::timeout(timeout, source.fetch_new_posts(batch)).await {
                    Ok(result) => result,
                    Err(_) => Err(CoreError::Timeout {
                        seconds: timeout.as_secs(),
                    }),
                }
            })
            .await
    }

    /// Mark every unseen post of the batch seen before any of them is
    /// alerted. When the write fails none of them count as seen.
    async fn claim(&self, posts: &[Post]) -> Claim {
        let mut dedup = self.shared.dedup.lock().await;
        let fresh: HashSet<String> = posts
            .iter()
            .filter(|post| dedup.is_new(&post.id))
            .map(|post| post.id.clone())
            .collect();

        match dedup.mark_seen(fresh.iter().map(String::as_str)) {
            Ok(_) => Claim { fresh, saved: true },
            Err(e) => {
                e.log_error();
                warn!(posts = fresh.len(), "Seen posts not saved, holding their alerts");
                Claim { fresh, saved: false }
            }
        }
    }

    /// Unmark posts a halted tick never got to, so a later tick picks them up.
    async fn release_unhandled(&self, claim: &Claim) {
        if !claim.saved || claim.fresh.is_empty() {
            return;
        }
        let mut dedup = self.shared.dedup.lock().await;
        match dedup.release(claim.fresh.iter().map(String::as_str)) {
            Ok(released) => debug!(released, "Released unhandled posts"),
            Err(e) => {
                e.log_warn();
            }
        }
    }

    /// Classify, count and alert one post already marked seen, so a failed
    /// send is never retried later.
    async fn process_post(
        &self,
        post: &Post,
        targets: &MatchTargets,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> PostOutcome {
        if now - post.created_at > ChronoDuration::hours(self.settings.max_post_age_hours) {
            debug!(post_id = %post.id, created_at = %post.created_at, "Skipping stale post");
            return PostOutcome::Stale;
        }
        let classification = self
            .classifier
            .classify(post, targets, self.keywords.competitors());

        if !classification.has_match() {
            debug!(post_id = %post.id, "No keyword or competitor match");
            return PostOutcome::Unmatched;
        }

        let filtered = if classification.is_spam {
            Some((FilterReason::Spam, PostOutcome::Spam))
        } else if classification.competitor_community.is_some() {
            Some((FilterReason::CompetitorCommunity, PostOutcome::CompetitorCommunity))
        } else {
            None
        };
        if let Some((reason, outcome)) = filtered {
            debug!(post_id = %post.id, subreddit = %post.subreddit, reason = ?reason, "Filtered post");
            let recorded = self.shared.stats.lock().await.record_filtered(
                reason,
                classification.is_india_relevant,
                today,
            );
            if let Err(e) = recorded {
                e.log_warn();
            }
            return outcome;
        }

        if let Err(e) = self.shared.stats.lock().await.record(&classification, today) {
            e.log_warn();
        }

        let message = format_alert(post, &classification, now);
        match deliver(
            self.sink.as_ref(),
            &self.send_retry,
            self.settings.send_timeout(),
            "telegram_alert",
            &message,
        )
        .await
        {
            Ok(()) => {
                info!(
                    post_id = %post.id,
                    subreddit = %post.subreddit,
                    primary = !classification.matched_primary.is_empty(),
                    india = classification.is_india_relevant,
                    "Alert sent"
                );
                PostOutcome::Alerted
            }
            Err(e) => {
                e.log_warn();
                warn!(post_id = %post.id, "Alert not delivered, post stays marked seen");
                PostOutcome::AlertFailed
            }
        }
    }

    async fn roll_day(&self, today: NaiveDate) {
        match self.shared.stats.lock().await.rollover(today) {
            Ok(Some(previous)) => info!(
                date = %previous.date,
                matches = previous.total_matches,
                "Archived previous day's stats"
            ),
            Ok(None) => {}
            Err(e) => {
                e.log_warn();
            }
        }
    }

    /// Send today's report once, at or after the configured local time.
    /// Only called while monitoring is running.
    async fn maybe_send_daily_report(&self, now: DateTime<Local>) -> bool {
        if now.time() < self.report_time {
            return false;
        }
        let mode = self.shared.control.lock().await.report_mode();
        let data = {
            let stats = self.shared.stats.lock().await;
            if stats.report_sent() {
                return false;
            }
            stats.report(mode, self.settings.report_top_n)
        };

        let text = format_report(&data, now);
        match deliver(
            self.sink.as_ref(),
            &self.send_retry,
            self.settings.send_timeout(),
            "daily_report",
            &text,
        )
        .await
        {
            Ok(()) => {
                if let Err(e) = self.shared.stats.lock().await.mark_report_sent() {
                    e.log_warn();
                }
                info!(date = %data.date, mode = %mode, matches = data.total_matches, "Daily report sent");
                true
            }
            Err(e) => {
                e.log_warn();
                false
            }
        }
    }
}
