mod common;

use async_trait::async_trait;
use background_service::{Scheduler, SharedState};
use chrono::{Duration, Local, TimeZone, Utc};
use common::*;
use matcher::Classifier;
use monitor_core::{AlertSink, CoreError, Post, PostSource, RuleSettings, ScanSettings};
use state_store::StatePaths;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;

const INDIA_TITLE: &str = "Best bitcoin exchange in India 2025?";

#[tokio::test]
async fn test_duplicate_fetch_produces_one_alert() {
    let posts = vec![post("abc", INDIA_TITLE, "", "CryptoIndia")];
    // Four primary keywords in batches of two: the same post comes back twice
    let mut h = Harness::new(posts, keywords(&["bitcoin", "exchange", "wallet", "crypto"], &[], 20));

    let first = h.scheduler.tick_at(morning()).await;
    assert_eq!(first.batches, 2);
    assert_eq!(first.fetched, 2);
    assert_eq!(first.alerted, 1);
    assert_eq!(first.duplicates, 1);

    let second = h.scheduler.tick_at(morning() + Duration::minutes(2)).await;
    assert_eq!(second.alerted, 0);
    assert_eq!(second.duplicates, 2);

    let messages = h.sink.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("*PRIMARY*"));
    assert!(messages[0].contains("🇮🇳"));

    let stats = h.shared.stats.lock().await.current().clone();
    assert_eq!(stats.total_matches, 1);
    assert_eq!(stats.primary_matches, 1);
    assert_eq!(stats.india_matches, 1);
    assert_eq!(stats.global_matches, 0);
    assert_eq!(stats.keywords.get("bitcoin"), Some(&1));
}

#[tokio::test]
async fn test_referral_spam_is_not_alerted() {
    let posts = vec![post(
        "spam1",
        "Bitcoin exchange bonus",
        "use my referral code for 10% off",
        "CryptoCurrency",
    )];
    let mut h = Harness::new(posts, keywords(&["bitcoin", "exchange"], &[], 20));

    let summary = h.scheduler.tick_at(morning()).await;
    assert_eq!(summary.spam, 1);
    assert_eq!(summary.alerted, 0);
    assert!(h.sink.messages().is_empty());

    let stats = h.shared.stats.lock().await.current().clone();
    assert_eq!(stats.filtered_spam, 1);
    assert_eq!(stats.total_matches, 0);
    assert!(stats.keywords.is_empty());

    // Marked seen even though it was filtered
    assert!(!h.shared.dedup.lock().await.is_new("reddit_spam1"));
    let again = h.scheduler.tick_at(morning() + Duration::minutes(2)).await;
    assert_eq!(again.duplicates, 1);
    assert_eq!(h.shared.stats.lock().await.current().filtered_spam, 1);
}

#[tokio::test]
async fn test_competitor_community_post_is_excluded() {
    let posts = vec![post("bn1", "Bitcoin withdrawal stuck for 3 days", "", "binance")];
    let mut h = Harness::new(posts, keywords(&["bitcoin"], &[], 20));

    let summary = h.scheduler.tick_at(morning()).await;
    assert_eq!(summary.competitor_community, 1);
    assert!(h.sink.messages().is_empty());
    assert_eq!(
        h.shared.stats.lock().await.current().filtered_competitor_community,
        1
    );
    assert!(!h.shared.dedup.lock().await.is_new("reddit_bn1"));
}

#[tokio::test]
async fn test_stale_and_unmatched_posts_are_marked_seen_without_counting() {
    let mut old = post("old1", "Bitcoin price today", "", "CryptoCurrency");
    old.created_at = morning().with_timezone(&Utc) - Duration::hours(30);
    let unrelated = post("hi1", "What should I cook tonight?", "", "Cooking");
    let mut h = Harness::new(vec![old, unrelated], keywords(&["bitcoin"], &[], 20));

    let summary = h.scheduler.tick_at(morning()).await;
    assert_eq!(summary.stale, 1);
    assert_eq!(summary.unmatched, 1);
    assert!(h.sink.messages().is_empty());

    let stats = h.shared.stats.lock().await.current().clone();
    assert_eq!(stats.total_matches, 0);
    assert_eq!(stats.filtered_spam, 0);

    let dedup = h.shared.dedup.lock().await;
    assert!(!dedup.is_new("reddit_old1"));
    assert!(!dedup.is_new("reddit_hi1"));
}

#[tokio::test]
async fn test_paused_scheduler_does_not_fetch() {
    let posts = vec![post("abc", INDIA_TITLE, "", "CryptoIndia")];
    let mut h = Harness::new(posts, keywords(&["bitcoin"], &[], 20));
    h.shared
        .control
        .lock()
        .await
        .set_running(false, "stop")
        .unwrap();

    let summary = h.scheduler.tick_at(morning()).await;
    assert!(summary.paused);
    assert_eq!(h.source.call_count(), 0);
    assert_eq!(h.scheduler.rotation_index(), 0);
    assert!(h.sink.messages().is_empty());
}

#[tokio::test]
async fn test_paused_scheduler_skips_daily_report() {
    let mut h = Harness::new(Vec::new(), keywords(&["bitcoin"], &[], 20));
    let after_report_time = Local.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
    h.shared
        .control
        .lock()
        .await
        .set_running(false, "stop")
        .unwrap();

    let paused = h.scheduler.tick_at(after_report_time).await;
    assert!(paused.paused);
    assert!(!paused.report_sent);
    assert!(h.sink.messages().is_empty());
    assert!(!h.shared.stats.lock().await.report_sent());

    h.shared
        .control
        .lock()
        .await
        .set_running(true, "start")
        .unwrap();
    let resumed = h.scheduler.tick_at(after_report_time + Duration::minutes(5)).await;
    assert!(resumed.report_sent);
    assert_eq!(h.sink.messages().len(), 1);
}

#[tokio::test]
async fn test_rotation_covers_every_secondary_keyword() {
    let secondary = ["ledger", "staking", "airdrop", "defi", "solana"];
    let mut h = Harness::new(Vec::new(), keywords(&["bitcoin"], &secondary, 2));
    assert_eq!(h.keywords.window_count(), 3);

    for minute in 0..3 {
        h.scheduler.tick_at(morning() + Duration::minutes(minute)).await;
    }
    assert_eq!(h.scheduler.rotation_index(), 3);

    let calls = h.source.calls.lock().unwrap().clone();
    let queried: BTreeSet<String> = calls.into_iter().flatten().collect();
    for keyword in secondary.iter().chain(["bitcoin"].iter()) {
        assert!(queried.contains(*keyword), "{} was never searched", keyword);
    }
}

#[tokio::test]
async fn test_failed_ticks_back_off() {
    let mut h = Harness::new(Vec::new(), keywords(&["bitcoin", "exchange", "wallet"], &[], 20));
    let interval = std::time::Duration::from_secs(1);
    assert_eq!(h.scheduler.next_wait(), interval);

    *h.source.fail.lock().unwrap() = true;
    let summary = h.scheduler.tick_at(morning()).await;
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.failed_batches, 2);
    assert_eq!(h.scheduler.consecutive_failures(), 1);
    assert!(h.scheduler.next_wait() > interval);
    // Authentication failures are not retried
    assert_eq!(h.source.call_count(), 2);
    let metrics = h.scheduler.fetch_metrics();
    assert_eq!(metrics.failed_operations, 2);
    assert_eq!(metrics.total_retries, 0);

    *h.source.fail.lock().unwrap() = false;
    h.scheduler.tick_at(morning() + Duration::minutes(2)).await;
    assert_eq!(h.scheduler.consecutive_failures(), 0);
    assert_eq!(h.scheduler.next_wait(), interval);
}

#[tokio::test]
async fn test_daily_report_is_sent_once() {
    let mut h = Harness::new(Vec::new(), keywords(&["bitcoin"], &[], 20));
    let after_report_time = Local.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();

    let first = h.scheduler.tick_at(after_report_time).await;
    assert!(first.report_sent);
    let second = h.scheduler.tick_at(after_report_time + Duration::minutes(5)).await;
    assert!(!second.report_sent);

    let messages = h.sink.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Daily Global Report 2025\\-03\\-01"));
    assert!(h.shared.stats.lock().await.report_sent());
}

#[tokio::test]
async fn test_new_day_archives_previous_stats() {
    let posts = vec![post("abc", INDIA_TITLE, "", "CryptoIndia")];
    let mut h = Harness::new(posts, keywords(&["bitcoin"], &[], 20));
    h.scheduler.tick_at(morning()).await;

    let next_day = morning() + Duration::days(1);
    h.scheduler.tick_at(next_day).await;

    let stats = h.shared.stats.lock().await;
    assert_eq!(stats.date(), next_day.date_naive());
    assert_eq!(stats.current().total_matches, 0);
    assert!(h.dir.path().join("daily_stats_2025-03-01.json").exists());
}

#[tokio::test]
async fn test_shutdown_stops_before_fetching() {
    let mut h = Harness::new(Vec::new(), keywords(&["bitcoin"], &[], 20));
    h.shutdown.send(true).unwrap();

    let summary = h.scheduler.tick_at(morning()).await;
    assert!(summary.interrupted);
    assert_eq!(summary.batches, 0);
    assert_eq!(h.scheduler.rotation_index(), 0);
}

/// Pauses monitoring from inside the first send, like a /stop arriving mid-tick.
struct StoppingSink {
    shared: SharedState,
    sent: std::sync::Mutex<usize>,
}

#[async_trait]
impl AlertSink for StoppingSink {
    async fn send(&self, _message: &str) -> Result<(), CoreError> {
        *self.sent.lock().unwrap() += 1;
        self.shared
            .control
            .lock()
            .await
            .set_running(false, "stop")
            .map(|_| ())
            .map_err(CoreError::from)
    }
}

#[tokio::test]
async fn test_stop_takes_effect_between_posts() {
    let dir = tempfile::tempdir().unwrap();
    let shared = SharedState::open(&StatePaths::new(dir.path()), morning().date_naive());
    let source = Arc::new(FakeSource::with_posts(vec![
        post("one", "bitcoin question", "", "CryptoCurrency"),
        post("two", "another bitcoin question", "", "CryptoCurrency"),
    ]));
    let sink = Arc::new(StoppingSink {
        shared: shared.clone(),
        sent: std::sync::Mutex::new(0),
    });
    let (_shutdown, shutdown_rx) = watch::channel(false);

    let mut scheduler = Scheduler::new(
        source,
        sink.clone(),
        keywords(&["bitcoin"], &[], 20),
        Arc::new(Classifier::from_rules(&RuleSettings::default()).unwrap()),
        shared.clone(),
        ScanSettings::default(),
        fast_retry(),
        shutdown_rx,
    )
    .unwrap();

    let summary = scheduler.tick_at(morning()).await;
    assert!(summary.interrupted);
    assert_eq!(summary.alerted, 1);
    assert_eq!(*sink.sent.lock().unwrap(), 1);
    assert!(shared.dedup.lock().await.is_new("reddit_two"));
}

#[tokio::test]
async fn test_run_loop_exits_on_shutdown() {
    let h = Harness::new(Vec::new(), keywords(&["bitcoin"], &[], 20));
    let Harness {
        scheduler,
        shutdown,
        source,
        ..
    } = h;

    let task = tokio::spawn(scheduler.run());
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    shutdown.send(true).unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(5), task)
        .await
        .expect("scan loop did not stop")
        .unwrap();
    assert!(source.call_count() >= 1);
}

#[tokio::test]
async fn test_unsaved_seen_mark_holds_alert_across_restart() {
    let posts = vec![post("abc", INDIA_TITLE, "", "CryptoIndia")];
    let dir = tempfile::tempdir().unwrap();
    // A directory where the seen file belongs makes every write fail
    let seen_path = StatePaths::new(dir.path()).seen();
    std::fs::create_dir_all(&seen_path).unwrap();

    let mut first = Harness::open(dir, posts.clone(), keywords(&["bitcoin"], &[], 20));
    let summary = first.scheduler.tick_at(morning()).await;
    assert_eq!(summary.persist_failures, 1);
    assert_eq!(summary.alerted, 0);
    assert!(first.sink.messages().is_empty());
    assert_eq!(first.shared.stats.lock().await.current().total_matches, 0);
    assert!(first.shared.dedup.lock().await.is_new("reddit_abc"));

    // Restarted on the same state directory, still unwritable
    let Harness { dir, .. } = first;
    let mut second = Harness::open(dir, posts.clone(), keywords(&["bitcoin"], &[], 20));
    second.scheduler.tick_at(morning() + Duration::minutes(2)).await;
    assert!(second.sink.messages().is_empty());

    // Once the file can be written the post is alerted exactly once
    std::fs::remove_dir(&seen_path).unwrap();
    let recovered = second.scheduler.tick_at(morning() + Duration::minutes(4)).await;
    assert_eq!(recovered.alerted, 1);
    let again = second.scheduler.tick_at(morning() + Duration::minutes(6)).await;
    assert_eq!(again.duplicates, 1);
    assert_eq!(second.sink.messages().len(), 1);

    let Harness { dir, .. } = second;
    let third = Harness::open(dir, posts, keywords(&["bitcoin"], &[], 20));
    assert!(!third.shared.dedup.lock().await.is_new("reddit_abc"));
}

/// Never answers within a test's lifetime.
struct HangingSource;

#[async_trait]
impl PostSource for HangingSource {
    async fn fetch_new_posts(&self, _keywords: &[String]) -> Result<Vec<Post>, CoreError> {
        tokio::time::sleep(std::time::Duration::from_secs(600)).await;
        Ok(Vec::new())
    }
}

fn hanging_scheduler(shared: &SharedState, shutdown: watch::Receiver<bool>) -> Scheduler {
    common::scheduler(
        Arc::new(HangingSource),
        Arc::new(RecordingSink::default()),
        keywords(&["bitcoin"], &[], 20),
        shared.clone(),
        shutdown,
    )
}

#[tokio::test]
async fn test_stop_cuts_a_hanging_fetch_short() {
    let dir = tempfile::tempdir().unwrap();
    let shared = SharedState::open(&StatePaths::new(dir.path()), morning().date_naive());
    let (_shutdown, shutdown_rx) = watch::channel(false);
    let mut scheduler = hanging_scheduler(&shared, shutdown_rx);

    let control = shared.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        control.control.lock().await.set_running(false, "stop").unwrap();
    });

    let summary = tokio::time::timeout(std::time::Duration::from_secs(5), scheduler.tick_at(morning()))
        .await
        .expect("tick kept waiting on the fetch after /stop");
    assert!(summary.interrupted);
    assert_eq!(summary.batches, 0);
    assert_eq!(scheduler.rotation_index(), 0);
}

#[tokio::test]
async fn test_shutdown_cuts_a_hanging_fetch_short() {
    let dir = tempfile::tempdir().unwrap();
    let shared = SharedState::open(&StatePaths::new(dir.path()), morning().date_naive());
    let (shutdown, shutdown_rx) = watch::channel(false);
    let mut scheduler = hanging_scheduler(&shared, shutdown_rx);

    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        shutdown.send(true).unwrap();
    });

    let summary = tokio::time::timeout(std::time::Duration::from_secs(5), scheduler.tick_at(morning()))
        .await
        .expect("tick kept waiting on the fetch after shutdown");
    assert!(summary.interrupted);
    assert_eq!(summary.batches, 0);
}
