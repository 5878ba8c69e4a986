#![allow(dead_code)]

use async_trait::async_trait;
use background_service::{CommandHandler, Scheduler, SharedState};
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use matcher::{Classifier, CompetitorCatalogue, KeywordSet};
use monitor_core::{
    AlertSink, CommandSource, CoreError, InboundCommand, Post, PostSource, RedditApiError,
    RetryConfig, RuleSettings, ScanSettings,
};
use state_store::StatePaths;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::watch;

/// Returns the same posts for every call and records the keyword batches.
#[derive(Default)]
pub struct FakeSource {
    pub posts: Mutex<Vec<Post>>,
    pub calls: Mutex<Vec<Vec<String>>>,
    pub fail: Mutex<bool>,
}

impl FakeSource {
    pub fn with_posts(posts: Vec<Post>) -> Self {
        Self {
            posts: Mutex::new(posts),
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PostSource for FakeSource {
    async fn fetch_new_posts(&self, keywords: &[String]) -> Result<Vec<Post>, CoreError> {
        self.calls.lock().unwrap().push(keywords.to_vec());
        if *self.fail.lock().unwrap() {
            return Err(CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                reason: "bad credentials".to_string(),
            }));
        }
        Ok(self.posts.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn send(&self, message: &str) -> Result<(), CoreError> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// Hands out one scripted batch per poll, then nothing.
#[derive(Default)]
pub struct ScriptedCommands {
    pub batches: Mutex<VecDeque<Vec<String>>>,
}

impl ScriptedCommands {
    pub fn new(batches: Vec<Vec<&str>>) -> Self {
        Self {
            batches: Mutex::new(
                batches
                    .into_iter()
                    .map(|b| b.into_iter().map(str::to_string).collect())
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl CommandSource for ScriptedCommands {
    async fn poll(&self) -> Result<Vec<InboundCommand>, CoreError> {
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(texts) => Ok(texts
                .into_iter()
                .map(|text| InboundCommand {
                    text,
                    received_at: Utc::now(),
                })
                .collect()),
            None => {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                Ok(Vec::new())
            }
        }
    }
}

/// 08:00 local, before the default 09:30 report time.
pub fn morning() -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
}

pub fn post(id: &str, title: &str, body: &str, subreddit: &str) -> Post {
    Post {
        id: format!("reddit_{}", id),
        title: title.to_string(),
        body: body.to_string(),
        subreddit: subreddit.to_string(),
        author: "someone".to_string(),
        url: format!("https://www.reddit.com/r/{}/comments/{}/", subreddit, id),
        score: 3,
        num_comments: 1,
        created_at: morning().with_timezone(&Utc) - Duration::hours(1),
    }
}

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        base_delay_ms: 1,
        max_delay_ms: 5,
        backoff_multiplier: 2.0,
        jitter_factor: 0.0,
    }
}

pub fn keywords(primary: &[&str], secondary: &[&str], chunk: usize) -> Arc<KeywordSet> {
    let rules = RuleSettings::default();
    Arc::new(KeywordSet::new(
        primary.iter().map(|s| s.to_string()).collect(),
        secondary.iter().map(|s| s.to_string()).collect(),
        CompetitorCatalogue::from_specs(&rules.competitors),
        chunk,
    ))
}

pub struct Harness {
    pub dir: TempDir,
    pub shared: SharedState,
    pub source: Arc<FakeSource>,
    pub sink: Arc<RecordingSink>,
    pub keywords: Arc<KeywordSet>,
    pub shutdown: watch::Sender<bool>,
    pub scheduler: Scheduler,
}

/// A scheduler over `shared` with the settings every scan test uses.
pub fn scheduler(
    source: Arc<dyn PostSource>,
    sink: Arc<dyn AlertSink>,
    keywords: Arc<KeywordSet>,
    shared: SharedState,
    shutdown: watch::Receiver<bool>,
) -> Scheduler {
    Scheduler::new(
        source,
        sink,
        keywords,
        Arc::new(Classifier::from_rules(&RuleSettings::default()).unwrap()),
        shared,
        ScanSettings {
            interval_secs: 1,
            fetch_batch_size: 2,
            ..ScanSettings::default()
        },
        fast_retry(),
        shutdown,
    )
    .unwrap()
}

impl Harness {
    pub fn new(posts: Vec<Post>, keywords: Arc<KeywordSet>) -> Self {
        Self::open(tempfile::tempdir().unwrap(), posts, keywords)
    }

    /// Load whatever state `dir` already holds, like a restarted process.
    pub fn open(dir: TempDir, posts: Vec<Post>, keywords: Arc<KeywordSet>) -> Self {
        let shared = SharedState::open(&StatePaths::new(dir.path()), morning().date_naive());
        let source = Arc::new(FakeSource::with_posts(posts));
        let sink = Arc::new(RecordingSink::default());
        let (shutdown, shutdown_rx) = watch::channel(false);

        let scheduler = scheduler(
            source.clone(),
            sink.clone(),
            keywords.clone(),
            shared.clone(),
            shutdown_rx,
        );

        Self {
            dir,
            shared,
            source,
            sink,
            keywords,
            shutdown,
            scheduler,
        }
    }

    pub fn handler(&self) -> CommandHandler {
        CommandHandler::new(self.shared.clone(), self.keywords.clone(), 5)
    }
}
