use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A post fetched from the discussion platform. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub body: String,
    pub subreddit: String,
    pub author: String,
    pub url: String,
    pub score: i64,
    pub num_comments: u64,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Title and body joined the way matching sees them.
    pub fn text(&self) -> String {
        if self.body.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.body)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordPriority {
    Primary,
    Secondary,
}

/// Outcome of running one post through the classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationResult {
    pub matched_primary: BTreeSet<String>,
    pub matched_secondary: BTreeSet<String>,
    pub matched_competitors: BTreeSet<String>,
    pub is_spam: bool,
    pub is_india_relevant: bool,
    /// Name of the competitor whose official community the post was made in.
    pub competitor_community: Option<String>,
}

impl ClassificationResult {
    pub fn has_match(&self) -> bool {
        !self.matched_primary.is_empty()
            || !self.matched_secondary.is_empty()
            || !self.matched_competitors.is_empty()
    }

    pub fn priority(&self) -> KeywordPriority {
        if self.matched_primary.is_empty() {
            KeywordPriority::Secondary
        } else {
            KeywordPriority::Primary
        }
    }

    /// Primary matches first, then secondary, each in sorted order.
    pub fn matched_keywords(&self) -> Vec<&str> {
        self.matched_primary
            .iter()
            .chain(self.matched_secondary.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn is_opportunity(&self) -> bool {
        !self.is_spam && self.competitor_community.is_none() && self.has_match()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    India,
    #[default]
    Global,
}

impl fmt::Display for ReportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportMode::India => write!(f, "india"),
            ReportMode::Global => write!(f, "global"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Paused,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Running => write!(f, "running"),
            RunState::Paused => write!(f, "paused"),
        }
    }
}

/// Operator command as typed into the chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Status,
    India,
    Global,
    Help,
    Unknown(String),
}

impl Command {
    /// Accepts `/stop`, `stop`, `/STOP` and `/stop@SomeBot`.
    pub fn parse(text: &str) -> Self {
        let raw = text.trim();
        let word = raw.split_whitespace().next().unwrap_or("");
        let word = word.strip_prefix('/').unwrap_or(word);
        let word = word.split('@').next().unwrap_or("").to_lowercase();

        match word.as_str() {
            "start" => Command::Start,
            "stop" => Command::Stop,
            "status" => Command::Status,
            "india" => Command::India,
            "global" => Command::Global,
            "help" | "commands" => Command::Help,
            _ => Command::Unknown(raw.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Status => "status",
            Command::India => "india",
            Command::Global => "global",
            Command::Help => "help",
            Command::Unknown(_) => "unknown",
        }
    }
}

/// A command delivered by the command source, already filtered to the operator chat.
#[derive(Debug, Clone)]
pub struct InboundCommand {
    pub text: String,
    pub received_at: DateTime<Utc>,
}
