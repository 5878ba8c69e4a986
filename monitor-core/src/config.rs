//! Monitor configuration.
//!
//! Secrets and deployment paths come from the environment (a `.env` file is
//! honoured). Tuning knobs, rule tables and the competitor catalogue live in
//! an optional TOML file pointed to by `MONITOR_CONFIG`.

use crate::retry::RetryConfig;
use crate::ConfigError;
use chrono::NaiveTime;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_FILE: &str = "monitor.toml";
pub const DEFAULT_KEYWORD_FILE: &str = "keywords.csv";
pub const DEFAULT_USER_AGENT: &str = "opportunity-monitor/1.0";

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub reddit: RedditSettings,
    pub telegram: Option<TelegramSettings>,
    pub keyword_file: PathBuf,
    pub state_dir: PathBuf,
    pub log_level: String,
    pub scan: ScanSettings,
    pub rules: RuleSettings,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone)]
pub struct RedditSettings {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
    pub tuning: RedditTuning,
}

#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: String,
    pub tuning: TelegramTuning,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedditTuning {
    /// Posts requested per keyword search
    pub search_limit: u32,
    pub requests_per_minute: u32,
    pub burst_allowance: u32,
}

impl Default for RedditTuning {
    fn default() -> Self {
        Self {
            search_limit: 15,
            requests_per_minute: 100,
            burst_allowance: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramTuning {
    pub send_min_interval_ms: u64,
    pub poll_timeout_secs: u64,
}

impl Default for TelegramTuning {
    fn default() -> Self {
        Self {
            send_min_interval_ms: 2000,
            poll_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub interval_secs: u64,
    pub secondary_chunk_size: usize,
    /// Used when the keyword file has no priority column
    pub primary_keyword_count: usize,
    /// Keywords per external search call
    pub fetch_batch_size: usize,
    pub max_post_age_hours: i64,
    pub fetch_timeout_secs: u64,
    pub send_timeout_secs: u64,
    /// Local wall-clock time of the daily report, `HH:MM`
    pub daily_report_time: String,
    pub report_top_n: usize,
    /// Upper bound on the extra wait after ticks whose fetches all failed
    pub max_failure_backoff_secs: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            interval_secs: 120,
            secondary_chunk_size: 20,
            primary_keyword_count: 10,
            fetch_batch_size: 5,
            max_post_age_hours: 24,
            fetch_timeout_secs: 45,
            send_timeout_secs: 10,
            daily_report_time: "09:30".to_string(),
            report_top_n: 5,
            max_failure_backoff_secs: 600,
        }
    }
}

impl ScanSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn report_time(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(self.daily_report_time.trim(), "%H:%M").map_err(|_| {
            ConfigError::InvalidValue {
                field: "scan.daily_report_time".to_string(),
                value: self.daily_report_time.clone(),
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompetitorRegion {
    International,
    Indian,
    Dex,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompetitorSpec {
    pub name: String,
    pub region: CompetitorRegion,
    /// Official community names besides the normalised competitor name
    #[serde(default)]
    pub communities: Vec<String>,
}

impl CompetitorSpec {
    fn new(name: &str, region: CompetitorRegion, communities: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            region,
            communities: communities.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuleSettings {
    pub india_subreddits: Vec<String>,
    /// Word-boundary terms that mark text as India-relevant
    pub india_keywords: Vec<String>,
    /// Regexes applied to subreddit and author names
    pub india_name_patterns: Vec<String>,
    /// Added to the built-in spam rules
    pub extra_spam_patterns: Vec<String>,
    pub competitors: Vec<CompetitorSpec>,
}

impl Default for RuleSettings {
    fn default() -> Self {
        use CompetitorRegion::*;

        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            india_subreddits: strings(&[
                "CryptoIndia",
                "IndiaInvestments",
                "IndianStreetBets",
                "IndianStockMarket",
                "BitcoinIndia",
                "IndiaCrypto",
                "CryptoCurrencyIndia",
                "personalfinanceindia",
                "india",
                "bangalore",
                "mumbai",
                "delhi",
            ]),
            india_keywords: strings(&[
                "india", "indian", "inr", "rupee", "rupees", "delhi", "mumbai", "bangalore",
                "bengaluru", "kolkata", "chennai", "hyderabad", "pune", "wazirx", "coindcx",
                "zebpay", "coinswitch", "mudrex", "unocoin", "bitbns", "sebi", "rbi",
            ]),
            india_name_patterns: strings(&[r"(?i)india", r"(?i)bharat", r"(?i)desi"]),
            extra_spam_patterns: Vec::new(),
            competitors: vec![
                CompetitorSpec::new("Binance", International, &["binance", "binanceus"]),
                CompetitorSpec::new("Coinbase", International, &[]),
                CompetitorSpec::new("Kraken", International, &["krakenfx", "krakensupport"]),
                CompetitorSpec::new("Crypto.com", International, &["crypto_com", "cryptocomofficial"]),
                CompetitorSpec::new("Gemini", International, &["geminidotcom"]),
                CompetitorSpec::new("KuCoin", International, &[]),
                CompetitorSpec::new("OKX", International, &["okx_official"]),
                CompetitorSpec::new("Bybit", International, &["bybit_official"]),
                CompetitorSpec::new("MEXC", International, &["mexc_official"]),
                CompetitorSpec::new("Uphold", International, &[]),
                CompetitorSpec::new("Bitfinex", International, &[]),
                CompetitorSpec::new("Bitmart", International, &[]),
                CompetitorSpec::new("Bitstamp", International, &[]),
                CompetitorSpec::new("CoinDCX", Indian, &[]),
                CompetitorSpec::new("Mudrex", Indian, &[]),
                CompetitorSpec::new("CoinSwitch", Indian, &["coinswitchkuber"]),
                CompetitorSpec::new("ZebPay", Indian, &[]),
                CompetitorSpec::new("Unocoin", Indian, &[]),
                CompetitorSpec::new("Bitbns", Indian, &[]),
                CompetitorSpec::new("WazirX", Indian, &["wazirxindia"]),
                CompetitorSpec::new("Uniswap", Dex, &[]),
                CompetitorSpec::new("PancakeSwap", Dex, &[]),
                CompetitorSpec::new("dYdX", Dex, &[]),
                CompetitorSpec::new("Curve Finance", Dex, &["curvefi"]),
                CompetitorSpec::new("DODO", Dex, &["dodoex"]),
                CompetitorSpec::new("KyberSwap", Dex, &["kybernetwork"]),
            ],
        }
    }
}

/// Shape of the optional TOML file. Every field may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub keyword_file: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub reddit: RedditTuning,
    pub telegram: TelegramTuning,
    pub scan: ScanSettings,
    pub rules: RuleSettings,
    pub retry: RetryConfig,
}

impl FileConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// A missing file is not an error; the defaults apply.
    pub fn load_optional(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                info!(path = %path.display(), "Loaded configuration file");
                Self::from_toml(&content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::InvalidFormat {
                details: format!("{}: {}", path.display(), e),
            }),
        }
    }
}

impl MonitorConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config_path = std::env::var("MONITOR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        let file = FileConfig::load_optional(&config_path)?;

        let config = Self::from_parts(file, |key| std::env::var(key).ok())?;
        config.log_redacted();
        Ok(config)
    }

    /// Merge the file layer with environment lookups. `env` returns `None` for unset variables.
    pub fn from_parts<F>(file: FileConfig, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            env(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                    var_name: name.to_string(),
                })
        };

        let reddit = RedditSettings {
            client_id: required("REDDIT_CLIENT_ID")?,
            client_secret: required("REDDIT_CLIENT_SECRET")?,
            user_agent: env("REDDIT_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            tuning: file.reddit,
        };

        let telegram = match (env("TELEGRAM_BOT_TOKEN"), env("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) if !bot_token.is_empty() && !chat_id.is_empty() => {
                Some(TelegramSettings {
                    bot_token,
                    chat_id,
                    tuning: file.telegram,
                })
            }
            _ => {
                warn!("Telegram credentials not found, alerts will only be logged");
                None
            }
        };

        let mut scan = file.scan;
        if let Some(interval) = env("SCAN_INTERVAL_SECS") {
            scan.interval_secs = interval.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "SCAN_INTERVAL_SECS".to_string(),
                value: interval.clone(),
            })?;
        }

        let config = Self {
            reddit,
            telegram,
            keyword_file: env("KEYWORD_CSV_PATH")
                .map(PathBuf::from)
                .or(file.keyword_file)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_KEYWORD_FILE)),
            state_dir: env("STATE_DIR")
                .map(PathBuf::from)
                .or(file.state_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            log_level: env("LOG_LEVEL")
                .or(file.log_level)
                .unwrap_or_else(|| "info".to_string()),
            scan,
            rules: file.rules,
            retry: file.retry,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("scan.interval_secs", self.scan.interval_secs as usize),
            ("scan.secondary_chunk_size", self.scan.secondary_chunk_size),
            ("scan.fetch_batch_size", self.scan.fetch_batch_size),
            ("scan.fetch_timeout_secs", self.scan.fetch_timeout_secs as usize),
            ("scan.send_timeout_secs", self.scan.send_timeout_secs as usize),
            ("retry.max_attempts", self.retry.max_attempts as usize),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::ValidationFailed {
                    reason: format!("{} must be greater than zero", field),
                });
            }
        }
        if self.scan.max_post_age_hours <= 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "scan.max_post_age_hours must be greater than zero".to_string(),
            });
        }
        self.scan.report_time()?;
        Ok(())
    }

    pub fn log_redacted(&self) {
        fn preview(val: &str) -> String {
            format!("{}...", val.chars().take(4).collect::<String>())
        }

        info!(
            reddit_client_id = %preview(&self.reddit.client_id),
            user_agent = %self.reddit.user_agent,
            telegram = self.telegram.is_some(),
            keyword_file = %self.keyword_file.display(),
            state_dir = %self.state_dir.display(),
            scan_interval_secs = self.scan.interval_secs,
            secondary_chunk_size = self.scan.secondary_chunk_size,
            "Configuration loaded"
        );
    }
}
