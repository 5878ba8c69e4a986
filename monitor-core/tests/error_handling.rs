use monitor_core::{
    ConfigError, CoreError, ErrorExt, RedditApiError, StateError, TelegramError,
};
use std::time::Duration;

#[test]
fn test_error_codes() {
    let reddit_error = CoreError::RedditApi(RedditApiError::InvalidToken);
    assert_eq!(reddit_error.error_code(), "REDDIT_API");

    let telegram_error = CoreError::Telegram(TelegramError::Unauthorized);
    assert_eq!(telegram_error.error_code(), "TELEGRAM");

    let state_error = CoreError::State(StateError::Corrupt {
        path: "seen_posts.json".to_string(),
        reason: "expected value at line 1".to_string(),
    });
    assert_eq!(state_error.error_code(), "STATE");

    let config_error = CoreError::Config(ConfigError::MissingEnvironmentVariable {
        var_name: "TELEGRAM_CHAT_ID".to_string(),
    });
    assert_eq!(config_error.error_code(), "CONFIG");

    // Inner errors carry their own, more specific codes
    assert_eq!(TelegramError::Conflict.error_code(), "TELEGRAM_CONFLICT");
    assert_eq!(
        RedditApiError::RateLimitExceeded { retry_after: 60 }.error_code(),
        "REDDIT_RATE_LIMIT"
    );
}

#[test]
fn test_only_config_errors_are_fatal() {
    let config_error = CoreError::Config(ConfigError::KeywordFile {
        path: "keywords.csv".to_string(),
        reason: "no keywords".to_string(),
    });
    assert!(config_error.is_fatal());

    assert!(!CoreError::RedditApi(RedditApiError::RequestTimeout).is_fatal());
    assert!(!CoreError::Telegram(TelegramError::Conflict).is_fatal());
    assert!(!CoreError::Timeout { seconds: 45 }.is_fatal());
}

#[test]
fn test_retryable_errors() {
    let retryable_error =
        CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: 60 });
    assert!(retryable_error.is_retryable());

    assert!(CoreError::Telegram(TelegramError::ServerError { status_code: 502 }).is_retryable());
    assert!(!CoreError::Telegram(TelegramError::Unauthorized).is_retryable());

    let non_retryable_error = CoreError::Config(ConfigError::ValidationFailed {
        reason: "interval_secs must be positive".to_string(),
    });
    assert!(!non_retryable_error.is_retryable());
}

#[test]
fn test_retry_after() {
    let rate_limit_error =
        CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: 60 });
    assert_eq!(
        rate_limit_error.retry_after(),
        Some(Duration::from_secs(60))
    );

    let throttled = CoreError::Telegram(TelegramError::RateLimited { retry_after: 7 });
    assert_eq!(throttled.retry_after(), Some(Duration::from_secs(7)));

    let timeout_error = CoreError::Timeout { seconds: 30 };
    assert_eq!(timeout_error.retry_after(), Some(Duration::from_secs(5)));
}
