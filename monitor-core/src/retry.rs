use crate::{CoreError, ErrorExt};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000, // 1 second
            max_delay_ms: 30000, // 30 seconds
            backoff_multiplier: 2.0,
            jitter_factor: 0.1, // 10% jitter
        }
    }
}

impl RetryConfig {
    /// Retry config tuned for Telegram sends, which must stay short
    pub fn telegram() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// Retry strategy based on error type
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff
    Retry,
    /// Retry after the delay the remote asked for
    RetryWithDelay(Duration),
    /// Don't retry (for permanent failures)
    NoRetry,
}

/// Determine retry strategy based on error type
pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    if !error.is_retryable() {
        return RetryStrategy::NoRetry;
    }
    match error.retry_after() {
        Some(delay) => RetryStrategy::RetryWithDelay(delay),
        None => RetryStrategy::Retry,
    }
}

/// Calculate delay with exponential backoff and jitter
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let max_delay = Duration::from_millis(config.max_delay_ms);

    let multiplier = config.backoff_multiplier.powi(attempt.min(31) as i32);
    let delay_ms = (config.base_delay_ms as f64 * multiplier).min(config.max_delay_ms as f64) as u64;
    let exponential_delay = Duration::from_millis(delay_ms);

    // Add jitter to prevent thundering herd
    let jitter_range = (exponential_delay.as_millis() as f64 * config.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);
    let final_delay = exponential_delay + Duration::from_millis(jitter);

    final_delay.min(max_delay)
}

/// Retry metrics for monitoring
#[derive(Debug, Clone, Default)]
pub struct RetryMetrics {
    pub total_retries: u64,
    pub successful_retries: u64,
    pub failed_operations: u64,
}

/// Retry executor that wraps operations with retry logic
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    metrics: Arc<Mutex<RetryMetrics>>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(Mutex::new(RetryMetrics::default())),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic. The last error is returned
    /// unchanged once attempts run out or the error is permanent.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        self.update_metrics(|m| {
                            m.total_retries += attempt as u64;
                            m.successful_retries += 1;
                        });
                        info!(
                            operation = operation_name,
                            retries = attempt,
                            "Operation succeeded after retrying"
                        );
                    }
                    return Ok(result);
                }
                Err(error) => {
                    attempt += 1;
                    let strategy = get_retry_strategy(&error);

                    let delay = match strategy {
                        RetryStrategy::NoRetry => None,
                        _ if attempt >= max_attempts => None,
                        RetryStrategy::Retry => Some(calculate_delay(attempt - 1, &self.config)),
                        RetryStrategy::RetryWithDelay(d) => {
                            Some(d.min(Duration::from_millis(self.config.max_delay_ms)))
                        }
                    };

                    match delay {
                        Some(delay) => {
                            warn!(
                                operation = operation_name,
                                attempt,
                                max_attempts,
                                delay_ms = delay.as_millis() as u64,
                                error = %error,
                                "Attempt failed, retrying"
                            );
                            sleep(delay).await;
                        }
                        None => {
                            if strategy == RetryStrategy::NoRetry {
                                debug!(
                                    operation = operation_name,
                                    error = %error,
                                    "Not retrying permanent error"
                                );
                            }
                            self.update_metrics(|m| {
                                m.total_retries += (attempt - 1) as u64;
                                m.failed_operations += 1;
                            });
                            warn!(
                                operation = operation_name,
                                attempts = attempt,
                                error = %error,
                                "Operation failed"
                            );
                            return Err(error);
                        }
                    }
                }
            }
        }
    }

    /// Get current retry metrics
    pub fn get_metrics(&self) -> RetryMetrics {
        match self.metrics.lock() {
            Ok(metrics) => metrics.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update_metrics(&self, f: impl FnOnce(&mut RetryMetrics)) {
        match self.metrics.lock() {
            Ok(mut metrics) => f(&mut metrics),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}
