use crate::rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter};
use chrono::{DateTime, TimeZone, Utc};
use monitor_core::{CoreError, Post, RedditApiError};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, warn};

const REDDIT_API_BASE: &str = "https://oauth.reddit.com";
const REDDIT_WEB_BASE: &str = "https://www.reddit.com";

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: u64,
    #[serde(default)]
    pub over_18: bool,
    #[serde(default)]
    pub stickied: bool,
}

/// Query options for a search across all subreddits.
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub sort: &'static str,
    pub time_filter: &'static str,
    pub limit: u32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            sort: "new",
            time_filter: "day",
            limit: 15,
        }
    }
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    user_agent: String,
}

impl RedditApiClient {
    pub fn new(http_client: Client, user_agent: String, rate_config: RateLimitConfig) -> Self {
        Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(rate_config)),
            user_agent,
        }
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        query_params: Option<&[(&str, &str)]>,
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", REDDIT_API_BASE, endpoint);

        let permit = self.rate_limiter.acquire_permit().await;
        debug!(
            endpoint,
            wait_ms = permit.queue_wait_time.as_millis() as u64,
            "Acquired rate limit permit"
        );

        let mut request_builder = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(access_token)
            .header("User-Agent", &self.user_agent);

        if let Some(params) = query_params {
            request_builder = request_builder.query(params);
        }

        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!(%method, endpoint, error = %e, "Network error");
                if e.is_timeout() {
                    return Err(CoreError::RedditApi(RedditApiError::RequestTimeout));
                }
                return Err(CoreError::Network(e));
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!(%status, endpoint, "Request successful");
            return Ok(response);
        }

        warn!(%status, endpoint, "Request failed");
        let err = match status.as_u16() {
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<f64>().ok())
                    .map(|secs| secs.ceil() as u64)
                    .unwrap_or(60);
                RedditApiError::RateLimitExceeded { retry_after }
            }
            401 => RedditApiError::InvalidToken,
            403 => RedditApiError::Forbidden {
                resource: endpoint.to_string(),
            },
            404 => RedditApiError::EndpointUnavailable {
                endpoint: endpoint.to_string(),
            },
            code if status.is_server_error() => RedditApiError::ServerError { status_code: code },
            code => RedditApiError::InvalidResponse {
                details: format!("unexpected status {}", code),
            },
        };
        Err(CoreError::RedditApi(err))
    }

    /// Newest posts across r/all mentioning `query`.
    pub async fn search_all(
        &self,
        access_token: &str,
        query: &str,
        params: &SearchParams,
    ) -> Result<RedditListing<RedditPostData>, CoreError> {
        let limit = params.limit.to_string();
        let query_params = [
            ("q", query),
            ("sort", params.sort),
            ("t", params.time_filter),
            ("limit", limit.as_str()),
            ("type", "link"),
            ("raw_json", "1"),
        ];

        let response = self
            .make_request(Method::GET, "/r/all/search", access_token, Some(&query_params[..]))
            .await?;

        let listing: RedditListing<RedditPostData> = response.json().await.map_err(|e| {
            error!(query, error = %e, "Failed to parse search results");
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse search results for '{}'", query),
            })
        })?;

        debug!(query, count = listing.data.children.len(), "Search returned posts");
        Ok(listing)
    }

    pub async fn get_rate_limit_status(&self) -> RateLimitStatus {
        self.rate_limiter.get_rate_limit_status().await
    }
}

fn timestamp(created_utc: f64) -> DateTime<Utc> {
    Utc.timestamp_opt(created_utc as i64, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

impl From<RedditPostData> for Post {
    fn from(post_data: RedditPostData) -> Self {
        let url = if post_data.permalink.is_empty() {
            post_data.url
        } else {
            format!("{}{}", REDDIT_WEB_BASE, post_data.permalink)
        };

        Self {
            // Prefixed so ids from other sources never collide
            id: format!("reddit_{}", post_data.id),
            title: post_data.title,
            body: post_data.selftext,
            subreddit: post_data.subreddit,
            author: post_data.author,
            url,
            score: post_data.score,
            num_comments: post_data.num_comments,
            created_at: timestamp(post_data.created_utc),
        }
    }
}
