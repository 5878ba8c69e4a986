pub mod api;
pub mod auth;
pub mod rate_limiter;

use api::{RedditApiClient, SearchParams};
use async_trait::async_trait;
use auth::{RedditCredentials, TokenManager};
use monitor_core::{CoreError, ErrorExt, Post, PostSource, RedditApiError, RedditTuning};
use rate_limiter::RateLimitConfig;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use auth::AccessToken;

/// Post source backed by Reddit search across r/all.
#[derive(Debug)]
pub struct RedditClient {
    api: RedditApiClient,
    tokens: TokenManager,
    search: SearchParams,
}

impl RedditClient {
    pub fn new(credentials: RedditCredentials, tuning: &RedditTuning) -> Result<Self, CoreError> {
        let http_client = reqwest::Client::builder()
            .user_agent(&credentials.user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        let tokens = TokenManager::new(&credentials, http_client.clone())?;
        let api = RedditApiClient::new(
            http_client,
            credentials.user_agent.clone(),
            RateLimitConfig::new(tuning.requests_per_minute, tuning.burst_allowance),
        );

        Ok(Self {
            api,
            tokens,
            search: SearchParams {
                limit: tuning.search_limit,
                ..SearchParams::default()
            },
        })
    }

    pub fn api(&self) -> &RedditApiClient {
        &self.api
    }

    /// Fetch a token up front so bad credentials show up at startup.
    pub async fn authenticate(&self) -> Result<(), CoreError> {
        self.tokens.access_token().await.map(|_| ())
    }

    /// One keyword search. A rejected token is refreshed once.
    pub async fn search_keyword(&self, keyword: &str) -> Result<Vec<Post>, CoreError> {
        let token = self.tokens.access_token().await?;
        let listing = match self.api.search_all(&token, keyword, &self.search).await {
            Err(CoreError::RedditApi(RedditApiError::InvalidToken)) => {
                warn!("Reddit token rejected, re-authenticating");
                self.tokens.invalidate().await;
                let token = self.tokens.access_token().await?;
                self.api.search_all(&token, keyword, &self.search).await?
            }
            other => other?,
        };

        Ok(listing
            .data
            .children
            .into_iter()
            .map(|child| child.data)
            .filter(|data| !data.stickied)
            .map(Post::from)
            .collect())
    }
}

#[async_trait]
impl PostSource for RedditClient {
    /// Searches each keyword in turn. Keyword failures are logged and skipped;
    /// the call only fails when every keyword failed.
    async fn fetch_new_posts(&self, keywords: &[String]) -> Result<Vec<Post>, CoreError> {
        let mut posts = Vec::new();
        let mut ids = HashSet::new();
        let mut last_error = None;
        let mut failures = 0usize;

        for keyword in keywords {
            match self.search_keyword(keyword).await {
                Ok(found) => {
                    debug!(keyword = %keyword, count = found.len(), "Searched keyword");
                    posts.extend(found.into_iter().filter(|p| ids.insert(p.id.clone())));
                }
                Err(e) => {
                    failures += 1;
                    e.log_warn();
                    warn!(keyword = %keyword, error_code = %e.error_code(), "Keyword search failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if failures == keywords.len() => Err(e),
            _ => {
                info!(
                    keywords = keywords.len(),
                    failures,
                    posts = posts.len(),
                    "Fetched posts"
                );
                Ok(posts)
            }
        }
    }
}
