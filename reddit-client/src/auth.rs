//! Application-only OAuth2 (client credentials) with a cached bearer token.

use monitor_core::{CoreError, RedditApiError};
use oauth2::basic::{BasicClient, BasicErrorResponse};
use oauth2::{
    AuthType, AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, RequestTokenError,
    TokenResponse, TokenUrl,
};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

const AUTHORIZE_URL: &str = "https://www.reddit.com/api/v1/authorize";
const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Tokens are refreshed this long before Reddit would reject them.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub secret: String,
    pub expires_at: Instant,
}

impl AccessToken {
    pub fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

#[derive(Debug)]
pub struct TokenManager {
    oauth: BasicClient,
    http_client: reqwest::Client,
    cached: Mutex<Option<AccessToken>>,
}

/// Route the token exchange through our own client so Reddit sees the
/// configured user agent.
async fn send_token_request(
    http_client: reqwest::Client,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let response = http_client
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}

fn map_token_error(err: RequestTokenError<reqwest::Error, BasicErrorResponse>) -> CoreError {
    match err {
        RequestTokenError::ServerResponse(response) => {
            CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                reason: response.error().to_string(),
            })
        }
        RequestTokenError::Request(e) if e.is_timeout() => {
            CoreError::RedditApi(RedditApiError::RequestTimeout)
        }
        RequestTokenError::Request(e) => CoreError::Network(e),
        RequestTokenError::Parse(e, _) => CoreError::RedditApi(RedditApiError::InvalidResponse {
            details: format!("token response: {}", e),
        }),
        RequestTokenError::Other(reason) => {
            CoreError::RedditApi(RedditApiError::AuthenticationFailed { reason })
        }
    }
}

impl TokenManager {
    pub fn new(credentials: &RedditCredentials, http_client: reqwest::Client) -> Result<Self, CoreError> {
        let invalid_url = |e: oauth2::url::ParseError| CoreError::Internal {
            message: format!("invalid OAuth endpoint: {}", e),
        };

        let oauth = BasicClient::new(
            ClientId::new(credentials.client_id.clone()),
            Some(ClientSecret::new(credentials.client_secret.clone())),
            AuthUrl::new(AUTHORIZE_URL.to_string()).map_err(invalid_url)?,
            Some(TokenUrl::new(TOKEN_URL.to_string()).map_err(invalid_url)?),
        )
        .set_auth_type(AuthType::BasicAuth);

        Ok(Self {
            oauth,
            http_client,
            cached: Mutex::new(None),
        })
    }

    /// A valid bearer token, fetching a new one when the cached token is stale.
    pub async fn access_token(&self) -> Result<String, CoreError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.secret.clone());
        }

        debug!("Requesting Reddit access token");
        let http_client = self.http_client.clone();
        let response = self
            .oauth
            .exchange_client_credentials()
            .request_async(|request| send_token_request(http_client, request))
            .await
            .map_err(map_token_error)?;

        let lifetime = response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let token = AccessToken {
            secret: response.access_token().secret().clone(),
            expires_at: Instant::now() + lifetime,
        };
        info!(expires_in_secs = lifetime.as_secs(), "Obtained Reddit access token");

        let secret = token.secret.clone();
        *cached = Some(token);
        Ok(secret)
    }

    /// Drop the cached token so the next call re-authenticates.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    #[cfg(test)]
    pub(crate) async fn set_token(&self, token: AccessToken) {
        *self.cached.lock().await = Some(token);
    }

    #[cfg(test)]
    pub(crate) async fn has_fresh_token(&self) -> bool {
        self.cached
            .lock()
            .await
            .as_ref()
            .is_some_and(AccessToken::is_fresh)
    }
}
