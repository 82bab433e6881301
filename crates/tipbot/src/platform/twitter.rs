//! X (Twitter) API v2 client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::oauth::{OAuthSigner, TwitterCredentials};
use super::{Platform, PlatformError, PostReceipt};
use crate::history::content_hash;

const DEFAULT_BASE_URL: &str = "https://api.twitter.com";

/// Longest error body kept in a [`PlatformError`] message.
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
    text: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CreateTweetResponse {
    data: TweetData,
}

#[derive(Debug, Deserialize)]
struct UserTimelineResponse {
    #[serde(default)]
    data: Vec<TweetData>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    data: UserData,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Client for the X API v2 with OAuth 1.0a user-context auth.
pub struct TwitterClient {
    client: Client,
    base_url: String,
    signer: OAuthSigner,
    lookup_limit: u32,
}

impl TwitterClient {
    /// Create a client. `client` should carry the request timeout.
    pub fn new(credentials: TwitterCredentials, client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            signer: OAuthSigner::new(credentials),
            lookup_limit: 10,
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Number of recent posts scanned by [`Platform::find_recent_post`].
    pub fn with_lookup_limit(mut self, limit: u32) -> Self {
        self.lookup_limit = limit;
        self
    }

    /// Send a signed request and return the body of a 2xx response.
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<(StatusCode, String), PlatformError> {
        let url = format!("{}{path}", self.base_url);
        let auth = self
            .signer
            .authorization(method.as_str(), &url, query)
            .map_err(|e| PlatformError::permanent(format!("failed to sign request: {e}")))?;

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(AUTHORIZATION, auth);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        tracing::debug!(%method, path, "Calling X API");

        let response = request.send().await.map_err(|e| classify_send_error(&e))?;
        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await.map_err(|e| {
            PlatformError::ambiguous(format!("failed to read response body: {e}"))
        })?;

        if !status.is_success() {
            return Err(status_error(status, &headers, &text));
        }
        Ok((status, text))
    }

    async fn me(&self) -> Result<UserData, PlatformError> {
        let (_, body) = self.send(Method::GET, "/2/users/me", &[], None).await?;
        let user: UserResponse = serde_json::from_str(&body).map_err(|e| {
            PlatformError::permanent(format!("unexpected /2/users/me response: {e}"))
        })?;
        Ok(user.data)
    }
}

#[async_trait]
impl Platform for TwitterClient {
    fn name(&self) -> &'static str {
        "twitter"
    }

    async fn post(&self, text: &str) -> Result<PostReceipt, PlatformError> {
        let (status, body) = self
            .send(Method::POST, "/2/tweets", &[], Some(json!({ "text": text })))
            .await?;

        // The post exists once the API answered 2xx, even if we cannot read the id.
        let created: CreateTweetResponse = serde_json::from_str(&body).map_err(|e| {
            PlatformError::ambiguous(format!("HTTP {status} with unreadable body: {e}"))
        })?;

        tracing::info!(id = %created.data.id, "Posted to X");
        Ok(PostReceipt {
            platform_post_id: created.data.id,
            posted_at: Utc::now(),
        })
    }

    async fn find_recent_post(&self, text: &str) -> Result<Option<PostReceipt>, PlatformError> {
        let user = self.me().await?;
        let limit = self.lookup_limit.to_string();
        let (_, body) = self
            .send(
                Method::GET,
                &format!("/2/users/{}/tweets", user.id),
                &[("max_results", limit.as_str()), ("tweet.fields", "created_at")],
                None,
            )
            .await?;

        let timeline: UserTimelineResponse = serde_json::from_str(&body).map_err(|e| {
            PlatformError::transient(format!("unexpected timeline response: {e}"))
        })?;

        let wanted = content_hash(text);
        let found = timeline
            .data
            .into_iter()
            .find(|tweet| content_hash(&unescape_entities(&tweet.text)) == wanted)
            .map(|tweet| PostReceipt {
                platform_post_id: tweet.id,
                posted_at: tweet.created_at.unwrap_or_else(Utc::now),
            });

        tracing::debug!(found = found.is_some(), "Looked up recent posts");
        Ok(found)
    }

    async fn verify_credentials(&self) -> Result<String, PlatformError> {
        let user = self.me().await?;
        Ok(format!("@{}", user.username))
    }
}

/// Transport failures before any response status was seen.
fn classify_send_error(err: &reqwest::Error) -> PlatformError {
    if err.is_connect() {
        PlatformError::transient(format!("connection failed: {err}"))
    } else if err.is_timeout() {
        PlatformError::transient(format!("request timed out: {err}"))
    } else if err.is_builder() {
        PlatformError::permanent(format!("invalid request: {err}"))
    } else {
        PlatformError::ambiguous(format!("request interrupted: {err}"))
    }
}

/// Map a non-2xx response to a classified error.
fn status_error(status: StatusCode, headers: &HeaderMap, body: &str) -> PlatformError {
    let message = format!("HTTP {}: {}", status.as_u16(), error_message(body));

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = retry_after(headers, Utc::now());
        tracing::warn!(retry_after_secs = ?retry_after.map(|d| d.as_secs()), "Rate limited by X");
        PlatformError::transient(message).with_retry_after(retry_after)
    } else if status.is_server_error() {
        PlatformError::transient(message)
    } else {
        PlatformError::permanent(message)
    }
}

/// `retry-after` seconds, falling back to the `x-rate-limit-reset` epoch.
fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };

    if let Some(secs) = header("retry-after") {
        return Some(Duration::from_secs(secs.max(0) as u64));
    }
    header("x-rate-limit-reset").map(|reset| {
        let seconds_until_reset = (reset - now.timestamp()).max(0) as u64;
        Duration::from_secs(seconds_until_reset)
    })
}

fn error_message(body: &str) -> String {
    if let Ok(err) = serde_json::from_str::<ApiErrorResponse>(body) {
        if let Some(detail) = err.detail.or(err.title) {
            return detail;
        }
    }
    body.chars().take(MAX_ERROR_BODY).collect()
}

/// The API returns `&`, `<` and `>` HTML-escaped in post text.
fn unescape_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
