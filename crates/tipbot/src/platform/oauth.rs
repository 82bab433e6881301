//! OAuth 1.0a user-context request signing (HMAC-SHA1).

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use uuid::Uuid;

use crate::errors::{ConfigError, ConfigResult};

type HmacSha1 = Hmac<Sha1>;

/// App and user tokens for the X API.
#[derive(Clone, PartialEq, Eq)]
pub struct TwitterCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl fmt::Debug for TwitterCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwitterCredentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("access_token", &self.access_token)
            .field("access_token_secret", &"<redacted>")
            .finish()
    }
}

impl TwitterCredentials {
    /// Read `TWITTER_API_KEY`, `TWITTER_API_SECRET`, `TWITTER_ACCESS_TOKEN`
    /// and `TWITTER_ACCESS_TOKEN_SECRET`.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let get = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingEnv { name })
        };

        Ok(Self {
            consumer_key: get("TWITTER_API_KEY")?,
            consumer_secret: get("TWITTER_API_SECRET")?,
            access_token: get("TWITTER_ACCESS_TOKEN")?,
            access_token_secret: get("TWITTER_ACCESS_TOKEN_SECRET")?,
        })
    }
}

/// Signs requests with a fixed set of credentials.
#[derive(Debug, Clone)]
pub struct OAuthSigner {
    credentials: TwitterCredentials,
}

impl OAuthSigner {
    pub fn new(credentials: TwitterCredentials) -> Self {
        Self { credentials }
    }

    /// `Authorization` header value for a request.
    ///
    /// `params` are the query (or form) parameters that take part in the
    /// signature. JSON bodies are not signed.
    pub fn authorization(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<String, InvalidLength> {
        let nonce = Uuid::new_v4().simple().to_string();
        let timestamp = Utc::now().timestamp().to_string();
        self.authorization_with(method, url, params, &nonce, &timestamp)
    }

    fn authorization_with(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
        nonce: &str,
        timestamp: &str,
    ) -> Result<String, InvalidLength> {
        let oauth = self.oauth_params(nonce, timestamp);
        let signature = self.signature(method, url, &oauth, params)?;

        let header = oauth
            .iter()
            .copied()
            .chain(std::iter::once(("oauth_signature", signature.as_str())))
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("OAuth {header}"))
    }

    fn oauth_params<'a>(&'a self, nonce: &'a str, timestamp: &'a str) -> [(&'a str, &'a str); 6] {
        [
            ("oauth_consumer_key", self.credentials.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp),
            ("oauth_token", self.credentials.access_token.as_str()),
            ("oauth_version", "1.0"),
        ]
    }

    fn signature(
        &self,
        method: &str,
        url: &str,
        oauth: &[(&str, &str)],
        params: &[(&str, &str)],
    ) -> Result<String, InvalidLength> {
        let mut pairs: Vec<(String, String)> = oauth
            .iter()
            .chain(params)
            .map(|(k, v)| (encode(k), encode(v)))
            .collect();
        pairs.sort();

        let param_string = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let base = format!(
            "{}&{}&{}",
            method.to_uppercase(),
            encode(url),
            encode(&param_string)
        );
        let key = format!(
            "{}&{}",
            encode(&self.credentials.consumer_secret),
            encode(&self.credentials.access_token_secret)
        );

        let mut mac = HmacSha1::new_from_slice(key.as_bytes())?;
        mac.update(base.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

/// RFC 3986 percent-encoding: everything but unreserved characters.
fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
