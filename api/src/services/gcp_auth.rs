//! Access tokens for Google APIs from the instance metadata server.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

pub struct MetadataTokenSource {
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataTokenSource {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            cached: Mutex::new(None),
        }
    }

    /// Current token, refreshed a minute before it expires.
    pub async fn access_token(&self) -> Result<String, reqwest::Error> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() + Duration::seconds(60) {
                return Ok(token.value.clone());
            }
        }

        let resp: TokenResponse = self
            .http
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let value = resp.access_token.clone();
        *cached = Some(CachedToken {
            value: resp.access_token,
            expires_at: Utc::now() + Duration::seconds(resp.expires_in),
        });
        Ok(value)
    }
}
