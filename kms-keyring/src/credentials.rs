//! Bearer token sources for the resource controller and KMS APIs
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::error::{KeyRingError, KeyRingResult};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

const APIKEY_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// Tokens are refreshed this many seconds before they expire
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Source of IAM access tokens
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Access token, without the `Bearer ` prefix
    async fn bearer_token(&self) -> KeyRingResult<String>;
}

/// Message of a token failure, without the outer `Credential error:` prefix
pub(crate) fn failure_message(err: KeyRingError) -> String {
    match err {
        KeyRingError::Credentials(message) => message,
        other => other.to_string(),
    }
}

/// A token acquired elsewhere
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        let token = token
            .strip_prefix("Bearer ")
            .map(str::to_string)
            .unwrap_or(token);
        Self(token)
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn bearer_token(&self) -> KeyRingResult<String> {
        if self.0.is_empty() {
            return Err(KeyRingError::Credentials("access token is empty".to_string()));
        }
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

impl CachedToken {
    fn is_fresh(&self, now: i64) -> bool {
        now + EXPIRY_MARGIN_SECS < self.expires_at
    }
}

#[derive(Deserialize)]
struct IamTokenResponse {
    access_token: String,
    /// Unix timestamp
    expiration: i64,
}

/// Exchanges an IAM API key for access tokens
pub struct IamTokenProvider {
    api_key: String,
    iam_url: String,
    client: reqwest::Client,
    cached: RwLock<Option<CachedToken>>,
}

impl IamTokenProvider {
    pub fn new(api_key: impl Into<String>, iam_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            api_key: api_key.into(),
            iam_url: iam_url.into().trim_end_matches('/').to_string(),
            client,
            cached: RwLock::new(None),
        }
    }

    async fn request_token(&self) -> KeyRingResult<CachedToken> {
        let url = format!("{}/identity/token", self.iam_url);
        debug!(url = %url, "Requesting IAM access token");

        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .form(&[("grant_type", APIKEY_GRANT_TYPE), ("apikey", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| KeyRingError::Credentials(format!("IAM request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(KeyRingError::Credentials(format!(
                "IAM token request failed ({status}): {error_text}"
            )));
        }

        let body: IamTokenResponse = response
            .json()
            .await
            .map_err(|e| KeyRingError::Credentials(format!("invalid IAM token response: {e}")))?;

        info!(expires_at = body.expiration, "Obtained IAM access token");
        Ok(CachedToken {
            access_token: body.access_token,
            expires_at: body.expiration,
        })
    }
}

#[async_trait]
impl TokenProvider for IamTokenProvider {
    async fn bearer_token(&self) -> KeyRingResult<String> {
        let now = chrono::Utc::now().timestamp();
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
                return Ok(token.access_token.clone());
            }
        }

        let mut cached = self.cached.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.access_token.clone());
        }
        let token = self.request_token().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }
}
