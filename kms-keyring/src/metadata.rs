//! Resource instance lookup
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


use crate::credentials::{self, TokenProvider};
use crate::endpoint::Extensions;
use crate::error::MetadataError;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Instance data needed to reach its KMS API. Fetched on every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceMetadata {
    /// Full CRN, authoritative
    pub crn: String,
    pub extensions: Extensions,
}

/// Looks up a resource instance by its short id
#[async_trait]
pub trait InstanceMetadataFetcher: Send + Sync {
    async fn fetch(&self, instance_id: &str) -> Result<InstanceMetadata, MetadataError>;
}

#[derive(Deserialize)]
struct ResourceInstance {
    crn: Option<String>,
    #[serde(default)]
    extensions: Option<Extensions>,
}

/// Resource controller v2 client
pub struct ResourceControllerClient {
    base_url: String,
    client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl ResourceControllerClient {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            tokens,
        }
    }
}

#[async_trait]
impl InstanceMetadataFetcher for ResourceControllerClient {
    async fn fetch(&self, instance_id: &str) -> Result<InstanceMetadata, MetadataError> {
        let url = format!("{}/v2/resource_instances/{}", self.base_url, instance_id);
        let token = self
            .tokens
            .bearer_token()
            .await
            .map_err(|e| MetadataError::Credentials(credentials::failure_message(e)))?;

        debug!(url = %url, instance_id, "Fetching resource instance");

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| MetadataError::Transient(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(MetadataError::NotFound(instance_id.to_string()));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MetadataError::Transient(format!(
                "resource controller error ({status}): {error_text}"
            )));
        }

        let instance: ResourceInstance = response
            .json()
            .await
            .map_err(|e| MetadataError::Transient(format!("invalid resource instance body: {e}")))?;

        let crn = instance
            .crn
            .filter(|c| !c.is_empty())
            .ok_or_else(|| MetadataError::Transient(format!("instance {instance_id} has no CRN")))?;

        Ok(InstanceMetadata {
            crn,
            extensions: instance.extensions.unwrap_or_default(),
        })
    }
}
