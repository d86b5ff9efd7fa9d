//! HTTP implementation of the key ring control plane
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
use crate::error::{KmsOperation, RemoteError, RemoteStatus};
use crate::key_types::KeyRingSummary;
use crate::kms::{KeyRingApi, KmsTarget};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

const INSTANCE_HEADER: &str = "bluemix-instance";
const CORRELATION_HEADER: &str = "correlation-id";

#[derive(Deserialize)]
struct KeyRingCollection {
    #[serde(default)]
    resources: Vec<KeyRingSummary>,
}

/// Key ring client for the KMS REST API
pub struct KeyProtectClient {
    client: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

/// Error context for one call
struct CallContext<'a> {
    operation: KmsOperation,
    target: &'a KmsTarget,
    key_ring_id: Option<&'a str>,
}

impl CallContext<'_> {
    fn error(&self, status_code: Option<u16>, message: impl Into<String>) -> RemoteError {
        RemoteError {
            operation: self.operation,
            status: status_code
                .map(RemoteStatus::from_status_code)
                .unwrap_or(RemoteStatus::Other),
            status_code,
            url: self.target.base_url.clone(),
            instance_id: self.target.instance_id.clone(),
            key_ring_id: self.key_ring_id.map(str::to_string),
            message: message.into(),
        }
    }

    fn credentials_error(&self, message: String) -> RemoteError {
        RemoteError {
            status: RemoteStatus::Credentials,
            ..self.error(None, message)
        }
    }
}

impl KeyProtectClient {
    pub fn new(client: reqwest::Client, tokens: Arc<dyn TokenProvider>) -> Self {
        Self { client, tokens }
    }

    async fn request(
        &self,
        ctx: &CallContext<'_>,
        method: Method,
        url: &str,
    ) -> Result<RequestBuilder, RemoteError> {
        let token = self
            .tokens
            .bearer_token()
            .await
            .map_err(|e| ctx.credentials_error(credentials::failure_message(e)))?;
        let correlation_id = Uuid::new_v4().to_string();

        debug!(
            operation = %ctx.operation,
            url = %url,
            instance_id = %ctx.target.instance_id,
            correlation_id = %correlation_id,
            "Calling KMS"
        );

        Ok(self
            .client
            .request(method, url)
            .bearer_auth(token)
            .header(INSTANCE_HEADER, &ctx.target.instance_id)
            .header(CORRELATION_HEADER, correlation_id)
            .header("Accept", "application/json"))
    }

    async fn send(&self, ctx: &CallContext<'_>, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| ctx.error(None, format!("could not execute request: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ctx.error(Some(status.as_u16()), error_text));
        }
        Ok(response)
    }
}

#[async_trait]
impl KeyRingApi for KeyProtectClient {
    async fn prepare_key_ring(&self, target: &KmsTarget, key_ring_id: &str) -> Result<(), RemoteError> {
        let ctx = CallContext {
            operation: KmsOperation::Prepare,
            target,
            key_ring_id: Some(key_ring_id),
        };
        let url = target.key_ring_url(key_ring_id);
        let request = self.request(&ctx, Method::POST, &url).await?;

        let response = request
            .send()
            .await
            .map_err(|e| ctx.error(None, format!("could not execute request ({url}): {e}")))?;

        if !response.status().is_success() {
            warn!(
                url = %url,
                status = response.status().as_u16(),
                "Ignoring prepare response status"
            );
        }
        Ok(())
    }

    async fn create_key_ring(&self, target: &KmsTarget, key_ring_id: &str) -> Result<(), RemoteError> {
        let ctx = CallContext {
            operation: KmsOperation::Create,
            target,
            key_ring_id: Some(key_ring_id),
        };
        let url = target.key_ring_url(key_ring_id);
        let request = self.request(&ctx, Method::POST, &url).await?;
        self.send(&ctx, request).await?;
        Ok(())
    }

    async fn list_key_rings(&self, target: &KmsTarget) -> Result<Vec<KeyRingSummary>, RemoteError> {
        let ctx = CallContext {
            operation: KmsOperation::List,
            target,
            key_ring_id: None,
        };
        let url = target.key_rings_url();
        let request = self.request(&ctx, Method::GET, &url).await?;
        let response = self.send(&ctx, request).await?;

        let collection: KeyRingCollection = response
            .json()
            .await
            .map_err(|e| ctx.error(None, format!("invalid key ring listing: {e}")))?;
        Ok(collection.resources)
    }

    async fn delete_key_ring(&self, target: &KmsTarget, key_ring_id: &str) -> Result<(), RemoteError> {
        let ctx = CallContext {
            operation: KmsOperation::Delete,
            target,
            key_ring_id: Some(key_ring_id),
        };
        let url = target.key_ring_url(key_ring_id);
        let request = self.request(&ctx, Method::DELETE, &url).await?;
        self.send(&ctx, request).await?;
        Ok(())
    }
}
