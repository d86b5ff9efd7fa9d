//! Wiring helpers: build a controller from configuration
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


use crate::controller::KeyRingController;
use crate::credentials::{IamTokenProvider, StaticToken, TokenProvider};
use crate::endpoint::EndpointResolver;
use crate::error::{KeyRingError, KeyRingResult};
use crate::keyprotect::KeyProtectClient;
use crate::metadata::ResourceControllerClient;
use kms_config::KmsConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Shared HTTP client with the configured timeout
pub fn http_client(config: &KmsConfig) -> KeyRingResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Pick a token source: API key first, then a pre-acquired access token
pub fn token_provider(
    config: &KmsConfig,
    client: reqwest::Client,
) -> KeyRingResult<Arc<dyn TokenProvider>> {
    if let Some(api_key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
        info!(iam_url = %config.iam_url, "Using IAM API key credentials");
        return Ok(Arc::new(IamTokenProvider::new(api_key, &config.iam_url, client)));
    }

    if let Some(token) = config.access_token.as_deref().filter(|t| !t.is_empty()) {
        warn!("Using a static access token; it will not be refreshed");
        return Ok(Arc::new(StaticToken::new(token)));
    }

    Err(KeyRingError::Configuration(
        "set KMS_KEYRING_API_KEY or KMS_KEYRING_ACCESS_TOKEN".to_string(),
    ))
}

/// Build a controller backed by the resource controller and KMS HTTP APIs
pub fn init_controller(config: &KmsConfig) -> KeyRingResult<KeyRingController> {
    let client = http_client(config)?;
    let tokens = token_provider(config, client.clone())?;

    let metadata = Arc::new(ResourceControllerClient::new(
        &config.resource_controller_url,
        client.clone(),
        tokens.clone(),
    ));
    let kms = Arc::new(KeyProtectClient::new(client, tokens));

    if let Some(url) = &config.endpoint_override {
        warn!(url = %url, "KMS endpoint override is set, instance endpoints are ignored");
    }

    Ok(KeyRingController::new(metadata, kms)
        .with_resolver(EndpointResolver::new(config.endpoint_override.clone()))
        .with_prepare_before_create(config.prepare_before_create)
        .with_verify_read_membership(config.verify_read_membership))
}
