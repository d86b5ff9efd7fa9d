//! KMS control-plane interface for key rings
//!
//! Implemented by:
//! - `KeyProtectClient` (HTTP, the KMS `api/v2/key_rings` resource)
//! - in-memory fakes in tests
//!
//! Every call takes a `KmsTarget` so that no endpoint or instance id is ever
//! stored on a shared client.
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


use crate::error::RemoteError;
use crate::key_types::KeyRingSummary;
use async_trait::async_trait;

/// Immutable per-call client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmsTarget {
    pub base_url: String,
    pub instance_id: String,
}

impl KmsTarget {
    pub fn new(base_url: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            instance_id: instance_id.into(),
        }
    }

    /// `{base_url}/api/v2/key_rings`
    pub fn key_rings_url(&self) -> String {
        format!("{}/api/v2/key_rings", self.base_url)
    }

    /// `{base_url}/api/v2/key_rings/{key_ring_id}`
    pub fn key_ring_url(&self, key_ring_id: &str) -> String {
        format!("{}/{}", self.key_rings_url(), key_ring_id)
    }
}

/// Trait for key ring control-plane backends
#[async_trait]
pub trait KeyRingApi: Send + Sync {
    /// Best-effort request sent ahead of `create_key_ring`. Only transport
    /// failures are reported; the response is discarded.
    async fn prepare_key_ring(&self, target: &KmsTarget, key_ring_id: &str) -> Result<(), RemoteError>;

    /// Create a key ring. Returns nothing on success.
    async fn create_key_ring(&self, target: &KmsTarget, key_ring_id: &str) -> Result<(), RemoteError>;

    /// List all key rings of the instance
    async fn list_key_rings(&self, target: &KmsTarget) -> Result<Vec<KeyRingSummary>, RemoteError>;

    /// Delete a key ring by id
    async fn delete_key_ring(&self, target: &KmsTarget, key_ring_id: &str) -> Result<(), RemoteError>;
}
