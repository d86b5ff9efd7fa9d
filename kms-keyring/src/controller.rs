//! Key ring lifecycle: create, read and delete against the KMS control plane
//!
//! The remote API has no upsert or lookup-by-name, so Create confirms its
//! own result with a listing, and Read/Delete treat a ring that is already
//! gone as the desired state rather than a failure.
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


use crate::crn;
use crate::endpoint::{EndpointPreference, EndpointResolver, ResolvedEndpoint};
use crate::error::{KeyRingError, KeyRingResult, MetadataError};
use crate::identifier::{self, DecodedIdentifier};
use crate::key_types::{KeyRingRequest, KeyRingState, ReadOutcome};
use crate::kms::KeyRingApi;
use crate::metadata::{InstanceMetadata, InstanceMetadataFetcher};
use std::sync::Arc;
use tracing::{info, warn};

/// Orchestrates key ring operations. Holds no per-instance state, so one
/// controller can serve concurrent operations on different instances.
pub struct KeyRingController {
    metadata: Arc<dyn InstanceMetadataFetcher>,
    kms: Arc<dyn KeyRingApi>,
    resolver: EndpointResolver,
    prepare_before_create: bool,
    verify_read_membership: bool,
}

impl KeyRingController {
    pub fn new(metadata: Arc<dyn InstanceMetadataFetcher>, kms: Arc<dyn KeyRingApi>) -> Self {
        Self {
            metadata,
            kms,
            resolver: EndpointResolver::default(),
            prepare_before_create: true,
            verify_read_membership: false,
        }
    }

    pub fn with_resolver(mut self, resolver: EndpointResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Toggle the extra request sent before each create
    pub fn with_prepare_before_create(mut self, enabled: bool) -> Self {
        self.prepare_before_create = enabled;
        self
    }

    /// When enabled, Read reports `Absent` if the id is missing from the listing
    pub fn with_verify_read_membership(mut self, enabled: bool) -> Self {
        self.verify_read_membership = enabled;
        self
    }

    async fn fetch_metadata(&self, instance_id: &str) -> Result<InstanceMetadata, MetadataError> {
        self.metadata.fetch(instance_id).await
    }

    fn resolve(
        &self,
        preference: Option<EndpointPreference>,
        metadata: &InstanceMetadata,
        instance_id: &str,
    ) -> KeyRingResult<ResolvedEndpoint> {
        self.resolver.resolve(preference, &metadata.extensions, instance_id)
    }

    /// Create a key ring and return its external identifier
    pub async fn create(&self, request: &KeyRingRequest) -> KeyRingResult<String> {
        request.validate()?;

        let instance_id = crn::instance_id_from_reference(&request.instance_reference);
        let key_ring_id = request.key_ring_id.as_str();

        let metadata = self
            .fetch_metadata(instance_id)
            .await
            .map_err(|source| metadata_error(instance_id, source))?;
        let endpoint = self.resolve(request.endpoint_preference, &metadata, instance_id)?;
        let target = endpoint.target(instance_id);

        info!(
            url = endpoint.base_url(),
            instance_id,
            key_ring_id,
            "Creating key ring"
        );

        if self.prepare_before_create {
            self.kms.prepare_key_ring(&target, key_ring_id).await?;
        }

        self.kms.create_key_ring(&target, key_ring_id).await?;

        // The create call returns no body; the listing is the confirmation
        let listed = self.kms.list_key_rings(&target).await?;
        let found = listed
            .into_iter()
            .find(|ring| ring.id == key_ring_id)
            .ok_or_else(|| KeyRingError::VerificationFailed {
                key_ring_id: key_ring_id.to_string(),
                instance_id: instance_id.to_string(),
                url: endpoint.base_url().to_string(),
            })?;

        let external_id = identifier::encode(&found.id, &metadata.crn);
        info!(external_id = %external_id, "Key ring created");
        Ok(external_id)
    }

    /// Observe a key ring previously returned by `create`
    pub async fn read(
        &self,
        external_id: &str,
        preference: Option<EndpointPreference>,
    ) -> KeyRingResult<ReadOutcome> {
        let decoded = decode_stored(external_id)?;
        let instance_id = decoded.instance_id.as_str();

        let metadata = match self.fetch_metadata(instance_id).await {
            Ok(metadata) => metadata,
            Err(MetadataError::NotFound(_)) => {
                warn!(instance_id, external_id, "Instance no longer exists, key ring is gone");
                return Ok(ReadOutcome::Absent);
            }
            Err(source) => return Err(metadata_error(instance_id, source)),
        };
        let endpoint = self.resolve(preference, &metadata, instance_id)?;
        let target = endpoint.target(instance_id);

        // Only the success of this call is used unless membership checks are on
        let listed = match self.kms.list_key_rings(&target).await {
            Ok(listed) => listed,
            Err(e) if e.status.is_gone() => {
                warn!(
                    instance_id,
                    key_ring_id = %decoded.key_ring_id,
                    status = ?e.status,
                    "Key ring listing reports gone, dropping key ring"
                );
                return Ok(ReadOutcome::Absent);
            }
            Err(e) => return Err(e.into()),
        };

        if self.verify_read_membership && !listed.iter().any(|ring| ring.id == decoded.key_ring_id) {
            warn!(
                instance_id,
                key_ring_id = %decoded.key_ring_id,
                "Key ring missing from listing"
            );
            return Ok(ReadOutcome::Absent);
        }

        Ok(ReadOutcome::Present(KeyRingState {
            instance_id: decoded.instance_id,
            instance_crn: decoded.instance_crn,
            key_ring_id: decoded.key_ring_id,
            endpoint_preference: endpoint.preference(),
        }))
    }

    /// Adopt an existing key ring: Read with no endpoint preference
    pub async fn import(&self, external_id: &str) -> KeyRingResult<ReadOutcome> {
        self.read(external_id, None).await
    }

    /// Delete a key ring. Succeeds if the ring is already gone.
    pub async fn delete(
        &self,
        external_id: &str,
        preference: Option<EndpointPreference>,
    ) -> KeyRingResult<()> {
        let decoded = decode_stored(external_id)?;
        let instance_id = decoded.instance_id.as_str();

        let metadata = self
            .fetch_metadata(instance_id)
            .await
            .map_err(|source| metadata_error(instance_id, source))?;
        let endpoint = self.resolve(preference, &metadata, instance_id)?;
        let target = endpoint.target(instance_id);

        match self.kms.delete_key_ring(&target, &decoded.key_ring_id).await {
            Ok(()) => {
                info!(
                    url = endpoint.base_url(),
                    instance_id,
                    key_ring_id = %decoded.key_ring_id,
                    "Key ring deleted"
                );
                Ok(())
            }
            Err(e) if e.status.is_gone() => {
                warn!(
                    instance_id,
                    key_ring_id = %decoded.key_ring_id,
                    status = ?e.status,
                    "Key ring already gone"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn metadata_error(instance_id: &str, source: MetadataError) -> KeyRingError {
    match source {
        MetadataError::Credentials(message) => KeyRingError::Credentials(message),
        source => KeyRingError::MetadataFetch {
            instance_id: instance_id.to_string(),
            source,
        },
    }
}

/// A stored id that cannot be decoded is corrupt state, not a retryable error
fn decode_stored(external_id: &str) -> KeyRingResult<DecodedIdentifier> {
    identifier::decode(external_id).map_err(|e| KeyRingError::InvalidState {
        id: external_id.to_string(),
        reason: e.to_string(),
    })
}
