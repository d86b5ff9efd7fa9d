//! Error types for key ring management
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


use crate::endpoint::EndpointPreference;
use std::fmt;
use thiserror::Error;

/// Classification of a failed control-plane call, computed once from the
/// HTTP status at the client boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    NotFound,
    Conflict,
    /// No bearer token could be obtained, so nothing was sent
    Credentials,
    Other,
}

impl RemoteStatus {
    pub fn from_status_code(code: u16) -> Self {
        match code {
            404 => RemoteStatus::NotFound,
            409 => RemoteStatus::Conflict,
            _ => RemoteStatus::Other,
        }
    }

    /// Whether this outcome means the key ring is already gone
    pub fn is_gone(&self) -> bool {
        matches!(self, RemoteStatus::NotFound | RemoteStatus::Conflict)
    }
}

/// Control-plane operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KmsOperation {
    Prepare,
    Create,
    List,
    Delete,
}

impl fmt::Display for KmsOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KmsOperation::Prepare => "prepare key ring",
            KmsOperation::Create => "create key ring",
            KmsOperation::List => "list key rings",
            KmsOperation::Delete => "delete key ring",
        };
        f.write_str(name)
    }
}

/// A failed call to the KMS control plane, with enough context to diagnose
/// it without verbose tracing.
#[derive(Error, Debug, Clone)]
#[error(
    "{operation} failed (URL={url}, InstanceID={instance_id}, KeyRingId={}): {}{message}",
    .key_ring_id.as_deref().unwrap_or("-"),
    .status_code.map(|c| format!("status {c}: ")).unwrap_or_default()
)]
pub struct RemoteError {
    pub operation: KmsOperation,
    pub status: RemoteStatus,
    /// HTTP status, absent for transport failures
    pub status_code: Option<u16>,
    pub url: String,
    pub instance_id: String,
    pub key_ring_id: Option<String>,
    pub message: String,
}

/// Failure looking up an instance in the resource controller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("resource instance {0} not found")]
    NotFound(String),

    #[error("resource instance lookup failed: {0}")]
    Transient(String),

    #[error("no token for the resource controller: {0}")]
    Credentials(String),
}

/// Key ring management errors
#[derive(Error, Debug)]
pub enum KeyRingError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Error retrieving resource instance {instance_id}: {source}")]
    MetadataFetch {
        instance_id: String,
        #[source]
        source: MetadataError,
    },

    #[error("Endpoint {requested} is not available for instance {instance_id}")]
    EndpointUnavailable {
        requested: EndpointPreference,
        instance_id: String,
    },

    #[error(transparent)]
    Remote(RemoteError),

    #[error(
        "Key ring {key_ring_id} was created but is missing from the listing (URL={url}, InstanceID={instance_id})"
    )]
    VerificationFailed {
        key_ring_id: String,
        instance_id: String,
        url: String,
    },

    #[error("Malformed identifier: {0}")]
    MalformedIdentifier(String),

    #[error("Incorrect ID {id}: {reason}")]
    InvalidState { id: String, reason: String },

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<RemoteError> for KeyRingError {
    fn from(err: RemoteError) -> Self {
        match err.status {
            RemoteStatus::Credentials => KeyRingError::Credentials(err.message),
            _ => KeyRingError::Remote(err),
        }
    }
}

impl KeyRingError {
    /// Remote classification, if this error came from the control plane
    pub fn remote_status(&self) -> Option<RemoteStatus> {
        match self {
            KeyRingError::Remote(e) => Some(e.status),
            _ => None,
        }
    }
}

/// Result type for key ring operations
pub type KeyRingResult<T> = Result<T, KeyRingError>;
