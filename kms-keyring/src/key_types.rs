//! Key ring type definitions
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
use crate::error::{KeyRingError, KeyRingResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// User-defined key ring identifier
pub type KeyRingId = String;

const KEY_RING_ID_PATTERN: &str = r"^[A-Za-z0-9-]{2,100}$";

fn key_ring_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(KEY_RING_ID_PATTERN).expect("key ring id pattern is valid"))
}

/// Check a key ring id against the allowed shape
pub fn validate_key_ring_id(key_ring_id: &str) -> KeyRingResult<()> {
    if key_ring_id_regex().is_match(key_ring_id) {
        Ok(())
    } else {
        Err(KeyRingError::Validation(format!(
            "key_ring_id {key_ring_id:?} must match {KEY_RING_ID_PATTERN}"
        )))
    }
}

/// Desired state handed to Create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRingRequest {
    /// Bare instance GUID or full instance CRN
    pub instance_reference: String,
    pub key_ring_id: KeyRingId,
    /// `None` lets the resolver pick
    pub endpoint_preference: Option<EndpointPreference>,
}

impl KeyRingRequest {
    pub fn new(
        instance_reference: impl Into<String>,
        key_ring_id: impl Into<String>,
        endpoint_preference: Option<EndpointPreference>,
    ) -> Self {
        Self {
            instance_reference: instance_reference.into(),
            key_ring_id: key_ring_id.into(),
            endpoint_preference,
        }
    }

    /// Reject bad input before any remote call is made
    pub fn validate(&self) -> KeyRingResult<()> {
        if self.instance_reference.trim().is_empty() {
            return Err(KeyRingError::Validation(
                "instance_id must not be empty".to_string(),
            ));
        }
        validate_key_ring_id(&self.key_ring_id)?;
        Ok(())
    }
}

/// Observed state reported by Read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRingState {
    pub instance_id: String,
    pub instance_crn: String,
    pub key_ring_id: KeyRingId,
    pub endpoint_preference: EndpointPreference,
}

/// Result of Read: either the key ring is still there or the stored record
/// should be dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReadOutcome {
    Present(KeyRingState),
    Absent,
}

impl ReadOutcome {
    pub fn is_absent(&self) -> bool {
        matches!(self, ReadOutcome::Absent)
    }

    pub fn state(&self) -> Option<&KeyRingState> {
        match self {
            ReadOutcome::Present(state) => Some(state),
            ReadOutcome::Absent => None,
        }
    }
}

/// One entry of the remote key ring listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRingSummary {
    pub id: KeyRingId,
    #[serde(default)]
    pub creation_date: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl KeyRingSummary {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            creation_date: None,
            created_by: None,
        }
    }
}
