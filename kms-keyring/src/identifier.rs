//! Composite external identifier: `<key_ring_id>:keyRing:<instance_crn>`
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


use crate::crn::CRN_SEPARATOR;
use crate::error::{KeyRingError, KeyRingResult};

/// Separator between the key ring id and the instance CRN. The format is
/// persisted by callers and must not change.
pub const KEY_RING_SEPARATOR: &str = ":keyRing:";

/// Parts recovered from an external identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedIdentifier {
    pub key_ring_id: String,
    pub instance_crn: String,
    /// Third-from-last segment of the CRN
    pub instance_id: String,
}

pub fn encode(key_ring_id: &str, instance_crn: &str) -> String {
    format!("{key_ring_id}{KEY_RING_SEPARATOR}{instance_crn}")
}

pub fn decode(external_id: &str) -> KeyRingResult<DecodedIdentifier> {
    let (key_ring_id, instance_crn) =
        external_id.split_once(KEY_RING_SEPARATOR).ok_or_else(|| {
            KeyRingError::MalformedIdentifier(format!(
                "{external_id} should be a combination of keyRingID{KEY_RING_SEPARATOR}InstanceCRN"
            ))
        })?;

    let segments: Vec<&str> = instance_crn.split(CRN_SEPARATOR).collect();
    if segments.len() < 3 {
        return Err(KeyRingError::MalformedIdentifier(format!(
            "instance CRN {instance_crn} has {} segments, expected at least 3",
            segments.len()
        )));
    }

    Ok(DecodedIdentifier {
        key_ring_id: key_ring_id.to_string(),
        instance_crn: instance_crn.to_string(),
        instance_id: segments[segments.len() - 3].to_string(),
    })
}
