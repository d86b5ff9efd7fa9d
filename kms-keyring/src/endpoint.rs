//! KMS endpoint selection from instance extensions
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
use crate::kms::KmsTarget;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

const PRIVATE_MARKER: &str = "private";

/// Network plane used to reach the KMS API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointPreference {
    Public,
    Private,
}

impl fmt::Display for EndpointPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointPreference::Public => f.write_str("public"),
            EndpointPreference::Private => f.write_str("private"),
        }
    }
}

impl FromStr for EndpointPreference {
    type Err = KeyRingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(EndpointPreference::Public),
            "private" => Ok(EndpointPreference::Private),
            other => Err(KeyRingError::Validation(format!(
                "endpoint type must be one of public, private; got {other:?}"
            ))),
        }
    }
}

/// Endpoint URLs advertised by an instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointUrls {
    pub public: Option<String>,
    pub private: Option<String>,
}

/// Provider extensions attached to a resource instance. Only the endpoint
/// map is read; everything else is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extensions {
    #[serde(default)]
    pub endpoints: Option<EndpointUrls>,
}

impl Extensions {
    pub fn with_endpoints(public: Option<&str>, private: Option<&str>) -> Self {
        Self {
            endpoints: Some(EndpointUrls {
                public: public.map(str::to_string),
                private: private.map(str::to_string),
            }),
        }
    }

    fn url_for(&self, plane: EndpointPreference) -> Option<&str> {
        let endpoints = self.endpoints.as_ref()?;
        let url = match plane {
            EndpointPreference::Public => endpoints.public.as_deref(),
            EndpointPreference::Private => endpoints.private.as_deref(),
        };
        url.filter(|u| !u.is_empty())
    }
}

/// Base URL chosen for one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    base_url: String,
    is_private: bool,
}

impl ResolvedEndpoint {
    /// Build from a URL; `is_private` follows the URL text. `None` if the
    /// URL does not parse.
    pub fn from_url(url: &str) -> Option<Self> {
        let parsed = reqwest::Url::parse(url).ok()?;
        let base_url = parsed.as_str().trim_end_matches('/').to_string();
        let is_private = base_url.contains(PRIVATE_MARKER);
        Some(Self { base_url, is_private })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_private(&self) -> bool {
        self.is_private
    }

    /// Preference to report back to the caller for this endpoint
    pub fn preference(&self) -> EndpointPreference {
        if self.is_private {
            EndpointPreference::Private
        } else {
            EndpointPreference::Public
        }
    }

    /// Per-call client configuration for `instance_id`
    pub fn target(&self, instance_id: &str) -> KmsTarget {
        KmsTarget::new(&self.base_url, instance_id)
    }
}

/// Picks the KMS base URL for an instance
#[derive(Debug, Clone, Default)]
pub struct EndpointResolver {
    override_url: Option<String>,
}

impl EndpointResolver {
    pub fn new(override_url: Option<String>) -> Self {
        Self {
            override_url: override_url.filter(|u| !u.is_empty()),
        }
    }

    pub fn resolve(
        &self,
        preference: Option<EndpointPreference>,
        extensions: &Extensions,
        instance_id: &str,
    ) -> KeyRingResult<ResolvedEndpoint> {
        let unavailable = |requested| KeyRingError::EndpointUnavailable {
            requested,
            instance_id: instance_id.to_string(),
        };

        if let Some(url) = &self.override_url {
            debug!(url = %url, instance_id, "Using endpoint override");
            return ResolvedEndpoint::from_url(url).ok_or_else(|| {
                warn!(url = %url, "Endpoint override is not a valid URL");
                unavailable(preference.unwrap_or(EndpointPreference::Public))
            });
        }

        let plane = match preference {
            Some(plane) => plane,
            None if extensions.url_for(EndpointPreference::Private).is_some() => {
                EndpointPreference::Private
            }
            None => EndpointPreference::Public,
        };

        let url = extensions.url_for(plane).ok_or_else(|| unavailable(plane))?;
        let resolved = ResolvedEndpoint::from_url(url).ok_or_else(|| {
            warn!(url = %url, instance_id, "Advertised endpoint is not a valid URL");
            unavailable(plane)
        })?;
        debug!(
            url = resolved.base_url(),
            instance_id,
            requested = ?preference,
            "Resolved KMS endpoint"
        );
        Ok(resolved)
    }
}

/// Resolve without an override
pub fn resolve(
    preference: Option<EndpointPreference>,
    extensions: &Extensions,
    instance_id: &str,
) -> KeyRingResult<ResolvedEndpoint> {
    EndpointResolver::default().resolve(preference, extensions, instance_id)
}
