//! Key ring lifecycle management for cloud KMS instances
//!
//! Resolves the KMS endpoint of a service instance, creates, reads and
//! deletes key rings on it, and encodes the external identifier that callers
//! persist between operations.
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


pub mod controller;
pub mod credentials;
pub mod crn;
pub mod endpoint;
pub mod error;
pub mod identifier;
pub mod key_types;
pub mod keyprotect;
pub mod kms;
pub mod metadata;
pub mod service_integration;

pub use controller::KeyRingController;
pub use endpoint::{EndpointPreference, EndpointResolver, Extensions, ResolvedEndpoint};
pub use error::{KeyRingError, KeyRingResult, MetadataError, RemoteError, RemoteStatus};
pub use key_types::{KeyRingId, KeyRingRequest, KeyRingState, KeyRingSummary, ReadOutcome};
pub use kms::{KeyRingApi, KmsTarget};
pub use metadata::{InstanceMetadata, InstanceMetadataFetcher};
pub use service_integration::*;
