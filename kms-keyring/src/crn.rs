//! Cloud resource name (CRN) helpers
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


/// Segment separator inside a CRN
pub const CRN_SEPARATOR: char = ':';

/// Reduce an instance reference to its short instance id.
///
/// A full CRN has more than three `:`-separated segments and carries the
/// instance id third from the end. Anything shorter is taken to be a bare
/// id already and returned unchanged.
pub fn instance_id_from_reference(reference: &str) -> &str {
    let segments: Vec<&str> = reference.split(CRN_SEPARATOR).collect();
    if segments.len() > 3 {
        segments[segments.len() - 3]
    } else {
        reference
    }
}

/// Whether two instance references (bare id or CRN) name the same instance
pub fn same_instance(a: &str, b: &str) -> bool {
    instance_id_from_reference(a) == instance_id_from_reference(b)
}
