// Copyright 2025 dentsusoken
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

use crate::models::Version;
use crate::provider::ProviderId;
use std::fmt;
use std::sync::Arc;

/// A materialised unit. Handed out as `Arc<Unit>` so repeated loads of the
/// same name can be compared by identity.
#[derive(Debug)]
pub struct Unit {
    name: String,
    provider: ProviderId,
    provider_name: Arc<str>,
    bytes: Arc<[u8]>,
}

impl Unit {
    pub(crate) fn new(
        name: String,
        provider: ProviderId,
        provider_name: Arc<str>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name,
            provider,
            provider_name,
            bytes: Arc::from(bytes),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.name, self.provider_name)
    }
}

/// A named resource found in some provider's source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub path: String,
    pub provider: ProviderId,
    pub provider_name: Arc<str>,
    pub bytes: Arc<[u8]>,
}

/// Package metadata as reported by the provider that holds the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub version: Option<Version>,
    pub provider: ProviderId,
    pub provider_name: Arc<str>,
}
