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

use crate::provider::ProviderId;
use std::fmt;
use std::sync::Arc;

/// Identifies the provider whose lock is being requested.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockScope {
    id: ProviderId,
    label: Arc<str>,
}

impl LockScope {
    pub fn new(id: ProviderId, label: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }

    pub fn id(&self) -> ProviderId {
        self.id
    }

    /// Human-readable label used for logging and error reporting.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider {} ({})", self.label, self.id)
    }
}
