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

//! Shared fixtures for unit tests.

use crate::domain::{Domain, ParentPolicy};
use crate::error::Result;
use crate::loader::Loader;
use crate::locking::{LockManager, LockTimeoutValue};
use crate::provider::{ArtifactSource, MemorySource, Provider, ProviderBuilder};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Memory source that counts how often it is probed.
#[derive(Debug, Default)]
pub struct CountingSource {
    inner: MemorySource,
    probes: AtomicUsize,
}

impl CountingSource {
    pub fn with_units(units: &[&str]) -> Arc<Self> {
        let source = Self::default();
        for unit in units {
            source.inner.insert_unit(unit, unit.as_bytes());
        }
        Arc::new(source)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl ArtifactSource for CountingSource {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.inner.read(path)
    }

    fn contains(&self, path: &str) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.inner.contains(path)
    }

    fn packages(&self) -> Vec<String> {
        self.inner.packages()
    }
}

/// Source holding `units`, each unit's bytes being its own name.
pub fn unit_source(units: &[&str]) -> Arc<MemorySource> {
    let source = MemorySource::new();
    for unit in units {
        source.insert_unit(unit, unit.as_bytes());
    }
    Arc::new(source)
}

pub fn provider_builder(name: &str, exports: &[&str], units: &[&str]) -> ProviderBuilder {
    exports.iter().fold(
        Provider::builder(name, unit_source(units)),
        |builder, package| builder.export(*package),
    )
}

pub fn provider(name: &str, exports: &[&str], units: &[&str]) -> Arc<Provider> {
    provider_builder(name, exports, units).build()
}

pub fn test_locks() -> Arc<LockManager> {
    Arc::new(LockManager::new(
        LockTimeoutValue::from_secs(5),
        Duration::from_millis(10),
    ))
}

pub fn domain(name: &str) -> Arc<Domain> {
    Domain::new(name, ParentPolicy::before(), None, test_locks())
}

pub fn child_domain(name: &str, parent: &Arc<Domain>, policy: ParentPolicy) -> Arc<Domain> {
    Domain::new(
        name,
        policy,
        Some(Loader::Domain(Arc::clone(parent))),
        Arc::clone(parent.lock_manager()),
    )
}

/// Provider id of the loader, if it is a provider.
pub fn loader_id(loader: &Option<Loader>) -> Option<crate::provider::ProviderId> {
    loader
        .as_ref()
        .and_then(|loader| loader.provider().map(|provider| provider.id()))
}
