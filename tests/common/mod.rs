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

//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use unitloader::error::Result;
use unitloader::{ArtifactSource, LoaderConfig, LoaderSystem, MemorySource, Provider};

/// Source holding `units`, each unit's bytes being its own name.
pub fn unit_source(units: &[&str]) -> Arc<MemorySource> {
    let source = MemorySource::new();
    for unit in units {
        source.insert_unit(unit, unit.as_bytes());
    }
    Arc::new(source)
}

pub fn provider(name: &str, exports: &[&str], units: &[&str]) -> Arc<Provider> {
    exports
        .iter()
        .fold(Provider::builder(name, unit_source(units)), |builder, package| {
            builder.export(*package)
        })
        .build()
}

/// An initialised system with a short lock budget, so a scheduling bug
/// fails the test instead of hanging it.
pub fn system() -> LoaderSystem {
    system_with(
        r#"
[locking]
timeout = "10"
poll_interval_ms = 5
"#,
    )
}

pub fn system_with(toml: &str) -> LoaderSystem {
    let config = LoaderConfig::from_toml_str(toml).expect("valid test config");
    let system = LoaderSystem::new(config).expect("system");
    system.init().expect("init");
    system
}

/// Memory source that counts how often its contents are probed.
#[derive(Default)]
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

    pub fn insert_unit(&self, name: &str) {
        self.inner.insert_unit(name, name.as_bytes());
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

/// Memory source that parks the first prober of `trigger` on a shared
/// barrier. Two such sources line two threads up so that each holds its own
/// provider before asking for the other's.
pub struct BarrierSource {
    inner: MemorySource,
    trigger: String,
    barrier: Arc<Barrier>,
    fired: AtomicBool,
}

impl BarrierSource {
    pub fn new(units: &[&str], trigger: &str, barrier: Arc<Barrier>) -> Arc<Self> {
        let inner = MemorySource::new();
        for unit in units {
            inner.insert_unit(unit, unit.as_bytes());
        }
        Arc::new(Self {
            inner,
            trigger: trigger.to_string(),
            barrier,
            fired: AtomicBool::new(false),
        })
    }
}

impl ArtifactSource for BarrierSource {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        self.inner.read(path)
    }

    fn contains(&self, path: &str) -> bool {
        if path == self.trigger && !self.fired.swap(true, Ordering::SeqCst) {
            self.barrier.wait();
        }
        self.inner.contains(path)
    }

    fn packages(&self) -> Vec<String> {
        self.inner.packages()
    }
}
