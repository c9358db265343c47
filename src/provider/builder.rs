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

use crate::delegate::DelegateRef;
use crate::events::EventHandler;
use crate::locking::LockScope;
use crate::models::{SplitPolicy, Version};
use crate::provider::{
    ArtifactSource, ExportedPackage, Provider, ProviderId, ShutdownPolicy, TransformHook,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Builder for [`Provider`]. Flags default to cacheable and blacklistable,
/// no exports, no imports.
pub struct ProviderBuilder {
    name: String,
    source: Arc<dyn ArtifactSource>,
    exports: Option<Vec<ExportedPackage>>,
    imports: Vec<DelegateRef>,
    import_all: bool,
    cacheable: bool,
    blacklistable: bool,
    shutdown_policy: ShutdownPolicy,
    transform: Option<Arc<dyn TransformHook>>,
    handlers: Vec<Arc<dyn EventHandler>>,
    package_versions: HashMap<String, Version>,
}

impl ProviderBuilder {
    pub fn new(name: impl Into<String>, source: Arc<dyn ArtifactSource>) -> Self {
        Self {
            name: name.into(),
            source,
            exports: None,
            imports: Vec::new(),
            import_all: false,
            cacheable: true,
            blacklistable: true,
            shutdown_policy: ShutdownPolicy::default(),
            transform: None,
            handlers: Vec::new(),
            package_versions: HashMap::new(),
        }
    }

    pub fn export(self, package: impl Into<String>) -> Self {
        self.export_with(package, SplitPolicy::default())
    }

    pub fn export_with(mut self, package: impl Into<String>, split: SplitPolicy) -> Self {
        self.exports.get_or_insert_with(Vec::new).push(ExportedPackage {
            name: package.into(),
            split,
        });
        self
    }

    pub fn import(mut self, import: DelegateRef) -> Self {
        self.imports.push(import);
        self
    }

    pub fn import_all(mut self, import_all: bool) -> Self {
        self.import_all = import_all;
        self
    }

    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    pub fn blacklistable(mut self, blacklistable: bool) -> Self {
        self.blacklistable = blacklistable;
        self
    }

    pub fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }

    pub fn transform(mut self, hook: Arc<dyn TransformHook>) -> Self {
        self.transform = Some(hook);
        self
    }

    pub fn handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn package_version(mut self, package: impl Into<String>, version: Version) -> Self {
        self.package_versions.insert(package.into(), version);
        self
    }

    pub fn build(self) -> Arc<Provider> {
        let id = ProviderId::next();
        let name: Arc<str> = Arc::from(self.name);
        Arc::new(Provider {
            id,
            scope: LockScope::new(id, Arc::clone(&name)),
            name,
            exports: self.exports,
            imports: self.imports,
            import_all: self.import_all,
            cacheable: self.cacheable,
            blacklistable: self.blacklistable,
            shutdown_policy: self.shutdown_policy,
            source: self.source,
            transform: self.transform,
            handlers: self.handlers,
            package_versions: self.package_versions,
            domain: Mutex::new(None),
            registry: Mutex::new(None),
            units: Mutex::new(HashMap::new()),
            retired: AtomicBool::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemorySource;
    use std::str::FromStr;

    #[test]
    fn builder_collects_exports_in_order() {
        let provider = ProviderBuilder::new("p", Arc::new(MemorySource::new()))
            .export("com.a")
            .export_with("com.b", SplitPolicy::Last)
            .package_version("com.a", Version::from_str("1.2").unwrap())
            .cacheable(false)
            .import_all(true)
            .shutdown_policy(ShutdownPolicy::GarbageCollect)
            .build();

        let names: Vec<&str> = provider.exports().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["com.a", "com.b"]);
        assert_eq!(provider.exports()[1].split, SplitPolicy::Last);
        assert_eq!(provider.package_version("com.a").unwrap().to_string(), "1.2");
        assert!(!provider.is_cacheable());
        assert!(provider.imports_all());
        assert_eq!(provider.shutdown_policy(), ShutdownPolicy::GarbageCollect);
        assert_eq!(provider.lock_scope().id(), provider.id());
    }
}
