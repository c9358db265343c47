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

//! Providers: the leaves of the resolution graph.
//!
//! A provider wraps one artifact source and declares what it exports and
//! imports. It can be created before any domain exists; registering it with
//! a domain attaches it exactly once and gives it a scope registry built
//! from its declared imports.

mod builder;
mod source;
mod unit;

pub use builder::ProviderBuilder;
pub use source::{ArtifactSource, MemorySource, TransformHook};
pub use unit::{PackageInfo, Resource, Unit};

use crate::delegate::DelegateRef;
use crate::domain::{Domain, ResolveOptions};
use crate::error::{LoaderError, Result};
use crate::events::EventHandler;
use crate::locking::LockScope;
use crate::models::{SplitPolicy, Version, unit_path};
use crate::scope::ScopeRegistry;
use log::{debug, trace};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_PROVIDER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique provider handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(u64);

impl ProviderId {
    pub fn next() -> Self {
        ProviderId(NEXT_PROVIDER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What happens to a provider's materialised units once it is unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShutdownPolicy {
    /// Tear everything down as part of unregistering.
    #[default]
    Unregister,
    /// Keep loaded units until the provider itself is dropped.
    GarbageCollect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedPackage {
    pub name: String,
    pub split: SplitPolicy,
}

pub struct Provider {
    id: ProviderId,
    name: Arc<str>,
    scope: LockScope,
    exports: Option<Vec<ExportedPackage>>,
    imports: Vec<DelegateRef>,
    import_all: bool,
    cacheable: bool,
    blacklistable: bool,
    shutdown_policy: ShutdownPolicy,
    source: Arc<dyn ArtifactSource>,
    transform: Option<Arc<dyn TransformHook>>,
    handlers: Vec<Arc<dyn EventHandler>>,
    package_versions: HashMap<String, Version>,
    domain: Mutex<Option<Weak<Domain>>>,
    registry: Mutex<Option<Arc<ScopeRegistry>>>,
    units: Mutex<HashMap<String, Arc<Unit>>>,
    retired: AtomicBool,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("exports", &self.exports)
            .field("import_all", &self.import_all)
            .field("cacheable", &self.cacheable)
            .field("blacklistable", &self.blacklistable)
            .finish_non_exhaustive()
    }
}

impl Provider {
    pub fn builder(name: impl Into<String>, source: Arc<dyn ArtifactSource>) -> ProviderBuilder {
        ProviderBuilder::new(name, source)
    }

    pub fn id(&self) -> ProviderId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn lock_scope(&self) -> &LockScope {
        &self.scope
    }

    /// Exported packages in declaration order; empty when nothing is exported.
    pub fn exports(&self) -> &[ExportedPackage] {
        self.exports.as_deref().unwrap_or_default()
    }

    pub fn exports_package(&self, package: &str) -> bool {
        self.exports().iter().any(|export| export.name == package)
    }

    pub fn declared_imports(&self) -> &[DelegateRef] {
        &self.imports
    }

    pub fn imports_all(&self) -> bool {
        self.import_all
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    pub fn is_blacklistable(&self) -> bool {
        self.blacklistable
    }

    pub fn shutdown_policy(&self) -> ShutdownPolicy {
        self.shutdown_policy
    }

    pub fn handlers(&self) -> &[Arc<dyn EventHandler>] {
        &self.handlers
    }

    pub fn package_version(&self, package: &str) -> Option<&Version> {
        self.package_versions.get(package)
    }

    pub fn is_registered(&self) -> bool {
        self.domain().is_some()
    }

    pub fn domain(&self) -> Option<Arc<Domain>> {
        self.domain.lock().as_ref().and_then(Weak::upgrade)
    }

    pub fn registry(&self) -> Option<Arc<ScopeRegistry>> {
        self.registry.lock().clone()
    }

    pub(crate) fn attach(&self, domain: &Arc<Domain>, registry: ScopeRegistry) -> Result<()> {
        let mut link = self.domain.lock();
        if link.as_ref().is_some_and(|weak| weak.strong_count() > 0) {
            return Err(LoaderError::AlreadyRegistered(self.name.to_string()));
        }
        *link = Some(Arc::downgrade(domain));
        *self.registry.lock() = Some(Arc::new(registry));
        self.retired.store(false, Ordering::Release);
        debug!("Attached {} to domain {}", self, domain.name());
        Ok(())
    }

    pub(crate) fn detach(&self) {
        *self.domain.lock() = None;
        *self.registry.lock() = None;
        if self.shutdown_policy == ShutdownPolicy::Unregister {
            self.retired.store(true, Ordering::Release);
            let dropped = {
                let mut units = self.units.lock();
                let count = units.len();
                units.clear();
                count
            };
            debug!("Unregistered {self}; dropped {dropped} loaded units");
        } else {
            debug!("Unregistered {self}; loaded units kept until release");
        }
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    fn registered_domain(&self) -> Result<Arc<Domain>> {
        self.domain()
            .ok_or_else(|| LoaderError::NotRegistered(self.name.to_string()))
    }

    /// Whether this provider's own source holds `name`, ignoring delegation.
    pub fn can_load_local(&self, name: &str) -> bool {
        !self.is_retired() && self.source.contains(&unit_path(name))
    }

    /// Materialises `name` from this provider's own source.
    ///
    /// Idempotent: the first successful call reads and transforms the bytes,
    /// every later call returns the same `Unit`.
    pub fn define_local(&self, name: &str) -> Result<Option<Arc<Unit>>> {
        if self.is_retired() {
            return Ok(None);
        }
        if let Some(unit) = self.units.lock().get(name) {
            return Ok(Some(Arc::clone(unit)));
        }

        let Some(bytes) = self.source.read(&unit_path(name))? else {
            return Ok(None);
        };
        let bytes = match &self.transform {
            Some(hook) => hook.transform(name, bytes)?,
            None => bytes,
        };

        let unit = Arc::new(Unit::new(
            name.to_string(),
            self.id,
            Arc::clone(&self.name),
            bytes,
        ));
        let mut units = self.units.lock();
        let stored = units.entry(name.to_string()).or_insert(unit);
        trace!("Defined {name} in {self}");
        Ok(Some(Arc::clone(stored)))
    }

    pub fn resource_local(&self, path: &str) -> Result<Option<Resource>> {
        if self.is_retired() {
            return Ok(None);
        }
        Ok(self.source.read(path)?.map(|bytes| Resource {
            path: path.trim_start_matches('/').to_string(),
            provider: self.id,
            provider_name: Arc::clone(&self.name),
            bytes: Arc::from(bytes),
        }))
    }

    pub fn package_local(&self, package: &str) -> Option<PackageInfo> {
        if self.is_retired() {
            return None;
        }
        let present = self.exports_package(package)
            || self.source.packages().iter().any(|held| held == package);
        present.then(|| PackageInfo {
            name: package.to_string(),
            version: self.package_versions.get(package).cloned(),
            provider: self.id,
            provider_name: Arc::clone(&self.name),
        })
    }

    /// Names of the units materialised so far, sorted.
    pub fn loaded_units(&self) -> Vec<String> {
        let mut names: Vec<String> = self.units.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn loaded_unit(&self, name: &str) -> Option<Arc<Unit>> {
        self.units.lock().get(name).cloned()
    }

    pub fn load_unit(self: &Arc<Self>, name: &str) -> Result<Option<Arc<Unit>>> {
        self.load_unit_with(name, ResolveOptions::default())
    }

    /// Resolves `name` through this provider's domain while holding this
    /// provider's lock.
    pub fn load_unit_with(
        self: &Arc<Self>,
        name: &str,
        options: ResolveOptions,
    ) -> Result<Option<Arc<Unit>>> {
        let domain = self.registered_domain()?;
        let requester = Arc::clone(self);
        let name = name.to_string();
        let target = Arc::clone(&domain);
        domain
            .lock_manager()
            .run(&self.scope, move || target.load_unit(Some(&requester), &name, options))?
    }

    pub fn get_resource(self: &Arc<Self>, path: &str) -> Result<Option<Resource>> {
        let domain = self.registered_domain()?;
        let requester = Arc::clone(self);
        let path = path.to_string();
        let target = Arc::clone(&domain);
        domain
            .lock_manager()
            .run(&self.scope, move || target.get_resource(Some(&requester), &path))?
    }

    pub fn get_resources(self: &Arc<Self>, path: &str) -> Result<Vec<Resource>> {
        let domain = self.registered_domain()?;
        let requester = Arc::clone(self);
        let path = path.to_string();
        let target = Arc::clone(&domain);
        domain
            .lock_manager()
            .run(&self.scope, move || target.get_resources(Some(&requester), &path))?
    }

    pub fn get_package(self: &Arc<Self>, package: &str) -> Result<Option<PackageInfo>> {
        let domain = self.registered_domain()?;
        let requester = Arc::clone(self);
        let package = package.to_string();
        let target = Arc::clone(&domain);
        domain
            .lock_manager()
            .run(&self.scope, move || target.get_package(Some(&requester), &package))?
    }

    /// Adds an import at runtime. The newest import is consulted first.
    pub fn add_import(&self, import: DelegateRef) -> Result<()> {
        let registry = self
            .registry()
            .ok_or_else(|| LoaderError::NotRegistered(self.name.to_string()))?;
        registry.add_import(import);
        Ok(())
    }

    pub fn remove_import(&self, import: &DelegateRef) -> Result<bool> {
        let registry = self
            .registry()
            .ok_or_else(|| LoaderError::NotRegistered(self.name.to_string()))?;
        Ok(registry.remove_import(import))
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
