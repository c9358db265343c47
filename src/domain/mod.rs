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

//! Domains: hierarchical resolution scopes.
//!
//! A domain owns the providers registered with it, an index from exported
//! package to exporters, and the domain-wide caches. Every registration or
//! unregistration flushes those caches (and the affected scope registries)
//! before returning.

mod policy;
mod resolve;

pub use policy::ParentPolicy;

use crate::error::{LoaderError, Result};
use crate::events::{EventHandler, LoaderEvent, dispatch};
use crate::loader::Loader;
use crate::locking::LockManager;
use crate::models::SplitPolicy;
use crate::provider::{Provider, ProviderId};
use crate::scope::{LookupCache, ScopeRegistry};
use crate::space::{Module, Requirement};
use crate::system::SystemShared;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Per-call switches for unit resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Report a blacklisted name as `NotFound { blacklisted: true }`
    /// instead of an empty result.
    pub fail_if_blacklisted: bool,
}

impl ResolveOptions {
    pub fn fail_if_blacklisted() -> Self {
        Self {
            fail_if_blacklisted: true,
        }
    }
}

#[derive(Default)]
struct Topology {
    providers: Vec<Arc<Provider>>,
    packages: HashMap<String, Vec<Arc<Provider>>>,
}

struct DomainCaches {
    units: LookupCache<Loader>,
    /// Exporter holding each resource path.
    resources: LookupCache<Loader>,
    /// Requester-local answers, keyed by requester. Shares the generation of
    /// `units`.
    local: HashMap<(ProviderId, String), Loader>,
}

impl DomainCaches {
    fn flush(&mut self) {
        self.units.flush();
        self.resources.flush();
        self.local.clear();
    }
}

pub struct Domain {
    name: String,
    policy: ParentPolicy,
    parent: Option<Loader>,
    locks: Arc<LockManager>,
    cache_enabled: bool,
    system: Weak<SystemShared>,
    topology: RwLock<Topology>,
    caches: Mutex<DomainCaches>,
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
    modules: Mutex<Vec<Arc<Module>>>,
    shut_down: AtomicBool,
}

impl Domain {
    /// A standalone domain outside any `LoaderSystem`.
    pub fn new(
        name: impl Into<String>,
        policy: ParentPolicy,
        parent: Option<Loader>,
        locks: Arc<LockManager>,
    ) -> Arc<Self> {
        Self::create(name.into(), policy, parent, locks, true, Weak::new())
    }

    pub(crate) fn create(
        name: String,
        policy: ParentPolicy,
        parent: Option<Loader>,
        locks: Arc<LockManager>,
        cache_enabled: bool,
        system: Weak<SystemShared>,
    ) -> Arc<Self> {
        debug!("Creating domain {name} (parent policy: {policy})");
        Arc::new(Self {
            name,
            policy,
            parent,
            locks,
            cache_enabled,
            system,
            topology: RwLock::new(Topology::default()),
            caches: Mutex::new(DomainCaches {
                units: LookupCache::new(cache_enabled),
                resources: LookupCache::new(cache_enabled),
                local: HashMap::new(),
            }),
            handlers: RwLock::new(Vec::new()),
            modules: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &ParentPolicy {
        &self.policy
    }

    pub fn parent(&self) -> Option<&Loader> {
        self.parent.as_ref()
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(LoaderError::DomainShutdown(self.name.clone()));
        }
        Ok(())
    }

    /// Registered providers in registration order.
    pub fn providers(&self) -> Vec<Arc<Provider>> {
        self.topology.read().providers.clone()
    }

    /// Exporters of `package` in the order an all-exports lookup tries them.
    pub fn exporters(&self, package: &str) -> Vec<Arc<Provider>> {
        self.topology
            .read()
            .packages
            .get(package)
            .cloned()
            .unwrap_or_default()
    }

    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().push(handler);
    }

    pub fn is_blacklisted(&self, name: &str) -> bool {
        self.caches.lock().units.is_negative(name)
    }

    pub fn cached_loader(&self, name: &str) -> Option<Loader> {
        self.caches.lock().units.get(name)
    }

    pub fn register(self: &Arc<Self>, provider: &Arc<Provider>) -> Result<()> {
        self.ensure_active()?;
        let registry = ScopeRegistry::new(
            provider.shared_name(),
            provider.declared_imports(),
            self.cache_enabled,
        );
        provider.attach(self, registry)?;

        {
            let mut topology = self.topology.write();
            if self.is_shut_down() {
                drop(topology);
                provider.detach();
                return Err(LoaderError::DomainShutdown(self.name.clone()));
            }
            topology.providers.push(Arc::clone(provider));
            for export in provider.exports() {
                let exporters = topology.packages.entry(export.name.clone()).or_default();
                if export.split == SplitPolicy::Last {
                    exporters.insert(0, Arc::clone(provider));
                } else {
                    exporters.push(Arc::clone(provider));
                }
            }
            self.flush_locked(&topology);
        }
        self.invalidate_importers_systemwide(provider.id());

        info!("Registered {provider} with domain {}", self.name);
        self.emit(
            Some(provider),
            &LoaderEvent::ProviderRegistered {
                domain: self.name.clone(),
                provider: provider.name().to_string(),
            },
        );
        Ok(())
    }

    pub fn unregister(self: &Arc<Self>, provider: &Arc<Provider>) -> Result<()> {
        let owned_here = provider
            .domain()
            .is_some_and(|domain| Arc::ptr_eq(&domain, self));
        if !owned_here {
            return Err(LoaderError::NotRegistered(provider.name().to_string()));
        }

        {
            let mut topology = self.topology.write();
            topology
                .providers
                .retain(|registered| !Arc::ptr_eq(registered, provider));
            topology.packages.retain(|_, exporters| {
                exporters.retain(|exporter| !Arc::ptr_eq(exporter, provider));
                !exporters.is_empty()
            });
            provider.detach();
            self.flush_locked(&topology);
        }
        self.invalidate_importers_systemwide(provider.id());

        info!("Unregistered {provider} from domain {}", self.name);
        self.emit(
            Some(provider),
            &LoaderEvent::ProviderUnregistered {
                domain: self.name.clone(),
                provider: provider.name().to_string(),
            },
        );
        Ok(())
    }

    /// Flushes domain caches and every member's registry. Runs under the
    /// topology write lock so no reader sees new topology with old answers.
    fn flush_locked(&self, topology: &Topology) {
        self.caches.lock().flush();
        for provider in &topology.providers {
            if let Some(registry) = provider.registry() {
                registry.invalidate();
            }
        }
        debug!("Flushed caches of domain {}", self.name);
    }

    pub(crate) fn invalidate_importers(&self, id: ProviderId) {
        for provider in self.providers() {
            if let Some(registry) = provider.registry() {
                if registry.imports_provider(id) {
                    registry.invalidate();
                }
            }
        }
    }

    fn invalidate_importers_systemwide(&self, id: ProviderId) {
        if let Some(system) = self.system.upgrade() {
            for domain in system.domains() {
                domain.invalidate_importers(id);
            }
        }
    }

    /// Unregisters every provider; later operations fail with
    /// `DomainShutdown`.
    pub fn shutdown(self: &Arc<Self>) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        for provider in self.providers().iter().rev() {
            if let Err(err) = self.unregister(provider) {
                warn!("Failed to unregister {provider} while shutting down {}: {err}", self.name);
            }
        }
        self.modules.lock().clear();
        self.caches.lock().flush();
        info!("Domain {} shut down", self.name);
    }

    pub fn add_module(&self, module: Arc<Module>) -> Result<()> {
        self.ensure_active()?;
        let mut modules = self.modules.lock();
        if !modules.iter().any(|existing| Arc::ptr_eq(existing, &module)) {
            modules.push(module);
        }
        Ok(())
    }

    pub fn remove_module(&self, module: &Arc<Module>) -> bool {
        let mut modules = self.modules.lock();
        let before = modules.len();
        modules.retain(|existing| !Arc::ptr_eq(existing, module));
        before != modules.len()
    }

    pub fn modules(&self) -> Vec<Arc<Module>> {
        self.modules.lock().clone()
    }

    /// A module, other than `requester`, able to satisfy `requirement`.
    /// The parent domain is searched before or after the local modules as
    /// the parent policy dictates.
    pub fn find_module(
        &self,
        requirement: &Requirement,
        requester: &Arc<Module>,
    ) -> Result<Option<Arc<Module>>> {
        self.ensure_active()?;
        let parent = match &self.parent {
            Some(Loader::Domain(parent)) => Some(parent),
            _ => None,
        };

        if let Some(parent) = parent {
            if requirement.is_visible_through(self.policy.before_filter()) {
                if let Some(found) = parent.find_module(requirement, requester)? {
                    return Ok(Some(found));
                }
            }
        }

        let local = self
            .modules
            .lock()
            .iter()
            .find(|module| !Arc::ptr_eq(module, requester) && module.satisfies(requirement))
            .cloned();
        if local.is_some() {
            return Ok(local);
        }

        if let Some(parent) = parent {
            if requirement.is_visible_through(self.policy.after_filter()) {
                return parent.find_module(requirement, requester);
            }
        }
        Ok(None)
    }

    fn emit(&self, provider: Option<&Arc<Provider>>, event: &LoaderEvent) {
        let domain_handlers = self.handlers.read().clone();
        let system_handlers = self
            .system
            .upgrade()
            .map(|system| system.handlers())
            .unwrap_or_default();
        let provider_handlers = provider.map(|p| p.handlers()).unwrap_or_default();
        dispatch(
            &[
                provider_handlers,
                domain_handlers.as_slice(),
                system_handlers.as_slice(),
            ],
            event,
        );
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("parent", &self.parent)
            .field("providers", &self.topology.read().providers.len())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}
