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

//! The explicit registry that owns every domain, the shared lock manager and
//! the system-level event handlers.

use crate::config::LoaderConfig;
use crate::domain::{Domain, ParentPolicy};
use crate::error::{LoaderError, Result};
use crate::events::EventHandler;
use crate::loader::{ExternalLoader, Loader};
use crate::locking::LockManager;
use crate::provider::{ArtifactSource, Provider, ProviderBuilder};
use crate::space::{Module, Space};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub const DEFAULT_DOMAIN: &str = "default";

pub(crate) struct SystemShared {
    config: LoaderConfig,
    default_policy: ParentPolicy,
    locks: Arc<LockManager>,
    /// Creation order; children always follow their parent.
    domains: RwLock<Vec<Arc<Domain>>>,
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
    active: AtomicBool,
}

impl SystemShared {
    pub(crate) fn domains(&self) -> Vec<Arc<Domain>> {
        self.domains.read().clone()
    }

    pub(crate) fn handlers(&self) -> Vec<Arc<dyn EventHandler>> {
        self.handlers.read().clone()
    }

    fn find(&self, name: &str) -> Option<Arc<Domain>> {
        self.domains
            .read()
            .iter()
            .find(|domain| domain.name() == name)
            .cloned()
    }
}

pub struct LoaderSystem {
    shared: Arc<SystemShared>,
}

impl LoaderSystem {
    /// Builds an inactive system. Call [`LoaderSystem::init`] before use.
    pub fn new(config: LoaderConfig) -> Result<Self> {
        let locks = Arc::new(LockManager::from_config(&config.locking)?);
        let default_policy = config.domain.parent_policy()?;
        Ok(Self {
            shared: Arc::new(SystemShared {
                config,
                default_policy,
                locks,
                domains: RwLock::new(Vec::new()),
                handlers: RwLock::new(Vec::new()),
                active: AtomicBool::new(false),
            }),
        })
    }

    /// Activates the system and creates the default domain. Calling it on an
    /// active system does nothing.
    pub fn init(&self) -> Result<()> {
        if self.shared.active.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if self.shared.find(DEFAULT_DOMAIN).is_none() {
            self.insert_domain(DEFAULT_DOMAIN, None, self.shared.default_policy.clone())?;
        }
        info!("Loader system initialised");
        Ok(())
    }

    /// Shuts every domain down, children before parents. Idempotent.
    pub fn shutdown(&self) {
        if !self.shared.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let domains: Vec<Arc<Domain>> = std::mem::take(&mut *self.shared.domains.write());
        for domain in domains.iter().rev() {
            domain.shutdown();
        }
        info!("Loader system shut down ({} domains)", domains.len());
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(LoaderError::IllegalState(
                "loader system is not active".to_string(),
            ))
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.shared.config
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.shared.locks
    }

    /// Creates a domain whose parent is another domain of this system, or
    /// none. `policy` defaults to the configured parent policy.
    pub fn create_domain(
        &self,
        name: &str,
        parent: Option<&str>,
        policy: Option<ParentPolicy>,
    ) -> Result<Arc<Domain>> {
        self.ensure_active()?;
        let parent = match parent {
            Some(parent_name) => {
                let parent = self
                    .shared
                    .find(parent_name)
                    .ok_or_else(|| LoaderError::UnknownDomain(parent_name.to_string()))?;
                Some(Loader::Domain(parent))
            }
            None => None,
        };
        let policy = policy.unwrap_or_else(|| self.shared.default_policy.clone());
        self.insert_domain(name, parent, policy)
    }

    /// Creates a domain delegating to a loader outside this system.
    pub fn create_domain_with_loader(
        &self,
        name: &str,
        parent: Arc<dyn ExternalLoader>,
        policy: Option<ParentPolicy>,
    ) -> Result<Arc<Domain>> {
        self.ensure_active()?;
        let policy = policy.unwrap_or_else(|| self.shared.default_policy.clone());
        self.insert_domain(name, Some(Loader::External(parent)), policy)
    }

    fn insert_domain(
        &self,
        name: &str,
        parent: Option<Loader>,
        policy: ParentPolicy,
    ) -> Result<Arc<Domain>> {
        let mut domains = self.shared.domains.write();
        if domains.iter().any(|domain| domain.name() == name) {
            return Err(LoaderError::DuplicateDomain(name.to_string()));
        }
        let domain = Domain::create(
            name.to_string(),
            policy,
            parent,
            Arc::clone(&self.shared.locks),
            self.shared.config.cache.enabled,
            Arc::downgrade(&self.shared),
        );
        domains.push(Arc::clone(&domain));
        Ok(domain)
    }

    pub fn default_domain(&self) -> Result<Arc<Domain>> {
        self.domain(DEFAULT_DOMAIN)
    }

    pub fn domain(&self, name: &str) -> Result<Arc<Domain>> {
        self.ensure_active()?;
        self.shared
            .find(name)
            .ok_or_else(|| LoaderError::UnknownDomain(name.to_string()))
    }

    pub fn domains(&self) -> Vec<Arc<Domain>> {
        self.shared.domains()
    }

    /// Shuts a domain down and forgets it. A domain that is still the parent
    /// of another domain cannot be removed.
    pub fn remove_domain(&self, name: &str) -> Result<()> {
        self.ensure_active()?;
        let removed = {
            let mut domains = self.shared.domains.write();
            let position = domains
                .iter()
                .position(|domain| domain.name() == name)
                .ok_or_else(|| LoaderError::UnknownDomain(name.to_string()))?;
            let target = Arc::clone(&domains[position]);
            let child = domains.iter().find(|domain| {
                matches!(domain.parent(), Some(Loader::Domain(parent)) if Arc::ptr_eq(parent, &target))
            });
            if let Some(child) = child {
                return Err(LoaderError::IllegalState(format!(
                    "domain '{name}' is the parent of '{}'",
                    child.name()
                )));
            }
            domains.remove(position)
        };
        removed.shutdown();
        Ok(())
    }

    /// A builder carrying the configured shutdown policy.
    pub fn provider_builder(
        &self,
        name: impl Into<String>,
        source: Arc<dyn ArtifactSource>,
    ) -> ProviderBuilder {
        Provider::builder(name, source).shutdown_policy(self.shared.config.domain.shutdown)
    }

    pub fn register(&self, domain: &str, provider: &Arc<Provider>) -> Result<()> {
        self.domain(domain)?.register(provider)
    }

    pub fn unregister(&self, provider: &Arc<Provider>) -> Result<()> {
        self.ensure_active()?;
        let domain = provider
            .domain()
            .ok_or_else(|| LoaderError::NotRegistered(provider.name().to_string()))?;
        domain.unregister(provider)
    }

    /// Registers the module's provider with `domain` (unless it already is)
    /// and places the module in a fresh space. Everything is undone if any
    /// step fails.
    pub fn install_module(&self, domain: &str, module: &Arc<Module>) -> Result<Arc<Space>> {
        let domain = self.domain(domain)?;
        let provider = module.provider();
        let registered_here = match provider.domain() {
            Some(current) if Arc::ptr_eq(&current, &domain) => false,
            Some(current) => {
                return Err(LoaderError::IllegalState(format!(
                    "{provider} is registered with domain '{}'",
                    current.name()
                )));
            }
            None => {
                domain.register(provider)?;
                true
            }
        };

        let space = Space::new();
        let installed = domain
            .add_module(Arc::clone(module))
            .and_then(|()| space.join(module));
        if let Err(err) = installed {
            domain.remove_module(module);
            if registered_here {
                if let Err(rollback) = domain.unregister(provider) {
                    warn!("Rolling back installation of {module} failed: {rollback}");
                }
            }
            return Err(err);
        }
        debug!("Installed module {module} in domain {}", domain.name());
        Ok(space)
    }

    pub fn resolve_module(&self, module: &Arc<Module>) -> Result<bool> {
        self.ensure_active()?;
        let space = module.space().ok_or_else(|| {
            LoaderError::IllegalState(format!("module {module} is not installed"))
        })?;
        let domain = module
            .domain()
            .ok_or_else(|| LoaderError::NotRegistered(module.provider().name().to_string()))?;
        space.resolve(module, &domain)
    }

    /// Splits the module out of its space, forgets it and unregisters its
    /// provider.
    pub fn uninstall_module(&self, module: &Arc<Module>) -> Result<()> {
        self.ensure_active()?;
        if let Some(space) = module.space() {
            space.split(module);
        }
        if let Some(domain) = module.domain() {
            domain.remove_module(module);
            domain.unregister(module.provider())?;
        }
        debug!("Uninstalled module {module}");
        Ok(())
    }

    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        self.shared.handlers.write().push(handler);
    }
}

impl Drop for LoaderSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LoaderEvent;
    use crate::loader::SourceLoader;
    use crate::provider::ShutdownPolicy;
    use crate::test::fixtures::{provider, unit_source};
    use parking_lot::Mutex;
    use serial_test::serial;

    fn system() -> LoaderSystem {
        let system = LoaderSystem::new(LoaderConfig::default()).unwrap();
        system.init().unwrap();
        system
    }

    #[test]
    #[serial]
    fn operations_require_init() {
        let system = LoaderSystem::new(LoaderConfig::default()).unwrap();
        assert!(matches!(
            system.default_domain(),
            Err(LoaderError::IllegalState(_))
        ));
        system.init().unwrap();
        system.init().unwrap();
        assert_eq!(system.default_domain().unwrap().name(), DEFAULT_DOMAIN);
        assert_eq!(system.domains().len(), 1);
    }

    #[test]
    #[serial]
    fn domains_are_named_uniquely_and_chain_to_parents() {
        let system = system();
        let child = system.create_domain("child", Some(DEFAULT_DOMAIN), None).unwrap();
        assert!(matches!(child.parent(), Some(Loader::Domain(_))));
        assert_eq!(child.policy(), &ParentPolicy::before());

        assert!(matches!(
            system.create_domain("child", None, None),
            Err(LoaderError::DuplicateDomain(_))
        ));
        assert!(matches!(
            system.create_domain("orphan", Some("missing"), None),
            Err(LoaderError::UnknownDomain(_))
        ));

        let shared = provider("shared", &["com.shared"], &["com.shared.Util"]);
        system.register(DEFAULT_DOMAIN, &shared).unwrap();
        let unit = child.load_unit(None, "com.shared.Util", Default::default()).unwrap();
        assert_eq!(unit.unwrap().provider(), shared.id());
    }

    #[test]
    #[serial]
    fn parent_domain_cannot_be_removed_first() {
        let system = system();
        system.create_domain("child", Some(DEFAULT_DOMAIN), None).unwrap();
        assert!(matches!(
            system.remove_domain(DEFAULT_DOMAIN),
            Err(LoaderError::IllegalState(_))
        ));

        let child = system.domain("child").unwrap();
        system.remove_domain("child").unwrap();
        assert!(child.is_shut_down());
        system.remove_domain(DEFAULT_DOMAIN).unwrap();
        assert!(system.domains().is_empty());
    }

    #[test]
    #[serial]
    fn external_parent_loader() {
        let system = system();
        let platform = SourceLoader::new("platform", unit_source(&["java.lang.Object"]));
        let domain = system
            .create_domain_with_loader("app", Arc::new(platform), None)
            .unwrap();
        let unit = domain
            .load_unit(None, "java.lang.Object", Default::default())
            .unwrap()
            .unwrap();
        assert_eq!(unit.name(), "java.lang.Object");
    }

    #[test]
    #[serial]
    fn shutdown_is_final() {
        let system = system();
        let domain = system.default_domain().unwrap();
        let p = provider("p", &["com.p"], &["com.p.A"]);
        system.register(DEFAULT_DOMAIN, &p).unwrap();

        system.shutdown();
        assert!(domain.is_shut_down());
        assert!(!p.is_registered());
        assert!(matches!(
            system.create_domain("late", None, None),
            Err(LoaderError::IllegalState(_))
        ));
        assert!(system.register(DEFAULT_DOMAIN, &p).unwrap_err().is_illegal_state());
        system.shutdown();
    }

    #[test]
    #[serial]
    fn provider_builder_uses_configured_shutdown_policy() {
        let config = LoaderConfig::from_toml_str("[domain]\nshutdown = \"garbage-collect\"\n")
            .unwrap();
        let system = LoaderSystem::new(config).unwrap();
        let p = system.provider_builder("p", unit_source(&[])).build();
        assert_eq!(p.shutdown_policy(), ShutdownPolicy::GarbageCollect);
    }

    #[test]
    #[serial]
    fn system_handlers_see_domain_events() {
        let system = system();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        system.add_handler(Arc::new(move |event: &LoaderEvent| -> Result<()> {
            sink.lock().push(event.kind());
            Ok(())
        }));

        let p = provider("p", &["com.p"], &["com.p.A"]);
        system.register(DEFAULT_DOMAIN, &p).unwrap();
        system.unregister(&p).unwrap();
        assert_eq!(
            *seen.lock(),
            vec!["provider-registered", "provider-unregistered"]
        );
    }

    #[test]
    #[serial]
    fn module_install_resolve_uninstall() {
        let system = system();
        let lib = Module::from_provider(provider("lib", &["com.lib"], &["com.lib.Api"]));
        let app = Module::builder(provider("app", &[], &[]))
            .requirement(crate::space::Requirement::package(
                "com.lib",
                crate::models::VersionRange::ALL,
            ))
            .build();

        system.install_module(DEFAULT_DOMAIN, &lib).unwrap();
        system.install_module(DEFAULT_DOMAIN, &app).unwrap();
        assert!(system.resolve_module(&app).unwrap());
        assert_eq!(app.space().unwrap().len(), 2);
        assert!(app.provider().load_unit("com.lib.Api").unwrap().is_some());

        system.uninstall_module(&lib).unwrap();
        assert!(lib.space().is_none());
        assert!(!lib.provider().is_registered());
        assert!(app.provider().load_unit("com.lib.Api").unwrap().is_none());
    }

    #[test]
    #[serial]
    fn failed_install_is_rolled_back() {
        let system = system();
        let module = Module::from_provider(provider("m", &["com.m"], &[]));
        Space::new().join(&module).unwrap();

        let err = system.install_module(DEFAULT_DOMAIN, &module).unwrap_err();
        assert!(err.is_illegal_state());
        assert!(!module.provider().is_registered());
        assert!(system.default_domain().unwrap().modules().is_empty());
    }
}
