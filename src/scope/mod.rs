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

//! Per-provider import bookkeeping.
//!
//! A `ScopeRegistry` lists a provider's imports by ordering class and keeps
//! a private cache pair for answers found through them. The caches only
//! exist while every import allows caching and blacklisting: the first
//! import that forbids either destroys them, and removing the last such
//! import brings back empty ones.

mod cache;

pub use cache::{Lookup, LookupCache};

use crate::delegate::{DelegateRef, ImportOrder, ImportScope};
use crate::error::Result;
use crate::loader::Loader;
use crate::models::{resource_package, unit_package};
use crate::provider::{PackageInfo, ProviderId, Resource};
use log::{debug, trace};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

type CachedLoader = (ImportOrder, Loader);

struct RegistryState {
    imports: HashMap<ImportScope, Vec<DelegateRef>>,
    non_cacheable: usize,
    non_blacklistable: usize,
    units: LookupCache<CachedLoader>,
    resources: LookupCache<CachedLoader>,
}

impl RegistryState {
    fn list(&self, scope: ImportScope) -> &[DelegateRef] {
        self.imports.get(&scope).map(Vec::as_slice).unwrap_or_default()
    }

    fn is_poisoned(&self) -> bool {
        self.non_cacheable > 0 || self.non_blacklistable > 0
    }

    fn flush(&mut self) {
        self.units.flush();
        self.resources.flush();
    }
}

pub struct ScopeRegistry {
    owner: Arc<str>,
    caching_allowed: bool,
    state: Mutex<RegistryState>,
}

impl ScopeRegistry {
    /// Builds a registry whose lists keep `imports` in declaration order.
    pub fn new(owner: Arc<str>, imports: &[DelegateRef], caching_allowed: bool) -> Self {
        let registry = Self {
            owner,
            caching_allowed,
            state: Mutex::new(RegistryState {
                imports: HashMap::new(),
                non_cacheable: 0,
                non_blacklistable: 0,
                units: LookupCache::new(caching_allowed),
                resources: LookupCache::new(caching_allowed),
            }),
        };
        for import in imports.iter().rev() {
            registry.add_import(import.clone());
        }
        registry
    }

    /// Inserts `import` at the head of its ordering class.
    pub fn add_import(&self, import: DelegateRef) {
        let mut state = self.state.lock();
        let was_poisoned = state.is_poisoned();

        for scope in [ImportScope::from(import.order()), ImportScope::All] {
            state.imports.entry(scope).or_default().insert(0, import.clone());
        }
        if !import.is_cacheable() {
            state.non_cacheable += 1;
        }
        if !import.is_blacklistable() {
            state.non_blacklistable += 1;
        }

        self.refresh(&mut state, was_poisoned);
        trace!("{}: imported {import}", self.owner);
    }

    pub fn remove_import(&self, import: &DelegateRef) -> bool {
        let mut state = self.state.lock();
        let was_poisoned = state.is_poisoned();

        let mut removed = false;
        for scope in [ImportScope::from(import.order()), ImportScope::All] {
            if let Some(list) = state.imports.get_mut(&scope) {
                let before = list.len();
                list.retain(|existing| existing != import);
                removed |= list.len() != before;
            }
        }
        if !removed {
            return false;
        }
        if !import.is_cacheable() {
            state.non_cacheable -= 1;
        }
        if !import.is_blacklistable() {
            state.non_blacklistable -= 1;
        }

        self.refresh(&mut state, was_poisoned);
        trace!("{}: dropped import {import}", self.owner);
        true
    }

    fn refresh(&self, state: &mut RegistryState, was_poisoned: bool) {
        let poisoned = state.is_poisoned();
        match (was_poisoned, poisoned) {
            (false, true) => {
                state.units.disable();
                state.resources.disable();
                debug!("{}: import cache destroyed by a non-caching import", self.owner);
            }
            (true, false) if self.caching_allowed => {
                state.units.enable();
                state.resources.enable();
                debug!("{}: import cache restored", self.owner);
            }
            // The import lists changed, so any answer may now be shadowed.
            _ => state.flush(),
        }
    }

    pub fn is_relevant(&self, order: ImportOrder) -> bool {
        !self.state.lock().list(order.into()).is_empty()
    }

    pub fn imports(&self, scope: ImportScope) -> Vec<DelegateRef> {
        self.state.lock().list(scope).to_vec()
    }

    pub fn imports_provider(&self, id: ProviderId) -> bool {
        self.state
            .lock()
            .list(ImportScope::All)
            .iter()
            .any(|import| import.targets(id))
    }

    /// Whether any import exposes `package`.
    pub fn covers(&self, package: &str) -> bool {
        let all = self.imports(ImportScope::All);
        all.iter().any(|import| import.covers_package(package))
    }

    pub fn is_caching(&self) -> bool {
        self.state.lock().units.is_enabled()
    }

    pub fn cached_loader(&self, name: &str) -> Option<Loader> {
        self.state.lock().units.get(name).map(|(_, loader)| loader)
    }

    pub fn is_blacklisted(&self, name: &str) -> bool {
        self.state.lock().units.is_negative(name)
    }

    pub fn poison_counts(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.non_cacheable, state.non_blacklistable)
    }

    pub fn invalidate(&self) {
        self.state.lock().flush();
    }

    /// First import of class `order` that can load `name`.
    ///
    /// Hits are cached only when the imports cover the unit's package. A
    /// miss is remembered only on the `After` pass, once both classes have
    /// been tried; later lookups of that name report `Lookup::Blacklisted`.
    pub fn find_loader(&self, order: ImportOrder, name: &str) -> Lookup<Loader> {
        let (generation, candidates, all) = {
            let state = self.state.lock();
            if let Some((cached_order, loader)) = state.units.get(name) {
                if cached_order == order {
                    return Lookup::Found(loader);
                }
            } else if state.units.is_negative(name) {
                return Lookup::Blacklisted;
            }
            (
                state.units.generation(),
                state.list(order.into()).to_vec(),
                state.list(ImportScope::All).to_vec(),
            )
        };

        let package = unit_package(name);
        let relevant = || all.iter().any(|import| import.covers_package(package));

        for import in &candidates {
            if let Some(loader) = import.find_unit_loader(name) {
                if relevant() {
                    self.state
                        .lock()
                        .units
                        .insert(generation, name, (order, loader.clone()));
                }
                return Lookup::Found(loader);
            }
        }

        if order == ImportOrder::After && relevant() {
            self.state.lock().units.insert_negative(generation, name);
        }
        Lookup::Missing
    }

    pub fn find_resource(&self, order: ImportOrder, path: &str) -> Result<Option<Resource>> {
        let (generation, candidates) = {
            let state = self.state.lock();
            if let Some((cached_order, loader)) = state.resources.get(path) {
                if cached_order == order {
                    drop(state);
                    return loader.resolve_resource(path);
                }
            }
            (state.resources.generation(), state.list(order.into()).to_vec())
        };

        for import in &candidates {
            if let Some(resource) = import.get_resource(path)? {
                if let Some(target) = import.target() {
                    self.state.lock().resources.insert(
                        generation,
                        path,
                        (order, Loader::Provider(target)),
                    );
                }
                return Ok(Some(resource));
            }
        }
        Ok(None)
    }

    pub fn find_resources(
        &self,
        order: ImportOrder,
        path: &str,
        out: &mut Vec<Resource>,
    ) -> Result<()> {
        let package = resource_package(path);
        for import in self.imports(order.into()) {
            if import.covers_package(&package) {
                import.get_resources(path, out)?;
            }
        }
        Ok(())
    }

    pub fn find_package(&self, order: ImportOrder, package: &str) -> Option<PackageInfo> {
        self.imports(order.into())
            .iter()
            .find_map(|import| import.get_package(package))
    }
}

impl std::fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ScopeRegistry")
            .field("owner", &self.owner)
            .field("imports", &state.list(ImportScope::All).len())
            .field("non_cacheable", &state.non_cacheable)
            .field("non_blacklistable", &state.non_blacklistable)
            .field("cached", &state.units.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{MemorySource, Provider};

    fn exporter(name: &str, units: &[&str], cacheable: bool) -> Arc<Provider> {
        let source = MemorySource::new();
        for unit in units {
            source.insert_unit(unit, unit.as_bytes());
        }
        Provider::builder(name, Arc::new(source))
            .export("com.a")
            .cacheable(cacheable)
            .build()
    }

    fn registry(imports: &[DelegateRef]) -> ScopeRegistry {
        ScopeRegistry::new(Arc::from("owner"), imports, true)
    }

    fn provider_of(loader: Option<Loader>) -> Option<ProviderId> {
        loader.and_then(|l| l.provider().map(|p| p.id()))
    }

    #[test]
    fn relevance_follows_ordering_classes() {
        let a = exporter("a", &["com.a.Foo"], true);
        let registry = registry(&[DelegateRef::to_provider(&a)]);
        assert!(registry.is_relevant(ImportOrder::Before));
        assert!(!registry.is_relevant(ImportOrder::After));
        assert!(registry.covers("com.a"));
        assert!(!registry.covers("com.b"));
    }

    #[test]
    fn declared_imports_keep_order_and_new_imports_win() {
        let first = exporter("first", &["com.a.Foo"], true);
        let second = exporter("second", &["com.a.Foo"], true);
        let registry = registry(&[
            DelegateRef::to_provider(&first),
            DelegateRef::to_provider(&second),
        ]);
        assert_eq!(
            provider_of(registry.find_loader(ImportOrder::Before, "com.a.Foo").found()),
            Some(first.id())
        );

        let newest = exporter("newest", &["com.a.Foo"], true);
        registry.add_import(DelegateRef::to_provider(&newest));
        assert_eq!(
            provider_of(registry.find_loader(ImportOrder::Before, "com.a.Foo").found()),
            Some(newest.id())
        );
    }

    #[test]
    fn hits_are_cached_and_misses_only_after() {
        let a = exporter("a", &["com.a.Foo"], true);
        let registry = registry(&[DelegateRef::to_provider(&a)]);

        assert!(registry.find_loader(ImportOrder::Before, "com.a.Foo").found().is_some());
        assert!(registry.cached_loader("com.a.Foo").is_some());

        assert!(registry.find_loader(ImportOrder::Before, "com.a.Missing").found().is_none());
        assert!(!registry.is_blacklisted("com.a.Missing"));
        assert!(matches!(
            registry.find_loader(ImportOrder::After, "com.a.Missing"),
            Lookup::Missing
        ));
        assert!(registry.is_blacklisted("com.a.Missing"));
        assert!(registry
            .find_loader(ImportOrder::After, "com.a.Missing")
            .is_blacklisted());
    }

    #[test]
    fn names_outside_covered_packages_are_not_cached() {
        let a = exporter("a", &["com.a.Foo"], true);
        let registry = registry(&[DelegateRef::to_provider(&a)]);
        assert!(registry.find_loader(ImportOrder::After, "org.z.Gone").found().is_none());
        assert!(!registry.is_blacklisted("org.z.Gone"));
    }

    #[test]
    fn cached_hit_is_scoped_to_its_ordering_class() {
        let a = exporter("a", &["com.a.Foo"], true);
        let registry = registry(&[DelegateRef::to_provider(&a).with_order(ImportOrder::After)]);
        assert!(registry.find_loader(ImportOrder::After, "com.a.Foo").found().is_some());
        assert!(registry.find_loader(ImportOrder::Before, "com.a.Foo").found().is_none());
    }

    #[test]
    fn non_cacheable_import_poisons_and_restores() {
        let a = exporter("a", &["com.a.Foo"], true);
        let registry = registry(&[DelegateRef::to_provider(&a)]);
        registry.find_loader(ImportOrder::Before, "com.a.Foo").found();
        assert!(registry.cached_loader("com.a.Foo").is_some());

        let volatile = exporter("volatile", &["com.a.Foo"], false);
        let poison = DelegateRef::to_provider(&volatile);
        registry.add_import(poison.clone());
        assert!(!registry.is_caching());
        assert!(registry.cached_loader("com.a.Foo").is_none());
        assert_eq!(registry.poison_counts(), (1, 0));

        assert_eq!(
            provider_of(registry.find_loader(ImportOrder::Before, "com.a.Foo").found()),
            Some(volatile.id())
        );
        assert!(registry.cached_loader("com.a.Foo").is_none());

        assert!(registry.remove_import(&poison));
        assert!(registry.is_caching());
        assert_eq!(registry.poison_counts(), (0, 0));
        assert!(!registry.remove_import(&poison));
    }

    #[test]
    fn resources_and_packages_come_from_imports() {
        let source = MemorySource::new().with_resource("com/a/data.txt", b"data");
        let a = Provider::builder("a", Arc::new(source)).export("com.a").build();
        let registry = registry(&[DelegateRef::to_provider(&a)]);

        let resource = registry
            .find_resource(ImportOrder::Before, "com/a/data.txt")
            .unwrap()
            .unwrap();
        assert_eq!(resource.provider, a.id());
        // Served from the cached loader the second time.
        assert!(registry
            .find_resource(ImportOrder::Before, "com/a/data.txt")
            .unwrap()
            .is_some());

        let mut all = Vec::new();
        registry
            .find_resources(ImportOrder::Before, "com/a/data.txt", &mut all)
            .unwrap();
        assert_eq!(all.len(), 1);
        assert!(registry.find_package(ImportOrder::Before, "com.a").is_some());
        assert!(registry.imports_provider(a.id()));
    }
}
