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

use crate::delegate::ImportOrder;
use crate::domain::{Domain, ResolveOptions};
use crate::error::{LoaderError, Result};
use crate::events::LoaderEvent;
use crate::loader::Loader;
use crate::models::{resource_package, unit_package};
use crate::provider::{PackageInfo, Provider, ProviderId, Resource, Unit};
use crate::scope::Lookup;
use log::trace;
use std::collections::HashSet;
use std::sync::Arc;

impl Domain {
    pub fn find_loader(
        &self,
        requester: Option<&Arc<Provider>>,
        name: &str,
        all_exports: bool,
        try_parent: bool,
    ) -> Result<Option<Loader>> {
        self.find_loader_with(
            requester,
            name,
            all_exports,
            try_parent,
            ResolveOptions::default(),
        )
    }

    /// Finds the loader that answers for `name`, trying in order: the
    /// parent (before filter), every exporter in the domain, the requester's
    /// `Before` imports, the requester itself, its `After` imports and
    /// finally the parent (after filter).
    ///
    /// With `fail_if_blacklisted`, a name that no step supplies and that a
    /// negative cache already recorded fails with a blacklisted `NotFound`.
    pub fn find_loader_with(
        &self,
        requester: Option<&Arc<Provider>>,
        name: &str,
        all_exports: bool,
        try_parent: bool,
        options: ResolveOptions,
    ) -> Result<Option<Loader>> {
        self.ensure_active()?;
        let all_exports = all_exports || requester.is_some_and(|r| r.imports_all());
        let registry = requester.and_then(|r| r.registry());
        let mut blacklisted = false;

        if try_parent && self.policy.before_filter().matches_unit(name) {
            if let Some(loader) = self.find_in_parent(name)? {
                trace!("{name}: parent (before) answered in {}", self.name);
                return Ok(Some(loader));
            }
        }

        if all_exports {
            match self.find_in_exports(name) {
                Lookup::Found(loader) => {
                    trace!("{name}: exported by {loader}");
                    return Ok(Some(loader));
                }
                Lookup::Blacklisted => blacklisted = true,
                Lookup::Missing => {}
            }
        }

        if let Some(registry) = &registry {
            if registry.is_relevant(ImportOrder::Before) {
                match registry.find_loader(ImportOrder::Before, name) {
                    Lookup::Found(loader) => {
                        trace!("{name}: imported (before) from {loader}");
                        return Ok(Some(loader));
                    }
                    Lookup::Blacklisted => blacklisted = true,
                    Lookup::Missing => {}
                }
            }
        }

        if let Some(requester) = requester {
            if let Some(loader) = self.find_requester_local(requester, name) {
                trace!("{name}: local to {requester}");
                return Ok(Some(loader));
            }
        }

        if let Some(registry) = &registry {
            if registry.is_relevant(ImportOrder::After) {
                match registry.find_loader(ImportOrder::After, name) {
                    Lookup::Found(loader) => {
                        trace!("{name}: imported (after) from {loader}");
                        return Ok(Some(loader));
                    }
                    Lookup::Blacklisted => blacklisted = true,
                    Lookup::Missing => {}
                }
            }
        }

        if try_parent && self.policy.after_filter().matches_unit(name) {
            if let Some(loader) = self.find_in_parent(name)? {
                trace!("{name}: parent (after) answered in {}", self.name);
                return Ok(Some(loader));
            }
        }

        if blacklisted && options.fail_if_blacklisted {
            return Err(LoaderError::blacklisted(name));
        }
        trace!("{name}: not found in {}", self.name);
        Ok(None)
    }

    fn find_in_parent(&self, name: &str) -> Result<Option<Loader>> {
        match &self.parent {
            Some(Loader::Domain(parent)) => parent.find_loader(None, name, true, true),
            Some(Loader::External(external)) => {
                Ok(external.can_load(name).then(|| Loader::External(Arc::clone(external))))
            }
            Some(Loader::Provider(provider)) => Ok(provider
                .can_load_local(name)
                .then(|| Loader::Provider(Arc::clone(provider)))),
            None => Ok(None),
        }
    }

    /// Scans the exporters of `name`'s package in index order. Answers are
    /// cached only if every exporter visited allows it.
    fn find_in_exports(&self, name: &str) -> Lookup<Loader> {
        let generation = {
            let caches = self.caches.lock();
            if let Some(loader) = caches.units.get(name) {
                return Lookup::Found(loader);
            }
            if caches.units.is_negative(name) {
                return Lookup::Blacklisted;
            }
            caches.units.generation()
        };

        let mut cacheable = true;
        let mut blacklistable = true;
        for exporter in self.exporters(unit_package(name)) {
            cacheable &= exporter.is_cacheable();
            blacklistable &= exporter.is_blacklistable();
            if exporter.can_load_local(name) {
                let loader = Loader::Provider(exporter);
                if cacheable {
                    self.caches
                        .lock()
                        .units
                        .insert(generation, name, loader.clone());
                }
                return Lookup::Found(loader);
            }
        }

        if blacklistable && self.caches.lock().units.insert_negative(generation, name) {
            trace!("{name}: blacklisted in {}", self.name);
        }
        Lookup::Missing
    }

    fn find_requester_local(&self, requester: &Arc<Provider>, name: &str) -> Option<Loader> {
        let key = (requester.id(), name.to_string());
        let generation = {
            let caches = self.caches.lock();
            if let Some(loader) = caches.local.get(&key) {
                return Some(loader.clone());
            }
            caches.units.generation()
        };

        if !requester.can_load_local(name) {
            return None;
        }
        let loader = Loader::Provider(Arc::clone(requester));
        if requester.is_cacheable() {
            let mut caches = self.caches.lock();
            if caches.units.is_enabled() && caches.units.generation() == generation {
                caches.local.insert(key, loader.clone());
            }
        }
        Some(loader)
    }

    /// Resolves and materialises `name`. Without a requester every
    /// exporter in the domain is visible.
    pub fn load_unit(
        &self,
        requester: Option<&Arc<Provider>>,
        name: &str,
        options: ResolveOptions,
    ) -> Result<Option<Arc<Unit>>> {
        let found = self.find_loader_with(requester, name, requester.is_none(), true, options);
        let loader = match found {
            Ok(loader) => loader,
            Err(err) => {
                if err.is_not_found() {
                    self.emit_not_found(requester, name);
                }
                return Err(err);
            }
        };

        let unit = match &loader {
            Some(loader) => loader.resolve_unit(&self.locks, name)?,
            None => None,
        };

        match &unit {
            Some(unit) => self.emit(
                requester,
                &LoaderEvent::UnitFound {
                    domain: self.name.clone(),
                    name: name.to_string(),
                    provider: unit.provider_name().to_string(),
                },
            ),
            None => self.emit_not_found(requester, name),
        }
        Ok(unit)
    }

    fn emit_not_found(&self, requester: Option<&Arc<Provider>>, name: &str) {
        self.emit(
            requester,
            &LoaderEvent::UnitNotFound {
                domain: self.name.clone(),
                name: name.to_string(),
            },
        );
    }

    fn parent_resource(&self, path: &str) -> Result<Option<Resource>> {
        match &self.parent {
            Some(parent) => parent.resolve_resource(path),
            None => Ok(None),
        }
    }

    /// First resource found for `path`, using the unit search order.
    pub fn get_resource(
        &self,
        requester: Option<&Arc<Provider>>,
        path: &str,
    ) -> Result<Option<Resource>> {
        self.ensure_active()?;
        let registry = requester.and_then(|r| r.registry());
        let all_exports = requester.is_none_or(|r| r.imports_all());

        if self.policy.before_filter().matches_resource(path) {
            if let Some(resource) = self.parent_resource(path)? {
                return Ok(Some(resource));
            }
        }
        if all_exports {
            if let Some(resource) = self.find_resource_in_exports(path)? {
                return Ok(Some(resource));
            }
        }
        if let Some(registry) = &registry {
            if registry.is_relevant(ImportOrder::Before) {
                if let Some(resource) = registry.find_resource(ImportOrder::Before, path)? {
                    return Ok(Some(resource));
                }
            }
        }
        if let Some(requester) = requester {
            if let Some(resource) = requester.resource_local(path)? {
                return Ok(Some(resource));
            }
        }
        if let Some(registry) = &registry {
            if registry.is_relevant(ImportOrder::After) {
                if let Some(resource) = registry.find_resource(ImportOrder::After, path)? {
                    return Ok(Some(resource));
                }
            }
        }
        if self.policy.after_filter().matches_resource(path) {
            return self.parent_resource(path);
        }
        Ok(None)
    }

    fn find_resource_in_exports(&self, path: &str) -> Result<Option<Resource>> {
        let (cached, generation) = {
            let caches = self.caches.lock();
            if caches.resources.is_negative(path) {
                return Ok(None);
            }
            (caches.resources.get(path), caches.resources.generation())
        };
        if let Some(loader) = cached {
            if let Some(resource) = loader.resolve_resource(path)? {
                return Ok(Some(resource));
            }
        }

        let mut cacheable = true;
        let mut blacklistable = true;
        for exporter in self.exporters(&resource_package(path)) {
            cacheable &= exporter.is_cacheable();
            blacklistable &= exporter.is_blacklistable();
            if let Some(resource) = exporter.resource_local(path)? {
                if cacheable {
                    self.caches
                        .lock()
                        .resources
                        .insert(generation, path, Loader::Provider(exporter));
                }
                return Ok(Some(resource));
            }
        }
        if blacklistable {
            self.caches.lock().resources.insert_negative(generation, path);
        }
        Ok(None)
    }

    /// Every resource named `path` visible from `requester`, in search
    /// order, at most one per provider.
    pub fn get_resources(
        &self,
        requester: Option<&Arc<Provider>>,
        path: &str,
    ) -> Result<Vec<Resource>> {
        self.ensure_active()?;
        let registry = requester.and_then(|r| r.registry());
        let all_exports = requester.is_none_or(|r| r.imports_all());
        let mut found = Vec::new();

        if self.policy.before_filter().matches_resource(path) {
            if let Some(parent) = &self.parent {
                parent.resolve_resources(path, &mut found)?;
            }
        }
        if all_exports {
            for exporter in self.exporters(&resource_package(path)) {
                found.extend(exporter.resource_local(path)?);
            }
        }
        if let Some(registry) = &registry {
            registry.find_resources(ImportOrder::Before, path, &mut found)?;
        }
        if let Some(requester) = requester {
            found.extend(requester.resource_local(path)?);
        }
        if let Some(registry) = &registry {
            registry.find_resources(ImportOrder::After, path, &mut found)?;
        }
        if self.policy.after_filter().matches_resource(path) {
            if let Some(parent) = &self.parent {
                parent.resolve_resources(path, &mut found)?;
            }
        }

        let mut seen: HashSet<ProviderId> = HashSet::new();
        found.retain(|resource| seen.insert(resource.provider));
        Ok(found)
    }

    pub fn get_package(
        &self,
        requester: Option<&Arc<Provider>>,
        package: &str,
    ) -> Result<Option<PackageInfo>> {
        self.ensure_active()?;
        let registry = requester.and_then(|r| r.registry());
        let all_exports = requester.is_none_or(|r| r.imports_all());

        if self.policy.before_filter().matches_package(package) {
            if let Some(parent) = &self.parent {
                if let Some(info) = parent.resolve_package(package)? {
                    return Ok(Some(info));
                }
            }
        }
        if all_exports {
            if let Some(info) = self
                .exporters(package)
                .iter()
                .find_map(|exporter| exporter.package_local(package))
            {
                return Ok(Some(info));
            }
        }
        if let Some(registry) = &registry {
            if let Some(info) = registry.find_package(ImportOrder::Before, package) {
                return Ok(Some(info));
            }
        }
        if let Some(info) = requester.and_then(|r| r.package_local(package)) {
            return Ok(Some(info));
        }
        if let Some(registry) = &registry {
            if let Some(info) = registry.find_package(ImportOrder::After, package) {
                return Ok(Some(info));
            }
        }
        if self.policy.after_filter().matches_package(package) {
            if let Some(parent) = &self.parent {
                return parent.resolve_package(package);
            }
        }
        Ok(None)
    }
}
