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

//! Handles to other providers used for imports.
//!
//! A delegate only ever exposes the target's exported packages, optionally
//! narrowed by a filter, and its lookups stop at the target's own source.
//! They never start a full domain resolution.

use crate::error::Result;
use crate::loader::Loader;
use crate::models::{NameFilter, resource_package, unit_package};
use crate::provider::{PackageInfo, Provider, ProviderId, Resource};
use log::warn;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// Ordering class of an import relative to the requester's own content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImportOrder {
    #[default]
    Before,
    After,
}

/// Key of a scope registry's import lists. `All` holds every import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportScope {
    Before,
    After,
    All,
}

impl From<ImportOrder> for ImportScope {
    fn from(order: ImportOrder) -> Self {
        match order {
            ImportOrder::Before => ImportScope::Before,
            ImportOrder::After => ImportScope::After,
        }
    }
}

/// Creates the target provider of a lazy delegate on first use.
pub trait ProviderFactory: Send + Sync {
    fn create(&self) -> Result<Arc<Provider>>;

    fn describe(&self) -> String {
        "provider factory".to_string()
    }

    fn cacheable(&self) -> bool {
        true
    }

    fn blacklistable(&self) -> bool {
        true
    }
}

impl<F> ProviderFactory for F
where
    F: Fn() -> Result<Arc<Provider>> + Send + Sync,
{
    fn create(&self) -> Result<Arc<Provider>> {
        self()
    }
}

enum DelegateTarget {
    Provider {
        id: ProviderId,
        label: Arc<str>,
        cacheable: bool,
        blacklistable: bool,
        provider: Weak<Provider>,
    },
    Factory {
        factory: Arc<dyn ProviderFactory>,
        created: Mutex<Option<Arc<Provider>>>,
    },
}

struct DelegateInner {
    target: DelegateTarget,
    order: ImportOrder,
    filter: Option<NameFilter>,
}

/// Cloneable handle; clones compare equal to each other and nothing else.
#[derive(Clone)]
pub struct DelegateRef {
    inner: Arc<DelegateInner>,
}

impl DelegateRef {
    pub fn to_provider(provider: &Arc<Provider>) -> Self {
        Self::new(
            DelegateTarget::Provider {
                id: provider.id(),
                label: provider.shared_name(),
                cacheable: provider.is_cacheable(),
                blacklistable: provider.is_blacklistable(),
                provider: Arc::downgrade(provider),
            },
            ImportOrder::Before,
            None,
        )
    }

    pub fn lazy(factory: Arc<dyn ProviderFactory>) -> Self {
        Self::new(
            DelegateTarget::Factory {
                factory,
                created: Mutex::new(None),
            },
            ImportOrder::Before,
            None,
        )
    }

    fn new(target: DelegateTarget, order: ImportOrder, filter: Option<NameFilter>) -> Self {
        Self {
            inner: Arc::new(DelegateInner {
                target,
                order,
                filter,
            }),
        }
    }

    fn rebuild(self, order: ImportOrder, filter: Option<NameFilter>) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => Self::new(inner.target, order, filter),
            Err(shared) => {
                let target = match &shared.target {
                    DelegateTarget::Provider {
                        id,
                        label,
                        cacheable,
                        blacklistable,
                        provider,
                    } => DelegateTarget::Provider {
                        id: *id,
                        label: Arc::clone(label),
                        cacheable: *cacheable,
                        blacklistable: *blacklistable,
                        provider: Weak::clone(provider),
                    },
                    DelegateTarget::Factory { factory, created } => DelegateTarget::Factory {
                        factory: Arc::clone(factory),
                        created: Mutex::new(created.lock().clone()),
                    },
                };
                Self::new(target, order, filter)
            }
        }
    }

    pub fn with_order(self, order: ImportOrder) -> Self {
        let filter = self.inner.filter.clone();
        self.rebuild(order, filter)
    }

    /// Narrows visibility to packages accepted by `filter`.
    pub fn with_filter(self, filter: NameFilter) -> Self {
        let order = self.inner.order;
        self.rebuild(order, Some(filter))
    }

    pub fn order(&self) -> ImportOrder {
        self.inner.order
    }

    pub fn filter(&self) -> Option<&NameFilter> {
        self.inner.filter.as_ref()
    }

    /// Id of the target, when it is already known without materialising.
    pub fn target_id(&self) -> Option<ProviderId> {
        match &self.inner.target {
            DelegateTarget::Provider { id, .. } => Some(*id),
            DelegateTarget::Factory { created, .. } => created.lock().as_ref().map(|p| p.id()),
        }
    }

    pub fn targets(&self, id: ProviderId) -> bool {
        self.target_id() == Some(id)
    }

    /// The target provider, creating it if this is a lazy delegate.
    pub fn target(&self) -> Option<Arc<Provider>> {
        match &self.inner.target {
            DelegateTarget::Provider { provider, .. } => provider.upgrade(),
            DelegateTarget::Factory { factory, created } => {
                let mut slot = created.lock();
                if let Some(provider) = slot.as_ref() {
                    return Some(Arc::clone(provider));
                }
                match factory.create() {
                    Ok(provider) => {
                        *slot = Some(Arc::clone(&provider));
                        Some(provider)
                    }
                    Err(err) => {
                        warn!("Failed to create {}: {err}", factory.describe());
                        None
                    }
                }
            }
        }
    }

    pub fn is_cacheable(&self) -> bool {
        match &self.inner.target {
            DelegateTarget::Provider { cacheable, .. } => *cacheable,
            DelegateTarget::Factory { factory, .. } => factory.cacheable(),
        }
    }

    pub fn is_blacklistable(&self) -> bool {
        match &self.inner.target {
            DelegateTarget::Provider { blacklistable, .. } => *blacklistable,
            DelegateTarget::Factory { factory, .. } => factory.blacklistable(),
        }
    }

    fn passes_filter(&self, package: &str) -> bool {
        self.inner
            .filter
            .as_ref()
            .is_none_or(|filter| filter.matches_package(package))
    }

    fn visible_target(&self, package: &str) -> Option<Arc<Provider>> {
        if !self.passes_filter(package) {
            return None;
        }
        self.target()
            .filter(|provider| provider.exports_package(package))
    }

    pub fn covers_package(&self, package: &str) -> bool {
        self.visible_target(package).is_some()
    }

    /// The target as a loader, if it exports and holds `name`.
    pub fn find_unit_loader(&self, name: &str) -> Option<Loader> {
        self.visible_target(unit_package(name))
            .filter(|provider| provider.can_load_local(name))
            .map(Loader::Provider)
    }

    pub fn get_resource(&self, path: &str) -> Result<Option<Resource>> {
        match self.visible_target(&resource_package(path)) {
            Some(provider) => provider.resource_local(path),
            None => Ok(None),
        }
    }

    pub fn get_resources(&self, path: &str, out: &mut Vec<Resource>) -> Result<()> {
        if let Some(resource) = self.get_resource(path)? {
            out.push(resource);
        }
        Ok(())
    }

    pub fn get_package(&self, package: &str) -> Option<PackageInfo> {
        self.visible_target(package)
            .and_then(|provider| provider.package_local(package))
    }
}

impl PartialEq for DelegateRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for DelegateRef {}

impl fmt::Debug for DelegateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateRef")
            .field("target", &self.to_string())
            .field("order", &self.inner.order)
            .field("filter", &self.inner.filter)
            .finish()
    }
}

impl fmt::Display for DelegateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.target {
            DelegateTarget::Provider { id, label, .. } => write!(f, "{label} ({id})"),
            DelegateTarget::Factory { factory, .. } => write!(f, "lazy {}", factory.describe()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoaderError;
    use crate::provider::MemorySource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn exporter() -> Arc<Provider> {
        let source = MemorySource::new()
            .with_unit("com.a.Foo", b"foo")
            .with_unit("com.hidden.Bar", b"bar")
            .with_resource("com/a/data.txt", b"data");
        Provider::builder("exporter", Arc::new(source))
            .export("com.a")
            .build()
    }

    #[test]
    fn only_exported_packages_are_visible() {
        let target = exporter();
        let delegate = DelegateRef::to_provider(&target);

        assert!(delegate.covers_package("com.a"));
        assert!(!delegate.covers_package("com.hidden"));
        assert!(delegate.find_unit_loader("com.a.Foo").is_some());
        assert!(delegate.find_unit_loader("com.hidden.Bar").is_none());
        assert!(delegate.get_resource("com/a/data.txt").unwrap().is_some());
        assert_eq!(delegate.get_package("com.a").unwrap().provider, target.id());
    }

    #[test]
    fn filter_narrows_visibility() {
        let target = exporter();
        let delegate = DelegateRef::to_provider(&target).with_filter(NameFilter::Nothing);
        assert!(!delegate.covers_package("com.a"));
        assert!(delegate.find_unit_loader("com.a.Foo").is_none());

        let mut found = Vec::new();
        delegate.get_resources("com/a/data.txt", &mut found).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn dropped_target_resolves_nothing() {
        let target = exporter();
        let delegate = DelegateRef::to_provider(&target);
        let id = target.id();
        drop(target);

        assert!(delegate.target().is_none());
        assert!(delegate.find_unit_loader("com.a.Foo").is_none());
        assert!(delegate.targets(id));
    }

    #[test]
    fn lazy_delegate_creates_target_once() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let factory = move || -> Result<Arc<Provider>> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(exporter())
        };
        let delegate = DelegateRef::lazy(Arc::new(factory));

        assert!(delegate.target_id().is_none());
        assert!(delegate.find_unit_loader("com.a.Foo").is_some());
        assert!(delegate.covers_package("com.a"));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(delegate.target_id().is_some());
    }

    #[test]
    fn failing_factory_yields_nothing() {
        let factory = || -> Result<Arc<Provider>> { Err(LoaderError::IllegalState("nope".into())) };
        let delegate = DelegateRef::lazy(Arc::new(factory));
        assert!(delegate.target().is_none());
        assert!(!delegate.covers_package("com.a"));
    }

    #[test]
    fn equality_is_identity() {
        let target = exporter();
        let a = DelegateRef::to_provider(&target);
        let b = DelegateRef::to_provider(&target);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);

        let after = a.clone().with_order(ImportOrder::After);
        assert_eq!(after.order(), ImportOrder::After);
        assert_ne!(after, a);
    }
}
