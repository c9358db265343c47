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

//! The closed set of things a resolution can end at.

use crate::domain::{Domain, ResolveOptions};
use crate::error::Result;
use crate::locking::LockManager;
use crate::provider::{ArtifactSource, PackageInfo, Provider, Resource, Unit};
use std::fmt;
use std::sync::Arc;

/// Adapter for loaders living outside a `LoaderSystem`, such as a
/// bootstrap parent.
pub trait ExternalLoader: Send + Sync {
    fn name(&self) -> &str;

    fn can_load(&self, name: &str) -> bool;

    fn load_unit(&self, name: &str) -> Result<Option<Arc<Unit>>>;

    fn get_resource(&self, path: &str) -> Result<Option<Resource>>;

    fn get_package(&self, _package: &str) -> Option<PackageInfo> {
        None
    }
}

/// Exposes a bare artifact source as an external loader. Everything in the
/// source is visible.
pub struct SourceLoader {
    provider: Arc<Provider>,
}

impl SourceLoader {
    pub fn new(name: impl Into<String>, source: Arc<dyn ArtifactSource>) -> Self {
        Self {
            provider: Provider::builder(name, source).build(),
        }
    }
}

impl ExternalLoader for SourceLoader {
    fn name(&self) -> &str {
        self.provider.name()
    }

    fn can_load(&self, name: &str) -> bool {
        self.provider.can_load_local(name)
    }

    fn load_unit(&self, name: &str) -> Result<Option<Arc<Unit>>> {
        self.provider.define_local(name)
    }

    fn get_resource(&self, path: &str) -> Result<Option<Resource>> {
        self.provider.resource_local(path)
    }

    fn get_package(&self, package: &str) -> Option<PackageInfo> {
        self.provider.package_local(package)
    }
}

#[derive(Clone)]
pub enum Loader {
    Provider(Arc<Provider>),
    Domain(Arc<Domain>),
    External(Arc<dyn ExternalLoader>),
}

impl Loader {
    pub fn name(&self) -> &str {
        match self {
            Loader::Provider(provider) => provider.name(),
            Loader::Domain(domain) => domain.name(),
            Loader::External(external) => external.name(),
        }
    }

    pub fn provider(&self) -> Option<&Arc<Provider>> {
        match self {
            Loader::Provider(provider) => Some(provider),
            _ => None,
        }
    }

    pub fn same_as(&self, other: &Loader) -> bool {
        match (self, other) {
            (Loader::Provider(a), Loader::Provider(b)) => Arc::ptr_eq(a, b),
            (Loader::Domain(a), Loader::Domain(b)) => Arc::ptr_eq(a, b),
            (Loader::External(a), Loader::External(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }

    /// Materialises `name`. A provider defines it under its own lock.
    pub fn resolve_unit(&self, locks: &LockManager, name: &str) -> Result<Option<Arc<Unit>>> {
        match self {
            Loader::Provider(provider) => {
                let target = Arc::clone(provider);
                let name = name.to_string();
                locks.run(provider.lock_scope(), move || target.define_local(&name))?
            }
            Loader::Domain(domain) => domain.load_unit(None, name, ResolveOptions::default()),
            Loader::External(external) => external.load_unit(name),
        }
    }

    pub fn resolve_resource(&self, path: &str) -> Result<Option<Resource>> {
        match self {
            Loader::Provider(provider) => provider.resource_local(path),
            Loader::Domain(domain) => domain.get_resource(None, path),
            Loader::External(external) => external.get_resource(path),
        }
    }

    pub fn resolve_resources(&self, path: &str, out: &mut Vec<Resource>) -> Result<()> {
        match self {
            Loader::Domain(domain) => {
                out.extend(domain.get_resources(None, path)?);
                Ok(())
            }
            _ => {
                if let Some(resource) = self.resolve_resource(path)? {
                    out.push(resource);
                }
                Ok(())
            }
        }
    }

    pub fn resolve_package(&self, package: &str) -> Result<Option<PackageInfo>> {
        match self {
            Loader::Provider(provider) => Ok(provider.package_local(package)),
            Loader::Domain(domain) => domain.get_package(None, package),
            Loader::External(external) => Ok(external.get_package(package)),
        }
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loader::Provider(provider) => write!(f, "Loader::Provider({provider})"),
            Loader::Domain(domain) => write!(f, "Loader::Domain({})", domain.name()),
            Loader::External(external) => write!(f, "Loader::External({})", external.name()),
        }
    }
}

impl fmt::Display for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
