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

use crate::domain::Domain;
use crate::models::{SplitPolicy, Version};
use crate::provider::Provider;
use crate::space::{Capability, Requirement, Space};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static NEXT_MODULE_ID: AtomicU64 = AtomicU64::new(1);

/// A provider together with the capabilities it offers and the
/// requirements it has on other modules.
pub struct Module {
    id: u64,
    name: String,
    provider: Arc<Provider>,
    capabilities: Vec<Capability>,
    requirements: Vec<Requirement>,
    space: Mutex<Option<Arc<Space>>>,
    resolved: AtomicBool,
}

impl Module {
    pub fn builder(provider: Arc<Provider>) -> ModuleBuilder {
        ModuleBuilder::new(provider)
    }

    /// A module exporting the provider's packages and nothing else.
    pub fn from_provider(provider: Arc<Provider>) -> Arc<Self> {
        ModuleBuilder::new(provider).build()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider(&self) -> &Arc<Provider> {
        &self.provider
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Non-optional package exports with their split policies.
    pub fn exported_packages(&self) -> impl Iterator<Item = (&str, SplitPolicy)> {
        self.capabilities.iter().filter_map(|capability| match capability {
            Capability::Package {
                name,
                split_policy,
                optional: false,
                ..
            } => Some((name.as_str(), *split_policy)),
            _ => None,
        })
    }

    pub fn satisfies(&self, requirement: &Requirement) -> bool {
        self.capabilities
            .iter()
            .any(|capability| requirement.is_satisfied_by(capability))
    }

    pub fn space(&self) -> Option<Arc<Space>> {
        self.space.lock().clone()
    }

    pub(crate) fn set_space(&self, space: Option<Arc<Space>>) {
        *self.space.lock() = space;
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }

    pub(crate) fn set_resolved(&self, resolved: bool) {
        self.resolved.store(resolved, Ordering::Release);
    }

    pub fn domain(&self) -> Option<Arc<Domain>> {
        self.provider.domain()
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("provider", &self.provider.id())
            .field("capabilities", &self.capabilities)
            .field("requirements", &self.requirements)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

pub struct ModuleBuilder {
    name: String,
    version: Option<Version>,
    provider: Arc<Provider>,
    capabilities: Vec<Capability>,
    requirements: Vec<Requirement>,
    export_provider_packages: bool,
}

impl ModuleBuilder {
    pub fn new(provider: Arc<Provider>) -> Self {
        Self {
            name: provider.name().to_string(),
            version: None,
            provider,
            capabilities: Vec::new(),
            requirements: Vec::new(),
            export_provider_packages: true,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn requirement(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Skip deriving package capabilities from the provider's exports.
    pub fn without_provider_exports(mut self) -> Self {
        self.export_provider_packages = false;
        self
    }

    pub fn build(self) -> Arc<Module> {
        let mut capabilities = vec![Capability::Module {
            name: self.name.clone(),
            version: self.version,
        }];
        if self.export_provider_packages {
            for export in self.provider.exports() {
                let declared = self
                    .capabilities
                    .iter()
                    .any(|c| matches!(c, Capability::Package { name, .. } if *name == export.name));
                if !declared {
                    capabilities.push(Capability::Package {
                        name: export.name.clone(),
                        version: self.provider.package_version(&export.name).cloned(),
                        split_policy: export.split,
                        optional: false,
                    });
                }
            }
        }
        capabilities.extend(self.capabilities);

        Arc::new(Module {
            id: NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            provider: self.provider,
            capabilities,
            requirements: self.requirements,
            space: Mutex::new(None),
            resolved: AtomicBool::new(false),
        })
    }
}
