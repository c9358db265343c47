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

//! Resolution spaces: consistency groups of modules that depend on each
//! other.
//!
//! Within one space a package has at most one owning module, unless the
//! newcomer's export allows a split, and no two requirements on the same
//! package or module may have disjoint version ranges. Resolving a
//! requirement against a module from another space merges the two spaces,
//! always moving the smaller one into the larger. A failed merge leaves both
//! spaces exactly as they were.
//!
//! Removing a module only drops its own ownership and requirement entries.
//! Remaining members are not re-partitioned and no new owner is chosen for
//! packages the module owned.

mod capability;
mod module;

pub use capability::{Capability, Requirement};
pub use module::{Module, ModuleBuilder};

use crate::delegate::DelegateRef;
use crate::domain::Domain;
use crate::error::{ErrorContext, LoaderError, Result};
use crate::models::{NameFilter, SplitPolicy};
use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

static NEXT_SPACE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
struct RequirementRecord {
    requirement: Requirement,
    resolved_by: Option<u64>,
}

impl RequirementRecord {
    fn is_satisfied(&self) -> bool {
        self.resolved_by.is_some() || self.requirement.is_optional()
    }
}

#[derive(Default)]
struct SpaceState {
    members: Vec<Arc<Module>>,
    owners: HashMap<String, Arc<Module>>,
    requirements: HashMap<u64, Vec<RequirementRecord>>,
}

impl SpaceState {
    fn is_member(&self, module: &Arc<Module>) -> bool {
        self.members.iter().any(|member| Arc::ptr_eq(member, module))
    }

    fn member_name(&self, id: u64) -> String {
        self.members
            .iter()
            .find(|member| member.id() == id)
            .map(|member| member.name().to_string())
            .unwrap_or_else(|| format!("module {id}"))
    }

    /// Validates `module` against the current members and, only if every
    /// check passes, records it.
    fn join(&mut self, module: &Arc<Module>, records: Vec<RequirementRecord>) -> Result<()> {
        let mut claims = Vec::new();
        for (package, split) in module.exported_packages() {
            match self.owners.get(package) {
                Some(owner) if !Arc::ptr_eq(owner, module) => match split {
                    SplitPolicy::Error => {
                        return Err(LoaderError::SplitPackage {
                            package: package.to_string(),
                            owner: owner.name().to_string(),
                            challenger: module.name().to_string(),
                        });
                    }
                    SplitPolicy::First => {}
                    SplitPolicy::Last => claims.push(package.to_string()),
                },
                _ => claims.push(package.to_string()),
            }
        }

        for record in &records {
            for (other, existing) in &self.requirements {
                if *other == module.id() {
                    continue;
                }
                if let Some(conflict) = existing
                    .iter()
                    .find(|e| !record.requirement.is_consistent(&e.requirement))
                {
                    return Err(LoaderError::InconsistentRequirement {
                        module: module.name().to_string(),
                        other: self.member_name(*other),
                        requirement: record.requirement.to_string(),
                        existing: conflict.requirement.to_string(),
                    });
                }
            }
        }

        for package in claims {
            self.owners.insert(package, Arc::clone(module));
        }
        self.requirements.insert(module.id(), records);
        self.members.push(Arc::clone(module));
        Ok(())
    }

    fn remove(&mut self, module: &Arc<Module>) -> Option<Vec<RequirementRecord>> {
        if !self.is_member(module) {
            return None;
        }
        self.members.retain(|member| !Arc::ptr_eq(member, module));
        self.owners.retain(|_, owner| !Arc::ptr_eq(owner, module));
        self.requirements.remove(&module.id())
    }
}

pub struct Space {
    id: u64,
    state: Mutex<SpaceState>,
}

impl Space {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SPACE_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(SpaceState::default()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn members(&self) -> Vec<Arc<Module>> {
        self.state.lock().members.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().members.is_empty()
    }

    pub fn contains(&self, module: &Arc<Module>) -> bool {
        self.state.lock().is_member(module)
    }

    pub fn owner_of(&self, package: &str) -> Option<Arc<Module>> {
        self.state.lock().owners.get(package).cloned()
    }

    /// Requirements of `module` not yet wired to a provider.
    pub fn unresolved(&self, module: &Arc<Module>) -> Vec<Requirement> {
        self.state
            .lock()
            .requirements
            .get(&module.id())
            .map(|records| {
                records
                    .iter()
                    .filter(|record| record.resolved_by.is_none())
                    .map(|record| record.requirement.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn join(self: &Arc<Self>, module: &Arc<Module>) -> Result<()> {
        if let Some(current) = module.space() {
            if Arc::ptr_eq(&current, self) {
                return Ok(());
            }
            return Err(LoaderError::IllegalState(format!(
                "module {module} already belongs to space {}",
                current.id
            )));
        }

        let records = module
            .requirements()
            .iter()
            .map(|requirement| RequirementRecord {
                requirement: requirement.clone(),
                resolved_by: None,
            })
            .collect();
        self.state.lock().join(module, records)?;
        module.set_space(Some(Arc::clone(self)));
        debug!("Module {module} joined space {}", self.id);
        Ok(())
    }

    /// Removes `module` from this space; returns whether it was a member.
    pub fn split(&self, module: &Arc<Module>) -> bool {
        if self.state.lock().remove(module).is_none() {
            return false;
        }
        module.set_space(None);
        module.set_resolved(false);
        debug!("Module {module} left space {}", self.id);
        true
    }

    /// Merges two spaces, absorbing the smaller into the larger, and returns
    /// the surviving space. On failure both spaces are left untouched.
    pub fn join_and_resolve(a: &Arc<Space>, b: &Arc<Space>) -> Result<Arc<Space>> {
        if Arc::ptr_eq(a, b) {
            return Ok(Arc::clone(a));
        }
        let (low, high) = if a.id < b.id { (a, b) } else { (b, a) };
        let mut low_state = low.state.lock();
        let mut high_state = high.state.lock();

        let (target, source, target_state, source_state) =
            if low_state.members.len() >= high_state.members.len() {
                (low, high, &mut *low_state, &mut *high_state)
            } else {
                (high, low, &mut *high_state, &mut *low_state)
            };

        let moving = source_state.members.clone();
        let mut moved: Vec<Arc<Module>> = Vec::with_capacity(moving.len());
        for module in &moving {
            let records = source_state
                .requirements
                .get(&module.id())
                .cloned()
                .unwrap_or_default();
            if let Err(err) = target_state.join(module, records) {
                for done in moved.iter().rev() {
                    target_state.remove(done);
                }
                warn!(
                    "Merging space {} into {} failed and was rolled back. {}",
                    source.id,
                    target.id,
                    ErrorContext::new(&err)
                );
                return Err(err);
            }
            moved.push(Arc::clone(module));
        }
        *source_state = SpaceState::default();
        drop(low_state);
        drop(high_state);

        for module in &moving {
            module.set_space(Some(Arc::clone(target)));
        }
        debug!(
            "Merged space {} ({} modules) into {}",
            source.id,
            moving.len(),
            target.id
        );
        Ok(Arc::clone(target))
    }

    /// Resolves each outstanding requirement of `module` through `domain`,
    /// merging spaces as needed and importing the satisfying provider.
    /// Returns whether every non-optional requirement is now satisfied.
    pub fn resolve(self: &Arc<Self>, module: &Arc<Module>, domain: &Arc<Domain>) -> Result<bool> {
        let pending: Vec<(usize, Requirement)> = {
            let state = self.state.lock();
            if !state.is_member(module) {
                return Err(LoaderError::IllegalState(format!(
                    "module {module} is not a member of space {}",
                    self.id
                )));
            }
            state
                .requirements
                .get(&module.id())
                .map(|records| {
                    records
                        .iter()
                        .enumerate()
                        .filter(|(_, record)| record.resolved_by.is_none())
                        .map(|(index, record)| (index, record.requirement.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        for (index, requirement) in pending {
            let Some(provider) = domain.find_module(&requirement, module)? else {
                if !requirement.is_optional() {
                    debug!("{module}: no module satisfies {requirement}");
                }
                continue;
            };

            let mine = Self::current_space(module)?;
            match provider.space() {
                Some(theirs) if !Arc::ptr_eq(&mine, &theirs) => {
                    Self::join_and_resolve(&mine, &theirs)?;
                }
                Some(_) => {}
                None => mine.join(&provider)?,
            }

            let import = DelegateRef::to_provider(provider.provider());
            let import = match &requirement {
                Requirement::Package { name, .. } => {
                    import.with_filter(NameFilter::packages([name.clone()]))
                }
                Requirement::Module { .. } => import,
            };
            module.provider().add_import(import)?;

            Self::record_resolution(module, index, &provider)?;
            trace!("{module}: {requirement} resolved by {provider}");
        }

        let space = Self::current_space(module)?;
        let resolved = space
            .state
            .lock()
            .requirements
            .get(&module.id())
            .is_none_or(|records| records.iter().all(RequirementRecord::is_satisfied));
        module.set_resolved(resolved);
        Ok(resolved)
    }

    fn current_space(module: &Arc<Module>) -> Result<Arc<Space>> {
        module.space().ok_or_else(|| {
            LoaderError::IllegalState(format!("module {module} does not belong to a space"))
        })
    }

    fn record_resolution(module: &Arc<Module>, index: usize, by: &Arc<Module>) -> Result<()> {
        loop {
            let space = Self::current_space(module)?;
            let mut state = space.state.lock();
            if !state.is_member(module) {
                // A merge moved the module; its space link is about to follow.
                drop(state);
                thread::yield_now();
                continue;
            }
            if let Some(record) = state
                .requirements
                .get_mut(&module.id())
                .and_then(|records| records.get_mut(index))
            {
                record.resolved_by = Some(by.id());
            }
            return Ok(());
        }
    }
}

impl fmt::Debug for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Space")
            .field("id", &self.id)
            .field("members", &state.members.len())
            .field("owned_packages", &state.owners.len())
            .finish()
    }
}
