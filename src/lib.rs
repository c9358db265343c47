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

//! Hierarchical unit resolution.
//!
//! Providers hold units and export packages; domains arrange providers into
//! a resolution hierarchy with shared caches; resolution spaces keep groups
//! of interdependent modules consistent. Provider locks are scheduled so
//! that cross-provider loads hand work to the owning thread instead of
//! deadlocking.

pub mod config;
pub mod delegate;
pub mod domain;
pub mod error;
pub mod events;
pub mod loader;
pub mod locking;
pub mod logging;
pub mod models;
pub mod provider;
pub mod scope;
pub mod space;
pub mod system;
#[cfg(test)]
pub mod test;

pub use config::LoaderConfig;
pub use delegate::{DelegateRef, ImportOrder, ImportScope, ProviderFactory};
pub use domain::{Domain, ParentPolicy, ResolveOptions};
pub use error::{LoaderError, Result};
pub use events::{EventHandler, LoaderEvent};
pub use loader::{ExternalLoader, Loader, SourceLoader};
pub use locking::LockManager;
pub use provider::{ArtifactSource, MemorySource, Provider, ProviderBuilder, ProviderId, Unit};
pub use space::{Capability, Module, Requirement, Space};
pub use system::LoaderSystem;
