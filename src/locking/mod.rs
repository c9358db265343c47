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

//! Provider lock scheduling.
//!
//! Every provider owns one reentrant lock. Work that needs a provider's lock
//! while another thread owns it is handed to the owner instead of blocking,
//! so two threads that each hold one provider and want the other's never
//! deadlock.

pub mod handle;
pub mod manager;
pub mod scope;
pub mod timeout;
mod wait;

pub use handle::ProviderLockGuard;
pub use manager::LockManager;
pub use scope::LockScope;
pub use timeout::{DEFAULT_LOCK_TIMEOUT_SECS, LOCK_TIMEOUT_ENV, LockTimeoutValue};
