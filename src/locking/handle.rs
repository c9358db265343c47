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

use crate::error::Result;
use crate::locking::manager::LockManager;
use crate::locking::scope::LockScope;
use log::{trace, warn};
use std::time::Instant;

/// One hold on a provider lock. Dropping the guard releases the hold.
#[derive(Debug)]
pub struct ProviderLockGuard<'a> {
    manager: &'a LockManager,
    scope: LockScope,
    acquired_at: Instant,
    released: bool,
}

impl<'a> ProviderLockGuard<'a> {
    pub(crate) fn new(manager: &'a LockManager, scope: LockScope) -> Self {
        Self {
            manager,
            scope,
            acquired_at: Instant::now(),
            released: false,
        }
    }

    pub fn scope(&self) -> &LockScope {
        &self.scope
    }

    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.manager.release_hold(&self.scope)?;
        trace!(
            "Released hold on {} after {:.3}s",
            self.scope,
            self.acquired_at.elapsed().as_secs_f64()
        );
        Ok(())
    }
}

impl Drop for ProviderLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.release_inner() {
            warn!("Failed to release {} during drop: {err}", self.scope);
        }
    }
}
