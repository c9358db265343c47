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

use crate::error::LoaderError;
use crate::locking::scope::LockScope;
use crate::locking::timeout::LockTimeoutValue;
use std::time::{Duration, Instant};

const FIRST_POLL: Duration = Duration::from_millis(1);

/// One bounded wait, for a lock or for work handed to a lock's owner.
///
/// Poll intervals start at a millisecond and double up to `poll_cap`; the
/// last one is shortened so the wait never overruns its budget.
#[derive(Debug)]
pub(crate) struct LockWait {
    timeout: LockTimeoutValue,
    started_at: Instant,
    next_poll: Duration,
    poll_cap: Duration,
    polls: usize,
}

impl LockWait {
    pub(crate) fn start(timeout: LockTimeoutValue, poll_cap: Duration) -> Self {
        Self {
            timeout,
            started_at: Instant::now(),
            next_poll: FIRST_POLL.min(poll_cap),
            poll_cap,
            polls: 0,
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub(crate) fn polls(&self) -> usize {
        self.polls
    }

    /// Interval for the next timed wait, or `None` once the budget is spent.
    pub(crate) fn next_poll(&mut self) -> Option<Duration> {
        let poll = self.next_poll;
        self.next_poll = self.next_poll.saturating_mul(2).min(self.poll_cap);
        self.polls += 1;
        match self.timeout.remaining_after(self.elapsed()) {
            None => Some(poll),
            Some(left) => Some(poll.min(left)).filter(|poll| !poll.is_zero()),
        }
    }

    pub(crate) fn timed_out(&self, scope: &LockScope) -> LoaderError {
        LoaderError::LockTimeout {
            provider: scope.label().to_string(),
            waited_secs: self.elapsed().as_secs_f64(),
            attempts: self.polls,
        }
    }
}
