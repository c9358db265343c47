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

//! Per-provider locking with cooperative hand-off.
//!
//! Every provider has a fair, reentrant lock owned by at most one thread.
//! Plain `acquire` blocks (with a bounded budget) like any lock would. `run`
//! never blocks on a lock owned by another thread: the work is queued for the
//! owner, and the caller waits only for the result. The only wait `run` does
//! before owning anything is for an unowned lock promised to an earlier
//! waiter. Any thread that waits,
//! for either reason, keeps executing work queued for the providers it owns,
//! and an owner drains its queue before giving a lock up. Two threads that
//! each own one provider and need the other's therefore finish each other's
//! work instead of waiting on each other.

use crate::config::LockingConfig;
use crate::error::{LoaderError, Result};
use crate::locking::handle::ProviderLockGuard;
use crate::locking::scope::LockScope;
use crate::locking::timeout::LockTimeoutValue;
use crate::locking::wait::LockWait;
use crate::provider::ProviderId;
use crossbeam_channel::{Receiver, TryRecvError};
use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, ThreadId};
use std::time::Duration;

type Task = Box<dyn FnOnce() + Send + 'static>;

struct QueuedTask {
    id: u64,
    task: Task,
}

struct Ownership {
    thread: ThreadId,
    holds: usize,
}

#[derive(Default)]
struct ScheduleState {
    owners: HashMap<ProviderId, Ownership>,
    /// Providers each thread currently owns, in acquisition order.
    held: HashMap<ThreadId, Vec<ProviderId>>,
    /// Threads blocked in `acquire`, first come first served.
    waiters: HashMap<ProviderId, VecDeque<ThreadId>>,
    /// Work handed to the owner of each provider.
    tasks: HashMap<ProviderId, VecDeque<QueuedTask>>,
    next_task_id: u64,
}

impl ScheduleState {
    fn owner_of(&self, id: ProviderId) -> Option<ThreadId> {
        self.owners.get(&id).map(|ownership| ownership.thread)
    }

    fn can_take(&self, id: ProviderId, me: ThreadId) -> bool {
        match self.owners.get(&id) {
            Some(ownership) => ownership.thread == me,
            None => self
                .waiters
                .get(&id)
                .and_then(VecDeque::front)
                .is_none_or(|first| *first == me),
        }
    }

    fn take(&mut self, id: ProviderId, me: ThreadId) {
        let ownership = self.owners.entry(id).or_insert(Ownership {
            thread: me,
            holds: 0,
        });
        ownership.holds += 1;
        if ownership.holds == 1 {
            self.held.entry(me).or_default().push(id);
        }
    }

    fn relinquish(&mut self, id: ProviderId, me: ThreadId) {
        self.owners.remove(&id);
        if let Some(held) = self.held.get_mut(&me) {
            held.retain(|held_id| *held_id != id);
            if held.is_empty() {
                self.held.remove(&me);
            }
        }
        if self.tasks.get(&id).is_some_and(VecDeque::is_empty) {
            self.tasks.remove(&id);
        }
    }

    fn enqueue_waiter(&mut self, id: ProviderId, me: ThreadId) {
        self.waiters.entry(id).or_default().push_back(me);
    }

    fn remove_waiter(&mut self, id: ProviderId, me: ThreadId) {
        if let Some(queue) = self.waiters.get_mut(&id) {
            queue.retain(|waiter| *waiter != me);
            if queue.is_empty() {
                self.waiters.remove(&id);
            }
        }
    }

    fn enqueue_task(&mut self, id: ProviderId, task: Task) -> u64 {
        self.next_task_id += 1;
        let task_id = self.next_task_id;
        self.tasks.entry(id).or_default().push_back(QueuedTask { id: task_id, task });
        task_id
    }

    fn withdraw_task(&mut self, id: ProviderId, task_id: u64) -> bool {
        match self.tasks.get_mut(&id) {
            Some(queue) => {
                let before = queue.len();
                queue.retain(|queued| queued.id != task_id);
                before != queue.len()
            }
            None => false,
        }
    }

    fn pop_task(&mut self, id: ProviderId) -> Option<Task> {
        self.tasks
            .get_mut(&id)
            .and_then(VecDeque::pop_front)
            .map(|queued| queued.task)
    }

    /// Next piece of work queued for any provider owned by `me`.
    fn next_task_for(&mut self, me: ThreadId) -> Option<Task> {
        let held = self.held.get(&me)?;
        for id in held {
            if let Some(queued) = self.tasks.get_mut(id).and_then(VecDeque::pop_front) {
                return Some(queued.task);
            }
        }
        None
    }
}

/// Process-wide coordinator of provider locks, owned by a `LoaderSystem`.
pub struct LockManager {
    state: Mutex<ScheduleState>,
    signal: Condvar,
    timeout: LockTimeoutValue,
    poll_cap: Duration,
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("timeout", &self.timeout)
            .field("poll_cap", &self.poll_cap)
            .finish_non_exhaustive()
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(LockTimeoutValue::default(), Duration::from_millis(100))
    }
}

impl LockManager {
    pub fn new(timeout: LockTimeoutValue, poll_cap: Duration) -> Self {
        Self {
            state: Mutex::new(ScheduleState::default()),
            signal: Condvar::new(),
            timeout,
            poll_cap,
        }
    }

    pub fn from_config(config: &LockingConfig) -> Result<Self> {
        let timeout = config.timeout_value()?;
        debug!("Provider lock budget {timeout}");
        Ok(Self::new(timeout, config.poll_interval()))
    }

    pub fn timeout(&self) -> LockTimeoutValue {
        self.timeout
    }

    /// Blocks until the provider's lock is held by the calling thread.
    ///
    /// Reentrant. Waiters are served in arrival order. While waiting the
    /// thread executes work queued for providers it already owns. Exceeding
    /// the budget is a hard `LockTimeout` error.
    pub fn acquire(&self, scope: &LockScope) -> Result<ProviderLockGuard<'_>> {
        let me = thread::current().id();
        let id = scope.id();
        let mut state = self.state.lock();

        if state.can_take(id, me) {
            state.take(id, me);
            return Ok(ProviderLockGuard::new(self, scope.clone()));
        }

        state.enqueue_waiter(id, me);
        let mut wait = self.start_wait(scope);

        loop {
            if state.can_take(id, me) {
                state.remove_waiter(id, me);
                state.take(id, me);
                debug!("Acquired {scope} after {:.3}s", wait.elapsed().as_secs_f64());
                return Ok(ProviderLockGuard::new(self, scope.clone()));
            }

            if let Some(task) = state.next_task_for(me) {
                MutexGuard::unlocked(&mut state, || self.execute(task));
                self.signal.notify_all();
                continue;
            }

            let Some(delay) = self.next_poll(&mut wait, scope) else {
                state.remove_waiter(id, me);
                self.signal.notify_all();
                return Err(Self::give_up(&wait, scope));
            };
            self.signal.wait_for(&mut state, delay);
        }
    }

    /// Takes the lock only if that is possible right now without jumping
    /// ahead of queued waiters.
    pub fn try_acquire(&self, scope: &LockScope) -> Option<ProviderLockGuard<'_>> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.can_take(scope.id(), me) {
            state.take(scope.id(), me);
            Some(ProviderLockGuard::new(self, scope.clone()))
        } else {
            None
        }
    }

    pub fn release(&self, guard: ProviderLockGuard<'_>) -> Result<()> {
        guard.release()
    }

    /// Runs `work` while the provider's lock is held.
    ///
    /// The owner check and taking the lock happen under one state lock. When
    /// another thread owns the lock the work is handed to that thread and
    /// this one waits for the result, helping with its own queue in the
    /// meantime. When the lock is free but promised to an earlier waiter,
    /// this thread waits for it to be taken or released and checks again.
    /// A panic inside handed-off work surfaces as `TaskAbandoned`.
    pub fn run<F, R>(&self, scope: &LockScope, work: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let me = thread::current().id();
        let id = scope.id();
        let mut state = self.state.lock();
        let mut wait: Option<LockWait> = None;

        loop {
            if let Some(owner) = state.owner_of(id).filter(|owner| *owner != me) {
                let (sender, receiver) = crossbeam_channel::bounded(1);
                let task_id = state.enqueue_task(
                    id,
                    Box::new(move || {
                        let _ = sender.send(work());
                    }),
                );
                debug!("Handing work for {scope} to owning thread {owner:?}");
                self.signal.notify_all();
                return self.await_completion(state, scope, task_id, receiver);
            }

            if state.can_take(id, me) {
                state.take(id, me);
                drop(state);
                let guard = ProviderLockGuard::new(self, scope.clone());
                let result = work();
                guard.release()?;
                return Ok(result);
            }

            if let Some(task) = state.next_task_for(me) {
                MutexGuard::unlocked(&mut state, || self.execute(task));
                self.signal.notify_all();
                continue;
            }

            let wait = wait.get_or_insert_with(|| self.start_wait(scope));
            let Some(delay) = self.next_poll(wait, scope) else {
                return Err(Self::give_up(wait, scope));
            };
            self.signal.wait_for(&mut state, delay);
        }
    }

    /// Providers whose lock the calling thread currently owns.
    pub fn held_by_current_thread(&self) -> Vec<ProviderId> {
        let me = thread::current().id();
        self.state.lock().held.get(&me).cloned().unwrap_or_default()
    }

    pub fn owner_of(&self, id: ProviderId) -> Option<ThreadId> {
        self.state.lock().owner_of(id)
    }

    pub fn hold_count(&self, id: ProviderId) -> usize {
        self.state
            .lock()
            .owners
            .get(&id)
            .map(|ownership| ownership.holds)
            .unwrap_or(0)
    }

    pub fn pending_tasks(&self, id: ProviderId) -> usize {
        self.state.lock().tasks.get(&id).map_or(0, VecDeque::len)
    }

    pub(crate) fn release_hold(&self, scope: &LockScope) -> Result<()> {
        let me = thread::current().id();
        let id = scope.id();
        let mut state = self.state.lock();

        loop {
            let Some(ownership) = state.owners.get_mut(&id) else {
                return Err(LoaderError::LockRelease {
                    provider: scope.label().to_string(),
                    details: "lock is not held".to_string(),
                });
            };
            if ownership.thread != me {
                return Err(LoaderError::LockRelease {
                    provider: scope.label().to_string(),
                    details: format!("lock is owned by {:?}", ownership.thread),
                });
            }
            if ownership.holds > 1 {
                ownership.holds -= 1;
                return Ok(());
            }

            // Last hold: finish work handed to us before letting go.
            if let Some(task) = state.pop_task(id) {
                MutexGuard::unlocked(&mut state, || self.execute(task));
                self.signal.notify_all();
                continue;
            }

            state.relinquish(id, me);
            self.signal.notify_all();
            trace!("Relinquished {scope}");
            return Ok(());
        }
    }

    fn await_completion<R>(
        &self,
        mut state: MutexGuard<'_, ScheduleState>,
        scope: &LockScope,
        task_id: u64,
        receiver: Receiver<R>,
    ) -> Result<R> {
        let me = thread::current().id();
        let mut wait = self.start_wait(scope);

        loop {
            match receiver.try_recv() {
                Ok(value) => {
                    trace!(
                        "Work for {scope} completed after {:.3}s",
                        wait.elapsed().as_secs_f64()
                    );
                    return Ok(value);
                }
                Err(TryRecvError::Disconnected) => {
                    return Err(LoaderError::TaskAbandoned(scope.label().to_string()));
                }
                Err(TryRecvError::Empty) => {}
            }

            if let Some(task) = state.next_task_for(me) {
                MutexGuard::unlocked(&mut state, || self.execute(task));
                self.signal.notify_all();
                continue;
            }

            let Some(delay) = self.next_poll(&mut wait, scope) else {
                if !state.withdraw_task(scope.id(), task_id) {
                    // Already picked up; the owner may have just finished.
                    if let Ok(value) = receiver.try_recv() {
                        return Ok(value);
                    }
                }
                return Err(Self::give_up(&wait, scope));
            };
            self.signal.wait_for(&mut state, delay);
        }
    }

    fn execute(&self, task: Task) {
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            warn!("Work handed to thread {:?} panicked", thread::current().id());
        }
    }

    fn start_wait(&self, scope: &LockScope) -> LockWait {
        debug!("Waiting for {scope} (timeout: {})", self.timeout);
        LockWait::start(self.timeout, self.poll_cap)
    }

    fn next_poll(&self, wait: &mut LockWait, scope: &LockScope) -> Option<Duration> {
        let delay = wait.next_poll()?;
        if wait.polls() > 1 {
            trace!(
                "Still waiting for {scope}: poll {}, {:.3}s elapsed",
                wait.polls(),
                wait.elapsed().as_secs_f64()
            );
        }
        Some(delay)
    }

    fn give_up(wait: &LockWait, scope: &LockScope) -> LoaderError {
        warn!(
            "Gave up waiting for {scope} after {:.3}s; the system is likely wedged",
            wait.elapsed().as_secs_f64()
        );
        wait.timed_out(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scope(label: &str) -> LockScope {
        LockScope::new(ProviderId::next(), label)
    }

    fn short_manager() -> LockManager {
        LockManager::new(LockTimeoutValue::from_millis(200), Duration::from_millis(10))
    }

    #[test]
    fn acquire_is_reentrant() {
        let manager = short_manager();
        let p = scope("p");

        let outer = manager.acquire(&p).unwrap();
        let inner = manager.acquire(&p).unwrap();
        assert_eq!(manager.hold_count(p.id()), 2);
        assert_eq!(manager.held_by_current_thread(), vec![p.id()]);

        inner.release().unwrap();
        assert_eq!(manager.hold_count(p.id()), 1);
        drop(outer);
        assert_eq!(manager.hold_count(p.id()), 0);
        assert!(manager.held_by_current_thread().is_empty());
    }

    #[test]
    fn try_acquire_fails_while_owned_elsewhere() {
        let manager = Arc::new(short_manager());
        let p = scope("p");
        let guard = manager.acquire(&p).unwrap();

        let other = Arc::clone(&manager);
        let p2 = p.clone();
        let acquired = thread::spawn(move || other.try_acquire(&p2).is_some())
            .join()
            .unwrap();
        assert!(!acquired);

        drop(guard);
        let other = Arc::clone(&manager);
        let acquired = thread::spawn(move || other.try_acquire(&p).is_some())
            .join()
            .unwrap();
        assert!(acquired);
    }

    #[test]
    fn acquire_times_out_when_owner_never_releases() {
        let manager = Arc::new(short_manager());
        let p = scope("stuck");
        let _guard = manager.acquire(&p).unwrap();

        let other = Arc::clone(&manager);
        let err = thread::spawn(move || other.acquire(&p).map(|_| ()))
            .join()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, LoaderError::LockTimeout { ref provider, .. } if provider == "stuck"));
    }

    #[test]
    fn release_from_wrong_thread_is_rejected() {
        let manager = short_manager();
        let p = scope("p");
        let err = manager.release_hold(&p).unwrap_err();
        assert!(matches!(err, LoaderError::LockRelease { .. }));
    }

    #[test]
    fn run_on_free_lock_executes_inline_while_holding_it() {
        let manager = Arc::new(short_manager());
        let p = scope("p");
        let me = thread::current().id();

        let inner = Arc::clone(&manager);
        let id = p.id();
        let (ran_on, held) = manager
            .run(&p, move || (thread::current().id(), inner.owner_of(id)))
            .unwrap();
        assert_eq!(ran_on, me);
        assert_eq!(held, Some(me));
        assert_eq!(manager.hold_count(p.id()), 0);
        assert!(manager.held_by_current_thread().is_empty());
    }

    #[test]
    fn run_hands_work_to_owner() {
        let manager = Arc::new(short_manager());
        let p = scope("p");
        let guard = manager.acquire(&p).unwrap();
        let owner = thread::current().id();

        let other = Arc::clone(&manager);
        let p2 = p.clone();
        let handle = thread::spawn(move || other.run(&p2, move || thread::current().id()));

        while manager.pending_tasks(p.id()) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        // Releasing the last hold drains the queue on this thread.
        guard.release().unwrap();

        let executed_on = handle.join().unwrap().unwrap();
        assert_eq!(executed_on, owner);
        assert_eq!(manager.hold_count(p.id()), 0);
    }

    #[test]
    fn cross_owned_providers_do_not_deadlock() {
        let manager = Arc::new(short_manager());
        let p1 = scope("p1");
        let p2 = scope("p2");
        let barrier = Arc::new(Barrier::new(2));
        let completed = Arc::new(AtomicUsize::new(0));

        let spawn = |first: LockScope, second: LockScope| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let completed = Arc::clone(&completed);
            thread::spawn(move || {
                let inner = Arc::clone(&manager);
                manager.run(&first, move || {
                    barrier.wait();
                    let done = Arc::clone(&completed);
                    inner.run(&second, move || {
                        done.fetch_add(1, Ordering::SeqCst);
                    })
                })
            })
        };

        let t1 = spawn(p1.clone(), p2.clone());
        let t2 = spawn(p2.clone(), p1.clone());

        t1.join().unwrap().unwrap().unwrap();
        t2.join().unwrap().unwrap().unwrap();
        assert_eq!(completed.load(Ordering::SeqCst), 2);
        assert_eq!(manager.hold_count(p1.id()), 0);
        assert_eq!(manager.hold_count(p2.id()), 0);
    }

    #[test]
    fn panicking_handoff_is_reported_as_abandoned() {
        let manager = Arc::new(short_manager());
        let p = scope("p");
        let guard = manager.acquire(&p).unwrap();

        let other = Arc::clone(&manager);
        let p2 = p.clone();
        let handle = thread::spawn(move || other.run(&p2, || -> usize { panic!("boom") }));

        while manager.pending_tasks(p.id()) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        guard.release().unwrap();

        let err = handle.join().unwrap().unwrap_err();
        assert!(matches!(err, LoaderError::TaskAbandoned(_)));
    }
}
