//! Mutator thread list and safepoint protocol.
//!
//! Every dispatch into the simulated runtime checks the calling thread in as a running
//! mutator for the duration of the call. Nested dispatches act as safepoint polls: if
//! another thread has requested a stop-the-world pause the caller parks until the pause
//! ends. A thread that is parked, or not inside the runtime at all, counts as stopped.

use std::{
    collections::HashMap,
    sync::{Condvar, Mutex, MutexGuard},
    thread::{self, ThreadId},
    time::{Duration, Instant},
};

use crate::{Error, Result};

#[derive(Default)]
struct SafepointState {
    /// Thread currently holding the world stopped
    suspender: Option<ThreadId>,
    /// Threads executing managed code, with their dispatch depth
    running: HashMap<ThreadId, usize>,
}

impl SafepointState {
    fn others_running(&self, me: ThreadId) -> bool {
        self.running.keys().any(|id| *id != me)
    }

    fn stopped_by_other(&self, me: ThreadId) -> bool {
        matches!(self.suspender, Some(id) if id != me)
    }
}

/// The runtime's thread list.
#[derive(Default)]
pub(crate) struct ThreadList {
    state: Mutex<SafepointState>,
    changed: Condvar,
}

/// Marks the current thread as running managed code until dropped.
pub(crate) struct MutatorGuard<'a> {
    list: &'a ThreadList,
}

impl ThreadList {
    fn relock(&self) -> MutexGuard<'_, SafepointState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Checks the current thread in, parking first if the world is stopped.
    pub(crate) fn enter(&self) -> Result<MutatorGuard<'_>> {
        let me = thread::current().id();
        let mut state = lock!(self.state);

        let depth = state.running.remove(&me).unwrap_or(0);
        if depth > 0 && state.stopped_by_other(me) {
            // parked at a safepoint poll
            self.changed.notify_all();
        }
        while state.stopped_by_other(me) {
            state = self
                .changed
                .wait(state)
                .map_err(|_| Error::LockError)?;
        }
        state.running.insert(me, depth + 1);

        Ok(MutatorGuard { list: self })
    }

    /// Stops every other mutator, waiting at most `timeout`.
    pub(crate) fn suspend_all(&self, timeout: Duration) -> Result<bool> {
        let me = thread::current().id();
        let deadline = Instant::now() + timeout;
        let mut state = lock!(self.state);

        // A competing suspender may be waiting for us to park.
        let my_depth = state.running.remove(&me);
        if my_depth.is_some() {
            self.changed.notify_all();
        }
        while state.suspender.is_some() {
            let now = Instant::now();
            if now >= deadline {
                if let Some(depth) = my_depth {
                    state.running.insert(me, depth);
                }
                return Ok(false);
            }
            state = self
                .changed
                .wait_timeout(state, deadline - now)
                .map_err(|_| Error::LockError)?
                .0;
        }
        state.suspender = Some(me);
        if let Some(depth) = my_depth {
            state.running.insert(me, depth);
        }

        while state.others_running(me) {
            let now = Instant::now();
            if now >= deadline {
                state.suspender = None;
                self.changed.notify_all();
                return Ok(false);
            }
            state = self
                .changed
                .wait_timeout(state, deadline - now)
                .map_err(|_| Error::LockError)?
                .0;
        }
        Ok(true)
    }

    /// Ends a pause started by the current thread.
    pub(crate) fn resume_all(&self) -> Result<()> {
        let me = thread::current().id();
        let mut state = lock!(self.state);
        if state.suspender == Some(me) {
            state.suspender = None;
        }
        self.changed.notify_all();
        Ok(())
    }

    /// Runs `f` with the current thread counted as stopped, then checks it back in.
    ///
    /// Used around waits on other threads that may themselves be waiting for a pause.
    /// The thread parks on its way back in if the world was stopped in the meantime.
    pub(crate) fn park<T>(&self, f: impl FnOnce() -> T) -> Result<T> {
        let me = thread::current().id();
        let depth = {
            let mut state = lock!(self.state);
            let depth = state.running.remove(&me);
            if depth.is_some() {
                self.changed.notify_all();
            }
            depth
        };

        let value = f();

        if let Some(depth) = depth {
            let mut state = lock!(self.state);
            while state.stopped_by_other(me) {
                state = self
                    .changed
                    .wait(state)
                    .map_err(|_| Error::LockError)?;
            }
            *state.running.entry(me).or_insert(0) += depth;
        }
        Ok(value)
    }

    /// Number of threads currently executing managed code.
    pub(crate) fn running(&self) -> Result<usize> {
        Ok(lock!(self.state).running.len())
    }
}

impl Drop for MutatorGuard<'_> {
    fn drop(&mut self) {
        let me = thread::current().id();
        let mut state = self.list.relock();
        if let Some(depth) = state.running.get_mut(&me) {
            *depth -= 1;
            if *depth == 0 {
                state.running.remove(&me);
            }
        }
        self.list.changed.notify_all();
    }
}
