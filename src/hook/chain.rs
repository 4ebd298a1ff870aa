//! Append-only callback chain with snapshot reads.
//!
//! Appends are serialized; readers never lock. A reader takes a snapshot by loading the
//! published length once and then iterates that prefix. Because elements are never
//! moved or removed, an in-flight invocation keeps seeing exactly the callbacks that
//! were published when it started, no matter how many are appended meanwhile.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use crate::{hook::MethodHook, Result};

/// Ordered callbacks for one hooked method.
pub struct CallbackChain {
    callbacks: boxcar::Vec<Arc<dyn MethodHook>>,
    published: AtomicUsize,
    append: Mutex<()>,
}

impl CallbackChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        CallbackChain {
            callbacks: boxcar::Vec::new(),
            published: AtomicUsize::new(0),
            append: Mutex::new(()),
        }
    }

    /// Appends a callback and returns its zero-based position.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LockError`] if the append lock is poisoned.
    pub fn push(&self, callback: Arc<dyn MethodHook>) -> Result<usize> {
        let _append = lock!(self.append);
        let position = self.callbacks.push(callback);
        self.published.store(position + 1, Ordering::Release);
        Ok(position)
    }

    /// Captures the currently published callbacks.
    #[must_use]
    pub fn snapshot(&self) -> ChainSnapshot<'_> {
        ChainSnapshot {
            chain: self,
            len: self.published.load(Ordering::Acquire),
        }
    }

    /// Number of published callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.published.load(Ordering::Acquire)
    }

    /// Returns `true` if no callback has been published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CallbackChain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.snapshot().iter().map(|hook| hook.name()))
            .finish()
    }
}

/// Immutable view of a chain prefix.
#[derive(Clone, Copy)]
pub struct ChainSnapshot<'a> {
    chain: &'a CallbackChain,
    len: usize,
}

impl<'a> ChainSnapshot<'a> {
    /// Iterates the callbacks in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &'a Arc<dyn MethodHook>> + 'a {
        let chain = self.chain;
        (0..self.len).filter_map(move |index| chain.callbacks.get(index))
    }

    /// Number of callbacks in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the snapshot holds no callbacks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
