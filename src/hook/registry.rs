//! Hook registry.
//!
//! Maps method identities (and redirected records) to their [`HookEntry`]. Entries are
//! published exactly once, from inside the installation safepoint, and are never
//! removed; the trampoline therefore either finds a fully initialized entry or nothing.

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc, Mutex,
};

use dashmap::{DashMap, DashSet};

use crate::{
    hook::{chain::CallbackChain, types::InstallState},
    metadata::{MethodIdentity, MethodRecord, MethodShape},
};

/// Installation record of one hooked method.
pub struct HookEntry {
    identity: MethodIdentity,
    original: MethodRecord,
    backup: MethodRecord,
    shape: MethodShape,
    chain: CallbackChain,
    state: AtomicU8,
}

impl HookEntry {
    pub(crate) fn new(
        identity: MethodIdentity,
        original: MethodRecord,
        backup: MethodRecord,
        shape: MethodShape,
    ) -> Self {
        HookEntry {
            identity,
            original,
            backup,
            shape,
            chain: CallbackChain::new(),
            state: AtomicU8::new(InstallState::Installing as u8),
        }
    }

    /// The hooked method.
    #[must_use]
    pub fn identity(&self) -> &MethodIdentity {
        &self.identity
    }

    /// The live record whose entry point now targets the trampoline.
    #[must_use]
    pub fn original(&self) -> MethodRecord {
        self.original
    }

    /// The backup record preserving the original behavior.
    #[must_use]
    pub fn backup(&self) -> MethodRecord {
        self.backup
    }

    /// Argument/return shape used for marshaling.
    #[must_use]
    pub fn shape(&self) -> &MethodShape {
        &self.shape
    }

    /// Callbacks attached to the method.
    #[must_use]
    pub fn chain(&self) -> &CallbackChain {
        &self.chain
    }

    /// Current install state.
    #[must_use]
    pub fn state(&self) -> InstallState {
        InstallState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn mark_installed(&self) {
        self.state
            .store(InstallState::Installed as u8, Ordering::Release);
    }
}

impl std::fmt::Debug for HookEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookEntry")
            .field("identity", &self.identity.to_string())
            .field("original", &self.original)
            .field("backup", &self.backup)
            .field("state", &self.state())
            .field("callbacks", &self.chain.len())
            .finish()
    }
}

/// Registry of installed hooks.
#[derive(Default)]
pub struct HookRegistry {
    entries: DashMap<MethodIdentity, Arc<HookEntry>>,
    by_record: DashMap<MethodRecord, Arc<HookEntry>>,
    install_locks: DashMap<MethodIdentity, Arc<Mutex<()>>>,
    backups: DashSet<MethodRecord>,
}

impl HookRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock serializing installs of one identity.
    pub(crate) fn install_lock(&self, identity: &MethodIdentity) -> Arc<Mutex<()>> {
        self.install_locks
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Makes a fully initialized entry visible to lookups and the trampoline.
    pub(crate) fn publish(&self, entry: Arc<HookEntry>) {
        self.backups.insert(entry.backup);
        self.by_record.insert(entry.original, entry.clone());
        self.entries.insert(entry.identity.clone(), entry.clone());
        entry.mark_installed();
    }

    /// Installed entry for an identity.
    #[must_use]
    pub fn get(&self, identity: &MethodIdentity) -> Option<Arc<HookEntry>> {
        self.entries
            .get(identity)
            .map(|entry| entry.value().clone())
            .filter(|entry| entry.state() == InstallState::Installed)
    }

    /// Installed entry for a redirected record.
    #[must_use]
    pub fn by_record(&self, record: MethodRecord) -> Option<Arc<HookEntry>> {
        self.by_record
            .get(&record)
            .map(|entry| entry.value().clone())
            .filter(|entry| entry.state() == InstallState::Installed)
    }

    /// Returns `true` if `record` is a backup created by this registry's engine.
    #[must_use]
    pub fn is_backup(&self, record: MethodRecord) -> bool {
        self.backups.contains(&record)
    }

    /// Identities of every installed hook, in no particular order.
    #[must_use]
    pub fn identities(&self) -> Vec<MethodIdentity> {
        self.entries
            .iter()
            .filter(|entry| entry.state() == InstallState::Installed)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Number of installed hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is hooked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.entries.len())
            .field("backups", &self.backups.len())
            .finish()
    }
}
