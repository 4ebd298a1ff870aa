//! The hook engine service object.
//!
//! [`HookEngine`] owns every piece of interception state: the registry, the bound
//! trampoline and the installation pipeline. Embedders create one per runtime and share
//! it; there is no process-global state.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, TryLockError,
};

use tracing::{debug, error, info};

use crate::{
    config::{EngineConfig, FatalPolicy},
    hook::{
        cloner::BackupCloner,
        registry::{HookEntry, HookRegistry},
        resolver::IdentityResolver,
        rewriter::EntryPointRewriter,
        safepoint::SafepointCoordinator,
        trampoline::{check_arguments, Trampoline},
        types::InstallOutcome,
        MethodHook,
    },
    metadata::{ClassRef, MemberDescriptor, MethodIdentity, CONSTRUCTOR_NAME},
    runtime::{InvocationHandler, RuntimeAdapter},
    value::Value,
    Error, Result,
};

/// Counters shared between the engine and its trampoline.
#[derive(Default)]
pub(crate) struct StatCounters {
    installs: AtomicU64,
    appends: AtomicU64,
    clones: AtomicU64,
    invocations: AtomicU64,
    callback_failures: AtomicU64,
}

impl StatCounters {
    pub(crate) fn invocation(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn callback_failure(&self) {
        self.callback_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time engine statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Methods redirected to the trampoline
    pub installs: u64,
    /// Callbacks appended to already hooked methods
    pub appends: u64,
    /// Backup records created for published hooks
    pub clones: u64,
    /// Intercepted invocations
    pub invocations: u64,
    /// Callbacks that returned an error
    pub callback_failures: u64,
    /// Completed stop-the-world pauses
    pub safepoint_pauses: u64,
}

/// Method interception engine.
///
/// # Installing Hooks
///
/// ```rust
/// use std::sync::Arc;
/// use arthook::{
///     hook::{Hook, HookEngine, InstallOutcome},
///     metadata::AccessFlags,
///     runtime::{sim::SimRuntime, RuntimeVariant},
///     value::Value,
///     EngineConfig,
/// };
///
/// let rt = Arc::new(SimRuntime::new(RuntimeVariant::Art5_1));
/// let calc = rt.define_class("Lcom/example/Calc;");
/// rt.define_method(&calc, "add", "(II)I", AccessFlags::PUBLIC | AccessFlags::STATIC, |_, _, a| {
///     Ok(Value::Int(a[0].as_int().unwrap_or(0) + a[1].as_int().unwrap_or(0)))
/// })?;
///
/// let engine = HookEngine::new(rt.clone(), EngineConfig::production());
/// let outcome = engine.hook_method(
///     &calc,
///     "add",
///     "(II)I",
///     Hook::new("times-ten").after(|param| {
///         if let Some(Value::Int(sum)) = param.result().cloned() {
///             param.set_result(Value::Int(sum * 10));
///         }
///         Ok(())
///     }),
/// )?;
/// assert_eq!(outcome, InstallOutcome::Installed);
///
/// let args = [Value::Int(2), Value::Int(3)];
/// assert_eq!(rt.call(&calc, "add", "(II)I", None, &args)?, Value::Int(50));
/// # Ok::<(), arthook::Error>(())
/// ```
///
/// # Lifetime
///
/// Hooks can not be removed and live as long as the engine. Invocations of a redirected
/// method after the engine was dropped fail with [`Error::NotHooked`].
pub struct HookEngine {
    adapter: Arc<dyn RuntimeAdapter>,
    config: EngineConfig,
    registry: Arc<HookRegistry>,
    resolver: IdentityResolver,
    cloner: BackupCloner,
    rewriter: EntryPointRewriter,
    safepoint: SafepointCoordinator,
    stats: Arc<StatCounters>,
    // Keeps the weakly bound trampoline alive.
    _trampoline: Arc<Trampoline>,
}

impl HookEngine {
    /// Creates an engine for `adapter` and binds its trampoline.
    #[must_use]
    pub fn new(adapter: Arc<dyn RuntimeAdapter>, config: EngineConfig) -> Arc<Self> {
        let registry = Arc::new(HookRegistry::new());
        let stats = Arc::new(StatCounters::default());
        let trampoline = Arc::new(Trampoline::new(
            adapter.clone(),
            registry.clone(),
            stats.clone(),
            config.max_reentrancy_depth,
            config.tracing.invocations,
        ));

        let handler: Arc<dyn InvocationHandler> = trampoline.clone();
        let address = adapter.bind_trampoline(Arc::downgrade(&handler));
        debug!(
            variant = %adapter.variant(),
            trampoline = ?address,
            "hook engine created"
        );

        Arc::new(HookEngine {
            resolver: IdentityResolver::new(adapter.clone()),
            cloner: BackupCloner::new(adapter.clone()),
            rewriter: EntryPointRewriter::new(adapter.clone(), address),
            safepoint: SafepointCoordinator::new(adapter.clone(), config.safepoint.timeout),
            adapter,
            config,
            registry,
            stats,
            _trampoline: trampoline,
        })
    }

    /// Attaches `callback` to the method named by `identity`.
    ///
    /// The first callback for a method installs the hook: a backup is cloned, the method
    /// is redirected to the trampoline and the entry is published, all inside one
    /// stop-the-world pause. Later callbacks are appended to the existing chain without
    /// pausing.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the method does not exist or is abstract
    /// - [`Error::Clone`] if the runtime variant cannot clone this kind of method
    /// - [`Error::BackupNotHookable`] if `identity` resolves to a backup
    /// - [`Error::InstallationFatal`] under [`FatalPolicy::Propagate`]; under
    ///   [`FatalPolicy::Abort`] the process is aborted instead
    pub fn install(
        &self,
        identity: MethodIdentity,
        callback: impl MethodHook + 'static,
    ) -> Result<InstallOutcome> {
        self.install_shared(identity, Arc::new(callback))
    }

    /// Like [`install`](Self::install), for a callback shared between several methods.
    ///
    /// # Errors
    ///
    /// See [`install`](Self::install).
    pub fn install_shared(
        &self,
        identity: MethodIdentity,
        callback: Arc<dyn MethodHook>,
    ) -> Result<InstallOutcome> {
        let install_lock = self.registry.install_lock(&identity);
        let _installing = self.lock_identity(&install_lock)?;

        if let Some(entry) = self.registry.get(&identity) {
            let position = entry.chain().push(callback)?;
            self.stats.appends.fetch_add(1, Ordering::Relaxed);
            if self.config.tracing.installs {
                debug!(method = %identity, position, "callback appended");
            }
            return Ok(InstallOutcome::Appended { position });
        }

        let resolved = self.resolver.resolve(&identity)?;
        if self.registry.is_backup(resolved.record) {
            return Err(Error::BackupNotHookable(identity));
        }
        self.cloner.check(&resolved)?;

        let installed = self.safepoint.with_all_threads_paused(&identity, || {
            let backup = self.cloner.clone_method(&resolved)?;
            let entry = Arc::new(HookEntry::new(
                identity.clone(),
                resolved.record,
                backup,
                resolved.info.shape.clone(),
            ));
            entry.chain().push(callback)?;
            // A failed redirect leaves the backup allocated but unreachable.
            self.rewriter.redirect(&identity, resolved.record)?;
            self.registry.publish(entry.clone());
            self.stats.clones.fetch_add(1, Ordering::Relaxed);
            Ok(entry)
        });
        let entry = installed.map_err(|e| self.escalate(e))?;

        self.stats.installs.fetch_add(1, Ordering::Relaxed);
        if self.config.tracing.installs {
            info!(
                method = %identity,
                original = %entry.original(),
                backup = %entry.backup(),
                shape = %entry.shape(),
                "method hooked"
            );
        }
        Ok(InstallOutcome::Installed)
    }

    /// Takes the install lock of one identity.
    ///
    /// A contended lock is waited for inside a blocking region: the holder may be
    /// waiting for the calling thread to reach a safepoint.
    fn lock_identity<'a>(&self, lock: &'a Mutex<()>) -> Result<MutexGuard<'a, ()>> {
        match lock.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(_)) => return Err(Error::LockError),
            Err(TryLockError::WouldBlock) => {}
        }

        let mut acquired = None;
        self.adapter
            .blocking_region(&mut || acquired = Some(lock.lock()))?;
        match acquired {
            Some(Ok(guard)) => Ok(guard),
            _ => Err(Error::LockError),
        }
    }

    /// Convenience wrapper around [`install`](Self::install).
    ///
    /// # Errors
    ///
    /// See [`install`](Self::install).
    pub fn hook_method(
        &self,
        class: &ClassRef,
        name: &str,
        signature: &str,
        callback: impl MethodHook + 'static,
    ) -> Result<InstallOutcome> {
        self.install(
            MethodIdentity::new(class.clone(), MemberDescriptor::new(name, signature)),
            callback,
        )
    }

    /// Hooks every concrete overload of `name` declared on `class` with one shared
    /// callback. Abstract overloads are skipped.
    ///
    /// Returns the identities that were hooked. Stops at the first failing overload;
    /// overloads hooked before it stay hooked.
    ///
    /// # Errors
    ///
    /// See [`install`](Self::install).
    pub fn hook_all_methods(
        &self,
        class: &ClassRef,
        name: &str,
        callback: impl MethodHook + 'static,
    ) -> Result<Vec<MethodIdentity>> {
        let callback: Arc<dyn MethodHook> = Arc::new(callback);
        let mut hooked = Vec::new();

        for member in self.resolver.overloads(class, name)? {
            let identity = MethodIdentity::new(class.clone(), member);
            match self.install_shared(identity.clone(), callback.clone()) {
                Ok(_) => hooked.push(identity),
                Err(Error::NotFound(_)) => {
                    debug!(method = %identity, "skipping overload without body");
                }
                Err(error) => return Err(error),
            }
        }
        Ok(hooked)
    }

    /// Hooks every constructor declared on `class` with one shared callback.
    ///
    /// # Errors
    ///
    /// See [`install`](Self::install).
    pub fn hook_all_constructors(
        &self,
        class: &ClassRef,
        callback: impl MethodHook + 'static,
    ) -> Result<Vec<MethodIdentity>> {
        self.hook_all_methods(class, CONSTRUCTOR_NAME, callback)
    }

    /// Calls the un-hooked behavior of a method, bypassing every callback.
    ///
    /// For a hooked method this invokes its backup; otherwise the method itself.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the method can not be resolved,
    /// [`Error::ArgumentMismatch`] if the arguments do not fit its shape, otherwise
    /// whatever the method produced.
    pub fn invoke_original(
        &self,
        identity: &MethodIdentity,
        this: Option<&Value>,
        args: &[Value],
    ) -> Result<Value> {
        if let Some(entry) = self.registry.get(identity) {
            check_arguments(identity, entry.shape(), this, args)?;
            return self.adapter.invoke(entry.backup(), this, args);
        }

        let resolved = self.resolver.resolve(identity)?;
        check_arguments(identity, &resolved.info.shape, this, args)?;
        self.adapter.invoke(resolved.record, this, args)
    }

    /// Installed entry for `identity`.
    #[must_use]
    pub fn lookup(&self, identity: &MethodIdentity) -> Option<Arc<HookEntry>> {
        self.registry.get(identity)
    }

    /// Returns `true` if `identity` is hooked.
    #[must_use]
    pub fn is_hooked(&self, identity: &MethodIdentity) -> bool {
        self.registry.get(identity).is_some()
    }

    /// Every hooked method, sorted.
    #[must_use]
    pub fn hooked_methods(&self) -> Vec<MethodIdentity> {
        let mut identities = self.registry.identities();
        identities.sort();
        identities
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            installs: self.stats.installs.load(Ordering::Relaxed),
            appends: self.stats.appends.load(Ordering::Relaxed),
            clones: self.stats.clones.load(Ordering::Relaxed),
            invocations: self.stats.invocations.load(Ordering::Relaxed),
            callback_failures: self.stats.callback_failures.load(Ordering::Relaxed),
            safepoint_pauses: self.safepoint.pauses(),
        }
    }

    /// Total time spent with the world stopped for installations.
    #[must_use]
    pub fn total_pause(&self) -> std::time::Duration {
        self.safepoint.total_pause()
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The runtime this engine intercepts.
    #[must_use]
    pub fn adapter(&self) -> &Arc<dyn RuntimeAdapter> {
        &self.adapter
    }

    fn escalate(&self, error: Error) -> Error {
        if let Error::InstallationFatal { identity, reason } = &error {
            if self.config.fatal_policy == FatalPolicy::Abort {
                error!(method = %identity, %reason, "fatal installation failure, aborting");
                std::process::abort();
            }
        }
        error
    }
}

impl std::fmt::Debug for HookEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookEngine")
            .field("variant", &self.adapter.variant())
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
