//! Core types for the hook system.
//!
//! - [`HookParam`]: Per-invocation call context handed to every callback
//! - [`Phase`]: Which side of the original call a callback runs on
//! - [`InstallState`]: Lifecycle of a registry entry
//! - [`InstallOutcome`]: What an install request did
//! - [`CallbackResult`]: Return type of callbacks

use std::collections::HashMap;

use strum::Display;

use crate::{
    metadata::{MethodIdentity, MethodShape},
    value::{Throwable, Value},
};

/// Result of a single callback.
///
/// An `Err` aborts the current phase and is reported to the caller as
/// [`crate::Error::Callback`]. To make the intercepted method throw a managed exception
/// instead, use [`HookParam::set_throwable`].
pub type CallbackResult = std::result::Result<(), Throwable>;

/// Side of the original call on which a callback runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum Phase {
    /// Before the original method runs.
    #[strum(serialize = "before")]
    Before,
    /// After the original method ran (or was skipped).
    #[strum(serialize = "after")]
    After,
}

/// Lifecycle of a hook registry entry.
///
/// Transitions are monotonic: `Uninstalled → Installing → Installed`. An entry is only
/// ever made visible to the trampoline in the `Installed` state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[repr(u8)]
pub enum InstallState {
    /// Not yet touched.
    Uninstalled = 0,
    /// Backup created, redirection in progress (only observable inside a safepoint).
    Installing = 1,
    /// Redirected and published.
    Installed = 2,
}

impl InstallState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => InstallState::Installing,
            2 => InstallState::Installed,
            _ => InstallState::Uninstalled,
        }
    }
}

/// What an install request did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The method was redirected and the callback became the first in its chain.
    Installed,
    /// The method was already hooked; the callback was appended at `position`.
    Appended {
        /// Zero-based position in the callback chain
        position: usize,
    },
}

/// Call context for one intercepted invocation.
///
/// A single `HookParam` is shared by every callback of the invocation: before-callbacks
/// see it first, then (unless one of them set a result) the original method runs with
/// [`args`](Self::args) as they are at that point, and finally after-callbacks see the
/// original's result or exception.
///
/// # Result Semantics
///
/// - [`set_result`](Self::set_result) / [`set_throwable`](Self::set_throwable) in a
///   before-callback skip the remaining before-callbacks and the original method.
/// - The same calls in an after-callback replace the outcome returned to the caller.
/// - Setting a result clears a pending throwable and vice versa.
///
/// # Examples
///
/// ```rust,no_run
/// use arthook::{hook::Hook, value::Value};
///
/// // Double the first argument before the original runs
/// let hook = Hook::new("double-first").before(|param| {
///     if let Some(Value::Int(v)) = param.arg(0).cloned() {
///         param.set_arg(0, Value::Int(v * 2));
///     }
///     Ok(())
/// });
/// ```
pub struct HookParam<'a> {
    identity: &'a MethodIdentity,
    shape: &'a MethodShape,
    this: Option<Value>,
    args: Vec<Value>,
    result: Option<Value>,
    throwable: Option<Throwable>,
    returned_early: bool,
    extra: HashMap<String, Value>,
}

impl<'a> HookParam<'a> {
    pub(crate) fn new(
        identity: &'a MethodIdentity,
        shape: &'a MethodShape,
        this: Option<Value>,
        args: Vec<Value>,
    ) -> Self {
        HookParam {
            identity,
            shape,
            this,
            args,
            result: None,
            throwable: None,
            returned_early: false,
            extra: HashMap::new(),
        }
    }

    /// The intercepted method.
    #[must_use]
    pub fn identity(&self) -> &MethodIdentity {
        self.identity
    }

    /// Argument and return shape of the intercepted method.
    #[must_use]
    pub fn shape(&self) -> &MethodShape {
        self.shape
    }

    /// The receiver, `None` for static methods.
    #[must_use]
    pub fn this(&self) -> Option<&Value> {
        self.this.as_ref()
    }

    /// Current arguments.
    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Mutable access to the arguments. Changes made before the original runs are seen by
    /// it.
    pub fn args_mut(&mut self) -> &mut [Value] {
        &mut self.args
    }

    /// Argument at `index`.
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Replaces the argument at `index`. Out-of-range indices are ignored.
    pub fn set_arg(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.args.get_mut(index) {
            *slot = value;
        }
    }

    /// The current result, if one was produced or set.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Sets the result and clears any pending throwable.
    ///
    /// In a before-callback this skips the original method.
    pub fn set_result(&mut self, value: Value) {
        self.result = Some(value);
        self.throwable = None;
        self.returned_early = true;
    }

    /// The pending throwable, if any.
    #[must_use]
    pub fn throwable(&self) -> Option<&Throwable> {
        self.throwable.as_ref()
    }

    /// Returns `true` if a throwable is pending.
    #[must_use]
    pub fn has_throwable(&self) -> bool {
        self.throwable.is_some()
    }

    /// Makes the invocation throw `throwable` and clears any result.
    ///
    /// In a before-callback this skips the original method.
    pub fn set_throwable(&mut self, throwable: Throwable) {
        self.throwable = Some(throwable);
        self.result = None;
        self.returned_early = true;
    }

    /// The result, or the pending throwable as an error.
    ///
    /// # Errors
    ///
    /// Returns the pending throwable if there is one.
    pub fn result_or_throwable(&self) -> std::result::Result<Option<&Value>, &Throwable> {
        match &self.throwable {
            Some(t) => Err(t),
            None => Ok(self.result.as_ref()),
        }
    }

    /// Returns `true` once a callback has set a result or throwable.
    #[must_use]
    pub fn returned_early(&self) -> bool {
        self.returned_early
    }

    /// Reads a per-invocation scratch value.
    ///
    /// Extras are shared between the before- and after-callbacks of one invocation and
    /// discarded when it completes.
    #[must_use]
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Stores a per-invocation scratch value.
    pub fn set_extra(&mut self, key: impl Into<String>, value: Value) {
        self.extra.insert(key.into(), value);
    }

    /// Records what the original method produced, without marking an early return.
    pub(crate) fn record_original(&mut self, outcome: std::result::Result<Value, Throwable>) {
        match outcome {
            Ok(value) => {
                self.result = Some(value);
                self.throwable = None;
            }
            Err(throwable) => {
                self.result = None;
                self.throwable = Some(throwable);
            }
        }
    }

    pub(crate) fn into_outcome(self) -> (Option<Value>, Option<Throwable>) {
        (self.result, self.throwable)
    }
}

impl std::fmt::Debug for HookParam<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookParam")
            .field("method", &self.identity.to_string())
            .field("args", &self.args)
            .field("result", &self.result)
            .field("throwable", &self.throwable)
            .field("returned_early", &self.returned_early)
            .finish_non_exhaustive()
    }
}
