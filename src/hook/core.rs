//! Callback definition and builder.
//!
//! This module provides the [`MethodHook`] trait implemented by every callback, and the
//! closure-based [`Hook`] builder that covers the common cases.

use crate::{
    hook::types::{CallbackResult, HookParam},
    value::{Throwable, Value},
};

/// Type alias for before/after callback closures.
pub type CallbackFn = Box<dyn Fn(&mut HookParam<'_>) -> CallbackResult + Send + Sync>;

/// A callback attached to a hooked method.
///
/// Both phases default to doing nothing, so implementors only override what they need.
/// Callbacks are shared between threads and invoked concurrently; any state they keep
/// must be synchronized.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use arthook::hook::{CallbackResult, HookParam, MethodHook};
///
/// struct CountCalls(AtomicUsize);
///
/// impl MethodHook for CountCalls {
///     fn name(&self) -> &str {
///         "count-calls"
///     }
///
///     fn before(&self, _param: &mut HookParam<'_>) -> CallbackResult {
///         self.0.fetch_add(1, Ordering::Relaxed);
///         Ok(())
///     }
/// }
/// ```
pub trait MethodHook: Send + Sync {
    /// Name used in logs and error reports.
    fn name(&self) -> &str;

    /// Runs before the original method.
    ///
    /// # Errors
    ///
    /// An error aborts the invocation with [`crate::Error::Callback`]; the original method
    /// and all after-callbacks are skipped.
    fn before(&self, _param: &mut HookParam<'_>) -> CallbackResult {
        Ok(())
    }

    /// Runs after the original method (or after a before-callback returned early).
    ///
    /// # Errors
    ///
    /// An error replaces the invocation's outcome with [`crate::Error::Callback`].
    fn after(&self, _param: &mut HookParam<'_>) -> CallbackResult {
        Ok(())
    }
}

/// Closure-based [`MethodHook`].
///
/// # Building Hooks
///
/// ```rust,no_run
/// use arthook::{hook::Hook, value::Value};
///
/// let hook = Hook::new("log-add")
///     .before(|param| {
///         println!("add{:?}", param.args());
///         Ok(())
///     })
///     .after(|param| {
///         println!("add returned {:?}", param.result());
///         Ok(())
///     });
/// ```
///
/// # Replacements
///
/// A replacement is a before-callback that always produces the outcome, so the original
/// method never runs:
///
/// ```rust,no_run
/// use arthook::{hook::Hook, value::Value};
///
/// let always_false = Hook::return_constant(Value::Boolean(false));
/// let skip = Hook::do_nothing();
/// let negate = Hook::replace("negate", |param| {
///     Ok(Value::Int(-param.arg(0).and_then(Value::as_int).unwrap_or(0)))
/// });
/// ```
pub struct Hook {
    name: String,
    before: Option<CallbackFn>,
    after: Option<CallbackFn>,
}

impl Hook {
    /// Creates a hook with no callbacks.
    ///
    /// # Arguments
    ///
    /// * `name` - A descriptive name, used in logs and in [`crate::Error::Callback`]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            before: None,
            after: None,
        }
    }

    /// Sets the before-callback.
    #[must_use]
    pub fn before<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut HookParam<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.before = Some(Box::new(handler));
        self
    }

    /// Sets the after-callback.
    #[must_use]
    pub fn after<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut HookParam<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.after = Some(Box::new(handler));
        self
    }

    /// Replaces the method entirely.
    ///
    /// `replacement` computes the value to return, or the exception to throw.
    #[must_use]
    pub fn replace<F>(name: impl Into<String>, replacement: F) -> Self
    where
        F: Fn(&mut HookParam<'_>) -> std::result::Result<Value, Throwable> + Send + Sync + 'static,
    {
        Self::new(name).before(move |param| {
            match replacement(param) {
                Ok(value) => param.set_result(value),
                Err(throwable) => param.set_throwable(throwable),
            }
            Ok(())
        })
    }

    /// Replacement that skips the method and returns the zero value of its return kind
    /// (`void`, `0`, `false` or `null`).
    #[must_use]
    pub fn do_nothing() -> Self {
        Self::replace("do-nothing", |param| {
            Ok(Value::default_for(param.shape().return_kind()))
        })
    }

    /// Replacement that always returns `value`.
    #[must_use]
    pub fn return_constant(value: Value) -> Self {
        Self::replace(format!("return-constant({value})"), move |_| {
            Ok(value.clone())
        })
    }

    /// Returns `true` if a before-callback is set.
    #[must_use]
    pub fn has_before(&self) -> bool {
        self.before.is_some()
    }

    /// Returns `true` if an after-callback is set.
    #[must_use]
    pub fn has_after(&self) -> bool {
        self.after.is_some()
    }
}

impl MethodHook for Hook {
    fn name(&self) -> &str {
        &self.name
    }

    fn before(&self, param: &mut HookParam<'_>) -> CallbackResult {
        match &self.before {
            Some(handler) => handler(param),
            None => Ok(()),
        }
    }

    fn after(&self, param: &mut HookParam<'_>) -> CallbackResult {
        match &self.after {
            Some(handler) => handler(param),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("has_before", &self.has_before())
            .field("has_after", &self.has_after())
            .finish()
    }
}
