//! Interceptor trampoline.
//!
//! Every call that lands on a redirected entry point ends up in [`Trampoline::handle`],
//! which runs the invocation protocol:
//!
//! ```text
//! lookup entry ──▶ check args ──▶ snapshot chain
//!                                      │
//!     before-callbacks (until one returns early)
//!                                      │
//!     backup (unless returned early) ──▶ record result / throwable
//!                                      │
//!     after-callbacks (every callback of the snapshot)
//!                                      │
//!     return value, or throw
//! ```
//!
//! The chain snapshot is taken once per invocation, so callbacks appended while the call
//! is in flight only apply to later calls.

use std::{cell::Cell, sync::Arc};

use tracing::{trace, warn};

use crate::{
    hook::{
        engine::StatCounters,
        registry::HookRegistry,
        types::{HookParam, Phase},
    },
    metadata::{MethodIdentity, MethodRecord, MethodShape},
    runtime::{InvocationHandler, RuntimeAdapter},
    value::{Throwable, Value},
    Error, Result,
};

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Tracks trampoline nesting on the current thread.
struct ReentrancyGuard;

impl ReentrancyGuard {
    fn enter(limit: usize) -> Result<Self> {
        DEPTH.with(|depth| {
            let current = depth.get();
            if current >= limit {
                return Err(Error::ReentrancyLimit(limit));
            }
            depth.set(current + 1);
            Ok(ReentrancyGuard)
        })
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Checks a receiver and arguments against a method shape.
pub(crate) fn check_arguments(
    identity: &MethodIdentity,
    shape: &MethodShape,
    this: Option<&Value>,
    args: &[Value],
) -> Result<()> {
    let mismatch = |message: String| Error::ArgumentMismatch {
        identity: identity.clone(),
        message,
    };

    if args.len() != shape.arity() {
        return Err(mismatch(format!(
            "expected {} arguments, got {}",
            shape.arity(),
            args.len()
        )));
    }
    for (index, (value, kind)) in args.iter().zip(shape.params()).enumerate() {
        if !value.conforms_to(*kind) {
            return Err(mismatch(format!(
                "argument {index} is {}, expected {kind}",
                value.kind()
            )));
        }
    }
    if shape.has_receiver() && this.and_then(Value::as_object).is_none() {
        return Err(mismatch("instance method called without a receiver".to_string()));
    }
    Ok(())
}

/// The engine's [`InvocationHandler`].
pub(crate) struct Trampoline {
    adapter: Arc<dyn RuntimeAdapter>,
    registry: Arc<HookRegistry>,
    stats: Arc<StatCounters>,
    max_depth: usize,
    trace_invocations: bool,
}

impl Trampoline {
    pub(crate) fn new(
        adapter: Arc<dyn RuntimeAdapter>,
        registry: Arc<HookRegistry>,
        stats: Arc<StatCounters>,
        max_depth: usize,
        trace_invocations: bool,
    ) -> Self {
        Trampoline {
            adapter,
            registry,
            stats,
            max_depth,
            trace_invocations,
        }
    }

    fn callback_failed(
        &self,
        identity: &MethodIdentity,
        hook: &str,
        phase: Phase,
        source: Throwable,
    ) -> Error {
        self.stats.callback_failure();
        warn!(method = %identity, hook, %phase, error = %source, "callback failed");
        Error::Callback {
            hook: hook.to_string(),
            phase,
            source,
        }
    }
}

impl InvocationHandler for Trampoline {
    fn handle(&self, record: MethodRecord, this: Option<Value>, args: Vec<Value>) -> Result<Value> {
        let Some(entry) = self.registry.by_record(record) else {
            let identity = self.adapter.describe(record)?.identity();
            return Err(Error::NotHooked(identity));
        };
        let identity = entry.identity();
        let shape = entry.shape();

        check_arguments(identity, shape, this.as_ref(), &args)?;
        let _depth = ReentrancyGuard::enter(self.max_depth)?;
        self.stats.invocation();

        let snapshot = entry.chain().snapshot();
        if snapshot.is_empty() {
            return self.adapter.invoke(entry.backup(), this.as_ref(), &args);
        }

        let mut param = HookParam::new(identity, shape, this, args);

        for callback in snapshot.iter() {
            if self.trace_invocations {
                trace!(method = %identity, hook = callback.name(), "before");
            }
            if let Err(source) = callback.before(&mut param) {
                return Err(self.callback_failed(identity, callback.name(), Phase::Before, source));
            }
            if param.returned_early() {
                break;
            }
        }

        if !param.returned_early() {
            if self.trace_invocations {
                trace!(method = %identity, backup = %entry.backup(), "invoking original");
            }
            match self
                .adapter
                .invoke(entry.backup(), param.this(), param.args())
            {
                Ok(value) => param.record_original(Ok(value)),
                // Failures of nested intercepted calls are the method's own exception.
                Err(error) => param.record_original(Err(error.into_throwable()?)),
            }
        }

        for callback in snapshot.iter() {
            if self.trace_invocations {
                trace!(method = %identity, hook = callback.name(), "after");
            }
            if let Err(source) = callback.after(&mut param) {
                return Err(self.callback_failed(identity, callback.name(), Phase::After, source));
            }
        }

        let (result, throwable) = param.into_outcome();
        if let Some(throwable) = throwable {
            return Err(Error::Thrown(throwable));
        }

        let value = result.unwrap_or(Value::Void);
        let expected = shape.return_kind();
        if !value.conforms_to(expected) {
            return Err(Error::TypeMismatch {
                identity: identity.clone(),
                expected: expected.to_string(),
                found: value.kind().to_string(),
            });
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ValueKind;

    #[test]
    fn test_check_arguments() {
        let id = MethodIdentity::of("LFoo;", "bar", "(IJ)V");
        let shape = MethodShape::new(vec![ValueKind::Int, ValueKind::Long], ValueKind::Void, true);

        assert!(check_arguments(&id, &shape, None, &[Value::Int(1), Value::Long(2)]).is_ok());
        assert!(matches!(
            check_arguments(&id, &shape, None, &[Value::Int(1)]),
            Err(Error::ArgumentMismatch { .. })
        ));
        assert!(matches!(
            check_arguments(&id, &shape, None, &[Value::Long(1), Value::Long(2)]),
            Err(Error::ArgumentMismatch { .. })
        ));
    }

    #[test]
    fn test_check_receiver() {
        let id = MethodIdentity::of("LFoo;", "get", "()I");
        let shape = MethodShape::new(Vec::new(), ValueKind::Int, false);

        assert!(matches!(
            check_arguments(&id, &shape, None, &[]),
            Err(Error::ArgumentMismatch { .. })
        ));
        assert!(matches!(
            check_arguments(&id, &shape, Some(&Value::Null), &[]),
            Err(Error::ArgumentMismatch { .. })
        ));
    }

    #[test]
    fn test_reentrancy_guard() {
        let outer = ReentrancyGuard::enter(2).unwrap();
        let inner = ReentrancyGuard::enter(2).unwrap();
        assert!(matches!(
            ReentrancyGuard::enter(2),
            Err(Error::ReentrancyLimit(2))
        ));
        drop(inner);
        let again = ReentrancyGuard::enter(2).unwrap();
        drop(again);
        drop(outer);
        DEPTH.with(|depth| assert_eq!(depth.get(), 0));
    }
}
