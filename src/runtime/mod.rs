//! Runtime capability interface.
//!
//! The interception engine never touches runtime internals directly. Everything it needs
//! from the managed runtime - method lookup, entry-point and access-flag mutation, record
//! cloning, compiled-code invalidation and stop-the-world pauses - is expressed through
//! the [`RuntimeAdapter`] trait. The engine in turn exposes a single
//! [`InvocationHandler`] that the runtime calls whenever execution lands on a redirected
//! entry point.
//!
//! # Architecture
//!
//! ```text
//! caller ──▶ method record ──▶ EntryPoint::Trampoline(t)
//!                                    │
//!                       RuntimeAdapter resolves t to the bound
//!                                    ▼
//!                          InvocationHandler::handle
//!                                    │
//!                       callbacks + RuntimeAdapter::invoke(backup)
//! ```
//!
//! # Runtime Variants
//!
//! Runtimes differ in which method kinds they can faithfully clone. The variant is
//! derived from the platform API level:
//!
//! | API level | Variant |
//! |-----------|---------|
//! | 15 - 19 | [`RuntimeVariant::Dalvik`] |
//! | 20 - 21 | [`RuntimeVariant::Art5_0`] |
//! | 22 | [`RuntimeVariant::Art5_1`] |
//!
//! The [`sim`] module contains a complete in-process adapter used by the test suite.

pub mod sim;

use std::{fmt, sync::Weak, time::Duration};

use strum::{Display, EnumIter};

use crate::{
    metadata::{AccessFlags, ClassRef, MemberDescriptor, MethodInfo, MethodKind, MethodRecord},
    value::Value,
    Error, Result,
};

/// Address of a trampoline bound with [`RuntimeAdapter::bind_trampoline`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrampolineRef(pub u64);

impl fmt::Debug for TrampolineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrampolineRef(0x{:x})", self.0)
    }
}

/// Where execution goes when a method record is invoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    /// The method body is interpreted.
    Interpreter,
    /// Execution jumps to compiled code at the given address.
    Compiled(u64),
    /// Execution is routed to the interception trampoline.
    Trampoline(TrampolineRef),
}

impl EntryPoint {
    /// Returns `true` if this entry point routes into a trampoline.
    #[must_use]
    pub fn is_trampoline(&self) -> bool {
        matches!(self, EntryPoint::Trampoline(_))
    }
}

/// Runtime flavour, determining which method kinds can be cloned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum RuntimeVariant {
    /// Dalvik VM (API 15 - 19)
    #[strum(serialize = "dalvik")]
    Dalvik,
    /// ART as shipped with Android 5.0 (API 20 - 21)
    #[strum(serialize = "art-5.0")]
    Art5_0,
    /// ART as shipped with Android 5.1 (API 22)
    #[strum(serialize = "art-5.1")]
    Art5_1,
}

impl RuntimeVariant {
    /// Maps a platform API level to its runtime variant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] for API levels without a known variant.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use arthook::runtime::RuntimeVariant;
    ///
    /// assert_eq!(RuntimeVariant::from_api_level(22).unwrap(), RuntimeVariant::Art5_1);
    /// assert_eq!(RuntimeVariant::from_api_level(19).unwrap(), RuntimeVariant::Dalvik);
    /// assert!(RuntimeVariant::from_api_level(23).is_err());
    /// ```
    pub fn from_api_level(level: u32) -> Result<Self> {
        match level {
            15..=19 => Ok(RuntimeVariant::Dalvik),
            20 | 21 => Ok(RuntimeVariant::Art5_0),
            22 => Ok(RuntimeVariant::Art5_1),
            other => Err(Error::NotSupported(other)),
        }
    }

    /// Method kinds whose records this variant can clone into a backup.
    ///
    /// Plain methods (no kind bits at all) are always clonable. ART 5.0 cannot preserve
    /// the native bridge of a cloned JNI method, so `NATIVE` is missing there.
    #[must_use]
    pub fn clone_support(self) -> MethodKind {
        match self {
            RuntimeVariant::Dalvik | RuntimeVariant::Art5_1 => {
                MethodKind::NATIVE
                    | MethodKind::SYNCHRONIZED
                    | MethodKind::CONSTRUCTOR
                    | MethodKind::STATIC
            }
            RuntimeVariant::Art5_0 => {
                MethodKind::SYNCHRONIZED | MethodKind::CONSTRUCTOR | MethodKind::STATIC
            }
        }
    }

    /// Returns `true` if a method of `kind` can be cloned on this variant.
    ///
    /// `ABSTRACT` methods are never clonable.
    #[must_use]
    pub fn can_clone(self, kind: MethodKind) -> bool {
        !kind.contains(MethodKind::ABSTRACT) && self.clone_support().contains(kind)
    }
}

/// Engine-side target of a trampoline entry point.
///
/// The runtime calls `handle` for every invocation that lands on a redirected record,
/// passing the record that was called together with the receiver and arguments.
pub trait InvocationHandler: Send + Sync {
    /// Handles one intercepted invocation.
    ///
    /// # Errors
    ///
    /// Any error is delivered to the caller as if the original method had failed.
    fn handle(&self, record: MethodRecord, this: Option<Value>, args: Vec<Value>)
        -> Result<Value>;
}

/// Capabilities the engine requires from a managed runtime.
///
/// Implementations must make `set_entry_point` and `set_access_flags` individually
/// atomic with respect to concurrent invocations; the engine only mutates live records
/// while every other mutator is paused through [`suspend_all`](Self::suspend_all).
pub trait RuntimeAdapter: Send + Sync {
    /// The runtime flavour.
    fn variant(&self) -> RuntimeVariant;

    /// Looks up a declared method by class and member descriptor.
    ///
    /// Returns `Ok(None)` when the class or member does not exist. Backup copies are never
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns an error only if runtime metadata could not be accessed.
    fn resolve(&self, class: &ClassRef, member: &MemberDescriptor)
        -> Result<Option<MethodRecord>>;

    /// Lists the members declared on `class`, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns an error only if runtime metadata could not be accessed.
    fn declared_methods(&self, class: &ClassRef) -> Result<Vec<MemberDescriptor>>;

    /// Returns a read-only view of a record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] for unknown records.
    fn describe(&self, record: MethodRecord) -> Result<MethodInfo>;

    /// Reads the record's current entry point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] for unknown records.
    fn entry_point(&self, record: MethodRecord) -> Result<EntryPoint>;

    /// Atomically replaces the record's entry point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] for unknown records.
    fn set_entry_point(&self, record: MethodRecord, entry: EntryPoint) -> Result<()>;

    /// Reads the record's access flags.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] for unknown records.
    fn access_flags(&self, record: MethodRecord) -> Result<AccessFlags>;

    /// Atomically replaces the record's access flags.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] for unknown records.
    fn set_access_flags(&self, record: MethodRecord, flags: AccessFlags) -> Result<()>;

    /// Allocates a bitwise copy of a record.
    ///
    /// The copy shares the original's body, declaring class and shape, is never
    /// reachable from class method tables and lives for the rest of the process.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] for unknown records.
    fn allocate_copy(&self, record: MethodRecord) -> Result<MethodRecord>;

    /// Discards compiled code and inline caches that bypass the record's entry point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] for unknown records.
    fn invalidate_compiled_code(&self, record: MethodRecord) -> Result<()>;

    /// Requests every other mutator thread to park at its next safepoint and waits until
    /// they have, or until `timeout` elapses.
    ///
    /// Returns `Ok(false)` if the timeout elapsed. The request has then been withdrawn
    /// and [`resume_all`](Self::resume_all) must not be called.
    ///
    /// # Errors
    ///
    /// Returns an error only if the thread list could not be accessed.
    fn suspend_all(&self, timeout: Duration) -> Result<bool>;

    /// Releases the mutators parked by a successful [`suspend_all`](Self::suspend_all).
    ///
    /// # Errors
    ///
    /// Returns an error only if the thread list could not be accessed.
    fn resume_all(&self) -> Result<()>;

    /// Runs `f` as a blocking region: for its duration the calling thread counts as
    /// parked at a safepoint.
    ///
    /// The engine waits for other installers inside such a region, since an installer
    /// may itself be waiting for the calling thread to reach a safepoint. Runtimes
    /// without a thread list can keep the default, which just runs `f`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the thread list could not be accessed.
    fn blocking_region(&self, f: &mut dyn FnMut()) -> Result<()> {
        f();
        Ok(())
    }

    /// Registers `handler` as a trampoline target and returns its address.
    ///
    /// The runtime holds the handler weakly; invocations that land on the trampoline
    /// after the handler was dropped fail.
    fn bind_trampoline(&self, handler: Weak<dyn InvocationHandler>) -> TrampolineRef;

    /// Invokes a record through its current entry point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Thrown`] if the method threw, or any error produced along the
    /// dispatch path.
    fn invoke(&self, record: MethodRecord, this: Option<&Value>, args: &[Value])
        -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_api_level_mapping() {
        for level in 15..=19 {
            assert_eq!(
                RuntimeVariant::from_api_level(level).unwrap(),
                RuntimeVariant::Dalvik
            );
        }
        assert_eq!(
            RuntimeVariant::from_api_level(20).unwrap(),
            RuntimeVariant::Art5_0
        );
        assert_eq!(
            RuntimeVariant::from_api_level(21).unwrap(),
            RuntimeVariant::Art5_0
        );
        assert_eq!(
            RuntimeVariant::from_api_level(22).unwrap(),
            RuntimeVariant::Art5_1
        );
        assert!(matches!(
            RuntimeVariant::from_api_level(14),
            Err(Error::NotSupported(14))
        ));
        assert!(matches!(
            RuntimeVariant::from_api_level(23),
            Err(Error::NotSupported(23))
        ));
    }

    #[test]
    fn test_clone_support() {
        assert!(!RuntimeVariant::Art5_0.can_clone(MethodKind::NATIVE));
        assert!(RuntimeVariant::Art5_1.can_clone(MethodKind::NATIVE));
        assert!(RuntimeVariant::Dalvik.can_clone(MethodKind::NATIVE | MethodKind::STATIC));

        for variant in RuntimeVariant::iter() {
            assert!(variant.can_clone(MethodKind::empty()), "{variant}");
            assert!(variant.can_clone(MethodKind::SYNCHRONIZED), "{variant}");
            assert!(!variant.can_clone(MethodKind::ABSTRACT), "{variant}");
        }
    }

    #[test]
    fn test_variant_display() {
        assert_eq!(RuntimeVariant::Art5_1.to_string(), "art-5.1");
        assert_eq!(RuntimeVariant::Dalvik.to_string(), "dalvik");
    }

    #[test]
    fn test_entry_point() {
        assert!(EntryPoint::Trampoline(TrampolineRef(1)).is_trampoline());
        assert!(!EntryPoint::Compiled(0x1000).is_trampoline());
        assert!(!EntryPoint::Interpreter.is_trampoline());
    }
}
