//! In-process simulated managed runtime.
//!
//! [`SimRuntime`] implements [`RuntimeAdapter`] on top of a method arena whose bodies are
//! Rust closures. It models the parts of a real runtime that matter for interception:
//!
//! - **Entry points** - every invocation is dispatched through the record's current
//!   [`EntryPoint`], so redirecting a record redirects every call path.
//! - **Call paths** - interpreted calls by name ([`SimRuntime::call`]), reflective calls
//!   by record ([`SimRuntime::call_record`]) and compiled call sites with an inline cache
//!   ([`SimRuntime::call_compiled`]). The inline cache bypasses the entry point until
//!   [`RuntimeAdapter::invalidate_compiled_code`] bumps the record's code generation.
//! - **Safepoints** - every dispatch checks in as a running mutator; nested dispatches
//!   poll for stop-the-world requests.
//!
//! # Examples
//!
//! ```rust
//! use arthook::{
//!     metadata::AccessFlags,
//!     runtime::{sim::SimRuntime, RuntimeVariant},
//!     value::Value,
//! };
//!
//! let rt = SimRuntime::new(RuntimeVariant::Art5_1);
//! let calc = rt.define_class("Lcom/example/Calc;");
//! rt.define_method(&calc, "add", "(II)I", AccessFlags::PUBLIC | AccessFlags::STATIC, |_, _, args| {
//!     Ok(Value::Int(args[0].as_int().unwrap_or(0) + args[1].as_int().unwrap_or(0)))
//! })?;
//!
//! let sum = rt.call(&calc, "add", "(II)I", None, &[Value::Int(2), Value::Int(3)])?;
//! assert_eq!(sum, Value::Int(5));
//! # Ok::<(), arthook::Error>(())
//! ```

mod method;
mod threads;

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock, Weak,
    },
    time::Duration,
};

use dashmap::DashMap;

use crate::{
    metadata::{
        AccessFlags, ClassRef, MemberDescriptor, MethodIdentity, MethodInfo, MethodRecord,
        MethodShape,
    },
    runtime::{EntryPoint, InvocationHandler, RuntimeAdapter, RuntimeVariant, TrampolineRef},
    value::{ObjectRef, Throwable, Value},
    Error, Result,
};

pub use method::MethodBody;

use method::MethodSlot;
use threads::ThreadList;

const TRAMPOLINE_BASE: u64 = 0x7ead_0000;
const CODE_BASE: u64 = 0x7f00_0000;
const CODE_ALIGN: u64 = 0x40;

/// Compiled call-site cache entry.
struct InlineCacheEntry {
    generation: u64,
    body: MethodBody,
}

/// Simulated managed runtime.
pub struct SimRuntime {
    variant: RuntimeVariant,
    methods: RwLock<Vec<Arc<MethodSlot>>>,
    classes: DashMap<ClassRef, Vec<MethodRecord>>,
    inline_cache: DashMap<MethodRecord, InlineCacheEntry>,
    trampolines: DashMap<u64, Weak<dyn InvocationHandler>>,
    next_trampoline: AtomicU64,
    next_code: AtomicU64,
    next_object: AtomicU64,
    threads: ThreadList,
}

impl SimRuntime {
    /// Creates an empty runtime of the given variant.
    #[must_use]
    pub fn new(variant: RuntimeVariant) -> Self {
        SimRuntime {
            variant,
            methods: RwLock::new(Vec::new()),
            classes: DashMap::new(),
            inline_cache: DashMap::new(),
            trampolines: DashMap::new(),
            next_trampoline: AtomicU64::new(0),
            next_code: AtomicU64::new(0),
            next_object: AtomicU64::new(1),
            threads: ThreadList::default(),
        }
    }

    /// Creates an empty runtime for a platform API level.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] for unknown API levels.
    pub fn for_api_level(level: u32) -> Result<Self> {
        Ok(Self::new(RuntimeVariant::from_api_level(level)?))
    }

    /// Declares a class. Declaring an existing class is a no-op.
    pub fn define_class(&self, descriptor: &str) -> ClassRef {
        let class = ClassRef::new(descriptor);
        self.classes.entry(class.clone()).or_default();
        class
    }

    /// Defines a concrete method on `class`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] if `signature` is malformed.
    pub fn define_method<F>(
        &self,
        class: &ClassRef,
        name: &str,
        signature: &str,
        flags: AccessFlags,
        body: F,
    ) -> Result<MethodRecord>
    where
        F: Fn(&SimRuntime, Option<&Value>, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.define(class, name, signature, flags, Some(Arc::new(body)))
    }

    /// Defines a constructor (`<init>`) on `class`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] if `signature` is malformed.
    pub fn define_constructor<F>(
        &self,
        class: &ClassRef,
        signature: &str,
        flags: AccessFlags,
        body: F,
    ) -> Result<MethodRecord>
    where
        F: Fn(&SimRuntime, Option<&Value>, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.define(
            class,
            crate::metadata::CONSTRUCTOR_NAME,
            signature,
            flags | AccessFlags::CONSTRUCTOR,
            Some(Arc::new(body)),
        )
    }

    /// Declares an abstract method (no body) on `class`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] if `signature` is malformed.
    pub fn define_abstract(
        &self,
        class: &ClassRef,
        name: &str,
        signature: &str,
        flags: AccessFlags,
    ) -> Result<MethodRecord> {
        self.define(class, name, signature, flags | AccessFlags::ABSTRACT, None)
    }

    fn define(
        &self,
        class: &ClassRef,
        name: &str,
        signature: &str,
        flags: AccessFlags,
        body: Option<MethodBody>,
    ) -> Result<MethodRecord> {
        let shape = MethodShape::parse(signature, flags.is_static())?;
        let slot = MethodSlot::new(
            class.clone(),
            MemberDescriptor::new(name, signature),
            shape,
            flags,
            body,
        );
        let record = self.push(slot)?;
        self.classes.entry(class.clone()).or_default().push(record);
        Ok(record)
    }

    fn push(&self, slot: MethodSlot) -> Result<MethodRecord> {
        let mut methods = write_lock!(self.methods);
        let index = u32::try_from(methods.len())
            .map_err(|_| Error::InvalidRecord(MethodRecord(u32::MAX)))?;
        methods.push(Arc::new(slot));
        Ok(MethodRecord(index))
    }

    fn slot(&self, record: MethodRecord) -> Result<Arc<MethodSlot>> {
        let methods = read_lock!(self.methods);
        methods
            .get(record.index() as usize)
            .cloned()
            .ok_or(Error::InvalidRecord(record))
    }

    /// Allocates a new object of `class`.
    pub fn new_object(&self, class: &ClassRef) -> Value {
        let handle = self.next_object.fetch_add(1, Ordering::Relaxed);
        Value::Object(ObjectRef::new(class.clone(), handle))
    }

    /// Calls a method by name through the interpreter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the method does not exist, otherwise whatever the
    /// invocation produced.
    pub fn call(
        &self,
        class: &ClassRef,
        name: &str,
        signature: &str,
        this: Option<&Value>,
        args: &[Value],
    ) -> Result<Value> {
        let member = MemberDescriptor::new(name, signature);
        let record = self.resolve(class, &member)?.ok_or_else(|| {
            Error::NotFound(MethodIdentity::new(class.clone(), member.clone()))
        })?;
        self.call_record(record, this, args)
    }

    /// Calls a record reflectively.
    ///
    /// # Errors
    ///
    /// Returns whatever the invocation produced.
    pub fn call_record(
        &self,
        record: MethodRecord,
        this: Option<&Value>,
        args: &[Value],
    ) -> Result<Value> {
        let _mutator = self.threads.enter()?;
        let slot = self.slot(record)?;
        Self::check_call(&slot, this, args)?;
        self.dispatch(record, &slot, this, args)
    }

    /// Calls a record from a compiled call site.
    ///
    /// Once the callee is compiled the call site caches its code and stops consulting the
    /// entry point, until the callee's compiled code is invalidated.
    ///
    /// # Errors
    ///
    /// Returns whatever the invocation produced.
    pub fn call_compiled(
        &self,
        record: MethodRecord,
        this: Option<&Value>,
        args: &[Value],
    ) -> Result<Value> {
        let _mutator = self.threads.enter()?;
        let slot = self.slot(record)?;
        Self::check_call(&slot, this, args)?;

        let cached = self
            .inline_cache
            .get(&record)
            .filter(|entry| entry.generation == slot.generation())
            .map(|entry| entry.body.clone());
        if let Some(body) = cached {
            return body(self, this, args);
        }

        match (slot.entry(), slot.body.clone()) {
            (EntryPoint::Compiled(_), Some(body)) => {
                self.inline_cache.insert(
                    record,
                    InlineCacheEntry {
                        generation: slot.generation(),
                        body: body.clone(),
                    },
                );
                body(self, this, args)
            }
            _ => self.dispatch(record, &slot, this, args),
        }
    }

    /// Compiles a method, installing a compiled entry point. Returns the code address.
    ///
    /// A record redirected to a trampoline keeps its entry point: the code is produced
    /// but never becomes reachable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] for unknown records.
    pub fn compile(&self, record: MethodRecord) -> Result<u64> {
        let slot = self.slot(record)?;
        let address = CODE_BASE + self.next_code.fetch_add(1, Ordering::Relaxed) * CODE_ALIGN;
        if !slot.set_compiled(address) {
            tracing::debug!(%record, address, "record is redirected, compiled code not installed");
        }
        Ok(address)
    }

    /// Number of records in the method arena, backups included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockError`] if the arena lock is poisoned.
    pub fn method_count(&self) -> Result<usize> {
        Ok(read_lock!(self.methods).len())
    }

    /// Number of threads currently executing managed code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockError`] if the thread list lock is poisoned.
    pub fn running_mutators(&self) -> Result<usize> {
        self.threads.running()
    }

    fn check_call(slot: &MethodSlot, this: Option<&Value>, args: &[Value]) -> Result<()> {
        let identity = || MethodIdentity::new(slot.class.clone(), slot.member.clone());

        if args.len() != slot.shape.arity() {
            return Err(Error::ArgumentMismatch {
                identity: identity(),
                message: format!("expected {} arguments, got {}", slot.shape.arity(), args.len()),
            });
        }
        if let Some((index, (value, kind))) = args
            .iter()
            .zip(slot.shape.params())
            .enumerate()
            .find(|(_, (value, kind))| !value.conforms_to(**kind))
        {
            return Err(Error::ArgumentMismatch {
                identity: identity(),
                message: format!("argument {index} is {}, expected {kind}", value.kind()),
            });
        }
        if slot.shape.has_receiver() && !matches!(this, Some(Value::Object(_))) {
            return Err(Error::Thrown(Throwable::new(
                "java.lang.NullPointerException",
                format!("null receiver for {}", identity()),
            )));
        }
        Ok(())
    }

    fn dispatch(
        &self,
        record: MethodRecord,
        slot: &MethodSlot,
        this: Option<&Value>,
        args: &[Value],
    ) -> Result<Value> {
        match slot.entry() {
            EntryPoint::Trampoline(trampoline) => {
                let handler = self
                    .trampolines
                    .get(&trampoline.0)
                    .and_then(|handler| handler.upgrade())
                    .ok_or_else(|| {
                        Error::NotHooked(MethodIdentity::new(
                            slot.class.clone(),
                            slot.member.clone(),
                        ))
                    })?;
                handler.handle(record, this.cloned(), args.to_vec())
            }
            EntryPoint::Interpreter | EntryPoint::Compiled(_) => match &slot.body {
                Some(body) => body(self, this, args),
                None => Err(Error::Thrown(Throwable::new(
                    "java.lang.AbstractMethodError",
                    format!("{}->{}", slot.class, slot.member),
                ))),
            },
        }
    }
}

impl RuntimeAdapter for SimRuntime {
    fn variant(&self) -> RuntimeVariant {
        self.variant
    }

    fn resolve(
        &self,
        class: &ClassRef,
        member: &MemberDescriptor,
    ) -> Result<Option<MethodRecord>> {
        let Some(records) = self.classes.get(class).map(|r| r.value().clone()) else {
            return Ok(None);
        };
        let methods = read_lock!(self.methods);
        Ok(records.into_iter().find(|record| {
            methods
                .get(record.index() as usize)
                .is_some_and(|slot| slot.member == *member)
        }))
    }

    fn declared_methods(&self, class: &ClassRef) -> Result<Vec<MemberDescriptor>> {
        let Some(records) = self.classes.get(class).map(|r| r.value().clone()) else {
            return Ok(Vec::new());
        };
        let methods = read_lock!(self.methods);
        Ok(records
            .into_iter()
            .filter_map(|record| methods.get(record.index() as usize))
            .map(|slot| slot.member.clone())
            .collect())
    }

    fn describe(&self, record: MethodRecord) -> Result<MethodInfo> {
        Ok(self.slot(record)?.info())
    }

    fn entry_point(&self, record: MethodRecord) -> Result<EntryPoint> {
        Ok(self.slot(record)?.entry())
    }

    fn set_entry_point(&self, record: MethodRecord, entry: EntryPoint) -> Result<()> {
        self.slot(record)?.set_entry(entry);
        Ok(())
    }

    fn access_flags(&self, record: MethodRecord) -> Result<AccessFlags> {
        Ok(self.slot(record)?.flags())
    }

    fn set_access_flags(&self, record: MethodRecord, flags: AccessFlags) -> Result<()> {
        self.slot(record)?.set_flags(flags);
        Ok(())
    }

    fn allocate_copy(&self, record: MethodRecord) -> Result<MethodRecord> {
        let copy = self.slot(record)?.duplicate();
        self.push(copy)
    }

    fn invalidate_compiled_code(&self, record: MethodRecord) -> Result<()> {
        self.slot(record)?.invalidate();
        self.inline_cache.remove(&record);
        Ok(())
    }

    fn suspend_all(&self, timeout: Duration) -> Result<bool> {
        self.threads.suspend_all(timeout)
    }

    fn resume_all(&self) -> Result<()> {
        self.threads.resume_all()
    }

    fn blocking_region(&self, f: &mut dyn FnMut()) -> Result<()> {
        self.threads.park(f)
    }

    fn bind_trampoline(&self, handler: Weak<dyn InvocationHandler>) -> TrampolineRef {
        let index = self.next_trampoline.fetch_add(1, Ordering::Relaxed);
        let address = TRAMPOLINE_BASE + index * CODE_ALIGN;
        self.trampolines.insert(address, handler);
        tracing::trace!(address, "bound trampoline");
        TrampolineRef(address)
    }

    fn invoke(&self, record: MethodRecord, this: Option<&Value>, args: &[Value]) -> Result<Value> {
        self.call_record(record, this, args)
    }
}

impl std::fmt::Debug for SimRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimRuntime")
            .field("variant", &self.variant)
            .field("classes", &self.classes.len())
            .field("trampolines", &self.trampolines.len())
            .finish_non_exhaustive()
    }
}
