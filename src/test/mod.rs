//! Shared fixtures for unit tests.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Condvar, Mutex,
    },
    thread::JoinHandle,
    time::Duration,
};

use crate::{
    hook::{CallbackResult, HookEngine, HookParam, MethodHook},
    metadata::{AccessFlags, ClassRef, MemberDescriptor, MethodIdentity, MethodInfo, MethodRecord},
    runtime::{
        sim::SimRuntime, EntryPoint, InvocationHandler, RuntimeAdapter, RuntimeVariant,
        TrampolineRef,
    },
    value::{Throwable, Value},
    Error, EngineConfig, Result,
};

pub(crate) const CALC: &str = "Lcom/example/Calc;";

/// One-shot rendezvous used to hold a thread inside a method body.
#[derive(Default)]
pub(crate) struct Gate {
    // (entered, open)
    state: Mutex<(bool, bool)>,
    changed: Condvar,
}

impl Gate {
    /// Called from a method body: signals entry, then blocks until opened.
    pub(crate) fn pass(&self) {
        let mut state = self.state.lock().unwrap();
        state.0 = true;
        self.changed.notify_all();
        while !state.1 {
            state = self.changed.wait(state).unwrap();
        }
    }

    pub(crate) fn wait_entered(&self) {
        let mut state = self.state.lock().unwrap();
        while !state.0 {
            state = self.changed.wait(state).unwrap();
        }
    }

    pub(crate) fn open(&self) {
        self.state.lock().unwrap().1 = true;
        self.changed.notify_all();
    }
}

/// A runtime with one class exercising every method kind the engine cares about.
pub(crate) struct Calculator {
    pub runtime: Arc<SimRuntime>,
    pub class: ClassRef,
    /// `static int add(int, int)`
    pub add: MethodRecord,
    /// `static long add(long, long)`
    pub add_long: MethodRecord,
    /// `static int risky()`, always throws `ArithmeticException`
    pub risky: MethodRecord,
    /// `abstract double area()`
    pub area: MethodRecord,
    /// `static native int nativeHash()`
    pub native: MethodRecord,
    /// `static void block()`, parks on [`Calculator::gate`]
    pub block: MethodRecord,
    pub gate: Arc<Gate>,
}

pub(crate) fn calculator() -> Calculator {
    calculator_on(RuntimeVariant::Art5_1)
}

pub(crate) fn calculator_on(variant: RuntimeVariant) -> Calculator {
    let runtime = Arc::new(SimRuntime::new(variant));
    let class = runtime.define_class(CALC);
    let gate = Arc::new(Gate::default());
    let public_static = AccessFlags::PUBLIC | AccessFlags::STATIC;

    let add = runtime
        .define_method(&class, "add", "(II)I", public_static, |_, _, args| {
            let a = args[0].as_int().unwrap_or(0);
            let b = args[1].as_int().unwrap_or(0);
            Ok(Value::Int(a.wrapping_add(b)))
        })
        .unwrap();
    let add_long = runtime
        .define_method(&class, "add", "(JJ)J", public_static, |_, _, args| {
            let a = args[0].as_long().unwrap_or(0);
            let b = args[1].as_long().unwrap_or(0);
            Ok(Value::Long(a.wrapping_add(b)))
        })
        .unwrap();
    let risky = runtime
        .define_method(&class, "risky", "()I", public_static, |_, _, _| {
            Err(Throwable::new("java.lang.ArithmeticException", "/ by zero").into())
        })
        .unwrap();
    let area = runtime
        .define_abstract(&class, "area", "()D", AccessFlags::PUBLIC)
        .unwrap();
    let native = runtime
        .define_method(
            &class,
            "nativeHash",
            "()I",
            public_static | AccessFlags::NATIVE,
            |_, _, _| Ok(Value::Int(0x5eed)),
        )
        .unwrap();
    let block = {
        let gate = gate.clone();
        runtime
            .define_method(&class, "block", "()V", public_static, move |_, _, _| {
                gate.pass();
                Ok(Value::Void)
            })
            .unwrap()
    };
    runtime
        .define_constructor(&class, "()V", AccessFlags::PUBLIC, |_, _, _| Ok(Value::Void))
        .unwrap();
    runtime
        .define_constructor(&class, "(I)V", AccessFlags::PUBLIC, |_, _, _| Ok(Value::Void))
        .unwrap();

    Calculator {
        runtime,
        class,
        add,
        add_long,
        risky,
        area,
        native,
        block,
        gate,
    }
}

impl Calculator {
    pub(crate) fn adapter(&self) -> Arc<dyn RuntimeAdapter> {
        self.runtime.clone()
    }

    pub(crate) fn engine(&self) -> Arc<HookEngine> {
        self.engine_with(EngineConfig::testing())
    }

    pub(crate) fn engine_with(&self, config: EngineConfig) -> Arc<HookEngine> {
        HookEngine::new(self.adapter(), config)
    }

    pub(crate) fn add_id(&self) -> MethodIdentity {
        MethodIdentity::of(CALC, "add", "(II)I")
    }

    pub(crate) fn risky_id(&self) -> MethodIdentity {
        MethodIdentity::of(CALC, "risky", "()I")
    }

    pub(crate) fn abstract_id(&self) -> MethodIdentity {
        MethodIdentity::of(CALC, "area", "()D")
    }

    pub(crate) fn native_id(&self) -> MethodIdentity {
        MethodIdentity::of(CALC, "nativeHash", "()I")
    }

    pub(crate) fn call_add(&self, a: i32, b: i32) -> Result<Value> {
        self.runtime
            .call(&self.class, "add", "(II)I", None, &[Value::Int(a), Value::Int(b)])
    }

    /// Spawns a thread that calls `block()` and stays inside it until the gate opens.
    pub(crate) fn spawn_blocked(&self) -> JoinHandle<Result<Value>> {
        let runtime = self.runtime.clone();
        let block = self.block;
        std::thread::spawn(move || runtime.call_record(block, None, &[]))
    }
}

/// How [`FaultyRuntime`] mishandles entry point writes that target a trampoline.
#[derive(Clone, Copy, Debug)]
pub(crate) enum EntryFault {
    /// The write is accepted but has no effect
    Dropped,
    /// The write fails
    Rejected,
}

/// A [`SimRuntime`] whose entry point writes to trampolines misbehave after the access
/// flags were already changed.
pub(crate) struct FaultyRuntime {
    pub runtime: Arc<SimRuntime>,
    fault: EntryFault,
}

impl FaultyRuntime {
    pub(crate) fn new(runtime: Arc<SimRuntime>, fault: EntryFault) -> Arc<Self> {
        Arc::new(FaultyRuntime { runtime, fault })
    }

    fn sim(&self) -> &dyn RuntimeAdapter {
        self.runtime.as_ref()
    }
}

impl RuntimeAdapter for FaultyRuntime {
    fn variant(&self) -> RuntimeVariant {
        self.sim().variant()
    }

    fn resolve(&self, class: &ClassRef, member: &MemberDescriptor) -> Result<Option<MethodRecord>> {
        self.sim().resolve(class, member)
    }

    fn declared_methods(&self, class: &ClassRef) -> Result<Vec<MemberDescriptor>> {
        self.sim().declared_methods(class)
    }

    fn describe(&self, record: MethodRecord) -> Result<MethodInfo> {
        self.sim().describe(record)
    }

    fn entry_point(&self, record: MethodRecord) -> Result<EntryPoint> {
        self.sim().entry_point(record)
    }

    fn set_entry_point(&self, record: MethodRecord, entry: EntryPoint) -> Result<()> {
        match (entry, self.fault) {
            (EntryPoint::Trampoline(_), EntryFault::Dropped) => Ok(()),
            (EntryPoint::Trampoline(_), EntryFault::Rejected) => Err(Error::LockError),
            _ => self.sim().set_entry_point(record, entry),
        }
    }

    fn access_flags(&self, record: MethodRecord) -> Result<AccessFlags> {
        self.sim().access_flags(record)
    }

    fn set_access_flags(&self, record: MethodRecord, flags: AccessFlags) -> Result<()> {
        self.sim().set_access_flags(record, flags)
    }

    fn allocate_copy(&self, record: MethodRecord) -> Result<MethodRecord> {
        self.sim().allocate_copy(record)
    }

    fn invalidate_compiled_code(&self, record: MethodRecord) -> Result<()> {
        self.sim().invalidate_compiled_code(record)
    }

    fn suspend_all(&self, timeout: Duration) -> Result<bool> {
        self.sim().suspend_all(timeout)
    }

    fn resume_all(&self) -> Result<()> {
        self.sim().resume_all()
    }

    fn blocking_region(&self, f: &mut dyn FnMut()) -> Result<()> {
        self.sim().blocking_region(f)
    }

    fn bind_trampoline(&self, handler: std::sync::Weak<dyn InvocationHandler>) -> TrampolineRef {
        self.sim().bind_trampoline(handler)
    }

    fn invoke(&self, record: MethodRecord, this: Option<&Value>, args: &[Value]) -> Result<Value> {
        self.sim().invoke(record, this, args)
    }
}

/// Callback counting its invocations; clones share the counters.
#[derive(Clone)]
pub(crate) struct CountingHook {
    name: String,
    before: Arc<AtomicUsize>,
    after: Arc<AtomicUsize>,
}

impl CountingHook {
    pub(crate) fn new(name: &str) -> Self {
        CountingHook {
            name: name.to_string(),
            before: Arc::new(AtomicUsize::new(0)),
            after: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn before_calls(&self) -> usize {
        self.before.load(Ordering::SeqCst)
    }

    pub(crate) fn after_calls(&self) -> usize {
        self.after.load(Ordering::SeqCst)
    }
}

impl MethodHook for CountingHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn before(&self, _param: &mut HookParam<'_>) -> CallbackResult {
        self.before.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn after(&self, _param: &mut HookParam<'_>) -> CallbackResult {
        self.after.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
