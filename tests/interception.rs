//! Integration tests for the invocation protocol of hooked methods.
//!
//! Every test builds a fresh simulated runtime and engine, so hooks never leak between
//! tests.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use arthook::{prelude::*, hook::InstallState};

const CALC: &str = "Lcom/example/Calc;";

struct Fixture {
    rt: Arc<SimRuntime>,
    class: ClassRef,
    engine: Arc<HookEngine>,
    /// Number of times the body of `add(II)I` actually ran
    add_runs: Arc<AtomicUsize>,
}

fn fixture() -> Result<Fixture> {
    fixture_with(EngineConfig::testing())
}

fn fixture_with(config: EngineConfig) -> Result<Fixture> {
    let rt = Arc::new(SimRuntime::new(RuntimeVariant::Art5_1));
    let class = rt.define_class(CALC);
    let add_runs = Arc::new(AtomicUsize::new(0));
    let public_static = AccessFlags::PUBLIC | AccessFlags::STATIC;

    let runs = add_runs.clone();
    rt.define_method(&class, "add", "(II)I", public_static, move |_, _, args| {
        runs.fetch_add(1, Ordering::SeqCst);
        let a = args[0].as_int().unwrap_or(0);
        let b = args[1].as_int().unwrap_or(0);
        Ok(Value::Int(a.wrapping_add(b)))
    })?;
    rt.define_method(&class, "risky", "()I", public_static, |_, _, _| {
        Err(Throwable::new("java.lang.ArithmeticException", "/ by zero").into())
    })?;
    rt.define_method(&class, "log", "(I)V", public_static, |_, _, _| Ok(Value::Void))?;
    rt.define_method(&class, "fib", "(I)I", public_static, |rt, _, args| {
        let n = args[0].as_int().unwrap_or(0);
        if n < 2 {
            return Ok(Value::Int(n));
        }
        let class = ClassRef::new(CALC);
        let a = rt.call(&class, "fib", "(I)I", None, &[Value::Int(n - 1)])?;
        let b = rt.call(&class, "fib", "(I)I", None, &[Value::Int(n - 2)])?;
        Ok(Value::Int(a.as_int().unwrap_or(0) + b.as_int().unwrap_or(0)))
    })?;

    let counter = rt.define_class("Lcom/example/Counter;");
    rt.define_method(&counter, "get", "()I", AccessFlags::PUBLIC, |_, this, _| {
        let handle = this.and_then(Value::as_object).map(|o| o.handle).unwrap_or(0);
        Ok(Value::Int(i32::try_from(handle).unwrap_or(-1)))
    })?;

    let engine = HookEngine::new(rt.clone(), config);
    Ok(Fixture {
        rt,
        class,
        engine,
        add_runs,
    })
}

impl Fixture {
    fn add(&self, a: i32, b: i32) -> Result<Value> {
        self.rt
            .call(&self.class, "add", "(II)I", None, &[Value::Int(a), Value::Int(b)])
    }

    fn risky(&self) -> Result<Value> {
        self.rt.call(&self.class, "risky", "()I", None, &[])
    }
}

fn add_id() -> MethodIdentity {
    MethodIdentity::of(CALC, "add", "(II)I")
}

fn recorder(name: &'static str, log: &Arc<std::sync::Mutex<Vec<String>>>) -> Hook {
    let before_log = log.clone();
    let after_log = log.clone();
    Hook::new(name)
        .before(move |_| {
            before_log.lock().unwrap().push(format!("{name}:before"));
            Ok(())
        })
        .after(move |_| {
            after_log.lock().unwrap().push(format!("{name}:after"));
            Ok(())
        })
}

#[test]
fn test_override_when_negative_else_original() -> Result<()> {
    let f = fixture()?;
    f.engine.install(
        add_id(),
        Hook::new("negative-is-42").before(|param| {
            if param.arg(0).and_then(Value::as_int).is_some_and(|a| a < 0) {
                param.set_result(Value::Int(42));
            }
            Ok(())
        }),
    )?;

    assert_eq!(f.add(-1, 5)?, Value::Int(42));
    assert_eq!(f.add(2, 3)?, Value::Int(5));
    Ok(())
}

#[test]
fn test_after_callback_recovers_from_exception() -> Result<()> {
    let f = fixture()?;
    assert!(f
        .risky()
        .unwrap_err()
        .throwable()
        .is_some_and(|t| t.is("java.lang.ArithmeticException")));

    f.engine.install(
        MethodIdentity::of(CALC, "risky", "()I"),
        Hook::new("recover").after(|param| {
            if param.has_throwable() {
                param.set_result(Value::Int(0));
            }
            Ok(())
        }),
    )?;

    assert_eq!(f.risky()?, Value::Int(0));
    Ok(())
}

#[test]
fn test_after_callback_recovers_from_nested_hook_failure() -> Result<()> {
    let f = fixture()?;
    let public_static = AccessFlags::PUBLIC | AccessFlags::STATIC;
    f.rt.define_method(&f.class, "inner", "()I", public_static, |_, _, _| Ok(Value::Int(1)))?;
    f.rt.define_method(&f.class, "outer", "()I", public_static, |rt, _, _| {
        rt.call(&ClassRef::new(CALC), "inner", "()I", None, &[])
    })?;

    f.engine.install(
        MethodIdentity::of(CALC, "inner", "()I"),
        Hook::new("bad").before(|_| Err(Throwable::illegal_state("boom"))),
    )?;
    let seen = Arc::new(std::sync::Mutex::new(None));
    let observed = seen.clone();
    f.engine.install(
        MethodIdentity::of(CALC, "outer", "()I"),
        Hook::new("recover").after(move |param| {
            if let Some(throwable) = param.throwable() {
                *observed.lock().unwrap() = Some(throwable.clone());
                param.set_result(Value::Int(0));
            }
            Ok(())
        }),
    )?;

    assert_eq!(
        f.rt.call(&f.class, "outer", "()I", None, &[])?,
        Value::Int(0)
    );
    assert_eq!(
        seen.lock().unwrap().take(),
        Some(Throwable::illegal_state("boom"))
    );

    // Without a recovering callback the nested failure is the outer method's exception.
    let err = f.rt.call(&f.class, "inner", "()I", None, &[]).unwrap_err();
    assert!(matches!(err, Error::Callback { .. }));
    Ok(())
}

#[test]
fn test_nested_return_mismatch_is_thrown_by_outer_method() -> Result<()> {
    let f = fixture()?;
    let public_static = AccessFlags::PUBLIC | AccessFlags::STATIC;
    f.rt.define_method(&f.class, "twice", "(I)I", public_static, |rt, _, args| {
        let class = ClassRef::new(CALC);
        let sum = rt.call(&class, "add", "(II)I", None, &[args[0].clone(), args[0].clone()])?;
        Ok(sum)
    })?;

    f.engine
        .install(add_id(), Hook::return_constant(Value::Long(1)))?;
    f.engine.install(
        MethodIdentity::of(CALC, "twice", "(I)I"),
        Hook::new("observe").after(|_| Ok(())),
    )?;

    let err = f
        .rt
        .call(&f.class, "twice", "(I)I", None, &[Value::Int(3)])
        .unwrap_err();
    assert!(matches!(&err, Error::Thrown(t) if t.is("java.lang.ClassCastException")));
    Ok(())
}

#[test]
fn test_after_callback_can_turn_result_into_exception() -> Result<()> {
    let f = fixture()?;
    f.engine.install(
        add_id(),
        Hook::new("deny").after(|param| {
            param.set_throwable(Throwable::new("java.lang.SecurityException", "denied"));
            Ok(())
        }),
    )?;

    let err = f.add(1, 2).unwrap_err();
    assert!(matches!(&err, Error::Thrown(t) if t.is("java.lang.SecurityException")));
    assert_eq!(f.add_runs.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_before_override_skips_backup() -> Result<()> {
    let f = fixture()?;
    f.engine
        .install(add_id(), Hook::return_constant(Value::Int(7)))?;

    assert_eq!(f.add(1, 1)?, Value::Int(7));
    assert_eq!(f.add_runs.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_before_override_skips_later_before_callbacks() -> Result<()> {
    let f = fixture()?;
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));

    f.engine.install(add_id(), recorder("first", &log))?;
    f.engine.install(add_id(), Hook::return_constant(Value::Int(1)))?;
    f.engine.install(add_id(), recorder("third", &log))?;

    assert_eq!(f.add(5, 5)?, Value::Int(1));
    // The third callback's before is skipped, its after still runs.
    assert_eq!(
        *log.lock().unwrap(),
        ["first:before", "first:after", "third:after"]
    );
    Ok(())
}

#[test]
fn test_chain_runs_in_registration_order() -> Result<()> {
    let f = fixture()?;
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));

    assert_eq!(
        f.engine.install(add_id(), recorder("a", &log))?,
        InstallOutcome::Installed
    );
    assert_eq!(
        f.engine.install(add_id(), recorder("b", &log))?,
        InstallOutcome::Appended { position: 1 }
    );

    assert_eq!(f.add(1, 2)?, Value::Int(3));
    assert_eq!(
        *log.lock().unwrap(),
        ["a:before", "b:before", "a:after", "b:after"]
    );

    let stats = f.engine.stats();
    assert_eq!(stats.clones, 1);
    assert_eq!(stats.installs, 1);
    assert_eq!(stats.appends, 1);
    Ok(())
}

#[test]
fn test_backup_matches_pre_hook_behavior() -> Result<()> {
    let f = fixture()?;
    let inputs = [(0, 0), (1, 2), (-5, 3), (i32::MAX, 1), (100, -100)];
    let oracle: Vec<Value> = inputs
        .iter()
        .map(|&(a, b)| f.add(a, b))
        .collect::<Result<_>>()?;

    f.engine
        .install(add_id(), Hook::return_constant(Value::Int(-1)))?;
    let backup = f.engine.lookup(&add_id()).map(|e| e.backup());

    for (&(a, b), expected) in inputs.iter().zip(&oracle) {
        let args = [Value::Int(a), Value::Int(b)];
        assert_eq!(f.add(a, b)?, Value::Int(-1));
        assert_eq!(&f.engine.invoke_original(&add_id(), None, &args)?, expected);
        if let Some(backup) = backup {
            assert_eq!(&f.rt.call_record(backup, None, &args)?, expected);
        }
    }
    Ok(())
}

#[test]
fn test_lookup_is_stable() -> Result<()> {
    let f = fixture()?;
    assert!(f.engine.lookup(&add_id()).is_none());

    f.engine.install(add_id(), Hook::new("a"))?;
    let first = f.engine.lookup(&add_id()).map(|e| e.backup());
    f.engine.install(add_id(), Hook::new("b"))?;

    for _ in 0..10 {
        let entry = f.engine.lookup(&add_id());
        assert_eq!(entry.as_ref().map(|e| e.backup()), first);
        assert_eq!(entry.map(|e| e.state()), Some(InstallState::Installed));
    }
    assert_eq!(f.engine.hooked_methods(), vec![add_id()]);
    Ok(())
}

#[test]
fn test_argument_mutation_reaches_backup() -> Result<()> {
    let f = fixture()?;
    f.engine.install(
        add_id(),
        Hook::new("double").before(|param| {
            for arg in param.args_mut() {
                if let Value::Int(v) = arg {
                    *v *= 2;
                }
            }
            Ok(())
        }),
    )?;

    assert_eq!(f.add(1, 2)?, Value::Int(6));
    Ok(())
}

#[test]
fn test_extras_shared_between_phases() -> Result<()> {
    let f = fixture()?;
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_after = seen.clone();

    f.engine.install(
        add_id(),
        Hook::new("extras")
            .before(|param| {
                let first = param.arg(0).cloned().unwrap_or(Value::Null);
                param.set_extra("first", first);
                Ok(())
            })
            .after(move |param| {
                if let Some(Value::Int(first)) = param.extra("first") {
                    seen_after.store(*first as usize, Ordering::SeqCst);
                }
                Ok(())
            }),
    )?;

    f.add(11, 1)?;
    assert_eq!(seen.load(Ordering::SeqCst), 11);
    Ok(())
}

#[test]
fn test_type_mismatch_reported_to_caller() -> Result<()> {
    let f = fixture()?;
    f.engine
        .install(add_id(), Hook::return_constant(Value::Long(1)))?;

    match f.add(1, 1) {
        Err(Error::TypeMismatch {
            expected, found, ..
        }) => {
            assert_eq!(expected, "int");
            assert_eq!(found, "long");
        }
        other => panic!("expected a type mismatch, got {other:?}"),
    }

    // A later, well-typed call is unaffected.
    f.engine.install(
        add_id(),
        Hook::new("fix").after(|param| {
            param.set_result(Value::Int(2));
            Ok(())
        }),
    )?;
    assert_eq!(f.add(1, 1)?, Value::Int(2));
    Ok(())
}

#[test]
fn test_void_method_results() -> Result<()> {
    let f = fixture()?;
    let log_id = MethodIdentity::of(CALC, "log", "(I)V");
    f.engine.install(log_id, Hook::do_nothing())?;
    assert_eq!(
        f.rt.call(&f.class, "log", "(I)V", None, &[Value::Int(1)])?,
        Value::Void
    );
    Ok(())
}

#[test]
fn test_before_callback_error() -> Result<()> {
    let f = fixture()?;
    let after_runs = Arc::new(AtomicUsize::new(0));
    let counted = after_runs.clone();

    f.engine.install(
        add_id(),
        Hook::new("broken")
            .before(|_| Err(Throwable::illegal_state("broken hook")))
            .after(move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
    )?;

    match f.add(1, 2) {
        Err(Error::Callback { hook, phase, source }) => {
            assert_eq!(hook, "broken");
            assert_eq!(phase, Phase::Before);
            assert!(source.is("java.lang.IllegalStateException"));
        }
        other => panic!("expected a callback error, got {other:?}"),
    }
    assert_eq!(f.add_runs.load(Ordering::SeqCst), 0);
    assert_eq!(after_runs.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_after_callback_error_replaces_result() -> Result<()> {
    let f = fixture()?;
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));
    f.engine.install(
        add_id(),
        Hook::new("broken-after").after(|_| Err(Throwable::illegal_state("late"))),
    )?;
    f.engine.install(add_id(), recorder("skipped", &log))?;

    assert!(matches!(
        f.add(1, 2),
        Err(Error::Callback {
            phase: Phase::After,
            ..
        })
    ));
    assert_eq!(f.add_runs.load(Ordering::SeqCst), 1);
    assert_eq!(*log.lock().unwrap(), ["skipped:before"]);
    Ok(())
}

#[test]
fn test_invoke_original_from_callback() -> Result<()> {
    let f = fixture()?;
    let engine = Arc::downgrade(&f.engine);
    f.engine.install(
        add_id(),
        Hook::replace("plus-original", move |param| {
            let Some(engine) = engine.upgrade() else {
                return Err(Throwable::illegal_state("engine gone"));
            };
            let original = engine
                .invoke_original(param.identity(), None, param.args())
                .map_err(|e| Throwable::illegal_state(e.to_string()))?;
            Ok(Value::Int(original.as_int().unwrap_or(0) + 1000))
        }),
    )?;

    assert_eq!(f.add(1, 2)?, Value::Int(1003));
    Ok(())
}

#[test]
fn test_recursive_method_goes_through_hook() -> Result<()> {
    let f = fixture()?;
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    f.engine.install(
        MethodIdentity::of(CALC, "fib", "(I)I"),
        Hook::new("count").before(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    )?;

    assert_eq!(
        f.rt.call(&f.class, "fib", "(I)I", None, &[Value::Int(10)])?,
        Value::Int(55)
    );
    // fib(10) makes 177 calls in total
    assert_eq!(calls.load(Ordering::SeqCst), 177);
    Ok(())
}

#[test]
fn test_reentrancy_is_bounded() -> Result<()> {
    let f = fixture_with(EngineConfig::testing().with_max_reentrancy_depth(8))?;
    let rt = f.rt.clone();
    let class = f.class.clone();
    f.engine.install(
        add_id(),
        Hook::new("runaway").before(move |param| {
            let result = rt.call(&class, "add", "(II)I", None, param.args());
            match result {
                Ok(value) => {
                    param.set_result(value);
                    Ok(())
                }
                Err(e) => Err(Throwable::illegal_state(e.to_string())),
            }
        }),
    )?;

    let err = f.add(1, 1).unwrap_err();
    assert!(matches!(err, Error::Callback { .. }));
    assert!(err.to_string().contains("re-entrancy"));
    Ok(())
}

#[test]
fn test_instance_method_receiver() -> Result<()> {
    let f = fixture()?;
    let counter = ClassRef::new("Lcom/example/Counter;");
    let get = MethodIdentity::of("Lcom/example/Counter;", "get", "()I");
    let receivers = Arc::new(AtomicUsize::new(0));
    let seen = receivers.clone();

    f.engine.install(
        get.clone(),
        Hook::new("receiver").before(move |param| {
            if param.this().and_then(Value::as_object).is_some() {
                seen.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }),
    )?;

    let obj = f.rt.new_object(&counter);
    let handle = obj.as_object().map(|o| o.handle).unwrap_or(0);
    assert_eq!(
        f.rt.call(&counter, "get", "()I", Some(&obj), &[])?,
        Value::Int(handle as i32)
    );
    assert_eq!(receivers.load(Ordering::SeqCst), 1);

    assert!(matches!(
        f.engine.invoke_original(&get, None, &[]),
        Err(Error::ArgumentMismatch { .. })
    ));
    Ok(())
}

#[test]
fn test_unknown_and_unsupported() {
    let f = fixture().unwrap();
    assert!(matches!(
        f.engine
            .install(MethodIdentity::of(CALC, "mul", "(II)I"), Hook::new("x")),
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        SimRuntime::for_api_level(28),
        Err(Error::NotSupported(28))
    ));
}

#[test]
fn test_compiled_call_sites_reach_trampoline() -> Result<()> {
    let f = fixture()?;
    let add = f
        .rt
        .resolve(&f.class, &MemberDescriptor::new("add", "(II)I"))?
        .ok_or_else(|| Error::NotFound(add_id()))?;
    let args = [Value::Int(2), Value::Int(2)];

    f.rt.compile(add)?;
    assert_eq!(f.rt.call_compiled(add, None, &args)?, Value::Int(4));

    f.engine
        .install(add_id(), Hook::return_constant(Value::Int(5)))?;
    assert_eq!(f.rt.call_compiled(add, None, &args)?, Value::Int(5));
    assert_eq!(f.rt.call_record(add, None, &args)?, Value::Int(5));
    assert!(f.rt.entry_point(add)?.is_trampoline());
    Ok(())
}

#[test]
fn test_compiling_hooked_method_keeps_redirect() -> Result<()> {
    let f = fixture()?;
    let add = f
        .rt
        .resolve(&f.class, &MemberDescriptor::new("add", "(II)I"))?
        .ok_or_else(|| Error::NotFound(add_id()))?;
    let args = [Value::Int(2), Value::Int(3)];

    f.engine
        .install(add_id(), Hook::return_constant(Value::Int(42)))?;
    f.rt.compile(add)?;

    assert!(f.rt.entry_point(add)?.is_trampoline());
    assert_eq!(f.rt.call_compiled(add, None, &args)?, Value::Int(42));
    assert_eq!(f.rt.call_record(add, None, &args)?, Value::Int(42));
    assert_eq!(f.add(2, 3)?, Value::Int(42));
    assert!(f.engine.is_hooked(&add_id()));
    assert_eq!(f.add_runs.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_unhookable_methods_stay_untouched() -> Result<()> {
    let rt = Arc::new(SimRuntime::new(RuntimeVariant::Art5_0));
    let class = rt.define_class(CALC);
    rt.define_abstract(&class, "area", "()D", AccessFlags::PUBLIC)?;
    let native = rt.define_method(
        &class,
        "nativeHash",
        "()I",
        AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::NATIVE,
        |_, _, _| Ok(Value::Int(7)),
    )?;
    let engine = HookEngine::new(rt.clone(), EngineConfig::testing());
    let methods = rt.method_count()?;

    assert!(matches!(
        engine.install(MethodIdentity::of(CALC, "area", "()D"), Hook::do_nothing()),
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        engine.install(MethodIdentity::of(CALC, "nativeHash", "()I"), Hook::do_nothing()),
        Err(Error::Clone { .. })
    ));

    assert!(engine.hooked_methods().is_empty());
    assert_eq!(rt.method_count()?, methods);
    assert!(!rt.entry_point(native)?.is_trampoline());
    assert_eq!(rt.call(&class, "nativeHash", "()I", None, &[])?, Value::Int(7));
    Ok(())
}
