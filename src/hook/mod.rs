//! Method interception.
//!
//! This module redirects individual runtime methods to an interception trampoline so
//! that user callbacks run before and after the original behavior. Hooks support:
//!
//! - **Before/after callbacks**: Inspect and mutate arguments, results and exceptions
//! - **Replacement**: A before-callback can skip the original entirely
//! - **Chains**: Any number of callbacks per method, run in registration order
//! - **Original access**: The pre-hook behavior stays callable through a backup record
//!
//! # Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Call context, phases, install states |
//! | [`core`](self::core) | The [`MethodHook`] trait and the [`Hook`] builder |
//! | [`chain`] | Append-only [`CallbackChain`] with snapshot reads |
//! | [`registry`] | [`HookRegistry`] and [`HookEntry`] |
//! | [`engine`] | The [`HookEngine`] service object |
//!
//! Internally, installation goes through an identity resolver, a backup cloner, an
//! entry-point rewriter and a safepoint coordinator; invocations go through the
//! trampoline.
//!
//! # Installation Flow
//!
//! ```text
//! install(identity, callback)
//!         │
//!         ▼
//! ┌───────────────────┐
//! │  Already hooked?  │───► Yes ───► append to chain ───► Appended
//! └───────────────────┘
//!         │ No
//!         ▼
//! ┌───────────────────┐
//! │  Resolve + check  │───► NotFound / Clone error (nothing mutated)
//! └───────────────────┘
//!         │
//!         ▼
//! ┌───────────────────────────────────────┐
//! │  Stop the world                       │
//! │    clone backup ─► redirect ─► publish│
//! │  Resume                               │
//! └───────────────────────────────────────┘
//!         │
//!         ▼
//!     Installed
//! ```
//!
//! # Invocation Flow
//!
//! ```text
//! call ──▶ trampoline ──▶ before-callbacks ──▶ backup ──▶ after-callbacks ──▶ caller
//!                               │                             ▲
//!                               └──── result set early ───────┘
//! ```
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use arthook::{
//!     hook::{Hook, HookEngine},
//!     metadata::{AccessFlags, MethodIdentity},
//!     runtime::{sim::SimRuntime, RuntimeVariant},
//!     value::{Throwable, Value},
//!     EngineConfig,
//! };
//!
//! let rt = Arc::new(SimRuntime::new(RuntimeVariant::Art5_1));
//! let class = rt.define_class("Lcom/example/Auth;");
//! rt.define_method(&class, "check", "(I)Z", AccessFlags::PUBLIC | AccessFlags::STATIC, |_, _, _| {
//!     Ok(Value::Boolean(false))
//! })?;
//!
//! let engine = HookEngine::new(rt.clone(), EngineConfig::production());
//! let check = MethodIdentity::of("Lcom/example/Auth;", "check", "(I)Z");
//! engine.install(check.clone(), Hook::return_constant(Value::Boolean(true)))?;
//!
//! assert_eq!(rt.call(&class, "check", "(I)Z", None, &[Value::Int(1)])?, Value::Boolean(true));
//! assert_eq!(engine.invoke_original(&check, None, &[Value::Int(1)])?, Value::Boolean(false));
//! # Ok::<(), arthook::Error>(())
//! ```

pub mod chain;
pub mod core;
pub mod engine;
pub mod registry;
pub mod types;

mod cloner;
mod resolver;
mod rewriter;
mod safepoint;
mod trampoline;

pub use chain::{CallbackChain, ChainSnapshot};
pub use self::core::{CallbackFn, Hook, MethodHook};
pub use engine::{EngineStats, HookEngine};
pub use registry::{HookEntry, HookRegistry};
pub use resolver::ResolvedMethod;
pub use types::{CallbackResult, HookParam, InstallOutcome, InstallState, Phase};
