// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # arthook
//!
//! Method interception for managed runtimes. `arthook` redirects individual methods of a
//! running managed runtime to an interception trampoline, so that user callbacks run
//! before and after the original behavior, can inspect and rewrite arguments, results
//! and exceptions, and can replace the method entirely, while the original stays
//! callable through a private backup copy.
//!
//! ## Features
//!
//! - **Per-method hooks** - Redirect one method without touching its class or callers
//! - **Callback chains** - Any number of before/after callbacks per method
//! - **Original access** - Invoke the un-hooked behavior from inside a callback
//! - **Safe installation** - Live metadata is only mutated while every mutator thread
//!   is parked at a safepoint
//! - **Runtime agnostic** - Everything runtime specific sits behind
//!   [`runtime::RuntimeAdapter`]
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use arthook::prelude::*;
//!
//! let rt = Arc::new(SimRuntime::new(RuntimeVariant::Art5_1));
//! let calc = rt.define_class("Lcom/example/Calc;");
//! rt.define_method(&calc, "add", "(II)I", AccessFlags::PUBLIC | AccessFlags::STATIC, |_, _, a| {
//!     Ok(Value::Int(a[0].as_int().unwrap_or(0) + a[1].as_int().unwrap_or(0)))
//! })?;
//!
//! let engine = HookEngine::new(rt.clone(), EngineConfig::default());
//! engine.hook_method(&calc, "add", "(II)I", Hook::new("swap").before(|param| {
//!     param.args_mut().swap(0, 1);
//!     Ok(())
//! }))?;
//!
//! assert_eq!(rt.call(&calc, "add", "(II)I", None, &[Value::Int(1), Value::Int(2)])?, Value::Int(3));
//! # Ok::<(), arthook::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`prelude`] - Convenient re-exports of commonly used types
//! - [`metadata`] - Method identities, access flags and shapes
//! - [`value`] - Values crossing the interception boundary
//! - [`runtime`] - Runtime capability interface and the simulated runtime
//! - [`hook`] - Hook installation, callback chains and the trampoline
//! - [`EngineConfig`] - Engine configuration
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Logging
//!
//! The engine reports installations, safepoint pauses, callback failures and (optionally)
//! invocation phases through [`tracing`](https://docs.rs/tracing). Install a subscriber in
//! the embedding application to see them.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

mod config;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use arthook::prelude::*;
///
/// let id = MethodIdentity::of("Lcom/example/Calc;", "add", "(II)I");
/// assert_eq!(id.name(), "add");
/// ```
pub mod prelude;

pub mod hook;
pub mod metadata;
pub mod runtime;
pub mod value;

/// `arthook` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `arthook` Error type
///
/// The main error type for all operations in this crate. Variants are grouped into
/// installation errors and invocation errors.
pub use error::Error;

pub use config::{EngineConfig, FatalPolicy, SafepointConfig, TracingConfig};
