//! # arthook Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the arthook library.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all arthook operations
pub use crate::Error;

/// The result type used throughout arthook
pub use crate::Result;

/// Engine configuration
pub use crate::{EngineConfig, FatalPolicy};

// ================================================================================================
// Hooking
// ================================================================================================

/// Engine, callbacks and call context
pub use crate::hook::{
    CallbackResult, Hook, HookEngine, HookParam, InstallOutcome, MethodHook, Phase,
};

// ================================================================================================
// Metadata and Values
// ================================================================================================

/// Method identities, flags and shapes
pub use crate::metadata::{
    AccessFlags, ClassRef, MemberDescriptor, MethodIdentity, MethodRecord, MethodShape, ValueKind,
};

/// Values crossing the interception boundary
pub use crate::value::{ObjectRef, Throwable, Value};

// ================================================================================================
// Runtime
// ================================================================================================

/// Runtime capability interface
pub use crate::runtime::{EntryPoint, RuntimeAdapter, RuntimeVariant};

/// Simulated runtime
pub use crate::runtime::sim::SimRuntime;
