//! Method metadata as seen by the interception engine.
//!
//! This module holds the engine's model of runtime methods. It deliberately knows
//! nothing about the runtime's internal record layout: records are opaque
//! [`MethodRecord`] handles, and everything the engine needs to know about a method is
//! expressed through identities, flags and shapes.
//!
//! # Key Types
//!
//! - [`MethodIdentity`] - Hook registry key (class + member descriptor)
//! - [`MethodRecord`] - Opaque handle to runtime method metadata
//! - [`MethodInfo`] - Resolved, read-only view of a record
//! - [`AccessFlags`] / [`MethodKind`] - Access-flag word and its coarse classification
//! - [`MethodShape`] / [`ValueKind`] - Marshaling contract parsed from the descriptor

mod flags;
mod identity;
mod record;
mod shape;

pub use flags::{AccessFlags, MethodKind, DISPATCHABLE_FLAGS};
pub use identity::{
    ClassRef, MemberDescriptor, MethodIdentity, CLASS_INITIALIZER_NAME, CONSTRUCTOR_NAME,
};
pub use record::{MethodInfo, MethodRecord};
pub use shape::{MethodShape, ValueKind};
