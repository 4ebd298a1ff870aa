use std::fmt;

use crate::metadata::{AccessFlags, ClassRef, MemberDescriptor, MethodIdentity, MethodShape};

/// Opaque handle to a runtime method record.
///
/// The handle is an index into runtime-owned metadata. Only the runtime adapter and the
/// resolver/cloner/rewriter trio interpret it; every other component treats it as an
/// opaque key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodRecord(pub u32);

impl MethodRecord {
    /// Creates a handle from a raw index
    #[must_use]
    pub fn new(index: u32) -> Self {
        MethodRecord(index)
    }

    /// Returns the raw index
    #[must_use]
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for MethodRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodRecord(#{})", self.0)
    }
}

impl fmt::Display for MethodRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Read-only view of a resolved method record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodInfo {
    /// Declaring class, preserved on backups for `this` dispatch and static field access
    pub declaring_class: ClassRef,
    /// Member name and descriptor
    pub member: MemberDescriptor,
    /// Access flags at the time of the query
    pub flags: AccessFlags,
    /// Argument/return shape
    pub shape: MethodShape,
}

impl MethodInfo {
    /// Identity of the method described by this record.
    #[must_use]
    pub fn identity(&self) -> MethodIdentity {
        MethodIdentity::new(self.declaring_class.clone(), self.member.clone())
    }
}
