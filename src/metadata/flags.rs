//! Method access flags and method kinds.
//!
//! [`AccessFlags`] mirrors the access-flag word stored in a runtime method record.
//! [`MethodKind`] is the coarser classification the runtime variants use to decide
//! which methods can be cloned into a backup.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    /// Access flags of a runtime method record
    pub struct AccessFlags: u32 {
        /// Accessible from anywhere
        const PUBLIC = 0x0001;
        /// Accessible only from the declaring class
        const PRIVATE = 0x0002;
        /// Accessible from subclasses and the package
        const PROTECTED = 0x0004;
        /// Method has no receiver
        const STATIC = 0x0008;
        /// Method can not be overridden
        const FINAL = 0x0010;
        /// Invocation is wrapped in the receiver's monitor
        const SYNCHRONIZED = 0x0020;
        /// Compiler-generated bridge method
        const BRIDGE = 0x0040;
        /// Takes a variable number of arguments
        const VARARGS = 0x0080;
        /// Body is implemented in native code
        const NATIVE = 0x0100;
        /// Method has no body
        const ABSTRACT = 0x0400;
        /// Not present in source code
        const SYNTHETIC = 0x1000;
        /// Instance constructor or class initializer
        const CONSTRUCTOR = 0x0001_0000;
        /// Engine-private marker for backup records
        const HOOK_BACKUP = 0x0100_0000;
    }
}

/// Flags that make a record reachable through virtual or interface dispatch.
pub const DISPATCHABLE_FLAGS: AccessFlags = AccessFlags::PUBLIC.union(AccessFlags::PROTECTED);

impl AccessFlags {
    /// Returns `true` if the method has no body.
    #[must_use]
    pub fn is_abstract(self) -> bool {
        self.contains(AccessFlags::ABSTRACT)
    }

    /// Returns `true` if the method has no receiver.
    #[must_use]
    pub fn is_static(self) -> bool {
        self.contains(AccessFlags::STATIC)
    }

    /// Returns `true` if this record is an engine-created backup.
    #[must_use]
    pub fn is_backup(self) -> bool {
        self.contains(AccessFlags::HOOK_BACKUP)
    }

    /// Flags for the backup clone of a method carrying `self`.
    ///
    /// Visibility is reduced to `PRIVATE` so the clone never takes part in virtual or
    /// interface dispatch, and the backup marker is set. All other bits are copied
    /// verbatim.
    #[must_use]
    pub fn for_backup(self) -> Self {
        (self - DISPATCHABLE_FLAGS) | AccessFlags::PRIVATE | AccessFlags::HOOK_BACKUP
    }

    /// Flags for the original record once it is redirected to the trampoline.
    ///
    /// The native bit is cleared so the runtime enters through the quick entry point
    /// instead of its JNI bridge.
    #[must_use]
    pub fn for_redirect(self) -> Self {
        self - AccessFlags::NATIVE
    }

    /// Classifies the method for clone support checks.
    #[must_use]
    pub fn kind(self) -> MethodKind {
        let mut kind = MethodKind::empty();
        kind.set(MethodKind::NATIVE, self.contains(AccessFlags::NATIVE));
        kind.set(
            MethodKind::SYNCHRONIZED,
            self.contains(AccessFlags::SYNCHRONIZED),
        );
        kind.set(MethodKind::ABSTRACT, self.contains(AccessFlags::ABSTRACT));
        kind.set(
            MethodKind::CONSTRUCTOR,
            self.contains(AccessFlags::CONSTRUCTOR),
        );
        kind.set(MethodKind::STATIC, self.contains(AccessFlags::STATIC));
        kind
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    /// Coarse method classification used by runtime variant capability checks
    pub struct MethodKind: u8 {
        /// Native (JNI) method
        const NATIVE = 0x01;
        /// Synchronized method
        const SYNCHRONIZED = 0x02;
        /// Abstract method
        const ABSTRACT = 0x04;
        /// Constructor
        const CONSTRUCTOR = 0x08;
        /// Static method
        const STATIC = 0x10;
    }
}
