//! Stable method identities used as hook registry keys.
//!
//! A [`MethodIdentity`] names a method by its declaring class and member descriptor. It
//! is what callers hand to the engine when registering a hook, and what the registry is
//! keyed by. Identities are plain values: they carry no pointers into runtime metadata
//! and stay valid for as long as the declaring class is loaded.
//!
//! # Key Types
//! - [`ClassRef`] - Opaque class identity (a type descriptor such as `Lcom/example/Calc;`)
//! - [`MemberDescriptor`] - Member name plus method descriptor
//! - [`MethodIdentity`] - `(ClassRef, MemberDescriptor)` pair

use std::{fmt, sync::Arc};

/// Name used by the runtime for instance constructors.
pub const CONSTRUCTOR_NAME: &str = "<init>";

/// Name used by the runtime for static class initializers.
pub const CLASS_INITIALIZER_NAME: &str = "<clinit>";

/// Opaque identity of a runtime class.
///
/// Wraps the class type descriptor (`Lcom/example/Calc;`). Cloning is cheap, the
/// descriptor is shared.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassRef(Arc<str>);

impl ClassRef {
    /// Creates a class reference from its type descriptor.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use arthook::metadata::ClassRef;
    ///
    /// let class = ClassRef::new("Lcom/example/Calc;");
    /// assert_eq!(class.descriptor(), "Lcom/example/Calc;");
    /// ```
    #[must_use]
    pub fn new(descriptor: impl AsRef<str>) -> Self {
        ClassRef(Arc::from(descriptor.as_ref()))
    }

    /// Returns the type descriptor of this class.
    #[must_use]
    pub fn descriptor(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassRef({})", self.0)
    }
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A member of a class, identified by name and method descriptor.
///
/// The signature uses the runtime's method descriptor syntax, e.g. `(II)I` for
/// `int add(int, int)`. Overloads differ only in their signature.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberDescriptor {
    /// Member name (`<init>` for constructors)
    pub name: String,
    /// Method descriptor, `(<params>)<return>`
    pub signature: String,
}

impl MemberDescriptor {
    /// Creates a new member descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, signature: impl Into<String>) -> Self {
        MemberDescriptor {
            name: name.into(),
            signature: signature.into(),
        }
    }

    /// Creates a descriptor for an instance constructor with the given signature.
    #[must_use]
    pub fn constructor(signature: impl Into<String>) -> Self {
        Self::new(CONSTRUCTOR_NAME, signature)
    }

    /// Returns `true` if this member is an instance constructor.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }
}

impl fmt::Display for MemberDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.signature)
    }
}

/// Stable key for a method: declaring class plus member descriptor.
///
/// Two identities are equal iff they name the same class and member, which for a
/// loaded class means they resolve to the same runtime method record.
///
/// # Examples
///
/// ```rust
/// use arthook::metadata::MethodIdentity;
///
/// let id = MethodIdentity::of("Lcom/example/Calc;", "add", "(II)I");
/// assert_eq!(id.to_string(), "Lcom/example/Calc;->add(II)I");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodIdentity {
    /// The declaring class
    pub class: ClassRef,
    /// The member within that class
    pub member: MemberDescriptor,
}

impl MethodIdentity {
    /// Creates an identity from its parts.
    #[must_use]
    pub fn new(class: ClassRef, member: MemberDescriptor) -> Self {
        MethodIdentity { class, member }
    }

    /// Convenience constructor taking raw strings.
    #[must_use]
    pub fn of(class: &str, name: &str, signature: &str) -> Self {
        MethodIdentity {
            class: ClassRef::new(class),
            member: MemberDescriptor::new(name, signature),
        }
    }

    /// Returns the member name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.member.name
    }

    /// Returns the method descriptor.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.member.signature
    }
}

impl fmt::Display for MethodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.class, self.member)
    }
}
