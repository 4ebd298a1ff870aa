//! Values crossing the interception boundary.
//!
//! Every argument, receiver and return value that flows through the trampoline is a
//! [`Value`]. The union is explicitly tagged so that marshaling between the runtime and
//! callbacks is checked against the method's [`MethodShape`](crate::metadata::MethodShape)
//! rather than relying on implicit coercions.

mod throwable;

use std::fmt;

use crate::metadata::{ClassRef, ValueKind};

pub use throwable::Throwable;

/// Reference to a managed object.
///
/// The engine never dereferences objects; a reference is the object's class plus an
/// opaque handle owned by the runtime.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    /// Runtime class of the referenced object
    pub class: ClassRef,
    /// Runtime-owned handle
    pub handle: u64,
}

impl ObjectRef {
    /// Creates a new object reference.
    #[must_use]
    pub fn new(class: ClassRef, handle: u64) -> Self {
        ObjectRef { class, handle }
    }
}

/// Runtime value passed to or returned from an intercepted method.
///
/// # Kind Mapping
///
/// | Descriptor | Value Variant | [`ValueKind`] |
/// |------------|---------------|---------------|
/// | `V` | [`Value::Void`] | `Void` |
/// | `Z` | [`Value::Boolean`] | `Boolean` |
/// | `B` | [`Value::Byte`] | `Byte` |
/// | `C` | [`Value::Char`] | `Char` |
/// | `S` | [`Value::Short`] | `Short` |
/// | `I` | [`Value::Int`] | `Int` |
/// | `J` | [`Value::Long`] | `Long` |
/// | `F` | [`Value::Float`] | `Float` |
/// | `D` | [`Value::Double`] | `Double` |
/// | `L…;`, `[…` | [`Value::Object`], [`Value::Null`] | `Reference` |
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// No value (void return).
    Void,
    /// `boolean`
    Boolean(bool),
    /// `byte`
    Byte(i8),
    /// `char`, a UTF-16 code unit
    Char(u16),
    /// `short`
    Short(i16),
    /// `int`
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// Non-null object or array reference
    Object(ObjectRef),
    /// The null reference.
    ///
    /// Distinguished from [`Value::Void`] which represents the absence of any value.
    Null,
}

impl Value {
    /// Returns the kind of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Void => ValueKind::Void,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Byte(_) => ValueKind::Byte,
            Value::Char(_) => ValueKind::Char,
            Value::Short(_) => ValueKind::Short,
            Value::Int(_) => ValueKind::Int,
            Value::Long(_) => ValueKind::Long,
            Value::Float(_) => ValueKind::Float,
            Value::Double(_) => ValueKind::Double,
            Value::Object(_) | Value::Null => ValueKind::Reference,
        }
    }

    /// Returns `true` if this value may occupy a slot of the given kind.
    ///
    /// Kinds must match exactly; there are no widening conversions. `Null` fits any
    /// reference slot.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use arthook::{metadata::ValueKind, value::Value};
    ///
    /// assert!(Value::Int(3).conforms_to(ValueKind::Int));
    /// assert!(!Value::Int(3).conforms_to(ValueKind::Long));
    /// assert!(Value::Null.conforms_to(ValueKind::Reference));
    /// assert!(Value::Void.conforms_to(ValueKind::Void));
    /// ```
    #[must_use]
    pub fn conforms_to(&self, kind: ValueKind) -> bool {
        self.kind() == kind
    }

    /// Returns the `int` payload, if this is an [`Value::Int`].
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the `long` payload, if this is an [`Value::Long`].
    #[must_use]
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the `boolean` payload, if this is an [`Value::Boolean`].
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the object reference, if this is a non-null [`Value::Object`].
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Returns `true` for [`Value::Void`].
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    /// Zero value for a kind: `0`/`false` for primitives, `null` for references.
    #[must_use]
    pub fn default_for(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Void => Value::Void,
            ValueKind::Boolean => Value::Boolean(false),
            ValueKind::Byte => Value::Byte(0),
            ValueKind::Char => Value::Char(0),
            ValueKind::Short => Value::Short(0),
            ValueKind::Int => Value::Int(0),
            ValueKind::Long => Value::Long(0),
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Double => Value::Double(0.0),
            ValueKind::Reference => Value::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("void"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}b"),
            Value::Char(v) => match char::from_u32(u32::from(*v)) {
                Some(c) => write!(f, "'{c}'"),
                None => write!(f, "'\\u{v:04x}'"),
            },
            Value::Short(v) => write!(f, "{v}s"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}L"),
            Value::Float(v) => write!(f, "{v}f"),
            Value::Double(v) => write!(f, "{v}d"),
            Value::Object(o) => write!(f, "{}@{:x}", o.class, o.handle),
            Value::Null => f.write_str("null"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Value::Object(v)
    }
}
