//! Argument and return shapes of methods.
//!
//! A [`MethodShape`] is the marshaling contract of a method: the kind of every argument
//! slot, the return kind and whether a receiver is passed. It is parsed from the method
//! descriptor once, at resolution time, and carried alongside the identity so that
//! every value crossing the trampoline boundary can be type-checked.
//!
//! # Descriptor Grammar
//!
//! ```text
//! descriptor := '(' param* ')' return
//! param      := 'Z' | 'B' | 'C' | 'S' | 'I' | 'J' | 'F' | 'D' | reference
//! return     := param | 'V'
//! reference  := 'L' <class-name> ';' | '[' param
//! ```

use std::fmt;

use strum::{Display, EnumIter};

use crate::Result;

/// Kind of a single argument slot or return value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ValueKind {
    /// No value (return kind only)
    #[strum(serialize = "void")]
    Void,
    /// `boolean`
    #[strum(serialize = "boolean")]
    Boolean,
    /// `byte`
    #[strum(serialize = "byte")]
    Byte,
    /// `char` (UTF-16 code unit)
    #[strum(serialize = "char")]
    Char,
    /// `short`
    #[strum(serialize = "short")]
    Short,
    /// `int`
    #[strum(serialize = "int")]
    Int,
    /// `long`
    #[strum(serialize = "long")]
    Long,
    /// `float`
    #[strum(serialize = "float")]
    Float,
    /// `double`
    #[strum(serialize = "double")]
    Double,
    /// Object or array reference
    #[strum(serialize = "reference")]
    Reference,
}

impl ValueKind {
    /// Maps a descriptor type character to its kind.
    ///
    /// Returns `None` for characters that do not start a type. `L` and `[` map to
    /// [`ValueKind::Reference`].
    #[must_use]
    pub fn from_descriptor_char(c: char) -> Option<Self> {
        match c {
            'V' => Some(ValueKind::Void),
            'Z' => Some(ValueKind::Boolean),
            'B' => Some(ValueKind::Byte),
            'C' => Some(ValueKind::Char),
            'S' => Some(ValueKind::Short),
            'I' => Some(ValueKind::Int),
            'J' => Some(ValueKind::Long),
            'F' => Some(ValueKind::Float),
            'D' => Some(ValueKind::Double),
            'L' | '[' => Some(ValueKind::Reference),
            _ => None,
        }
    }

    /// Returns the compact shape character for this kind (`L` for references).
    #[must_use]
    pub fn shorty_char(self) -> char {
        match self {
            ValueKind::Void => 'V',
            ValueKind::Boolean => 'Z',
            ValueKind::Byte => 'B',
            ValueKind::Char => 'C',
            ValueKind::Short => 'S',
            ValueKind::Int => 'I',
            ValueKind::Long => 'J',
            ValueKind::Float => 'F',
            ValueKind::Double => 'D',
            ValueKind::Reference => 'L',
        }
    }

    /// Returns `true` for primitive kinds (everything except references and void).
    #[must_use]
    pub fn is_primitive(self) -> bool {
        !matches!(self, ValueKind::Reference | ValueKind::Void)
    }
}

/// Argument/return shape of a method.
///
/// # Examples
///
/// ```rust
/// use arthook::metadata::{MethodShape, ValueKind};
///
/// let shape = MethodShape::parse("(ILjava/lang/String;[J)Z", false)?;
/// assert_eq!(shape.params(), &[ValueKind::Int, ValueKind::Reference, ValueKind::Reference]);
/// assert_eq!(shape.return_kind(), ValueKind::Boolean);
/// assert!(shape.has_receiver());
/// assert_eq!(shape.shorty(), "ZILL");
/// # Ok::<(), arthook::Error>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodShape {
    params: Vec<ValueKind>,
    ret: ValueKind,
    is_static: bool,
}

impl MethodShape {
    /// Creates a shape from already classified parts.
    #[must_use]
    pub fn new(params: Vec<ValueKind>, ret: ValueKind, is_static: bool) -> Self {
        MethodShape {
            params,
            ret,
            is_static,
        }
    }

    /// Parses a method descriptor.
    ///
    /// # Arguments
    ///
    /// * `descriptor` - The method descriptor, e.g. `(II)I`
    /// * `is_static` - Whether the method has no receiver
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidDescriptor`] if the descriptor does not follow the
    /// grammar, uses `V` as a parameter, or has trailing characters.
    pub fn parse(descriptor: &str, is_static: bool) -> Result<Self> {
        let mut chars = descriptor.chars().peekable();

        if chars.next() != Some('(') {
            return Err(invalid_descriptor!(descriptor, "missing '('"));
        }

        let mut params = Vec::new();
        loop {
            match chars.peek() {
                Some(')') => {
                    chars.next();
                    break;
                }
                Some(_) => {
                    let kind = parse_type(descriptor, &mut chars)?;
                    if kind == ValueKind::Void {
                        return Err(invalid_descriptor!(
                            descriptor,
                            "void parameter at slot {}",
                            params.len()
                        ));
                    }
                    params.push(kind);
                }
                None => return Err(invalid_descriptor!(descriptor, "missing ')'")),
            }
        }

        let ret = parse_type(descriptor, &mut chars)?;
        if chars.next().is_some() {
            return Err(invalid_descriptor!(descriptor, "trailing characters"));
        }

        Ok(MethodShape {
            params,
            ret,
            is_static,
        })
    }

    /// Parameter kinds, excluding the receiver.
    #[must_use]
    pub fn params(&self) -> &[ValueKind] {
        &self.params
    }

    /// Number of parameters, excluding the receiver.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Declared return kind.
    #[must_use]
    pub fn return_kind(&self) -> ValueKind {
        self.ret
    }

    /// Whether calls pass a `this` reference.
    #[must_use]
    pub fn has_receiver(&self) -> bool {
        !self.is_static
    }

    /// Compact shape string: return kind followed by every parameter kind.
    #[must_use]
    pub fn shorty(&self) -> String {
        std::iter::once(self.ret)
            .chain(self.params.iter().copied())
            .map(ValueKind::shorty_char)
            .collect()
    }
}

impl fmt::Display for MethodShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        write!(f, "({}){}", params.join(", "), self.ret)?;
        if self.is_static {
            f.write_str(" static")?;
        }
        Ok(())
    }
}

fn parse_type(
    descriptor: &str,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Result<ValueKind> {
    let Some(c) = chars.next() else {
        return Err(invalid_descriptor!(descriptor, "unexpected end"));
    };

    match c {
        'L' => {
            let mut name_len = 0usize;
            loop {
                match chars.next() {
                    Some(';') if name_len > 0 => return Ok(ValueKind::Reference),
                    Some(';') => return Err(invalid_descriptor!(descriptor, "empty class name")),
                    Some(_) => name_len += 1,
                    None => return Err(invalid_descriptor!(descriptor, "unterminated class name")),
                }
            }
        }
        '[' => {
            let element = parse_type(descriptor, chars)?;
            if element == ValueKind::Void {
                return Err(invalid_descriptor!(descriptor, "array of void"));
            }
            Ok(ValueKind::Reference)
        }
        other => ValueKind::from_descriptor_char(other)
            .ok_or_else(|| invalid_descriptor!(descriptor, "unknown type character '{}'", other)),
    }
}
