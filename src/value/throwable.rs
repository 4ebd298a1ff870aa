use std::fmt;

/// Managed exception value.
///
/// Raised by method bodies and callbacks, and propagated to the original caller of an
/// intercepted method exactly like an exception thrown by the method itself.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Throwable {
    /// Binary class name of the exception, e.g. `java.lang.IllegalStateException`
    pub class: String,
    /// Detail message (may be empty)
    pub message: String,
}

impl Throwable {
    /// Creates a new throwable.
    #[must_use]
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Throwable {
            class: class.into(),
            message: message.into(),
        }
    }

    /// `java.lang.IllegalArgumentException` with the given message.
    #[must_use]
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::new("java.lang.IllegalArgumentException", message)
    }

    /// `java.lang.IllegalStateException` with the given message.
    #[must_use]
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::new("java.lang.IllegalStateException", message)
    }

    /// Returns `true` if this throwable has the given class name.
    #[must_use]
    pub fn is(&self, class: &str) -> bool {
        self.class == class
    }
}

impl fmt::Display for Throwable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.class)
        } else {
            write!(f, "{}: {}", self.class, self.message)
        }
    }
}

impl std::error::Error for Throwable {}
