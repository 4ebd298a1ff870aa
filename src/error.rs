use thiserror::Error;

use crate::{
    hook::Phase,
    metadata::{MethodIdentity, MethodRecord},
    value::Throwable,
};

macro_rules! invalid_descriptor {
    // Single string version
    ($descriptor:expr, $msg:expr) => {
        crate::Error::InvalidDescriptor {
            descriptor: $descriptor.to_string(),
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($descriptor:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidDescriptor {
            descriptor: $descriptor.to_string(),
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into two groups with very different propagation rules.
///
/// # Installation Errors
///
/// Raised by [`crate::hook::HookEngine::install`] and friends. Apart from
/// [`Error::InstallationFatal`] they are local to a single install call and leave all
/// global state untouched:
///
/// - [`Error::NotFound`] - Identity resolution failed (missing or abstract member)
/// - [`Error::Clone`] - The runtime variant cannot clone this kind of method
/// - [`Error::BackupNotHookable`] - Attempted to redirect a backup record
/// - [`Error::InvalidDescriptor`] - Malformed method descriptor
/// - [`Error::NotSupported`] - Unsupported runtime API level
/// - [`Error::InstallationFatal`] - Safepoint bound exceeded or partial metadata mutation;
///   only ever returned when [`crate::FatalPolicy::Propagate`] is configured
///
/// # Invocation Errors
///
/// Raised to the caller of a hooked method as if the method itself had failed. They are
/// local to a single invocation and never affect concurrent or future calls:
///
/// - [`Error::Thrown`] - A managed exception thrown by the method body or set by a callback
/// - [`Error::Callback`] - A before/after callback failed
/// - [`Error::TypeMismatch`] - An override value does not fit the declared return shape
/// - [`Error::ArgumentMismatch`] - Arguments did not match the method shape
/// - [`Error::ReentrancyLimit`] - Re-entrant interception exceeded the configured depth
///
/// # Examples
///
/// ```rust,no_run
/// use arthook::{Error, hook::Hook, metadata::MethodIdentity};
/// # fn demo(engine: &arthook::hook::HookEngine, id: MethodIdentity) {
/// match engine.install(id, Hook::new("noop")) {
///     Ok(outcome) => println!("hooked: {:?}", outcome),
///     Err(Error::NotFound(id)) => eprintln!("no such method {id}"),
///     Err(Error::Clone { reason, .. }) => eprintln!("cannot back up: {reason}"),
///     Err(e) => eprintln!("install failed: {e}"),
/// }
/// # }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // Installation errors
    /// The requested member could not be resolved to a concrete method.
    ///
    /// Either the member does not exist on the class, or it is an abstract/interface
    /// stub without a body. Abstract methods have no original behavior to preserve and
    /// can therefore never be hooked.
    #[error("Method not found or has no concrete body - {0}")]
    NotFound(MethodIdentity),

    /// The method could not be cloned into a backup.
    ///
    /// The metadata shape of this method kind (native, synchronized, ...) is not
    /// supported by the runtime variant in use. No mutation has occurred.
    #[error("Cannot create backup for {identity} - {reason}")]
    Clone {
        /// The method that failed to clone
        identity: MethodIdentity,
        /// Why the clone was rejected
        reason: String,
    },

    /// The record is a backup and can never be redirected.
    ///
    /// Redirecting a backup would make the original and its backup call each other
    /// endlessly.
    #[error("Backup records can not be hooked - {0}")]
    BackupNotHookable(MethodIdentity),

    /// Installation failed in a way that leaves method metadata inconsistent.
    ///
    /// Either the safepoint pause exceeded its bound or a partial mutation of the
    /// method record was detected. Under [`crate::FatalPolicy::Abort`] the process is
    /// aborted before this value could ever be observed.
    #[error("Fatal installation failure for {identity} - {reason}")]
    InstallationFatal {
        /// The method whose installation failed
        identity: MethodIdentity,
        /// What went wrong
        reason: String,
    },

    /// A method descriptor could not be parsed.
    ///
    /// # Fields
    ///
    /// * `descriptor` - The offending descriptor
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Invalid descriptor '{descriptor}' - {file}:{line}: {message}")]
    InvalidDescriptor {
        /// The offending descriptor
        descriptor: String,
        /// The message to be printed for the error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The runtime API level has no matching runtime variant.
    #[error("Runtime API level {0} is not supported")]
    NotSupported(u32),

    /// A method record handle does not refer to live runtime metadata.
    #[error("Invalid method record - {0}")]
    InvalidRecord(MethodRecord),

    // Invocation errors
    /// A managed exception was thrown.
    ///
    /// Either the original method body threw, or a callback set a pending throwable
    /// that no after-callback recovered from.
    #[error("{0}")]
    Thrown(Throwable),

    /// A before/after callback failed without setting a result.
    ///
    /// Remaining callbacks of the same phase are skipped. A before-phase failure
    /// replaces the original call entirely; an after-phase failure replaces whatever
    /// the original call produced.
    #[error("Callback '{hook}' failed in {phase} phase - {source}")]
    Callback {
        /// Name of the failing callback
        hook: String,
        /// The phase during which it failed
        phase: Phase,
        /// The error it raised
        source: Throwable,
    },

    /// The final result does not match the method's declared return shape.
    #[error("Return value mismatch for {identity} - expected {expected}, found {found}")]
    TypeMismatch {
        /// The intercepted method
        identity: MethodIdentity,
        /// The declared return kind
        expected: String,
        /// The kind of the value that was produced
        found: String,
    },

    /// The supplied arguments do not match the method shape.
    #[error("Argument mismatch for {identity} - {message}")]
    ArgumentMismatch {
        /// The method being called
        identity: MethodIdentity,
        /// What did not match
        message: String,
    },

    /// A call landed on a redirected entry point without a published hook entry.
    #[error("Method is not hooked - {0}")]
    NotHooked(MethodIdentity),

    /// Re-entrant interception exceeded the configured depth.
    ///
    /// The associated value shows the depth limit that was reached.
    #[error("Reached the maximum re-entrancy depth allowed - {0}")]
    ReentrancyLimit(usize),

    /// Failed to lock target.
    ///
    /// This error occurs when thread synchronization fails, typically
    /// when trying to acquire a mutex or rwlock that is in an invalid state.
    #[error("Failed to lock target")]
    LockError,
}

impl Error {
    /// Returns `true` for errors raised by an intercepted invocation rather than by
    /// installation.
    #[must_use]
    pub fn is_invocation_error(&self) -> bool {
        matches!(
            self,
            Error::Thrown(_)
                | Error::Callback { .. }
                | Error::TypeMismatch { .. }
                | Error::ArgumentMismatch { .. }
                | Error::ReentrancyLimit(_)
        )
    }

    /// Returns the managed exception carried by this error, if any.
    #[must_use]
    pub fn throwable(&self) -> Option<&Throwable> {
        match self {
            Error::Thrown(t) => Some(t),
            Error::Callback { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Converts an invocation error into the managed exception a caller would observe.
    ///
    /// Callback failures surface as the callback's own exception; shape violations and
    /// runaway re-entrancy are mapped to the exceptions the runtime would raise for
    /// them. Any other error is handed back unchanged.
    ///
    /// # Errors
    ///
    /// Returns `self` if it is not an invocation error.
    pub fn into_throwable(self) -> std::result::Result<Throwable, Error> {
        let converted = match &self {
            Error::Thrown(throwable) | Error::Callback { source: throwable, .. } => {
                Some(throwable.clone())
            }
            Error::TypeMismatch { .. } => Some(Throwable::new(
                "java.lang.ClassCastException",
                self.to_string(),
            )),
            Error::ArgumentMismatch { .. } => Some(Throwable::illegal_argument(self.to_string())),
            Error::ReentrancyLimit(_) => Some(Throwable::new(
                "java.lang.StackOverflowError",
                self.to_string(),
            )),
            _ => None,
        };
        converted.ok_or(self)
    }
}

impl From<Throwable> for Error {
    fn from(throwable: Throwable) -> Self {
        Error::Thrown(throwable)
    }
}
