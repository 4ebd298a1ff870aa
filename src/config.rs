//! Engine configuration types.
//!
//! Configuration is organized into a few small structures:
//!
//! - [`EngineConfig`] - Top-level configuration container
//! - [`SafepointConfig`] - Stop-the-world pause bound used during installation
//! - [`TracingConfig`] - Which engine events are logged through `tracing`
//! - [`FatalPolicy`] - How unrecoverable installation failures are surfaced
//!
//! # Configuration Presets
//!
//! - [`EngineConfig::production()`] - The default; aborts on fatal installation failures
//! - [`EngineConfig::testing()`] - Short safepoint bound, fatal failures are returned
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use arthook::{EngineConfig, FatalPolicy};
//!
//! let config = EngineConfig::production()
//!     .with_safepoint_timeout(Duration::from_millis(500))
//!     .with_max_reentrancy_depth(64);
//! assert_eq!(config.fatal_policy, FatalPolicy::Abort);
//! ```

use std::time::Duration;

use strum::Display;

/// How an installation failure that may leave method metadata inconsistent is handled.
///
/// Such failures are a safepoint pause exceeding its bound, or a metadata mutation that
/// failed after the live record was already touched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display)]
pub enum FatalPolicy {
    /// Log the failure and abort the process.
    ///
    /// A half-redirected method cannot be repaired, so continuing would risk executing
    /// through corrupted metadata.
    #[default]
    #[strum(serialize = "abort")]
    Abort,

    /// Return [`crate::Error::InstallationFatal`] to the installer.
    ///
    /// For embedders that own process lifetime and for tests.
    #[strum(serialize = "propagate")]
    Propagate,
}

/// Safepoint coordination settings.
#[derive(Clone, Debug)]
pub struct SafepointConfig {
    /// Upper bound on the time spent waiting for every mutator to park.
    ///
    /// The pause itself lasts only for clone, redirect and publish.
    pub timeout: Duration,
}

impl Default for SafepointConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
        }
    }
}

/// Logging options.
///
/// Events go through the `tracing` facade; nothing is emitted unless the embedding
/// application installs a subscriber.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Log installations and chain appends (`info`/`debug`).
    pub installs: bool,

    /// Log per-invocation phase transitions (`trace`).
    ///
    /// High overhead on hot methods.
    pub invocations: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            installs: true,
            invocations: false,
        }
    }
}

/// Top-level engine configuration.
///
/// # Default Configuration
///
/// Identical to [`EngineConfig::production()`].
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Safepoint pause settings.
    pub safepoint: SafepointConfig,

    /// Handling of fatal installation failures.
    pub fatal_policy: FatalPolicy,

    /// Maximum nesting of intercepted invocations on a single thread.
    ///
    /// A callback that calls its own hooked method re-enters the trampoline. Past this
    /// depth the invocation fails with [`crate::Error::ReentrancyLimit`] instead of
    /// overflowing the native stack.
    pub max_reentrancy_depth: usize,

    /// Logging options.
    pub tracing: TracingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl EngineConfig {
    /// Configuration for production use.
    ///
    /// # Settings
    ///
    /// - **Safepoint bound**: 2 seconds
    /// - **Fatal policy**: [`FatalPolicy::Abort`]
    /// - **Re-entrancy depth**: 512
    /// - **Invocation tracing**: Disabled
    #[must_use]
    pub fn production() -> Self {
        Self {
            safepoint: SafepointConfig::default(),
            fatal_policy: FatalPolicy::Abort,
            max_reentrancy_depth: 512,
            tracing: TracingConfig::default(),
        }
    }

    /// Configuration for tests and embedders that must observe fatal failures.
    ///
    /// # Settings
    ///
    /// - **Safepoint bound**: 250 milliseconds
    /// - **Fatal policy**: [`FatalPolicy::Propagate`]
    /// - **Re-entrancy depth**: 512
    /// - **Invocation tracing**: Enabled
    #[must_use]
    pub fn testing() -> Self {
        Self {
            safepoint: SafepointConfig {
                timeout: Duration::from_millis(250),
            },
            fatal_policy: FatalPolicy::Propagate,
            tracing: TracingConfig {
                installs: true,
                invocations: true,
            },
            ..Self::production()
        }
    }

    /// Sets the safepoint pause bound.
    #[must_use]
    pub fn with_safepoint_timeout(mut self, timeout: Duration) -> Self {
        self.safepoint.timeout = timeout;
        self
    }

    /// Sets the fatal failure policy.
    #[must_use]
    pub fn with_fatal_policy(mut self, policy: FatalPolicy) -> Self {
        self.fatal_policy = policy;
        self
    }

    /// Sets the maximum re-entrancy depth.
    #[must_use]
    pub fn with_max_reentrancy_depth(mut self, depth: usize) -> Self {
        self.max_reentrancy_depth = depth;
        self
    }

    /// Enables or disables per-invocation tracing.
    #[must_use]
    pub fn with_invocation_tracing(mut self, enabled: bool) -> Self {
        self.tracing.invocations = enabled;
        self
    }
}
