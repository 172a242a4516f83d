#![forbid(unsafe_code)]

//! Logging support.
//!
//! With the `tracing` feature (on by default) the `tracing` macros are
//! re-exported here and at the crate root. Without it, no-op macros keep
//! every call site compiling so embedders can strip logging entirely.
//!
//! Targets used across the crate:
//!
//! | Target | Component |
//! |--------|-----------|
//! | `longchat::cache` | message cache rebuild/append, identity gaps |
//! | `longchat::window` | window moves |
//! | `longchat::sync` | DOM reconciliation and anchor restore |
//! | `longchat::scroll` | trigger classification, suppression |
//! | `longchat::ingest` | mutation batches |
//! | `longchat::stats` | statistics changes |
//! | `longchat::discovery` | container search |
//! | `longchat::virtualiser` | lifecycle, navigation, forced scroll |

#[cfg(feature = "tracing")]
pub use tracing::{debug, error, info, trace, warn};

// When tracing is not enabled, provide no-op macros
#[cfg(not(feature = "tracing"))]
mod noop_macros {
    /// No-op debug macro when tracing is disabled.
    #[macro_export]
    macro_rules! debug {
        ($($arg:tt)*) => {};
    }

    /// No-op error macro when tracing is disabled.
    #[macro_export]
    macro_rules! error {
        ($($arg:tt)*) => {};
    }

    /// No-op info macro when tracing is disabled.
    #[macro_export]
    macro_rules! info {
        ($($arg:tt)*) => {};
    }

    /// No-op trace macro when tracing is disabled.
    #[macro_export]
    macro_rules! trace {
        ($($arg:tt)*) => {};
    }

    /// No-op warn macro when tracing is disabled.
    #[macro_export]
    macro_rules! warn {
        ($($arg:tt)*) => {};
    }
}

// Note: Macros are exported at crate root via #[macro_export],
// so we don't need to re-export noop_macros::* here.

/// Verbosity tier for a repeated condition, so retry loops do not flood logs.
///
/// The first `loud` occurrences are warnings, the next `loud * 4` are debug
/// lines, and everything after that only shows at trace level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Warn,
    Debug,
    Trace,
}

impl Verbosity {
    /// Tier for the `attempt`-th occurrence (1-based).
    #[must_use]
    pub const fn for_attempt(attempt: u32, loud: u32) -> Self {
        if attempt <= loud {
            Self::Warn
        } else if attempt <= loud.saturating_mul(5) {
            Self::Debug
        } else {
            Self::Trace
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_decays_with_attempts() {
        assert_eq!(Verbosity::for_attempt(1, 3), Verbosity::Warn);
        assert_eq!(Verbosity::for_attempt(3, 3), Verbosity::Warn);
        assert_eq!(Verbosity::for_attempt(4, 3), Verbosity::Debug);
        assert_eq!(Verbosity::for_attempt(15, 3), Verbosity::Debug);
        assert_eq!(Verbosity::for_attempt(16, 3), Verbosity::Trace);
    }
}
