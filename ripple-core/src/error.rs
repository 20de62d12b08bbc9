//! Error types for the reactive engine.
//!
//! Every fallible operation in the crate returns [`ReactiveError`]. The enum
//! is `Clone` because a computed caches the error its body produced and hands
//! the same error back on every read until one of its dependencies changes.

use std::error::Error as StdError;
use std::sync::Arc;

/// Shared, type-erased error payload produced by user code or a push source.
pub type BoxedError = Arc<dyn StdError + Send + Sync + 'static>;

/// Errors surfaced by signals, computeds, effects and the async bridge.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReactiveError {
    /// A computed read itself, directly or transitively, while computing.
    #[error("detected cycle in computations")]
    CyclicComputation,

    /// A signal was written from inside an effect that does not allow writes.
    #[error("writing to signals is not allowed inside an effect without `allow_signal_writes`")]
    SignalWriteDuringEffect,

    /// A signal was written from inside a computed body.
    #[error("writing to signals is not allowed inside a computed")]
    SignalWriteDuringComputation,

    /// A bridged signal created with `require_sync` was read before its
    /// source emitted.
    #[error("push source did not emit a value before the first read of a `require_sync` signal")]
    RequireSyncViolation,

    /// The body of a computed or effect failed.
    #[error("{0}")]
    Computation(BoxedError),

    /// A push source reported an error.
    #[error("push source failed: {0}")]
    Source(BoxedError),
}

impl ReactiveError {
    /// Wrap an arbitrary error (or message) raised by a computed or effect body.
    pub fn computation<E>(error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self::Computation(Arc::from(error.into()))
    }

    /// Wrap an error reported by a push source.
    pub fn source<E>(error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self::Source(Arc::from(error.into()))
    }

    /// The payload of a `Computation` or `Source` error, if any.
    pub fn payload(&self) -> Option<&BoxedError> {
        match self {
            Self::Computation(inner) | Self::Source(inner) => Some(inner),
            _ => None,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
