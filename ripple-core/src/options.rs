//! Options accepted by the reactive primitives.

use std::fmt;
use std::rc::Rc;

use crate::graph::{default_equal, EqualFn};

/// Options for [`Signal`](crate::reactive::Signal).
pub struct SignalOptions<T> {
    /// Writes equal to the current value are ignored.
    pub equal: EqualFn<T>,
}

impl<T: 'static> SignalOptions<T> {
    /// Use a custom equality function.
    pub fn with_equal(equal: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self {
            equal: Rc::new(equal),
        }
    }
}

impl<T: PartialEq + 'static> Default for SignalOptions<T> {
    fn default() -> Self {
        Self {
            equal: default_equal(),
        }
    }
}

/// Options for [`Computed`](crate::reactive::Computed).
pub struct ComputedOptions<T> {
    /// A recomputed value equal to the cached one keeps the cached value and
    /// does not count as a change for dependents.
    pub equal: EqualFn<T>,
}

impl<T: 'static> ComputedOptions<T> {
    /// Use a custom equality function.
    pub fn with_equal(equal: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self {
            equal: Rc::new(equal),
        }
    }
}

impl<T: PartialEq + 'static> Default for ComputedOptions<T> {
    fn default() -> Self {
        Self {
            equal: default_equal(),
        }
    }
}

/// Options for [`Effect`](crate::reactive::Effect).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectOptions {
    /// Permit `set`/`update` on signals while the effect body runs.
    pub allow_signal_writes: bool,
}

impl EffectOptions {
    /// Options that permit signal writes inside the effect body.
    pub fn allow_signal_writes() -> Self {
        Self {
            allow_signal_writes: true,
        }
    }
}

/// What a bridged signal returns before its source has emitted.
#[derive(Clone)]
pub enum Fallback<T> {
    /// Return this value.
    Initial(T),

    /// Fail with [`ReactiveError::RequireSyncViolation`](crate::ReactiveError::RequireSyncViolation).
    RequireSync,
}

/// Options for [`from_push`](crate::bridge::from_push) and friends.
pub struct FromPushOptions<T> {
    /// Value (or failure) returned before the first emission.
    pub fallback: Fallback<T>,

    /// Subscribe on first read instead of immediately.
    pub lazy: bool,

    /// Successive emissions equal to the current value are ignored.
    pub equal: Option<EqualFn<T>>,
}

impl<T> FromPushOptions<T> {
    /// Return `value` until the source emits.
    pub fn initial(value: T) -> Self {
        Self {
            fallback: Fallback::Initial(value),
            lazy: false,
            equal: None,
        }
    }

    /// Fail reads until the source emits.
    pub fn require_sync() -> Self {
        Self {
            fallback: Fallback::RequireSync,
            lazy: false,
            equal: None,
        }
    }

    /// Subscribe on first read.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Compare successive emissions with `equal`.
    pub fn with_equal(mut self, equal: impl Fn(&T, &T) -> bool + 'static) -> Self {
        self.equal = Some(Rc::new(equal));
        self
    }

    pub(crate) fn requires_sync(&self) -> bool {
        matches!(self.fallback, Fallback::RequireSync)
    }
}

impl<T: Default> Default for FromPushOptions<T> {
    fn default() -> Self {
        Self::initial(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for FromPushOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fallback = match &self.fallback {
            Fallback::Initial(value) => format!("Initial({value:?})"),
            Fallback::RequireSync => "RequireSync".to_string(),
        };
        f.debug_struct("FromPushOptions")
            .field("fallback", &fallback)
            .field("lazy", &self.lazy)
            .field("custom_equal", &self.equal.is_some())
            .finish()
    }
}
