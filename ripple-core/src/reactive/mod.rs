//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds, and
//! effects. These primitives form the foundation of Ripple's fine-grained
//! reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a computed or effect), the running
//! consumer records it as a dependency. When the signal's value changes, live
//! dependents are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies changes, and only when it is read.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are batched: they run at the next microtask
//! boundary, once per batch of writes.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a signal is read, we check if there is an active
//! consumer and, if so, record the dependency together with the version that
//! was seen.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, Angular and Leptos.

mod computed;
pub(crate) mod context;
mod effect;
pub(crate) mod runtime;
mod signal;

pub use computed::Computed;
pub use context::{is_tracking, untracked};
pub use effect::{Effect, OnCleanup};
pub use runtime::{ManualMicrotasks, MicrotaskScheduler, Runtime, TokioMicrotasks};
pub use signal::{ReadonlySignal, Signal};

use crate::error::ReactiveError;
use crate::options::{ComputedOptions, EffectOptions, SignalOptions};

/// Create a signal compared with `PartialEq`.
pub fn signal<T: Clone + PartialEq + 'static>(value: T) -> Signal<T> {
    Signal::new(value)
}

/// Create a signal with explicit options.
pub fn signal_with<T: Clone + 'static>(value: T, options: SignalOptions<T>) -> Signal<T> {
    Signal::with_options(value, options)
}

/// Create a computed compared with `PartialEq`.
pub fn computed<T, F>(compute: F) -> Computed<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    Computed::new(compute)
}

/// Create a computed from a fallible function with explicit options.
pub fn try_computed<T, F>(compute: F, options: ComputedOptions<T>) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn() -> Result<T, ReactiveError> + 'static,
{
    Computed::try_with_options(compute, options)
}

/// Create an effect with default options.
pub fn effect<F>(body: F) -> Effect
where
    F: FnMut(&OnCleanup) + 'static,
{
    Effect::new(body)
}

/// Create an effect from a fallible body with explicit options.
pub fn try_effect<F>(body: F, options: EffectOptions) -> Effect
where
    F: FnMut(&OnCleanup) -> Result<(), ReactiveError> + 'static,
{
    Effect::try_with_options(body, options)
}
