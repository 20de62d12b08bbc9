//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. On first access, the computed runs its function under tracking and
//!    caches the result.
//!
//! 2. When accessed again, it checks whether any producer it read last time
//!    has a newer version. If not, it returns the cached value.
//!
//! 3. If a producer moved, it reruns the function. A result equal to the
//!    cached value keeps the cached value and the computed's own version, so
//!    dependents downstream see no change.
//!
//! 4. If the function fails, the error is cached and returned on every read
//!    until a dependency changes.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 computeds depend on it
//! - Only the computeds actually read will recompute
//! - Computeds that are never read stay stale (no wasted work)
//!
//! It also makes reads glitch-free: a computed pulls its inputs up to date
//! before it runs, so it never observes a mix of old and new values.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::context::{untracked, ReactiveContext};
use crate::error::ReactiveError;
use crate::graph::propagation::{
    consumer_after_computation, consumer_before_computation, producer_accessed, producer_update_value_version,
};
use crate::graph::{next_version, ConsumerStatus, EqualFn, NodeCore, NodeId, NodeKind, ReactiveNode, Version};
use crate::options::ComputedOptions;

type ComputeFn<T> = Box<dyn Fn() -> Result<T, ReactiveError>>;

/// Cached outcome of the last run.
enum ComputedValue<T> {
    Unset,
    Value(T),
    Error(ReactiveError),
}

struct ComputedInner<T> {
    core: NodeCore,
    this: Weak<ComputedInner<T>>,
    compute: ComputeFn<T>,
    value: RefCell<ComputedValue<T>>,
    equal: EqualFn<T>,
    runs: Cell<usize>,
}

/// Puts a computed back into a recomputable state if its body panics, and
/// finishes the dependency bookkeeping the run started.
struct ComputingGuard<'a> {
    node: &'a dyn ReactiveNode,
}

impl Drop for ComputingGuard<'_> {
    fn drop(&mut self) {
        let aborted = {
            let mut state = self.node.core().state_mut();
            let aborted = state.status == ConsumerStatus::Computing;
            if aborted {
                // The next read reruns the body; the next write notifies again.
                state.status = ConsumerStatus::Unset;
                state.dirty = false;
            }
            aborted
        };

        if aborted {
            consumer_after_computation(self.node);
        }
    }
}

impl<T: Clone + 'static> ReactiveNode for ComputedInner<T> {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn recompute(&self) {
        let Some(this) = self.this.upgrade() else {
            return;
        };

        self.core.state_mut().status = ConsumerStatus::Computing;
        let _guard = ComputingGuard { node: self };

        consumer_before_computation(self);
        let result = {
            let _ctx = ReactiveContext::enter(this);
            (self.compute)()
        };
        consumer_after_computation(self);

        self.runs.set(self.runs.get() + 1);
        let failed = result.is_err();

        let changed = {
            let mut value = self.value.borrow_mut();
            match result {
                Ok(next) => {
                    let unchanged =
                        matches!(&*value, ComputedValue::Value(previous) if (self.equal)(previous, &next));
                    if !unchanged {
                        *value = ComputedValue::Value(next);
                    }
                    !unchanged
                }
                Err(err) => {
                    *value = ComputedValue::Error(err);
                    true
                }
            }
        };

        let mut state = self.core.state_mut();
        state.status = if failed {
            ConsumerStatus::Errored
        } else {
            ConsumerStatus::Clean
        };
        if changed {
            state.version = next_version();
        }

        trace!(
            computed = self.core.id().raw(),
            changed,
            failed,
            version = state.version,
            "computed recomputed"
        );
    }
}

/// A lazily memoized derived value.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Reads return clones of the cache.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Computed, Signal};
///
/// let count = Signal::new(2);
/// let doubled = Computed::new({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get().unwrap(), 4);
/// count.set(5).unwrap();
/// assert_eq!(doubled.get().unwrap(), 10);
/// ```
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a computed from an infallible function, compared with `PartialEq`.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + 'static,
        T: PartialEq,
    {
        Self::try_with_options(move || Ok(compute()), ComputedOptions::default())
    }

    /// Create a computed from a fallible function, compared with `PartialEq`.
    pub fn try_new<F>(compute: F) -> Self
    where
        F: Fn() -> Result<T, ReactiveError> + 'static,
        T: PartialEq,
    {
        Self::try_with_options(compute, ComputedOptions::default())
    }

    /// Create a computed from an infallible function with explicit options.
    pub fn with_options<F>(compute: F, options: ComputedOptions<T>) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::try_with_options(move || Ok(compute()), options)
    }

    /// Create a computed from a fallible function with explicit options.
    pub fn try_with_options<F>(compute: F, options: ComputedOptions<T>) -> Self
    where
        F: Fn() -> Result<T, ReactiveError> + 'static,
    {
        let inner = Rc::new_cyclic(|this| ComputedInner {
            core: NodeCore::new(NodeKind::Computed),
            this: this.clone(),
            compute: Box::new(compute),
            value: RefCell::new(ComputedValue::Unset),
            equal: options.equal,
            runs: Cell::new(0),
        });

        Self { inner }
    }

    fn node(&self) -> Rc<dyn ReactiveNode> {
        self.inner.clone()
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Returns the cached error if the last run failed, and
    /// [`ReactiveError::CyclicComputation`] if this computed is read while it
    /// is computing.
    pub fn get(&self) -> Result<T, ReactiveError> {
        let node = self.node();
        producer_update_value_version(&node)?;
        producer_accessed(&node);

        match &*self.inner.value.borrow() {
            ComputedValue::Value(value) => Ok(value.clone()),
            ComputedValue::Error(err) => Err(err.clone()),
            // Only observable while the first run is still in progress.
            ComputedValue::Unset => Err(ReactiveError::CyclicComputation),
        }
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> Result<T, ReactiveError> {
        untracked(|| self.get())
    }

    /// Get the computed's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.core.id()
    }

    /// The version of the cached value.
    pub fn version(&self) -> Version {
        self.inner.core.version()
    }

    /// Current evaluation status.
    pub fn status(&self) -> ConsumerStatus {
        self.inner.core.status()
    }

    /// Number of times the function has run.
    pub fn run_count(&self) -> usize {
        self.inner.runs.get()
    }

    /// Number of producers read during the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.core.dependency_count()
    }

    /// Whether an effect (directly or through other computeds) reads this computed.
    pub fn is_live(&self) -> bool {
        self.inner.core.is_live()
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id().raw())
            .field("status", &self.status())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Effect, Runtime, Signal};
    use std::cell::OnceCell;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn computed_computes_on_first_access() {
        let computed = Computed::new(|| 42);

        // Not computed yet
        assert_eq!(computed.status(), ConsumerStatus::Unset);
        assert_eq!(computed.run_count(), 0);

        // First access triggers computation
        assert_eq!(computed.get().unwrap(), 42);
        assert_eq!(computed.run_count(), 1);
        assert_eq!(computed.status(), ConsumerStatus::Clean);
    }

    #[test]
    fn computed_caches_value_when_clean() {
        let source = Signal::new(1);
        let computed = Computed::new({
            let source = source.clone();
            move || source.get() + 1
        });

        assert_eq!(computed.get().unwrap(), 2);
        assert_eq!(computed.get().unwrap(), 2);
        assert_eq!(computed.get().unwrap(), 2);
        assert_eq!(computed.run_count(), 1);
    }

    #[test]
    fn computed_recomputes_when_dependency_changes() {
        let source = Signal::new(1);
        let computed = Computed::new({
            let source = source.clone();
            move || source.get() * 10
        });

        assert_eq!(computed.get().unwrap(), 10);
        source.set(2).unwrap();
        assert_eq!(computed.get().unwrap(), 20);
        assert_eq!(computed.run_count(), 2);
    }

    #[test]
    fn equal_result_keeps_version() {
        let source = Signal::new(3);
        let parity = Computed::new({
            let source = source.clone();
            move || source.get() % 2
        });

        assert_eq!(parity.get().unwrap(), 1);
        let version = parity.version();

        source.set(5).unwrap();
        assert_eq!(parity.get().unwrap(), 1);
        assert_eq!(parity.run_count(), 2);
        assert_eq!(parity.version(), version);
    }

    #[test]
    fn unchanged_input_skips_downstream_recompute() {
        let source = Signal::new(3);
        let parity = Computed::new({
            let source = source.clone();
            move || source.get() % 2
        });
        let label = Computed::try_new({
            let parity = parity.clone();
            move || Ok(if parity.get()? == 0 { "even" } else { "odd" })
        });

        assert_eq!(label.get().unwrap(), "odd");
        source.set(7).unwrap();
        assert_eq!(label.get().unwrap(), "odd");
        assert_eq!(parity.run_count(), 2);
        assert_eq!(label.run_count(), 1);
    }

    #[test]
    fn errors_are_cached_until_dependency_changes() {
        let divisor = Signal::new(0);
        let quotient = Computed::try_new({
            let divisor = divisor.clone();
            move || {
                let d = divisor.get();
                if d == 0 {
                    Err(ReactiveError::computation("division by zero"))
                } else {
                    Ok(100 / d)
                }
            }
        });

        let first = quotient.get().unwrap_err();
        let second = quotient.get().unwrap_err();
        assert!(std::sync::Arc::ptr_eq(first.payload().unwrap(), second.payload().unwrap()));
        assert_eq!(quotient.run_count(), 1);
        assert_eq!(quotient.status(), ConsumerStatus::Errored);

        divisor.set(4).unwrap();
        assert_eq!(quotient.get().unwrap(), 25);
        assert_eq!(quotient.status(), ConsumerStatus::Clean);
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let slot: Rc<OnceCell<Computed<i32>>> = Rc::new(OnceCell::new());
        let computed = Computed::try_new({
            let slot = Rc::clone(&slot);
            move || match slot.get() {
                Some(me) => me.get(),
                None => Ok(0),
            }
        });
        assert!(slot.set(computed.clone()).is_ok());

        assert!(matches!(computed.get(), Err(ReactiveError::CyclicComputation)));
    }

    #[test]
    fn writes_inside_computed_are_rejected() {
        let target = Signal::new(0);
        let computed = Computed::try_new({
            let target = target.clone();
            move || {
                target.set(1)?;
                Ok(0)
            }
        });

        assert!(matches!(
            computed.get(),
            Err(ReactiveError::SignalWriteDuringComputation)
        ));
        assert_eq!(target.get(), 0);
    }

    #[test]
    fn dependencies_follow_the_last_run() {
        let use_left = Signal::new(true);
        let left = Signal::new(1);
        let right = Signal::new(2);

        let picked = Computed::new({
            let (use_left, left, right) = (use_left.clone(), left.clone(), right.clone());
            move || if use_left.get() { left.get() } else { right.get() }
        });

        assert_eq!(picked.get().unwrap(), 1);
        assert_eq!(picked.dependency_count(), 2);

        use_left.set(false).unwrap();
        assert_eq!(picked.get().unwrap(), 2);

        // `left` is no longer read, so changing it does not cause a rerun
        let runs = picked.run_count();
        left.set(10).unwrap();
        assert_eq!(picked.get().unwrap(), 2);
        assert_eq!(picked.run_count(), runs);
    }

    #[test]
    fn untracked_read_is_not_a_dependency() {
        let tracked = Signal::new(1);
        let hidden = Signal::new(100);

        let sum = Computed::new({
            let (tracked, hidden) = (tracked.clone(), hidden.clone());
            move || tracked.get() + untracked(|| hidden.get())
        });

        assert_eq!(sum.get().unwrap(), 101);
        assert_eq!(sum.dependency_count(), 1);

        hidden.set(200).unwrap();
        assert_eq!(sum.get().unwrap(), 101);
        assert_eq!(sum.run_count(), 1);
    }

    #[test]
    fn mutual_reads_are_a_cycle() {
        let a_slot: Rc<OnceCell<Computed<i32>>> = Rc::new(OnceCell::new());
        let b_slot: Rc<OnceCell<Computed<i32>>> = Rc::new(OnceCell::new());

        let a = Computed::try_new({
            let b_slot = b_slot.clone();
            move || match b_slot.get() {
                Some(b) => b.get().map(|n| n + 1),
                None => Ok(0),
            }
        });
        let b = Computed::try_new({
            let a_slot = a_slot.clone();
            move || match a_slot.get() {
                Some(a) => a.get().map(|n| n + 1),
                None => Ok(0),
            }
        });
        assert!(a_slot.set(a.clone()).is_ok());
        assert!(b_slot.set(b.clone()).is_ok());

        assert!(matches!(a.get(), Err(ReactiveError::CyclicComputation)));
        assert!(matches!(b.get(), Err(ReactiveError::CyclicComputation)));
        assert_eq!(a.status(), ConsumerStatus::Errored);
    }

    #[test]
    fn panicking_body_releases_dropped_dependencies() {
        let mode = Signal::new(0);
        let x = Signal::new(1);
        let y = Signal::new(2);

        let picked = Computed::new({
            let (mode, x, y) = (mode.clone(), x.clone(), y.clone());
            move || match mode.get() {
                0 => x.get(),
                1 => panic!("mode 1 has no value"),
                _ => y.get(),
            }
        });

        let seen = Rc::new(RefCell::new(Vec::new()));
        let _effect = Effect::try_new({
            let (picked, seen) = (picked.clone(), seen.clone());
            move |_| {
                seen.borrow_mut().push(picked.get()?);
                Ok(())
            }
        });
        Runtime::run_microtasks().unwrap();
        assert!(picked.is_live());
        assert_eq!(x.live_consumer_count(), 1);

        mode.set(1).unwrap();
        let result = catch_unwind(AssertUnwindSafe(|| picked.get()));
        assert!(result.is_err());

        // The aborted run read only `mode`, so `x` lost its subscriber.
        assert_eq!(picked.status(), ConsumerStatus::Unset);
        assert_eq!(picked.dependency_count(), 1);
        assert_eq!(x.live_consumer_count(), 0);
        assert_eq!(mode.live_consumer_count(), 1);

        mode.set(2).unwrap();
        Runtime::run_microtasks().unwrap();

        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert_eq!(x.live_consumer_count(), 0);
        assert_eq!(y.live_consumer_count(), 1);
        assert_eq!(picked.dependency_count(), 2);
    }
}
