//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect starts dirty and is queued for its first run
//!    at the next flush. It does not run synchronously.
//!
//! 2. When any dependency changes, the effect is queued again. Any number of
//!    writes in one synchronous turn queue it once.
//!
//! 3. At the flush, the effect first checks whether a producer it read last
//!    time actually has a new version. If a computed it depends on
//!    recomputed to an equal value, the run is skipped.
//!
//! 4. Otherwise the previous cleanup runs, and the body runs under tracking,
//!    rebuilding the dependency list from scratch.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager (queued when
//!   deps change).
//! - Effects are rooted by the scheduler. Dropping the handle does not stop
//!   an effect; [`Effect::destroy`] does.
//!
//! # Cleanup
//!
//! The body receives an [`OnCleanup`] handle. A registered cleanup runs
//! before the next run and when the effect is destroyed. Registering again
//! replaces the previous cleanup, so at most one is pending at any time.
//! Cleanups run untracked and may write signals.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::context::{untracked, ReactiveContext};
use crate::error::ReactiveError;
use crate::graph::propagation::{
    consumer_after_computation, consumer_before_computation, consumer_destroy, consumer_poll_producers_for_change,
};
use crate::graph::scheduler::{self, ScheduledEffect};
use crate::graph::{ConsumerStatus, NodeCore, NodeId, NodeKind, ReactiveNode};
use crate::options::EffectOptions;

type EffectFn = Box<dyn FnMut(&OnCleanup) -> Result<(), ReactiveError>>;
type CleanupSlot = Rc<RefCell<Option<Box<dyn FnOnce()>>>>;

/// Registers the cleanup for the current run of an effect.
pub struct OnCleanup {
    slot: CleanupSlot,
}

impl OnCleanup {
    /// Run `cleanup` before the effect runs again or when it is destroyed.
    ///
    /// Replaces any cleanup registered earlier without running it.
    pub fn register(&self, cleanup: impl FnOnce() + 'static) {
        *self.slot.borrow_mut() = Some(Box::new(cleanup));
    }
}

impl fmt::Debug for OnCleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnCleanup")
            .field("registered", &self.slot.borrow().is_some())
            .finish()
    }
}

struct EffectInner {
    core: NodeCore,
    this: Weak<EffectInner>,
    body: RefCell<EffectFn>,
    cleanup: CleanupSlot,
    runs: Cell<usize>,
}

/// Finishes dependency bookkeeping for a run, even if the body panics.
struct RunGuard<'a> {
    effect: &'a EffectInner,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        consumer_after_computation(self.effect);
    }
}

impl EffectInner {
    fn is_destroyed(&self) -> bool {
        self.core.state().destroyed
    }

    fn run_cleanup(&self) {
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            untracked(cleanup);
        }
    }

    fn destroy(&self) {
        if self.is_destroyed() {
            return;
        }

        consumer_destroy(self);
        scheduler::unregister(self.core.id());
        self.run_cleanup();

        debug!(effect = self.core.id().raw(), runs = self.runs.get(), "effect destroyed");
    }
}

impl ReactiveNode for EffectInner {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn consumer_marked_dirty(&self) {
        if let Some(this) = self.this.upgrade() {
            scheduler::enqueue(this);
        }
    }
}

impl ScheduledEffect for EffectInner {
    fn effect_id(&self) -> NodeId {
        self.core.id()
    }

    fn run(&self) -> Result<(), ReactiveError> {
        let Some(this) = self.this.upgrade() else {
            return Ok(());
        };
        if self.is_destroyed() {
            return Ok(());
        }

        let has_run = {
            let mut state = self.core.state_mut();
            state.dirty = false;
            state.status != ConsumerStatus::Unset
        };

        let node: Rc<dyn ReactiveNode> = this.clone();
        if has_run && !consumer_poll_producers_for_change(&node) {
            trace!(effect = self.core.id().raw(), "effect skipped, no producer changed");
            return Ok(());
        }

        self.run_cleanup();
        // The cleanup may have destroyed the effect.
        if self.is_destroyed() {
            return Ok(());
        }

        self.core.state_mut().status = ConsumerStatus::Computing;
        let on_cleanup = OnCleanup {
            slot: Rc::clone(&self.cleanup),
        };

        consumer_before_computation(self);
        let result = {
            let _run = RunGuard { effect: self };
            let _ctx = ReactiveContext::enter(node);
            let mut body = self.body.borrow_mut();
            (body)(&on_cleanup)
        };

        self.runs.set(self.runs.get() + 1);
        self.core.state_mut().status = if result.is_err() {
            ConsumerStatus::Errored
        } else {
            ConsumerStatus::Clean
        };

        // Destroyed from inside its own body: drop whatever the rest of the
        // run read, and release a cleanup it registered after destroy.
        if self.is_destroyed() {
            consumer_destroy(self);
            self.run_cleanup();
        }

        trace!(
            effect = self.core.id().raw(),
            runs = self.runs.get(),
            failed = result.is_err(),
            "effect ran"
        );

        result
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Effect, Runtime, Signal};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let count = Signal::new(0);
/// let seen = Rc::new(Cell::new(0));
///
/// let _effect = Effect::new({
///     let (count, seen) = (count.clone(), seen.clone());
///     move |_| seen.set(count.get())
/// });
///
/// count.set(5).unwrap();
/// Runtime::run_microtasks().unwrap();
/// assert_eq!(seen.get(), 5);
/// ```
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create an effect from an infallible body.
    pub fn new<F>(mut body: F) -> Self
    where
        F: FnMut(&OnCleanup) + 'static,
    {
        Self::try_with_options(
            move |on_cleanup| {
                body(on_cleanup);
                Ok(())
            },
            EffectOptions::default(),
        )
    }

    /// Create an effect from an infallible body with explicit options.
    pub fn with_options<F>(mut body: F, options: EffectOptions) -> Self
    where
        F: FnMut(&OnCleanup) + 'static,
    {
        Self::try_with_options(
            move |on_cleanup| {
                body(on_cleanup);
                Ok(())
            },
            options,
        )
    }

    /// Create an effect from a fallible body.
    ///
    /// An error returned by the body is handed to whoever flushed the
    /// scheduler, see [`Runtime::run_microtasks`](super::Runtime::run_microtasks).
    pub fn try_new<F>(body: F) -> Self
    where
        F: FnMut(&OnCleanup) -> Result<(), ReactiveError> + 'static,
    {
        Self::try_with_options(body, EffectOptions::default())
    }

    /// Create an effect from a fallible body with explicit options.
    pub fn try_with_options<F>(body: F, options: EffectOptions) -> Self
    where
        F: FnMut(&OnCleanup) -> Result<(), ReactiveError> + 'static,
    {
        let inner = Rc::new_cyclic(|this| EffectInner {
            core: NodeCore::with_writes(NodeKind::Effect, options.allow_signal_writes),
            this: this.clone(),
            body: RefCell::new(Box::new(body)),
            cleanup: Rc::new(RefCell::new(None)),
            runs: Cell::new(0),
        });

        scheduler::register(inner.clone());
        scheduler::enqueue(inner.clone());
        trace!(
            effect = inner.core.id().raw(),
            allow_signal_writes = options.allow_signal_writes,
            "effect created"
        );

        Self { inner }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.core.id()
    }

    /// Stop the effect.
    ///
    /// Runs the pending cleanup, leaves the pending set and unsubscribes from
    /// every producer. Safe to call more than once, and from inside the
    /// effect's own body or cleanup.
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    /// Check if the effect has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    /// Get the number of times the body has run.
    pub fn run_count(&self) -> usize {
        self.inner.runs.get()
    }

    /// Get the number of dependencies recorded by the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.core.dependency_count()
    }

    /// Status of the last run.
    pub fn status(&self) -> ConsumerStatus {
        self.inner.core.status()
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id().raw())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
