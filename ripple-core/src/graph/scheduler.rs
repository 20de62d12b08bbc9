//! Effect Scheduler
//!
//! The scheduler coalesces dirty effects into a pending set and runs them on
//! a single flush per batch.
//!
//! # Algorithm
//!
//! 1. When an effect becomes dirty it is inserted into `pending`. Inserting
//!    an effect that is already pending keeps its original position, so any
//!    number of writes in one synchronous turn queue it once.
//! 2. The first insertion after a flush asks the installed
//!    [`MicrotaskScheduler`] to schedule the next flush.
//! 3. A flush repeatedly removes the oldest pending effect and runs it. An
//!    effect dirtied again while the flush is draining is re-inserted and runs
//!    again within the same flush. An entry is removed before it runs, so it
//!    never runs twice at once.
//!
//! Ordering among independent effects follows insertion into `pending` and is
//! not a contract.
//!
//! The scheduler also roots every effect that has not been destroyed, so an
//! effect keeps running after its handle is dropped.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{trace, warn};

use super::node::NodeId;
use crate::error::ReactiveError;
use crate::reactive::runtime::{ManualMicrotasks, MicrotaskScheduler};

/// An effect as seen by the scheduler.
pub(crate) trait ScheduledEffect {
    fn effect_id(&self) -> NodeId;

    /// Run the effect if its dependencies actually changed.
    fn run(&self) -> Result<(), ReactiveError>;
}

/// Process-wide (per thread) scheduler state.
struct EffectScheduler {
    /// Dirty effects waiting for the next flush, in insertion order.
    pending: IndexMap<NodeId, Rc<dyn ScheduledEffect>>,

    /// Effects that have been created and not yet destroyed.
    active: IndexMap<NodeId, Rc<dyn ScheduledEffect>>,

    /// A flush has been requested from the microtask scheduler.
    flush_scheduled: bool,

    /// A flush is draining `pending` right now.
    flushing: bool,

    microtasks: Rc<dyn MicrotaskScheduler>,
}

impl EffectScheduler {
    fn new() -> Self {
        Self {
            pending: IndexMap::new(),
            active: IndexMap::new(),
            flush_scheduled: false,
            flushing: false,
            microtasks: Rc::new(ManualMicrotasks),
        }
    }
}

thread_local! {
    static SCHEDULER: RefCell<EffectScheduler> = RefCell::new(EffectScheduler::new());
}

/// Root an effect until it is destroyed.
pub(crate) fn register(effect: Rc<dyn ScheduledEffect>) {
    SCHEDULER.with(|s| {
        s.borrow_mut().active.insert(effect.effect_id(), effect);
    });
}

/// Forget an effect: drop it from the pending set and release the root.
///
/// The removed entries are returned to the caller's scope before being
/// dropped, so an effect's own destructor never runs under the scheduler
/// borrow.
pub(crate) fn unregister(id: NodeId) {
    let removed = SCHEDULER.with(|s| {
        let mut s = s.borrow_mut();
        (s.pending.shift_remove(&id), s.active.shift_remove(&id))
    });
    drop(removed);
}

/// Queue an effect for the next flush.
pub(crate) fn enqueue(effect: Rc<dyn ScheduledEffect>) {
    let request = SCHEDULER.with(|s| {
        let mut s = s.borrow_mut();
        s.pending.insert(effect.effect_id(), effect);

        if s.flush_scheduled || s.flushing {
            None
        } else {
            s.flush_scheduled = true;
            Some(Rc::clone(&s.microtasks))
        }
    });

    if let Some(microtasks) = request {
        trace!("effect flush scheduled");
        microtasks.schedule_flush();
    }
}

/// Resets the `flushing` flag even if an effect panics, and asks for
/// another flush when an aborted one leaves effects behind.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let request = SCHEDULER.with(|s| {
            let mut s = s.borrow_mut();
            s.flushing = false;
            // Leftovers from an aborted flush need a fresh request.
            if s.pending.is_empty() || s.flush_scheduled {
                None
            } else {
                s.flush_scheduled = true;
                Some(Rc::clone(&s.microtasks))
            }
        });

        if let Some(microtasks) = request {
            trace!("effect flush rescheduled after aborted flush");
            microtasks.schedule_flush();
        }
    }
}

/// Drain the pending set.
///
/// All pending effects run even if some fail. The first failure is returned;
/// later ones are logged.
pub(crate) fn flush() -> Result<(), ReactiveError> {
    let started = SCHEDULER.with(|s| {
        let mut s = s.borrow_mut();
        if s.flushing {
            false
        } else {
            s.flushing = true;
            s.flush_scheduled = false;
            true
        }
    });

    // The outer flush picks up anything queued by a nested request.
    if !started {
        return Ok(());
    }

    let _guard = FlushGuard;
    let mut first_error = None;
    let mut runs = 0usize;

    while let Some(effect) = next_pending() {
        runs += 1;
        if let Err(err) = effect.run() {
            if first_error.is_none() {
                first_error = Some(err);
            } else {
                warn!(effect = effect.effect_id().raw(), error = %err, "effect failed during flush");
            }
        }
    }

    trace!(runs, "effect flush complete");
    first_error.map_or(Ok(()), Err)
}

fn next_pending() -> Option<Rc<dyn ScheduledEffect>> {
    SCHEDULER.with(|s| {
        s.borrow_mut()
            .pending
            .shift_remove_index(0)
            .map(|(_, effect)| effect)
    })
}

pub(crate) fn is_flush_scheduled() -> bool {
    SCHEDULER.with(|s| s.borrow().flush_scheduled)
}

pub(crate) fn pending_count() -> usize {
    SCHEDULER.with(|s| s.borrow().pending.len())
}

pub(crate) fn active_count() -> usize {
    SCHEDULER.with(|s| s.borrow().active.len())
}

pub(crate) fn set_microtask_scheduler(microtasks: Rc<dyn MicrotaskScheduler>) {
    SCHEDULER.with(|s| s.borrow_mut().microtasks = microtasks);
}
