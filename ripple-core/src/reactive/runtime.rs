//! Reactive Runtime
//!
//! The runtime is the host-facing side of the engine. Signals, computeds and
//! effects coordinate through the graph directly; the runtime only decides
//! *when* dirty effects get to run.
//!
//! # How It Works
//!
//! 1. A write marks live consumers dirty and queues affected effects.
//!
//! 2. The first effect queued after a flush asks the installed
//!    [`MicrotaskScheduler`] to schedule a flush at the next boundary.
//!
//! 3. At that boundary the queued effects run once each, in a single pass.
//!
//! # Microtask Boundary
//!
//! The boundary is supplied by the host:
//!
//! - [`ManualMicrotasks`] (the default) does nothing on its own. The host
//!   calls [`Runtime::run_microtasks`] whenever a synchronous turn ends.
//! - [`TokioMicrotasks`] spawns the flush as a local task, so it runs the
//!   next time the current `LocalSet` yields.
//!
//! # Thread Safety
//!
//! All runtime state is thread-local. Each thread that creates reactive
//! values has its own graph, scheduler and microtask scheduler.

use std::rc::Rc;

use tracing::{error, trace};

use super::context::ReactiveContext;
use crate::error::ReactiveError;
use crate::graph::scheduler;

/// Schedules an effect flush at the next microtask boundary.
pub trait MicrotaskScheduler {
    /// Arrange for [`Runtime::run_microtasks`] (or an equivalent flush) to
    /// happen once the current synchronous turn is over.
    fn schedule_flush(&self);
}

/// Leaves flushing to the host, which calls [`Runtime::run_microtasks`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualMicrotasks;

impl MicrotaskScheduler for ManualMicrotasks {
    fn schedule_flush(&self) {
        trace!("flush deferred to host");
    }
}

/// Flushes on a local tokio task.
///
/// Must be installed on a thread that runs inside a `tokio::task::LocalSet`.
/// Effect failures have no caller to return to and are logged instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioMicrotasks;

impl MicrotaskScheduler for TokioMicrotasks {
    fn schedule_flush(&self) {
        tokio::task::spawn_local(async {
            if let Err(err) = scheduler::flush() {
                error!(error = %err, "effect failed during scheduled flush");
            }
        });
    }
}

/// The per-thread reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Install the microtask scheduler for this thread.
    pub fn set_microtask_scheduler(microtasks: Rc<dyn MicrotaskScheduler>) {
        scheduler::set_microtask_scheduler(microtasks);
    }

    /// Cross the microtask boundary: run every pending effect.
    ///
    /// Does nothing if no flush is scheduled. Returns the first error raised
    /// by an effect; the remaining effects still run.
    pub fn run_microtasks() -> Result<(), ReactiveError> {
        if !scheduler::is_flush_scheduled() {
            return Ok(());
        }
        scheduler::flush()
    }

    /// Number of effects waiting for the next flush.
    pub fn pending_effects() -> usize {
        scheduler::pending_count()
    }

    /// Number of effects that have not been destroyed.
    pub fn active_effects() -> usize {
        scheduler::active_count()
    }

    /// Check if we're inside a tracking context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_tracking()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::scheduler::{enqueue, ScheduledEffect};
    use crate::graph::NodeId;
    use std::cell::Cell;

    struct Recorder {
        id: NodeId,
        runs: Cell<usize>,
    }

    impl ScheduledEffect for Recorder {
        fn effect_id(&self) -> NodeId {
            self.id
        }

        fn run(&self) -> Result<(), ReactiveError> {
            self.runs.set(self.runs.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn run_microtasks_without_work_is_a_no_op() {
        assert_eq!(Runtime::pending_effects(), 0);
        assert!(Runtime::run_microtasks().is_ok());
    }

    #[test]
    fn run_microtasks_drains_pending() {
        let recorder = Rc::new(Recorder {
            id: NodeId::new(),
            runs: Cell::new(0),
        });

        enqueue(recorder.clone());
        assert_eq!(Runtime::pending_effects(), 1);

        Runtime::run_microtasks().unwrap();
        assert_eq!(recorder.runs.get(), 1);
        assert_eq!(Runtime::pending_effects(), 0);
    }

    #[test]
    fn not_tracking_at_top_level() {
        assert!(!Runtime::is_tracking());
    }
}
