//! Reactive Context
//!
//! The reactive context tracks which consumer is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! the active consumer records it as a dependency.
//!
//! # Implementation
//!
//! We use a thread-local stack. Running a computed or an effect pushes the
//! consumer; `untracked` pushes an empty entry, which hides the consumer
//! below it. Entries are popped by a guard, so the stack is restored even if
//! the computation panics.
//!
//! This design supports nested reactive contexts (e.g., a computed that reads
//! from another computed, or an effect that reads a computed).

use std::cell::RefCell;
use std::rc::Rc;

use crate::graph::{NodeId, ReactiveNode};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// The consumer of the current computation, or `None` inside `untracked`.
    consumer: Option<Rc<dyn ReactiveNode>>,
}

/// Guard that pops the context when dropped.
pub(crate) struct ReactiveContext {
    consumer_id: Option<NodeId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given consumer.
    ///
    /// While this context is active, any producer that is read will be
    /// recorded as a dependency of `consumer`.
    pub(crate) fn enter(consumer: Rc<dyn ReactiveNode>) -> Self {
        let consumer_id = Some(consumer.core().id());
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                consumer: Some(consumer),
            });
        });

        Self { consumer_id }
    }

    /// Enter an untracked region. Reads inside it are invisible to the
    /// consumer below.
    pub(crate) fn untracked() -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry { consumer: None });
        });

        Self { consumer_id: None }
    }

    /// The consumer that reads are currently attributed to, if any.
    pub(crate) fn active_consumer() -> Option<Rc<dyn ReactiveNode>> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.consumer.clone())
        })
    }

    /// Check if reads are currently being tracked.
    pub(crate) fn is_tracking() -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .is_some_and(|entry| entry.consumer.is_some())
        })
    }

    #[cfg(test)]
    fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());

        // Catches guards dropped out of order.
        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.consumer.as_ref().map(|c| c.core().id()),
                self.consumer_id,
                "ReactiveContext mismatch"
            );
        }
    }
}

/// Run `f` without tracking any reads as dependencies of the current consumer.
///
/// Writes inside `f` are always permitted, even when the surrounding effect
/// does not allow signal writes.
pub fn untracked<T>(f: impl FnOnce() -> T) -> T {
    let _ctx = ReactiveContext::untracked();
    f()
}

/// Whether reads on this thread are currently being tracked.
pub fn is_tracking() -> bool {
    ReactiveContext::is_tracking()
}
