//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! a version, and tracks which live consumers depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (computed/effect), the
//!    active consumer records the signal and its current version.
//!
//! 2. When a signal's value changes, it takes a fresh version from the global
//!    counter and marks its live consumers dirty.
//!
//! 3. Dirty effects are scheduled; computeds recompute lazily on next read.
//!
//! Writes that the signal's equality function considers equal to the current
//! value are ignored entirely: no new version, no notifications.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use tracing::trace;

use crate::error::ReactiveError;
use crate::graph::propagation::{producer_accessed, producer_updates_allowed, producer_value_changed};
use crate::graph::{EqualFn, NodeCore, NodeId, NodeKind, ReactiveNode, Version};
use crate::options::SignalOptions;

struct SignalInner<T> {
    core: NodeCore,
    value: RefCell<T>,
    equal: EqualFn<T>,
}

impl<T: 'static> ReactiveNode for SignalInner<T> {
    fn core(&self) -> &NodeCore {
        &self.core
    }
}

/// A writable reactive cell holding a value of type `T`.
///
/// Handles are cheap to clone; clones share the same cell.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// assert_eq!(count.get(), 0);
///
/// count.set(5).unwrap();
/// count.update(|n| n + 1).unwrap();
/// assert_eq!(count.get(), 6);
/// ```
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T: Clone + 'static> Signal<T> {
    /// Create a new signal compared with `PartialEq`.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_options(value, SignalOptions::default())
    }

    /// Create a new signal with explicit options.
    pub fn with_options(value: T, options: SignalOptions<T>) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                core: NodeCore::new(NodeKind::Signal),
                value: RefCell::new(value),
                equal: options.equal,
            }),
        }
    }

    fn node(&self) -> Rc<dyn ReactiveNode> {
        self.inner.clone()
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.core.id()
    }

    /// The version of the current value.
    pub fn version(&self) -> Version {
        self.inner.core.version()
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also records the signal as
    /// a dependency of the running computation.
    pub fn get(&self) -> T {
        producer_accessed(&self.node());
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Set a new value and notify live consumers.
    ///
    /// Fails when called from a computed body, or from an effect that does
    /// not allow signal writes.
    pub fn set(&self, value: T) -> Result<(), ReactiveError> {
        producer_updates_allowed()?;

        let changed = {
            let mut current = self.inner.value.borrow_mut();
            if (self.inner.equal)(&current, &value) {
                false
            } else {
                *current = value;
                true
            }
        };

        if changed {
            producer_value_changed(&self.node());
            trace!(signal = self.id().raw(), version = self.version(), "signal changed");
        }

        Ok(())
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F) -> Result<(), ReactiveError>
    where
        F: FnOnce(&T) -> T,
    {
        producer_updates_allowed()?;
        let current = self.get_untracked();
        self.set(f(&current))
    }

    /// A read-only view sharing this signal's cell.
    pub fn as_readonly(&self) -> ReadonlySignal<T> {
        ReadonlySignal {
            inner: Rc::clone(&self.inner),
        }
    }

    /// Number of live consumers currently subscribed.
    pub fn live_consumer_count(&self) -> usize {
        self.inner.core.live_consumer_count()
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id().raw())
            .field("value", &self.get_untracked())
            .field("version", &self.version())
            .finish()
    }
}

/// A read-only handle to a [`Signal`].
pub struct ReadonlySignal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T: Clone + 'static> ReadonlySignal<T> {
    /// Get the current value, tracking it as a dependency.
    pub fn get(&self) -> T {
        let node: Rc<dyn ReactiveNode> = self.inner.clone();
        producer_accessed(&node);
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.core.id()
    }

    /// The version of the current value.
    pub fn version(&self) -> Version {
        self.inner.core.version()
    }
}

impl<T> Clone for ReadonlySignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Debug + 'static> Debug for ReadonlySignal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadonlySignal")
            .field("id", &self.id().raw())
            .field("value", &self.get_untracked())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
