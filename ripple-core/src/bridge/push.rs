//! Push signals
//!
//! A [`PushSignal`] exposes the latest value of a push source as a read-only
//! reactive value.
//!
//! # How It Works
//!
//! 1. The bridge keeps a private signal holding `NoValue`, `Value(v)` or
//!    `Error(e)`, and a computed that maps that state to a read result.
//!
//! 2. The source is subscribed immediately, or on the first read in lazy
//!    mode. Each emission writes the private signal untracked, so sources may
//!    emit from anywhere, including while a computed or an effect is running.
//!
//! 3. Reading before the first emission returns the configured initial value,
//!    or fails with [`ReactiveError::RequireSyncViolation`] when the bridge
//!    was created with [`FromPushOptions::require_sync`].
//!
//! # Ownership
//!
//! The bridge owns its subscription. [`PushSignal::dispose`] releases it
//! explicitly; dropping the last handle releases it as well.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures_util::Stream;
use tracing::{debug, warn};

use super::source::{FutureSource, Observer, PushSource, StreamSource, Subscription, TryStreamSource};
use crate::error::ReactiveError;
use crate::graph::{never_equal, EqualFn, NodeId};
use crate::options::{ComputedOptions, Fallback, FromPushOptions, SignalOptions};
use crate::reactive::{untracked, Computed, Signal};

/// What the source has delivered so far.
#[derive(Clone)]
enum PushState<T> {
    NoValue,
    Value(T),
    Error(ReactiveError),
}

type Connect<T> = Box<dyn FnOnce(Observer<T>) -> Subscription>;

struct PushInner<T> {
    state: Signal<PushState<T>>,
    value: Computed<T>,
    pending: RefCell<Option<Connect<T>>>,
    observer: RefCell<Option<Observer<T>>>,
    subscription: RefCell<Option<Subscription>>,
}

impl<T: Clone + 'static> PushInner<T> {
    fn id(&self) -> NodeId {
        self.value.id()
    }

    fn connect(&self) {
        let Some(connect) = self.pending.borrow_mut().take() else {
            return;
        };

        let observer = state_observer(&self.state);
        *self.observer.borrow_mut() = Some(observer.clone());

        // Sources may emit synchronously while subscribing.
        let subscription = untracked(|| connect(observer));
        *self.subscription.borrow_mut() = Some(subscription);

        debug!(bridge = self.id().raw(), "push source connected");
    }

    fn dispose(&self) {
        self.pending.borrow_mut().take();
        if let Some(observer) = self.observer.borrow_mut().take() {
            observer.close();
        }
        let subscription = self.subscription.borrow_mut().take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
            debug!(bridge = self.id().raw(), "push source released");
        }
    }
}

impl<T> Drop for PushInner<T> {
    fn drop(&mut self) {
        if let Some(observer) = self.observer.get_mut().take() {
            observer.close();
        }
        // Subscription's own Drop runs the teardown.
    }
}

fn write_state<T: Clone + 'static>(state: &Signal<PushState<T>>, next: PushState<T>) {
    if let Err(err) = untracked(|| state.set(next)) {
        warn!(error = %err, "failed to record push source emission");
    }
}

fn state_observer<T: Clone + 'static>(state: &Signal<PushState<T>>) -> Observer<T> {
    let on_next = state.clone();
    let on_error = state.clone();
    let id = state.id().raw();

    Observer::new(
        move |value| write_state(&on_next, PushState::Value(value)),
        move |error| write_state(&on_error, PushState::Error(error)),
        move || debug!(state = id, "push source completed"),
    )
}

fn state_equality<T: 'static>(equal: Option<EqualFn<T>>) -> EqualFn<PushState<T>> {
    match equal {
        Some(equal) => Rc::new(move |a: &PushState<T>, b: &PushState<T>| match (a, b) {
            (PushState::Value(a), PushState::Value(b)) => equal(a, b),
            _ => false,
        }),
        None => never_equal(),
    }
}

/// A read-only reactive view of a push source.
///
/// # Example
///
/// ```rust
/// use ripple_core::bridge::{from_push, Subject};
/// use ripple_core::options::FromPushOptions;
///
/// let subject = Subject::new();
/// let latest = from_push(subject.clone(), FromPushOptions::initial(0));
///
/// assert_eq!(latest.get().unwrap(), 0);
/// subject.next(7);
/// assert_eq!(latest.get().unwrap(), 7);
/// ```
pub struct PushSignal<T> {
    inner: Rc<PushInner<T>>,
}

impl<T: Clone + 'static> PushSignal<T> {
    /// Get the latest value, tracking it as a dependency.
    ///
    /// In lazy mode the first read subscribes to the source.
    pub fn get(&self) -> Result<T, ReactiveError> {
        self.inner.connect();
        self.inner.value.get()
    }

    /// Get the latest value without tracking dependencies.
    pub fn get_untracked(&self) -> Result<T, ReactiveError> {
        untracked(|| self.get())
    }

    /// Release the subscription. The last value stays readable.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Whether the bridge currently holds a live subscription.
    pub fn is_connected(&self) -> bool {
        self.inner
            .subscription
            .borrow()
            .as_ref()
            .is_some_and(|subscription| !subscription.is_closed())
    }

    /// The computed backing this signal.
    ///
    /// Reading it does not connect a lazy bridge.
    pub fn as_computed(&self) -> Computed<T> {
        self.inner.value.clone()
    }

    /// The ID of the computed node that readers depend on.
    pub fn id(&self) -> NodeId {
        self.inner.id()
    }
}

impl<T> Clone for PushSignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> fmt::Debug for PushSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushSignal")
            .field("id", &self.id().raw())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Bridge a push source into a read-only reactive value.
///
/// Eager bridges subscribe before returning. Sources that spawn tasks
/// ([`from_stream`], [`from_future`]) need a current `tokio::task::LocalSet`
/// at subscription time.
pub fn from_push<T, S>(source: S, options: FromPushOptions<T>) -> PushSignal<T>
where
    T: Clone + 'static,
    S: PushSource<T> + 'static,
{
    let FromPushOptions { fallback, lazy, equal } = options;

    let state = Signal::with_options(
        PushState::NoValue,
        SignalOptions {
            equal: state_equality(equal.clone()),
        },
    );

    let value = Computed::try_with_options(
        {
            let state = state.clone();
            move || match state.get() {
                PushState::Value(value) => Ok(value),
                PushState::Error(err) => Err(err),
                PushState::NoValue => match &fallback {
                    Fallback::Initial(value) => Ok(value.clone()),
                    Fallback::RequireSync => Err(ReactiveError::RequireSyncViolation),
                },
            }
        },
        ComputedOptions {
            equal: equal.unwrap_or_else(never_equal),
        },
    );

    let inner = Rc::new(PushInner {
        state,
        value,
        pending: RefCell::new(Some(Box::new(move |observer: Observer<T>| source.subscribe(observer)))),
        observer: RefCell::new(None),
        subscription: RefCell::new(None),
    });

    if !lazy {
        inner.connect();
    }

    PushSignal { inner }
}

/// Bridge a [`Stream`]; each item becomes the current value.
pub fn from_stream<T, S>(stream: S, options: FromPushOptions<T>) -> PushSignal<T>
where
    T: Clone + 'static,
    S: Stream<Item = T> + 'static,
{
    from_push(StreamSource::new(stream), options)
}

/// Bridge a fallible [`Stream`]; the first error becomes the terminal state.
pub fn from_try_stream<T, E, S>(stream: S, options: FromPushOptions<T>) -> PushSignal<T>
where
    T: Clone + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    S: Stream<Item = Result<T, E>> + 'static,
{
    from_push(TryStreamSource::new(stream), options)
}

/// Bridge a [`Future`]; its output becomes the value once it resolves.
pub fn from_future<T, F>(future: F, options: FromPushOptions<T>) -> PushSignal<T>
where
    T: Clone + 'static,
    F: Future<Output = T> + 'static,
{
    from_push(FutureSource::new(future), options)
}
