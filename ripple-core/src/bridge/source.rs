//! Push sources
//!
//! A push source delivers values on its own schedule: an observable-like
//! [`Subject`](super::Subject), an async stream, or a future. Every source
//! speaks the same small protocol: it is handed an [`Observer`] and returns a
//! [`Subscription`] that stops delivery when released.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures_util::{pin_mut, Stream, StreamExt};
use tracing::trace;

use crate::error::ReactiveError;

/// Something that pushes values of type `T` to an observer.
pub trait PushSource<T> {
    /// Start delivering to `observer`. Delivery stops when the returned
    /// subscription is released.
    fn subscribe(self, observer: Observer<T>) -> Subscription;
}

struct ObserverInner<T> {
    closed: Cell<bool>,
    on_next: Box<dyn Fn(T)>,
    on_error: Box<dyn Fn(ReactiveError)>,
    on_complete: Box<dyn Fn()>,
}

/// Receives the values, error and completion of a push source.
///
/// An observer is closed after `error` or `complete`; anything delivered
/// after that is ignored.
pub struct Observer<T> {
    inner: Rc<ObserverInner<T>>,
}

impl<T> Observer<T> {
    /// An observer from three callbacks, one per kind of notification.
    pub fn new(
        on_next: impl Fn(T) + 'static,
        on_error: impl Fn(ReactiveError) + 'static,
        on_complete: impl Fn() + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(ObserverInner {
                closed: Cell::new(false),
                on_next: Box::new(on_next),
                on_error: Box::new(on_error),
                on_complete: Box::new(on_complete),
            }),
        }
    }

    /// Deliver a value.
    pub fn next(&self, value: T) {
        if !self.inner.closed.get() {
            (self.inner.on_next)(value);
        }
    }

    /// Deliver a terminal error.
    pub fn error(&self, error: ReactiveError) {
        if !self.inner.closed.replace(true) {
            (self.inner.on_error)(error);
        }
    }

    /// Deliver completion.
    pub fn complete(&self) {
        if !self.inner.closed.replace(true) {
            (self.inner.on_complete)();
        }
    }

    /// Whether `error` or `complete` was delivered.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    /// Stop delivery without notifying.
    pub(crate) fn close(&self) {
        self.inner.closed.set(true);
    }
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A handle to an active subscription.
///
/// Dropping the handle unsubscribes.
pub struct Subscription {
    teardown: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Subscription {
    /// A subscription that runs `teardown` once when released.
    pub fn new(teardown: impl FnOnce() + 'static) -> Self {
        Self {
            teardown: RefCell::new(Some(Box::new(teardown))),
        }
    }

    /// A subscription with nothing to release.
    pub fn closed() -> Self {
        Self {
            teardown: RefCell::new(None),
        }
    }

    /// Release the subscription. Later calls do nothing.
    pub fn unsubscribe(&self) {
        let teardown = self.teardown.borrow_mut().take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    /// Whether the subscription has been released.
    pub fn is_closed(&self) -> bool {
        self.teardown.borrow().is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Drives a [`Stream`] on a local tokio task.
///
/// Subscribing requires a current `tokio::task::LocalSet`. The stream ends in
/// completion; releasing the subscription aborts the task.
pub struct StreamSource<S> {
    stream: S,
}

impl<S> StreamSource<S> {
    /// Wrap a stream so it can back a push signal.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

impl<T, S> PushSource<T> for StreamSource<S>
where
    S: Stream<Item = T> + 'static,
    T: 'static,
{
    fn subscribe(self, observer: Observer<T>) -> Subscription {
        let stream = self.stream;
        let task = tokio::task::spawn_local(async move {
            pin_mut!(stream);
            while let Some(item) = stream.next().await {
                if observer.is_closed() {
                    return;
                }
                observer.next(item);
            }
            observer.complete();
        });

        Subscription::new(move || {
            trace!("stream source released");
            task.abort();
        })
    }
}

/// Drives a fallible [`Stream`] on a local tokio task.
///
/// The first `Err` item is delivered as the terminal error.
pub struct TryStreamSource<S> {
    stream: S,
}

impl<S> TryStreamSource<S> {
    /// Wrap a fallible stream so it can back a push signal.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

impl<T, E, S> PushSource<T> for TryStreamSource<S>
where
    S: Stream<Item = Result<T, E>> + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    T: 'static,
{
    fn subscribe(self, observer: Observer<T>) -> Subscription {
        let stream = self.stream;
        let task = tokio::task::spawn_local(async move {
            pin_mut!(stream);
            while let Some(item) = stream.next().await {
                if observer.is_closed() {
                    return;
                }
                match item {
                    Ok(value) => observer.next(value),
                    Err(err) => {
                        observer.error(ReactiveError::source(err));
                        return;
                    }
                }
            }
            observer.complete();
        });

        Subscription::new(move || task.abort())
    }
}

/// Delivers the output of a future once, then completes.
pub struct FutureSource<F> {
    future: F,
}

impl<F> FutureSource<F> {
    /// Wrap a future so it can back a push signal.
    pub fn new(future: F) -> Self {
        Self { future }
    }
}

impl<T, F> PushSource<T> for FutureSource<F>
where
    F: Future<Output = T> + 'static,
    T: 'static,
{
    fn subscribe(self, observer: Observer<T>) -> Subscription {
        let future = self.future;
        let task = tokio::task::spawn_local(async move {
            let value = future.await;
            observer.next(value);
            observer.complete();
        });

        Subscription::new(move || task.abort())
    }
}
