//! Subject
//!
//! A multicast push source driven by hand. Values passed to
//! [`Subject::next`] are delivered synchronously to every subscribed
//! observer.
//!
//! A subject created with [`Subject::with_value`] also remembers its latest
//! value and replays it to new subscribers during `subscribe`, so a bridged
//! signal connected to it has a value immediately.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::source::{Observer, PushSource, Subscription};
use crate::error::ReactiveError;

#[derive(Clone)]
enum Terminal {
    Completed,
    Failed(ReactiveError),
}

struct SubjectInner<T> {
    observers: RefCell<IndexMap<u64, Observer<T>>>,
    next_key: Cell<u64>,
    current: RefCell<Option<T>>,
    replay: bool,
    terminal: RefCell<Option<Terminal>>,
}

/// A hand-driven multicast source.
pub struct Subject<T> {
    inner: Rc<SubjectInner<T>>,
}

impl<T: Clone + 'static> Subject<T> {
    /// A subject without a current value.
    pub fn new() -> Self {
        Self::build(None, false)
    }

    /// A subject that replays its latest value, starting with `value`.
    pub fn with_value(value: T) -> Self {
        Self::build(Some(value), true)
    }

    fn build(current: Option<T>, replay: bool) -> Self {
        Self {
            inner: Rc::new(SubjectInner {
                observers: RefCell::new(IndexMap::new()),
                next_key: Cell::new(0),
                current: RefCell::new(current),
                replay,
                terminal: RefCell::new(None),
            }),
        }
    }

    fn snapshot(&self) -> SmallVec<[Observer<T>; 4]> {
        self.inner.observers.borrow().values().cloned().collect()
    }

    /// Deliver `value` to every observer.
    pub fn next(&self, value: T) {
        if self.is_stopped() {
            return;
        }
        if self.inner.replay {
            *self.inner.current.borrow_mut() = Some(value.clone());
        }
        for observer in self.snapshot() {
            observer.next(value.clone());
        }
    }

    /// Fail every observer and stop.
    pub fn error(&self, error: ReactiveError) {
        if self.is_stopped() {
            return;
        }
        *self.inner.terminal.borrow_mut() = Some(Terminal::Failed(error.clone()));
        let observers = std::mem::take(&mut *self.inner.observers.borrow_mut());
        for observer in observers.into_values() {
            observer.error(error.clone());
        }
    }

    /// Complete every observer and stop.
    pub fn complete(&self) {
        if self.is_stopped() {
            return;
        }
        *self.inner.terminal.borrow_mut() = Some(Terminal::Completed);
        let observers = std::mem::take(&mut *self.inner.observers.borrow_mut());
        for observer in observers.into_values() {
            observer.complete();
        }
    }

    /// The latest value, for subjects created with [`Subject::with_value`].
    pub fn value(&self) -> Option<T> {
        self.inner.current.borrow().clone()
    }

    /// Number of observers currently subscribed.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    /// Whether `error` or `complete` has been called.
    pub fn is_stopped(&self) -> bool {
        self.inner.terminal.borrow().is_some()
    }
}

impl<T: Clone + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> PushSource<T> for Subject<T> {
    fn subscribe(self, observer: Observer<T>) -> Subscription {
        let terminal = self.inner.terminal.borrow().clone();
        match terminal {
            Some(Terminal::Completed) => {
                observer.complete();
                return Subscription::closed();
            }
            Some(Terminal::Failed(error)) => {
                observer.error(error);
                return Subscription::closed();
            }
            None => {}
        }

        let key = self.inner.next_key.get();
        self.inner.next_key.set(key + 1);
        self.inner.observers.borrow_mut().insert(key, observer.clone());

        if self.inner.replay {
            let current = self.value();
            if let Some(value) = current {
                observer.next(value);
            }
        }

        let subject: Weak<SubjectInner<T>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(subject) = subject.upgrade() {
                subject.observers.borrow_mut().shift_remove(&key);
            }
        })
    }
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject")
            .field("value", &self.value())
            .field("observers", &self.observer_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting(log: &Rc<RefCell<Vec<i32>>>) -> Observer<i32> {
        let log = log.clone();
        Observer::new(move |v| log.borrow_mut().push(v), |_| {}, || {})
    }

    #[test]
    fn multicasts_to_all_observers() {
        let subject = Subject::new();
        let (a, b) = (Rc::new(RefCell::new(Vec::new())), Rc::new(RefCell::new(Vec::new())));

        let _sa = subject.clone().subscribe(collecting(&a));
        let _sb = subject.clone().subscribe(collecting(&b));
        subject.next(1);
        subject.next(2);

        assert_eq!(*a.borrow(), vec![1, 2]);
        assert_eq!(*b.borrow(), vec![1, 2]);
        assert_eq!(subject.value(), None);
    }

    #[test]
    fn with_value_replays_on_subscribe() {
        let subject = Subject::with_value(5);
        subject.next(6);

        let log = Rc::new(RefCell::new(Vec::new()));
        let _subscription = subject.clone().subscribe(collecting(&log));

        assert_eq!(*log.borrow(), vec![6]);
        assert_eq!(subject.value(), Some(6));
    }

    #[test]
    fn unsubscribe_removes_observer() {
        let subject = Subject::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let subscription = subject.clone().subscribe(collecting(&log));
        assert_eq!(subject.observer_count(), 1);

        drop(subscription);
        assert_eq!(subject.observer_count(), 0);

        subject.next(1);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn late_subscriber_sees_completion() {
        let subject = Subject::<i32>::new();
        subject.complete();
        subject.next(1);

        let completed = Rc::new(Cell::new(false));
        let observer = Observer::new(|_| {}, |_| {}, {
            let completed = completed.clone();
            move || completed.set(true)
        });
        let subscription = subject.subscribe(observer);

        assert!(completed.get());
        assert!(subscription.is_closed());
    }
}
