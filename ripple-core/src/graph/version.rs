//! Versioning and Equality
//!
//! Every producer carries a version. Versions come from a single counter per
//! thread, so a version is also a global "epoch": if the counter has not moved
//! since a computed last verified itself, nothing anywhere has changed.

use std::cell::Cell;
use std::rc::Rc;

/// A monotonically increasing change marker.
pub type Version = u64;

/// Pluggable equality used to suppress no-op writes and recomputations.
pub type EqualFn<T> = Rc<dyn Fn(&T, &T) -> bool>;

thread_local! {
    static EPOCH: Cell<Version> = const { Cell::new(0) };
}

/// Advance the counter and return the new version.
pub(crate) fn next_version() -> Version {
    EPOCH.with(|epoch| {
        let next = epoch.get() + 1;
        epoch.set(next);
        next
    })
}

/// The latest version handed out on this thread.
pub(crate) fn current_epoch() -> Version {
    EPOCH.with(Cell::get)
}

/// Equality based on `PartialEq`.
pub fn default_equal<T: PartialEq + 'static>() -> EqualFn<T> {
    Rc::new(|a: &T, b: &T| a == b)
}

/// Equality that never holds; every write counts as a change.
pub fn never_equal<T: 'static>() -> EqualFn<T> {
    Rc::new(|_: &T, _: &T| false)
}
