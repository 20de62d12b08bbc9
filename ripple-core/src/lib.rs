//! Ripple Core
//!
//! This crate provides a fine-grained reactive computation engine. It
//! implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - Push-pull change propagation with versioned dependencies
//! - A batching effect scheduler with a pluggable microtask boundary
//! - A bridge from push sources (subjects, streams, futures) into the graph
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Signals, computeds, effects and the tracking context
//! - `graph`: The producer/consumer graph, versions and the effect scheduler
//! - `bridge`: Push sources and the signals that expose them
//! - `options`: Per-primitive configuration
//! - `error`: The crate error type
//!
//! The engine is single-threaded. Every thread has its own graph, tracking
//! context and scheduler; reactive handles are neither `Send` nor `Sync`.
//!
//! # Example
//!
//! ```rust
//! use ripple_core::reactive::{Computed, Effect, Runtime, Signal};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let doubled = Computed::new({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let _effect = Effect::try_new({
//!     let (doubled, log) = (doubled.clone(), log.clone());
//!     move |_| {
//!         log.borrow_mut().push(doubled.get()?);
//!         Ok(())
//!     }
//! });
//!
//! // Update the signal twice in one turn
//! count.set(5).unwrap();
//! count.set(6).unwrap();
//!
//! // Effects run once per batch, at the microtask boundary
//! Runtime::run_microtasks().unwrap();
//! assert_eq!(*log.borrow(), vec![12]);
//! ```

pub mod bridge;
pub mod error;
pub mod graph;
pub mod options;
pub mod reactive;

pub use bridge::{from_future, from_push, from_stream, from_try_stream, PushSignal, Subject};
pub use error::ReactiveError;
pub use options::{ComputedOptions, EffectOptions, Fallback, FromPushOptions, SignalOptions};
pub use reactive::{
    computed, effect, signal, signal_with, try_computed, try_effect, untracked, Computed, Effect, OnCleanup,
    ReadonlySignal, Runtime, Signal,
};
