//! Async Bridge
//!
//! Connects push-based sources to the pull-based graph. A source pushes
//! values whenever it likes; the bridge records the latest one in a private
//! signal, and readers pull it through a [`PushSignal`] like any other
//! reactive value.
//!
//! # Sources
//!
//! - [`Subject`]: hand-driven multicast, optionally replaying its latest value.
//! - [`StreamSource`] / [`TryStreamSource`]: any `futures_util::Stream`.
//! - [`FutureSource`]: a single value from a future.
//!
//! Anything else can take part by implementing [`PushSource`].

mod push;
mod source;
mod subject;

pub use push::{from_future, from_push, from_stream, from_try_stream, PushSignal};
pub use source::{FutureSource, Observer, PushSource, StreamSource, Subscription, TryStreamSource};
pub use subject::Subject;
