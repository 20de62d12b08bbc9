//! Integration Tests for the Async Bridge
//!
//! These tests drive streams and futures on a tokio `LocalSet` and check that
//! their values reach computeds and effects.

use std::cell::RefCell;
use std::rc::Rc;

use futures_util::stream;
use tokio::sync::mpsc;
use tokio::task::LocalSet;

use ripple_core::bridge::{from_future, from_stream, from_try_stream, PushSignal};
use ripple_core::reactive::{Computed, Effect, Runtime, TokioMicrotasks};
use ripple_core::{FromPushOptions, ReactiveError};

/// Let spawned local tasks run to quiescence.
async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn channel_stream(rx: mpsc::UnboundedReceiver<i32>) -> impl futures_util::Stream<Item = i32> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|value| (value, rx)) })
}

/// Test that stream emissions reach effects through the tokio microtask
/// scheduler.
#[tokio::test]
async fn stream_values_flow_into_effects() {
    LocalSet::new()
        .run_until(async {
            Runtime::set_microtask_scheduler(Rc::new(TokioMicrotasks));

            let (tx, rx) = mpsc::unbounded_channel();
            let latest = from_stream(channel_stream(rx), FromPushOptions::initial(0));

            let seen = Rc::new(RefCell::new(Vec::new()));
            let _effect = Effect::try_new({
                let (latest, seen) = (latest.clone(), seen.clone());
                move |_| {
                    seen.borrow_mut().push(latest.get()?);
                    Ok(())
                }
            });

            settle().await;
            assert_eq!(*seen.borrow(), vec![0]);

            tx.send(1).unwrap();
            settle().await;
            assert_eq!(*seen.borrow(), vec![0, 1]);

            tx.send(2).unwrap();
            tx.send(3).unwrap();
            settle().await;
            assert_eq!(seen.borrow().last(), Some(&3));
            assert_eq!(Runtime::pending_effects(), 0);
        })
        .await;
}

/// Test that a require-sync bridge fails until its future resolves.
#[tokio::test]
async fn future_require_sync() {
    LocalSet::new()
        .run_until(async {
            let answer = from_future(
                async {
                    tokio::task::yield_now().await;
                    42
                },
                FromPushOptions::require_sync(),
            );

            assert!(matches!(answer.get(), Err(ReactiveError::RequireSyncViolation)));

            settle().await;
            assert_eq!(answer.get().unwrap(), 42);
            assert_eq!(answer.get().unwrap(), 42);
        })
        .await;
}

/// Test that a failing stream leaves the bridge in the error state.
#[tokio::test]
async fn try_stream_error_is_sticky() {
    LocalSet::new()
        .run_until(async {
            let items: Vec<Result<i32, &'static str>> = vec![Ok(1), Err("connection reset"), Ok(3)];
            let latest = from_try_stream(stream::iter(items), FromPushOptions::initial(0));

            settle().await;

            let err = latest.get().unwrap_err();
            assert!(matches!(err, ReactiveError::Source(_)));
            assert_eq!(err.to_string(), "push source failed: connection reset");
        })
        .await;
}

/// Test that a computed over a bridge sees the bridge's errors.
#[tokio::test]
async fn computed_over_bridge_propagates_errors() {
    LocalSet::new()
        .run_until(async {
            let items: Vec<Result<i32, &'static str>> = vec![Ok(2), Err("gone")];
            let latest = from_try_stream(stream::iter(items), FromPushOptions::require_sync());
            let doubled = Computed::try_new({
                let latest = latest.clone();
                move || latest.get().map(|n| n * 2)
            });

            assert!(matches!(doubled.get(), Err(ReactiveError::RequireSyncViolation)));

            settle().await;
            assert!(matches!(doubled.get(), Err(ReactiveError::Source(_))));
        })
        .await;
}

/// Test that a lazy bridge does not subscribe until it is read.
#[tokio::test]
async fn lazy_stream_connects_on_first_read() {
    LocalSet::new()
        .run_until(async {
            let latest = from_stream(stream::iter(vec![5, 6]), FromPushOptions::initial(0).lazy());
            assert!(!latest.is_connected());

            settle().await;
            assert_eq!(latest.as_computed().get().unwrap(), 0);
            assert!(!latest.is_connected());

            assert_eq!(latest.get().unwrap(), 0);
            assert!(latest.is_connected());

            settle().await;
            assert_eq!(latest.get().unwrap(), 6);
        })
        .await;
}

/// Test that dispose stops the stream task.
#[tokio::test]
async fn dispose_stops_the_stream() {
    LocalSet::new()
        .run_until(async {
            let (tx, rx) = mpsc::unbounded_channel();
            let latest = from_stream(channel_stream(rx), FromPushOptions::initial(0));

            tx.send(1).unwrap();
            settle().await;
            assert_eq!(latest.get().unwrap(), 1);

            latest.dispose();
            settle().await;

            assert!(!latest.is_connected());
            assert!(tx.is_closed());
            assert!(tx.send(2).is_err());
            assert_eq!(latest.get().unwrap(), 1);
        })
        .await;
}

/// Test that dropping the last handle stops the stream task.
#[tokio::test]
async fn dropping_bridge_stops_the_stream() {
    LocalSet::new()
        .run_until(async {
            let (tx, rx) = mpsc::unbounded_channel();
            let latest: PushSignal<i32> = from_stream(channel_stream(rx), FromPushOptions::initial(0));

            settle().await;
            assert!(!tx.is_closed());

            drop(latest);
            settle().await;
            assert!(tx.is_closed());
        })
        .await;
}

/// Test that completion keeps the last value.
#[tokio::test]
async fn completed_stream_keeps_last_value() {
    LocalSet::new()
        .run_until(async {
            let latest = from_stream(stream::iter(vec![1, 2, 3]), FromPushOptions::require_sync());

            settle().await;
            assert_eq!(latest.get().unwrap(), 3);
        })
        .await;
}
