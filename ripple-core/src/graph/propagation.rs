//! Change Propagation
//!
//! Push-pull propagation over the producer/consumer graph.
//!
//! - **Push**: when a producer changes, live consumers are marked dirty.
//!   Dirtiness travels through a computed only when that computed goes from
//!   clean to dirty, and effects reached this way are handed to the scheduler.
//!   No user code runs during this phase.
//!
//! - **Pull**: when a computed is read, it decides whether its cached value is
//!   still valid. A live, clean computed is valid as is. Otherwise it polls
//!   the producers it read last time (refreshing computed producers first)
//!   and recomputes only if one of their versions moved.
//!
//! Non-live computeds never receive pushes; they always discover staleness by
//! pulling. The global epoch lets them skip the poll entirely when nothing on
//! the thread has changed since they last verified themselves.

use std::rc::Rc;

use smallvec::SmallVec;

use super::node::{ConsumerStatus, DependencyRecord, LiveConsumer, NodeCore, NodeId, NodeKind, ReactiveNode};
use super::version::{current_epoch, next_version, Version};
use crate::error::ReactiveError;
use crate::reactive::context::ReactiveContext;

type NodeList = SmallVec<[Rc<dyn ReactiveNode>; 4]>;

/// Record that `producer` was read by the active consumer, if there is one.
///
/// Reads are deduplicated by producer; a repeated read refreshes the recorded
/// version. A live consumer subscribes to a producer the first time it sees it.
pub(crate) fn producer_accessed(producer: &Rc<dyn ReactiveNode>) {
    let Some(consumer) = ReactiveContext::active_consumer() else {
        return;
    };

    let producer_id = producer.core().id();
    let version = producer.core().version();

    let newly_tracked = {
        let mut state = consumer.core().state_mut();
        if let Some(record) = state
            .dependencies
            .iter_mut()
            .find(|record| record.producer_id == producer_id)
        {
            record.version_seen = version;
            return;
        }

        state.dependencies.push(DependencyRecord {
            producer: Rc::clone(producer),
            producer_id,
            version_seen: version,
        });

        !state
            .stale_dependencies
            .iter()
            .any(|record| record.producer_id == producer_id)
    };

    if newly_tracked && consumer.core().is_live() {
        producer_add_live_consumer(producer, &consumer);
    }
}

/// Bring a computed's value up to date. Signals and effects are always current.
///
/// Fails only when the node is in the middle of its own computation.
pub(crate) fn producer_update_value_version(node: &Rc<dyn ReactiveNode>) -> Result<(), ReactiveError> {
    let core = node.core();
    if core.kind() != NodeKind::Computed {
        return Ok(());
    }

    let (status, dirty, last_clean_epoch) = {
        let state = core.state();
        (state.status, state.dirty, state.last_clean_epoch)
    };

    if status == ConsumerStatus::Computing {
        return Err(ReactiveError::CyclicComputation);
    }

    let has_run = status != ConsumerStatus::Unset;

    if has_run && !dirty && core.is_live() {
        return Ok(());
    }

    if has_run && !dirty && last_clean_epoch == current_epoch() {
        return Ok(());
    }

    if has_run && !consumer_poll_producers_for_change(node) {
        mark_clean(core);
        return Ok(());
    }

    node.recompute();
    mark_clean(core);
    Ok(())
}

fn mark_clean(core: &NodeCore) {
    let mut state = core.state_mut();
    state.dirty = false;
    state.last_clean_epoch = current_epoch();
}

/// Whether any producer read during the consumer's last run has a newer
/// version than the one recorded.
pub(crate) fn consumer_poll_producers_for_change(node: &Rc<dyn ReactiveNode>) -> bool {
    let records: SmallVec<[(Rc<dyn ReactiveNode>, Version); 4]> = node
        .core()
        .state()
        .dependencies
        .iter()
        .map(|record| (Rc::clone(&record.producer), record.version_seen))
        .collect();

    for (producer, seen) in records {
        if producer.core().version() != seen {
            return true;
        }

        // A cycle counts as a change so the consumer reruns and surfaces it.
        if producer_update_value_version(&producer).is_err() {
            return true;
        }

        if producer.core().version() != seen {
            return true;
        }
    }

    false
}

/// Start a run: clear the dirty flag and set aside the previous dependencies.
pub(crate) fn consumer_before_computation(node: &dyn ReactiveNode) {
    let mut state = node.core().state_mut();
    state.dirty = false;
    let previous = std::mem::take(&mut state.dependencies);
    state.stale_dependencies = previous;
}

/// Finish a run: drop dependencies that were not read again and, for live
/// consumers, unsubscribe from them.
pub(crate) fn consumer_after_computation(node: &dyn ReactiveNode) {
    let core = node.core();

    let dropped: SmallVec<[DependencyRecord; 4]> = {
        let mut state = core.state_mut();
        let stale = std::mem::take(&mut state.stale_dependencies);
        stale
            .into_iter()
            .filter(|old| {
                !state
                    .dependencies
                    .iter()
                    .any(|record| record.producer_id == old.producer_id)
            })
            .collect()
    };

    if core.is_live() {
        for record in &dropped {
            producer_remove_live_consumer(&record.producer, core.id());
        }
    }
}

/// Detach a consumer from the graph for good.
pub(crate) fn consumer_destroy(node: &dyn ReactiveNode) {
    let core = node.core();

    let records: SmallVec<[DependencyRecord; 4]> = {
        let mut state = core.state_mut();
        state.destroyed = true;
        state.dirty = false;
        let mut records = std::mem::take(&mut state.dependencies);
        records.extend(std::mem::take(&mut state.stale_dependencies));
        records
    };

    for record in &records {
        producer_remove_live_consumer(&record.producer, core.id());
    }
}

/// Subscribe `consumer` to eager notifications from `producer`. A computed
/// that gains its first live consumer becomes live itself and subscribes to
/// its own producers.
pub(crate) fn producer_add_live_consumer(producer: &Rc<dyn ReactiveNode>, consumer: &Rc<dyn ReactiveNode>) {
    let core = producer.core();
    let consumer_id = consumer.core().id();

    let became_live = {
        let mut state = core.state_mut();
        state.live_consumers.retain(|c| c.node.strong_count() > 0);
        if state.live_consumers.iter().any(|c| c.id == consumer_id) {
            return;
        }
        let was_live = !state.live_consumers.is_empty();
        state.live_consumers.push(LiveConsumer {
            id: consumer_id,
            node: Rc::downgrade(consumer),
        });
        !was_live
    };

    if became_live && core.kind() == NodeKind::Computed {
        for dependency in dependencies_of(core) {
            producer_add_live_consumer(&dependency, producer);
        }
    }
}

/// Undo [`producer_add_live_consumer`]. A computed that loses its last live
/// consumer unsubscribes from its own producers.
pub(crate) fn producer_remove_live_consumer(producer: &Rc<dyn ReactiveNode>, consumer_id: NodeId) {
    let core = producer.core();

    let became_idle = {
        let mut state = core.state_mut();
        let before = state.live_consumers.len();
        state
            .live_consumers
            .retain(|c| c.id != consumer_id && c.node.strong_count() > 0);
        before > 0 && state.live_consumers.is_empty()
    };

    if became_idle && core.kind() == NodeKind::Computed {
        for dependency in dependencies_of(core) {
            producer_remove_live_consumer(&dependency, core.id());
        }
    }
}

fn dependencies_of(core: &NodeCore) -> NodeList {
    core.state()
        .dependencies
        .iter()
        .map(|record| Rc::clone(&record.producer))
        .collect()
}

/// Mark every live consumer of `node` dirty, transitively through computeds
/// that were clean, and hand newly dirty effects to the scheduler.
pub(crate) fn producer_notify_consumers(node: &Rc<dyn ReactiveNode>) {
    let consumers: NodeList = node
        .core()
        .state()
        .live_consumers
        .iter()
        .filter_map(|c| c.node.upgrade())
        .collect();

    for consumer in consumers {
        let core = consumer.core();
        let newly_dirty = {
            let mut state = core.state_mut();
            if state.dirty || state.destroyed {
                false
            } else {
                state.dirty = true;
                true
            }
        };

        if !newly_dirty {
            continue;
        }

        match core.kind() {
            NodeKind::Computed => producer_notify_consumers(&consumer),
            NodeKind::Effect => consumer.consumer_marked_dirty(),
            NodeKind::Signal => {}
        }
    }
}

/// Give a producer a fresh version and notify its live consumers.
pub(crate) fn producer_value_changed(node: &Rc<dyn ReactiveNode>) {
    node.core().state_mut().version = next_version();
    producer_notify_consumers(node);
}

/// Writes are allowed outside any consumer, inside `untracked`, and inside
/// effects created with `allow_signal_writes`.
pub(crate) fn producer_updates_allowed() -> Result<(), ReactiveError> {
    let Some(consumer) = ReactiveContext::active_consumer() else {
        return Ok(());
    };

    match consumer.core().kind() {
        NodeKind::Effect if !consumer.core().allows_signal_writes() => {
            Err(ReactiveError::SignalWriteDuringEffect)
        }
        NodeKind::Computed => Err(ReactiveError::SignalWriteDuringComputation),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::BareNode;

    fn as_node(node: &Rc<BareNode>) -> Rc<dyn ReactiveNode> {
        Rc::clone(node) as Rc<dyn ReactiveNode>
    }

    #[test]
    fn access_outside_consumer_records_nothing() {
        let signal = as_node(&BareNode::new(NodeKind::Signal));
        producer_accessed(&signal);
        assert_eq!(signal.core().live_consumer_count(), 0);
    }

    #[test]
    fn access_records_dependency_once() {
        let signal = as_node(&BareNode::new(NodeKind::Signal));
        let consumer = BareNode::new(NodeKind::Computed);

        {
            let _ctx = ReactiveContext::enter(as_node(&consumer));
            producer_accessed(&signal);
            producer_accessed(&signal);
        }

        assert_eq!(consumer.core.dependency_count(), 1);
        // Not live, so the signal does not know about it
        assert_eq!(signal.core().live_consumer_count(), 0);
    }

    #[test]
    fn live_consumer_subscribes_on_access() {
        let signal = as_node(&BareNode::new(NodeKind::Signal));
        let effect = BareNode::new(NodeKind::Effect);

        consumer_before_computation(&*effect);
        {
            let _ctx = ReactiveContext::enter(as_node(&effect));
            producer_accessed(&signal);
        }
        consumer_after_computation(&*effect);

        assert_eq!(signal.core().live_consumer_count(), 1);
    }

    #[test]
    fn dropped_dependencies_are_unsubscribed() {
        let a = as_node(&BareNode::new(NodeKind::Signal));
        let b = as_node(&BareNode::new(NodeKind::Signal));
        let effect = BareNode::new(NodeKind::Effect);

        let run = |reads: &[&Rc<dyn ReactiveNode>]| {
            consumer_before_computation(&*effect);
            {
                let _ctx = ReactiveContext::enter(as_node(&effect));
                for producer in reads {
                    producer_accessed(producer);
                }
            }
            consumer_after_computation(&*effect);
        };

        run(&[&a, &b]);
        assert_eq!(a.core().live_consumer_count(), 1);
        assert_eq!(b.core().live_consumer_count(), 1);

        run(&[&a]);
        assert_eq!(a.core().live_consumer_count(), 1);
        assert_eq!(b.core().live_consumer_count(), 0);
        assert_eq!(effect.core.dependency_count(), 1);
    }

    #[test]
    fn value_change_marks_live_consumer_dirty() {
        let signal = as_node(&BareNode::new(NodeKind::Signal));
        let effect = BareNode::new(NodeKind::Effect);

        consumer_before_computation(&*effect);
        {
            let _ctx = ReactiveContext::enter(as_node(&effect));
            producer_accessed(&signal);
        }
        consumer_after_computation(&*effect);
        assert!(!effect.core.is_dirty());

        let before = signal.core().version();
        producer_value_changed(&signal);

        assert!(signal.core().version() > before);
        assert!(effect.core.is_dirty());
        assert!(consumer_poll_producers_for_change(&as_node(&effect)));
    }

    #[test]
    fn destroyed_consumer_detaches() {
        let signal = as_node(&BareNode::new(NodeKind::Signal));
        let effect = BareNode::new(NodeKind::Effect);

        consumer_before_computation(&*effect);
        {
            let _ctx = ReactiveContext::enter(as_node(&effect));
            producer_accessed(&signal);
        }
        consumer_after_computation(&*effect);

        consumer_destroy(&*effect);
        assert_eq!(signal.core().live_consumer_count(), 0);
        assert_eq!(effect.core.dependency_count(), 0);

        producer_value_changed(&signal);
        assert!(!effect.core.is_dirty());
    }

    #[test]
    fn writes_rejected_inside_consumers() {
        assert!(producer_updates_allowed().is_ok());

        let computed = BareNode::new(NodeKind::Computed);
        {
            let _ctx = ReactiveContext::enter(as_node(&computed));
            assert!(matches!(
                producer_updates_allowed(),
                Err(ReactiveError::SignalWriteDuringComputation)
            ));
        }

        let effect = BareNode::new(NodeKind::Effect);
        {
            let _ctx = ReactiveContext::enter(as_node(&effect));
            assert!(matches!(
                producer_updates_allowed(),
                Err(ReactiveError::SignalWriteDuringEffect)
            ));

            let _untracked = ReactiveContext::untracked();
            assert!(producer_updates_allowed().is_ok());
        }
    }
}
