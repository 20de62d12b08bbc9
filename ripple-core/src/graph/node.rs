//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//!
//! A node plays one or both of two roles. As a *producer* it is read and
//! tracked by others and carries a version. As a *consumer* it reads other
//! nodes and records which versions it saw. Signals are producers only,
//! effects are consumers only, computeds are both.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use super::version::Version;

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A source node (signal). Producer only.
    Signal,

    /// A derived node (computed). Producer and consumer at once; it caches
    /// its value and forwards dirtiness to its own dependents.
    Computed,

    /// An effect node. Consumer only; it is scheduled instead of read.
    Effect,
}

impl NodeKind {
    /// Whether nodes of this kind read others and record dependencies.
    pub fn is_consumer(self) -> bool {
        matches!(self, NodeKind::Computed | NodeKind::Effect)
    }
}

/// Evaluation status of a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerStatus {
    /// Never ran.
    Unset,

    /// The body is running right now. Reading the node in this state is a cycle.
    Computing,

    /// The last run succeeded.
    Clean,

    /// The last run failed; the error is cached.
    Errored,
}

/// Snapshot of a producer's version at the moment a consumer read it.
pub(crate) struct DependencyRecord {
    pub(crate) producer: Rc<dyn ReactiveNode>,
    pub(crate) producer_id: NodeId,
    pub(crate) version_seen: Version,
}

/// A consumer that is live on some producer, held weakly.
pub(crate) struct LiveConsumer {
    pub(crate) id: NodeId,
    pub(crate) node: Weak<dyn ReactiveNode>,
}

/// Mutable bookkeeping shared by all node kinds.
pub(crate) struct NodeState {
    /// Producer role: version of the current value.
    pub(crate) version: Version,

    /// Consumer role: a producer may have changed since the last run.
    pub(crate) dirty: bool,

    /// Consumer role: evaluation status.
    pub(crate) status: ConsumerStatus,

    /// Consumer role: epoch at which the node last verified it was up to date.
    pub(crate) last_clean_epoch: Version,

    /// Consumer role: producers read during the current (or most recent) run.
    pub(crate) dependencies: SmallVec<[DependencyRecord; 4]>,

    /// Consumer role: producers read during the previous run, held while the
    /// current run rebuilds `dependencies`.
    pub(crate) stale_dependencies: SmallVec<[DependencyRecord; 4]>,

    /// Producer role: consumers that must be notified eagerly.
    pub(crate) live_consumers: SmallVec<[LiveConsumer; 2]>,

    /// Effects only: the node no longer takes part in the graph.
    pub(crate) destroyed: bool,
}

/// The kind-independent part of every node.
pub(crate) struct NodeCore {
    id: NodeId,
    kind: NodeKind,
    allow_signal_writes: bool,
    state: RefCell<NodeState>,
}

impl NodeCore {
    /// Create a new node core with the given kind.
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self::with_writes(kind, false)
    }

    /// Create a node core whose body may write to signals (effects only).
    pub(crate) fn with_writes(kind: NodeKind, allow_signal_writes: bool) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            allow_signal_writes,
            state: RefCell::new(NodeState {
                version: 0,
                // Consumers start dirty to ensure the first run
                dirty: kind.is_consumer(),
                status: ConsumerStatus::Unset,
                last_clean_epoch: 0,
                dependencies: SmallVec::new(),
                stale_dependencies: SmallVec::new(),
                live_consumers: SmallVec::new(),
                destroyed: false,
            }),
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn kind(&self) -> NodeKind {
        self.kind
    }

    pub(crate) fn allows_signal_writes(&self) -> bool {
        self.allow_signal_writes
    }

    pub(crate) fn state(&self) -> Ref<'_, NodeState> {
        self.state.borrow()
    }

    pub(crate) fn state_mut(&self) -> RefMut<'_, NodeState> {
        self.state.borrow_mut()
    }

    pub(crate) fn version(&self) -> Version {
        self.state.borrow().version
    }

    pub(crate) fn status(&self) -> ConsumerStatus {
        self.state.borrow().status
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.state.borrow().dirty
    }

    /// A live consumer receives eager dirty notifications. Effects are live
    /// until destroyed; computeds are live while something live reads them.
    pub(crate) fn is_live(&self) -> bool {
        let state = self.state.borrow();
        match self.kind {
            NodeKind::Effect => !state.destroyed,
            NodeKind::Computed => !state.live_consumers.is_empty(),
            NodeKind::Signal => false,
        }
    }

    pub(crate) fn dependency_count(&self) -> usize {
        self.state.borrow().dependencies.len()
    }

    pub(crate) fn live_consumer_count(&self) -> usize {
        self.state
            .borrow()
            .live_consumers
            .iter()
            .filter(|c| c.node.strong_count() > 0)
            .count()
    }
}

/// A node in the dependency graph.
///
/// The graph algorithms dispatch on [`NodeKind`]; the two hooks below are the
/// only kind-specific behavior and are only called for the matching kind.
pub(crate) trait ReactiveNode {
    /// Shared bookkeeping.
    fn core(&self) -> &NodeCore;

    /// Computed only: rerun the body and store its result.
    fn recompute(&self) {}

    /// Effect only: the node transitioned from clean to dirty.
    fn consumer_marked_dirty(&self) {}
}
