//! Dependency Graph
//!
//! This module implements the producer/consumer graph that connects signals,
//! computeds and effects.
//!
//! # Overview
//!
//! - Nodes are producers (signals), consumers (effects), or both (computeds).
//! - Each consumer keeps an exact list of the producers it read during its
//!   most recent run, together with the version it saw for each. The list is
//!   rebuilt on every run, so conditional reads never leave stale edges.
//! - Each producer keeps the set of *live* consumers, those that are reachable
//!   from an effect. Only live consumers are notified eagerly; everything
//!   else finds out it is stale when it is read.
//!
//! # Design Decisions
//!
//! 1. The graph is distributed across the nodes rather than kept in a
//!    central table, so a node and its edges are freed together.
//!
//! 2. Producers hold their live consumers weakly. Consumers hold their
//!    producers strongly, and effects are rooted by the scheduler until they
//!    are destroyed.
//!
//! 3. Node behavior is selected by a closed [`NodeKind`] tag rather than a
//!    type hierarchy; a computed is simply a node tagged as both roles.

mod node;
pub(crate) mod propagation;
pub(crate) mod scheduler;
mod version;

pub use node::{ConsumerStatus, NodeId, NodeKind};
pub use version::{default_equal, never_equal, EqualFn, Version};

pub(crate) use node::{NodeCore, ReactiveNode};
pub(crate) use version::next_version;

#[cfg(test)]
pub(crate) use node::test_support;
