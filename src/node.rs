//! Transaction node: per-transaction read/write sets, the node's
//! outgoing/incoming dependency edges, and its place in the graph's lived
//! list.

use crate::alloc::Allocator;
use crate::edgemap::EdgeMap;
use crate::hashset::{BloomParams, HybridSet};

/// Opaque, non-owning handle to a node living in some [`crate::Graph`]'s
/// arena. Only ever produced by, and only ever resolved against, the
/// graph that created it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeKey(usize);

impl NodeKey {
    pub(crate) fn new(index: usize) -> Self {
        NodeKey(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0
    }

    /// Never a valid arena index; used only as a placeholder payload for
    /// empty edge-map slots, which are never read before being checked
    /// for emptiness.
    pub(crate) fn dangling() -> Self {
        NodeKey(usize::MAX)
    }

    #[cfg(test)]
    pub(crate) fn for_test(index: usize) -> Self {
        NodeKey(index)
    }
}

/// A transaction's lifecycle state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NodeState {
    Active,
    NoMem,
    Committed,
    RolledBack,
    Released,
}

impl NodeState {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeState::Active => "ACTIVE",
            NodeState::NoMem => "NOMEM",
            NodeState::Committed => "COMMIT",
            NodeState::RolledBack => "ROLLBACK",
            NodeState::Released => "RELEASED",
        }
    }
}

pub(crate) struct Node<A: Allocator> {
    pub(crate) ident: u64,
    pub(crate) state: NodeState,
    pub(crate) prev: Option<NodeKey>,
    pub(crate) next: Option<NodeKey>,
    /// GC mark bit, cleared again at the end of every sweep.
    pub(crate) reached: bool,
    pub(crate) hasreads: bool,
    pub(crate) haswrites: bool,
    pub(crate) hasdeps: bool,
    pub(crate) reads: HybridSet<A>,
    pub(crate) writes: HybridSet<A>,
    pub(crate) outs: EdgeMap<A>,
    pub(crate) ins: EdgeMap<A>,
    pub(crate) label: String,
}

impl<A: Allocator> Node<A> {
    pub(crate) fn new(ident: u64, bloom: BloomParams, alloc: A) -> Self {
        Node {
            ident,
            state: NodeState::Active,
            prev: None,
            next: None,
            reached: false,
            hasreads: false,
            haswrites: false,
            hasdeps: false,
            reads: HybridSet::new(bloom, alloc.clone()),
            writes: HybridSet::new(bloom, alloc.clone()),
            outs: EdgeMap::new(alloc.clone()),
            ins: EdgeMap::new(alloc),
            label: format!("T({ident})"),
        }
    }
}
