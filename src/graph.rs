//! The graph: owns the arena of transaction nodes, the ident counter, the
//! GC policy, and the public read/write/commit/rollback operations that
//! build the conflict graph between overlapping transactions.

use std::cell::Cell;
use std::num::NonZeroU32;

use crate::alloc::{Allocator, SystemAllocator};
use crate::edgemap::EdgeKind;
use crate::hashset::BloomParams;
use crate::node::{Node, NodeKey, NodeState};

thread_local! {
    static OOM: Cell<bool> = Cell::new(false);
}

/// True iff the most recent `commit` on this thread failed because the
/// node had gone NOMEM. Mirrors the original's single per-thread latch;
/// see [`Graph::commit_detailed`] for a non-ambient alternative.
pub fn oom() -> bool {
    OOM.with(|cell| cell.get())
}

fn set_oom(value: bool) {
    OOM.with(|cell| cell.set(value));
}

/// Automatic-GC policy. Spec.md's own Open Questions flag the original
/// `autogc: int` (0 means "use the 1000 default", negative is documented
/// to mean "disabled" but the reference implementation only gates on
/// `autogc > 0`) as ambiguous; this type removes the ambiguity by no
/// longer conflating "unset" with "disabled" with "zero".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Autogc {
    /// No automatic GC; only explicit `Graph::gc` calls collect.
    Disabled,
    /// Run a full mark-sweep after this many deactivations.
    Threshold(NonZeroU32),
}

impl Default for Autogc {
    fn default() -> Self {
        Autogc::Threshold(NonZeroU32::new(1000).unwrap())
    }
}

/// Construction options for a [`Graph`].
pub struct GraphOpts<A: Allocator = SystemAllocator> {
    pub allocator: A,
    /// Bloom filter target element count. Zero selects the default
    /// (1,000,000).
    pub n: u64,
    /// Bloom filter target false-positive rate. Must be in `(0, inf)` and
    /// finite, otherwise the default (0.01) is used.
    pub p: f64,
    pub autogc: Autogc,
}

impl<A: Allocator + Default> Default for GraphOpts<A> {
    fn default() -> Self {
        GraphOpts {
            allocator: A::default(),
            n: 0,
            p: 0.0,
            autogc: Autogc::default(),
        }
    }
}

impl GraphOpts<SystemAllocator> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<A: Allocator> GraphOpts<A> {
    /// Builds options around a caller-supplied allocator, useful when `A`
    /// has no `Default` impl of its own.
    pub fn with_allocator(allocator: A) -> Self {
        GraphOpts {
            allocator,
            n: 0,
            p: 0.0,
            autogc: Autogc::default(),
        }
    }
}

/// Result of [`Graph::commit_detailed`]: the commit's boolean outcome
/// plus the OOM flag, for callers who'd rather not read it back out of
/// thread-local state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitOutcome {
    pub committed: bool,
    pub was_oom: bool,
}

/// The conflict graph. Not internally synchronized — see the crate's
/// concurrency model: all operations against one graph and its nodes must
/// be serialized by the caller.
pub struct Graph<A: Allocator = SystemAllocator> {
    nodes: Vec<Option<Node<A>>>,
    free_slots: Vec<usize>,
    head: Option<NodeKey>,
    tail: Option<NodeKey>,
    ident: u64,
    gc_counter: u32,
    autogc: Autogc,
    bloom: BloomParams,
    alloc: A,
}

impl<A: Allocator> Graph<A> {
    /// Creates a new graph. Returns `None` on allocator failure.
    pub fn new(opts: GraphOpts<A>) -> Option<Self> {
        if !opts.allocator.try_alloc() {
            return None;
        }
        let n = if opts.n == 0 { 1_000_000 } else { opts.n };
        let p = if opts.p > 0.0 && opts.p.is_finite() {
            opts.p
        } else {
            0.01
        };
        Some(Graph {
            nodes: Vec::new(),
            free_slots: Vec::new(),
            head: None,
            tail: None,
            ident: 0,
            gc_counter: 0,
            autogc: opts.autogc,
            bloom: BloomParams::compute(n, p),
            alloc: opts.allocator,
        })
    }

    /// Begins a new ACTIVE transaction. Returns `None` on allocator
    /// failure.
    pub fn begin(&mut self) -> Option<NodeKey> {
        if !self.alloc.try_alloc() {
            return None;
        }
        self.ident += 1;
        let node = Node::new(self.ident, self.bloom, self.alloc.clone());
        Some(self.push_node(node))
    }

    /// Records a read of `hash` by `node`. A no-op if the node has gone
    /// NOMEM; transitions it to NOMEM on allocation failure.
    pub fn read(&mut self, node: NodeKey, hash: u64) {
        debug_assert!(matches!(
            self.node(node).state,
            NodeState::Active | NodeState::NoMem
        ));
        if self.node(node).state == NodeState::NoMem {
            return;
        }
        if !self.node_mut(node).reads.add(hash) {
            self.node_mut(node).state = NodeState::NoMem;
            return;
        }
        self.node_mut(node).hasreads = true;

        for other in self.live_keys_excluding(node) {
            if self.node(other).writes.test(hash) && !self.add_dep(other, node, EdgeKind::Wr) {
                self.node_mut(node).state = NodeState::NoMem;
                return;
            }
        }
    }

    /// Records a write of `hash` by `node`. A no-op if the node has gone
    /// NOMEM; transitions it to NOMEM on allocation failure.
    pub fn write(&mut self, node: NodeKey, hash: u64) {
        debug_assert!(matches!(
            self.node(node).state,
            NodeState::Active | NodeState::NoMem
        ));
        if self.node(node).state == NodeState::NoMem {
            return;
        }
        if !self.node_mut(node).writes.add(hash) {
            self.node_mut(node).state = NodeState::NoMem;
            return;
        }
        self.node_mut(node).haswrites = true;

        for other in self.live_keys_excluding(node) {
            if self.node(other).reads.test(hash) && !self.add_dep(other, node, EdgeKind::Rw) {
                self.node_mut(node).state = NodeState::NoMem;
                return;
            }
            if self.node(other).writes.test(hash) {
                if !self.add_dep(other, node, EdgeKind::Ww) {
                    self.node_mut(node).state = NodeState::NoMem;
                    return;
                }
                if !self.add_dep(node, other, EdgeKind::Ww) {
                    self.node_mut(node).state = NodeState::NoMem;
                    return;
                }
            }
        }
    }

    /// Forces the node to ROLLEDBACK.
    pub fn rollback(&mut self, node: NodeKey) {
        debug_assert!(matches!(
            self.node(node).state,
            NodeState::Active | NodeState::NoMem
        ));
        self.deactivate(node, NodeState::RolledBack);
    }

    /// Attempts to certify the node as serializable. Returns `true` iff
    /// it ends up COMMITTED.
    pub fn commit(&mut self, node: NodeKey) -> bool {
        debug_assert!(matches!(
            self.node(node).state,
            NodeState::Active | NodeState::NoMem
        ));
        if self.node(node).state == NodeState::NoMem {
            set_oom(true);
            self.deactivate(node, NodeState::RolledBack);
            return false;
        }
        set_oom(false);

        let targets: Vec<NodeKey> = self.node(node).outs.iter().map(|e| e.target).collect();
        let conflicts = targets.iter().any(|&t| {
            let target = self.node(t);
            target.state == NodeState::Committed && target.haswrites
        });

        if conflicts {
            self.deactivate(node, NodeState::RolledBack);
            false
        } else {
            self.deactivate(node, NodeState::Committed);
            true
        }
    }

    /// Like [`Graph::commit`], but returns the OOM flag alongside the
    /// result instead of requiring a separate ambient query — useful when
    /// embedding this crate somewhere thread-local state is unwelcome.
    pub fn commit_detailed(&mut self, node: NodeKey) -> CommitOutcome {
        let committed = self.commit(node);
        CommitOutcome {
            committed,
            was_oom: oom(),
        }
    }

    /// Explicit mark-and-sweep: nodes unreachable via `outs` from any
    /// ACTIVE node are freed.
    pub fn gc(&mut self) {
        let actives: Vec<NodeKey> = self
            .iter_keys()
            .filter(|&k| self.node(k).state == NodeState::Active)
            .collect();
        for a in actives {
            self.mark_from(a);
        }

        let mut to_free = Vec::new();
        for key in self.iter_keys() {
            if self.node(key).reached {
                self.node_mut(key).reached = false;
            } else {
                to_free.push(key);
            }
        }
        for key in to_free {
            self.free_node(key);
        }
    }

    pub fn set_label(&mut self, node: NodeKey, label: impl Into<String>) {
        self.node_mut(node).label = label.into();
    }

    pub fn label(&self, node: NodeKey) -> &str {
        &self.node(node).label
    }

    pub fn state(&self, node: NodeKey) -> NodeState {
        self.node(node).state
    }

    pub fn is_readonly(&self, node: NodeKey) -> bool {
        self.node(node).writes.is_empty()
    }

    /// Comma-separated `"<label> <STATE>"` pairs in live-list order.
    pub fn render_state(&self) -> String {
        let mut out = String::new();
        for (i, key) in self.iter_keys().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(self.label(key));
            out.push(' ');
            out.push_str(self.state(key).as_str());
        }
        out
    }

    /// `render_state`'s text, with outgoing edge lines appended beneath
    /// each node when `with_edges` is set.
    pub fn render(&self, with_edges: bool) -> String {
        let mut out = String::new();
        for key in self.iter_keys() {
            out.push_str(self.label(key));
            out.push(' ');
            out.push_str(self.state(key).as_str());
            out.push_str(&format!(" ({} outs)", self.node(key).outs.count()));
            if self.is_readonly(key) {
                out.push_str(" <READONLY>");
            }
            out.push('\n');
            if with_edges {
                for edge in self.node(key).outs.iter().collect::<Vec<_>>() {
                    out.push_str(&format!(
                        "  {} ----({})---> {}\n",
                        self.label(key),
                        edge.kind.as_str(),
                        self.label(edge.target)
                    ));
                }
            }
        }
        out
    }

    // -- internal helpers --------------------------------------------

    fn node(&self, key: NodeKey) -> &Node<A> {
        self.nodes[key.index()].as_ref().expect("dangling NodeKey")
    }

    fn node_mut(&mut self, key: NodeKey) -> &mut Node<A> {
        self.nodes[key.index()].as_mut().expect("dangling NodeKey")
    }

    fn iter_keys(&self) -> GraphKeys<'_, A> {
        GraphKeys {
            graph: self,
            cursor: self.head,
        }
    }

    fn live_keys_excluding(&self, exclude: NodeKey) -> Vec<NodeKey> {
        self.iter_keys().filter(|&k| k != exclude).collect()
    }

    fn push_node(&mut self, node: Node<A>) -> NodeKey {
        let idx = if let Some(slot) = self.free_slots.pop() {
            self.nodes[slot] = Some(node);
            slot
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        };
        let key = NodeKey::new(idx);
        if let Some(tail) = self.tail {
            self.node_mut(tail).next = Some(key);
            self.node_mut(key).prev = Some(tail);
        } else {
            self.head = Some(key);
        }
        self.tail = Some(key);
        key
    }

    fn unlink(&mut self, key: NodeKey) {
        let (prev, next) = {
            let n = self.node(key);
            (n.prev, n.next)
        };
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(nx) => self.node_mut(nx).prev = prev,
            None => self.tail = prev,
        }
        let n = self.node_mut(key);
        n.prev = None;
        n.next = None;
    }

    fn free_node(&mut self, key: NodeKey) {
        self.unlink(key);
        if let Some(node) = self.nodes[key.index()].take() {
            node.reads.release();
            node.writes.release();
            node.outs.release();
            node.ins.release();
        }
        self.alloc.track_free();
        self.free_slots.push(key.index());
    }

    fn mark_from(&mut self, start: NodeKey) {
        let mut stack = vec![start];
        while let Some(key) = stack.pop() {
            if self.node(key).reached {
                continue;
            }
            self.node_mut(key).reached = true;
            let targets: Vec<NodeKey> = self.node(key).outs.iter().map(|e| e.target).collect();
            stack.extend(targets);
        }
    }

    fn add_dep(&mut self, from: NodeKey, to: NodeKey, kind: EdgeKind) -> bool {
        let from_ident = self.node(from).ident;
        let to_ident = self.node(to).ident;
        if !self.node_mut(to).ins.add(from, from_ident, kind) {
            return false;
        }
        if !self.node_mut(from).outs.add(to, to_ident, kind) {
            return false;
        }
        self.node_mut(to).hasdeps = true;
        true
    }

    fn deactivate(&mut self, key: NodeKey, state: NodeState) {
        self.node_mut(key).state = state;
        if let Autogc::Threshold(threshold) = self.autogc {
            self.gc_counter += 1;
            let reclaim_now = self.node(key).outs.is_empty() && !self.node(key).hasdeps;
            if reclaim_now {
                self.free_node(key);
            }
            if self.gc_counter >= threshold.get() {
                self.gc_counter = 0;
                self.gc();
            }
        }
    }
}

impl<A: Allocator> Drop for Graph<A> {
    fn drop(&mut self) {
        // A final GC, then any remaining nodes (including abandoned
        // ACTIVE ones, marked RELEASED as a courtesy only — nothing can
        // observe this after the drop completes) are forcibly freed.
        self.gc();
        let remaining: Vec<NodeKey> = self.iter_keys().collect();
        for key in remaining {
            if self.node(key).state == NodeState::Active {
                self.node_mut(key).state = NodeState::Released;
            }
            self.free_node(key);
        }
        self.alloc.track_free();
    }
}

struct GraphKeys<'g, A: Allocator> {
    graph: &'g Graph<A>,
    cursor: Option<NodeKey>,
}

impl<'g, A: Allocator> Iterator for GraphKeys<'g, A> {
    type Item = NodeKey;

    fn next(&mut self) -> Option<NodeKey> {
        let current = self.cursor?;
        self.cursor = self.graph.node(current).next;
        Some(current)
    }
}
