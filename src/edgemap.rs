//! Open-addressed Robin-Hood map from a node's identity to the edges it
//! holds to other nodes: `outs` (dependencies this node recorded against
//! others) and, kept purely as a diagnostic cross-index, `ins`.

use crate::alloc::Allocator;
use crate::node::NodeKey;

/// The three conflict-edge flavors the commit-time graph tracks.
/// Diagnostic only — the commit decision itself never consults `kind`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    /// Source's prior write conflicts with target's later read.
    Wr,
    /// Source's prior write conflicts with target's later write.
    Ww,
    /// Source's prior read conflicts with target's later write.
    Rw,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Wr => "wr",
            EdgeKind::Ww => "ww",
            EdgeKind::Rw => "rw",
        }
    }
}

#[derive(Clone, Copy)]
struct Edge {
    dib: u16,
    kind: EdgeKind,
    target: NodeKey,
    target_ident: u64,
}

impl Edge {
    const EMPTY_DIB: u16 = 0;

    fn empty() -> Self {
        Edge {
            dib: Self::EMPTY_DIB,
            kind: EdgeKind::Wr,
            target: NodeKey::dangling(),
            target_ident: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.dib == Self::EMPTY_DIB
    }
}

fn edge_equal(a: &Edge, b: &Edge) -> bool {
    a.target_ident == b.target_ident && a.kind == b.kind
}

/// A single recorded dependency, as returned by iteration.
#[derive(Clone, Copy, Debug)]
pub struct EdgeView {
    pub kind: EdgeKind,
    pub target: NodeKey,
}

#[derive(Clone)]
pub struct EdgeMap<A: Allocator> {
    alloc: A,
    buckets: Vec<Edge>,
    nbuckets: usize,
    count: usize,
}

impl<A: Allocator> EdgeMap<A> {
    pub fn new(alloc: A) -> Self {
        EdgeMap {
            alloc,
            buckets: Vec::new(),
            nbuckets: 0,
            count: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Inserts (target, kind). Idempotent: re-adding an already-present
    /// (target, kind) pair leaves the map unchanged. Returns `false` on
    /// simulated allocation failure.
    pub fn add(&mut self, target: NodeKey, target_ident: u64, kind: EdgeKind) -> bool {
        if self.nbuckets == 0 || self.count == self.nbuckets / 2 {
            if !self.grow() {
                return false;
            }
        }
        let edge = Edge {
            dib: 1,
            kind,
            target,
            target_ident,
        };
        self.insert_raw(edge);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = EdgeView> + '_ {
        self.buckets.iter().filter(|e| !e.is_empty()).map(|e| EdgeView {
            kind: e.kind,
            target: e.target,
        })
    }

    /// Releases the backing bucket array if one was ever allocated,
    /// mirroring `ptx_edgemap_free`.
    pub(crate) fn release(&self) {
        if self.nbuckets > 0 {
            self.alloc.track_free();
        }
    }

    fn insert_raw(&mut self, mut edge: Edge) {
        let mask = self.nbuckets - 1;
        let mut i = (edge.target_ident as usize) & mask;
        loop {
            let occupant = self.buckets[i];
            if occupant.is_empty() {
                self.buckets[i] = edge;
                self.count += 1;
                return;
            }
            if edge_equal(&occupant, &edge) {
                return;
            }
            if occupant.dib < edge.dib {
                self.buckets[i] = edge;
                edge = occupant;
            }
            edge.dib += 1;
            i = (i + 1) & mask;
        }
    }

    fn grow(&mut self) -> bool {
        if !self.alloc.try_alloc() {
            return false;
        }
        let old_nbuckets = self.nbuckets;
        let old_buckets = std::mem::take(&mut self.buckets);
        let new_nbuckets = if old_nbuckets == 0 { 2 } else { old_nbuckets * 2 };

        self.buckets = vec![Edge::empty(); new_nbuckets];
        self.nbuckets = new_nbuckets;
        self.count = 0;
        for edge in old_buckets.into_iter() {
            if !edge.is_empty() {
                self.insert_raw(edge);
            }
        }
        if old_nbuckets > 0 {
            self.alloc.track_free();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::SystemAllocator;

    fn key(i: usize) -> NodeKey {
        NodeKey::for_test(i)
    }

    #[test]
    fn idempotent_same_pair_and_kind() {
        let mut map = EdgeMap::new(SystemAllocator);
        assert!(map.add(key(1), 1, EdgeKind::Wr));
        assert!(map.add(key(1), 1, EdgeKind::Wr));
        assert_eq!(map.count(), 1);
    }

    #[test]
    fn distinct_kinds_between_same_pair_are_separate_entries() {
        let mut map = EdgeMap::new(SystemAllocator);
        assert!(map.add(key(1), 1, EdgeKind::Wr));
        assert!(map.add(key(1), 1, EdgeKind::Ww));
        assert_eq!(map.count(), 2);
    }

    #[test]
    fn iteration_yields_every_entry_once() {
        let mut map = EdgeMap::new(SystemAllocator);
        for i in 0..40u64 {
            map.add(key(i as usize), i, EdgeKind::Rw);
        }
        let seen: Vec<_> = map.iter().collect();
        assert_eq!(seen.len(), 40);
    }

    #[test]
    fn grows_from_zero_capacity() {
        let map: EdgeMap<SystemAllocator> = EdgeMap::new(SystemAllocator);
        assert_eq!(map.count(), 0);
        assert!(map.is_empty());
    }
}
