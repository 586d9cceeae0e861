//! Allocator accounting.
//!
//! The original C implementation threads a `malloc`/`free` pair through
//! every heap-owning structure in the graph so that a test harness can
//! assert a zero-leak invariant by counting allocations. Rust doesn't need
//! a real custom allocator to get the same bookkeeping: every growth site
//! in [`crate::hashset`] and [`crate::edgemap`] calls through an
//! [`Allocator`] hook instead, which lets tests both count outstanding
//! allocations and simulate out-of-memory conditions.

use std::cell::Cell;
use std::rc::Rc;

/// Injectable allocation hook, mirroring `ptx_graph_opts.malloc`/`.free`.
///
/// `try_alloc` is consulted at every site that would grow a backing `Vec`
/// or bloom bit array; returning `false` simulates an allocation failure
/// and drives the caller into the `NoMem` state, exactly as a failed
/// `malloc` does in the original.
pub trait Allocator: Clone {
    /// Called before a heap allocation. Returning `false` fails the
    /// allocation without performing it.
    fn try_alloc(&self) -> bool {
        true
    }

    /// Called when a previously-tracked allocation is released.
    fn track_free(&self) {}

    /// Current outstanding allocation count, if this allocator tracks one.
    fn outstanding(&self) -> Option<i64> {
        None
    }
}

/// The default allocator: every allocation succeeds, nothing is counted.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {}

/// Counts outstanding allocations so tests can assert zero-leak behavior
/// the way the original test harness's `xallocs()` bookkeeping did.
///
/// Single-threaded by design (see the crate's concurrency model), so a
/// plain `Rc<Cell<_>>` is enough; there is no need to pay for atomics.
#[derive(Clone, Debug, Default)]
pub struct CountingAllocator {
    outstanding: Rc<Cell<i64>>,
}

impl CountingAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Allocator for CountingAllocator {
    fn try_alloc(&self) -> bool {
        self.outstanding.set(self.outstanding.get() + 1);
        true
    }

    fn track_free(&self) {
        self.outstanding.set(self.outstanding.get() - 1);
    }

    fn outstanding(&self) -> Option<i64> {
        Some(self.outstanding.get())
    }
}

/// Fails every `try_alloc` call from the `n`th onward, letting tests
/// exercise the NOMEM transition path deterministically.
#[derive(Clone, Debug)]
pub struct FailingAllocator {
    remaining: Rc<Cell<i64>>,
    outstanding: Rc<Cell<i64>>,
}

impl FailingAllocator {
    /// `succeed_for` allocations succeed; every call after that fails.
    pub fn new(succeed_for: i64) -> Self {
        Self {
            remaining: Rc::new(Cell::new(succeed_for)),
            outstanding: Rc::new(Cell::new(0)),
        }
    }
}

impl Allocator for FailingAllocator {
    fn try_alloc(&self) -> bool {
        let left = self.remaining.get();
        if left <= 0 {
            return false;
        }
        self.remaining.set(left - 1);
        self.outstanding.set(self.outstanding.get() + 1);
        true
    }

    fn track_free(&self) {
        self.outstanding.set(self.outstanding.get() - 1);
    }

    fn outstanding(&self) -> Option<i64> {
        Some(self.outstanding.get())
    }
}
