//! # txgraph
//!
//! An in-memory conflict detector for optimistic concurrency control.
//!
//! A [`Graph`] tracks the read and write sets of concurrently open
//! transactions ([`NodeKey`]s) and certifies each one at commit time: a
//! transaction commits only if none of the transactions it transitively
//! depends on via a write-write edge already committed first. This gives
//! callers serializable isolation over whatever storage they actually use
//! to hold data — this crate only holds the conflict graph, not the data
//! itself.
//!
//! ## Usage
//!
//! ```
//! use txgraph::{Graph, GraphOpts};
//!
//! let mut graph = Graph::new(GraphOpts::new()).unwrap();
//!
//! let t1 = graph.begin().unwrap();
//! let t2 = graph.begin().unwrap();
//!
//! graph.read(t1, 0xA);
//! graph.write(t2, 0xA);
//!
//! assert!(graph.commit(t2));
//! assert!(!graph.commit(t1)); // t1's read of 0xA conflicts with t2's write
//! ```
//!
//! ## Concurrency model
//!
//! A [`Graph`] and the [`NodeKey`]s it hands out are not `Sync`; all
//! operations against one graph must be serialized by the caller (e.g.
//! behind a single mutex per graph).
#![doc(html_root_url = "https://docs.rs/txgraph/0.1.0")]
#![deny(unsafe_code)]

mod alloc;
mod edgemap;
mod graph;
mod hashset;
mod node;

pub use alloc::{Allocator, CountingAllocator, FailingAllocator, SystemAllocator};
pub use edgemap::EdgeKind;
pub use graph::{oom, Autogc, CommitOutcome, Graph, GraphOpts};
pub use node::{NodeKey, NodeState};
