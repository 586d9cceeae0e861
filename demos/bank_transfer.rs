//! A bank-transfer scenario along the lines of the `overdraft` end-to-end
//! test: two transactions each read both of a customer's accounts before
//! deciding which one to debit. Demonstrates that a transaction whose
//! reads happened before any conflicting write still certifies cleanly,
//! while the loser is rolled back and can be retried by the caller.

use anyhow::{ensure, Result};
use txgraph::{Graph, GraphOpts};

fn hash(item: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in item.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x0000_0100_0000_01B3);
    }
    h
}

fn main() -> Result<()> {
    let mut graph = Graph::new(GraphOpts::new()).expect("allocator never fails here");

    let t1 = graph.begin().expect("room for a new transaction");
    graph.set_label(t1, "withdraw-from-saving");
    let t2 = graph.begin().expect("room for a new transaction");
    graph.set_label(t2, "withdraw-from-checking");

    graph.read(t1, hash("checking"));
    graph.read(t1, hash("saving"));
    graph.read(t2, hash("checking"));
    graph.read(t2, hash("saving"));

    graph.write(t1, hash("saving"));
    graph.write(t2, hash("checking"));

    let t1_ok = graph.commit(t1);
    let t2_ok = graph.commit(t2);

    println!("{}", graph.render_state());
    ensure!(t1_ok, "the first committer should certify");
    ensure!(!t2_ok, "the second committer read a balance pair the first one invalidated");

    println!("caller should retry {:?} against the now-current balances", "withdraw-from-checking");
    Ok(())
}
