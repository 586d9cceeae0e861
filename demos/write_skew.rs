//! Replays the classic write-skew scenario: two transactions each read the
//! same row, then each writes it based on what they read. Under pure
//! read-committed isolation both would succeed; this engine's conflict
//! graph catches the anomaly and aborts the second committer.

use txgraph::{Graph, GraphOpts};

fn hash(item: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in item.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x0000_0100_0000_01B3);
    }
    h
}

fn main() {
    let mut graph = Graph::new(GraphOpts::new()).expect("allocator never fails here");

    let t1 = graph.begin().expect("graph has room for one more transaction");
    graph.set_label(t1, "doctor-on-call-1");
    let t2 = graph.begin().expect("graph has room for one more transaction");
    graph.set_label(t2, "doctor-on-call-2");

    println!("both transactions read the on-call roster");
    graph.read(t1, hash("doctors"));
    graph.read(t2, hash("doctors"));

    println!("t1 sees itself as the last doctor off duty and goes off duty");
    graph.write(t1, hash("doctors"));
    println!("t1 commits: {}", graph.commit(t1));

    println!("t2 made the same read before t1 committed, and goes off duty too");
    graph.write(t2, hash("doctors"));
    println!("t2 commits: {}", graph.commit(t2));

    println!("\n{}", graph.render_state());
}
