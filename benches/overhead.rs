use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pyrograph::config::FlameGraphOptions;
use pyrograph::flamegraph;
use pyrograph::heap::dominator::DominatorEngine;
use pyrograph::heap::reference_graph::ReferenceGraph;
use pyrograph::model::Sample;

fn synthetic_samples(n: usize) -> Vec<Sample> {
    (0..n)
        .map(|i| {
            let tid = (i % 8) as i64;
            Sample::new(
                format!("worker-{tid}"),
                tid,
                vec!["root".to_string(), "middle".to_string(), format!("leaf-{}", i % 50)],
                1,
            )
        })
        .collect()
}

/// A chain of `depth` single-child objects, the worst case for the
/// dominator tree's iterative fixed point (every node's idom changes
/// at most once, but the chain forces `depth` passes without the
/// reverse-postorder ordering).
fn chain_graph(depth: u64) -> ReferenceGraph {
    let mut graph = ReferenceGraph::default();
    graph.class_names.insert(1, "Node".to_string());
    for i in 1..=depth {
        graph.add_object(i, 1, 16);
        if i > 1 {
            graph.add_edge(i - 1, i, "next");
        }
    }
    graph.gc_roots.push(pyrograph::heap::reference_graph::GcRoot {
        object_id: 1,
        root_type: pyrograph::heap::reference_graph::GcRootType::StickyClass,
        thread_serial: 0,
        frame_number: -1,
    });
    graph
}

fn flame_graph_build(c: &mut Criterion) {
    let samples = synthetic_samples(10_000);
    c.bench_function("flamegraph::build 10k samples", |b| {
        b.iter(|| flamegraph::build(black_box(&samples), &FlameGraphOptions::default()))
    });
}

fn dominator_compute(c: &mut Criterion) {
    c.bench_function("DominatorEngine::compute 5k-chain", |b| {
        b.iter_batched(
            || chain_graph(5_000),
            |mut graph| DominatorEngine::compute(black_box(&mut graph)),
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, flame_graph_build, dominator_compute);
criterion_main!(benches);
