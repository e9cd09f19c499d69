//! End-to-end scenarios from `spec.md` §8, driven through the public
//! parsing/building/serialization API rather than internal helpers.

use std::io::Cursor;

use pyrograph::cancel::CancellationToken;
use pyrograph::callgraph;
use pyrograph::config::{CallGraphOptions, CollapsedParseOptions, FlameGraphOptions, SerializerOptions};
use pyrograph::flamegraph;
use pyrograph::heap::dominator::DominatorEngine;
use pyrograph::heap::reference_graph::{GcRoot, GcRootType, ReferenceGraph};
use pyrograph::leak::{LeakDetector, Severity};
use pyrograph::model::Sample;
use pyrograph::parse::collapsed;
use pyrograph::serialize::GraphSerializer;

fn parse_collapsed(text: &str) -> Vec<Sample> {
    collapsed::parse(Cursor::new(text), &CollapsedParseOptions::default(), &CancellationToken::new())
        .unwrap()
        .samples
}

#[test]
fn scenario_1_collapsed_basic() {
    let text = "main-thread;java.lang.Thread.run;com.example.App.main 100\n\
                worker-1;java.lang.Thread.run;com.example.Worker.process 50\n";
    let samples = parse_collapsed(text);
    assert_eq!(samples.len(), 2);
    assert!(samples.iter().all(|s| s.tid == -1));

    let flame = flamegraph::build(&samples, &FlameGraphOptions::default());
    assert_eq!(flame.total_samples, 150);
    assert_eq!(flame.root.children.len(), 1, "both stacks share java.lang.Thread.run");
}

#[test]
fn scenario_2_self_time_leaf_only() {
    let samples = parse_collapsed("t;caller;callee 100\n");
    let graph = callgraph::build(&samples, &CallGraphOptions::default());
    assert_eq!(graph.nodes.len(), 2);
    let callee = graph.nodes.iter().find(|n| n.name == "callee").unwrap();
    let caller = graph.nodes.iter().find(|n| n.name == "caller").unwrap();
    assert_eq!(callee.self_time, 100);
    assert_eq!(caller.self_time, 0);
    assert_eq!(graph.edges.len(), 1);
    assert_eq!(graph.edges[0].count, 100);
}

#[test]
fn scenario_3_aggregation_of_identical_lines() {
    let samples = parse_collapsed("t;a;b 50\nt;a;b 30\nt;a;b 20\n");
    let flame = flamegraph::build(&samples, &FlameGraphOptions::default());
    assert_eq!(flame.root.children.len(), 1);
    let a = &flame.root.children[0];
    assert_eq!(a.children.len(), 1);
    assert_eq!(a.children[0].value, 100);
}

#[test]
fn scenario_4_module_split() {
    let samples = parse_collapsed("t;func1(mod1);func2(mod2) 100\n");
    let flame = flamegraph::build(&samples, &FlameGraphOptions::default());
    let f1 = &flame.root.children[0];
    assert_eq!(f1.module.as_deref(), Some("mod1"));
    let f2 = &f1.children[0];
    assert_eq!(f2.module.as_deref(), Some("mod2"));
}

#[test]
fn scenario_5_thread_group_rollup() {
    let text = "pool-1-thread-1;work 50\n\
                pool-1-thread-2;work 30\n\
                pool-2-thread-1;work 20\n";
    let samples = parse_collapsed(text);
    let graph = callgraph::build(&samples, &CallGraphOptions::default());
    let groups = &graph.analysis.unwrap().thread_groups;
    assert_eq!(groups.len(), 2);
    let pool1 = groups.iter().find(|g| g.group == "pool-1-thread").unwrap();
    let pool2 = groups.iter().find(|g| g.group == "pool-2-thread").unwrap();
    assert_eq!(pool1.samples, 80);
    assert_eq!(pool2.samples, 20);
}

#[test]
fn scenario_6_heap_severity_none_for_identical_snapshots() {
    let samples = parse_collapsed("t;com.example.Cache.entries 1000000\n");
    let mut detector = LeakDetector::new();
    detector.add_profile(samples.clone(), 0);
    detector.add_profile(samples, 60_000);

    let report = detector.detect_heap_leak(&pyrograph::config::LeakDetectorOptions::default()).unwrap();
    assert_eq!(report.severity, Severity::None);
    assert!(report.growth_items.is_empty());
}

#[test]
fn scenario_7_reference_graph_round_trip_at_scale() {
    let mut graph = ReferenceGraph::default();
    graph.class_names.insert(1, "com.example.Node".to_string());

    for id in 1..=1000u64 {
        graph.add_object(id, 1, 24);
    }
    // 3000 references: each node points at its three following
    // neighbors (wrapping), keeping everything reachable from object 1.
    for id in 1..=1000u64 {
        for offset in 1..=3u64 {
            let target = (id + offset - 1) % 1000 + 1;
            graph.add_edge(id, target, "next");
        }
    }
    for (i, root_id) in [1u64, 200, 400, 600, 800].into_iter().enumerate() {
        graph.gc_roots.push(GcRoot {
            object_id: root_id,
            root_type: GcRootType::StickyClass,
            thread_serial: i as u32,
            frame_number: -1,
        });
    }

    DominatorEngine::compute(&mut graph);

    let total_refs: usize = graph.outgoing_refs.values().map(Vec::len).sum();
    assert_eq!(total_refs, 3000);
    assert_eq!(graph.gc_roots.len(), 5);

    let bytes = GraphSerializer::serialize(&graph, &SerializerOptions::default(), "scale.hprof", 123_456).unwrap();
    let restored = GraphSerializer::deserialize(&bytes).unwrap();

    assert_eq!(restored.object_class, graph.object_class);
    assert_eq!(restored.object_size, graph.object_size);
    assert_eq!(restored.class_names, graph.class_names);
    assert_eq!(restored.gc_roots.len(), graph.gc_roots.len());
    assert_eq!(restored.dominators, graph.dominators);
    assert_eq!(restored.retained_sizes, graph.retained_sizes);
    let restored_refs: usize = restored.outgoing_refs.values().map(Vec::len).sum();
    assert_eq!(restored_refs, 3000);
}

#[test]
fn boundary_empty_collapsed_input_is_empty() {
    let samples = parse_collapsed("");
    assert!(samples.is_empty());
    let flame = flamegraph::build(&samples, &FlameGraphOptions::default());
    assert_eq!(flame.total_samples, 0);
    assert!(flame.root.children.is_empty());
}

#[test]
fn boundary_single_frame_stack_leaf_self_equals_value() {
    let samples = parse_collapsed("t;only 42\n");
    let flame = flamegraph::build(&samples, &FlameGraphOptions::default());
    assert_eq!(flame.root.children.len(), 1);
    let leaf = &flame.root.children[0];
    assert_eq!(leaf.self_value, leaf.value);
    assert_eq!(leaf.value, 42);
}
