//! Builds a flame graph and call graph from a synthetic batch of nested
//! call-stack samples and prints both as pretty JSON, the same shape a
//! `java-cpu`/`cpu` analysis run would hand to a [`pyrograph::sink::ResultSink`].

use pyrograph::callgraph;
use pyrograph::config::{CallGraphOptions, FlameGraphOptions};
use pyrograph::flamegraph;
use pyrograph::model::Sample;

fn stack(frames: &[&str]) -> Vec<String> {
    frames.iter().map(|s| s.to_string()).collect()
}

fn main() {
    let samples = vec![
        Sample::new("main-thread", 1, stack(&["request", "nested", "random"]), 36),
        Sample::new("main-thread", 1, stack(&["request", "nested", "repeated"]), 75738),
        Sample::new("main-thread", 1, stack(&["request", "repeated"]), 51),
        Sample::new("main-thread", 1, stack(&["request", "nest_deeply", "nest_deeply", "nest_deeply"]), 1644),
        Sample::new(
            "main-thread",
            1,
            stack(&["request", "nested2", "random"]),
            10,
        ),
        Sample::new(
            "main-thread",
            1,
            stack(&["request", "nested2", "repeated"]),
            88793,
        ),
        Sample::new(
            "main-thread",
            1,
            stack(&["request", "nested2", "nested", "random"]),
            11,
        ),
        Sample::new(
            "main-thread",
            1,
            stack(&["request", "nested2", "nested", "repeated"]),
            58468,
        ),
    ];

    let flame = flamegraph::build(&samples, &FlameGraphOptions::default());
    println!("{}", serde_json::to_string_pretty(&flame).unwrap());

    let call_graph = callgraph::build(&samples, &CallGraphOptions::default());
    println!("{}", serde_json::to_string_pretty(&call_graph).unwrap());
}
