//! Post-processing over a built [`super::CallGraph`]: hot paths,
//! top-N functions (with materialized callers/callees), per-module and
//! per-thread-group rollups, and per-thread sub-call-graphs.

use serde::Serialize;
use std::collections::HashMap;

use crate::config::CallGraphOptions;
use crate::model::{extract_thread_group, Sample};

use super::{build_without_analysis, CallGraph, CallGraphNode};

/// Width of the top-by-self / top-by-total function tables. Not
/// separately configurable in spec.md's configuration table (only
/// `hot_path_top_n` and `max_thread_call_graphs` are) so this is a
/// fixed constant rather than a phantom option nobody sets.
const TOP_FUNCTIONS_N: usize = 20;
/// How many functions each per-module rollup keeps.
const TOP_FUNCTIONS_PER_MODULE: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct HotPath {
    pub path: String,
    pub samples: i64,
    pub percentage: f64,
    pub depth: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopNodeEntry {
    pub node: CallGraphNode,
    pub callers: Vec<(String, i64)>,
    pub callees: Vec<(String, i64)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleStats {
    pub module: String,
    pub total_time: i64,
    pub self_time: i64,
    pub function_count: usize,
    pub top_functions: Vec<(String, i64)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadGroupStats {
    pub group: String,
    pub samples: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadCallGraph {
    pub thread_name: String,
    pub tid: i64,
    pub samples: i64,
    pub graph: CallGraph,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallGraphAnalysis {
    pub total_samples: i64,
    pub node_count: usize,
    pub edge_count: usize,
    pub hot_paths: Vec<HotPath>,
    pub top_by_self: Vec<TopNodeEntry>,
    pub top_by_total: Vec<TopNodeEntry>,
    pub modules: Vec<ModuleStats>,
    pub thread_groups: Vec<ThreadGroupStats>,
    pub per_thread: Vec<ThreadCallGraph>,
}

fn materialize_callers_callees(
    id: &str,
    callers: &HashMap<String, HashMap<String, i64>>,
    callees: &HashMap<String, HashMap<String, i64>>,
) -> (Vec<(String, i64)>, Vec<(String, i64)>) {
    let mut c: Vec<(String, i64)> = callers.get(id).map(|m| m.iter().map(|(k, v)| (k.clone(), *v)).collect()).unwrap_or_default();
    c.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let mut e: Vec<(String, i64)> = callees.get(id).map(|m| m.iter().map(|(k, v)| (k.clone(), *v)).collect()).unwrap_or_default();
    e.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    (c, e)
}

fn top_n_by<F: Fn(&CallGraphNode) -> i64>(
    nodes: &[CallGraphNode],
    callers: &HashMap<String, HashMap<String, i64>>,
    callees: &HashMap<String, HashMap<String, i64>>,
    key: F,
    n: usize,
) -> Vec<TopNodeEntry> {
    let mut sorted: Vec<&CallGraphNode> = nodes.iter().collect();
    sorted.sort_by(|a, b| key(b).cmp(&key(a)).then_with(|| a.name.cmp(&b.name)));
    sorted
        .into_iter()
        .take(n)
        .map(|node| {
            let (c, e) = materialize_callers_callees(&node.id, callers, callees);
            TopNodeEntry {
                node: node.clone(),
                callers: c,
                callees: e,
            }
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
pub(super) fn build_analysis(
    nodes: &[CallGraphNode],
    edges: &[super::CallGraphEdge],
    callers: &HashMap<String, HashMap<String, i64>>,
    callees: &HashMap<String, HashMap<String, i64>>,
    hot_path_counts: &HashMap<String, i64>,
    samples: &[Sample],
    options: &CallGraphOptions,
    total_samples: i64,
) -> CallGraphAnalysis {
    let total = total_samples.max(1) as f64;

    let mut hot_paths: Vec<HotPath> = hot_path_counts
        .iter()
        .map(|(path, &samples)| HotPath {
            depth: path.split(';').count(),
            percentage: (samples as f64) / total * 100.0,
            path: path.clone(),
            samples,
        })
        .collect();
    hot_paths.sort_by(|a, b| b.samples.cmp(&a.samples).then_with(|| a.path.cmp(&b.path)));
    hot_paths.truncate(options.hot_path_top_n);

    let top_by_self = top_n_by(nodes, callers, callees, |n| n.self_time, TOP_FUNCTIONS_N);
    let top_by_total = top_n_by(nodes, callers, callees, |n| n.total_time, TOP_FUNCTIONS_N);

    let modules = build_module_stats(nodes);
    let thread_groups = build_thread_group_stats(samples, options);
    let per_thread = build_per_thread_graphs(samples, options);

    CallGraphAnalysis {
        total_samples,
        node_count: nodes.len(),
        edge_count: edges.len(),
        hot_paths,
        top_by_self,
        top_by_total,
        modules,
        thread_groups,
        per_thread,
    }
}

fn build_module_stats(nodes: &[CallGraphNode]) -> Vec<ModuleStats> {
    struct Acc {
        total_time: i64,
        self_time: i64,
        functions: Vec<(String, i64)>,
    }
    let mut by_module: HashMap<String, Acc> = HashMap::new();
    for node in nodes {
        let acc = by_module.entry(node.module.clone()).or_insert_with(|| Acc {
            total_time: 0,
            self_time: 0,
            functions: Vec::new(),
        });
        acc.total_time += node.total_time;
        acc.self_time += node.self_time;
        acc.functions.push((node.name.clone(), node.total_time));
    }
    let mut modules: Vec<ModuleStats> = by_module
        .into_iter()
        .map(|(module, mut acc)| {
            acc.functions.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            acc.functions.truncate(TOP_FUNCTIONS_PER_MODULE);
            ModuleStats {
                function_count: acc.functions.len(),
                module,
                total_time: acc.total_time,
                self_time: acc.self_time,
                top_functions: acc.functions,
            }
        })
        .collect();
    modules.sort_by(|a, b| b.total_time.cmp(&a.total_time).then_with(|| a.module.cmp(&b.module)));
    modules
}

fn build_thread_group_stats(samples: &[Sample], options: &CallGraphOptions) -> Vec<ThreadGroupStats> {
    let mut by_group: HashMap<String, i64> = HashMap::new();
    let mut total: i64 = 0;
    for sample in samples {
        if sample.is_swapper && !options.include_swapper {
            continue;
        }
        total += sample.value;
        *by_group.entry(extract_thread_group(&sample.thread_name).to_string()).or_insert(0) += sample.value;
    }
    let total = total.max(1) as f64;
    let mut groups: Vec<ThreadGroupStats> = by_group
        .into_iter()
        .map(|(group, samples)| ThreadGroupStats {
            percentage: (samples as f64) / total * 100.0,
            group,
            samples,
        })
        .collect();
    groups.sort_by(|a, b| b.samples.cmp(&a.samples).then_with(|| a.group.cmp(&b.group)));
    groups
}

fn build_per_thread_graphs(samples: &[Sample], options: &CallGraphOptions) -> Vec<ThreadCallGraph> {
    let mut by_thread: HashMap<(String, i64), Vec<Sample>> = HashMap::new();
    for sample in samples {
        if sample.is_swapper && !options.include_swapper {
            continue;
        }
        by_thread
            .entry((sample.thread_name.clone(), sample.tid))
            .or_default()
            .push(sample.clone());
    }

    let mut graphs: Vec<ThreadCallGraph> = by_thread
        .into_iter()
        .map(|((thread_name, tid), thread_samples)| {
            let samples_total: i64 = thread_samples.iter().map(|s| s.value).sum();
            // Per-thread subgraphs skip analysis entirely -- recursing
            // into per-thread/hot-path analysis here would make the
            // output size unbounded in the number of threads.
            let graph = build_without_analysis(&thread_samples, options);
            ThreadCallGraph {
                thread_name,
                tid,
                samples: samples_total,
                graph,
            }
        })
        .collect();
    graphs.sort_by(|a, b| b.samples.cmp(&a.samples).then_with(|| a.thread_name.cmp(&b.thread_name)));
    graphs.truncate(options.max_thread_call_graphs);
    graphs
}

#[cfg(test)]
mod test {
    use super::super::build;
    use super::*;

    fn sample(thread: &str, stack: &[&str], value: i64) -> Sample {
        Sample::new(thread, -1, stack.iter().map(|s| s.to_string()).collect(), value)
    }

    #[test]
    fn hot_paths_are_literal_stack_signatures() {
        let samples = vec![sample("t", &["a", "b"], 10), sample("t", &["a", "b"], 5), sample("t", &["x"], 1)];
        let graph = build(&samples, &CallGraphOptions::default());
        let analysis = graph.analysis.unwrap();
        let top = &analysis.hot_paths[0];
        assert_eq!(top.path, "a;b");
        assert_eq!(top.samples, 15);
    }

    #[test]
    fn module_rollup_aggregates_across_functions() {
        let samples = vec![sample("t", &["f1(m)", "f2(m)"], 10)];
        let graph = build(&samples, &CallGraphOptions::default());
        let analysis = graph.analysis.unwrap();
        let m = analysis.modules.iter().find(|m| m.module == "m").unwrap();
        assert_eq!(m.function_count, 2);
    }

    #[test]
    fn per_thread_graphs_sorted_by_samples_desc() {
        let samples = vec![
            sample("t1", &["a"], 5),
            sample("t2", &["a"], 50),
        ];
        let graph = build(&samples, &CallGraphOptions::default());
        let analysis = graph.analysis.unwrap();
        assert_eq!(analysis.per_thread[0].thread_name, "t2");
    }
}
