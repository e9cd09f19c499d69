//! Call-graph construction: a directed multigraph of function nodes
//! plus weighted caller→callee edges, built incrementally from a
//! sample batch and sealed with [`CallGraph::cleanup`].

mod analysis;
pub mod render;

pub use analysis::{CallGraphAnalysis, HotPath, ModuleStats, ThreadGroupStats};

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::config::CallGraphOptions;
use crate::model::{join_frame, split_frame, Sample};

#[derive(Debug, Clone, Serialize)]
pub struct CallGraphNode {
    pub id: String,
    pub name: String,
    pub module: String,
    pub self_time: i64,
    pub total_time: i64,
    pub call_count: i64,
    pub caller_count: usize,
    pub callee_count: usize,
    pub max_depth: usize,
    pub is_recursive: bool,
    pub self_pct: f64,
    pub total_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallGraphEdge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub count: i64,
    pub weight_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallGraph {
    pub total_samples: i64,
    pub nodes: Vec<CallGraphNode>,
    pub edges: Vec<CallGraphEdge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<CallGraphAnalysis>,
    /// Retained when built with [`build_keep_indexes`] / for internal
    /// use by [`analysis`]; cleared by the zero-arg [`CallGraph::cleanup`].
    #[serde(skip)]
    pub(crate) callers: HashMap<String, HashMap<String, i64>>,
    #[serde(skip)]
    pub(crate) callees: HashMap<String, HashMap<String, i64>>,
}

fn node_id(name: &str, module: &str) -> String {
    if module.is_empty() {
        name.to_string()
    } else {
        join_frame(name, module)
    }
}

struct BuildState {
    nodes: HashMap<String, CallGraphNode>,
    node_order: Vec<String>,
    edges: HashMap<(String, String), i64>,
    callers: HashMap<String, HashMap<String, i64>>,
    callees: HashMap<String, HashMap<String, i64>>,
    hot_paths: HashMap<String, i64>,
    total_samples: i64,
}

impl BuildState {
    fn get_or_create_node(&mut self, name: &str, module: &str) -> String {
        let id = node_id(name, module);
        if !self.nodes.contains_key(&id) {
            self.node_order.push(id.clone());
            self.nodes.insert(
                id.clone(),
                CallGraphNode {
                    id: id.clone(),
                    name: name.to_string(),
                    module: module.to_string(),
                    self_time: 0,
                    total_time: 0,
                    call_count: 0,
                    caller_count: 0,
                    callee_count: 0,
                    max_depth: 0,
                    is_recursive: false,
                    self_pct: 0.0,
                    total_pct: 0.0,
                },
            );
        }
        id
    }
}

/// Build a [`CallGraph`] from a batch of samples, including the full
/// [`CallGraphAnalysis`] (hot paths, top-N tables, module/thread-group
/// rollups, and per-thread sub-graphs). See spec §4.4 for the node/edge
/// construction, recursion-detection, and percentage rules.
pub fn build(samples: &[Sample], options: &CallGraphOptions) -> CallGraph {
    let state = build_state(samples, options);
    let hot_paths = state.hot_paths.clone();
    let (total_samples, nodes, edges, callers, callees) = finalize(state);
    let analysis = analysis::build_analysis(&nodes, &edges, &callers, &callees, &hot_paths, samples, options, total_samples);
    CallGraph {
        total_samples,
        nodes,
        edges,
        analysis: Some(analysis),
        callers,
        callees,
    }
}

/// Build just the nodes/edges, with no [`CallGraphAnalysis`]. Used by
/// [`analysis::build_per_thread_graphs`] so that building a per-thread
/// sub-graph doesn't itself try to build per-thread sub-graphs.
pub(super) fn build_without_analysis(samples: &[Sample], options: &CallGraphOptions) -> CallGraph {
    let state = build_state(samples, options);
    let (total_samples, nodes, edges, callers, callees) = finalize(state);
    CallGraph {
        total_samples,
        nodes,
        edges,
        analysis: None,
        callers,
        callees,
    }
}

fn build_state(samples: &[Sample], options: &CallGraphOptions) -> BuildState {
    let mut state = BuildState {
        nodes: HashMap::new(),
        node_order: Vec::new(),
        edges: HashMap::new(),
        callers: HashMap::new(),
        callees: HashMap::new(),
        hot_paths: HashMap::new(),
        total_samples: 0,
    };

    for sample in samples {
        if sample.is_swapper && !options.include_swapper {
            continue;
        }
        state.total_samples += sample.value;

        let mut seen_in_stack: HashSet<(String, String)> = HashSet::new();
        let mut prev_id: Option<String> = None;
        let depth_count = sample.call_stack.len();

        for (i, frame) in sample.call_stack.iter().enumerate() {
            let (name, module) = split_frame(frame);
            let id = state.get_or_create_node(name, module);

            {
                let node = state.nodes.get_mut(&id).unwrap();
                node.total_time += sample.value;
                node.call_count += 1;
                node.max_depth = node.max_depth.max(i + 1);
                if i == depth_count - 1 {
                    node.self_time += sample.value;
                }
            }

            let key = (name.to_string(), module.to_string());
            if !seen_in_stack.insert(key) {
                state.nodes.get_mut(&id).unwrap().is_recursive = true;
            }

            if let Some(prev) = &prev_id {
                *state.edges.entry((prev.clone(), id.clone())).or_insert(0) += sample.value;
                *state
                    .callers
                    .entry(id.clone())
                    .or_default()
                    .entry(prev.clone())
                    .or_insert(0) += sample.value;
                *state
                    .callees
                    .entry(prev.clone())
                    .or_default()
                    .entry(id.clone())
                    .or_insert(0) += sample.value;
            }
            prev_id = Some(id);
        }

        let path = sample.call_stack.join(";");
        *state.hot_paths.entry(path).or_insert(0) += sample.value;
    }

    state
}

/// Sort and percentage-annotate the raw [`BuildState`] into the public
/// node/edge vectors, consuming `state` in the process.
fn finalize(state: BuildState) -> (i64, Vec<CallGraphNode>, Vec<CallGraphEdge>, HashMap<String, HashMap<String, i64>>, HashMap<String, HashMap<String, i64>>) {
    let BuildState { mut nodes, node_order, edges, callers, callees, hot_paths: _, total_samples } = state;
    let total = total_samples.max(1) as f64;

    let mut built_nodes: Vec<CallGraphNode> = node_order
        .iter()
        .map(|id| {
            let mut node = nodes.remove(id).unwrap();
            node.self_pct = (node.self_time as f64) / total * 100.0;
            node.total_pct = (node.total_time as f64) / total * 100.0;
            node.caller_count = callers.get(id).map_or(0, |m| m.len());
            node.callee_count = callees.get(id).map_or(0, |m| m.len());
            node
        })
        .collect();
    built_nodes.sort_by(|a, b| a.id.cmp(&b.id));

    let mut built_edges: Vec<CallGraphEdge> = edges
        .into_iter()
        .map(|((source_id, target_id), count)| CallGraphEdge {
            id: format!("{source_id}->{target_id}"),
            weight_pct: (count as f64) / total * 100.0,
            source_id,
            target_id,
            count,
        })
        .collect();
    built_edges.sort_by(|a, b| a.id.cmp(&b.id));

    (total_samples, built_nodes, built_edges, callers, callees)
}

impl CallGraph {
    /// Drop nodes below `min_node_pct` (by `total_pct`), then remove
    /// edges dangling on a removed endpoint. Also drops the caller/callee
    /// indexes so the graph is sealed -- see [`cleanup_keep_maps`] for a
    /// variant that keeps them queryable.
    pub fn cleanup(&mut self, min_node_pct: f64, min_edge_pct: f64) {
        self.cleanup_keep_maps(min_node_pct, min_edge_pct);
        self.callers.clear();
        self.callees.clear();
    }

    /// Same pruning as [`cleanup`] but preserves the caller/callee
    /// indexes for analysis getters that still need them.
    pub fn cleanup_keep_maps(&mut self, min_node_pct: f64, min_edge_pct: f64) {
        let kept_ids: HashSet<String> = self
            .nodes
            .iter()
            .filter(|n| n.total_pct >= min_node_pct)
            .map(|n| n.id.clone())
            .collect();
        self.nodes.retain(|n| kept_ids.contains(&n.id));
        self.edges.retain(|e| {
            e.weight_pct >= min_edge_pct
                && kept_ids.contains(&e.source_id)
                && kept_ids.contains(&e.target_id)
        });
    }
}
