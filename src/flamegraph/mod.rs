//! Flame-graph construction: a tree rooted at a synthetic `root` node,
//! built incrementally from a batch of [`Sample`]s the same way the
//! teacher's `CallPathPool` is built incrementally from span events,
//! then sealed with [`FlameGraph::cleanup`].

mod thread_analysis;

pub use thread_analysis::{ThreadAnalysisData, ThreadInfo, GlobalFunctionInfo};

use serde::Serialize;
use std::collections::HashMap;

use crate::config::FlameGraphOptions;
use crate::model::{composite_key, split_frame, Sample};

/// One node of a sealed [`FlameGraph`]. `value == self + sum(children
/// values)`, the flame-graph value-conservation invariant.
#[derive(Debug, Clone, Serialize)]
pub struct FlameNode {
    pub name: String,
    pub value: i64,
    #[serde(rename = "self")]
    pub self_value: i64,
    pub children: Vec<FlameNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tid: Option<i64>,
}

impl FlameNode {
    fn new(name: impl Into<String>) -> Self {
        FlameNode {
            name: name.into(),
            value: 0,
            self_value: 0,
            children: Vec::new(),
            module: None,
            process: None,
            tid: None,
        }
    }
}

/// Build-time accumulator for one tree: an arena of [`FlameNode`]s plus
/// the composite-key → index maps used to find-or-create children.
/// Dropped by [`FlameGraph::cleanup`], leaving only the sealed tree.
struct NodeBuilder {
    nodes: Vec<FlameNode>,
    children_keys: Vec<HashMap<String, usize>>,
}

impl NodeBuilder {
    fn new(root_name: &str) -> Self {
        NodeBuilder {
            nodes: vec![FlameNode::new(root_name)],
            children_keys: vec![HashMap::new()],
        }
    }

    fn root_idx(&self) -> usize {
        0
    }

    fn find_or_create_child(
        &mut self,
        parent_idx: usize,
        name: &str,
        module: &str,
        tid: Option<i64>,
    ) -> usize {
        let key = composite_key(name, module, "", tid);
        if let Some(&idx) = self.children_keys[parent_idx].get(&key) {
            return idx;
        }
        let mut node = FlameNode::new(name);
        if !module.is_empty() {
            node.module = Some(module.to_string());
        }
        if let Some(t) = tid {
            node.tid = Some(t);
        }
        let idx = self.nodes.len();
        self.nodes.push(node);
        self.children_keys.push(HashMap::new());
        self.children_keys[parent_idx].insert(key, idx);
        idx
    }

    fn add_value(&mut self, idx: usize, value: i64) {
        self.nodes[idx].value += value;
    }

    fn add_self(&mut self, idx: usize, value: i64) {
        self.nodes[idx].self_value += value;
    }

    /// Assemble the flat arena into the nested tree owned by the root,
    /// consuming the builder.
    fn into_tree(mut self) -> FlameNode {
        fn build(nodes: &mut Vec<Option<FlameNode>>, children_keys: &[HashMap<String, usize>], idx: usize) -> FlameNode {
            let mut node = nodes[idx].take().expect("node visited twice");
            let mut child_idxs: Vec<usize> = children_keys[idx].values().copied().collect();
            child_idxs.sort_unstable();
            node.children = child_idxs
                .into_iter()
                .map(|c| build(nodes, children_keys, c))
                .collect();
            node
        }

        let mut opt_nodes: Vec<Option<FlameNode>> = self.nodes.drain(..).map(Some).collect();
        build(&mut opt_nodes, &self.children_keys, 0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FlameGraph {
    #[serde(flatten)]
    pub root: FlameNode,
    pub total_samples: i64,
    pub max_depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_analysis: Option<ThreadAnalysisData>,
}

fn max_depth(node: &FlameNode, depth: usize) -> usize {
    node.children
        .iter()
        .map(|c| max_depth(c, depth + 1))
        .max()
        .unwrap_or(depth)
}

impl FlameGraph {
    /// Recursively drop nodes whose value is below
    /// `total_samples * min_percent / 100`. A node is kept if its value
    /// clears the threshold even if every child is pruned; a pruned
    /// child's value is *not* redistributed (it simply disappears along
    /// with the subtree), matching the teacher's habit of dropping
    /// build-time bookkeeping rather than re-deriving it.
    pub fn cleanup(&mut self, min_percent: f64) {
        if self.total_samples <= 0 || min_percent <= 0.0 {
            return;
        }
        let threshold = (self.total_samples as f64) * min_percent / 100.0;
        prune(&mut self.root, threshold);
    }
}

fn prune(node: &mut FlameNode, threshold: f64) {
    node.children
        .retain(|child| (child.value as f64) >= threshold);
    for child in &mut node.children {
        prune(child, threshold);
    }
}

/// Build a [`FlameGraph`] from a batch of samples.
///
/// For each sample, walk `call_stack` root→leaf; if
/// `include_thread_in_stack`, prepend a synthetic frame named after the
/// thread. At each frame, find-or-create a child keyed by name+module
/// (see [`crate::model::composite_key`]) and add the sample's value.
/// The leaf frame also receives `self_value`.
pub fn build(samples: &[Sample], options: &FlameGraphOptions) -> FlameGraph {
    let mut builder = NodeBuilder::new("root");
    let mut total_samples: i64 = 0;

    for sample in samples {
        if sample.is_swapper && !options.include_swapper {
            continue;
        }
        total_samples += sample.value;

        let mut cur = builder.root_idx();
        builder.add_value(cur, sample.value);

        let mut frames: Vec<&str> = Vec::with_capacity(sample.call_stack.len() + 1);
        if options.include_thread_in_stack {
            frames.push(sample.thread_name.as_str());
        }
        frames.extend(sample.call_stack.iter().map(String::as_str));

        let last = frames.len().saturating_sub(1);
        for (i, frame) in frames.iter().enumerate() {
            let (name, module) = split_frame(frame);
            let module = if options.include_module { module } else { "" };
            cur = builder.find_or_create_child(cur, name, module, None);
            builder.add_value(cur, sample.value);
            if i == last {
                builder.add_self(cur, sample.value);
            }
        }
    }

    let thread_analysis = if options.enable_thread_analysis {
        Some(thread_analysis::analyze(samples, options))
    } else {
        None
    };

    let root = builder.into_tree();
    let depth = max_depth(&root, 0);

    FlameGraph {
        root,
        total_samples,
        max_depth: depth,
        thread_analysis,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample(thread: &str, stack: &[&str], value: i64) -> Sample {
        Sample::new(thread, -1, stack.iter().map(|s| s.to_string()).collect(), value)
    }

    fn assert_value_conservation(node: &FlameNode) {
        let children_sum: i64 = node.children.iter().map(|c| c.value).sum();
        assert_eq!(node.value, node.self_value + children_sum, "node {:?}", node.name);
        for c in &node.children {
            assert_value_conservation(c);
        }
    }

    #[test]
    fn collapsed_basic_two_children_under_root() {
        let samples = vec![
            sample("main-thread", &["java.lang.Thread.run", "com.example.App.main"], 100),
            sample("worker-1", &["java.lang.Thread.run", "com.example.Worker.process"], 50),
        ];
        let flame = build(&samples, &FlameGraphOptions::default());
        assert_eq!(flame.total_samples, 150);
        assert_eq!(flame.root.children.len(), 1, "both share java.lang.Thread.run");
        assert_value_conservation(&flame.root);
    }

    #[test]
    fn single_frame_stack_root_has_one_leaf_child() {
        let samples = vec![sample("t", &["only"], 42)];
        let flame = build(&samples, &FlameGraphOptions::default());
        assert_eq!(flame.root.children.len(), 1);
        let child = &flame.root.children[0];
        assert_eq!(child.self_value, child.value);
        assert_eq!(child.value, 42);
    }

    #[test]
    fn aggregation_of_identical_stacks() {
        let samples = vec![
            sample("t", &["a", "b"], 50),
            sample("t", &["a", "b"], 30),
            sample("t", &["a", "b"], 20),
        ];
        let flame = build(&samples, &FlameGraphOptions::default());
        assert_eq!(flame.root.children.len(), 1);
        let a = &flame.root.children[0];
        assert_eq!(a.children.len(), 1);
        let b = &a.children[0];
        assert_eq!(b.value, 100);
    }

    #[test]
    fn module_split_carries_module_strings() {
        let samples = vec![sample("t", &["func1(mod1)", "func2(mod2)"], 100)];
        let flame = build(&samples, &FlameGraphOptions::default());
        let f1 = &flame.root.children[0];
        assert_eq!(f1.name, "func1");
        assert_eq!(f1.module.as_deref(), Some("mod1"));
        let f2 = &f1.children[0];
        assert_eq!(f2.name, "func2");
        assert_eq!(f2.module.as_deref(), Some("mod2"));
    }

    #[test]
    fn module_differences_do_not_merge_children() {
        let samples = vec![
            sample("t", &["f(m1)"], 10),
            sample("t", &["f(m2)"], 20),
        ];
        let flame = build(&samples, &FlameGraphOptions::default());
        assert_eq!(flame.root.children.len(), 2, "distinct modules must not merge");
    }

    #[test]
    fn sum_to_total_invariant() {
        let samples = vec![
            sample("t1", &["a", "b"], 10),
            sample("t2", &["a", "c"], 20),
            sample("t3", &["x"], 5),
        ];
        let flame = build(&samples, &FlameGraphOptions::default());
        let expected: i64 = samples.iter().map(|s| s.value).sum();
        assert_eq!(flame.root.value, expected);
        assert_value_conservation(&flame.root);
    }

    #[test]
    fn swapper_excluded_by_default() {
        let samples = vec![sample("swapper/0", &["idle"], 1000), sample("t", &["work"], 10)];
        let flame = build(&samples, &FlameGraphOptions::default());
        assert_eq!(flame.total_samples, 10);
    }

    #[test]
    fn cleanup_drops_small_subtrees() {
        let samples = vec![sample("t", &["big"], 99), sample("t", &["small"], 1)];
        let mut flame = build(&samples, &FlameGraphOptions::default());
        flame.cleanup(5.0);
        assert_eq!(flame.root.children.len(), 1);
        assert_eq!(flame.root.children[0].name, "big");
    }

    #[test]
    fn include_thread_in_stack_prepends_synthetic_frame() {
        let samples = vec![sample("mythread", &["leaf"], 1)];
        let options = FlameGraphOptions::default().include_thread_in_stack(true);
        let flame = build(&samples, &options);
        assert_eq!(flame.root.children[0].name, "mythread");
        assert_eq!(flame.root.children[0].children[0].name, "leaf");
    }
}
