//! Shortest-path-to-GC-root search and the "biggest objects" report
//! built on top of it. Both operate read-only on an already
//! dominator-computed [`ReferenceGraph`].

use std::collections::{HashMap, HashSet, VecDeque};

use rayon::prelude::*;
use serde::Serialize;

use crate::heap::reference_graph::{GcRootType, ReferenceGraph};

#[derive(Debug, Clone, Serialize)]
pub struct PathHop {
    pub object_id: u64,
    pub class_name: String,
    /// Field on this hop's object through which the *previous* (closer
    /// to the queried object) hop was reached.
    pub field_name: String,
    pub shallow_size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RootPath {
    pub root_object_id: u64,
    pub root_type: GcRootType,
    /// Ordered root -> ... -> immediate predecessor of the queried object.
    pub hops: Vec<PathHop>,
}

pub struct GcRootPathSearch;

impl GcRootPathSearch {
    /// BFS over `incoming_refs` from `object_id`, stopping at the first
    /// GC root reached (shortest path by hop count) or `max_depth`.
    pub fn find_path(graph: &ReferenceGraph, object_id: u64, max_depth: usize) -> Option<RootPath> {
        if let Some(root) = graph.gc_roots.iter().find(|r| r.object_id == object_id) {
            return Some(RootPath {
                root_object_id: object_id,
                root_type: root.root_type,
                hops: Vec::new(),
            });
        }

        let mut visited: HashSet<u64> = HashSet::from([object_id]);
        let mut parent: HashMap<u64, (u64, String)> = HashMap::new();
        let mut queue: VecDeque<(u64, usize)> = VecDeque::from([(object_id, 0)]);

        while let Some((cur, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let Some(edges) = graph.incoming_refs.get(&cur) else { continue };
            for edge in edges {
                let pred = edge.from_id;
                if !visited.insert(pred) {
                    continue;
                }
                parent.insert(pred, (cur, edge.field_name.clone()));
                if let Some(root) = graph.gc_roots.iter().find(|r| r.object_id == pred) {
                    return Some(Self::reconstruct(graph, object_id, pred, &parent, root));
                }
                queue.push_back((pred, depth + 1));
            }
        }
        None
    }

    /// Run [`Self::find_path`] for every object in `object_ids`, each
    /// in its own worker. Results merge into one map keyed by object
    /// id; if the same object were ever resolved by more than one
    /// worker, the shorter path wins.
    pub fn find_paths(graph: &ReferenceGraph, object_ids: &[u64], max_depth: usize) -> HashMap<u64, Option<RootPath>> {
        object_ids
            .par_iter()
            .map(|&id| (id, Self::find_path(graph, id, max_depth)))
            .fold(HashMap::new, |mut acc: HashMap<u64, Option<RootPath>>, (id, path)| {
                match acc.get(&id) {
                    Some(Some(existing)) if path.as_ref().map(|p| p.hops.len() >= existing.hops.len()).unwrap_or(true) => {}
                    _ => {
                        acc.insert(id, path);
                    }
                }
                acc
            })
            .reduce(HashMap::new, |mut a, b| {
                for (id, path) in b {
                    match (a.get(&id), &path) {
                        (Some(Some(existing)), Some(candidate)) if candidate.hops.len() >= existing.hops.len() => {}
                        _ => {
                            a.insert(id, path);
                        }
                    }
                }
                a
            })
    }

    fn reconstruct(
        graph: &ReferenceGraph,
        target: u64,
        root_id: u64,
        parent: &HashMap<u64, (u64, String)>,
        root: &crate::heap::reference_graph::GcRoot,
    ) -> RootPath {
        let mut hops = Vec::new();
        let mut current = root_id;
        while current != target {
            let (next, field_name) = parent[&current].clone();
            hops.push(PathHop {
                object_id: current,
                class_name: graph
                    .object_class
                    .get(&current)
                    .map(|c| graph.class_name(*c).to_string())
                    .unwrap_or_default(),
                field_name,
                shallow_size: graph.object_size.get(&current).copied().unwrap_or(0),
            });
            current = next;
        }
        RootPath {
            root_object_id: root_id,
            root_type: root.root_type,
            hops,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum FieldValue {
    Primitive(String),
    Reference { ref_id: u64, target_class: Option<String> },
}

#[derive(Debug, Clone, Serialize)]
pub struct BiggestObjectEntry {
    pub object_id: u64,
    pub class_name: String,
    pub shallow_size: u64,
    pub retained_size: u64,
    pub fields: Vec<(String, FieldValue)>,
}

pub struct BiggestObjectsBuilder;

impl BiggestObjectsBuilder {
    /// Top-`k` objects by retained size, each with up to `max_fields`
    /// resolved outgoing field values.
    pub fn build(graph: &ReferenceGraph, k: usize, max_fields: usize) -> Vec<BiggestObjectEntry> {
        let Some(retained) = graph.retained_sizes.as_ref() else { return Vec::new() };

        let mut ranked: Vec<(u64, u64)> = retained.iter().map(|(&id, &r)| (id, r)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(k);

        ranked
            .into_iter()
            .map(|(object_id, retained_size)| {
                let class_id = graph.object_class.get(&object_id).copied().unwrap_or(0);
                let fields = graph
                    .outgoing_refs
                    .get(&object_id)
                    .into_iter()
                    .flatten()
                    .take(max_fields)
                    .map(|edge| {
                        let target_class = graph.object_class.get(&edge.to_id).map(|&c| graph.class_name(c).to_string());
                        (edge.field_name.clone(), FieldValue::Reference { ref_id: edge.to_id, target_class })
                    })
                    .collect();
                BiggestObjectEntry {
                    object_id,
                    class_name: graph.class_name(class_id).to_string(),
                    shallow_size: graph.object_size.get(&object_id).copied().unwrap_or(0),
                    retained_size,
                    fields,
                }
            })
            .collect()
    }
}
