//! The object graph recovered from an HPROF heap dump: objects, their
//! declared classes, the field/array edges between them, and the GC
//! roots that anchor reachability. [`crate::heap::dominator`] fills in
//! the `dominators`/`retained_sizes`/`class_retained_sizes*` fields in
//! a later pass; before that pass they are `None` and any accessor
//! that needs them returns [`crate::error::AnalysisError::NotComputed`].

use std::collections::HashMap;

use serde::Serialize;

pub use crate::parse::hprof::records::GcRootType;
use crate::error::{AnalysisError, Result};

/// One reference from `from_id` to `to_id`, labeled with the field or
/// array-index name that holds it and the class that declared the
/// field (empty for array-element edges).
#[derive(Debug, Clone, Serialize)]
pub struct RefEdge {
    pub from_id: u64,
    pub to_id: u64,
    pub field_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GcRoot {
    pub object_id: u64,
    pub root_type: GcRootType,
    pub thread_serial: u32,
    pub frame_number: i32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReferenceGraph {
    pub object_class: HashMap<u64, u64>,
    pub object_size: HashMap<u64, u64>,
    pub class_names: HashMap<u64, String>,
    /// class_id -> super class_id, for histogram rollups and field-layout resolution.
    pub class_super: HashMap<u64, u64>,
    pub outgoing_refs: HashMap<u64, Vec<RefEdge>>,
    pub incoming_refs: HashMap<u64, Vec<RefEdge>>,
    pub gc_roots: Vec<GcRoot>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dominators: Option<HashMap<u64, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retained_sizes: Option<HashMap<u64, u64>>,
    /// Per-class retained size counting each object once under its own
    /// class only (the MAT "shallow+retained-if-sole-owner" view).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_retained_sizes: Option<HashMap<u64, u64>>,
    /// Per-class retained size attributing an object's retained size to
    /// every class that exclusively dominates it through that subtree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_retained_sizes_attributed: Option<HashMap<u64, u64>>,
}

impl ReferenceGraph {
    pub fn add_object(&mut self, object_id: u64, class_id: u64, size: u64) {
        self.object_class.insert(object_id, class_id);
        self.object_size.insert(object_id, size);
    }

    pub fn add_edge(&mut self, from_id: u64, to_id: u64, field_name: impl Into<String>) {
        if to_id == 0 {
            return;
        }
        let field_name = field_name.into();
        self.outgoing_refs.entry(from_id).or_default().push(RefEdge {
            from_id,
            to_id,
            field_name: field_name.clone(),
        });
        self.incoming_refs.entry(to_id).or_default().push(RefEdge {
            from_id,
            to_id,
            field_name,
        });
    }

    pub fn object_count(&self) -> usize {
        self.object_class.len()
    }

    pub fn class_name(&self, class_id: u64) -> &str {
        self.class_names.get(&class_id).map(String::as_str).unwrap_or("<unknown class>")
    }

    pub fn dominator_of(&self, object_id: u64) -> Result<Option<u64>> {
        self.dominators
            .as_ref()
            .ok_or(AnalysisError::NotComputed)
            .map(|d| d.get(&object_id).copied())
    }

    pub fn retained_size_of(&self, object_id: u64) -> Result<u64> {
        self.retained_sizes
            .as_ref()
            .ok_or(AnalysisError::NotComputed)
            .map(|r| r.get(&object_id).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_edge_populates_both_directions() {
        let mut graph = ReferenceGraph::default();
        graph.add_edge(1, 2, "field");
        assert_eq!(graph.outgoing_refs[&1].len(), 1);
        assert_eq!(graph.incoming_refs[&2].len(), 1);
    }

    #[test]
    fn add_edge_to_null_is_ignored() {
        let mut graph = ReferenceGraph::default();
        graph.add_edge(1, 0, "field");
        assert!(graph.outgoing_refs.get(&1).is_none());
    }

    #[test]
    fn accessors_fail_before_dominator_pass() {
        let graph = ReferenceGraph::default();
        assert!(matches!(graph.dominator_of(1), Err(AnalysisError::NotComputed)));
        assert!(matches!(graph.retained_size_of(1), Err(AnalysisError::NotComputed)));
    }
}
