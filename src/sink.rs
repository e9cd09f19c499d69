//! Trait boundary between this crate's analysis core and whatever a
//! caller wires up for persistence and UI surfacing — argument
//! parsing, config-file loading, process wiring, database writes,
//! object-storage upload, and rule-driven suggestion text are all
//! explicitly out of scope (see `SPEC_FULL.md` §1), but the core still
//! needs *something* to hand results to. `src/dispatch.rs` depends on
//! these traits, never on a concrete implementation, the same way
//! `kolloch-reqray`'s span-collecting `Layer` depends on
//! `FinishedCallTreeProcessor` rather than on `LoggingCallTreeCollector`
//! directly.

use std::sync::Mutex;

use crate::config::AnalysisMode;
use crate::error::Result;
use crate::heap::reference_graph::ReferenceGraph;
use crate::stats::TopFunctionEntry;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ClassHistogramEntry {
    pub class_name: String,
    pub instance_count: u64,
    pub shallow_bytes: u64,
    pub retained_bytes: u64,
}

pub fn class_histogram(graph: &ReferenceGraph, class_instance_counts: &std::collections::HashMap<u64, u64>) -> Vec<ClassHistogramEntry> {
    class_instance_counts
        .iter()
        .map(|(&class_id, &instance_count)| {
            let shallow_bytes: u64 = graph
                .object_class
                .iter()
                .filter(|(_, &c)| c == class_id)
                .filter_map(|(id, _)| graph.object_size.get(id))
                .sum();
            let retained_bytes = graph
                .class_retained_sizes
                .as_ref()
                .and_then(|m| m.get(&class_id))
                .copied()
                .unwrap_or(0);
            ClassHistogramEntry {
                class_name: graph.class_name(class_id).to_string(),
                instance_count,
                shallow_bytes,
                retained_bytes,
            }
        })
        .collect()
}

/// Where an analysis run's artifacts and warnings go. Implemented by
/// the caller; this crate calls it, never implements it outside tests.
pub trait ResultSink {
    fn record_artifact(&self, mode: AnalysisMode, name: &str, bytes: &[u8]) -> Result<()>;
    fn record_warning(&self, mode: AnalysisMode, message: &str);
}

/// Read-only view over a completed analysis handed to an (external,
/// unimplemented-here) rule-driven suggestion engine.
pub trait SuggestionInput {
    fn top_functions(&self) -> &[TopFunctionEntry];
    fn class_histogram(&self) -> Option<&[ClassHistogramEntry]>;
}

/// Minimal in-memory [`ResultSink`] used by this crate's own dispatch
/// tests; never a production sink.
#[derive(Default)]
pub struct VecResultSink {
    artifacts: Mutex<Vec<(AnalysisMode, String, Vec<u8>)>>,
    warnings: Mutex<Vec<(AnalysisMode, String)>>,
}

impl VecResultSink {
    pub fn new() -> Self {
        VecResultSink::default()
    }

    pub fn artifacts(&self) -> Vec<(AnalysisMode, String, Vec<u8>)> {
        self.artifacts.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<(AnalysisMode, String)> {
        self.warnings.lock().unwrap().clone()
    }
}

impl ResultSink for VecResultSink {
    fn record_artifact(&self, mode: AnalysisMode, name: &str, bytes: &[u8]) -> Result<()> {
        self.artifacts.lock().unwrap().push((mode, name.to_string(), bytes.to_vec()));
        Ok(())
    }

    fn record_warning(&self, mode: AnalysisMode, message: &str) {
        self.warnings.lock().unwrap().push((mode, message.to_string()));
    }
}
