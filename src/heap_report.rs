//! The HPROF-derived analytical report: class histogram, top objects,
//! and the two class-retained roll-ups from [`crate::heap::dominator`].

use std::collections::HashMap;

use serde::Serialize;

use crate::heap::gcroot_path::BiggestObjectEntry;
use crate::heap::reference_graph::ReferenceGraph;
use crate::sink::ClassHistogramEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistogramRanking {
    ByInstanceCount,
    ByTotalSize,
}

#[derive(Debug, Clone)]
pub struct HeapReportOptions {
    pub top_classes_n: usize,
    pub ranking: HistogramRanking,
    pub biggest_objects_n: usize,
    pub biggest_object_max_fields: usize,
    pub include_class_retainers: bool,
    pub include_business_retainers: bool,
}

impl Default for HeapReportOptions {
    fn default() -> Self {
        HeapReportOptions {
            top_classes_n: 50,
            ranking: HistogramRanking::ByTotalSize,
            biggest_objects_n: 20,
            biggest_object_max_fields: 20,
            include_class_retainers: true,
            include_business_retainers: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HeapHeader {
    pub source_filename: String,
    pub created_millis: u64,
    pub id_size: u8,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HeapSummary {
    pub total_objects: u64,
    pub total_references: u64,
    pub gc_root_count: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GcRootsAnalysis {
    /// Count of roots per [`crate::heap::reference_graph::GcRootType`],
    /// keyed by its serde rendering (e.g. `"STICKY_CLASS"`).
    pub counts_by_type: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferenceGraphRef {
    pub label: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeapReport {
    pub header: HeapHeader,
    pub summary: HeapSummary,
    pub top_classes: Vec<ClassHistogramEntry>,
    pub total_classes: u64,
    pub total_instances: u64,
    pub total_heap_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub biggest_objects: Option<Vec<BiggestObjectEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gc_roots_analysis: Option<GcRootsAnalysis>,
    /// Top-level (MAT-style) per-class retained view.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_retainers: Option<HashMap<String, u64>>,
    /// Attribution-view per-class retained rollup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_retainers: Option<HashMap<String, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_graphs: Option<Vec<ReferenceGraphRef>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassHistogramReport {
    pub total_classes: u64,
    pub total_instances: u64,
    pub total_size: u64,
    pub classes: Vec<ClassHistogramEntry>,
}

/// Build the class histogram (`total_classes`/`total_instances`/
/// `total_size`/`classes`), ranked and truncated per `options`.
pub fn build_histogram(
    graph: &ReferenceGraph,
    class_instance_counts: &HashMap<u64, u64>,
    options: &HeapReportOptions,
) -> ClassHistogramReport {
    let mut classes = crate::sink::class_histogram(graph, class_instance_counts);
    match options.ranking {
        HistogramRanking::ByInstanceCount => classes.sort_by(|a, b| b.instance_count.cmp(&a.instance_count).then_with(|| a.class_name.cmp(&b.class_name))),
        HistogramRanking::ByTotalSize => classes.sort_by(|a, b| b.shallow_bytes.cmp(&a.shallow_bytes).then_with(|| a.class_name.cmp(&b.class_name))),
    }

    let total_classes = classes.len() as u64;
    let total_instances: u64 = classes.iter().map(|c| c.instance_count).sum();
    let total_size: u64 = classes.iter().map(|c| c.shallow_bytes).sum();

    classes.truncate(options.top_classes_n);

    ClassHistogramReport {
        total_classes,
        total_instances,
        total_size,
        classes,
    }
}

/// Build the full heap report: histogram, biggest objects, GC-root
/// breakdown, and both class-retained roll-ups.
pub fn build_report(
    graph: &ReferenceGraph,
    class_instance_counts: &HashMap<u64, u64>,
    header: HeapHeader,
    options: &HeapReportOptions,
) -> HeapReport {
    let histogram = build_histogram(graph, class_instance_counts, options);

    let biggest_objects = graph
        .retained_sizes
        .as_ref()
        .map(|_| crate::heap::gcroot_path::BiggestObjectsBuilder::build(graph, options.biggest_objects_n, options.biggest_object_max_fields));

    let mut counts_by_type: HashMap<String, u64> = HashMap::new();
    for root in &graph.gc_roots {
        let label = serde_json::to_value(root.root_type).ok().and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default();
        *counts_by_type.entry(label).or_insert(0) += 1;
    }
    let gc_roots_analysis = Some(GcRootsAnalysis { counts_by_type });

    let class_retainers = if options.include_class_retainers {
        graph.class_retained_sizes.as_ref().map(|m| rename_by_class(graph, m))
    } else {
        None
    };
    let business_retainers = if options.include_business_retainers {
        graph.class_retained_sizes_attributed.as_ref().map(|m| rename_by_class(graph, m))
    } else {
        None
    };

    HeapReport {
        header,
        summary: HeapSummary {
            total_objects: graph.object_count() as u64,
            total_references: graph.outgoing_refs.values().map(|v| v.len() as u64).sum(),
            gc_root_count: graph.gc_roots.len() as u64,
        },
        top_classes: histogram.classes,
        total_classes: histogram.total_classes,
        total_instances: histogram.total_instances,
        total_heap_size: histogram.total_size,
        biggest_objects,
        gc_roots_analysis,
        class_retainers,
        business_retainers,
        reference_graphs: None,
    }
}

fn rename_by_class(graph: &ReferenceGraph, by_id: &HashMap<u64, u64>) -> HashMap<String, u64> {
    by_id.iter().map(|(&class_id, &bytes)| (graph.class_name(class_id).to_string(), bytes)).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn small_graph() -> ReferenceGraph {
        let mut graph = ReferenceGraph::default();
        graph.add_object(1, 10, 8);
        graph.add_object(2, 10, 8);
        graph.class_names.insert(10, "com.example.Thing".to_string());
        graph
    }

    #[test]
    fn histogram_totals_match_per_class_sums() {
        let graph = small_graph();
        let mut counts = HashMap::new();
        counts.insert(10u64, 2u64);
        let histogram = build_histogram(&graph, &counts, &HeapReportOptions::default());
        assert_eq!(histogram.total_instances, 2);
        assert_eq!(histogram.total_size, 16);
        assert_eq!(histogram.classes[0].class_name, "com.example.Thing");
    }

    #[test]
    fn ranking_by_instance_count_vs_size_both_supported() {
        let graph = small_graph();
        let mut counts = HashMap::new();
        counts.insert(10u64, 2u64);

        let by_count = build_histogram(&graph, &counts, &HeapReportOptions { ranking: HistogramRanking::ByInstanceCount, ..HeapReportOptions::default() });
        let by_size = build_histogram(&graph, &counts, &HeapReportOptions { ranking: HistogramRanking::ByTotalSize, ..HeapReportOptions::default() });
        assert_eq!(by_count.classes[0].class_name, by_size.classes[0].class_name);
    }
}
