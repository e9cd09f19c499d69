//! `AnalysisMode` dispatch: one table mapping each mode to a parser,
//! builder combination, and output filename set, plus the `Analyzer`
//! capability struct every mode-specific entry point delegates to.
//! Exactly one `match` decides the mode → (parser, builders, outputs)
//! triple; there is no per-mode factory type.

use std::collections::HashMap;
use std::path::Path;

use crate::cancel::CancellationToken;
use crate::callgraph::{self, CallGraph};
use crate::config::{AnalysisMode, AnalysisModeConfig};
use crate::error::{AnalysisError, Result};
use crate::flamegraph::{self, FlameGraph};
use crate::heap::dominator::DominatorEngine;
use crate::heap_report::{self, HeapHeader, HeapReportOptions};
use crate::leak::LeakDetector;
use crate::model::Sample;
use crate::output::{AnalysisOutput, JsonWriter};
use crate::parse::pprof::PprofDecoder;
use crate::parse::{collapsed, hprof, pprof};
use crate::sink::ResultSink;
use crate::stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    Collapsed,
    Pprof,
    Hprof,
}

#[derive(Debug, Clone, Copy)]
pub struct OutputFilenames {
    pub flame: &'static str,
    pub call_graph: &'static str,
    pub stats: &'static str,
    pub heap: &'static str,
    pub histogram: &'static str,
    pub leak: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct ModeSpec {
    pub parser: ParserKind,
    /// `sample_type` passed to [`PprofDecoder::to_samples`]; unused by
    /// the collapsed and HPROF parsers.
    pub sample_type: Option<&'static str>,
    pub build_flame: bool,
    pub build_call_graph: bool,
    pub build_stats: bool,
    pub outputs: OutputFilenames,
}

const fn outputs(flame: &'static str, call_graph: &'static str, stats: &'static str) -> OutputFilenames {
    OutputFilenames {
        flame,
        call_graph,
        stats,
        heap: "heap.json",
        histogram: "histogram.json",
        leak: "leak.json",
    }
}

/// The single dispatch table: `AnalysisMode` → `(parser, builders, output
/// filenames)`. See spec §6 / §9 ("single dispatch table, not multiple
/// factories").
pub fn mode_spec(mode: AnalysisMode) -> ModeSpec {
    match mode {
        AnalysisMode::JavaCpu => ModeSpec {
            parser: ParserKind::Collapsed,
            sample_type: None,
            build_flame: true,
            build_call_graph: true,
            build_stats: true,
            outputs: outputs("flame.json", "callgraph.json", "stats.json"),
        },
        AnalysisMode::Cpu => ModeSpec {
            parser: ParserKind::Collapsed,
            sample_type: None,
            build_flame: true,
            build_call_graph: true,
            build_stats: true,
            outputs: outputs("flame.json", "callgraph.json", "stats.json"),
        },
        AnalysisMode::JavaAlloc => ModeSpec {
            parser: ParserKind::Collapsed,
            sample_type: None,
            build_flame: true,
            build_call_graph: false,
            build_stats: true,
            outputs: outputs("flame.json", "callgraph.json", "stats.json"),
        },
        AnalysisMode::PprofCpu => ModeSpec {
            parser: ParserKind::Pprof,
            sample_type: Some("cpu"),
            build_flame: true,
            build_call_graph: true,
            build_stats: true,
            outputs: outputs("flame.json", "callgraph.json", "stats.json"),
        },
        AnalysisMode::PprofHeap => ModeSpec {
            parser: ParserKind::Pprof,
            sample_type: Some("inuse_space"),
            build_flame: true,
            build_call_graph: false,
            build_stats: true,
            outputs: outputs("flame.json", "callgraph.json", "stats.json"),
        },
        AnalysisMode::PprofGoroutine => ModeSpec {
            parser: ParserKind::Pprof,
            sample_type: Some("goroutine"),
            build_flame: true,
            build_call_graph: false,
            build_stats: true,
            outputs: outputs("flame.json", "callgraph.json", "stats.json"),
        },
        AnalysisMode::PprofBlock => ModeSpec {
            parser: ParserKind::Pprof,
            sample_type: Some("contentions"),
            build_flame: true,
            build_call_graph: false,
            build_stats: true,
            outputs: outputs("flame.json", "callgraph.json", "stats.json"),
        },
        AnalysisMode::PprofMutex => ModeSpec {
            parser: ParserKind::Pprof,
            sample_type: Some("contentions"),
            build_flame: true,
            build_call_graph: false,
            build_stats: true,
            outputs: outputs("flame.json", "callgraph.json", "stats.json"),
        },
        AnalysisMode::JavaHeap => ModeSpec {
            parser: ParserKind::Hprof,
            sample_type: None,
            build_flame: false,
            build_call_graph: false,
            build_stats: false,
            outputs: outputs("flame.json", "callgraph.json", "stats.json"),
        },
        AnalysisMode::PprofAll => ModeSpec {
            parser: ParserKind::Pprof,
            sample_type: None,
            build_flame: false,
            build_call_graph: false,
            build_stats: false,
            outputs: outputs("flame.json", "callgraph.json", "stats.json"),
        },
    }
}

/// The shared capability set every mode delegates to: parse, build the
/// three sample-derived artifacts, and write. Mode-specific entry
/// points below are thin wrappers over `&Analyzer`, matching the
/// teacher's composition-over-inheritance habit.
pub struct Analyzer {
    pub config: AnalysisModeConfig,
}

impl Analyzer {
    pub fn new(config: AnalysisModeConfig) -> Self {
        Analyzer { config }
    }

    fn parse_samples(&self, spec: &ModeSpec, input: &[u8], cancel: &CancellationToken) -> Result<Vec<Sample>> {
        match spec.parser {
            ParserKind::Collapsed => {
                let result = collapsed::parse(input, &Default::default(), cancel)?;
                if result.samples.is_empty() {
                    return Err(AnalysisError::EmptyData("no samples parsed from collapsed input".into()));
                }
                Ok(result.samples)
            }
            ParserKind::Pprof => {
                let decoder = PprofDecoder::parse(input)?;
                let sample_type = spec.sample_type.unwrap_or("cpu");
                let samples = decoder.to_samples(sample_type)?;
                if samples.is_empty() {
                    return Err(AnalysisError::EmptyData(format!("no samples for sample type {sample_type}")));
                }
                Ok(samples)
            }
            ParserKind::Hprof => Err(AnalysisError::UnsupportedMode("HPROF input has no Sample[] projection".into())),
        }
    }

    fn build_artifacts(&self, spec: &ModeSpec, samples: &[Sample]) -> (Option<FlameGraph>, Option<CallGraph>, Option<stats::StatsReport>) {
        let flame = spec.build_flame.then(|| {
            let mut fg = flamegraph::build(samples, &self.config.flame);
            fg.cleanup(self.config.flame.min_percent);
            fg
        });
        let call_graph = spec.build_call_graph.then(|| {
            let mut cg = callgraph::build(samples, &self.config.call_graph);
            cg.cleanup(self.config.call_graph.min_node_pct, self.config.call_graph.min_edge_pct);
            cg
        });
        let stats_report = spec.build_stats.then(|| stats::compute(samples, &self.config.stats));
        (flame, call_graph, stats_report)
    }

    /// Run one sample-producing mode end-to-end: parse, build the
    /// configured artifacts, and hand each serialized JSON payload to
    /// `sink`. Returns the list of artifact names written.
    pub fn analyze(&self, mode: AnalysisMode, input: &[u8], sink: &dyn ResultSink, cancel: &CancellationToken) -> Result<Vec<String>> {
        let spec = mode_spec(mode);
        if spec.parser == ParserKind::Hprof {
            return Err(AnalysisError::UnsupportedMode(format!("{mode:?} must use analyze_heap")));
        }
        let samples = self.parse_samples(&spec, input, cancel)?;
        cancel.check()?;
        let (flame, call_graph, stats_report) = self.build_artifacts(&spec, &samples);

        let mut written = Vec::new();
        if let Some(flame) = flame {
            let bytes = JsonWriter::to_bytes(&AnalysisOutput::Flame(flame), None)?;
            sink.record_artifact(mode, spec.outputs.flame, &bytes)?;
            written.push(spec.outputs.flame.to_string());
        }
        if let Some(call_graph) = call_graph {
            let bytes = JsonWriter::to_bytes(&AnalysisOutput::Call(call_graph), None)?;
            sink.record_artifact(mode, spec.outputs.call_graph, &bytes)?;
            written.push(spec.outputs.call_graph.to_string());
        }
        if let Some(stats_report) = stats_report {
            let bytes = JsonWriter::to_bytes(&AnalysisOutput::Stats(stats_report), None)?;
            sink.record_artifact(mode, spec.outputs.stats, &bytes)?;
            written.push(spec.outputs.stats.to_string());
        }
        Ok(written)
    }

    /// `java-heap`: parse HPROF, compute dominators, and write the heap
    /// report and class histogram.
    pub fn analyze_heap(&self, input: &[u8], source_filename: &str, sink: &dyn ResultSink, cancel: &CancellationToken) -> Result<Vec<String>> {
        let (mut graph, meta) = hprof::parse(input, cancel)?;
        if graph.object_count() == 0 {
            return Err(AnalysisError::EmptyData("heap dump contained no instances".into()));
        }
        cancel.check()?;
        DominatorEngine::compute(&mut graph);

        let header = HeapHeader {
            source_filename: source_filename.to_string(),
            created_millis: meta.timestamp_ms,
            id_size: meta.id_size,
        };
        let options = HeapReportOptions::default();
        let report = heap_report::build_report(&graph, &meta.class_instance_counts, header, &options);
        let histogram = heap_report::build_histogram(&graph, &meta.class_instance_counts, &options);

        let spec = mode_spec(AnalysisMode::JavaHeap);
        let heap_bytes = JsonWriter::to_bytes(&AnalysisOutput::Heap(report), None)?;
        sink.record_artifact(AnalysisMode::JavaHeap, spec.outputs.heap, &heap_bytes)?;
        let hist_bytes = JsonWriter::to_bytes(&AnalysisOutput::Histogram(histogram), None)?;
        sink.record_artifact(AnalysisMode::JavaHeap, spec.outputs.histogram, &hist_bytes)?;

        Ok(vec![spec.outputs.heap.to_string(), spec.outputs.histogram.to_string()])
    }

    /// `pprof-all`: discover per-kind snapshot files under `dir` by
    /// sub-directory name or filename substring, analyze each, and run
    /// the leak detector for any kind with two or more snapshots.
    /// Per-snapshot failures are accumulated as warnings rather than
    /// aborting the batch, per spec §7.
    pub fn analyze_batch_dir(&self, dir: &Path, sink: &dyn ResultSink, cancel: &CancellationToken) -> Result<Vec<(String, AnalysisError)>> {
        const KINDS: [(&str, AnalysisMode); 5] = [
            ("cpu", AnalysisMode::PprofCpu),
            ("heap", AnalysisMode::PprofHeap),
            ("goroutine", AnalysisMode::PprofGoroutine),
            ("block", AnalysisMode::PprofBlock),
            ("mutex", AnalysisMode::PprofMutex),
        ];

        let mut by_kind: HashMap<&'static str, Vec<std::path::PathBuf>> = HashMap::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_ascii_lowercase();
            for (needle, _) in KINDS {
                if name.contains(needle) {
                    by_kind.entry(needle).or_default().push(path.clone());
                }
            }
        }

        let mut warnings = Vec::new();
        for (kind, mode) in KINDS {
            cancel.check()?;
            let mut files = by_kind.remove(kind).unwrap_or_default();
            files.sort();
            if files.is_empty() {
                continue;
            }

            let mut detector = LeakDetector::new();
            for (i, path) in files.iter().enumerate() {
                let label = path.display().to_string();
                let outcome = std::fs::read(path).map_err(AnalysisError::from).and_then(|bytes| {
                    self.analyze(mode, &bytes, sink, cancel)?;
                    if files.len() >= 2 {
                        let decoder = PprofDecoder::parse(&bytes)?;
                        let samples = decoder.to_samples(mode_spec(mode).sample_type.unwrap_or("cpu"))?;
                        detector.add_profile(samples, i as i64 * 1000);
                    }
                    Ok(())
                });
                if let Err(err) = outcome {
                    warnings.push((label, err));
                }
            }

            if files.len() >= 2 {
                let leak_options = Default::default();
                let report = if kind == "goroutine" {
                    detector.detect_goroutine_leak(&leak_options)
                } else {
                    detector.detect_heap_leak(&leak_options)
                };
                if let Some(report) = report {
                    let spec = mode_spec(mode);
                    if let Ok(bytes) = JsonWriter::to_bytes(&AnalysisOutput::Leak(report), None) {
                        let _ = sink.record_artifact(mode, spec.outputs.leak, &bytes);
                    }
                }
            }
        }

        Ok(warnings)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sink::VecResultSink;

    #[test]
    fn mode_spec_cpu_builds_all_three() {
        let spec = mode_spec(AnalysisMode::Cpu);
        assert!(spec.build_flame && spec.build_call_graph && spec.build_stats);
        assert_eq!(spec.parser, ParserKind::Collapsed);
    }

    #[test]
    fn java_heap_spec_uses_hprof_parser_and_builds_nothing_sample_derived() {
        let spec = mode_spec(AnalysisMode::JavaHeap);
        assert_eq!(spec.parser, ParserKind::Hprof);
        assert!(!spec.build_flame && !spec.build_call_graph && !spec.build_stats);
    }

    #[test]
    fn analyze_rejects_hprof_mode_directly() {
        let analyzer = Analyzer::new(AnalysisModeConfig::default());
        let sink = VecResultSink::new();
        let cancel = CancellationToken::new();
        let result = analyzer.analyze(AnalysisMode::JavaHeap, b"", &sink, &cancel);
        assert!(matches!(result, Err(AnalysisError::UnsupportedMode(_))));
    }

    #[test]
    fn analyze_on_collapsed_input_writes_three_artifacts() {
        let analyzer = Analyzer::new(AnalysisModeConfig::default());
        let sink = VecResultSink::new();
        let cancel = CancellationToken::new();
        let input = b"main;work 10\nmain;other 5\n";
        let written = analyzer.analyze(AnalysisMode::Cpu, input, &sink, &cancel).unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(sink.artifacts().len(), 3);
    }

    #[test]
    fn analyze_on_empty_collapsed_input_is_empty_data() {
        let analyzer = Analyzer::new(AnalysisModeConfig::default());
        let sink = VecResultSink::new();
        let cancel = CancellationToken::new();
        let result = analyzer.analyze(AnalysisMode::Cpu, b"", &sink, &cancel);
        assert!(matches!(result, Err(AnalysisError::EmptyData(_))));
    }
}
