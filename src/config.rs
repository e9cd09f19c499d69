//! Options records for every builder in the crate, plus the top-level
//! [`AnalysisModeConfig`] consumed by [`crate::dispatch`].
//!
//! Every option in the spec's configuration table has a field here
//! with the documented default, constructed with the teacher's
//! consuming-builder style (`fn foo(mut self, v: T) -> Self`).

use std::path::PathBuf;

/// Where per-task artifact directories are rooted. `None` means "use
/// the system temp directory", matching the spec's `output_dir` default.
#[derive(Debug, Clone, Default)]
pub struct OutputRoot(pub Option<PathBuf>);

#[derive(Debug, Clone)]
pub struct CollapsedParseOptions {
    /// Lines longer than this are rejected rather than silently
    /// truncated.
    pub max_line_len: usize,
    pub include_swapper: bool,
}

impl Default for CollapsedParseOptions {
    fn default() -> Self {
        CollapsedParseOptions {
            max_line_len: 64 * 1024,
            include_swapper: false,
        }
    }
}

impl CollapsedParseOptions {
    pub fn max_line_len(mut self, v: usize) -> Self {
        self.max_line_len = v;
        self
    }

    pub fn include_swapper(mut self, v: bool) -> Self {
        self.include_swapper = v;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct PprofDecodeOptions {
    pub include_swapper: bool,
}

#[derive(Debug, Clone)]
pub struct FlameGraphOptions {
    pub min_percent: f64,
    pub include_module: bool,
    pub enable_thread_analysis: bool,
    pub top_n_per_thread: usize,
    pub top_n_global: usize,
    pub max_call_stacks_per_thread: usize,
    pub max_call_stacks_per_func: usize,
    pub include_swapper: bool,
    pub build_per_thread_flamegraphs: bool,
    pub include_thread_in_stack: bool,
}

impl Default for FlameGraphOptions {
    fn default() -> Self {
        FlameGraphOptions {
            min_percent: 0.0,
            include_module: true,
            enable_thread_analysis: false,
            top_n_per_thread: 10,
            top_n_global: 50,
            max_call_stacks_per_thread: 20,
            max_call_stacks_per_func: 20,
            include_swapper: false,
            build_per_thread_flamegraphs: false,
            include_thread_in_stack: false,
        }
    }
}

macro_rules! builder_fields {
    ($ty:ty { $($field:ident : $fty:ty),+ $(,)? }) => {
        impl $ty {
            $(
                pub fn $field(mut self, v: $fty) -> Self {
                    self.$field = v;
                    self
                }
            )+
        }
    };
}

builder_fields!(FlameGraphOptions {
    min_percent: f64,
    include_module: bool,
    enable_thread_analysis: bool,
    top_n_per_thread: usize,
    top_n_global: usize,
    max_call_stacks_per_thread: usize,
    max_call_stacks_per_func: usize,
    include_swapper: bool,
    build_per_thread_flamegraphs: bool,
    include_thread_in_stack: bool,
});

#[derive(Debug, Clone)]
pub struct CallGraphOptions {
    pub min_node_pct: f64,
    pub min_edge_pct: f64,
    pub hot_path_top_n: usize,
    pub max_thread_call_graphs: usize,
    pub include_swapper: bool,
}

impl Default for CallGraphOptions {
    fn default() -> Self {
        CallGraphOptions {
            min_node_pct: 0.0,
            min_edge_pct: 0.0,
            hot_path_top_n: 20,
            max_thread_call_graphs: 20,
            include_swapper: false,
        }
    }
}

builder_fields!(CallGraphOptions {
    min_node_pct: f64,
    min_edge_pct: f64,
    hot_path_top_n: usize,
    max_thread_call_graphs: usize,
    include_swapper: bool,
});

#[derive(Debug, Clone)]
pub struct StatsOptions {
    pub top_n: usize,
    pub include_swapper: bool,
}

impl Default for StatsOptions {
    fn default() -> Self {
        StatsOptions {
            top_n: 50,
            include_swapper: false,
        }
    }
}

builder_fields!(StatsOptions {
    top_n: usize,
    include_swapper: bool,
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Zstd,
}

#[derive(Debug, Clone)]
pub struct SerializerOptions {
    pub compression: Compression,
    pub level: i32,
    pub include_dominator_data: bool,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        SerializerOptions {
            compression: Compression::Zstd,
            level: 3,
            include_dominator_data: true,
        }
    }
}

builder_fields!(SerializerOptions {
    compression: Compression,
    level: i32,
    include_dominator_data: bool,
});

#[derive(Debug, Clone)]
pub struct LeakDetectorOptions {
    pub heap_severity_pct: SeverityThresholds,
    pub heap_severity_bytes_per_min: SeverityThresholds,
    pub goroutine_severity_pct: SeverityThresholds,
    pub goroutine_severity_per_min: SeverityThresholds,
    pub max_growth_items: usize,
}

/// `(none, low, medium, high)` upper bounds for one severity axis; a
/// value greater than `high` is `critical`.
#[derive(Debug, Clone, Copy)]
pub struct SeverityThresholds {
    pub none: f64,
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for LeakDetectorOptions {
    fn default() -> Self {
        LeakDetectorOptions {
            heap_severity_pct: SeverityThresholds {
                none: 5.0,
                low: 20.0,
                medium: 50.0,
                high: 100.0,
            },
            heap_severity_bytes_per_min: SeverityThresholds {
                none: 1.0 * 1024.0 * 1024.0,
                low: 10.0 * 1024.0 * 1024.0,
                medium: 50.0 * 1024.0 * 1024.0,
                high: 100.0 * 1024.0 * 1024.0,
            },
            goroutine_severity_pct: SeverityThresholds {
                none: 5.0,
                low: 20.0,
                medium: 50.0,
                high: 100.0,
            },
            goroutine_severity_per_min: SeverityThresholds {
                none: 10.0,
                low: 50.0,
                medium: 100.0,
                high: 500.0,
            },
            max_growth_items: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AnalysisMode {
    JavaCpu,
    JavaAlloc,
    JavaHeap,
    Cpu,
    PprofCpu,
    PprofHeap,
    PprofGoroutine,
    PprofBlock,
    PprofMutex,
    PprofAll,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::JavaCpu => "java-cpu",
            AnalysisMode::JavaAlloc => "java-alloc",
            AnalysisMode::JavaHeap => "java-heap",
            AnalysisMode::Cpu => "cpu",
            AnalysisMode::PprofCpu => "pprof-cpu",
            AnalysisMode::PprofHeap => "pprof-heap",
            AnalysisMode::PprofGoroutine => "pprof-goroutine",
            AnalysisMode::PprofBlock => "pprof-block",
            AnalysisMode::PprofMutex => "pprof-mutex",
            AnalysisMode::PprofAll => "pprof-all",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisModeConfig {
    pub output_root: OutputRoot,
    pub top_funcs_n: usize,
    pub flame: FlameGraphOptions,
    pub call_graph: CallGraphOptions,
    pub stats: StatsOptions,
    pub serializer: SerializerOptions,
}

impl Default for AnalysisModeConfig {
    fn default() -> Self {
        AnalysisModeConfig {
            output_root: OutputRoot::default(),
            top_funcs_n: 50,
            flame: FlameGraphOptions::default(),
            call_graph: CallGraphOptions::default(),
            stats: StatsOptions::default(),
            serializer: SerializerOptions::default(),
        }
    }
}
