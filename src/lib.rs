//! Offline profile-analysis engine for collapsed/folded stacks (perf,
//! async-profiler), Go `pprof` protobuf profiles, and Java HPROF heap
//! dumps.
//!
//! Three input formats feed one shared [`model::Sample`] model, from
//! which [`flamegraph`], [`callgraph`], and [`stats`] build their
//! artifacts; HPROF instead feeds a [`heap::reference_graph::ReferenceGraph`]
//! that [`heap::dominator`] and [`heap::gcroot_path`] analyze directly.
//! [`dispatch`] ties the ten [`config::AnalysisMode`] variants to this
//! machinery through one dispatch table.
//!
//! This crate has no CLI, no config-file loader, and no persistence
//! layer — a caller wires those up against [`sink::ResultSink`] and
//! [`sink::SuggestionInput`]. A minimal end-to-end call looks like:
//!
//! ```no_run
//! use pyrograph::cancel::CancellationToken;
//! use pyrograph::config::{AnalysisMode, AnalysisModeConfig};
//! use pyrograph::dispatch::Analyzer;
//! use pyrograph::sink::VecResultSink;
//!
//! let analyzer = Analyzer::new(AnalysisModeConfig::default());
//! let sink = VecResultSink::new();
//! let cancel = CancellationToken::new();
//! let collapsed_stacks = b"main;work 10\n";
//! analyzer.analyze(AnalysisMode::Cpu, collapsed_stacks, &sink, &cancel).unwrap();
//! for (mode, name, bytes) in sink.artifacts() {
//!     println!("{mode:?}/{name}: {} bytes", bytes.len());
//! }
//! ```

pub mod cancel;
pub mod callgraph;
pub mod concurrency;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod flamegraph;
pub mod heap;
pub mod heap_report;
pub mod leak;
pub mod model;
pub mod output;
pub mod parse;
pub mod serialize;
pub mod sink;
pub mod stats;
