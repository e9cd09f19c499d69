//! Input-format parsers. Each produces [`crate::model::Sample`]s (or,
//! for HPROF, a [`crate::heap::reference_graph::ReferenceGraph`])
//! consumed read-only by the builders in [`crate::flamegraph`],
//! [`crate::callgraph`], and [`crate::stats`].

pub mod collapsed;
pub mod hprof;
pub mod pprof;
