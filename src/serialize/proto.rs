//! Generated protobuf bindings for `ReferenceGraphProto`
//! (see `proto/reference_graph.proto`), compiled by `build.rs`.

include!(concat!(env!("OUT_DIR"), "/pyrograph.refgraph.rs"));
