//! Generated protobuf bindings for `perftools.profiles.Profile`
//! (see `proto/pprof.proto`), compiled by `build.rs` via `prost-build`.

include!(concat!(env!("OUT_DIR"), "/pyrograph.pprof.rs"));
