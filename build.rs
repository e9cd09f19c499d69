use std::io::Result;

fn main() -> Result<()> {
    std::env::set_var(
        "PROTOC",
        protoc_bin_vendored::protoc_bin_path().expect("bundled protoc binary"),
    );

    let mut config = prost_build::Config::new();
    config.type_attribute(".", "#[allow(clippy::large_enum_variant)]");
    config.compile_protos(
        &["proto/pprof.proto", "proto/reference_graph.proto"],
        &["proto/"],
    )?;

    println!("cargo:rerun-if-changed=proto/pprof.proto");
    println!("cargo:rerun-if-changed=proto/reference_graph.proto");

    Ok(())
}
