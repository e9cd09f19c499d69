//! JSON (optionally gzip-framed) artifact writers. Every analysis
//! mode in `src/dispatch.rs` ends by handing one of these serialized
//! byte buffers to a [`crate::sink::ResultSink`].

use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use serde::Serialize;

use crate::error::{AnalysisError, Result};

pub struct JsonWriter;

impl JsonWriter {
    /// Serialize `value` to pretty JSON, gzip-wrapping it when
    /// `gzip_level` is `Some`.
    pub fn to_bytes<T: Serialize>(value: &T, gzip_level: Option<u32>) -> Result<Vec<u8>> {
        let json = serde_json::to_vec_pretty(value).map_err(|e| AnalysisError::parse("json", e.to_string()))?;
        match gzip_level {
            None => Ok(json),
            Some(level) => {
                let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::new(level.clamp(0, 9)));
                encoder.write_all(&json)?;
                Ok(encoder.finish()?)
            }
        }
    }

    /// Like [`Self::to_bytes`] but also writes the result to `path`,
    /// appending `.gz` when compressed.
    pub fn write_file<T: Serialize>(value: &T, path: &Path, gzip_level: Option<u32>) -> Result<std::path::PathBuf> {
        let bytes = Self::to_bytes(value, gzip_level)?;
        let final_path = if gzip_level.is_some() {
            let mut p = path.as_os_str().to_owned();
            p.push(".gz");
            std::path::PathBuf::from(p)
        } else {
            path.to_path_buf()
        };
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&final_path, &bytes)?;
        Ok(final_path)
    }
}

/// Discriminated union over every artifact this crate can emit, so a
/// caller storing heterogeneous results can match on `kind` in JSON.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum AnalysisOutput {
    Flame(crate::flamegraph::FlameGraph),
    Call(crate::callgraph::CallGraph),
    Heap(crate::heap_report::HeapReport),
    Histogram(crate::heap_report::ClassHistogramReport),
    Leak(crate::leak::LeakReport),
    Stats(crate::stats::StatsReport),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stats::StatsReport;

    #[test]
    fn gzip_output_is_smaller_or_equal_and_decodes_back() {
        let report = StatsReport::default();
        let plain = JsonWriter::to_bytes(&report, None).unwrap();
        let gzipped = JsonWriter::to_bytes(&report, Some(6)).unwrap();

        let mut decoder = flate2::read::GzDecoder::new(gzipped.as_slice());
        let mut restored = Vec::new();
        std::io::Read::read_to_end(&mut decoder, &mut restored).unwrap();
        assert_eq!(restored, plain);
    }

    #[test]
    fn analysis_output_tags_discriminant_in_json() {
        let output = AnalysisOutput::Stats(StatsReport::default());
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"kind\":\"Stats\""));
    }
}
