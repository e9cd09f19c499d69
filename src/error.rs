use std::io;

/// Error kinds surfaced by the core analysis engine.
///
/// Parsers recover from individual malformed lines or records (counted
/// and skipped, surfaced via `ParseResult::warnings`) but return one of
/// these on stream-level corruption. Builders never recover from
/// upstream errors; they propagate whatever the parser returned.
#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    /// Input bytes were malformed: bad pprof framing, an unreadable
    /// HPROF header, or a stream that could not be tokenized at all.
    #[error("parse error in {source_kind}: {message}")]
    ParseError {
        source_kind: &'static str,
        message: String,
    },

    /// Parsing succeeded but produced zero usable samples, instances,
    /// or no matching sample type.
    #[error("empty data: {0}")]
    EmptyData(String),

    /// Caller asked for a mode/combination not implemented.
    #[error("unsupported mode: {0}")]
    UnsupportedMode(String),

    /// The cancellation token fired during processing.
    #[error("operation canceled")]
    Canceled,

    /// A retained-size or dominator accessor was called before
    /// `DominatorEngine::compute` ran. Always a programmer error.
    #[error("dominator data not computed yet")]
    NotComputed,

    /// Reading input or writing output failed at the I/O layer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

impl AnalysisError {
    pub fn parse(source_kind: &'static str, message: impl Into<String>) -> Self {
        AnalysisError::ParseError {
            source_kind,
            message: message.into(),
        }
    }
}
