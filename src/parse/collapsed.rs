//! Folded/collapsed stack parsing: `perf script | stackcollapse-perf.pl`
//! or async-profiler `--collapsed` output, one call stack per line.

use regex::Regex;
use std::io::BufRead;
use std::sync::OnceLock;

use crate::cancel::CancellationToken;
use crate::config::CollapsedParseOptions;
use crate::error::{AnalysisError, Result};
use crate::model::{is_swapper_name, Sample};

/// Matches the APM bracket thread-identity form: `[<thread_name> tid=<tid>]`.
fn apm_thread_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[(.+)\s+tid=(\d+)\]$").unwrap())
}

/// Matches lines that are invalid synthetic test data: a first prefix
/// element starting with `\d+_\d+_`.
fn synthetic_data_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+_\d+_").unwrap())
}

#[derive(Debug, Default)]
pub struct ParseResult {
    pub samples: Vec<Sample>,
    pub total_samples: i64,
    /// Non-fatal issues encountered while parsing (malformed line N,
    /// rejected synthetic-data line, etc).
    pub warnings: Vec<String>,
}

struct ThreadIdentity {
    name: String,
    tid: i64,
    is_swapper: bool,
    /// Index into the prefix elements where the actual call stack
    /// begins (after consuming the thread-identity element(s)).
    stack_start: usize,
}

fn extract_thread_identity(elements: &[&str]) -> ThreadIdentity {
    let first = elements[0];

    if let Some(caps) = apm_thread_re().captures(first) {
        let name = caps[1].to_string();
        let tid: i64 = caps[2].parse().unwrap_or(-1);
        let is_swapper = is_swapper_name(&name);
        // Tolerate a duplicated APM-form element immediately following.
        let mut stack_start = 1;
        if elements.len() > 1 && apm_thread_re().is_match(elements[1]) {
            stack_start = 2;
        }
        return ThreadIdentity {
            name,
            tid,
            is_swapper,
            stack_start,
        };
    }

    // Standard perf form: "<process>-<pid>/<tid>".
    if let Some(slash) = first.rfind('/') {
        if let Some(dash) = first[..slash].rfind('-') {
            let name = first[..dash].to_string();
            let tid: i64 = first[slash + 1..].parse().unwrap_or(-1);
            let is_swapper = is_swapper_name(&name);
            return ThreadIdentity {
                name,
                tid,
                is_swapper,
                stack_start: 1,
            };
        }
    }

    let name = first.to_string();
    let is_swapper = is_swapper_name(&name);
    ThreadIdentity {
        name,
        tid: -1,
        is_swapper,
        stack_start: 1,
    }
}

/// Parse a folded-stack text stream into a [`ParseResult`].
///
/// Fails with `ParseError` on an unreadable stream. An empty stream
/// produces an empty, non-error [`ParseResult`] -- callers that want to
/// treat "zero samples" as `EMPTY_DATA` check `samples.is_empty()`
/// themselves, matching spec.md's "callers interpret empty as
/// EMPTY_DATA" contract.
pub fn parse<R: BufRead>(
    reader: R,
    options: &CollapsedParseOptions,
    cancel: &CancellationToken,
) -> Result<ParseResult> {
    let mut result = ParseResult::default();

    for (line_no, line) in reader.lines().enumerate() {
        cancel.check_every(line_no)?;
        let line = line.map_err(AnalysisError::Io)?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            continue;
        }
        if line.len() > options.max_line_len {
            return Err(AnalysisError::parse(
                "collapsed",
                format!("line {line_no} exceeds max_line_len ({} bytes)", line.len()),
            ));
        }

        match parse_line(line) {
            Ok(Some(sample)) => {
                result.total_samples += sample.value;
                result.samples.push(sample);
            }
            Ok(None) => {
                result.warnings.push(format!("line {line_no}: rejected synthetic data"));
            }
            Err(message) => {
                result.warnings.push(format!("line {line_no}: {message}"));
            }
        }
    }

    Ok(result)
}

/// Parse one non-blank line. Returns `Ok(None)` for a line silently
/// rejected as invalid synthetic data, `Err` for a malformed line that
/// the caller should count and skip.
fn parse_line(line: &str) -> std::result::Result<Option<Sample>, String> {
    let split_at = line
        .rfind(|c: char| c.is_whitespace())
        .ok_or_else(|| "no whitespace separating count from stack".to_string())?;
    let (prefix, count_str) = line.split_at(split_at);
    let count_str = count_str.trim();
    let value: i64 = count_str
        .parse()
        .map_err(|_| format!("invalid count {count_str:?}"))?;

    let elements: Vec<&str> = prefix.split(';').collect();
    if elements.is_empty() || elements[0].is_empty() {
        return Err("empty stack prefix".to_string());
    }

    if synthetic_data_re().is_match(elements[0]) {
        return Ok(None);
    }

    let identity = extract_thread_identity(&elements);

    let call_stack: Vec<String> = elements[identity.stack_start..]
        .iter()
        .filter(|frame| !frame.is_empty() && **frame != "[]")
        .map(|frame| frame.to_string())
        .collect();

    if call_stack.is_empty() {
        return Err("empty call stack after filtering".to_string());
    }

    if value < 0 {
        return Err(format!("negative value {value}"));
    }

    let mut sample = Sample::new(identity.name, identity.tid, call_stack, value);
    sample.is_swapper = identity.is_swapper;
    Ok(Some(sample))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn parse_str(s: &str) -> ParseResult {
        parse(Cursor::new(s), &CollapsedParseOptions::default(), &CancellationToken::new()).unwrap()
    }

    #[test]
    fn collapsed_basic_scenario() {
        let result = parse_str(
            "main-thread;java.lang.Thread.run;com.example.App.main 100\n\
             worker-1;java.lang.Thread.run;com.example.Worker.process 50\n",
        );
        assert_eq!(result.total_samples, 150);
        assert_eq!(result.samples.len(), 2);
        assert!(result.samples.iter().all(|s| s.tid == -1));
    }

    #[test]
    fn aggregation_is_not_done_by_parser() {
        let result = parse_str("t;a;b 50\nt;a;b 30\nt;a;b 20\n");
        assert_eq!(result.samples.len(), 3);
        assert_eq!(result.total_samples, 100);
    }

    #[test]
    fn apm_thread_form() {
        let result = parse_str("[worker-pool-1 tid=42];frame1;frame2 10\n");
        let s = &result.samples[0];
        assert_eq!(s.thread_name, "worker-pool-1");
        assert_eq!(s.tid, 42);
        assert_eq!(s.call_stack, vec!["frame1", "frame2"]);
    }

    #[test]
    fn apm_thread_form_tolerates_duplicate() {
        let result = parse_str("[worker tid=1];[worker tid=1];frame 10\n");
        let s = &result.samples[0];
        assert_eq!(s.thread_name, "worker");
        assert_eq!(s.call_stack, vec!["frame"]);
    }

    #[test]
    fn standard_perf_thread_form() {
        let result = parse_str("myproc-1234/5678;frame 1\n");
        let s = &result.samples[0];
        assert_eq!(s.thread_name, "myproc-1234");
        assert_eq!(s.tid, 5678);
    }

    #[test]
    fn plain_thread_name_has_tid_negative_one() {
        let result = parse_str("justathread;frame 1\n");
        assert_eq!(result.samples[0].tid, -1);
    }

    #[test]
    fn swapper_marked_and_excluded_by_default() {
        let result = parse_str("swapper/0;idle 5\n");
        assert!(result.samples[0].is_swapper);
    }

    #[test]
    fn synthetic_data_lines_are_skipped_silently() {
        let result = parse_str("123_456_garbage;frame 1\nreal;frame 2\n");
        assert_eq!(result.samples.len(), 1);
        assert_eq!(result.samples[0].thread_name, "real");
    }

    #[test]
    fn empty_frames_are_elided() {
        let result = parse_str("t;;frame;[] 1\n");
        assert_eq!(result.samples[0].call_stack, vec!["frame"]);
    }

    #[test]
    fn empty_stream_yields_empty_result() {
        let result = parse_str("");
        assert!(result.samples.is_empty());
        assert_eq!(result.total_samples, 0);
    }

    #[test]
    fn max_line_len_rejects_long_lines() {
        let long_stack = "a;".repeat(100_000);
        let line = format!("t;{long_stack}frame 1");
        let options = CollapsedParseOptions::default();
        let err = parse(Cursor::new(line), &options, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, AnalysisError::ParseError { .. }));
    }

    #[test]
    fn malformed_line_is_counted_and_skipped() {
        let result = parse_str("no count here\nt;frame 5\n");
        assert_eq!(result.samples.len(), 1);
        assert_eq!(result.warnings.len(), 1);
    }
}
