//! Shared value types that every parser produces and every builder
//! consumes: [`Sample`], the frame name/module split, and the
//! thread-group folding rule used by both the flame-graph thread
//! analysis and the call-graph thread-group rollup.

use serde::Serialize;

/// One aggregated measurement: a thread identity, a root-to-leaf call
/// stack, and a domain-dependent value (CPU samples, bytes,
/// allocations, goroutine count, contention count, delay nanoseconds).
///
/// `call_stack` is ordered root→leaf: index 0 is the outermost frame,
/// the last element is the hot leaf. Samples with an empty stack are
/// never constructed by a parser in this crate; builders may assume
/// `call_stack` is non-empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub thread_name: String,
    pub tid: i64,
    pub call_stack: Vec<String>,
    pub value: i64,
    pub is_swapper: bool,
}

impl Sample {
    pub fn new(thread_name: impl Into<String>, tid: i64, call_stack: Vec<String>, value: i64) -> Self {
        let thread_name = thread_name.into();
        let is_swapper = is_swapper_name(&thread_name);
        Sample {
            thread_name,
            tid,
            call_stack,
            value,
            is_swapper,
        }
    }

    pub fn leaf(&self) -> Option<&str> {
        self.call_stack.last().map(String::as_str)
    }
}

/// `true` for thread names that mark an idle-CPU placeholder: `swapper`,
/// `swapper/<n>`, or the bracketed kernel form `[swapper/<n>]`.
pub fn is_swapper_name(thread_name: &str) -> bool {
    let trimmed = thread_name.trim_start_matches('[');
    trimmed == "swapper" || trimmed.starts_with("swapper/")
}

/// Split a frame string `"funcName(module)"` into `(name, module)` by
/// locating the **last** `'('` balanced by a terminating `')'`.
///
/// If no balanced trailing parens exist, the whole string is the name
/// and the module is empty. This rule is canonical and round-trips:
/// `split("f(m)") == ("f", "m")`, `split("f") == ("f", "")`,
/// `split("f(") == ("f(", "")`.
pub fn split_frame(frame: &str) -> (&str, &str) {
    if !frame.ends_with(')') {
        return (frame, "");
    }
    let bytes = frame.as_bytes();
    let mut depth = 0i32;
    let mut open = None;
    for (i, &b) in bytes.iter().enumerate().rev() {
        match b {
            b')' => depth += 1,
            b'(' => {
                depth -= 1;
                if depth == 0 {
                    open = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    match open {
        Some(open) if open + 1 < frame.len() => {
            let name = &frame[..open];
            let module = &frame[open + 1..frame.len() - 1];
            (name, module)
        }
        _ => (frame, ""),
    }
}

/// Recombine a `(name, module)` pair back into the `"name(module)"`
/// wire form, the inverse of [`split_frame`] for non-empty modules.
pub fn join_frame(name: &str, module: &str) -> String {
    if module.is_empty() {
        name.to_string()
    } else {
        format!("{name}({module})")
    }
}

/// Strip trailing characters in `[0-9\-_#]` from a thread name to fold
/// thread-pool siblings (`worker-1`, `worker-42`) into one group. If
/// stripping empties the string, the original name is returned as its
/// own group (this keeps all-digit thread names unchanged).
pub fn extract_thread_group(thread_name: &str) -> &str {
    let trimmed = thread_name.trim_end_matches(|c: char| c.is_ascii_digit() || matches!(c, '-' | '_' | '#'));
    if trimmed.is_empty() {
        thread_name
    } else {
        trimmed
    }
}

/// The Recursion Separator (RS, `0x1E`) used to build composite flame
/// graph child keys so that frames differing only in module, process,
/// or tid do not merge.
pub const COMPOSITE_KEY_SEPARATOR: char = '\u{1E}';

/// Build a flame-graph child key from a frame name plus optional
/// metadata. With no metadata the key is the name alone; otherwise it
/// is `name, module, process, tid` joined by [`COMPOSITE_KEY_SEPARATOR`].
pub fn composite_key(name: &str, module: &str, process: &str, tid: Option<i64>) -> String {
    if module.is_empty() && process.is_empty() && tid.is_none() {
        return name.to_string();
    }
    let tid_str = tid.map(|t| t.to_string()).unwrap_or_default();
    format!(
        "{name}{sep}{module}{sep}{process}{sep}{tid_str}",
        sep = COMPOSITE_KEY_SEPARATOR
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn split_frame_round_trips() {
        assert_eq!(split_frame("f(m)"), ("f", "m"));
        assert_eq!(split_frame("f"), ("f", ""));
        assert_eq!(split_frame("f("), ("f(", ""));
        assert_eq!(
            split_frame("java.lang.Thread.run(Thread.java)"),
            ("java.lang.Thread.run", "Thread.java")
        );
    }

    #[test]
    fn split_frame_handles_nested_parens_via_last_open() {
        // The last '(' balanced by a trailing ')' wins, so a module
        // name containing parens is taken verbatim.
        assert_eq!(split_frame("f(a(b))"), ("f", "a(b)"));
    }

    #[test]
    fn split_frame_empty_parens() {
        assert_eq!(split_frame("f()"), ("f", ""));
    }

    #[test]
    fn thread_group_determinism() {
        assert_eq!(extract_thread_group("worker-1"), extract_thread_group("worker-42"));
        assert_eq!(extract_thread_group("12345"), "12345");
    }

    #[test]
    fn thread_group_strips_pool_suffix() {
        assert_eq!(extract_thread_group("pool-1-thread-1"), "pool-1-thread");
        assert_eq!(extract_thread_group("pool-1-thread-2"), "pool-1-thread");
        assert_eq!(extract_thread_group("pool-2-thread-1"), "pool-2-thread");
    }

    #[test]
    fn swapper_detection() {
        assert!(is_swapper_name("swapper"));
        assert!(is_swapper_name("swapper/0"));
        assert!(is_swapper_name("[swapper/0]"));
        assert!(!is_swapper_name("swapperoo"));
    }

    #[test]
    fn composite_key_distinguishes_module() {
        let a = composite_key("f", "m1", "", None);
        let b = composite_key("f", "m2", "", None);
        assert_ne!(a, b);
        assert_eq!(composite_key("f", "", "", None), "f");
    }
}
