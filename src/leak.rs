//! Two-snapshot leak diagnostics: diff leaf-function totals between
//! the first and last of a series of profiles, classify severity by
//! total growth percent and per-minute rate.

use std::collections::HashMap;

use serde::Serialize;

use crate::config::{LeakDetectorOptions, SeverityThresholds};
use crate::model::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityThresholds {
    /// Classify `value` against this axis's four upper bounds; above
    /// `high` is `critical`.
    fn classify(&self, value: f64) -> Severity {
        if value <= self.none {
            Severity::None
        } else if value <= self.low {
            Severity::Low
        } else if value <= self.medium {
            Severity::Medium
        } else if value <= self.high {
            Severity::High
        } else {
            Severity::Critical
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GrowthItem {
    pub function: String,
    pub baseline: i64,
    pub current: i64,
    pub growth: i64,
    pub growth_pct: f64,
    pub rate_per_sec: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeakReport {
    pub severity: Severity,
    pub growth_items: Vec<GrowthItem>,
    pub elapsed_secs: f64,
}

struct Snapshot {
    samples: Vec<Sample>,
    timestamp_ms: i64,
}

/// Holds an ordered series of profiles for one sample-type axis.
/// Comparisons always use the first and last snapshot added.
#[derive(Default)]
pub struct LeakDetector {
    snapshots: Vec<Snapshot>,
}

impl LeakDetector {
    pub fn new() -> Self {
        LeakDetector::default()
    }

    pub fn add_profile(&mut self, samples: Vec<Sample>, timestamp_ms: i64) {
        self.snapshots.push(Snapshot { samples, timestamp_ms });
    }

    pub fn detect_heap_leak(&self, options: &LeakDetectorOptions) -> Option<LeakReport> {
        self.detect(options, |growth_pct, rate_per_sec| {
            let rate_per_min = rate_per_sec * 60.0;
            severity_for(options.heap_severity_pct.classify(growth_pct), options.heap_severity_bytes_per_min.classify(rate_per_min))
        })
    }

    pub fn detect_goroutine_leak(&self, options: &LeakDetectorOptions) -> Option<LeakReport> {
        self.detect(options, |growth_pct, rate_per_sec| {
            let rate_per_min = rate_per_sec * 60.0;
            severity_for(
                options.goroutine_severity_pct.classify(growth_pct),
                options.goroutine_severity_per_min.classify(rate_per_min),
            )
        })
    }

    /// Leaf-function total for `sample_type` across both endpoints,
    /// useful for plotting without the severity classification.
    pub fn trend(&self) -> Option<(i64, i64)> {
        let first = self.snapshots.first()?;
        let last = self.snapshots.last()?;
        Some((leaf_totals(&first.samples).values().sum(), leaf_totals(&last.samples).values().sum()))
    }

    fn detect(&self, options: &LeakDetectorOptions, classify: impl Fn(f64, f64) -> Severity) -> Option<LeakReport> {
        let first = self.snapshots.first()?;
        let last = self.snapshots.last()?;

        let baseline = leaf_totals(&first.samples);
        let current = leaf_totals(&last.samples);

        let elapsed_secs = ((last.timestamp_ms - first.timestamp_ms).max(1000) as f64) / 1000.0;

        let mut functions: std::collections::HashSet<&str> = baseline.keys().map(String::as_str).collect();
        functions.extend(current.keys().map(String::as_str));

        let mut items: Vec<GrowthItem> = functions
            .into_iter()
            .filter_map(|f| {
                let base = baseline.get(f).copied().unwrap_or(0);
                let cur = current.get(f).copied().unwrap_or(0);
                let growth = cur - base;
                if growth <= 0 {
                    return None;
                }
                let growth_pct = if base == 0 { 100.0 } else { (growth as f64) / (base as f64) * 100.0 };
                Some(GrowthItem {
                    function: f.to_string(),
                    baseline: base,
                    current: cur,
                    growth,
                    growth_pct,
                    rate_per_sec: (growth as f64) / elapsed_secs,
                })
            })
            .collect();

        items.sort_by(|a, b| b.growth.abs().cmp(&a.growth.abs()).then_with(|| a.function.cmp(&b.function)));
        items.truncate(options.max_growth_items);

        if items.is_empty() {
            return Some(LeakReport {
                severity: Severity::None,
                growth_items: items,
                elapsed_secs,
            });
        }

        let total_baseline: i64 = baseline.values().sum();
        let total_current: i64 = current.values().sum();
        let total_growth = (total_current - total_baseline).max(0);
        let total_growth_pct = if total_baseline == 0 { 100.0 } else { (total_growth as f64) / (total_baseline as f64) * 100.0 };
        let total_rate_per_sec = (total_growth as f64) / elapsed_secs;

        let severity = classify(total_growth_pct, total_rate_per_sec);

        Some(LeakReport {
            severity,
            growth_items: items,
            elapsed_secs,
        })
    }
}

/// A severity level is entered only once *both* the percent and rate
/// thresholds for that level are satisfied, so the combined severity
/// is the more severe of the two independently-classified axes.
fn severity_for(by_pct: Severity, by_rate: Severity) -> Severity {
    by_pct.max(by_rate)
}

fn leaf_totals(samples: &[Sample]) -> HashMap<String, i64> {
    let mut totals = HashMap::new();
    for sample in samples {
        if let Some(leaf) = sample.leaf() {
            *totals.entry(leaf.to_string()).or_insert(0) += sample.value;
        }
    }
    totals
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample(stack: &[&str], value: i64) -> Sample {
        Sample::new("t", 1, stack.iter().map(|s| s.to_string()).collect(), value)
    }

    #[test]
    fn identical_snapshots_yield_no_growth_and_none_severity() {
        let mut detector = LeakDetector::new();
        let snap = vec![sample(&["a"], 1000), sample(&["b"], 500)];
        detector.add_profile(snap.clone(), 0);
        detector.add_profile(snap, 60_000);

        let report = detector.detect_heap_leak(&LeakDetectorOptions::default()).unwrap();
        assert_eq!(report.severity, Severity::None);
        assert!(report.growth_items.is_empty());
    }

    #[test]
    fn only_growing_functions_are_reported() {
        let mut detector = LeakDetector::new();
        detector.add_profile(vec![sample(&["a"], 1000), sample(&["b"], 2000)], 0);
        detector.add_profile(vec![sample(&["a"], 500), sample(&["b"], 2000)], 60_000);

        let report = detector.detect_heap_leak(&LeakDetectorOptions::default()).unwrap();
        assert!(report.growth_items.is_empty());
    }

    #[test]
    fn large_growth_classified_critical() {
        let mut detector = LeakDetector::new();
        detector.add_profile(vec![sample(&["a"], 1_000_000)], 0);
        detector.add_profile(vec![sample(&["a"], 1_000_000_000)], 60_000);

        let report = detector.detect_heap_leak(&LeakDetectorOptions::default()).unwrap();
        assert_eq!(report.severity, Severity::Critical);
        assert_eq!(report.growth_items[0].function, "a");
    }

    #[test]
    fn new_function_with_zero_baseline_is_100_percent_growth() {
        let mut detector = LeakDetector::new();
        detector.add_profile(vec![sample(&["a"], 100)], 0);
        detector.add_profile(vec![sample(&["a"], 100), sample(&["leaked"], 50)], 60_000);

        let report = detector.detect_heap_leak(&LeakDetectorOptions::default()).unwrap();
        let leaked = report.growth_items.iter().find(|g| g.function == "leaked").unwrap();
        assert_eq!(leaked.growth_pct, 100.0);
    }

    #[test]
    fn comparison_uses_first_and_last_ignoring_middle_snapshots() {
        let mut detector = LeakDetector::new();
        detector.add_profile(vec![sample(&["a"], 100)], 0);
        detector.add_profile(vec![sample(&["a"], 100_000)], 30_000);
        detector.add_profile(vec![sample(&["a"], 150)], 60_000);

        let report = detector.detect_heap_leak(&LeakDetectorOptions::default()).unwrap();
        assert_eq!(report.growth_items[0].growth, 50);
    }
}
