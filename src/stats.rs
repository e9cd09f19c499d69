//! Top-function and per-thread statistics over a sample batch --
//! the lightest-weight of the builders, used standalone when a caller
//! only wants ranked tables rather than a full tree.

use serde::Serialize;
use std::collections::HashMap;

use crate::config::StatsOptions;
use crate::model::Sample;

const TOP_CALL_STACKS_PER_FUNC: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct TopFunctionEntry {
    pub name: String,
    pub self_samples: i64,
    pub self_percent: f64,
    pub top_call_stacks: Vec<(String, i64)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadStatEntry {
    pub tid: i64,
    pub thread_name: String,
    pub samples: i64,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsReport {
    pub top_functions: Vec<TopFunctionEntry>,
    pub thread_stats: Vec<ThreadStatEntry>,
    pub total_samples: i64,
}

pub fn compute(samples: &[Sample], options: &StatsOptions) -> StatsReport {
    let mut func_totals: HashMap<String, i64> = HashMap::new();
    let mut func_stacks: HashMap<String, HashMap<String, i64>> = HashMap::new();
    let mut thread_totals: HashMap<(i64, String), i64> = HashMap::new();
    let mut total_samples: i64 = 0;

    for sample in samples {
        if sample.is_swapper && !options.include_swapper {
            continue;
        }
        total_samples += sample.value;

        if let Some(leaf) = sample.leaf() {
            *func_totals.entry(leaf.to_string()).or_insert(0) += sample.value;
            let stack = sample.call_stack.join(";");
            *func_stacks.entry(leaf.to_string()).or_default().entry(stack).or_insert(0) += sample.value;
        }

        *thread_totals
            .entry((sample.tid, sample.thread_name.clone()))
            .or_insert(0) += sample.value;
    }

    let total = total_samples.max(1) as f64;

    let mut top_functions: Vec<TopFunctionEntry> = func_totals
        .into_iter()
        .map(|(name, self_samples)| {
            let mut stacks: Vec<(String, i64)> = func_stacks
                .remove(&name)
                .unwrap_or_default()
                .into_iter()
                .collect();
            stacks.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            stacks.truncate(TOP_CALL_STACKS_PER_FUNC);
            TopFunctionEntry {
                self_percent: (self_samples as f64) / total * 100.0,
                name,
                self_samples,
                top_call_stacks: stacks,
            }
        })
        .collect();
    top_functions.sort_by(|a, b| b.self_samples.cmp(&a.self_samples).then_with(|| a.name.cmp(&b.name)));
    top_functions.truncate(options.top_n);

    let mut thread_stats: Vec<ThreadStatEntry> = thread_totals
        .into_iter()
        .map(|((tid, thread_name), samples)| ThreadStatEntry {
            percent: (samples as f64) / total * 100.0,
            tid,
            thread_name,
            samples,
        })
        .collect();
    thread_stats.sort_by(|a, b| b.samples.cmp(&a.samples).then_with(|| a.thread_name.cmp(&b.thread_name)));

    StatsReport {
        top_functions,
        thread_stats,
        total_samples,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample(thread: &str, tid: i64, stack: &[&str], value: i64) -> Sample {
        Sample::new(thread, tid, stack.iter().map(|s| s.to_string()).collect(), value)
    }

    #[test]
    fn top_functions_sorted_desc_ties_by_name() {
        let samples = vec![
            sample("t", 1, &["a"], 10),
            sample("t", 1, &["b"], 10),
            sample("t", 1, &["c"], 20),
        ];
        let report = compute(&samples, &StatsOptions::default());
        assert_eq!(report.top_functions[0].name, "c");
        assert_eq!(report.top_functions[1].name, "a");
        assert_eq!(report.top_functions[2].name, "b");
    }

    #[test]
    fn thread_stats_apm_and_standard_forms_merge_on_name() {
        // Simulates two samples whose thread identity resolved to the
        // same logical name via different parser paths.
        let samples = vec![sample("worker", 1, &["x"], 10), sample("worker", 1, &["y"], 5)];
        let report = compute(&samples, &StatsOptions::default());
        assert_eq!(report.thread_stats.len(), 1);
        assert_eq!(report.thread_stats[0].samples, 15);
    }

    #[test]
    fn swapper_excluded_from_percent_base_by_default() {
        let samples = vec![sample("swapper/0", -1, &["idle"], 900), sample("t", 1, &["x"], 100)];
        let report = compute(&samples, &StatsOptions::default());
        assert_eq!(report.total_samples, 100);
        assert_eq!(report.top_functions[0].self_percent, 100.0);
    }
}
