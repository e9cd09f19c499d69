//! Optional per-thread analysis pass over the same sample batch used to
//! build the [`super::FlameGraph`]: per-thread leaf-function counts,
//! top call stacks, an independent per-thread subtree, and global
//! rollups across all threads.

use serde::Serialize;
use std::collections::HashMap;

use crate::config::FlameGraphOptions;
use crate::model::{extract_thread_group, Sample};

use super::{build as build_flame, FlameNode};

#[derive(Debug, Clone, Serialize)]
pub struct FuncCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallStackCount {
    pub stack: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadInfo {
    pub thread_name: String,
    pub tid: i64,
    pub is_swapper: bool,
    pub samples: i64,
    /// Relative to *all* samples including swapper threads, so these
    /// percentages sum to <= 100 across `threads`.
    pub percentage: f64,
    pub top_functions: Vec<FuncCount>,
    pub top_call_stacks: Vec<CallStackCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flame_root: Option<FlameNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GlobalFunctionInfo {
    pub name: String,
    pub total_count: i64,
    /// `(thread_name, tid)` -> count, sorted by count desc.
    pub thread_breakdown: Vec<(String, i64, i64)>,
    pub top_call_stacks: Vec<CallStackCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadGroupInfo {
    pub group: String,
    pub samples: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadAnalysisData {
    pub threads: Vec<ThreadInfo>,
    pub global_top_functions: Vec<GlobalFunctionInfo>,
    pub thread_groups: Vec<ThreadGroupInfo>,
    pub total_samples_with_swapper: i64,
}

struct ThreadScratch {
    tid: i64,
    is_swapper: bool,
    samples: i64,
    func_counts: HashMap<String, i64>,
    call_stack_counts: HashMap<String, i64>,
    own_samples: Vec<Sample>,
}

pub fn analyze(samples: &[Sample], options: &FlameGraphOptions) -> ThreadAnalysisData {
    let mut per_thread: HashMap<String, ThreadScratch> = HashMap::new();
    let mut global_func_counts: HashMap<String, i64> = HashMap::new();
    let mut global_func_threads: HashMap<String, HashMap<(String, i64), i64>> = HashMap::new();
    let mut global_call_stacks: HashMap<String, HashMap<String, i64>> = HashMap::new();
    let mut total_samples_with_swapper: i64 = 0;
    let mut group_samples: HashMap<String, i64> = HashMap::new();

    for sample in samples {
        total_samples_with_swapper += sample.value;

        let group = extract_thread_group(&sample.thread_name).to_string();
        *group_samples.entry(group).or_insert(0) += sample.value;

        if sample.is_swapper && !options.include_swapper {
            continue;
        }

        let entry = per_thread.entry(sample.thread_name.clone()).or_insert_with(|| ThreadScratch {
            tid: sample.tid,
            is_swapper: sample.is_swapper,
            samples: 0,
            func_counts: HashMap::new(),
            call_stack_counts: HashMap::new(),
            own_samples: Vec::new(),
        });
        entry.samples += sample.value;
        entry.own_samples.push(sample.clone());

        let leaf = sample.call_stack.last().cloned().unwrap_or_default();
        *entry.func_counts.entry(leaf.clone()).or_insert(0) += sample.value;

        let stack_str = sample.call_stack.join(";");
        *entry.call_stack_counts.entry(stack_str.clone()).or_insert(0) += sample.value;

        *global_func_counts.entry(leaf.clone()).or_insert(0) += sample.value;
        *global_func_threads
            .entry(leaf.clone())
            .or_default()
            .entry((sample.thread_name.clone(), sample.tid))
            .or_insert(0) += sample.value;
        *global_call_stacks
            .entry(leaf)
            .or_default()
            .entry(stack_str)
            .or_insert(0) += sample.value;
    }

    let mut threads: Vec<ThreadInfo> = per_thread
        .into_iter()
        .map(|(name, scratch)| {
            let mut top_functions: Vec<FuncCount> = scratch
                .func_counts
                .into_iter()
                .map(|(name, count)| FuncCount { name, count })
                .collect();
            sort_by_count_then_name(&mut top_functions, |f| (f.count, f.name.clone()));
            top_functions.truncate(options.top_n_per_thread);

            let mut top_call_stacks: Vec<CallStackCount> = scratch
                .call_stack_counts
                .into_iter()
                .map(|(stack, count)| CallStackCount { stack, count })
                .collect();
            sort_by_count_then_name(&mut top_call_stacks, |c| (c.count, c.stack.clone()));
            top_call_stacks.truncate(options.max_call_stacks_per_thread);

            let flame_root = if options.build_per_thread_flamegraphs {
                Some(build_flame(&scratch.own_samples, options).root)
            } else {
                None
            };

            ThreadInfo {
                thread_name: name,
                tid: scratch.tid,
                is_swapper: scratch.is_swapper,
                samples: scratch.samples,
                percentage: percentage(scratch.samples, total_samples_with_swapper),
                top_functions,
                top_call_stacks,
                flame_root,
            }
        })
        .collect();
    threads.sort_by(|a, b| b.samples.cmp(&a.samples).then_with(|| a.thread_name.cmp(&b.thread_name)));

    let mut global_top_functions: Vec<GlobalFunctionInfo> = global_func_counts
        .into_iter()
        .map(|(name, total_count)| {
            let mut thread_breakdown: Vec<(String, i64, i64)> = global_func_threads
                .remove(&name)
                .unwrap_or_default()
                .into_iter()
                .map(|((thread_name, tid), count)| (thread_name, tid, count))
                .collect();
            thread_breakdown.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));

            let mut top_call_stacks: Vec<CallStackCount> = global_call_stacks
                .remove(&name)
                .unwrap_or_default()
                .into_iter()
                .map(|(stack, count)| CallStackCount { stack, count })
                .collect();
            sort_by_count_then_name(&mut top_call_stacks, |c| (c.count, c.stack.clone()));
            top_call_stacks.truncate(options.max_call_stacks_per_func);

            GlobalFunctionInfo {
                name,
                total_count,
                thread_breakdown,
                top_call_stacks,
            }
        })
        .collect();
    sort_by_count_then_name(&mut global_top_functions, |f| (f.total_count, f.name.clone()));
    global_top_functions.truncate(options.top_n_global);

    let mut thread_groups: Vec<ThreadGroupInfo> = group_samples
        .into_iter()
        .map(|(group, samples)| ThreadGroupInfo {
            percentage: percentage(samples, total_samples_with_swapper),
            group,
            samples,
        })
        .collect();
    thread_groups.sort_by(|a, b| b.samples.cmp(&a.samples).then_with(|| a.group.cmp(&b.group)));

    ThreadAnalysisData {
        threads,
        global_top_functions,
        thread_groups,
        total_samples_with_swapper,
    }
}

fn percentage(part: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64) / (total as f64) * 100.0
    }
}

/// Sort desc by count, ties broken by name asc.
fn sort_by_count_then_name<T>(items: &mut [T], key: impl Fn(&T) -> (i64, String)) {
    items.sort_by(|a, b| {
        let (ca, na) = key(a);
        let (cb, nb) = key(b);
        cb.cmp(&ca).then_with(|| na.cmp(&nb))
    });
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample(thread: &str, tid: i64, stack: &[&str], value: i64) -> Sample {
        Sample::new(thread, tid, stack.iter().map(|s| s.to_string()).collect(), value)
    }

    #[test]
    fn thread_group_rollup_scenario() {
        let samples = vec![
            sample("pool-1-thread-1", -1, &["work"], 50),
            sample("pool-1-thread-2", -1, &["work"], 30),
            sample("pool-2-thread-1", -1, &["work"], 20),
        ];
        let options = FlameGraphOptions::default().enable_thread_analysis(true);
        let data = analyze(&samples, &options);
        assert_eq!(data.thread_groups.len(), 2);
        let pool1 = data.thread_groups.iter().find(|g| g.group == "pool-1-thread").unwrap();
        assert_eq!(pool1.samples, 80);
        let pool2 = data.thread_groups.iter().find(|g| g.group == "pool-2-thread").unwrap();
        assert_eq!(pool2.samples, 20);
    }

    #[test]
    fn per_thread_percentage_uses_total_including_swapper() {
        let samples = vec![
            sample("swapper/0", -1, &["idle"], 90),
            sample("t", -1, &["work"], 10),
        ];
        let options = FlameGraphOptions::default().enable_thread_analysis(true);
        let data = analyze(&samples, &options);
        let t = data.threads.iter().find(|t| t.thread_name == "t").unwrap();
        assert_eq!(t.percentage, 10.0);
        assert_eq!(data.total_samples_with_swapper, 100);
    }

    #[test]
    fn swapper_thread_excluded_from_threads_list_by_default() {
        let samples = vec![sample("swapper/0", -1, &["idle"], 90), sample("t", -1, &["work"], 10)];
        let options = FlameGraphOptions::default().enable_thread_analysis(true);
        let data = analyze(&samples, &options);
        assert!(!data.threads.iter().any(|t| t.is_swapper));
    }

    #[test]
    fn global_top_functions_breakdown_by_thread() {
        let samples = vec![
            sample("t1", 1, &["shared"], 10),
            sample("t2", 2, &["shared"], 20),
        ];
        let options = FlameGraphOptions::default().enable_thread_analysis(true);
        let data = analyze(&samples, &options);
        let shared = data.global_top_functions.iter().find(|f| f.name == "shared").unwrap();
        assert_eq!(shared.total_count, 30);
        assert_eq!(shared.thread_breakdown[0].1, 2); // t2 has more samples, sorted first
    }
}
