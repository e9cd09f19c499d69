//! Decoder bridge for Google's gzipped pprof protobuf `Profile` format,
//! normalizing its multiple sample-type axes (cpu, inuse_space,
//! alloc_objects, goroutine, contentions, delay) into the unified
//! [`Sample`] model.

mod proto;

use flate2::read::GzDecoder;
use prost::Message;
use std::collections::HashMap;
use std::io::Read;

use crate::error::{AnalysisError, Result};
use crate::model::Sample;

use proto::Profile as ProtoProfile;

/// Detected high-level kind of a pprof profile, inferred from which
/// canonical sample-type names are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    Cpu,
    Heap,
    Goroutine,
    Block,
    Unknown,
}

/// Alternate sample-type names consulted when the requested primary
/// name is absent from a profile. Must match exactly: a missing column
/// after exhausting aliases surfaces as `EMPTY_DATA`.
fn sample_type_aliases(primary: &str) -> Vec<&str> {
    match primary {
        "cpu" => vec!["cpu", "nanoseconds", "samples"],
        "inuse_space" => vec!["inuse_space", "inuse_bytes"],
        "inuse_objects" => vec!["inuse_objects", "inuse_count"],
        "alloc_space" => vec!["alloc_space", "alloc_bytes"],
        "alloc_objects" => vec!["alloc_objects", "alloc_count"],
        "goroutine" => vec!["goroutine", "goroutines"],
        "contentions" => vec!["contentions", "contention"],
        "delay" => vec!["delay", "delay_nanoseconds"],
        other => vec![other],
    }
}

#[derive(Debug, Clone)]
pub struct TopFunctionEntry {
    pub name: String,
    pub module: String,
    pub flat: i64,
    pub flat_pct: f64,
    pub cum: i64,
    pub cum_pct: f64,
    pub source_file: String,
    pub source_line: i64,
}

pub struct PprofDecoder {
    profile: ProtoProfile,
    strings: Vec<String>,
    /// function_id -> (name, filename, start_line)
    functions: HashMap<u64, (String, String, i64)>,
    /// location_id -> Vec<function_id> (outermost-first within the location's own inline chain)
    locations: HashMap<u64, Vec<u64>>,
}

impl PprofDecoder {
    /// Decode a gzip-wrapped pprof protobuf `Profile`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut decoder = GzDecoder::new(bytes);
        let mut raw = Vec::new();
        decoder
            .read_to_end(&mut raw)
            .map_err(|e| AnalysisError::parse("pprof", format!("gzip decode failed: {e}")))?;

        let profile = ProtoProfile::decode(raw.as_slice())
            .map_err(|e| AnalysisError::parse("pprof", format!("protobuf decode failed: {e}")))?;

        let strings = profile.string_table.clone();
        let mut functions = HashMap::new();
        for function in &profile.function {
            let name = strings.get(function.name as usize).cloned().unwrap_or_default();
            let filename = strings.get(function.filename as usize).cloned().unwrap_or_default();
            functions.insert(function.id, (name, filename, function.start_line));
        }
        let mut locations = HashMap::new();
        for location in &profile.location {
            locations.insert(location.id, location.line.iter().map(|l| l.function_id).collect());
        }

        Ok(PprofDecoder {
            profile,
            strings,
            functions,
            locations,
        })
    }

    fn string_at(&self, idx: i64) -> &str {
        self.strings.get(idx as usize).map(String::as_str).unwrap_or("")
    }

    pub fn sample_types(&self) -> Vec<String> {
        self.profile
            .sample_type
            .iter()
            .map(|vt| self.string_at(vt.r#type).to_string())
            .collect()
    }

    pub fn duration_ns(&self) -> i64 {
        self.profile.duration_nanos
    }

    pub fn unit(&self, sample_type: &str) -> Option<String> {
        self.sample_type_index(sample_type)
            .map(|idx| self.string_at(self.profile.sample_type[idx].unit).to_string())
    }

    /// Resolve `sample_type` to a column index, falling back through
    /// its alias list. Returns `None` if no alias is present.
    fn sample_type_index(&self, sample_type: &str) -> Option<usize> {
        let types = self.sample_types();
        for alias in sample_type_aliases(sample_type) {
            if let Some(idx) = types.iter().position(|t| t.as_str() == alias) {
                return Some(idx);
            }
        }
        None
    }

    pub fn total(&self, sample_type: &str) -> Result<i64> {
        let idx = self
            .sample_type_index(sample_type)
            .ok_or_else(|| AnalysisError::EmptyData(format!("no sample type matching {sample_type} or its aliases")))?;
        Ok(self.profile.sample.iter().filter_map(|s| s.value.get(idx)).sum())
    }

    fn location_function_chain(&self, location_id: u64) -> Vec<u64> {
        self.locations.get(&location_id).cloned().unwrap_or_default()
    }

    fn function_frame_string(&self, function_id: u64) -> String {
        self.functions
            .get(&function_id)
            .map(|(name, _, _)| name.clone())
            .unwrap_or_default()
    }

    /// Flat accumulates on the leaf location of a sample; cum
    /// accumulates on every location. Percentages are relative to the
    /// total of `sample_type`.
    pub fn top_functions(&self, n: usize, sample_type: &str, order_by_cum: bool) -> Result<Vec<TopFunctionEntry>> {
        let idx = self
            .sample_type_index(sample_type)
            .ok_or_else(|| AnalysisError::EmptyData(format!("no sample type matching {sample_type}")))?;

        let mut flat: HashMap<u64, i64> = HashMap::new();
        let mut cum: HashMap<u64, i64> = HashMap::new();

        for sample in &self.profile.sample {
            let value = *sample.value.get(idx).unwrap_or(&0);
            if value == 0 || sample.location_id.is_empty() {
                continue;
            }
            let leaf_location = sample.location_id[0];
            if let Some(&leaf_fn) = self.location_function_chain(leaf_location).first() {
                *flat.entry(leaf_fn).or_insert(0) += value;
            }
            let mut seen = std::collections::HashSet::new();
            for &loc in &sample.location_id {
                for func_id in self.location_function_chain(loc) {
                    if seen.insert(func_id) {
                        *cum.entry(func_id).or_insert(0) += value;
                    }
                }
            }
        }

        let total: i64 = self.profile.sample.iter().filter_map(|s| s.value.get(idx)).sum();
        let total = total.max(1) as f64;

        let mut func_ids: std::collections::HashSet<u64> = flat.keys().copied().collect();
        func_ids.extend(cum.keys().copied());

        let mut entries: Vec<TopFunctionEntry> = func_ids
            .into_iter()
            .map(|func_id| {
                let (name, filename, start_line) = self
                    .functions
                    .get(&func_id)
                    .cloned()
                    .unwrap_or_else(|| (String::new(), String::new(), 0));
                let (fn_name, module) = go_module_split(&name);
                let flat_v = *flat.get(&func_id).unwrap_or(&0);
                let cum_v = *cum.get(&func_id).unwrap_or(&0);
                TopFunctionEntry {
                    name: fn_name,
                    module,
                    flat: flat_v,
                    flat_pct: (flat_v as f64) / total * 100.0,
                    cum: cum_v,
                    cum_pct: (cum_v as f64) / total * 100.0,
                    source_file: filename,
                    source_line: start_line,
                }
            })
            .collect();

        if order_by_cum {
            entries.sort_by(|a, b| b.cum.cmp(&a.cum).then_with(|| a.name.cmp(&b.name)));
        } else {
            entries.sort_by(|a, b| b.flat.cmp(&a.flat).then_with(|| a.name.cmp(&b.name)));
        }
        entries.truncate(n);
        Ok(entries)
    }

    /// Build the collapsed string for each sample (root→leaf, reversing
    /// pprof's leaf-first `location` order), aggregate equal strings,
    /// and emit one [`Sample`] per distinct stack.
    pub fn to_samples(&self, sample_type: &str) -> Result<Vec<Sample>> {
        let idx = self
            .sample_type_index(sample_type)
            .ok_or_else(|| AnalysisError::EmptyData(format!("no sample type matching {sample_type}")))?;

        let mut by_stack: HashMap<String, i64> = HashMap::new();

        for sample in &self.profile.sample {
            let value = *sample.value.get(idx).unwrap_or(&0);
            if value == 0 {
                continue;
            }
            let mut frames: Vec<String> = sample
                .location_id
                .iter()
                .rev()
                .flat_map(|&loc| self.location_function_chain(loc))
                .map(|func_id| self.function_frame_string(func_id))
                .filter(|f| !f.is_empty())
                .collect();
            if frames.is_empty() {
                continue;
            }
            frames.dedup();
            let stack_str = frames.join(";");
            *by_stack.entry(stack_str).or_insert(0) += value;
        }

        Ok(by_stack
            .into_iter()
            .map(|(stack, value)| {
                let call_stack: Vec<String> = stack.split(';').map(str::to_string).collect();
                Sample::new("pprof", -1, call_stack, value)
            })
            .collect())
    }

    pub fn detect_type(&self) -> ProfileKind {
        let types = self.sample_types();
        if types.iter().any(|t| t == "cpu") {
            ProfileKind::Cpu
        } else if types.iter().any(|t| t == "inuse_space" || t == "alloc_space" || t == "inuse_objects" || t == "alloc_objects") {
            ProfileKind::Heap
        } else if types.iter().any(|t| t == "goroutine") {
            ProfileKind::Goroutine
        } else if types.iter().any(|t| t == "contentions" || t == "delay") {
            ProfileKind::Block
        } else {
            ProfileKind::Unknown
        }
    }
}

/// Extract a Go-style module from a function name: the substring up to
/// and including the last `/`, extended to the first `.` in the
/// remainder (`net/http.(*Server).Serve` -> `net/http`). If no `/`, the
/// module is the substring before the first `.`.
pub fn go_module_split(full_name: &str) -> (String, String) {
    if let Some(slash) = full_name.rfind('/') {
        let after_slash = &full_name[slash + 1..];
        if let Some(dot) = after_slash.find('.') {
            let module_end = slash + 1 + dot;
            return (full_name.to_string(), full_name[..module_end].to_string());
        }
        (full_name.to_string(), full_name.to_string())
    } else if let Some(dot) = full_name.find('.') {
        (full_name.to_string(), full_name[..dot].to_string())
    } else {
        (full_name.to_string(), String::new())
    }
}
