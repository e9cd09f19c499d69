//! Binary container for a [`ReferenceGraph`]: magic, version,
//! compression byte, a deduplicated string table, then a compressed
//! `ReferenceGraphProto` body. See `proto/reference_graph.proto`.

pub mod async_job;
mod proto;

use std::collections::HashMap;
use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use prost::Message;

use crate::config::{Compression, SerializerOptions};
use crate::error::{AnalysisError, Result};
use crate::heap::reference_graph::{GcRootType, ReferenceGraph};

const MAGIC: &[u8; 4] = b"REFG";
const CURRENT_VERSION: u8 = 2;

pub struct GraphSerializer;

struct StringInterner {
    strings: Vec<String>,
    index: HashMap<String, u32>,
}

impl StringInterner {
    fn new() -> Self {
        StringInterner {
            strings: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&idx) = self.index.get(s) {
            return idx;
        }
        let idx = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), idx);
        idx
    }
}

impl GraphSerializer {
    pub fn serialize(
        graph: &ReferenceGraph,
        options: &SerializerOptions,
        source_filename: &str,
        created_millis: u64,
    ) -> Result<Vec<u8>> {
        let mut interner = StringInterner::new();

        let classes: Vec<proto::ClassEntry> = graph
            .class_names
            .iter()
            .map(|(&class_id, name)| proto::ClassEntry {
                class_id,
                name_idx: interner.intern(name),
            })
            .collect();

        let objects: Vec<proto::ObjectEntry> = graph
            .object_class
            .iter()
            .map(|(&id, &class_id)| proto::ObjectEntry {
                id,
                class_id,
                shallow_size: graph.object_size.get(&id).copied().unwrap_or(0),
            })
            .collect();

        let mut references = Vec::new();
        let mut total_references = 0u64;
        for edges in graph.outgoing_refs.values() {
            for edge in edges {
                total_references += 1;
                references.push(proto::ReferenceEntry {
                    from_id: edge.from_id,
                    to_id: edge.to_id,
                    from_class_id: graph.object_class.get(&edge.from_id).copied().unwrap_or(0),
                    field_name_idx: interner.intern(&edge.field_name),
                });
            }
        }

        let gc_roots: Vec<proto::GcRootEntry> = graph
            .gc_roots
            .iter()
            .map(|root| proto::GcRootEntry {
                object_id: root.object_id,
                root_type: root.root_type.discriminant(),
                thread_id: root.thread_serial as u64,
                frame_index: root.frame_number,
            })
            .collect();

        let dominator_data = if options.include_dominator_data {
            graph.dominators.as_ref().map(|dominators| proto::DominatorData {
                dominators: dominators
                    .iter()
                    .map(|(&object_id, &dominator_id)| proto::DominatorEntry { object_id, dominator_id })
                    .collect(),
                retained_sizes: graph
                    .retained_sizes
                    .iter()
                    .flatten()
                    .map(|(&object_id, &retained_bytes)| proto::RetainedSizeEntry { object_id, retained_bytes })
                    .collect(),
                class_retained_sizes: graph
                    .class_retained_sizes
                    .iter()
                    .flatten()
                    .map(|(&class_id, &retained_bytes)| proto::ClassRetainedEntry { class_id, retained_bytes })
                    .collect(),
                class_retained_sizes_attributed: graph
                    .class_retained_sizes_attributed
                    .iter()
                    .flatten()
                    .map(|(&class_id, &retained_bytes)| proto::ClassRetainedEntry { class_id, retained_bytes })
                    .collect(),
            })
        } else {
            None
        };

        let body = proto::ReferenceGraphProto {
            objects,
            classes,
            references,
            gc_roots,
            dominator_data,
            metadata: Some(proto::GraphMetadata {
                total_objects: graph.object_count() as u64,
                total_references,
                source_filename: source_filename.to_string(),
                created_millis,
            }),
        };

        let string_table = proto::StringTable { strings: interner.strings };
        let string_table_bytes = string_table.encode_to_vec();

        let body_bytes = body.encode_to_vec();
        let compressed_body = compress(&body_bytes, options.compression, options.level)?;

        let mut out = Vec::with_capacity(4 + 1 + 1 + 4 + string_table_bytes.len() + compressed_body.len());
        out.extend_from_slice(MAGIC);
        out.push(CURRENT_VERSION);
        out.push(options.compression as u8);
        out.extend_from_slice(&(string_table_bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(&string_table_bytes);
        out.extend_from_slice(&compressed_body);
        Ok(out)
    }

    /// Parse the container framing and restore a [`ReferenceGraph`].
    /// Version 1 containers (no compression byte, always gzip) are
    /// still accepted.
    pub fn deserialize(bytes: &[u8]) -> Result<ReferenceGraph> {
        if bytes.len() < 5 || &bytes[0..4] != MAGIC {
            return Err(AnalysisError::parse("serialize", "missing REFG magic"));
        }
        let version = bytes[4];
        let mut pos = 5;

        let compression = if version == 1 {
            Compression::Gzip
        } else {
            let c = bytes.get(pos).copied().ok_or_else(|| AnalysisError::parse("serialize", "truncated compression byte"))?;
            pos += 1;
            match c {
                0 => Compression::Gzip,
                1 => Compression::Zstd,
                other => return Err(AnalysisError::parse("serialize", format!("unknown compression byte {other}"))),
            }
        };

        if bytes.len() < pos + 4 {
            return Err(AnalysisError::parse("serialize", "truncated string table length"));
        }
        let table_len = u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
        pos += 4;

        if bytes.len() < pos + table_len {
            return Err(AnalysisError::parse("serialize", "truncated string table"));
        }
        let string_table = proto::StringTable::decode(&bytes[pos..pos + table_len])
            .map_err(|e| AnalysisError::parse("serialize", format!("string table decode failed: {e}")))?;
        pos += table_len;

        let body_bytes = decompress(&bytes[pos..], compression)?;
        let body = proto::ReferenceGraphProto::decode(body_bytes.as_slice())
            .map_err(|e| AnalysisError::parse("serialize", format!("body decode failed: {e}")))?;

        let strings = string_table.strings;
        let mut graph = ReferenceGraph::default();

        for class in &body.classes {
            if let Some(name) = strings.get(class.name_idx as usize) {
                graph.class_names.insert(class.class_id, name.clone());
            }
        }
        for object in &body.objects {
            graph.object_class.insert(object.id, object.class_id);
            graph.object_size.insert(object.id, object.shallow_size);
        }
        for reference in &body.references {
            let field_name = strings.get(reference.field_name_idx as usize).cloned().unwrap_or_default();
            graph.add_edge(reference.from_id, reference.to_id, field_name);
        }
        for root in &body.gc_roots {
            graph.gc_roots.push(crate::heap::reference_graph::GcRoot {
                object_id: root.object_id,
                root_type: GcRootType::from_discriminant(root.root_type),
                thread_serial: root.thread_id as u32,
                frame_number: root.frame_index,
            });
        }

        if let Some(dom) = body.dominator_data {
            let dominators: HashMap<u64, u64> = dom.dominators.into_iter().map(|d| (d.object_id, d.dominator_id)).collect();
            graph.retained_sizes = Some(dom.retained_sizes.into_iter().map(|r| (r.object_id, r.retained_bytes)).collect());
            graph.class_retained_sizes = Some(dom.class_retained_sizes.into_iter().map(|c| (c.class_id, c.retained_bytes)).collect());
            graph.class_retained_sizes_attributed =
                Some(dom.class_retained_sizes_attributed.into_iter().map(|c| (c.class_id, c.retained_bytes)).collect());
            graph.dominators = Some(dominators);
        }

        Ok(graph)
    }
}

fn compress(data: &[u8], compression: Compression, level: i32) -> Result<Vec<u8>> {
    match compression {
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::new(level.clamp(0, 9) as u32));
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
        Compression::Zstd => zstd::encode_all(data, level).map_err(AnalysisError::from),
    }
}

fn decompress(data: &[u8], compression: Compression) -> Result<Vec<u8>> {
    match compression {
        Compression::Gzip => {
            let mut decoder = GzDecoder::new(data);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            Ok(out)
        }
        Compression::Zstd => zstd::decode_all(data).map_err(AnalysisError::from),
    }
}
