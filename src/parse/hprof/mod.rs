//! Binary HPROF heap-dump parser. Reads the fixed header, walks the
//! top-level record stream, and expands `HEAP_DUMP`/`HEAP_DUMP_SEGMENT`
//! sub-records into a [`ReferenceGraph`]. Field names and class names
//! are resolved against the `STRING`/`LOAD_CLASS` tables accumulated
//! earlier in the same pass, which is how every HPROF-writing JVM
//! orders the stream in practice.

pub mod records;

use std::collections::HashMap;

use crate::cancel::CancellationToken;
use crate::error::{AnalysisError, Result};
use crate::heap::reference_graph::{GcRoot, ReferenceGraph};

use records::*;

const MAGIC_PREFIX: &str = "JAVA PROFILE";

#[derive(Debug, Clone)]
struct FieldDecl {
    name_id: u64,
    type_code: u8,
}

#[derive(Debug, Clone, Default)]
struct ClassInfo {
    super_class_id: u64,
    instance_size: u32,
    own_fields: Vec<FieldDecl>,
}

/// Metadata gathered alongside the graph: string/class/stack tables
/// that a later `ClassHistogramReport` or leak-detector pass needs but
/// that don't belong on `ReferenceGraph` itself.
#[derive(Debug, Clone, Default)]
pub struct HprofMeta {
    pub id_size: u8,
    pub timestamp_ms: u64,
    pub class_instance_counts: HashMap<u64, u64>,
    pub class_instance_bytes: HashMap<u64, u64>,
}

struct Parser {
    strings: HashMap<u64, String>,
    classes: HashMap<u64, ClassInfo>,
    graph: ReferenceGraph,
    meta: HprofMeta,
}

impl Parser {
    fn new(id_size: u8) -> Self {
        Parser {
            strings: HashMap::new(),
            classes: HashMap::new(),
            graph: ReferenceGraph::default(),
            meta: HprofMeta {
                id_size,
                ..HprofMeta::default()
            },
        }
    }

    fn string_of(&self, id: u64) -> String {
        self.strings.get(&id).cloned().unwrap_or_default()
    }

    /// Walk the inheritance chain collecting instance field
    /// declarations, superclass-first so that subclass fields appear
    /// after (and never shadow) a same-named inherited field's offset.
    fn field_layout(&self, class_id: u64) -> Vec<FieldDecl> {
        let mut chain = Vec::new();
        let mut current = Some(class_id);
        while let Some(cid) = current {
            let Some(info) = self.classes.get(&cid) else { break };
            chain.push(info.clone());
            current = if info.super_class_id == 0 { None } else { Some(info.super_class_id) };
        }
        chain.reverse();
        chain.into_iter().flat_map(|info| info.own_fields).collect()
    }

    fn record_load_class(&mut self, r: &mut ByteReader) -> Result<()> {
        let _class_serial = r.u32()?;
        let class_object_id = r.id()?;
        let _stack_trace_serial = r.u32()?;
        let class_name_id = r.id()?;
        self.graph.class_names.insert(class_object_id, self.string_of(class_name_id));
        Ok(())
    }

    fn record_string(&mut self, r: &mut ByteReader, body_len: usize) -> Result<()> {
        let id = r.id()?;
        let text_len = body_len - self.meta.id_size as usize;
        let bytes = r.bytes(text_len)?;
        self.strings.insert(id, String::from_utf8_lossy(bytes).into_owned());
        Ok(())
    }

    fn heap_dump_root(&mut self, r: &mut ByteReader, sub_tag: u8) -> Result<()> {
        let object_id = r.id()?;
        let (thread_serial, frame_number) = match sub_tag {
            SUB_ROOT_JNI_GLOBAL => {
                r.id()?; // JNI global ref id, unused
                (0, -1)
            }
            SUB_ROOT_JNI_LOCAL | SUB_ROOT_JAVA_FRAME => {
                let thread_serial = r.u32()?;
                let frame_number = r.i32()?;
                (thread_serial, frame_number)
            }
            SUB_ROOT_NATIVE_STACK | SUB_ROOT_THREAD_BLOCK => {
                let thread_serial = r.u32()?;
                (thread_serial, -1)
            }
            SUB_ROOT_THREAD_OBJ => {
                let thread_serial = r.u32()?;
                let _stack_trace_serial = r.u32()?;
                (thread_serial, -1)
            }
            SUB_ROOT_STICKY_CLASS | SUB_ROOT_MONITOR_USED | SUB_ROOT_UNKNOWN => (0, -1),
            _ => (0, -1),
        };
        self.graph.gc_roots.push(GcRoot {
            object_id,
            root_type: GcRootType::from_sub_tag(sub_tag),
            thread_serial,
            frame_number,
        });
        Ok(())
    }

    fn heap_dump_class(&mut self, r: &mut ByteReader) -> Result<()> {
        let class_object_id = r.id()?;
        let _stack_trace_serial = r.u32()?;
        let super_class_id = r.id()?;
        let _class_loader_id = r.id()?;
        let _signers_id = r.id()?;
        let _protection_domain_id = r.id()?;
        r.id()?; // reserved
        r.id()?; // reserved
        let instance_size = r.u32()?;

        let const_pool_count = r.u16()?;
        for _ in 0..const_pool_count {
            r.u16()?; // constant pool index
            let type_code = r.u8()?;
            r.skip(primitive_size(type_code, r.id_size))?;
        }

        let static_field_count = r.u16()?;
        for _ in 0..static_field_count {
            let _name_id = r.id()?;
            let type_code = r.u8()?;
            r.skip(primitive_size(type_code, r.id_size))?;
        }

        let instance_field_count = r.u16()?;
        let mut own_fields = Vec::with_capacity(instance_field_count as usize);
        for _ in 0..instance_field_count {
            let name_id = r.id()?;
            let type_code = r.u8()?;
            own_fields.push(FieldDecl { name_id, type_code });
        }

        self.graph.class_super.insert(class_object_id, super_class_id);
        self.classes.insert(
            class_object_id,
            ClassInfo {
                super_class_id,
                instance_size,
                own_fields,
            },
        );
        Ok(())
    }

    fn heap_dump_instance(&mut self, r: &mut ByteReader) -> Result<()> {
        let object_id = r.id()?;
        let _stack_trace_serial = r.u32()?;
        let class_object_id = r.id()?;
        let bytes_len = r.u32()? as usize;
        let field_bytes = r.bytes(bytes_len)?;

        let fields = self.field_layout(class_object_id);
        let mut field_reader = ByteReader::new(field_bytes, r.id_size);
        for field in &fields {
            let field_name = self.string_of(field.name_id);
            if field.type_code == TYPE_OBJECT {
                let target = field_reader.id()?;
                self.graph.add_edge(object_id, target, field_name);
            } else {
                field_reader.skip(primitive_size(field.type_code, r.id_size))?;
            }
        }

        let size = r.id_size as u64 + bytes_len as u64;
        self.graph.add_object(object_id, class_object_id, size);
        *self.meta.class_instance_counts.entry(class_object_id).or_insert(0) += 1;
        *self.meta.class_instance_bytes.entry(class_object_id).or_insert(0) += size;
        Ok(())
    }

    fn heap_dump_object_array(&mut self, r: &mut ByteReader) -> Result<()> {
        let object_id = r.id()?;
        let _stack_trace_serial = r.u32()?;
        let length = r.u32()?;
        let class_object_id = r.id()?;
        for i in 0..length {
            let element = r.id()?;
            self.graph.add_edge(object_id, element, format!("[{i}]"));
        }
        let size = r.id_size as u64 * (1 + length as u64);
        self.graph.add_object(object_id, class_object_id, size);
        Ok(())
    }

    fn heap_dump_primitive_array(&mut self, r: &mut ByteReader) -> Result<()> {
        let object_id = r.id()?;
        let _stack_trace_serial = r.u32()?;
        let length = r.u32()?;
        let type_code = r.u8()?;
        let elem_size = primitive_size(type_code, r.id_size);
        r.skip(elem_size * length as usize)?;
        let size = elem_size as u64 * length as u64;
        // Primitive arrays have no HPROF class id; synthesize one from
        // the type code so object_class/object_size stay populated.
        self.graph.add_object(object_id, u64::from(type_code), size);
        Ok(())
    }

    fn heap_dump_body(&mut self, r: &mut ByteReader, end: usize) -> Result<()> {
        while r.pos() < end {
            let sub_tag = r.u8()?;
            match sub_tag {
                SUB_ROOT_UNKNOWN
                | SUB_ROOT_JNI_GLOBAL
                | SUB_ROOT_JNI_LOCAL
                | SUB_ROOT_JAVA_FRAME
                | SUB_ROOT_NATIVE_STACK
                | SUB_ROOT_STICKY_CLASS
                | SUB_ROOT_THREAD_BLOCK
                | SUB_ROOT_MONITOR_USED
                | SUB_ROOT_THREAD_OBJ => self.heap_dump_root(r, sub_tag)?,
                SUB_CLASS_DUMP => self.heap_dump_class(r)?,
                SUB_INSTANCE_DUMP => self.heap_dump_instance(r)?,
                SUB_OBJECT_ARRAY_DUMP => self.heap_dump_object_array(r)?,
                SUB_PRIMITIVE_ARRAY_DUMP => self.heap_dump_primitive_array(r)?,
                other => {
                    // Sub-record lengths aren't self-describing, so an
                    // unrecognized tag means the rest of this segment
                    // can't be parsed; skip it and resume at the next
                    // top-level record.
                    tracing::warn!(tag = format!("{other:#x}"), "unknown heap-dump sub-record tag, skipping rest of segment");
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Parse a complete HPROF byte stream into a [`ReferenceGraph`] plus
/// [`HprofMeta`]. Unknown top-level record tags are skipped by their
/// declared length; unknown heap-dump sub-record tags cannot be
/// skipped safely (their length isn't self-describing) and are a hard
/// parse error.
pub fn parse(data: &[u8], cancel: &CancellationToken) -> Result<(ReferenceGraph, HprofMeta)> {
    if data.len() < MAGIC_PREFIX.len() {
        return Err(AnalysisError::parse("hprof", "input too short for HPROF header"));
    }
    let header_end = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| AnalysisError::parse("hprof", "missing NUL terminator in header"))?;
    let magic = String::from_utf8_lossy(&data[..header_end]);
    if !magic.starts_with(MAGIC_PREFIX) {
        return Err(AnalysisError::parse("hprof", format!("unrecognized header magic: {magic}")));
    }

    let mut r = ByteReader::new(data, 4);
    r.skip(header_end + 1)?;
    let id_size = r.u32()? as u8;
    if id_size != 4 && id_size != 8 {
        return Err(AnalysisError::parse("hprof", format!("unsupported id size {id_size} (expected 4 or 8)")));
    }
    let ts_hi = r.u32()? as u64;
    let ts_lo = r.u32()? as u64;
    let timestamp_ms = (ts_hi << 32) | ts_lo;

    let mut r = ByteReader::new(&data[r.pos()..], id_size);
    let mut parser = Parser::new(id_size);
    parser.meta.timestamp_ms = timestamp_ms;

    let mut record_count: usize = 0;
    while !r.eof() {
        record_count += 1;
        cancel.check_every(record_count)?;

        let tag = r.u8()?;
        let _time_offset = r.u32()?;
        let length = r.u32()? as usize;
        let body_start = r.pos();
        let body_end = body_start + length;
        if body_end > data.len() {
            return Err(AnalysisError::parse("hprof", format!("record length {length} overruns input")));
        }

        match tag {
            TAG_STRING => parser.record_string(&mut r, length)?,
            TAG_LOAD_CLASS => parser.record_load_class(&mut r)?,
            TAG_HEAP_DUMP | TAG_HEAP_DUMP_SEGMENT => parser.heap_dump_body(&mut r, body_end)?,
            TAG_HEAP_DUMP_END => {}
            TAG_UNLOAD_CLASS | TAG_STACK_FRAME | TAG_STACK_TRACE | TAG_ALLOC_SITES | TAG_HEAP_SUMMARY
            | TAG_START_THREAD | TAG_END_THREAD | TAG_CPU_SAMPLES | TAG_CONTROL_SETTINGS => {
                r.skip(body_end - r.pos())?;
            }
            _other => {
                r.skip(body_end.saturating_sub(r.pos()))?;
            }
        }

        if r.pos() < body_end {
            r.skip(body_end - r.pos())?;
        }
    }

    Ok((parser.graph, parser.meta))
}

#[cfg(test)]
mod test {
    use super::*;

    fn push_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_be_bytes());
    }

    fn minimal_header(buf: &mut Vec<u8>) {
        buf.extend_from_slice(b"JAVA PROFILE 1.0.2\0");
        push_u32(buf, 4); // id size
        push_u32(buf, 0); // timestamp hi
        push_u32(buf, 0); // timestamp lo
    }

    #[test]
    fn rejects_bad_magic() {
        let data = b"NOT HPROF\0\0\0\0\0\0\0\0\0\0\0\0";
        let err = parse(data, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, AnalysisError::ParseError { .. }));
    }

    #[test]
    fn empty_stream_after_header_yields_empty_graph() {
        let mut data = Vec::new();
        minimal_header(&mut data);
        let (graph, meta) = parse(&data, &CancellationToken::new()).unwrap();
        assert_eq!(graph.object_count(), 0);
        assert_eq!(meta.id_size, 4);
    }

    #[test]
    fn string_and_load_class_populate_tables() {
        let mut data = Vec::new();
        minimal_header(&mut data);

        // STRING record: id=1, text="com.example.Foo"
        let text = b"com.example.Foo";
        data.push(TAG_STRING);
        push_u32(&mut data, 0);
        push_u32(&mut data, 4 + text.len() as u32);
        push_u32(&mut data, 1); // string id
        data.extend_from_slice(text);

        // LOAD_CLASS record: serial=1, class_object_id=100, stack=0, name_id=1
        data.push(TAG_LOAD_CLASS);
        push_u32(&mut data, 0);
        push_u32(&mut data, 4 + 4 + 4 + 4);
        push_u32(&mut data, 1);
        push_u32(&mut data, 100);
        push_u32(&mut data, 0);
        push_u32(&mut data, 1);

        let (graph, _) = parse(&data, &CancellationToken::new()).unwrap();
        assert_eq!(graph.class_name(100), "com.example.Foo");
    }

    #[test]
    fn unknown_heap_dump_sub_tag_is_skipped_not_an_error() {
        let mut data = Vec::new();
        minimal_header(&mut data);
        data.push(TAG_HEAP_DUMP);
        push_u32(&mut data, 0);
        push_u32(&mut data, 1);
        data.push(0x99); // not a recognized sub-tag
        let (graph, _) = parse(&data, &CancellationToken::new()).unwrap();
        assert_eq!(graph.object_count(), 0);
    }

    #[test]
    fn instance_dump_with_object_field_adds_edge() {
        let mut data = Vec::new();
        minimal_header(&mut data);

        // CLASS_DUMP for class 200: no super, 1 instance field (object, name_id=5)
        let mut body = Vec::new();
        push_u32(&mut body, 200); // class_object_id
        push_u32(&mut body, 0); // stack trace serial
        push_u32(&mut body, 0); // super class id
        push_u32(&mut body, 0); // class loader id
        push_u32(&mut body, 0); // signers id
        push_u32(&mut body, 0); // protection domain id
        push_u32(&mut body, 0); // reserved
        push_u32(&mut body, 0); // reserved
        push_u32(&mut body, 0); // instance size
        body.extend_from_slice(&0u16.to_be_bytes()); // const pool count
        body.extend_from_slice(&0u16.to_be_bytes()); // static field count
        body.extend_from_slice(&1u16.to_be_bytes()); // instance field count
        push_u32(&mut body, 5); // field name id
        body.push(TYPE_OBJECT);

        data.push(TAG_HEAP_DUMP);
        push_u32(&mut data, 0);
        push_u32(&mut data, 1 + body.len() as u32);
        data.push(SUB_CLASS_DUMP);
        data.extend_from_slice(&body);

        // second heap dump record: instance of class 200, field points to object 77
        let mut inst_body = Vec::new();
        push_u32(&mut inst_body, 50); // object id
        push_u32(&mut inst_body, 0); // stack trace serial
        push_u32(&mut inst_body, 200); // class id
        push_u32(&mut inst_body, 4); // bytes length
        push_u32(&mut inst_body, 77); // field value (object id)

        data.push(TAG_HEAP_DUMP);
        push_u32(&mut data, 0);
        push_u32(&mut data, 1 + inst_body.len() as u32);
        data.push(SUB_INSTANCE_DUMP);
        data.extend_from_slice(&inst_body);

        let (graph, _) = parse(&data, &CancellationToken::new()).unwrap();
        assert_eq!(graph.object_class[&50], 200);
        assert_eq!(graph.outgoing_refs[&50][0].to_id, 77);
    }
}
