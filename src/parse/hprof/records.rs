//! HPROF binary record/sub-record tags, primitive-type codes, and the
//! big-endian byte cursor shared by every record reader. Built on
//! [`nom`]'s primitive number parsers the way `jvm-hprof-rs` builds its
//! cursor on `nom`, but as a stateful cursor rather than a combinator
//! pipeline: HPROF's record lengths are only known from the header you
//! just read, which doesn't compose well as `nom` combinators chained
//! ahead of time.

use nom::number::complete::{be_i32, be_u16, be_u32, be_u64, be_u8};
use serde::Serialize;

use crate::error::{AnalysisError, Result};

pub const TAG_STRING: u8 = 0x01;
pub const TAG_LOAD_CLASS: u8 = 0x02;
pub const TAG_UNLOAD_CLASS: u8 = 0x03;
pub const TAG_STACK_FRAME: u8 = 0x04;
pub const TAG_STACK_TRACE: u8 = 0x05;
pub const TAG_ALLOC_SITES: u8 = 0x06;
pub const TAG_HEAP_SUMMARY: u8 = 0x07;
pub const TAG_START_THREAD: u8 = 0x0A;
pub const TAG_END_THREAD: u8 = 0x0B;
pub const TAG_HEAP_DUMP: u8 = 0x0C;
pub const TAG_CPU_SAMPLES: u8 = 0x0D;
pub const TAG_CONTROL_SETTINGS: u8 = 0x0E;
pub const TAG_HEAP_DUMP_SEGMENT: u8 = 0x1C;
pub const TAG_HEAP_DUMP_END: u8 = 0x2C;

pub const SUB_ROOT_UNKNOWN: u8 = 0xFF;
pub const SUB_ROOT_JNI_GLOBAL: u8 = 0x01;
pub const SUB_ROOT_JNI_LOCAL: u8 = 0x02;
pub const SUB_ROOT_JAVA_FRAME: u8 = 0x03;
pub const SUB_ROOT_NATIVE_STACK: u8 = 0x04;
pub const SUB_ROOT_STICKY_CLASS: u8 = 0x05;
pub const SUB_ROOT_THREAD_BLOCK: u8 = 0x06;
pub const SUB_ROOT_MONITOR_USED: u8 = 0x07;
pub const SUB_ROOT_THREAD_OBJ: u8 = 0x08;
pub const SUB_CLASS_DUMP: u8 = 0x20;
pub const SUB_INSTANCE_DUMP: u8 = 0x21;
pub const SUB_OBJECT_ARRAY_DUMP: u8 = 0x22;
pub const SUB_PRIMITIVE_ARRAY_DUMP: u8 = 0x23;

pub const TYPE_OBJECT: u8 = 2;
pub const TYPE_BOOLEAN: u8 = 4;
pub const TYPE_CHAR: u8 = 5;
pub const TYPE_FLOAT: u8 = 6;
pub const TYPE_DOUBLE: u8 = 7;
pub const TYPE_BYTE: u8 = 8;
pub const TYPE_SHORT: u8 = 9;
pub const TYPE_INT: u8 = 10;
pub const TYPE_LONG: u8 = 11;

/// Shallow byte size of one value of `type_code`, per the canonical
/// HPROF primitive-size table (Boolean/Byte=1, Char/Short=2,
/// Float/Int=4, Double/Long=8, Object=`id_size`).
pub fn primitive_size(type_code: u8, id_size: u8) -> usize {
    match type_code {
        TYPE_OBJECT => id_size as usize,
        TYPE_BOOLEAN | TYPE_BYTE => 1,
        TYPE_CHAR | TYPE_SHORT => 2,
        TYPE_FLOAT | TYPE_INT => 4,
        TYPE_DOUBLE | TYPE_LONG => 8,
        _ => 1,
    }
}

/// A forward-only big-endian cursor over a byte slice. `id_size` is
/// read once from the HPROF header and then used for every object-id
/// field in the stream.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    pub id_size: u8,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8], id_size: u8) -> Self {
        ByteReader { data, pos: 0, id_size }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn slice(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn u8(&mut self) -> Result<u8> {
        let (_, v) = be_u8::<_, nom::error::Error<&[u8]>>(self.slice())
            .map_err(|_| AnalysisError::parse("hprof", "unexpected end of stream reading u8"))?;
        self.pos += 1;
        Ok(v)
    }

    pub fn u16(&mut self) -> Result<u16> {
        let (_, v) = be_u16::<_, nom::error::Error<&[u8]>>(self.slice())
            .map_err(|_| AnalysisError::parse("hprof", "unexpected end of stream reading u16"))?;
        self.pos += 2;
        Ok(v)
    }

    pub fn u32(&mut self) -> Result<u32> {
        let (_, v) = be_u32::<_, nom::error::Error<&[u8]>>(self.slice())
            .map_err(|_| AnalysisError::parse("hprof", "unexpected end of stream reading u32"))?;
        self.pos += 4;
        Ok(v)
    }

    pub fn i32(&mut self) -> Result<i32> {
        let (_, v) = be_i32::<_, nom::error::Error<&[u8]>>(self.slice())
            .map_err(|_| AnalysisError::parse("hprof", "unexpected end of stream reading i32"))?;
        self.pos += 4;
        Ok(v)
    }

    pub fn u64(&mut self) -> Result<u64> {
        let (_, v) = be_u64::<_, nom::error::Error<&[u8]>>(self.slice())
            .map_err(|_| AnalysisError::parse("hprof", "unexpected end of stream reading u64"))?;
        self.pos += 8;
        Ok(v)
    }

    /// Read an object identifier: `id_size`-bit unsigned, big-endian.
    pub fn id(&mut self) -> Result<u64> {
        match self.id_size {
            4 => self.u32().map(u64::from),
            8 => self.u64(),
            other => Err(AnalysisError::parse("hprof", format!("unsupported id size {other}"))),
        }
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(AnalysisError::parse("hprof", "unexpected end of stream reading byte span"));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        if self.remaining() < n {
            return Err(AnalysisError::parse("hprof", "unexpected end of stream while skipping"));
        }
        self.pos += n;
        Ok(())
    }

    pub fn read_value_of_type(&mut self, type_code: u8) -> Result<u64> {
        let size = primitive_size(type_code, self.id_size);
        match size {
            1 => self.u8().map(u64::from),
            2 => self.u16().map(u64::from),
            4 => self.u32().map(u64::from),
            8 => self.u64(),
            _ => unreachable!("primitive_size only returns 1, 2, 4, or 8"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GcRootType {
    Unknown,
    JniGlobal,
    JniLocal,
    JavaFrame,
    NativeStack,
    StickyClass,
    ThreadBlock,
    MonitorUsed,
    ThreadObject,
}

impl GcRootType {
    /// Stable small-integer discriminant used by the wire format; not
    /// the same numbering as the HPROF sub-record tags.
    pub fn discriminant(self) -> i32 {
        match self {
            GcRootType::Unknown => 0,
            GcRootType::JniGlobal => 1,
            GcRootType::JniLocal => 2,
            GcRootType::JavaFrame => 3,
            GcRootType::NativeStack => 4,
            GcRootType::StickyClass => 5,
            GcRootType::ThreadBlock => 6,
            GcRootType::MonitorUsed => 7,
            GcRootType::ThreadObject => 8,
        }
    }

    pub fn from_discriminant(value: i32) -> Self {
        match value {
            1 => GcRootType::JniGlobal,
            2 => GcRootType::JniLocal,
            3 => GcRootType::JavaFrame,
            4 => GcRootType::NativeStack,
            5 => GcRootType::StickyClass,
            6 => GcRootType::ThreadBlock,
            7 => GcRootType::MonitorUsed,
            8 => GcRootType::ThreadObject,
            _ => GcRootType::Unknown,
        }
    }

    pub fn from_sub_tag(tag: u8) -> Self {
        match tag {
            SUB_ROOT_JNI_GLOBAL => GcRootType::JniGlobal,
            SUB_ROOT_JNI_LOCAL => GcRootType::JniLocal,
            SUB_ROOT_JAVA_FRAME => GcRootType::JavaFrame,
            SUB_ROOT_NATIVE_STACK => GcRootType::NativeStack,
            SUB_ROOT_STICKY_CLASS => GcRootType::StickyClass,
            SUB_ROOT_THREAD_BLOCK => GcRootType::ThreadBlock,
            SUB_ROOT_MONITOR_USED => GcRootType::MonitorUsed,
            SUB_ROOT_THREAD_OBJ => GcRootType::ThreadObject,
            _ => GcRootType::Unknown,
        }
    }
}
