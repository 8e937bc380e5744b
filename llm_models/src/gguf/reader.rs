use super::value::{MetaValue, ValueType};
use crate::{LlmModelsError, LlmModelsResult};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};

/// `"GGUF"` read as a little-endian u32.
pub const GGUF_MAGIC: u32 = 0x4655_4747;
pub const MAX_KEY_LEN: u64 = 1024;
/// Applies to every string, decoded or skipped, including array elements.
pub const MAX_STRING_LEN: u64 = 10 * 1024;
pub const MAX_ARRAY_LEN: u64 = 1_000_000;

#[derive(Debug, thiserror::Error)]
pub enum GgufReadError {
    #[error("not a GGUF file (magic 0x{0:08x})")]
    BadMagic(u32),

    #[error("unsupported GGUF version {0}")]
    UnsupportedVersion(u32),

    #[error("key length {0} exceeds {max} bytes", max = MAX_KEY_LEN)]
    KeyTooLong(u64),

    #[error("string length {len} exceeds {max} bytes")]
    StringTooLong { len: u64, max: u64 },

    #[error("array length {0} exceeds {max} elements", max = MAX_ARRAY_LEN)]
    ArrayTooLong(u64),

    #[error("unknown value type tag {0}")]
    UnknownValueType(u32),

    #[error("value at offset {offset} needs {needed} bytes but the file ends at {len}")]
    Truncated { offset: u64, needed: u64, len: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The recognised subset of a GGUF metadata section.
///
/// Every field is optional: a well-formed file may simply not carry the key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GgufMetadata {
    pub version: u32,
    pub tensor_count: u64,
    pub kv_count: u64,
    pub architecture: Option<String>,
    pub name: Option<String>,
    pub size_label: Option<String>,
    pub block_count: Option<u64>,
    pub context_length: Option<u64>,
    pub embedding_length: Option<u64>,
    pub head_count_kv: Option<u64>,
    pub key_length: Option<u64>,
    pub value_length: Option<u64>,
    pub sliding_window: Option<u64>,
    pub expert_count: Option<u64>,
    pub expert_used_count: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Architecture,
    Name,
    SizeLabel,
    BlockCount,
    ContextLength,
    EmbeddingLength,
    HeadCountKv,
    KeyLength,
    ValueLength,
    SlidingWindow,
    ExpertCount,
    ExpertUsedCount,
}

static GENERAL_KEYS: &[(&str, Field)] = &[
    ("general.architecture", Field::Architecture),
    ("general.name", Field::Name),
    ("general.size_label", Field::SizeLabel),
];

/// Suffixes of `{architecture}.*` keys.
static ARCH_KEYS: &[(&str, Field)] = &[
    ("block_count", Field::BlockCount),
    ("context_length", Field::ContextLength),
    ("embedding_length", Field::EmbeddingLength),
    ("attention.head_count_kv", Field::HeadCountKv),
    ("attention.key_length", Field::KeyLength),
    ("attention.value_length", Field::ValueLength),
    ("attention.sliding_window", Field::SlidingWindow),
    ("attention.sliding_window_size", Field::SlidingWindow),
    ("expert_count", Field::ExpertCount),
    ("expert_used_count", Field::ExpertUsedCount),
];

/// Single forward pass over the GGUF header and metadata section.
///
/// Tensor payload is never touched. Any error aborts the whole pass; nothing
/// read before the failure is returned.
pub struct GgufMetadataReader<R> {
    reader: R,
    pos: u64,
    len: u64,
}

impl<R: Read + Seek> GgufMetadataReader<R> {
    /// `reader` must be positioned at the start of the file.
    pub fn new(mut reader: R) -> Result<Self, GgufReadError> {
        let pos = reader.stream_position()?;
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(pos))?;
        Ok(Self { reader, pos, len })
    }

    pub fn read(mut self) -> Result<GgufMetadata, GgufReadError> {
        let magic = self.u32()?;
        if magic != GGUF_MAGIC {
            return Err(GgufReadError::BadMagic(magic));
        }
        let version = self.u32()?;
        if !(2..=3).contains(&version) {
            return Err(GgufReadError::UnsupportedVersion(version));
        }
        let mut meta = GgufMetadata {
            version,
            tensor_count: self.u64()?,
            kv_count: self.u64()?,
            ..Default::default()
        };

        for _ in 0..meta.kv_count {
            let key = self.key()?;
            let value_type = ValueType::from_u32(self.u32()?)?;
            match recognise(&key, meta.architecture.as_deref()) {
                Some(field) => match self.decode(value_type)? {
                    Some(value) => apply(&mut meta, field, value),
                    None => crate::trace!("{key}: unexpected type {value_type:?}, ignored"),
                },
                None => self.skip(value_type)?,
            }
        }
        Ok(meta)
    }

    fn u32(&mut self) -> Result<u32, GgufReadError> {
        self.need(4)?;
        self.pos += 4;
        Ok(self.reader.read_u32::<LittleEndian>()?)
    }

    fn u64(&mut self) -> Result<u64, GgufReadError> {
        self.need(8)?;
        self.pos += 8;
        Ok(self.reader.read_u64::<LittleEndian>()?)
    }

    fn need(&self, bytes: u64) -> Result<(), GgufReadError> {
        match self.pos.checked_add(bytes) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(GgufReadError::Truncated {
                offset: self.pos,
                needed: bytes,
                len: self.len,
            }),
        }
    }

    fn bytes(&mut self, len: u64) -> Result<Vec<u8>, GgufReadError> {
        self.need(len)?;
        let mut buf = vec![0u8; len as usize];
        self.reader.read_exact(&mut buf)?;
        self.pos += len;
        // GGUF strings are not null terminated but some writers add one anyway.
        while let Some(0) = buf.last() {
            buf.pop();
        }
        Ok(buf)
    }

    fn forward(&mut self, bytes: u64) -> Result<(), GgufReadError> {
        self.need(bytes)?;
        self.reader.seek(SeekFrom::Current(bytes as i64))?;
        self.pos += bytes;
        Ok(())
    }

    fn key(&mut self) -> Result<String, GgufReadError> {
        let len = self.u64()?;
        if len > MAX_KEY_LEN {
            return Err(GgufReadError::KeyTooLong(len));
        }
        Ok(String::from_utf8_lossy(&self.bytes(len)?).into_owned())
    }

    fn string(&mut self) -> Result<String, GgufReadError> {
        let len = self.u64()?;
        if len > MAX_STRING_LEN {
            return Err(GgufReadError::StringTooLong {
                len,
                max: MAX_STRING_LEN,
            });
        }
        Ok(String::from_utf8_lossy(&self.bytes(len)?).into_owned())
    }

    /// Decodes integers and strings. Anything else is skipped and yields `None`.
    fn decode(&mut self, value_type: ValueType) -> Result<Option<MetaValue>, GgufReadError> {
        if value_type == ValueType::String {
            return Ok(Some(MetaValue::Str(self.string()?)));
        }
        if !value_type.is_integer() {
            self.skip(value_type)?;
            return Ok(None);
        }
        let width = value_type.fixed_width().unwrap_or(0);
        self.need(width)?;
        let r = &mut self.reader;
        let value = match value_type {
            ValueType::U8 => MetaValue::Uint(r.read_u8()? as u64),
            ValueType::U16 => MetaValue::Uint(r.read_u16::<LittleEndian>()? as u64),
            ValueType::U32 => MetaValue::Uint(r.read_u32::<LittleEndian>()? as u64),
            ValueType::U64 => MetaValue::Uint(r.read_u64::<LittleEndian>()?),
            ValueType::I8 => MetaValue::Int(r.read_i8()? as i64),
            ValueType::I16 => MetaValue::Int(r.read_i16::<LittleEndian>()? as i64),
            ValueType::I32 => MetaValue::Int(r.read_i32::<LittleEndian>()? as i64),
            _ => MetaValue::Int(r.read_i64::<LittleEndian>()?),
        };
        self.pos += width;
        Ok(Some(value))
    }

    fn skip(&mut self, value_type: ValueType) -> Result<(), GgufReadError> {
        if let Some(width) = value_type.fixed_width() {
            return self.forward(width);
        }
        match value_type {
            ValueType::String => {
                let len = self.u64()?;
                if len > MAX_STRING_LEN {
                    return Err(GgufReadError::StringTooLong {
                        len,
                        max: MAX_STRING_LEN,
                    });
                }
                self.forward(len)
            }
            _ => {
                let element_type = ValueType::from_u32(self.u32()?)?;
                let count = self.u64()?;
                if count > MAX_ARRAY_LEN {
                    return Err(GgufReadError::ArrayTooLong(count));
                }
                match element_type.fixed_width() {
                    Some(width) => self.forward(count * width),
                    None => {
                        for _ in 0..count {
                            self.skip(element_type)?;
                        }
                        Ok(())
                    }
                }
            }
        }
    }
}

/// Architecture-specific keys only exist once `general.architecture` has been
/// seen, since their prefix is the architecture name.
fn recognise(key: &str, architecture: Option<&str>) -> Option<Field> {
    if let Some((_, field)) = GENERAL_KEYS.iter().find(|(k, _)| *k == key) {
        return Some(*field);
    }
    let suffix = key.strip_prefix(architecture?)?.strip_prefix('.')?;
    ARCH_KEYS
        .iter()
        .find(|(k, _)| *k == suffix)
        .map(|(_, field)| *field)
}

fn apply(meta: &mut GgufMetadata, field: Field, value: MetaValue) {
    let text = || value.as_str().map(str::to_string);
    match field {
        Field::Architecture => meta.architecture = text(),
        Field::Name => meta.name = text(),
        Field::SizeLabel => meta.size_label = text(),
        Field::BlockCount => meta.block_count = value.as_count(),
        Field::ContextLength => meta.context_length = value.as_count(),
        Field::EmbeddingLength => meta.embedding_length = value.as_count(),
        Field::HeadCountKv => meta.head_count_kv = value.as_count(),
        Field::KeyLength => meta.key_length = value.as_count(),
        Field::ValueLength => meta.value_length = value.as_count(),
        Field::SlidingWindow => meta.sliding_window = value.as_count(),
        Field::ExpertCount => meta.expert_count = value.as_count(),
        Field::ExpertUsedCount => meta.expert_used_count = value.as_count(),
    }
}

/// Opens `path` and reads its metadata section.
pub fn read_gguf_metadata<P: AsRef<std::path::Path>>(path: P) -> LlmModelsResult<GgufMetadata> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .map_err(|e| LlmModelsError::file_system("open model file", path, e))?;
    GgufMetadataReader::new(std::io::BufReader::new(file))
        .and_then(GgufMetadataReader::read)
        .map_err(|source| LlmModelsError::Gguf {
            path: path.to_path_buf(),
            source,
        })
}
