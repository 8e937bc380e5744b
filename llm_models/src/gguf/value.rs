use super::GgufReadError;

/// GGUF metadata value-type tags.
///
/// Tag numbers are fixed by the file format; see
/// <https://github.com/ggml-org/ggml/blob/master/docs/gguf.md>.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    Bool,
    String,
    Array,
    U64,
    I64,
    F64,
}

/// Tag → (type, fixed byte width). Strings and arrays have no fixed width.
static VALUE_TYPES: [(ValueType, Option<u64>); 13] = [
    (ValueType::U8, Some(1)),
    (ValueType::I8, Some(1)),
    (ValueType::U16, Some(2)),
    (ValueType::I16, Some(2)),
    (ValueType::U32, Some(4)),
    (ValueType::I32, Some(4)),
    (ValueType::F32, Some(4)),
    (ValueType::Bool, Some(1)),
    (ValueType::String, None),
    (ValueType::Array, None),
    (ValueType::U64, Some(8)),
    (ValueType::I64, Some(8)),
    (ValueType::F64, Some(8)),
];

impl ValueType {
    pub fn from_u32(tag: u32) -> Result<Self, GgufReadError> {
        VALUE_TYPES
            .get(tag as usize)
            .map(|(ty, _)| *ty)
            .ok_or(GgufReadError::UnknownValueType(tag))
    }

    pub fn tag(self) -> u32 {
        VALUE_TYPES
            .iter()
            .position(|(ty, _)| *ty == self)
            .map_or(u32::MAX, |idx| idx as u32)
    }

    /// Payload width for fixed-size scalars.
    pub fn fixed_width(self) -> Option<u64> {
        VALUE_TYPES[self.tag() as usize].1
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::U8 | Self::I8 | Self::U16 | Self::I16 | Self::U32 | Self::I32 | Self::U64 | Self::I64
        )
    }
}

/// A decoded value for one of the recognised keys.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Uint(u64),
    Int(i64),
    Str(String),
}

impl MetaValue {
    /// Positive integers only. Zero and negatives read as absent.
    pub fn as_count(&self) -> Option<u64> {
        match self {
            Self::Uint(v) if *v > 0 => Some(*v),
            Self::Int(v) if *v > 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}
