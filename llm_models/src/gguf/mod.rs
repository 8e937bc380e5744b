//! Reader for the metadata section of GGUF model files.
//!
//! Format reference: <https://github.com/ggml-org/ggml/blob/master/docs/gguf.md>

mod reader;
mod value;

pub use reader::{
    read_gguf_metadata, GgufMetadata, GgufMetadataReader, GgufReadError, GGUF_MAGIC,
    MAX_ARRAY_LEN, MAX_KEY_LEN, MAX_STRING_LEN,
};
pub use value::{MetaValue, ValueType};

#[cfg(test)]
pub(crate) use reader::tests::GgufBlob;
