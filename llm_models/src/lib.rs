//! # llm_models: GGUF metadata and model-shape inference
//!
//! Reads the metadata section of GGUF files and turns it, plus whatever the
//! file name gives away, into a [`ModelMetadata`] the planner can size.

mod error;
pub mod estimate;
pub mod gguf;
mod metadata;
mod quant;
mod shard;

#[allow(unused_imports)]
use tracing::{debug, error, info, span, trace, warn, Level};

pub use error::{LlmModelsError, LlmModelsResult};
pub use estimate::{FootprintEstimate, FootprintRow, DEFAULT_RUNTIME_OVERHEAD_GIB};
pub use gguf::{read_gguf_metadata, GgufMetadata, GgufReadError};
pub use metadata::{
    default_context_length, default_embedding_size, default_layer_count, parse_param_count,
    FilenameHints, MetadataSource, ModelMetadata, ModelMetadataResolver, FALLBACK_MODEL_SIZE_GB,
};
pub use quant::{detect_quant_label, quant_multiplier, DEFAULT_QUANT_MULTIPLIER, QUANT_MULTIPLIERS};
pub use shard::{total_model_bytes, ShardId};
