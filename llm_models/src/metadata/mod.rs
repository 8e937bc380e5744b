mod heuristics;
mod resolver;

pub use heuristics::{
    default_context_length, default_embedding_size, default_layer_count, parse_param_count,
    FilenameHints, ASSUMED_ACTIVE_EXPERTS, ASSUMED_EXPERTS,
};
pub use resolver::ModelMetadataResolver;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
/// Used when nothing at all is known about the model's size.
pub const FALLBACK_MODEL_SIZE_GB: f64 = 10.0;

/// Where the bulk of a [`ModelMetadata`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataSource {
    /// The GGUF header was read; only gaps were filled by heuristics.
    Gguf,
    /// The header could not be read. Everything is a file-name guess.
    #[default]
    Heuristic,
}

/// Everything the tuner knows about one model file.
///
/// Zero means unknown for the count fields until [`ModelMetadataResolver`]
/// has filled the defaults; after resolution `layer_count`, `context_length`
/// and `embedding_size` are always non-zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelMetadata {
    pub name: String,
    pub path: String,
    pub architecture: String,
    pub parameter_count: u64,
    pub layer_count: u64,
    pub embedding_size: u64,
    pub context_length: u64,
    pub head_count_kv: u64,
    pub key_length: u64,
    pub value_length: u64,
    pub sliding_window: u64,
    pub quant_label: String,
    /// Sum of all parts for multi-part files. Zero when the file is missing.
    pub file_size_bytes: u64,
    pub is_moe: bool,
    pub expert_count: u64,
    pub active_expert_count: u64,
    pub source: MetadataSource,
}

impl ModelMetadata {
    pub fn quant_multiplier(&self) -> f64 {
        crate::quant_multiplier(&self.quant_label)
    }

    /// Weights footprint in GB: the file size when known, otherwise an estimate.
    pub fn model_size_gb(&self) -> f64 {
        if self.file_size_bytes > 0 {
            return self.file_size_bytes as f64 / BYTES_PER_GB;
        }
        self.estimated_size_gb()
    }

    pub fn estimated_size_gb(&self) -> f64 {
        let mult = self.quant_multiplier();
        if self.parameter_count > 0 {
            let mut size = self.parameter_count as f64 / 1e9 * mult;
            if self.is_moe {
                size *= 1.3;
            }
            return size * 1.1;
        }
        if self.layer_count > 0 && self.embedding_size > 0 {
            let per_layer = (self.embedding_size * self.embedding_size * 4) as f64 / 1e9;
            return self.layer_count as f64 * per_layer * mult;
        }
        FALLBACK_MODEL_SIZE_GB
    }

    /// Active experts, or 0 for dense models.
    pub fn active_experts(&self) -> u64 {
        if self.is_moe {
            self.active_expert_count
        } else {
            0
        }
    }

    pub fn is_embedding_model(&self) -> bool {
        self.name.to_lowercase().contains("embed")
    }
}

impl std::fmt::Display for ModelMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "ModelMetadata: {}", self.name)?;
        let arch = if self.architecture.is_empty() {
            "unknown"
        } else {
            self.architecture.as_str()
        };
        let quant = if self.quant_label.is_empty() {
            "unknown"
        } else {
            self.quant_label.as_str()
        };
        llm_devices::i_nlns(
            f,
            &[
                format_args!("source: {:?}", self.source),
                format_args!("architecture: {arch}"),
                format_args!("parameters: {:.2}B", self.parameter_count as f64 / 1e9),
                format_args!("layers: {}", self.layer_count),
                format_args!("embedding: {}", self.embedding_size),
                format_args!("context_length: {}", self.context_length),
                format_args!("quant: {quant} (x{:.3})", self.quant_multiplier()),
                format_args!("size: {:.2} GB", self.model_size_gb()),
            ],
        )?;
        if self.is_moe {
            llm_devices::i_nln(
                f,
                format_args!(
                    "moe: {} experts, {} active",
                    self.expert_count, self.active_expert_count
                ),
            )?;
        }
        Ok(())
    }
}
