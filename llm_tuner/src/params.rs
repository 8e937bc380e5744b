use serde::{Deserialize, Serialize};
use std::fmt;

/// Value llama-server reads as "offload every layer".
pub const ALL_LAYERS_SENTINEL: u64 = 9999;

/// GPU layer placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpuLayers {
    /// Let the server place every layer on the GPU.
    All,
    Count(u64),
}

impl GpuLayers {
    /// Share of the model's layers that live on the GPU.
    pub fn ratio(&self, total_layers: u64) -> f64 {
        match self {
            Self::All => 1.0,
            Self::Count(_) if total_layers == 0 => 0.0,
            Self::Count(n) => (*n).min(total_layers) as f64 / total_layers as f64,
        }
    }

    pub fn flag_value(&self) -> u64 {
        match self {
            Self::All => ALL_LAYERS_SENTINEL,
            Self::Count(n) => *n,
        }
    }
}

impl Default for GpuLayers {
    fn default() -> Self {
        Self::Count(0)
    }
}

impl fmt::Display for GpuLayers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Count(n) => write!(f, "{n}"),
        }
    }
}

/// KV-cache element type, applied to both the key and value caches.
///
/// Nothing below `q4_0` is offered; the server is unstable with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KvCacheType {
    F16,
    Q8_0,
    Q4_0,
    Q4_1,
}

impl KvCacheType {
    pub fn bytes_per_element(&self) -> f64 {
        match self {
            Self::F16 => 2.0,
            Self::Q8_0 => 1.0,
            Self::Q4_0 | Self::Q4_1 => 0.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::F16 => "f16",
            Self::Q8_0 => "q8_0",
            Self::Q4_0 => "q4_0",
            Self::Q4_1 => "q4_1",
        }
    }
}

impl fmt::Display for KvCacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bytes per element for an optional cache type; unset means the server's f16.
pub fn kv_bytes_per_element(kv: Option<KvCacheType>) -> f64 {
    kv.map_or(KvCacheType::F16.bytes_per_element(), |k| k.bytes_per_element())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")] // "none", "layer", "row"
pub enum SplitMode {
    None,
    Layer,
    Row,
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format!("{self:?}").to_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RopeScaling {
    None,
    Linear,
    Yarn,
}

impl std::str::FromStr for RopeScaling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "linear" => Ok(Self::Linear),
            "yarn" => Ok(Self::Yarn),
            other => Err(format!("unknown rope scaling '{other}'")),
        }
    }
}

impl fmt::Display for RopeScaling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format!("{self:?}").to_lowercase())
    }
}

/// Pooling for embedding models. Lowercase is exactly what the server expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    None,
    #[default]
    Mean,
    Cls,
    Last,
    Rank,
}

impl std::str::FromStr for Pooling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "mean" => Ok(Self::Mean),
            "cls" => Ok(Self::Cls),
            "last" => Ok(Self::Last),
            "rank" => Ok(Self::Rank),
            other => Err(format!("unknown pooling '{other}'")),
        }
    }
}

impl fmt::Display for Pooling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format!("{self:?}").to_lowercase())
    }
}

/// Flags the user set by hand. Carried over verbatim, never tuned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PinnedFlags {
    pub tensor_split: Option<String>,
    pub main_gpu: Option<u32>,
    pub rope_scaling: Option<RopeScaling>,
    pub rope_freq_base: Option<f64>,
}

/// The tuned launch parameters for one model.
///
/// Pipeline stages take one of these by value and return the next snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizedParams {
    pub gpu_layers: GpuLayers,
    pub threads: u64,
    pub context_size: u64,
    pub batch_size: u64,
    pub ubatch_size: u64,
    pub keep: u64,
    pub defrag_threshold: f64,
    pub parallel: u64,
    pub flash_attn: bool,
    pub cont_batching: bool,
    pub mlock: bool,
    pub mmap: bool,
    pub numa_distribute: bool,
    pub no_kv_offload: bool,
    /// One type for both caches, so K and V can never disagree.
    pub kv_cache: Option<KvCacheType>,
    pub split_mode: Option<SplitMode>,
    pub override_tensors: Vec<String>,
    /// Set for embedding models.
    pub embeddings: Option<Pooling>,
    pub pinned: PinnedFlags,
}

impl OptimizedParams {
    /// `--cache-type-k` value; empty when the server default is used.
    pub fn cache_type_k(&self) -> &'static str {
        self.kv_cache.map_or("", |k| k.as_str())
    }

    /// `--cache-type-v` value; always equal to [`Self::cache_type_k`].
    pub fn cache_type_v(&self) -> &'static str {
        self.cache_type_k()
    }
}

impl fmt::Display for OptimizedParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "OptimizedParams:")?;
        llm_devices::i_nlns(
            f,
            &[
                format_args!("gpu_layers: {}", self.gpu_layers),
                format_args!("threads: {}", self.threads),
                format_args!("context_size: {}", self.context_size),
                format_args!("batch: {} / ubatch: {}", self.batch_size, self.ubatch_size),
                format_args!("keep: {}", self.keep),
                format_args!("parallel: {}", self.parallel),
                format_args!(
                    "kv_cache: {}",
                    self.kv_cache.map_or("default", |k| k.as_str())
                ),
                format_args!("flash_attn: {}", self.flash_attn),
                format_args!("expert overrides: {}", self.override_tensors.len()),
            ],
        )
    }
}
