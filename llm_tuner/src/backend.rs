use crate::{
    config::TuningConfig,
    params::{GpuLayers, KvCacheType, OptimizedParams, SplitMode},
};
use llm_devices::{ComputeBackend, OsFamily, SystemSpecs};

const VULKAN_MAX_BATCH: u64 = 1024;
const VULKAN_MAX_UBATCH: u64 = 512;
const VULKAN_MAX_PARALLEL: u64 = 4;
const ROCM_MAX_BATCH: u64 = 2048;

/// Hard constraints of the compute backend. Applied after preset shaping, so
/// a backend rule always overrides whatever the preset chose.
#[derive(Debug, Clone, Copy)]
pub struct BackendAdapter<'a> {
    tuning: &'a TuningConfig,
    specs: &'a SystemSpecs,
}

impl<'a> BackendAdapter<'a> {
    pub fn new(tuning: &'a TuningConfig, specs: &'a SystemSpecs) -> Self {
        Self { tuning, specs }
    }

    fn backend(&self) -> ComputeBackend {
        self.specs.backend
    }

    fn flash_attn_capable(&self) -> bool {
        self.specs.compute_score >= self.tuning.flash_attn_min_compute
    }

    /// Starting point for every preset.
    pub fn base_params(&self) -> OptimizedParams {
        let ram = self.specs.system_ram_mb;
        let (flash_attn, mlock) = match self.backend() {
            ComputeBackend::Cuda | ComputeBackend::Rocm => {
                (self.flash_attn_capable(), ram > self.tuning.mlock_min_ram_mb)
            }
            ComputeBackend::Metal => (true, false),
            ComputeBackend::Vulkan => (false, ram > self.tuning.mlock_min_ram_mb),
            ComputeBackend::Cpu => (false, ram > self.tuning.mlock_min_ram_cpu_mb),
        };
        OptimizedParams {
            flash_attn,
            mlock,
            cont_batching: true,
            mmap: true,
            ..Default::default()
        }
    }

    pub fn apply(&self, params: OptimizedParams) -> OptimizedParams {
        let backend = self.backend();
        crate::trace!("Applying {backend} constraints");
        match backend {
            ComputeBackend::Cuda => OptimizedParams {
                flash_attn: params.flash_attn && self.flash_attn_capable(),
                ..params
            },
            ComputeBackend::Vulkan => OptimizedParams {
                flash_attn: false,
                numa_distribute: false,
                batch_size: params.batch_size.min(VULKAN_MAX_BATCH),
                ubatch_size: params.ubatch_size.min(VULKAN_MAX_UBATCH),
                parallel: params.parallel.min(VULKAN_MAX_PARALLEL),
                kv_cache: params.kv_cache.map(|kv| match kv {
                    KvCacheType::Q4_1 => KvCacheType::Q8_0,
                    other => other,
                }),
                ..params
            },
            ComputeBackend::Metal => OptimizedParams {
                numa_distribute: false,
                mlock: false,
                // Unified memory; the cache stays with the weights.
                no_kv_offload: params.no_kv_offload || self.specs.os == OsFamily::MacOs,
                ..params
            },
            ComputeBackend::Rocm => OptimizedParams {
                batch_size: params.batch_size.min(ROCM_MAX_BATCH),
                ..params
            },
            ComputeBackend::Cpu => OptimizedParams {
                gpu_layers: GpuLayers::Count(0),
                flash_attn: false,
                no_kv_offload: true,
                numa_distribute: false,
                split_mode: Some(SplitMode::None),
                // Quantized KV cache is a GPU-path feature.
                kv_cache: None,
                ..params
            },
        }
    }
}
