//! Tensor-level offload for mixture-of-experts models.
//!
//! Layer offload alone rarely saves a large MoE model: most of its bytes are
//! expert feed-forward weights that only a few tokens touch. When the model
//! is far bigger than the usable VRAM the expert tensors of the last layers
//! are pinned to system memory with `--override-tensor`.

use crate::{
    config::TuningConfig,
    params::{KvCacheType, OptimizedParams, SplitMode},
};
use llm_devices::SystemSpecs;
use llm_models::ModelMetadata;

const FALLBACK_LAYERS: u64 = 32;
const MOE_MAX_UBATCH: u64 = 128;
/// Parallel slots when the active-expert count is unknown.
const FALLBACK_PARALLEL: u64 = 2;

/// The directive that moves the expert weights of `layer` to system memory.
pub fn expert_offload_pattern(layer: u64) -> String {
    format!(r"blk\.{layer}\.ffn_.*_exps\.weight=CPU")
}

#[derive(Debug, Clone, Copy)]
pub struct MoeOffloadPlanner<'a> {
    tuning: &'a TuningConfig,
    specs: &'a SystemSpecs,
}

impl<'a> MoeOffloadPlanner<'a> {
    pub fn new(tuning: &'a TuningConfig, specs: &'a SystemSpecs) -> Self {
        Self { tuning, specs }
    }

    /// Weights footprint in GB using the label's real quantization multiplier.
    pub fn footprint_gb(&self, meta: &ModelMetadata) -> f64 {
        if meta.parameter_count > 0 {
            meta.parameter_count as f64 / 1e9 * meta.quant_multiplier() * 1.1
        } else {
            meta.model_size_gb()
        }
    }

    /// VRAM left for the weights once the KV cache and runtime are reserved.
    pub fn usable_gb(&self, kv: Option<KvCacheType>) -> f64 {
        let moe = &self.tuning.moe;
        let kv_reserve = match kv {
            None | Some(KvCacheType::F16) => moe.kv_reserve_f16_gb,
            Some(KvCacheType::Q8_0) => moe.kv_reserve_q8_0_gb,
            Some(KvCacheType::Q4_0 | KvCacheType::Q4_1) => moe.kv_reserve_q4_0_gb,
        };
        self.specs.gpu_vram_gb() - kv_reserve - moe.runtime_overhead_gb
    }

    /// Number of trailing layers whose experts go to the CPU; zero when the
    /// overage is marginal.
    pub fn offloaded_layers(&self, meta: &ModelMetadata, kv: Option<KvCacheType>) -> u64 {
        let footprint = self.footprint_gb(meta);
        let usable = self.usable_gb(kv);
        let moe = &self.tuning.moe;
        if footprint <= 0.0 || footprint <= usable * moe.offload_trigger_ratio {
            return 0;
        }
        let layers = if meta.layer_count == 0 {
            FALLBACK_LAYERS
        } else {
            meta.layer_count
        };
        let excess = (footprint - usable.max(0.0)) / footprint;
        let share = excess - moe.offload_discount;
        if share <= 0.0 {
            return 0;
        }
        let n = ((layers as f64 * share).ceil() as u64).clamp(1, layers);
        crate::debug!(
            "{}: {footprint:.2} GB of weights vs {usable:.2} GB usable, offloading experts of {n}/{layers} layers",
            meta.name
        );
        n
    }

    pub fn apply(&self, params: OptimizedParams, meta: &ModelMetadata) -> OptimizedParams {
        if !meta.is_moe || !self.specs.backend.is_gpu() || self.specs.gpu_vram_mb == 0 {
            return params;
        }
        let kv_cache = params.kv_cache.or(Some(KvCacheType::Q8_0));
        let layers = if meta.layer_count == 0 {
            FALLBACK_LAYERS
        } else {
            meta.layer_count
        };
        let n = self.offloaded_layers(meta, kv_cache);
        let override_tensors = (layers - n..layers).map(expert_offload_pattern).collect();

        let active = meta.active_experts();
        let parallel_cap = if active > 0 { active } else { FALLBACK_PARALLEL };
        OptimizedParams {
            kv_cache,
            split_mode: Some(SplitMode::Row),
            ubatch_size: params.ubatch_size.min(MOE_MAX_UBATCH),
            parallel: params.parallel.min(parallel_cap).max(1),
            override_tensors,
            ..params
        }
    }
}
