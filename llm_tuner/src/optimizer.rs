//! The per-model pipeline.
//!
//! Stages run in a fixed order and each returns a new [`OptimizedParams`]:
//! backend base values, preset shaping (or the simple path), backend
//! constraints, MoE expert offload, the thread rule, and finally context
//! validation against the memory that is actually left.

use crate::{
    backend::BackendAdapter,
    config::TuningConfig,
    moe::MoeOffloadPlanner,
    params::{OptimizedParams, Pooling},
    planner::{MemoryBudgetPlanner, MemoryInputs},
    preset::{self, Preset, ShapeContext},
};
use bon::Builder;
use llm_devices::SystemSpecs;
use llm_models::ModelMetadata;

#[derive(Debug, Clone, Builder)]
pub struct Optimizer {
    specs: SystemSpecs,
    #[builder(default)]
    tuning: TuningConfig,
}

impl Optimizer {
    pub fn specs(&self) -> &SystemSpecs {
        &self.specs
    }

    pub fn tuning(&self) -> &TuningConfig {
        &self.tuning
    }

    /// GPU mode needs both a GPU backend and some VRAM to put layers in.
    pub fn gpu_mode(&self) -> bool {
        self.specs.backend.is_gpu() && self.specs.gpu_vram_mb > 0
    }

    pub fn memory_inputs(&self, meta: &ModelMetadata) -> MemoryInputs {
        let gpu_mode = self.gpu_mode();
        let available_mb = if gpu_mode {
            self.specs.gpu_vram_mb
        } else {
            self.specs.system_ram_mb
        };
        MemoryInputs {
            model_size_gb: meta.model_size_gb(),
            available_mb: available_mb as f64,
            gpu_mode,
            total_layers: meta.layer_count,
            embedding_size: meta.embedding_size,
            is_moe: meta.is_moe,
        }
    }

    fn planner(&self) -> MemoryBudgetPlanner<'_> {
        MemoryBudgetPlanner::new(&self.tuning, self.specs.backend)
    }

    /// True when the model is small enough that preset arithmetic is skipped.
    pub fn takes_simple_path(&self, inputs: &MemoryInputs) -> bool {
        inputs.gpu_mode
            && inputs.model_size_gb <= inputs.available_gb() * self.tuning.simple_path_fraction
    }

    pub fn optimize(&self, meta: &ModelMetadata, preset: Preset) -> OptimizedParams {
        let inputs = self.memory_inputs(meta);
        let cx = ShapeContext {
            planner: self.planner(),
            inputs,
            meta,
            specs: &self.specs,
        };
        let backend = BackendAdapter::new(&self.tuning, &self.specs);

        let base = backend.base_params();
        let shaped = if self.takes_simple_path(&inputs) {
            crate::debug!(
                "{}: {:.2} GB fits easily in {:.2} GB, using the simple configuration",
                meta.name,
                inputs.model_size_gb,
                inputs.available_gb()
            );
            preset::simple(base, &cx)
        } else {
            preset.shape(base, &cx)
        };
        let constrained = backend.apply(shaped);
        let offloaded = MoeOffloadPlanner::new(&self.tuning, &self.specs).apply(constrained, meta);
        let threaded = OptimizedParams {
            threads: preset.threads(self.specs.cpu_cores as u64, meta.active_experts()),
            embeddings: offloaded
                .embeddings
                .or_else(|| meta.is_embedding_model().then(Pooling::default)),
            ..offloaded
        };
        self.validate_context(threaded, &inputs, meta)
    }

    /// Last stage: the layer ratio is final here, so the context is re-fitted
    /// against it.
    fn validate_context(
        &self,
        params: OptimizedParams,
        inputs: &MemoryInputs,
        meta: &ModelMetadata,
    ) -> OptimizedParams {
        let proposal = if meta.context_length > 0 {
            params.context_size.min(meta.context_length)
        } else {
            params.context_size
        };
        let fit = self
            .planner()
            .fit_context(inputs, proposal, params.gpu_layers, params.kv_cache);
        if !fit.within_budget {
            crate::warn!(
                "{}: context {} is not covered by the memory budget",
                meta.name,
                fit.context_size
            );
        }
        OptimizedParams {
            context_size: fit.context_size,
            keep: params.keep.min(fit.context_size),
            ..params
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{GpuLayers, KvCacheType};
    use llm_devices::{ComputeBackend, OsFamily};

    fn rtx_3090() -> SystemSpecs {
        SystemSpecs {
            cpu_cores: 16,
            system_ram_mb: 65536,
            gpu_name: "NVIDIA GeForce RTX 3090".to_string(),
            gpu_vram_mb: 24576,
            compute_score: 8.6,
            backend: ComputeBackend::Cuda,
            os: OsFamily::Linux,
        }
    }

    fn llama_8b() -> ModelMetadata {
        ModelMetadata {
            name: "Meta-Llama-3.1-8B-Instruct".to_string(),
            architecture: "llama".to_string(),
            parameter_count: 8_000_000_000,
            layer_count: 32,
            embedding_size: 4096,
            context_length: 131_072,
            quant_label: "Q4_K_M".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn small_model_takes_simple_path() {
        let optimizer = Optimizer::builder().specs(rtx_3090()).build();
        let params = optimizer.optimize(&llama_8b(), Preset::Speed);
        assert_eq!(params.gpu_layers, GpuLayers::All);
        assert_eq!(params.context_size, 32768);
        assert_eq!(params.batch_size, 512);
        assert_eq!(params.kv_cache, Some(KvCacheType::Q8_0));
        assert_eq!(params.threads, 8);
        assert!(params.flash_attn);
    }

    #[test]
    fn large_model_is_split_and_fitted() {
        let specs = SystemSpecs {
            gpu_name: "NVIDIA RTX A6000".to_string(),
            gpu_vram_mb: 49152,
            ..rtx_3090()
        };
        let optimizer = Optimizer::builder().specs(specs).build();
        let meta = ModelMetadata {
            name: "Llama-3.3-70B-Instruct".to_string(),
            parameter_count: 70_000_000_000,
            layer_count: 80,
            embedding_size: 8192,
            ..llama_8b()
        };
        let params = optimizer.optimize(&meta, Preset::Balanced);
        let GpuLayers::Count(layers) = params.gpu_layers else {
            panic!("70B is split across GPU and CPU");
        };
        assert_eq!(layers, 79);
        assert_eq!(params.context_size, 4096);

        let inputs = optimizer.memory_inputs(&meta);
        let planner = MemoryBudgetPlanner::new(optimizer.tuning(), ComputeBackend::Cuda);
        let remaining = planner.remaining_gb(&inputs, params.gpu_layers);
        let used = planner.context_memory_gb(&inputs, params.context_size, params.gpu_layers, params.kv_cache);
        assert!(used <= remaining * 0.8);
        assert!(params.keep <= params.context_size);
    }

    #[test]
    fn cpu_backend() {
        let specs = rtx_3090().with_backend(ComputeBackend::Cpu);
        let optimizer = Optimizer::builder().specs(specs).build();
        assert!(!optimizer.gpu_mode());
        let params = optimizer.optimize(&llama_8b(), Preset::Balanced);
        assert_eq!(params.gpu_layers, GpuLayers::Count(0));
        assert!(!params.flash_attn);
        assert_eq!(params.cache_type_k(), "");
        assert!(params.no_kv_offload);
    }

    #[test]
    fn embedding_models_get_pooling() {
        let optimizer = Optimizer::builder().specs(rtx_3090()).build();
        let meta = ModelMetadata {
            name: "nomic-embed-text-v1.5".to_string(),
            parameter_count: 137_000_000,
            layer_count: 12,
            embedding_size: 768,
            context_length: 2048,
            ..Default::default()
        };
        let params = optimizer.optimize(&meta, Preset::Balanced);
        assert_eq!(params.embeddings, Some(Pooling::Mean));
        assert_eq!(params.context_size, 2048);
    }

    #[test]
    fn repeated_runs_match() {
        let optimizer = Optimizer::builder().specs(rtx_3090()).build();
        let meta = ModelMetadata {
            parameter_count: 32_000_000_000,
            layer_count: 64,
            embedding_size: 5120,
            ..llama_8b()
        };
        for preset in [Preset::Speed, Preset::Context, Preset::Ultra, Preset::SystemSafe] {
            assert_eq!(optimizer.optimize(&meta, preset), optimizer.optimize(&meta, preset));
        }
    }
}
