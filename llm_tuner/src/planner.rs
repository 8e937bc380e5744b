//! Memory budgeting: how many layers fit on the GPU and how much context the
//! remaining memory can hold.

use crate::{
    config::TuningConfig,
    params::{kv_bytes_per_element, GpuLayers, KvCacheType},
};
use llm_devices::ComputeBackend;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const FALLBACK_LAYERS: u64 = 32;
const FALLBACK_HIDDEN: u64 = 4096;
/// Fallback sizes tried, largest first, when a proposed context does not fit.
pub const CONTEXT_LADDER: [u64; 7] = [65536, 32768, 16384, 8192, 4096, 2048, 1024];
pub const MIN_CONTEXT: u64 = 1024;
/// With this much VRAM a model never gets zero layers.
const MIN_USEFUL_VRAM_GB: f64 = 4.0;

/// Layer count to budget with when the model does not report one.
fn layers_or_fallback(total_layers: u64) -> u64 {
    if total_layers == 0 {
        FALLBACK_LAYERS
    } else {
        total_layers
    }
}

/// KV-cache size in GB for `context_size` tokens.
///
/// Only the GPU-resident share of the layers counts, so the same context costs
/// less VRAM when fewer layers are offloaded.
pub fn context_memory_gb(
    context_size: u64,
    hidden_size: u64,
    total_layers: u64,
    gpu_layers: GpuLayers,
    kv: Option<KvCacheType>,
) -> f64 {
    let layers = layers_or_fallback(total_layers);
    let hidden = if hidden_size == 0 {
        FALLBACK_HIDDEN
    } else {
        hidden_size
    };
    context_size as f64
        * hidden as f64
        * 2.0
        * kv_bytes_per_element(kv)
        * layers as f64
        * gpu_layers.ratio(layers)
        / GIB
}

/// What the planner needs to know about one model on this host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryInputs {
    pub model_size_gb: f64,
    /// VRAM in GPU mode, system RAM otherwise.
    pub available_mb: f64,
    pub gpu_mode: bool,
    pub total_layers: u64,
    pub embedding_size: u64,
    pub is_moe: bool,
}

impl MemoryInputs {
    pub fn available_gb(&self) -> f64 {
        self.available_mb / 1024.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Budget {
    pub gpu_layers: GpuLayers,
    pub total_budget_mb: f64,
    /// What is left of the target budget after the weights and backend overhead.
    pub usable_budget_mb: f64,
}

/// Outcome of fitting a context size into the remaining memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextFit {
    pub context_size: u64,
    /// False only for the last-resort minimum.
    pub within_budget: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryBudgetPlanner<'a> {
    tuning: &'a TuningConfig,
    backend: ComputeBackend,
}

impl<'a> MemoryBudgetPlanner<'a> {
    pub fn new(tuning: &'a TuningConfig, backend: ComputeBackend) -> Self {
        Self { tuning, backend }
    }

    /// `All` when the model fits the full-offload share of VRAM, otherwise the
    /// largest layer count that leaves room for a KV reserve and overhead.
    pub fn max_gpu_layers(&self, inputs: &MemoryInputs, aggressive_context: bool) -> GpuLayers {
        if !inputs.gpu_mode {
            return GpuLayers::Count(0);
        }
        let vram_gb = inputs.available_gb();
        if inputs.model_size_gb <= vram_gb * self.tuning.full_offload_fraction {
            return GpuLayers::All;
        }

        let total = layers_or_fallback(inputs.total_layers);
        let layers = self.partial_layers(inputs, vram_gb, total, aggressive_context);
        if layers == 0 && vram_gb > MIN_USEFUL_VRAM_GB {
            return GpuLayers::Count((total / 4).max(1));
        }
        GpuLayers::Count(layers)
    }

    fn partial_layers(
        &self,
        inputs: &MemoryInputs,
        vram_gb: f64,
        total: u64,
        aggressive_context: bool,
    ) -> u64 {
        if inputs.model_size_gb <= 0.0 || vram_gb <= 0.0 {
            return 0;
        }
        let t = self.tuning;
        let (mut kv_reserve, overhead) = match (aggressive_context, inputs.is_moe) {
            (true, false) => (t.kv_reserve_aggressive_gb, t.layer_overhead_gb),
            (false, false) => (t.kv_reserve_gb, t.layer_overhead_gb),
            (true, true) => (t.kv_reserve_aggressive_gb, t.layer_overhead_moe_gb),
            (false, true) => (t.kv_reserve_gb, t.layer_overhead_moe_gb),
        };
        if inputs.is_moe {
            kv_reserve += t.moe_extra_kv_reserve_gb;
        }

        let usable = vram_gb - kv_reserve - overhead;
        if usable <= 0.0 {
            crate::debug!("No VRAM left for weights after {kv_reserve:.1} GB KV reserve");
            return 0;
        }
        let mut ratio = usable / inputs.model_size_gb;
        if inputs.is_moe {
            ratio *= t.moe_sparsity_bonus;
        }

        let mut layers = ((total as f64 * ratio) as u64).clamp(1, total);
        if total > 20 {
            layers = layers.min(total - 1);
        }
        crate::debug!("{layers}/{total} layers fit in {usable:.2} GB usable VRAM");
        layers
    }

    pub fn plan(
        &self,
        inputs: &MemoryInputs,
        target_utilization: f64,
        aggressive_context: bool,
    ) -> Budget {
        let overhead_mb = if inputs.gpu_mode {
            self.tuning.backend_overhead_mb.for_backend(self.backend)
        } else {
            self.tuning.backend_overhead_mb.cpu
        };
        let total_budget_mb = inputs.available_mb * target_utilization;
        let usable_budget_mb = total_budget_mb - inputs.model_size_gb * 1024.0 - overhead_mb;
        Budget {
            gpu_layers: self.max_gpu_layers(inputs, aggressive_context),
            total_budget_mb,
            usable_budget_mb,
        }
    }

    /// Layers that occupy the memory being budgeted. On the CPU path the whole
    /// model sits in system RAM.
    fn placement(&self, inputs: &MemoryInputs, gpu_layers: GpuLayers) -> GpuLayers {
        if inputs.gpu_mode {
            gpu_layers
        } else {
            GpuLayers::All
        }
    }

    pub fn context_memory_gb(
        &self,
        inputs: &MemoryInputs,
        context_size: u64,
        gpu_layers: GpuLayers,
        kv: Option<KvCacheType>,
    ) -> f64 {
        context_memory_gb(
            context_size,
            inputs.embedding_size,
            inputs.total_layers,
            self.placement(inputs, gpu_layers),
            kv,
        )
    }

    /// Memory actually left once the resident share of the weights is loaded.
    pub fn remaining_gb(&self, inputs: &MemoryInputs, gpu_layers: GpuLayers) -> f64 {
        let resident = self
            .placement(inputs, gpu_layers)
            .ratio(layers_or_fallback(inputs.total_layers));
        inputs.available_gb() - inputs.model_size_gb * resident - self.tuning.context_overhead_gb
    }

    /// Keeps `proposal` if its KV cache fits the safety share of the remaining
    /// memory, otherwise walks [`CONTEXT_LADDER`] down. When nothing fits the
    /// minimum is returned anyway with `within_budget == false`.
    pub fn fit_context(
        &self,
        inputs: &MemoryInputs,
        proposal: u64,
        gpu_layers: GpuLayers,
        kv: Option<KvCacheType>,
    ) -> ContextFit {
        let remaining = self.remaining_gb(inputs, gpu_layers);
        let allowed = remaining * self.tuning.context_safety_margin;
        let fits = |ctx: u64| {
            remaining > 0.0 && self.context_memory_gb(inputs, ctx, gpu_layers, kv) <= allowed
        };

        if proposal > 0 && fits(proposal) {
            return ContextFit {
                context_size: proposal,
                within_budget: true,
            };
        }
        if let Some(ctx) = CONTEXT_LADDER
            .iter()
            .copied()
            .filter(|&c| c < proposal)
            .find(|&c| fits(c))
        {
            crate::warn!(
                "Context {proposal} needs more than {allowed:.2} GB, reduced to {ctx}"
            );
            return ContextFit {
                context_size: ctx,
                within_budget: true,
            };
        }

        let last_resort = if proposal == 0 {
            MIN_CONTEXT
        } else {
            MIN_CONTEXT.min(proposal)
        };
        crate::warn!(
            "No context size fits in {remaining:.2} GB remaining; using {last_resort} as a last resort"
        );
        ContextFit {
            context_size: last_resort,
            within_budget: false,
        }
    }
}
