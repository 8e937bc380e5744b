//! The six tuning strategies.
//!
//! Each preset takes the backend base parameters and returns a new snapshot
//! with layers, context, KV type and batching filled in. Context sizes chosen
//! here are proposals; the optimizer re-fits them against memory at the end.

use crate::{
    params::{GpuLayers, KvCacheType, OptimizedParams, SplitMode},
    planner::{MemoryBudgetPlanner, MemoryInputs},
};
use llm_devices::{ComputeBackend, SystemSpecs};
use llm_models::ModelMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Preset {
    Speed,
    Context,
    #[default]
    Balanced,
    SystemSafe,
    Ultra,
    Moe,
}

static PRESET_NAMES: &[(&str, Preset)] = &[
    ("speed", Preset::Speed),
    ("high_speed", Preset::Speed),
    ("context", Preset::Context),
    ("more_context", Preset::Context),
    ("balanced", Preset::Balanced),
    ("safe", Preset::SystemSafe),
    ("system_safe", Preset::SystemSafe),
    ("system-safe", Preset::SystemSafe),
    ("ultra", Preset::Ultra),
    ("performance", Preset::Ultra),
    ("ultra_performance", Preset::Ultra),
    ("moe", Preset::Moe),
    ("moe_optimized", Preset::Moe),
];

impl std::str::FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        PRESET_NAMES
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, preset)| *preset)
            .ok_or_else(|| format!("unknown preset '{s}'"))
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Speed => "speed",
            Self::Context => "context",
            Self::Balanced => "balanced",
            Self::SystemSafe => "system-safe",
            Self::Ultra => "ultra",
            Self::Moe => "moe",
        })
    }
}

/// Inputs shared by every preset for one model.
#[derive(Debug, Clone, Copy)]
pub struct ShapeContext<'a> {
    pub planner: MemoryBudgetPlanner<'a>,
    pub inputs: MemoryInputs,
    pub meta: &'a ModelMetadata,
    pub specs: &'a SystemSpecs,
}

impl ShapeContext<'_> {
    fn cores(&self) -> u64 {
        self.specs.cpu_cores as u64
    }

    fn trained_context(&self) -> u64 {
        self.meta.context_length
    }

    /// `cap` or the trained context, whichever is smaller.
    fn capped_context(&self, cap: u64) -> u64 {
        self.trained_context().min(cap)
    }

    /// Tokens the given memory (MB) buys at the planned layer placement.
    fn tokens_for_mb(&self, budget_mb: f64, gpu_layers: GpuLayers, kv: Option<KvCacheType>) -> u64 {
        let per_1k_mb =
            self.planner
                .context_memory_gb(&self.inputs, 1024, gpu_layers, kv)
                * 1024.0;
        if per_1k_mb <= 0.0 || budget_mb <= 0.0 {
            return 0;
        }
        (budget_mb / per_1k_mb) as u64 * 1024
    }
}

impl Preset {
    /// Like [`str::parse`], but an unknown name falls back to balanced.
    pub fn from_name_or_default(name: &str) -> Self {
        name.parse().unwrap_or_else(|e| {
            crate::warn!("{e}, using balanced");
            Self::Balanced
        })
    }

    pub fn target_utilization(&self) -> f64 {
        match self {
            Self::SystemSafe => 0.95,
            Self::Balanced => 0.90,
            Self::Speed => 0.97,
            Self::Context => 0.98,
            Self::Ultra => 0.98,
            Self::Moe => 0.97,
        }
    }

    /// Presets that reserve more VRAM for the KV cache when splitting layers.
    pub fn aggressive_context(&self) -> bool {
        matches!(self, Self::Speed | Self::Context | Self::Ultra)
    }

    pub fn shape(&self, base: OptimizedParams, cx: &ShapeContext) -> OptimizedParams {
        match self {
            Self::Speed => speed(base, cx),
            Self::Context => context(base, cx),
            Self::Balanced => balanced(base, cx),
            Self::SystemSafe => system_safe(base, cx),
            Self::Ultra => ultra(base, cx),
            Self::Moe => moe(base, cx),
        }
    }

    /// Threads as a preset-specific share of the cores, raised to two per
    /// active expert for MoE models.
    pub fn threads(&self, cpu_cores: u64, active_experts: u64) -> u64 {
        let threads = match self {
            Self::Speed => cpu_cores / 2,
            Self::SystemSafe => (cpu_cores / 2).min(4),
            Self::Ultra => cpu_cores.saturating_sub(1),
            Self::Moe => cpu_cores / 3,
            Self::Balanced | Self::Context => cpu_cores * 2 / 3,
        };
        threads.max(active_experts * 2).max(1)
    }
}

/// Fixed settings for a model that uses at most the simple-path share of VRAM.
pub fn simple(base: OptimizedParams, cx: &ShapeContext) -> OptimizedParams {
    OptimizedParams {
        gpu_layers: GpuLayers::All,
        context_size: cx.capped_context(32768).max(8192.min(cx.trained_context())),
        batch_size: 512,
        ubatch_size: 256,
        keep: 2048,
        parallel: (cx.cores() / 2).clamp(1, 8),
        defrag_threshold: 0.1,
        kv_cache: Some(KvCacheType::Q8_0),
        ..base
    }
}

fn speed(base: OptimizedParams, cx: &ShapeContext) -> OptimizedParams {
    let preset = Preset::Speed;
    let budget = cx
        .planner
        .plan(&cx.inputs, preset.target_utilization(), preset.aggressive_context());
    let kv = Some(KvCacheType::Q4_0);
    let context_size = cx.capped_context(16384);
    let ctx_mb = cx
        .planner
        .context_memory_gb(&cx.inputs, context_size, budget.gpu_layers, kv)
        * 1024.0;
    let remaining_mb = budget.usable_budget_mb - ctx_mb;

    let (batch_size, parallel, keep) = if remaining_mb > 1000.0 {
        (
            ((remaining_mb / 8.0) as u64).min(512),
            cx.cores().min(16),
            (context_size / 2).min(4096),
        )
    } else {
        (256, (cx.cores() / 2).min(8), 1024)
    };
    OptimizedParams {
        gpu_layers: budget.gpu_layers,
        context_size,
        kv_cache: kv,
        batch_size,
        ubatch_size: batch_size / 2,
        parallel: parallel.max(1),
        keep,
        defrag_threshold: 0.05,
        no_kv_offload: false,
        ..base
    }
}

fn context(base: OptimizedParams, cx: &ShapeContext) -> OptimizedParams {
    let preset = Preset::Context;
    let budget = cx
        .planner
        .plan(&cx.inputs, preset.target_utilization(), preset.aggressive_context());
    // q4_0 is the floor; nothing smaller is ever used.
    let kv = Some(KvCacheType::Q4_0);
    let max_tokens = cx.tokens_for_mb(budget.usable_budget_mb, budget.gpu_layers, kv);
    let context_size = max_tokens
        .min(cx.trained_context())
        .max(8192.min(cx.trained_context()));

    OptimizedParams {
        gpu_layers: budget.gpu_layers,
        context_size,
        kv_cache: kv,
        batch_size: 256,
        ubatch_size: 128,
        keep: (context_size / 8).min(2048),
        parallel: (cx.cores() / 4).clamp(1, 2),
        defrag_threshold: 0.05,
        ..base
    }
}

/// Context tiers balanced rounds down to.
static BALANCED_TIERS: &[u64] = &[65536, 32768, 16384];

fn balanced(base: OptimizedParams, cx: &ShapeContext) -> OptimizedParams {
    let preset = Preset::Balanced;
    let budget = cx
        .planner
        .plan(&cx.inputs, preset.target_utilization(), preset.aggressive_context());
    let kv = Some(KvCacheType::Q8_0);
    let floor = 8192.min(cx.trained_context());

    let remaining_gb = cx.planner.remaining_gb(&cx.inputs, budget.gpu_layers);
    let context_size = if remaining_gb <= 0.0 {
        floor
    } else {
        // KV memory is linear in context, so scale from the 8K cost.
        let reference_gb = cx
            .planner
            .context_memory_gb(&cx.inputs, 8192, budget.gpu_layers, kv);
        let max_tokens = if reference_gb > 0.0 {
            (remaining_gb * 0.8 / reference_gb * 8192.0) as u64
        } else {
            u64::MAX
        };
        let reasonable = max_tokens.min(cx.trained_context());
        BALANCED_TIERS
            .iter()
            .copied()
            .find(|&tier| reasonable >= tier)
            .unwrap_or(reasonable)
            .max(floor)
    };
    crate::debug!("Balanced: {remaining_gb:.2} GB remaining, proposing context {context_size}");

    OptimizedParams {
        gpu_layers: budget.gpu_layers,
        context_size,
        kv_cache: kv,
        batch_size: 512,
        ubatch_size: 256,
        keep: (context_size / 4).min(2048),
        parallel: (cx.cores() * 2 / 3).clamp(1, 6),
        defrag_threshold: 0.1,
        ..base
    }
}

fn system_safe(base: OptimizedParams, cx: &ShapeContext) -> OptimizedParams {
    let preset = Preset::SystemSafe;
    let budget = cx
        .planner
        .plan(&cx.inputs, preset.target_utilization(), preset.aggressive_context());
    let backend = cx.specs.backend;
    let gpu_layers = match budget.gpu_layers {
        GpuLayers::All
            if backend == ComputeBackend::Vulkan || cx.meta.parameter_count > 20_000_000_000 =>
        {
            GpuLayers::Count(cx.meta.layer_count.saturating_sub(2).max(1))
        }
        GpuLayers::All => GpuLayers::All,
        // One layer of margin, but a GPU run keeps at least one layer on the card.
        GpuLayers::Count(n) if cx.inputs.gpu_mode => GpuLayers::Count(n.saturating_sub(1).max(1)),
        GpuLayers::Count(n) => GpuLayers::Count(n.saturating_sub(1)),
    };
    let kv = if base.flash_attn && backend == ComputeBackend::Cuda {
        Some(KvCacheType::Q4_0)
    } else {
        None
    };
    let context_size = cx.capped_context(16384);

    OptimizedParams {
        gpu_layers,
        context_size,
        kv_cache: kv,
        batch_size: 256,
        ubatch_size: 128,
        keep: (context_size / 4).min(2048),
        parallel: (cx.cores() / 2).clamp(1, 4),
        defrag_threshold: 0.2,
        mlock: false,
        ..base
    }
}

fn ultra(base: OptimizedParams, cx: &ShapeContext) -> OptimizedParams {
    let preset = Preset::Ultra;
    let budget = cx
        .planner
        .plan(&cx.inputs, preset.target_utilization(), preset.aggressive_context());
    let kv = Some(KvCacheType::Q8_0);
    // 40% of what is left buys context, 60% buys throughput.
    let context_budget_mb = budget.usable_budget_mb * 0.4;
    let throughput_budget_mb = budget.usable_budget_mb * 0.6;

    let max_tokens = cx.tokens_for_mb(context_budget_mb, budget.gpu_layers, kv);
    let context_size = max_tokens
        .min(cx.capped_context(32768))
        .max(8192.min(cx.trained_context()));
    let batch_size = ((throughput_budget_mb.max(0.0) / 8.0) as u64).clamp(256, 512);

    OptimizedParams {
        gpu_layers: budget.gpu_layers,
        context_size,
        kv_cache: kv,
        batch_size,
        ubatch_size: batch_size / 2,
        parallel: cx.cores().clamp(1, 32),
        keep: (context_size / 4).min(8192),
        defrag_threshold: 0.05,
        numa_distribute: false,
        split_mode: Some(SplitMode::Layer),
        ..base
    }
}

fn moe(base: OptimizedParams, cx: &ShapeContext) -> OptimizedParams {
    let preset = Preset::Moe;
    let budget = cx
        .planner
        .plan(&cx.inputs, preset.target_utilization(), preset.aggressive_context());
    let context_size = cx.capped_context(32768);

    OptimizedParams {
        gpu_layers: budget.gpu_layers,
        context_size,
        kv_cache: Some(KvCacheType::Q8_0),
        batch_size: 512,
        ubatch_size: 256,
        keep: 2048,
        parallel: cx.meta.active_experts().clamp(2, 4),
        defrag_threshold: 0.1,
        split_mode: Some(SplitMode::Row),
        ..base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TuningConfig;
    use llm_devices::OsFamily;

    fn specs(backend: ComputeBackend, cores: usize, vram_mb: u64) -> SystemSpecs {
        SystemSpecs {
            cpu_cores: cores,
            system_ram_mb: 65536,
            gpu_name: "NVIDIA GeForce RTX 3090".to_string(),
            gpu_vram_mb: vram_mb,
            compute_score: 8.6,
            backend,
            os: OsFamily::Linux,
        }
    }

    fn meta(params: u64, layers: u64, ctx: u64) -> ModelMetadata {
        ModelMetadata {
            name: "test".to_string(),
            parameter_count: params,
            layer_count: layers,
            embedding_size: 5120,
            context_length: ctx,
            quant_label: "Q4_K_M".to_string(),
            ..Default::default()
        }
    }

    fn inputs(model_size_gb: f64, vram_mb: u64, layers: u64) -> MemoryInputs {
        MemoryInputs {
            model_size_gb,
            available_mb: vram_mb as f64,
            gpu_mode: true,
            total_layers: layers,
            embedding_size: 5120,
            is_moe: false,
        }
    }

    #[test]
    fn aliases() {
        for (name, preset) in PRESET_NAMES {
            assert_eq!(name.parse::<Preset>().unwrap(), *preset);
        }
        assert_eq!("Ultra_Performance".parse::<Preset>().unwrap(), Preset::Ultra);
        assert!("turbo".parse::<Preset>().is_err());
        assert_eq!(Preset::from_name_or_default("turbo"), Preset::Balanced);
        for preset in [
            Preset::Speed,
            Preset::Context,
            Preset::Balanced,
            Preset::SystemSafe,
            Preset::Ultra,
            Preset::Moe,
        ] {
            assert_eq!(preset.to_string().parse::<Preset>().unwrap(), preset);
        }
    }

    #[test]
    fn thread_rule() {
        assert_eq!(Preset::Speed.threads(16, 0), 8);
        assert_eq!(Preset::SystemSafe.threads(16, 0), 4);
        assert_eq!(Preset::Ultra.threads(16, 0), 15);
        assert_eq!(Preset::Moe.threads(16, 0), 5);
        assert_eq!(Preset::Balanced.threads(16, 0), 10);
        assert_eq!(Preset::Moe.threads(6, 8), 16);
        assert_eq!(Preset::Ultra.threads(1, 0), 1);
    }

    #[test]
    fn presets_shape_a_split_model() {
        let tuning = TuningConfig::default();
        let specs = specs(ComputeBackend::Cuda, 16, 12 * 1024);
        let meta = meta(32_000_000_000, 64, 131_072);
        let cx = ShapeContext {
            planner: MemoryBudgetPlanner::new(&tuning, specs.backend),
            inputs: inputs(18.0, specs.gpu_vram_mb, 64),
            meta: &meta,
            specs: &specs,
        };
        let base = OptimizedParams {
            flash_attn: true,
            mlock: true,
            ..Default::default()
        };

        let speed = Preset::Speed.shape(base.clone(), &cx);
        assert_eq!(speed.kv_cache, Some(KvCacheType::Q4_0));
        assert_eq!(speed.context_size, 16384);
        assert!(matches!(speed.gpu_layers, GpuLayers::Count(n) if n > 0 && n < 64));

        let safe = Preset::SystemSafe.shape(base.clone(), &cx);
        assert!(!safe.mlock);
        assert_eq!(safe.kv_cache, Some(KvCacheType::Q4_0));
        let GpuLayers::Count(balanced_layers) = Preset::Balanced.shape(base.clone(), &cx).gpu_layers
        else {
            panic!("expected a partial split");
        };
        assert_eq!(safe.gpu_layers, GpuLayers::Count(balanced_layers - 1));

        let ultra = Preset::Ultra.shape(base.clone(), &cx);
        assert!(ultra.context_size <= 32768);
        assert_eq!(ultra.split_mode, Some(SplitMode::Layer));
        assert_eq!(ultra.parallel, 16);

        let moe = Preset::Moe.shape(base, &cx);
        assert_eq!(moe.split_mode, Some(SplitMode::Row));
        assert_eq!(moe.parallel, 2);
    }

    #[test]
    fn system_safe_keeps_one_gpu_layer() {
        let tuning = TuningConfig::default();
        let specs = specs(ComputeBackend::Cuda, 8, 8 * 1024);
        let meta = meta(400_000_000_000, 32, 32768);
        let planner = MemoryBudgetPlanner::new(&tuning, specs.backend);
        let inputs = inputs(200.0, specs.gpu_vram_mb, 32);
        // Only about 6.7 GB of an 8 GB card is left for a 200 GB model.
        assert_eq!(planner.max_gpu_layers(&inputs, false), GpuLayers::Count(1));
        let cx = ShapeContext {
            planner,
            inputs,
            meta: &meta,
            specs: &specs,
        };
        let safe = Preset::SystemSafe.shape(OptimizedParams::default(), &cx);
        assert_eq!(safe.gpu_layers, GpuLayers::Count(1));

        let cpu = ShapeContext {
            inputs: MemoryInputs {
                gpu_mode: false,
                available_mb: 65536.0,
                ..inputs
            },
            ..cx
        };
        let safe = Preset::SystemSafe.shape(OptimizedParams::default(), &cpu);
        assert_eq!(safe.gpu_layers, GpuLayers::Count(0));
    }

    #[test]
    fn balanced_rounds_to_tiers() {
        let tuning = TuningConfig::default();
        let specs = specs(ComputeBackend::Cuda, 16, 24 * 1024);
        let meta = meta(14_000_000_000, 40, 131_072);
        let cx = ShapeContext {
            planner: MemoryBudgetPlanner::new(&tuning, specs.backend),
            inputs: inputs(15.0, specs.gpu_vram_mb, 40),
            meta: &meta,
            specs: &specs,
        };
        // remaining = 24 - 15 - 0.5 = 8.5 GB, 80% = 6.8 GB.
        // 8K at q8_0 is 8192 * 5120 * 2 * 40 bytes = 3.125 GiB, so ~17.8K tokens.
        let params = Preset::Balanced.shape(OptimizedParams::default(), &cx);
        assert_eq!(params.gpu_layers, GpuLayers::All);
        assert_eq!(params.context_size, 16384);
        assert_eq!(params.keep, 2048);
    }

    #[test]
    fn short_trained_context_is_respected() {
        let tuning = TuningConfig::default();
        let specs = specs(ComputeBackend::Cuda, 8, 8 * 1024);
        let meta = meta(1_000_000_000, 22, 2048);
        let cx = ShapeContext {
            planner: MemoryBudgetPlanner::new(&tuning, specs.backend),
            inputs: inputs(0.7, specs.gpu_vram_mb, 22),
            meta: &meta,
            specs: &specs,
        };
        let params = simple(OptimizedParams::default(), &cx);
        assert_eq!(params.context_size, 2048);
        for preset in [Preset::Speed, Preset::Context, Preset::Balanced, Preset::Ultra] {
            assert!(preset.shape(OptimizedParams::default(), &cx).context_size <= 2048);
        }
    }
}
