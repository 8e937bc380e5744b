//! Empirical reserves, overheads and thresholds used by the planner.
//!
//! None of these are derived from first principles. They are exposed so a
//! user can loosen or tighten them per machine with a TOML file passed via
//! `--tuning`.

use crate::error::{TunerError, TunerResult};
use llm_devices::ComputeBackend;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// A model at or below this share of VRAM gets every layer on the GPU.
    pub full_offload_fraction: f64,
    /// A model at or below this share of VRAM skips preset shaping.
    pub simple_path_fraction: f64,
    pub kv_reserve_gb: f64,
    /// KV reserve for the speed, context and ultra presets.
    pub kv_reserve_aggressive_gb: f64,
    pub layer_overhead_gb: f64,
    pub layer_overhead_moe_gb: f64,
    pub moe_extra_kv_reserve_gb: f64,
    pub moe_sparsity_bonus: f64,
    /// Subtracted from what is left after the weights are loaded.
    pub context_overhead_gb: f64,
    /// Share of the remaining memory a context size may use.
    pub context_safety_margin: f64,
    pub backend_overhead_mb: BackendOverhead,
    pub flash_attn_min_compute: f64,
    pub mlock_min_ram_mb: u64,
    pub mlock_min_ram_cpu_mb: u64,
    pub moe: MoeTuning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendOverhead {
    pub cuda: f64,
    pub vulkan: f64,
    pub metal: f64,
    pub rocm: f64,
    pub cpu: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoeTuning {
    /// Expert offload starts once the footprint exceeds usable memory by this factor.
    pub offload_trigger_ratio: f64,
    /// Subtracted from the excess fraction before sizing the offloaded layers.
    pub offload_discount: f64,
    pub kv_reserve_f16_gb: f64,
    pub kv_reserve_q8_0_gb: f64,
    pub kv_reserve_q4_0_gb: f64,
    pub runtime_overhead_gb: f64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            full_offload_fraction: 0.80,
            simple_path_fraction: 0.50,
            kv_reserve_gb: 1.0,
            kv_reserve_aggressive_gb: 2.0,
            layer_overhead_gb: 0.3,
            layer_overhead_moe_gb: 0.5,
            moe_extra_kv_reserve_gb: 0.5,
            moe_sparsity_bonus: 1.2,
            context_overhead_gb: 0.5,
            context_safety_margin: 0.8,
            backend_overhead_mb: BackendOverhead::default(),
            flash_attn_min_compute: 8.0,
            mlock_min_ram_mb: 32_000,
            mlock_min_ram_cpu_mb: 16_000,
            moe: MoeTuning::default(),
        }
    }
}

impl Default for BackendOverhead {
    fn default() -> Self {
        Self {
            cuda: 200.0,
            vulkan: 500.0,
            metal: 300.0,
            rocm: 400.0,
            cpu: 1024.0,
        }
    }
}

impl Default for MoeTuning {
    fn default() -> Self {
        Self {
            offload_trigger_ratio: 1.5,
            offload_discount: 0.25,
            kv_reserve_f16_gb: 0.5,
            kv_reserve_q8_0_gb: 0.4,
            kv_reserve_q4_0_gb: 0.3,
            runtime_overhead_gb: 0.3,
        }
    }
}

impl BackendOverhead {
    pub fn for_backend(&self, backend: ComputeBackend) -> f64 {
        match backend {
            ComputeBackend::Cuda => self.cuda,
            ComputeBackend::Vulkan => self.vulkan,
            ComputeBackend::Metal => self.metal,
            ComputeBackend::Rocm => self.rocm,
            ComputeBackend::Cpu => self.cpu,
        }
    }
}

impl TuningConfig {
    /// Loads `path`, writing the defaults there first if it does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> TunerResult<Self> {
        let path = path.as_ref();
        let cfg: Self = confy::load_path(path).map_err(|source| TunerError::TuningLoad {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        crate::debug!("Loaded tuning config from {}", path.display());
        Ok(cfg)
    }

    pub fn validate(&self) -> TunerResult<()> {
        let fractions = [
            ("full_offload_fraction", self.full_offload_fraction),
            ("simple_path_fraction", self.simple_path_fraction),
            ("context_safety_margin", self.context_safety_margin),
        ];
        for (field, value) in fractions {
            if !(value > 0.0 && value <= 1.0) {
                return Err(TunerError::InvalidConfig {
                    field,
                    reason: format!("{value} is not in (0, 1]"),
                });
            }
        }
        if self.simple_path_fraction > self.full_offload_fraction {
            return Err(TunerError::InvalidConfig {
                field: "simple_path_fraction",
                reason: "must not exceed full_offload_fraction".to_string(),
            });
        }
        if self.moe.offload_trigger_ratio < 1.0 {
            return Err(TunerError::InvalidConfig {
                field: "moe.offload_trigger_ratio",
                reason: format!("{} is below 1.0", self.moe.offload_trigger_ratio),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        TuningConfig::default().validate().unwrap();
        assert_eq!(
            TuningConfig::default()
                .backend_overhead_mb
                .for_backend(ComputeBackend::Vulkan),
            500.0
        );
    }

    #[test]
    fn rejects_bad_fractions() {
        let cfg = TuningConfig {
            context_safety_margin: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(TunerError::InvalidConfig {
                field: "context_safety_margin",
                ..
            })
        ));

        let cfg = TuningConfig {
            simple_path_fraction: 0.9,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_creates_then_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuning.toml");
        let cfg = TuningConfig::load(&path).unwrap();
        assert_eq!(cfg, TuningConfig::default());
        assert!(path.exists());

        std::fs::write(&path, "context_safety_margin = 0.7\n[moe]\noffload_trigger_ratio = 2.0\n")
            .unwrap();
        let cfg = TuningConfig::load(&path).unwrap();
        assert_eq!(cfg.context_safety_margin, 0.7);
        assert_eq!(cfg.moe.offload_trigger_ratio, 2.0);
        assert_eq!(cfg.kv_reserve_gb, 1.0);
    }
}
