use crate::{
    command::ServerCommand,
    error::TunerResult,
    optimizer::Optimizer,
    params::OptimizedParams,
    preset::Preset,
    registry::Registry,
};
use llm_models::{ModelMetadata, ModelMetadataResolver};

/// Result of tuning one registry entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TunedModel {
    pub name: String,
    pub preset: Preset,
    pub metadata: ModelMetadata,
    pub params: OptimizedParams,
    pub command: String,
}

impl std::fmt::Display for TunedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let p = &self.params;
        write!(
            f,
            "{}: preset={} layers={} ctx={} batch={} threads={} kv={} overrides={}",
            self.name,
            self.preset,
            p.gpu_layers,
            p.context_size,
            p.batch_size,
            p.threads,
            p.kv_cache.map_or("default", |k| k.as_str()),
            p.override_tensors.len()
        )
    }
}

/// Runs the optimizer over registry entries, one model at a time.
#[derive(Debug, Clone)]
pub struct TuningSession {
    optimizer: Optimizer,
    resolver: ModelMetadataResolver,
    preset: Preset,
}

impl TuningSession {
    pub fn new(optimizer: Optimizer, preset: Preset) -> Self {
        Self {
            optimizer,
            resolver: ModelMetadataResolver::new(),
            preset,
        }
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    pub fn tune_model(&self, registry: &Registry, name: &str) -> TunerResult<TunedModel> {
        let entry = registry.entry(name)?;
        let cmd = ServerCommand::parse(name, &entry.cmd)?;
        let metadata = self.resolver.resolve(name, &cmd.model_path);
        crate::debug!("{metadata}");

        let params = cmd.carry_over(self.optimizer.optimize(&metadata, self.preset));
        let command = cmd.render(&params);
        crate::info!("Optimized {name} with the {} preset", self.preset);
        Ok(TunedModel {
            name: name.to_string(),
            preset: self.preset,
            metadata,
            params,
            command,
        })
    }

    /// Rewrites every command in `registry`. A model that fails is logged and
    /// left as it was.
    pub fn tune_all(&self, registry: &mut Registry) -> Vec<TunedModel> {
        let names: Vec<String> = registry.models.keys().cloned().collect();
        let mut tuned = Vec::with_capacity(names.len());
        for name in names {
            match self.tune_model(registry, &name) {
                Ok(model) => {
                    if let Some(entry) = registry.models.get_mut(&name) {
                        entry.cmd = model.command.clone();
                    }
                    tuned.push(model);
                }
                Err(e) => crate::warn!("Skipping {name}: {e}"),
            }
        }
        tuned
    }
}

/// One line per tuned model.
pub fn summary(tuned: &[TunedModel]) -> String {
    let mut out = format!("Optimized {} models:\n", tuned.len());
    for model in tuned {
        out.push_str(&format!("  {model}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::GpuLayers;
    use llm_devices::{ComputeBackend, OsFamily, SystemSpecs};
    use std::path::Path;

    fn session(backend: ComputeBackend) -> TuningSession {
        let specs = SystemSpecs {
            cpu_cores: 12,
            system_ram_mb: 32768,
            gpu_name: "NVIDIA GeForce RTX 4070".to_string(),
            gpu_vram_mb: 12288,
            compute_score: 8.9,
            backend,
            os: OsFamily::Linux,
        };
        TuningSession::new(Optimizer::builder().specs(specs).build(), Preset::Balanced)
    }

    fn registry() -> Registry {
        let yaml = r#"
models:
  "llama-8b":
    cmd: /opt/llama-cuda/llama-server -m /models/Meta-Llama-3.1-8B-Instruct-Q4_K_M.gguf --port ${PORT} --main-gpu 0
  "broken":
    cmd: /opt/llama-cuda/llama-server --port ${PORT}
"#;
        Registry::from_yaml(yaml, Path::new("test.yaml")).unwrap()
    }

    #[test]
    fn tune_one() {
        let tuned = session(ComputeBackend::Cuda)
            .tune_model(&registry(), "llama-8b")
            .unwrap();
        assert_eq!(tuned.params.gpu_layers, GpuLayers::All);
        assert_eq!(tuned.params.pinned.main_gpu, Some(0));
        assert!(tuned.command.starts_with(
            "\"/opt/llama-cuda/llama-server\" -m \"/models/Meta-Llama-3.1-8B-Instruct-Q4_K_M.gguf\" --port ${PORT}"
        ));
        assert!(tuned.command.contains("--main-gpu 0"));
        assert_eq!(tuned.metadata.quant_label, "Q4_K_M");
    }

    #[test]
    fn failures_are_skipped() {
        let mut registry = registry();
        let before = registry.models["broken"].cmd.clone();
        let tuned = session(ComputeBackend::Cuda).tune_all(&mut registry);
        assert_eq!(tuned.len(), 1);
        assert_eq!(registry.models["broken"].cmd, before);
        assert_eq!(registry.models["llama-8b"].cmd, tuned[0].command);
        assert!(summary(&tuned).contains("llama-8b: preset=balanced layers=all"));

        assert!(session(ComputeBackend::Cuda)
            .tune_model(&registry, "absent")
            .is_err());
    }
}
