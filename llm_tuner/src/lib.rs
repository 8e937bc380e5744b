//! # llm_tuner: llama-server launch flags sized to the machine
//!
//! Reads a llama-swap registry, works out what each model needs and what the
//! host can give, and rewrites every launch command with GPU layers, context
//! size, KV-cache type and batching chosen for one of six presets.
//!
//! ```no_run
//! use llm_devices::{HardwareProfiler, HostProbe};
//! use llm_tuner::{Optimizer, Preset, Registry, TuningSession};
//!
//! let mut registry = Registry::load("llama-swap.yaml")?;
//! let specs = HardwareProfiler::new(HostProbe)
//!     .server_path(registry.server_path())
//!     .profile();
//! let session = TuningSession::new(Optimizer::builder().specs(specs).build(), Preset::Balanced);
//! let tuned = session.tune_all(&mut registry);
//! registry.save("llama-swap.yaml")?;
//! println!("{}", llm_tuner::summary(&tuned));
//! # Ok::<(), llm_tuner::TunerError>(())
//! ```

// Internal modules
mod backend;
mod command;
mod config;
mod error;
mod moe;
mod optimizer;
mod params;
mod planner;
mod preset;
mod registry;
mod session;

// Internal imports
#[allow(unused_imports)]
use tracing::{debug, error, info, span, trace, warn, Level};

// Public exports
pub use backend::BackendAdapter;
pub use command::{split_command, ServerCommand, DEFAULT_PORT};
pub use config::{BackendOverhead, MoeTuning, TuningConfig};
pub use error::{TunerError, TunerResult};
pub use moe::{expert_offload_pattern, MoeOffloadPlanner};
pub use optimizer::Optimizer;
pub use params::{
    GpuLayers, KvCacheType, OptimizedParams, PinnedFlags, Pooling, RopeScaling, SplitMode,
    ALL_LAYERS_SENTINEL,
};
pub use planner::{
    context_memory_gb, Budget, ContextFit, MemoryBudgetPlanner, MemoryInputs, CONTEXT_LADDER,
    MIN_CONTEXT,
};
pub use preset::{Preset, ShapeContext};
pub use registry::{backup, Group, ModelEntry, Registry};
pub use session::{summary, TunedModel, TuningSession};
