//! # llm_devices: Hardware profiling for llama-server tuning
//!
//! The llm_devices crate is a workspace member of the llm_tuner project.
//! It answers one question for the planner: what is this machine able to run?
//!
//! ## Features
//!
//! * CPU core count and system RAM via sysinfo, with per-OS fallbacks
//! * GPU name, VRAM and compute capability via NVML, `nvidia-smi`, `rocm-smi`, or `sysctl` on Apple Silicon
//! * Compute backend detection from the llama-server install path
//! * A [`HardwareProbe`] trait so callers can substitute canned hardware in tests
//! * Logging tools

// Internal modules
mod devices;
mod logging;

// Internal imports
#[allow(unused_imports)]
use anyhow::{anyhow, bail, Error, Result};
#[allow(unused_imports)]
use tracing::{debug, error, info, span, trace, warn, Level};

// Public exports
pub use self::{
    devices::{
        compute_score, ComputeBackend, FixedProbe, GpuInfo, GpuVendor, HardwareProbe,
        HardwareProfiler, HostProbe, OsFamily, ParseBackendError, SystemSpecs,
        DEFAULT_COMPUTE_SCORE,
    },
    logging::{i_ln, i_lns, i_nln, i_nlns, LoggingConfig, LoggingConfigTrait},
};

// Platform-specific exports
#[cfg(any(target_os = "linux", target_os = "windows"))]
pub use devices::init_nvml_wrapper;
