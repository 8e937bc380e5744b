pub use backend::{ComputeBackend, OsFamily, ParseBackendError};
#[cfg(any(target_os = "linux", target_os = "windows"))]
pub use cuda::init_nvml_wrapper;
pub use gpu::{compute_score, GpuInfo, GpuVendor, DEFAULT_COMPUTE_SCORE};

mod backend;
mod command;
mod cpu;
#[cfg(any(target_os = "linux", target_os = "windows"))]
mod cuda;
mod gpu;
mod ram;

/// Source of raw hardware facts.
///
/// [`HostProbe`] asks the running machine; [`FixedProbe`] returns canned values
/// so planning logic can be exercised without shelling out.
pub trait HardwareProbe {
    fn os_family(&self) -> OsFamily;

    fn cpu_cores(&self) -> usize;

    /// Zero when unknown.
    fn system_memory_mb(&self) -> u64;

    /// `None` when no GPU (or no vendor tool) was found.
    fn gpu_info(&self) -> Option<GpuInfo>;
}

/// Probes the machine the process is running on.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProbe;

impl HardwareProbe for HostProbe {
    fn os_family(&self) -> OsFamily {
        OsFamily::current()
    }

    fn cpu_cores(&self) -> usize {
        cpu::logical_core_count()
    }

    fn system_memory_mb(&self) -> u64 {
        ram::total_memory_mb()
    }

    #[cfg(any(target_os = "linux", target_os = "windows"))]
    fn gpu_info(&self) -> Option<GpuInfo> {
        match cuda::nvml_gpu() {
            Ok(gpu) => return Some(gpu),
            Err(e) => crate::debug!("NVML probe failed: {e}"),
        }
        command::nvidia_smi().or_else(command::rocm_smi)
    }

    /// Apple Silicon shares system memory with the GPU.
    #[cfg(target_os = "macos")]
    fn gpu_info(&self) -> Option<GpuInfo> {
        let unified_mb = command::sysctl_memsize_mb().unwrap_or_else(ram::total_memory_mb);
        (unified_mb > 0).then(|| GpuInfo::new("Apple Silicon", unified_mb, GpuVendor::Apple))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    fn gpu_info(&self) -> Option<GpuInfo> {
        None
    }
}

/// Canned hardware facts.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedProbe {
    pub os: OsFamily,
    pub cpu_cores: usize,
    pub system_memory_mb: u64,
    pub gpu: Option<GpuInfo>,
}

impl FixedProbe {
    pub fn cpu_only(os: OsFamily, cpu_cores: usize, system_memory_mb: u64) -> Self {
        Self {
            os,
            cpu_cores,
            system_memory_mb,
            gpu: None,
        }
    }

    pub fn with_gpu(mut self, gpu: GpuInfo) -> Self {
        self.gpu = Some(gpu);
        self
    }
}

impl HardwareProbe for FixedProbe {
    fn os_family(&self) -> OsFamily {
        self.os
    }

    fn cpu_cores(&self) -> usize {
        self.cpu_cores
    }

    fn system_memory_mb(&self) -> u64 {
        self.system_memory_mb
    }

    fn gpu_info(&self) -> Option<GpuInfo> {
        self.gpu.clone()
    }
}

/// Everything the planner needs to know about the host. Probed once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemSpecs {
    pub cpu_cores: usize,
    pub system_ram_mb: u64,
    pub gpu_name: String,
    pub gpu_vram_mb: u64,
    pub compute_score: f64,
    pub backend: ComputeBackend,
    pub os: OsFamily,
}

impl SystemSpecs {
    pub fn system_ram_gb(&self) -> f64 {
        self.system_ram_mb as f64 / 1024.0
    }

    pub fn gpu_vram_gb(&self) -> f64 {
        self.gpu_vram_mb as f64 / 1024.0
    }

    /// Same host, different backend. Used for `--backend` overrides.
    pub fn with_backend(mut self, backend: ComputeBackend) -> Self {
        self.backend = backend;
        self
    }
}

/// Builds [`SystemSpecs`] from a [`HardwareProbe`].
///
/// Backend precedence: explicit override, then the llama-server path, then the
/// detected GPU vendor, then the OS default (Metal on macOS, CPU elsewhere).
/// Profiling never fails; missing facts come back as zero.
#[derive(Debug, Clone)]
pub struct HardwareProfiler<P: HardwareProbe = HostProbe> {
    probe: P,
    server_path: Option<String>,
    backend_override: Option<ComputeBackend>,
}

impl Default for HardwareProfiler<HostProbe> {
    fn default() -> Self {
        Self::new(HostProbe)
    }
}

impl<P: HardwareProbe> HardwareProfiler<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe,
            server_path: None,
            backend_override: None,
        }
    }

    pub fn server_path<S: Into<String>>(mut self, path: Option<S>) -> Self {
        self.server_path = path.map(Into::into);
        self
    }

    pub fn backend_override(mut self, backend: Option<ComputeBackend>) -> Self {
        self.backend_override = backend;
        self
    }

    pub fn profile(&self) -> SystemSpecs {
        let os = self.probe.os_family();
        let cpu_cores = self.probe.cpu_cores();
        let system_ram_mb = self.probe.system_memory_mb();
        let gpu = self.probe.gpu_info();
        if gpu.is_none() {
            crate::info!("No GPU detected, planning for system memory only");
        }

        let backend = self.detect_backend(os, gpu.as_ref());
        let specs = SystemSpecs {
            cpu_cores,
            system_ram_mb,
            gpu_name: gpu.as_ref().map(|g| g.name.clone()).unwrap_or_default(),
            gpu_vram_mb: gpu.as_ref().map_or(0, |g| g.vram_mb),
            compute_score: gpu.as_ref().map_or(0.0, GpuInfo::score),
            backend,
            os,
        };
        crate::debug!("{}", specs);
        specs
    }

    fn detect_backend(&self, os: OsFamily, gpu: Option<&GpuInfo>) -> ComputeBackend {
        if let Some(backend) = self.backend_override {
            crate::debug!("Using backend override: {backend}");
            return backend;
        }
        if let Some(backend) = self
            .server_path
            .as_deref()
            .and_then(ComputeBackend::from_server_path)
        {
            crate::debug!("Backend from server path: {backend}");
            return backend;
        }
        match gpu {
            Some(gpu) => ComputeBackend::from_vendor(gpu.vendor),
            None => os.default_backend(),
        }
    }
}

impl std::fmt::Display for SystemSpecs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "SystemSpecs:")?;
        crate::i_nlns(
            f,
            &[
                format_args!("os: {}", self.os),
                format_args!("backend: {}", self.backend),
                format_args!("cpu_cores: {}", self.cpu_cores),
                format_args!("system_ram: {:.2} GB", self.system_ram_gb()),
                format_args!(
                    "gpu: {}",
                    if self.gpu_name.is_empty() {
                        "none"
                    } else {
                        self.gpu_name.as_str()
                    }
                ),
                format_args!("gpu_vram: {:.2} GB", self.gpu_vram_gb()),
                format_args!("compute_score: {:.1}", self.compute_score),
            ],
        )
    }
}
