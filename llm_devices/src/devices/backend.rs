use super::gpu::GpuVendor;

/// The hardware acceleration path the llama-server binary was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeBackend {
    Cuda,
    Vulkan,
    Metal,
    Rocm,
    Cpu,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown compute backend '{0}' (expected one of: cuda, vulkan, metal, rocm, cpu)")]
pub struct ParseBackendError(pub String);

impl ComputeBackend {
    /// Matched in order against the lowercased server path.
    const PATH_MARKERS: [(&'static str, ComputeBackend); 5] = [
        ("cuda", ComputeBackend::Cuda),
        ("vulkan", ComputeBackend::Vulkan),
        ("metal", ComputeBackend::Metal),
        ("rocm", ComputeBackend::Rocm),
        ("cpu", ComputeBackend::Cpu),
    ];

    /// Infers the backend from the llama-server install path, e.g.
    /// `/opt/llama.cpp-cuda12/llama-server`.
    pub fn from_server_path(path: &str) -> Option<Self> {
        let lower = path.to_lowercase();
        Self::PATH_MARKERS
            .iter()
            .find(|(marker, _)| lower.contains(marker))
            .map(|(_, backend)| *backend)
    }

    pub(crate) fn from_vendor(vendor: GpuVendor) -> Self {
        match vendor {
            GpuVendor::Nvidia => Self::Cuda,
            GpuVendor::Amd => Self::Rocm,
            GpuVendor::Apple => Self::Metal,
        }
    }

    pub fn is_gpu(&self) -> bool {
        !matches!(self, Self::Cpu)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cuda => "cuda",
            Self::Vulkan => "vulkan",
            Self::Metal => "metal",
            Self::Rocm => "rocm",
            Self::Cpu => "cpu",
        }
    }
}

impl std::str::FromStr for ComputeBackend {
    type Err = ParseBackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cuda" => Ok(Self::Cuda),
            "vulkan" => Ok(Self::Vulkan),
            "metal" => Ok(Self::Metal),
            "rocm" | "hip" => Ok(Self::Rocm),
            "cpu" => Ok(Self::Cpu),
            other => Err(ParseBackendError(other.to_string())),
        }
    }
}

impl std::fmt::Display for ComputeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operating system family of the host running the tuner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Linux,
    Windows,
    MacOs,
    Other,
}

impl OsFamily {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => Self::Linux,
            "windows" => Self::Windows,
            "macos" => Self::MacOs,
            _ => Self::Other,
        }
    }

    pub fn default_backend(&self) -> ComputeBackend {
        match self {
            Self::MacOs => ComputeBackend::Metal,
            _ => ComputeBackend::Cpu,
        }
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
            Self::MacOs => "macos",
            Self::Other => "other",
        })
    }
}
