use super::gpu::{GpuInfo, GpuVendor};
use nvml_wrapper::Nvml;

/// Queries NVML for the CUDA device with the most VRAM.
///
/// Unlike `nvidia-smi`, NVML also reports the real compute capability, so the
/// resulting [`GpuInfo`] does not need the name-based score table.
pub(crate) fn nvml_gpu() -> crate::Result<GpuInfo> {
    let nvml = init_nvml_wrapper()?;
    let device_count = nvml.device_count()?;
    let mut best: Option<GpuInfo> = None;
    for ordinal in 0..device_count {
        let device = match nvml.device_by_index(ordinal) {
            Ok(device) => device,
            Err(e) => {
                crate::debug!("Failed to get CUDA device {ordinal}: {e}");
                continue;
            }
        };
        let total_bytes = match device.memory_info() {
            Ok(info) if info.total != 0 => info.total,
            _ => {
                crate::debug!("CUDA device {ordinal} reported no VRAM. Skipping device.");
                continue;
            }
        };
        let name = device
            .name()
            .unwrap_or_else(|_| format!("CUDA device {ordinal}"));
        let mut gpu = GpuInfo::new(name, total_bytes / (1024 * 1024), GpuVendor::Nvidia);
        if let Ok(cc) = device.cuda_compute_capability() {
            gpu = gpu.with_compute_capability(cc.major as f64 + cc.minor as f64 / 10.0);
        }
        if best.as_ref().map_or(true, |b| gpu.vram_mb > b.vram_mb) {
            best = Some(gpu);
        }
    }
    match best {
        Some(gpu) => Ok(gpu),
        None => crate::bail!("No CUDA devices found"),
    }
}

/// Initializes NVIDIA Management Library (NVML).
///
/// Attempts to load the NVML library from common paths on Linux, WSL, and Windows.
pub fn init_nvml_wrapper() -> crate::Result<Nvml> {
    let library_names = [
        "libnvidia-ml.so",   // Linux
        "libnvidia-ml.so.1", // WSL
        "nvml.dll",          // Windows
    ];
    for library_name in library_names {
        if let Ok(nvml) = Nvml::builder().lib_path(library_name.as_ref()).init() {
            return Ok(nvml);
        }
    }
    crate::bail!("Failed to initialize nvml_wrapper::Nvml")
}
