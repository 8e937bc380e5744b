//! Short-lived diagnostic commands (`nvidia-smi`, `rocm-smi`, `sysctl`, `wmic`)
//! and permissive parsers for their text output.
//!
//! The commands are blocking and carry no timeout; a hung vendor tool hangs the run.
//! Every parser returns `None` on anything it does not recognise.

use super::gpu::{GpuInfo, GpuVendor};

const BYTES_PER_MB: u64 = 1024 * 1024;

pub(crate) fn run(program: &str, args: &[&str]) -> crate::Result<String> {
    let output = std::process::Command::new(program)
        .args(args)
        .output()
        .map_err(|e| crate::anyhow!("failed to spawn {program}: {e}"))?;
    if !output.status.success() {
        crate::bail!("{program} exited with {}", output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub(crate) fn nvidia_smi() -> Option<GpuInfo> {
    match run(
        "nvidia-smi",
        &[
            "--query-gpu=name,memory.total",
            "--format=csv,noheader,nounits",
        ],
    ) {
        Ok(out) => parse_nvidia_smi(&out),
        Err(e) => {
            crate::debug!("nvidia-smi probe failed: {e}");
            None
        }
    }
}

pub(crate) fn rocm_smi() -> Option<GpuInfo> {
    let vram = match run("rocm-smi", &["--showmeminfo", "vram", "--csv"]) {
        Ok(out) => parse_rocm_smi_vram_mb(&out)?,
        Err(e) => {
            crate::debug!("rocm-smi probe failed: {e}");
            return None;
        }
    };
    let name = run("rocm-smi", &["--showproductname", "--csv"])
        .ok()
        .and_then(|out| csv_column(&out, "card series"))
        .unwrap_or_else(|| "AMD GPU".to_string());
    Some(GpuInfo::new(name, vram, GpuVendor::Amd))
}

#[cfg(target_os = "macos")]
pub(crate) fn sysctl_memsize_mb() -> Option<u64> {
    run("sysctl", &["-n", "hw.memsize"])
        .ok()
        .and_then(|out| parse_sysctl_memsize_mb(&out))
}

#[cfg(target_os = "windows")]
pub(crate) fn wmic_memory_mb() -> Option<u64> {
    run("wmic", &["computersystem", "get", "TotalPhysicalMemory", "/value"])
        .ok()
        .and_then(|out| parse_wmic_memory_mb(&out))
}

#[cfg(target_os = "linux")]
pub(crate) fn proc_meminfo_mb() -> Option<u64> {
    std::fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|out| parse_meminfo_mb(&out))
}

/// `name, memory.total` in MiB, one GPU per line. Only the first GPU is used.
pub(crate) fn parse_nvidia_smi(out: &str) -> Option<GpuInfo> {
    let line = out.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (name, mb) = line.rsplit_once(',')?;
    let vram_mb = mb.trim().parse::<f64>().ok()? as u64;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(GpuInfo::new(name, vram_mb, GpuVendor::Nvidia))
}

pub(crate) fn parse_rocm_smi_vram_mb(out: &str) -> Option<u64> {
    let bytes = csv_column(out, "total memory")?.parse::<u64>().ok()?;
    Some(bytes / BYTES_PER_MB)
}

/// Value under the first header column containing `needle` (case-insensitive),
/// taken from the first data row after the header.
fn csv_column(out: &str, needle: &str) -> Option<String> {
    let mut lines = out.lines().map(str::trim).filter(|l| l.contains(','));
    let header = lines.find(|l| l.to_lowercase().contains(needle))?;
    let idx = header
        .split(',')
        .position(|col| col.to_lowercase().contains(needle))?;
    let row = lines.next()?;
    row.split(',')
        .nth(idx)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn parse_meminfo_mb(out: &str) -> Option<u64> {
    let line = out.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kb = line.split_whitespace().nth(1)?.parse::<u64>().ok()?;
    Some(kb / 1024)
}

pub(crate) fn parse_wmic_memory_mb(out: &str) -> Option<u64> {
    let value = out
        .lines()
        .find_map(|l| l.trim().strip_prefix("TotalPhysicalMemory="))?;
    let bytes = value.trim().parse::<u64>().ok()?;
    Some(bytes / BYTES_PER_MB)
}

pub(crate) fn parse_sysctl_memsize_mb(out: &str) -> Option<u64> {
    let bytes = out.trim().parse::<u64>().ok()?;
    Some(bytes / BYTES_PER_MB)
}
