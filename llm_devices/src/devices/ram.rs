/// Total physical memory in MiB.
///
/// sysinfo first, then the platform's own memory report. Zero when every
/// source fails.
pub(crate) fn total_memory_mb() -> u64 {
    let mut sys = sysinfo::System::new_all();
    sys.refresh_all();
    let total_mb = sys.total_memory() / (1024 * 1024);
    if total_mb > 0 {
        return total_mb;
    }
    crate::debug!("sysinfo reported no memory, trying platform fallback");
    platform_memory_mb().unwrap_or_else(|| {
        crate::warn!("Could not determine system RAM, assuming 0 MB");
        0
    })
}

#[cfg(target_os = "linux")]
fn platform_memory_mb() -> Option<u64> {
    super::command::proc_meminfo_mb()
}

#[cfg(target_os = "windows")]
fn platform_memory_mb() -> Option<u64> {
    super::command::wmic_memory_mb()
}

#[cfg(target_os = "macos")]
fn platform_memory_mb() -> Option<u64> {
    super::command::sysctl_memsize_mb()
}

#[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
fn platform_memory_mb() -> Option<u64> {
    None
}
