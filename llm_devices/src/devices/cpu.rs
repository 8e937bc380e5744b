/// Logical CPU count as seen by the scheduler.
///
/// llama-server's `--threads` is compared against logical cores, so SMT
/// siblings are counted. Falls back to `available_parallelism` when sysinfo
/// reports nothing (some containers), and to 1 after that.
pub(crate) fn logical_core_count() -> usize {
    let mut sys = sysinfo::System::new_all();
    sys.refresh_all();
    match sys.cpus().len() {
        0 => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
        n => n,
    }
}
