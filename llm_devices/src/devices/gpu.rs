#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Apple,
}

/// A single detected GPU, as reported by whichever probe found it first.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuInfo {
    pub name: String,
    pub vram_mb: u64,
    pub vendor: GpuVendor,

    /// Real compute capability (`major.minor`) when the driver reports it.
    /// Probes that only see a marketing name leave this empty and the
    /// name table in [`compute_score`] is used instead.
    pub compute_capability: Option<f64>,
}

impl GpuInfo {
    pub fn new<S: Into<String>>(name: S, vram_mb: u64, vendor: GpuVendor) -> Self {
        Self {
            name: name.into(),
            vram_mb,
            vendor,
            compute_capability: None,
        }
    }

    pub fn with_compute_capability(mut self, capability: f64) -> Self {
        self.compute_capability = Some(capability);
        self
    }

    pub fn score(&self) -> f64 {
        self.compute_capability
            .unwrap_or_else(|| compute_score(&self.name))
    }
}

/// Score assigned to any GPU whose name matches nothing in [`COMPUTE_SCORES`].
pub const DEFAULT_COMPUTE_SCORE: f64 = 7.5;

/// Lowercased GPU-name substrings and the CUDA compute capability of that family.
static COMPUTE_SCORES: &[(&str, f64)] = &[
    ("h100", 9.0),
    ("4090", 8.9),
    ("4080", 8.9),
    ("4070", 8.9),
    ("3090", 8.6),
    ("3080", 8.6),
    ("3070", 8.6),
    ("a6000", 8.6),
    ("a100", 8.0),
];

/// Heuristic compute-capability score from a GPU marketing name.
pub fn compute_score(gpu_name: &str) -> f64 {
    let lower = gpu_name.to_lowercase();
    COMPUTE_SCORES
        .iter()
        .find(|(marker, _)| lower.contains(marker))
        .map_or(DEFAULT_COMPUTE_SCORE, |(_, score)| *score)
}

impl std::fmt::Display for GpuInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:?}, {:.2} GB, score {:.1})",
            self.name,
            self.vendor,
            self.vram_mb as f64 / 1024.0,
            self.score()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_table_matches_known_families() {
        assert_eq!(compute_score("NVIDIA GeForce RTX 4090"), 8.9);
        assert_eq!(compute_score("NVIDIA GeForce RTX 3080 Ti"), 8.6);
        assert_eq!(compute_score("NVIDIA A100-SXM4-80GB"), 8.0);
        assert_eq!(compute_score("NVIDIA RTX A6000"), 8.6);
        assert_eq!(compute_score("NVIDIA H100 PCIe"), 9.0);
        assert_eq!(compute_score("NVIDIA GeForce GTX 1080"), DEFAULT_COMPUTE_SCORE);
        assert_eq!(compute_score(""), DEFAULT_COMPUTE_SCORE);
    }

    #[test]
    fn reported_capability_wins_over_name() {
        let gpu = GpuInfo::new("NVIDIA GeForce RTX 4090", 24_564, GpuVendor::Nvidia)
            .with_compute_capability(8.9);
        assert_eq!(gpu.score(), 8.9);
        let gpu = GpuInfo::new("NVIDIA GeForce RTX 4090", 24_564, GpuVendor::Nvidia)
            .with_compute_capability(7.0);
        assert_eq!(gpu.score(), 7.0);
    }
}
