//! Multi-part model files.
//!
//! Large GGUF models are split into parts named like
//! `model-00002-of-00008.gguf`. Sizing a model means summing every part.

use std::path::{Path, PathBuf};

static SHARD_RE: std::sync::OnceLock<Option<regex::Regex>> = std::sync::OnceLock::new();

/// 1-based `(index, total)` parsed from a shard file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardId {
    pub index: u32,
    pub total: u32,
    /// File name with the shard tag and extension removed.
    prefix: String,
    /// Zero-padded width of the numbers, e.g. 5 for `00002`.
    width: usize,
}

impl ShardId {
    /// `None` when the name carries no valid `-NNNNN-of-MMMMM.gguf` tag.
    pub fn from_fname(fname: &str) -> Option<Self> {
        let re = SHARD_RE
            .get_or_init(|| regex::Regex::new(r"^(?P<prefix>.*)-(?P<idx>\d+)-of-(?P<total>\d+)\.gguf$").ok())
            .as_ref()?;
        let caps = re.captures(fname)?;
        let idx = caps.name("idx")?.as_str();
        let index = idx.parse::<u32>().ok()?;
        let total = caps.name("total")?.as_str().parse::<u32>().ok()?;
        if index == 0 || total == 0 || index > total {
            return None;
        }
        Some(Self {
            index,
            total,
            prefix: caps.name("prefix")?.as_str().to_string(),
            width: idx.len(),
        })
    }

    pub fn part_name(&self, index: u32) -> String {
        format!(
            "{}-{:0width$}-of-{:0width$}.gguf",
            self.prefix,
            index,
            self.total,
            width = self.width
        )
    }
}

/// Size on disk in bytes, summing all parts of a multi-part model.
///
/// Missing parts are skipped with a warning. Zero when nothing is readable.
pub fn total_model_bytes<P: AsRef<Path>>(path: P) -> u64 {
    let path = path.as_ref();
    let shard = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(ShardId::from_fname);
    let Some(shard) = shard else {
        return file_len(path).unwrap_or(0);
    };
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    (1..=shard.total)
        .map(|i| {
            let part: PathBuf = dir.join(shard.part_name(i));
            file_len(&part).unwrap_or_else(|| {
                crate::warn!("Missing model part {}", part.display());
                0
            })
        })
        .sum()
}

fn file_len(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_shard_names() {
        let shard = ShardId::from_fname("Qwen3-235B-A22B-Q4_K_M-00002-of-00003.gguf").unwrap();
        assert_eq!((shard.index, shard.total), (2, 3));
        assert_eq!(
            shard.part_name(1),
            "Qwen3-235B-A22B-Q4_K_M-00001-of-00003.gguf"
        );
        assert!(ShardId::from_fname("llama-3.1-8b-Q4_K_M.gguf").is_none());
        assert!(ShardId::from_fname("model-00004-of-00003.gguf").is_none());
        assert!(ShardId::from_fname("model-00000-of-00003.gguf").is_none());
    }

    #[test]
    fn sums_all_parts() {
        let dir = tempfile::tempdir().unwrap();
        for (i, len) in [(1, 100usize), (2, 250), (3, 50)] {
            let name = format!("big-model-{i:05}-of-00003.gguf");
            std::fs::write(dir.path().join(name), vec![0u8; len]).unwrap();
        }
        let first = dir.path().join("big-model-00001-of-00003.gguf");
        assert_eq!(total_model_bytes(&first), 400);

        let single = dir.path().join("single.gguf");
        std::fs::write(&single, vec![0u8; 42]).unwrap();
        assert_eq!(total_model_bytes(&single), 42);
        assert_eq!(total_model_bytes(dir.path().join("absent.gguf")), 0);
    }
}
