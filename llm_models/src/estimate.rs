//! KV-cache footprint per context size, computed from the attention shape of
//! the model rather than from its hidden size.

use crate::ModelMetadata;

pub const DEFAULT_RUNTIME_OVERHEAD_GIB: f64 = 2.0;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
static CONTEXT_SIZES: &[u64] = &[4096, 8192, 16384, 32768, 65536, 131072];
const FALLBACK_HEAD_DIM: u64 = 128;
/// Llama 4 Scout interleaves chunked-attention layers without reporting a window.
const SCOUT_LAYERS: (u64, u64, u64) = (36, 12, 8192);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FootprintRow {
    pub context_size: u64,
    pub kv_cache_bytes: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FootprintEstimate {
    pub name: String,
    pub trained_context: u64,
    pub model_bytes: u64,
    pub overhead_gib: f64,
    pub rows: Vec<FootprintRow>,
}

impl FootprintEstimate {
    pub fn new(meta: &ModelMetadata, overhead_gib: f64) -> Self {
        let model_bytes = if meta.file_size_bytes > 0 {
            meta.file_size_bytes
        } else {
            (meta.estimated_size_gb() * GIB) as u64
        };
        let overhead_bytes = (overhead_gib * GIB) as u64;
        let per_token_layer = bytes_per_token_per_layer(meta);

        let (swa_layers, full_layers, window) = attention_layout(meta);
        let rows = context_sizes(meta.context_length)
            .into_iter()
            .map(|ctx| {
                // Header values are untrusted; absurd ones pin the row at u64::MAX.
                let full = ctx
                    .saturating_mul(full_layers)
                    .saturating_mul(per_token_layer);
                let swa = ctx
                    .min(window)
                    .saturating_mul(swa_layers)
                    .saturating_mul(per_token_layer);
                let kv = full.saturating_add(swa);
                FootprintRow {
                    context_size: ctx,
                    kv_cache_bytes: kv,
                    total_bytes: model_bytes.saturating_add(kv).saturating_add(overhead_bytes),
                }
            })
            .collect();

        Self {
            name: meta.name.clone(),
            trained_context: meta.context_length,
            model_bytes,
            overhead_gib,
            rows,
        }
    }
}

/// K and V at f16 for every KV head.
pub fn bytes_per_token_per_layer(meta: &ModelMetadata) -> u64 {
    let heads = meta.head_count_kv.max(1);
    let (k, v) = if meta.key_length == 0 || meta.value_length == 0 || meta.head_count_kv == 0 {
        crate::debug!("Missing attention head dims for {}, using fallback", meta.name);
        let dim = if meta.embedding_size > 0 {
            meta.embedding_size / heads
        } else {
            FALLBACK_HEAD_DIM
        };
        (dim, dim)
    } else {
        (meta.key_length, meta.value_length)
    };
    heads.saturating_mul(k.saturating_add(v)).saturating_mul(2)
}

/// `(windowed layers, full layers, window)`.
fn attention_layout(meta: &ModelMetadata) -> (u64, u64, u64) {
    if meta.sliding_window > 0 {
        (meta.layer_count, 0, meta.sliding_window)
    } else if meta.name.to_lowercase().contains("scout") {
        SCOUT_LAYERS
    } else {
        (0, meta.layer_count, 0)
    }
}

fn context_sizes(trained: u64) -> Vec<u64> {
    if trained == 0 {
        return CONTEXT_SIZES.to_vec();
    }
    let mut sizes: Vec<u64> = CONTEXT_SIZES.iter().copied().filter(|&c| c <= trained).collect();
    if !sizes.contains(&trained) {
        sizes.push(trained);
    }
    sizes
}

pub fn format_mem(bytes: u64) -> String {
    let mib = bytes as f64 / (1024.0 * 1024.0);
    if mib < 1024.0 {
        format!("{mib:.2} MiB")
    } else {
        format!("{:.2} GiB", mib / 1024.0)
    }
}

impl std::fmt::Display for FootprintEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "--- Model '{}' ---", self.name)?;
        if self.trained_context > 0 {
            writeln!(f, "Max Context: {} tokens", self.trained_context)?;
        }
        writeln!(f, "Model Size: {}", format_mem(self.model_bytes))?;
        writeln!(f, "Incl. Overhead: {:.2} GiB", self.overhead_gib)?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>15} | {:>15} | {:>15}",
            "Context Size", "Context Memory", "Est. Total VRAM"
        )?;
        writeln!(f, "{}", "-".repeat(51))?;
        for row in &self.rows {
            writeln!(
                f,
                "{:>15} | {:>15} | {:>15}",
                row.context_size,
                format_mem(row.kv_cache_bytes),
                format_mem(row.total_bytes)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn llama_8b() -> ModelMetadata {
        ModelMetadata {
            name: "llama-3.1-8b".to_string(),
            layer_count: 32,
            embedding_size: 4096,
            context_length: 131_072,
            head_count_kv: 8,
            key_length: 128,
            value_length: 128,
            file_size_bytes: 4 * 1024 * 1024 * 1024,
            ..Default::default()
        }
    }

    #[test]
    fn full_attention_rows() {
        let est = FootprintEstimate::new(&llama_8b(), DEFAULT_RUNTIME_OVERHEAD_GIB);
        assert_eq!(est.rows.len(), 6);
        // 8 heads * 256 dims * 2 bytes * 32 layers = 128 KiB per token.
        let first = est.rows[0];
        assert_eq!(first.context_size, 4096);
        assert_eq!(first.kv_cache_bytes, 4096 * 32 * 4096);
        assert_eq!(
            first.total_bytes,
            4 * 1024 * 1024 * 1024 + first.kv_cache_bytes + 2 * 1024 * 1024 * 1024
        );
        assert_eq!(format_mem(first.kv_cache_bytes), "512.00 MiB");
    }

    #[test]
    fn trained_context_is_added() {
        let mut meta = llama_8b();
        meta.context_length = 40_960;
        let sizes: Vec<u64> = FootprintEstimate::new(&meta, 0.0)
            .rows
            .iter()
            .map(|r| r.context_size)
            .collect();
        assert_eq!(sizes, vec![4096, 8192, 16384, 32768, 40960]);
    }

    #[test]
    fn sliding_window_caps_growth() {
        let mut meta = llama_8b();
        meta.sliding_window = 4096;
        let est = FootprintEstimate::new(&meta, 0.0);
        let kv: Vec<u64> = est.rows.iter().map(|r| r.kv_cache_bytes).collect();
        assert!(kv.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn missing_head_dims_fall_back() {
        let meta = ModelMetadata {
            embedding_size: 4096,
            head_count_kv: 0,
            ..Default::default()
        };
        assert_eq!(bytes_per_token_per_layer(&meta), 4096 * 2 * 2);
        assert_eq!(
            bytes_per_token_per_layer(&ModelMetadata::default()),
            FALLBACK_HEAD_DIM * 2 * 2
        );
    }

    #[test]
    fn absurd_head_dims_saturate() {
        let max = u32::MAX as u64;
        let meta = ModelMetadata {
            head_count_kv: max,
            key_length: max,
            value_length: max,
            ..llama_8b()
        };
        assert_eq!(bytes_per_token_per_layer(&meta), u64::MAX);
        let est = FootprintEstimate::new(&meta, DEFAULT_RUNTIME_OVERHEAD_GIB);
        assert_eq!(est.rows.len(), 6);
        for row in &est.rows {
            assert_eq!(row.kv_cache_bytes, u64::MAX);
            assert_eq!(row.total_bytes, u64::MAX);
        }
        // Still renders.
        assert!(est.to_string().contains("131072"));
    }

    #[test]
    fn absurd_context_and_layers_saturate() {
        let meta = ModelMetadata {
            layer_count: u64::MAX,
            context_length: u64::MAX,
            sliding_window: 0,
            ..llama_8b()
        };
        let est = FootprintEstimate::new(&meta, 0.0);
        assert_eq!(est.rows.last().map(|r| r.context_size), Some(u64::MAX));
        assert!(est.rows.iter().all(|r| r.kv_cache_bytes == u64::MAX));
    }
}
