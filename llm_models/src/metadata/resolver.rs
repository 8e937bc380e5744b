use super::{
    default_context_length, default_embedding_size, default_layer_count, parse_param_count,
    FilenameHints, MetadataSource, ModelMetadata,
};
use crate::{read_gguf_metadata, total_model_bytes, GgufMetadata};
use std::path::Path;

/// Builds a complete [`ModelMetadata`] for a model file.
///
/// The GGUF header is read first. If that fails for any reason the header is
/// ignored entirely and the file name is the only source. Either way, counts
/// still missing afterwards are filled from lookup tables, so the result never
/// has a zero layer count, context length or embedding size.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelMetadataResolver;

impl ModelMetadataResolver {
    pub fn new() -> Self {
        Self
    }

    /// `name` is the registry name; the file stem is used when it is empty.
    pub fn resolve<P: AsRef<Path>>(&self, name: &str, path: P) -> ModelMetadata {
        let path = path.as_ref();
        let path_str = path.to_string_lossy();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path_str.to_string());
        let hints = FilenameHints::from_path(&path_str);

        let mut meta = ModelMetadata {
            name: if name.is_empty() {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            } else {
                name.to_string()
            },
            path: path_str.to_string(),
            file_size_bytes: total_model_bytes(path),
            ..Default::default()
        };

        match read_gguf_metadata(path) {
            Ok(gguf) => {
                crate::debug!(
                    "Read GGUF v{} header of {}: {} tensors, {} keys",
                    gguf.version,
                    file_name,
                    gguf.tensor_count,
                    gguf.kv_count
                );
                apply_gguf(&mut meta, gguf);
                meta.source = MetadataSource::Gguf;
            }
            Err(e) => {
                crate::warn!("{e}; falling back to file-name heuristics for {file_name}");
                meta.source = MetadataSource::Heuristic;
            }
        }

        apply_hints(&mut meta, hints);
        fill_defaults(&mut meta, &file_name);
        meta
    }
}

fn apply_gguf(meta: &mut ModelMetadata, gguf: GgufMetadata) {
    meta.architecture = gguf.architecture.unwrap_or_default();
    meta.parameter_count = gguf
        .size_label
        .as_deref()
        .and_then(parse_param_count)
        .unwrap_or(0);
    meta.layer_count = gguf.block_count.unwrap_or(0);
    meta.context_length = gguf.context_length.unwrap_or(0);
    meta.embedding_size = gguf.embedding_length.unwrap_or(0);
    meta.head_count_kv = gguf.head_count_kv.unwrap_or(0);
    meta.key_length = gguf.key_length.unwrap_or(0);
    meta.value_length = gguf.value_length.unwrap_or(0);
    meta.sliding_window = gguf.sliding_window.unwrap_or(0);
    meta.expert_count = gguf.expert_count.unwrap_or(0);
    meta.active_expert_count = gguf.expert_used_count.unwrap_or(0);
    meta.is_moe = meta.architecture.to_lowercase().contains("moe") || meta.expert_count > 0;
}

/// File-name hints only ever fill gaps; header values take precedence.
fn apply_hints(meta: &mut ModelMetadata, hints: FilenameHints) {
    if meta.parameter_count == 0 {
        meta.parameter_count = hints.parameter_count;
    }
    if let Some(label) = hints.quant_label {
        meta.quant_label = label;
    }
    if hints.is_moe {
        meta.is_moe = true;
    }
    if meta.is_moe {
        if meta.expert_count == 0 {
            meta.expert_count = if hints.expert_count > 0 {
                hints.expert_count
            } else {
                super::ASSUMED_EXPERTS
            };
        }
        if meta.active_expert_count == 0 {
            meta.active_expert_count = super::ASSUMED_ACTIVE_EXPERTS;
        }
    }
}

fn fill_defaults(meta: &mut ModelMetadata, file_name: &str) {
    if meta.layer_count == 0 {
        meta.layer_count = default_layer_count(file_name, meta.parameter_count);
        crate::debug!("Estimated {} layers for {file_name}", meta.layer_count);
    }
    if meta.context_length == 0 {
        meta.context_length = default_context_length(file_name);
        crate::debug!(
            "Estimated context length {} for {file_name}",
            meta.context_length
        );
    }
    if meta.embedding_size == 0 {
        meta.embedding_size = default_embedding_size(meta.parameter_count);
    }
}
