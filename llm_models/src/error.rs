use crate::gguf::GgufReadError;

#[derive(Debug, thiserror::Error)]
pub enum LlmModelsError {
    #[error("failed to read GGUF metadata from '{path}'")]
    Gguf {
        path: std::path::PathBuf,
        #[source]
        source: GgufReadError,
    },

    #[error("{operation} failed for '{path}'")]
    FileSystem {
        operation: &'static str,
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type LlmModelsResult<T> = std::result::Result<T, LlmModelsError>;

impl LlmModelsError {
    pub fn file_system(
        operation: &'static str,
        path: impl Into<std::path::PathBuf>,
        err: impl Into<std::io::Error>,
    ) -> Self {
        Self::FileSystem {
            operation,
            path: path.into(),
            source: err.into(),
        }
    }
}
