// top-level error for the public API

#[derive(Debug, thiserror::Error)]
pub enum TunerError {
    #[error("model '{0}' not found in registry")]
    ModelNotFound(String),

    #[error("no `-m <path>` in the command for model '{0}'")]
    MissingModelPath(String),

    #[error("failed to parse registry '{path}'")]
    RegistryParse {
        path: std::path::PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to serialize registry")]
    RegistrySerialize(#[source] serde_yaml::Error),

    #[error("invalid tuning {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("failed to load tuning config '{path}'")]
    TuningLoad {
        path: std::path::PathBuf,
        #[source]
        source: confy::ConfyError,
    },

    #[error("{operation} failed for '{path}'")]
    FileSystem {
        operation: &'static str,
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Logging(#[from] anyhow::Error),
}

pub type TunerResult<T> = std::result::Result<T, TunerError>;

impl TunerError {
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
