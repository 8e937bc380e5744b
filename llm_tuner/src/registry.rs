//! The llama-swap registry file: model name to launch command, plus groups.
//!
//! Keys this crate does not know about are kept and written back unchanged.

use crate::{
    command::split_command,
    error::{TunerError, TunerResult},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default)]
    pub models: BTreeMap<String, ModelEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, Group>,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent: Option<bool>,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_yaml::Mapping,
}

impl Registry {
    pub fn load<P: AsRef<Path>>(path: P) -> TunerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| TunerError::file_system("read registry", path, e))?;
        let registry = Self::from_yaml(&text, path)?;
        crate::debug!(
            "Loaded {} models and {} groups from {}",
            registry.models.len(),
            registry.groups.len(),
            path.display()
        );
        Ok(registry)
    }

    /// `path` is only used in the error.
    pub fn from_yaml(text: &str, path: &Path) -> TunerResult<Self> {
        serde_yaml::from_str(text).map_err(|source| TunerError::RegistryParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_yaml(&self) -> TunerResult<String> {
        serde_yaml::to_string(self).map_err(TunerError::RegistrySerialize)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> TunerResult<()> {
        let path = path.as_ref();
        let text = self.to_yaml()?;
        std::fs::write(path, text).map_err(|e| TunerError::file_system("write registry", path, e))?;
        crate::info!("Wrote {}", path.display());
        Ok(())
    }

    pub fn entry(&self, name: &str) -> TunerResult<&ModelEntry> {
        self.models
            .get(name)
            .ok_or_else(|| TunerError::ModelNotFound(name.to_string()))
    }

    /// Executable of the first command that runs llama-server.
    pub fn server_path(&self) -> Option<String> {
        self.models
            .values()
            .find(|entry| entry.cmd.contains("llama-server"))
            .and_then(|entry| split_command(&entry.cmd).into_iter().next())
    }
}

/// Copies `config` to `<config>.backup_YYYYMMDD_HHMMSS` next to it.
pub fn backup<P: AsRef<Path>>(config: P) -> TunerResult<PathBuf> {
    let config = config.as_ref();
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let mut name = config.as_os_str().to_owned();
    name.push(format!(".backup_{stamp}"));
    let target = PathBuf::from(name);
    std::fs::copy(config, &target).map_err(|e| TunerError::file_system("backup registry", config, e))?;
    crate::info!("Backed up {} to {}", config.display(), target.display());
    Ok(target)
}
