use std::{
    fmt::{self, Display},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;

pub mod stream;

pub const DEFAULT_MEMORY_MB: u32 = 2048;
pub const DEFAULT_VERSION: &str = "latest";
pub const JAR_NAME: &str = "server.jar";
pub const LOG_NAME: &str = "mcs.log";
pub const PROPERTIES_NAME: &str = "server.properties";
pub const EULA_NAME: &str = "eula.txt";

/// Server distribution an instance runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MinecraftType {
    #[default]
    Vanilla,
    Paper,
    Fabric,
    /// Downloaded from the configuration's explicit jar URL.
    Custom,
}

impl Display for MinecraftType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MinecraftType::Vanilla => write!(f, "vanilla"),
            MinecraftType::Paper => write!(f, "paper"),
            MinecraftType::Fabric => write!(f, "fabric"),
            MinecraftType::Custom => write!(f, "custom"),
        }
    }
}

/// Identity and launch parameters of one managed server.
///
/// Fields left empty or zero are filled in by the manager when the server is
/// created; after that the configuration does not change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mc_type: MinecraftType,
    pub version: String,
    pub port: u16,
    pub memory_mb: u32,
    pub path: PathBuf,
    pub eula: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jar_url: Option<String>,
}

impl ServerConfig {
    pub fn new(mc_type: MinecraftType, version: impl Into<String>) -> Self {
        Self {
            mc_type,
            version: version.into(),
            ..Self::default()
        }
    }

    pub fn jar_path(&self) -> PathBuf {
        self.path.join(JAR_NAME)
    }

    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_NAME)
    }

    pub fn properties_path(&self) -> PathBuf {
        self.path.join(PROPERTIES_NAME)
    }

    /// The override download URL, ignoring an empty string.
    pub fn explicit_jar_url(&self) -> Option<&str> {
        self.jar_url.as_deref().filter(|url| !url.trim().is_empty())
    }
}

/// Process-wide tunables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding one subdirectory per server plus `servers.json`.
    pub root: PathBuf,
    /// Java executable used to launch servers.
    pub java: PathBuf,
    /// How long a restart waits for the old process to exit.
    pub restart_timeout_secs: u64,
    /// Connect/read timeout of the status probe used by `info`.
    pub status_timeout_ms: u64,
    /// Host the status probe connects to.
    pub status_host: String,
}

impl Default for Settings {
    fn default() -> Self {
        let java = if cfg!(windows) { "java.exe" } else { "java" };
        Self {
            root: default_root(),
            java: PathBuf::from(java),
            restart_timeout_secs: 30,
            status_timeout_ms: 2000,
            status_host: "localhost".to_string(),
        }
    }
}

impl Settings {
    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn restart_timeout(&self) -> Duration {
        Duration::from_secs(self.restart_timeout_secs)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let data = std::fs::read(path).map_err(|e| StoreError::Io(e.to_string()))?;
        serde_json::from_slice(&data).map_err(|e| StoreError::Json(e.to_string()))
    }

    /// Reads the file named by `MCS_CONFIG`, falling back to defaults.
    pub fn from_env() -> Self {
        let Some(path) = std::env::var_os("MCS_CONFIG") else {
            return Self::default();
        };
        let path = PathBuf::from(path);
        match Self::load(&path) {
            Ok(settings) => settings,
            Err(err) => {
                warn!(path = %path.display(), %err, "ignoring unreadable settings file");
                Self::default()
            }
        }
    }
}

fn default_root() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mcs-servers")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_uses_wire_field_names() {
        let json = r#"{"type":"paper","version":"","memoryMb":0,"port":0,"jarUrl":""}"#;
        let cfg: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.mc_type, MinecraftType::Paper);
        assert_eq!(cfg.memory_mb, 0);
        assert_eq!(cfg.explicit_jar_url(), None);

        let out = serde_json::to_value(&cfg).unwrap();
        assert_eq!(out["type"], "paper");
        assert!(out.get("memoryMb").is_some());
    }

    #[test]
    fn missing_type_defaults_to_vanilla() {
        let cfg: ServerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.mc_type, MinecraftType::Vanilla);
    }

    #[test]
    fn settings_fill_missing_fields() {
        let settings: Settings = serde_json::from_str(r#"{"restart_timeout_secs":5}"#).unwrap();
        assert_eq!(settings.restart_timeout(), Duration::from_secs(5));
        assert_eq!(settings.status_timeout(), Duration::from_millis(2000));
        assert_eq!(settings.status_host, "localhost");
    }
}
