use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::{config::ServerConfig, error::StoreError};

pub const STORE_FILE: &str = "servers.json";

/// Persistence of the full configuration set.
#[async_trait]
pub trait Store: Send + Sync {
    async fn load_all(&self) -> Result<Vec<ServerConfig>, StoreError>;
    async fn save_all(&self, configs: &[ServerConfig]) -> Result<(), StoreError>;
}

/// Keeps every configuration in one pretty-printed `servers.json`.
#[derive(Debug, Clone)]
pub struct JsonStore {
    file: PathBuf,
}

impl JsonStore {
    pub fn new(root: &Path) -> Self {
        Self {
            file: root.join(STORE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file
    }
}

#[async_trait]
impl Store for JsonStore {
    async fn load_all(&self) -> Result<Vec<ServerConfig>, StoreError> {
        let data = match fs::read(&self.file).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::Io(err.to_string())),
        };
        serde_json::from_slice(&data).map_err(|e| StoreError::Json(e.to_string()))
    }

    async fn save_all(&self, configs: &[ServerConfig]) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(configs).map_err(|e| StoreError::Json(e.to_string()))?;

        let tmp = self.file.with_extension("json.tmp");
        fs::write(&tmp, &json)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        fs::rename(&tmp, &self.file)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))
    }
}
