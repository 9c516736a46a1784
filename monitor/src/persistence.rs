//! Endpoint list persistence.
//!
//! The on-disk format is a pretty-printed JSON array of
//! `{ "ip": ..., "port": ..., "name": ... }` objects.

use async_trait::async_trait;
use log::debug;
use shared::Endpoint;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("endpoint file I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("endpoint file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where the endpoint list lives between runs.
#[async_trait]
pub trait EndpointStore: Send + Sync {
    /// Persisted endpoints, empty when nothing was saved yet.
    async fn load(&self) -> Result<Vec<Endpoint>, PersistenceError>;
    async fn save(&self, endpoints: &[Endpoint]) -> Result<(), PersistenceError>;
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EndpointStore for JsonFileStore {
    async fn load(&self) -> Result<Vec<Endpoint>, PersistenceError> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} does not exist yet", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&data)?)
    }

    async fn save(&self, endpoints: &[Endpoint]) -> Result<(), PersistenceError> {
        let data = serde_json::to_string_pretty(endpoints)?;
        tokio::fs::write(&self.path, data).await?;
        debug!("Saved {} endpoints to {}", endpoints.len(), self.path.display());
        Ok(())
    }
}

/// Endpoints tracked on first start, when nothing was persisted.
pub fn default_seed_endpoints() -> Vec<Endpoint> {
    vec![
        Endpoint::new("google.com", 80, "Google Web Server"),
        Endpoint::new("mc.hypixel.net", 25565, "Hypixel Minecraft"),
        Endpoint::new("95.165.168.5", 27015, "Garry's Mod Server"),
    ]
}
