//! File storage for generated images

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::Result;

/// Saves generated images to disk and hands out their public URLs
pub struct ImageStore {
    storage_path: PathBuf,
    url_prefix: String,
}

impl ImageStore {
    /// Create a new store
    pub fn new(storage_path: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            storage_path: storage_path.into(),
            url_prefix: url_prefix.into(),
        }
    }

    /// Store described by the configuration, or `None` when storage is disabled
    pub fn from_config(config: &StorageConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(&config.base_path, config.url_prefix.clone()))
    }

    /// Directory the images are written to
    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// Ensure the storage directory exists
    pub async fn ensure_storage_dir(&self) -> Result<()> {
        if !self.storage_path.exists() {
            fs::create_dir_all(&self.storage_path).await?;
            debug!(path = ?self.storage_path, "Created storage directory");
        }
        Ok(())
    }

    /// Write PNG bytes under a fresh name and return the URL they are served at
    pub async fn save_png(&self, data: &[u8]) -> Result<String> {
        self.ensure_storage_dir().await?;

        let filename = format!("{}.png", Uuid::new_v4());
        let file_path = self.storage_path.join(&filename);
        fs::write(&file_path, data).await?;

        debug!(path = ?file_path, size = data.len(), "Saved image file");

        Ok(self.generate_url(&filename))
    }

    /// Public URL for a stored filename
    pub fn generate_url(&self, filename: &str) -> String {
        format!("{}/{}", self.url_prefix.trim_end_matches('/'), filename)
    }
}
