//! Local filesystem manifest store.
//!
//! Every export shares one JSON document keyed by export id. Writes go to
//! a temp file next to it and are renamed into place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::AttachmentManifest;
use crate::storage::ManifestStore;

type ManifestFile = BTreeMap<String, AttachmentManifest>;

/// Manifest store backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    path: PathBuf,
}

impl LocalStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Read the whole document; a missing file is an empty one.
    async fn read_all(&self) -> Result<ManifestFile> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(ManifestFile::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ManifestFile::new()),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

#[async_trait]
impl ManifestStore for LocalStorage {
    async fn load(&self, export_id: &str) -> Result<Option<AttachmentManifest>> {
        let mut all = self.read_all().await?;
        let manifest = all.remove(export_id);
        if manifest.is_none() {
            log::warn!(
                "No attachment manifest for {} in {}",
                export_id,
                self.path.display()
            );
        }
        Ok(manifest)
    }

    async fn save(&self, export_id: &str, manifest: &AttachmentManifest) -> Result<()> {
        let mut all = self.read_all().await?;
        all.insert(export_id.to_string(), manifest.clone());

        let bytes = serde_json::to_vec_pretty(&all)?;
        self.write_bytes(&bytes).await?;
        log::info!(
            "Saved {} attachment records for {} to {}",
            manifest.record_count(),
            export_id,
            self.path.display()
        );
        Ok(())
    }
}
