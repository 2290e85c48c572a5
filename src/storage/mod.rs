//! Persistence for attachment manifests.
//!
//! A manifest is written at the end of an import and read back by the
//! upload and link-fix stages, which never re-parse the export.
//!
//! ```text
//! attachments.json
//! {
//!   "<export id>": {
//!     "<page previous id>": { "attachments": [...], "newPageId": 42 }
//!   }
//! }
//! ```

pub mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::AttachmentManifest;

pub use local::LocalStorage;

/// Backend holding one manifest per export identifier.
#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// Manifest for `export_id`, `None` when never saved.
    async fn load(&self, export_id: &str) -> Result<Option<AttachmentManifest>>;

    /// Replace the manifest stored for `export_id`. Other keys are kept.
    async fn save(&self, export_id: &str, manifest: &AttachmentManifest) -> Result<()>;
}
