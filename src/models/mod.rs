// src/models/mod.rs

//! Domain models for the migrator.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod attachment;
mod config;
mod document;
mod mapping;
mod summary;
mod topology;

// Re-export all public types
pub use attachment::{AttachmentManifest, AttachmentRecord, AttachmentRef, RemoteId};
pub use config::{
    ApiConfig, Config, ExportConfig, PacingConfig, RetryConfig, StorageConfig, UploadConfig,
};
pub use document::{Breadcrumb, ExportDocument};
pub use mapping::{IdMapping, IdTable};
pub use summary::{Counters, EntityTally, Level, Phase, ProgressEvent, RunSummary};
pub use topology::{ChapterEntry, ClassifiedNode, EntityKind, ParentRefs, Topology};

/// Which export format a directory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// One HTML document per page plus `attachments/`
    Html,
    /// A single `entities.xml` dump plus `attachments/`
    Xml,
}

impl ExportFormat {
    /// Detect the format of an export directory.
    pub fn detect(dir: &std::path::Path) -> Option<Self> {
        if dir.join("entities.xml").is_file() {
            Some(Self::Xml)
        } else if dir.is_dir() {
            Some(Self::Html)
        } else {
            None
        }
    }
}
