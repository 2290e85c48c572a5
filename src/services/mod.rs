// src/services/mod.rs

//! Export analysis services.
//!
//! Everything here is synchronous and works on local files only; remote
//! calls live in [`crate::pipeline`].

pub mod attachment_links;
pub mod classifier;
pub mod reconciler;
pub mod rewriter;
pub mod xml;

pub use attachment_links::{AttachmentLinkFixer, AttachmentLookup, LinkFix, UnmatchedLink};
pub use classifier::{TopologyClassifier, classify_documents};
pub use reconciler::{ReconcileReport, backfill_page_ids, map_xml_attachments, reconcile};
pub use rewriter::{LinkRewriter, PendingLink, RewriteOutcome, TitleIndex};
pub use xml::{
    EntityExtractor, PatternExtractor, StorageConverter, XmlAttachment, XmlBookPlan, XmlDump,
    XmlHierarchy, XmlPage,
};
