//! Pipeline entry points for migration runs.
//!
//! - `run_import`: HTML export → remote hierarchy + attachment manifest
//! - `run_xml_import`: `entities.xml` export → remote hierarchy + manifest
//! - `run_upload`: upload the files recorded in a manifest
//! - `run_fix_links`: point attachment links at uploaded attachments
//! - `remove_shelf`: delete a migrated shelf and its books

pub mod cleanup;
pub mod context;
pub mod import;
pub mod links;
pub mod orchestrator;
pub mod progress;
pub mod upload;
pub mod xml_import;

pub use cleanup::{RemovalReport, list_shelves, remove_shelf};
pub use context::{CancelToken, RunContext};
pub use import::{prepare_documents, run_import};
pub use links::{LinkFixReport, fix_links, run_fix_links};
pub use orchestrator::{DocumentSet, GENERAL_PAGE, Orchestrator, PreparedDocument};
pub use progress::{ChannelSink, CollectingSink, LogSink, ProgressSink};
pub use upload::{UploadReport, run_upload};
pub use xml_import::{ENTITIES_FILE, run_xml_import};
