// src/pipeline/context.rs

//! Run-scoped state threaded through every stage.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::models::{
    AttachmentManifest, IdMapping, Level, PacingConfig, Phase, ProgressEvent, RunSummary, Topology,
};
use crate::pipeline::progress::{LogSink, ProgressSink};

/// Cooperative cancellation flag, checked between items.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything one migration run reads and writes.
///
/// Nothing here is shared between runs; two contexts never alias.
pub struct RunContext {
    pub export_id: String,
    pub export_dir: PathBuf,
    pub topology: Topology,
    pub ids: IdMapping,
    pub manifest: AttachmentManifest,
    pub summary: RunSummary,
    pub pacing: PacingConfig,
    pub cancel: CancelToken,
    progress: Arc<dyn ProgressSink>,
}

impl RunContext {
    pub fn new(export_id: impl Into<String>, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_id: export_id.into(),
            export_dir: export_dir.into(),
            topology: Topology::default(),
            ids: IdMapping::default(),
            manifest: AttachmentManifest::default(),
            summary: RunSummary::default(),
            pacing: PacingConfig::default(),
            cancel: CancelToken::new(),
            progress: Arc::new(LogSink),
        }
    }

    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Emit an event carrying the current counters.
    pub fn report(&self, phase: Phase, message: impl Into<String>) {
        self.progress
            .emit(ProgressEvent::new(phase, message, self.summary.counters()));
    }

    /// Emit an event with position and level.
    pub fn report_at(
        &self,
        phase: Phase,
        message: impl Into<String>,
        current: usize,
        total: usize,
        level: Level,
    ) {
        self.progress.emit(
            ProgressEvent::new(phase, message, self.summary.counters())
                .at(current, total)
                .level(level),
        );
    }

    pub fn warn(&self, phase: Phase, message: impl Into<String>) {
        self.progress.emit(
            ProgressEvent::new(phase, message, self.summary.counters()).level(Level::Warning),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::progress::CollectingSink;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let ctx = RunContext::new("IT", "/tmp/IT").with_cancel(token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_report_carries_counters() {
        let sink = Arc::new(CollectingSink::new());
        let mut ctx = RunContext::new("IT", "/tmp/IT").with_progress(sink.clone());
        ctx.summary.books.created = 2;

        ctx.report_at(Phase::Books, "Created book", 2, 4, Level::Success);

        let events = sink.events();
        assert_eq!(events[0].counters.books, 2);
        assert_eq!(events[0].level, Level::Success);
        assert_eq!(events[0].percent(), Some(50));
    }
}
