//! Run reports and progress events.

use std::fmt::{self, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::EntityKind;

/// Stage of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Analyze,
    Shelves,
    Books,
    Chapters,
    Pages,
    Attachments,
    XmlImport,
    Upload,
    LinkFix,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Analyze => "analyze",
            Phase::Shelves => "shelves",
            Phase::Books => "books",
            Phase::Chapters => "chapters",
            Phase::Pages => "pages",
            Phase::Attachments => "attachments",
            Phase::XmlImport => "xml-import",
            Phase::Upload => "upload",
            Phase::LinkFix => "link-fix",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity carried by a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

/// Running totals shown alongside progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub shelves: usize,
    pub books: usize,
    pub chapters: usize,
    pub pages: usize,
}

/// Structured progress notification for any UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    pub counters: Counters,
    pub level: Level,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(phase: Phase, message: impl Into<String>, counters: Counters) -> Self {
        Self {
            phase,
            message: message.into(),
            current: None,
            total: None,
            counters,
            level: Level::Info,
            timestamp: Utc::now(),
        }
    }

    pub fn at(mut self, current: usize, total: usize) -> Self {
        self.current = Some(current);
        self.total = Some(total);
        self
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Completion percentage when position is known.
    pub fn percent(&self) -> Option<u8> {
        match (self.current, self.total) {
            (Some(current), Some(total)) if total > 0 => {
                Some(((current.min(total) * 100) / total) as u8)
            }
            _ => None,
        }
    }
}

/// Outcome counts for one entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTally {
    pub created: usize,
    /// Original filenames or titles of items that failed
    pub not_created: Vec<String>,
    /// Items never attempted because the run was cancelled
    pub skipped: usize,
}

/// Per-run creation summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub shelves: EntityTally,
    pub books: EntityTally,
    pub chapters: EntityTally,
    pub pages: EntityTally,
    /// `_General` pages holding shelf, book and chapter bodies
    pub general_pages: EntityTally,
    /// `file -> href` of links whose target type could not be resolved
    pub unresolved_links: Vec<(String, String)>,
    pub attachment_records: usize,
    pub attachment_files: usize,
    /// Created books never added to their shelf
    pub unshelved_books: usize,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn tally(&self, kind: EntityKind) -> &EntityTally {
        match kind {
            EntityKind::Shelf => &self.shelves,
            EntityKind::Book => &self.books,
            EntityKind::Chapter => &self.chapters,
            EntityKind::Page => &self.pages,
        }
    }

    pub fn tally_mut(&mut self, kind: EntityKind) -> &mut EntityTally {
        match kind {
            EntityKind::Shelf => &mut self.shelves,
            EntityKind::Book => &mut self.books,
            EntityKind::Chapter => &mut self.chapters,
            EntityKind::Page => &mut self.pages,
        }
    }

    pub fn counters(&self) -> Counters {
        Counters {
            shelves: self.shelves.created,
            books: self.books.created,
            chapters: self.chapters.created,
            pages: self.pages.created,
        }
    }

    pub fn failure_count(&self) -> usize {
        [
            &self.shelves,
            &self.books,
            &self.chapters,
            &self.pages,
            &self.general_pages,
        ]
        .iter()
        .map(|t| t.not_created.len())
        .sum()
    }

    /// Human-readable report listing every item that was not created.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let rows = [
            ("Shelves", &self.shelves),
            ("Books", &self.books),
            ("Chapters", &self.chapters),
            ("Pages", &self.pages),
            ("General pages", &self.general_pages),
        ];

        for (label, tally) in rows {
            let _ = writeln!(
                out,
                "{label}: {} created, {} not created, {} skipped",
                tally.created,
                tally.not_created.len(),
                tally.skipped
            );
        }
        let _ = writeln!(
            out,
            "Attachments: {} files across {} pages",
            self.attachment_files, self.attachment_records
        );
        if self.unshelved_books > 0 {
            let _ = writeln!(out, "Books left off their shelf: {}", self.unshelved_books);
        }
        if self.cancelled {
            let _ = writeln!(out, "Run was cancelled before completion");
        }

        for (label, tally) in rows {
            if tally.not_created.is_empty() {
                continue;
            }
            let _ = writeln!(out, "{label} not created:");
            for name in &tally.not_created {
                let _ = writeln!(out, "  - {name}");
            }
        }

        if !self.unresolved_links.is_empty() {
            let _ = writeln!(out, "Unresolved links: {}", self.unresolved_links.len());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        let event = ProgressEvent::new(Phase::Pages, "x", Counters::default()).at(3, 4);
        assert_eq!(event.percent(), Some(75));
        let event = ProgressEvent::new(Phase::Pages, "x", Counters::default());
        assert_eq!(event.percent(), None);
    }

    #[test]
    fn test_render_lists_failures() {
        let mut summary = RunSummary::default();
        summary.pages.created = 3;
        summary.pages.not_created.push("Broken_9.html".to_string());
        summary.books.skipped = 2;

        let text = summary.render();
        assert!(text.contains("Pages: 3 created, 1 not created, 0 skipped"));
        assert!(text.contains("Books: 0 created, 0 not created, 2 skipped"));
        assert!(text.contains("  - Broken_9.html"));
        assert_eq!(summary.failure_count(), 1);
    }

    #[test]
    fn test_event_serializes_phase() {
        let event = ProgressEvent::new(Phase::LinkFix, "fixing", Counters::default());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["phase"], "link-fix");
        assert_eq!(json["level"], "info");
        assert!(json.get("current").is_none());
    }
}
