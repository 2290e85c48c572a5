//! Classified export structure.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Destination entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Shelf,
    Book,
    Chapter,
    Page,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Shelf => "shelf",
            EntityKind::Book => "book",
            EntityKind::Chapter => "chapter",
            EntityKind::Page => "page",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ancestors a node needs resolved before it can be created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentRefs {
    /// Previous id of the shelf holding a book
    pub shelf: Option<String>,
    /// Previous id of the book holding a chapter or page
    pub book: Option<String>,
    /// Filename of the chapter holding a page
    pub chapter: Option<String>,
}

/// A document after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedNode {
    pub kind: EntityKind,
    pub filename: String,
    pub previous_id: String,
    pub title: String,
    pub parents: ParentRefs,
}

/// A chapter and the pages collected under it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterEntry {
    pub book_previous_id: String,
    pub chapter_previous_id: String,
    pub page_filenames: Vec<String>,
}

/// Partitions produced by the classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    pub shelves: Vec<String>,
    pub books: Vec<String>,
    pub chapters: BTreeMap<String, ChapterEntry>,
    pub pages_in_chapters: Vec<String>,
    pub pages_in_books: Vec<String>,

    /// Every classified document by filename
    pub nodes: BTreeMap<String, ClassifiedNode>,

    /// Documents without breadcrumbs
    pub skipped: Vec<String>,

    /// Chapters named as ancestors but absent from the export
    pub dangling_chapters: Vec<String>,
}

impl Topology {
    /// Kind of an export file, if it was classified.
    pub fn kind_of(&self, filename: &str) -> Option<EntityKind> {
        if self.chapters.contains_key(filename) {
            return Some(EntityKind::Chapter);
        }
        self.nodes.get(filename).map(|n| n.kind)
    }

    pub fn node(&self, filename: &str) -> Option<&ClassifiedNode> {
        self.nodes.get(filename)
    }

    /// All page filenames, standalone first.
    pub fn all_pages(&self) -> impl Iterator<Item = &String> {
        self.pages_in_books.iter().chain(self.pages_in_chapters.iter())
    }

    /// Total number of entities the creation stage will attempt.
    pub fn entity_count(&self) -> usize {
        self.shelves.len()
            + self.books.len()
            + self.chapters.len()
            + self.pages_in_books.len()
            + self.pages_in_chapters.len()
    }
}
