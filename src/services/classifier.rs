// src/services/classifier.rs

//! Topology classifier.
//!
//! Infers the shelf/book/chapter/page hierarchy of an HTML export from the
//! breadcrumb depth of every document:
//!
//! | depth | kind                                          |
//! |-------|-----------------------------------------------|
//! | 1     | shelf                                         |
//! | 2     | book                                          |
//! | 3     | chapter if a deeper document names it, else page |
//! | ≥ 4   | page; breadcrumb\[3\] is its chapter           |
//!
//! Depth-3 documents can only be resolved after every deeper document has
//! been seen, so classification is two passes over the full set.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::models::{
    ChapterEntry, ClassifiedNode, EntityKind, ExportDocument, ParentRefs, Topology,
};
use crate::utils::previous_id;

/// Depth-3 document waiting for the resolution pass.
struct Deferred {
    filename: String,
    title: String,
    book: Option<String>,
}

/// Book waiting for the shelf set to be known.
struct PendingBook {
    filename: String,
    title: String,
    crumb_targets: Vec<String>,
}

/// Classifies the documents of one HTML export directory.
pub struct TopologyClassifier {
    dir: PathBuf,
}

impl TopologyClassifier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// HTML files of the export in sorted order.
    pub fn html_files(&self) -> Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Err(AppError::setup(format!(
                "Export directory not found: {}",
                self.dir.display()
            )));
        }

        let mut files: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(".html"))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Read every document and classify the export.
    pub fn classify(&self) -> Result<Topology> {
        let files = self.html_files()?;
        log::info!(
            "Classifying {} HTML files in {}",
            files.len(),
            self.dir.display()
        );

        let mut documents = Vec::with_capacity(files.len());
        for filename in &files {
            match ExportDocument::load(&self.dir, filename) {
                Ok(doc) => documents.push(doc),
                Err(e) => log::warn!("Could not read {}: {}", filename, e),
            }
        }
        Ok(classify_documents(documents))
    }
}

/// Classify already-loaded documents. Input order does not matter.
pub fn classify_documents(documents: impl IntoIterator<Item = ExportDocument>) -> Topology {
    let mut documents: Vec<ExportDocument> = documents.into_iter().collect();
    documents.sort_by(|a, b| a.filename.cmp(&b.filename));

    let mut topology = Topology::default();
    let mut deferred = Vec::new();
    let mut pending_books = Vec::new();
    let seen: HashSet<String> = documents.iter().map(|d| d.filename.clone()).collect();

    // Pass 1: everything except depth-3 documents is decided here.
    for doc in &documents {
        match doc.depth() {
            0 => {
                log::warn!("No breadcrumbs in {}; skipping", doc.filename);
                topology.skipped.push(doc.filename.clone());
            }
            1 => {
                let title = doc
                    .breadcrumbs
                    .as_ref()
                    .and_then(|crumbs| crumbs.first())
                    .map(|c| c.label.clone())
                    .filter(|label| !label.is_empty())
                    .unwrap_or_else(|| doc.display_title());
                topology.shelves.push(doc.filename.clone());
                topology.nodes.insert(
                    doc.filename.clone(),
                    ClassifiedNode {
                        kind: EntityKind::Shelf,
                        filename: doc.filename.clone(),
                        previous_id: doc.previous_id(),
                        title,
                        parents: ParentRefs::default(),
                    },
                );
            }
            2 => {
                let crumb_targets = (0..doc.depth())
                    .filter_map(|i| doc.crumb_target(i))
                    .collect();
                pending_books.push(PendingBook {
                    filename: doc.filename.clone(),
                    title: doc.display_title(),
                    crumb_targets,
                });
            }
            3 => deferred.push(Deferred {
                filename: doc.filename.clone(),
                title: doc.display_title(),
                book: doc.crumb_target(2).map(|f| previous_id(&f)),
            }),
            _ => {
                let Some(chapter) = doc.crumb_target(3) else {
                    log::warn!(
                        "{} has no link at breadcrumb 3; cannot place it",
                        doc.filename
                    );
                    topology.skipped.push(doc.filename.clone());
                    continue;
                };
                let book = doc.crumb_target(2).map(|f| previous_id(&f));

                let entry = topology
                    .chapters
                    .entry(chapter.clone())
                    .or_insert_with(|| ChapterEntry {
                        book_previous_id: book.clone().unwrap_or_default(),
                        chapter_previous_id: previous_id(&chapter),
                        page_filenames: Vec::new(),
                    });
                entry.page_filenames.push(doc.filename.clone());

                topology.pages_in_chapters.push(doc.filename.clone());
                topology.nodes.insert(
                    doc.filename.clone(),
                    ClassifiedNode {
                        kind: EntityKind::Page,
                        filename: doc.filename.clone(),
                        previous_id: doc.previous_id(),
                        title: doc.display_title(),
                        parents: ParentRefs {
                            shelf: None,
                            book,
                            chapter: Some(chapter),
                        },
                    },
                );
            }
        }
    }

    // Books need the full shelf set to recognise their parent crumb.
    let shelf_files: BTreeSet<&String> = topology.shelves.iter().collect();
    let mut book_nodes = Vec::with_capacity(pending_books.len());
    for book in pending_books {
        let shelf = book
            .crumb_targets
            .iter()
            .rev()
            .find(|target| target.contains("Home_") || shelf_files.contains(target))
            .map(|target| previous_id(target));
        if shelf.is_none() {
            log::warn!("No shelf breadcrumb found for book {}", book.filename);
        }
        book_nodes.push(ClassifiedNode {
            kind: EntityKind::Book,
            filename: book.filename.clone(),
            previous_id: previous_id(&book.filename),
            title: book.title,
            parents: ParentRefs {
                shelf,
                book: None,
                chapter: None,
            },
        });
    }
    for node in book_nodes {
        topology.books.push(node.filename.clone());
        topology.nodes.insert(node.filename.clone(), node);
    }

    // Pass 2: a depth-3 document is a chapter exactly when some deeper
    // document named it as breadcrumb[3].
    for doc in deferred {
        let kind = if topology.chapters.contains_key(&doc.filename) {
            EntityKind::Chapter
        } else {
            topology.pages_in_books.push(doc.filename.clone());
            EntityKind::Page
        };
        topology.nodes.insert(
            doc.filename.clone(),
            ClassifiedNode {
                kind,
                previous_id: previous_id(&doc.filename),
                filename: doc.filename,
                title: doc.title,
                parents: ParentRefs {
                    shelf: None,
                    book: doc.book,
                    chapter: None,
                },
            },
        );
    }

    // Precondition: every chapter named by a deeper document must exist.
    topology.dangling_chapters = topology
        .chapters
        .keys()
        .filter(|chapter| !seen.contains(*chapter))
        .cloned()
        .collect();
    for chapter in &topology.dangling_chapters {
        log::warn!(
            "Chapter {} is referenced by deeper pages but missing from the export",
            chapter
        );
    }

    log::info!(
        "Sorted into {} shelves, {} books, {} chapters, {} standalone pages, {} chapter pages ({} skipped)",
        topology.shelves.len(),
        topology.books.len(),
        topology.chapters.len(),
        topology.pages_in_books.len(),
        topology.pages_in_chapters.len(),
        topology.skipped.len()
    );

    topology
}
