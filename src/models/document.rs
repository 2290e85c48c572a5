//! Export documents and their breadcrumb chains.

use std::fs;
use std::path::Path;

use scraper::Html;

use crate::error::Result;
use crate::utils::html::{element_text, selector};
use crate::utils::{clean_title, previous_id};

/// One ancestor link rendered in a document's breadcrumb bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumb {
    pub label: String,
    pub href: Option<String>,
}

/// A single HTML file of the export, read once per pass.
#[derive(Debug, Clone)]
pub struct ExportDocument {
    /// File name relative to the export directory
    pub filename: String,

    /// Ancestor chain; `None` when the document has no breadcrumb bar
    pub breadcrumbs: Option<Vec<Breadcrumb>>,

    /// Text of `#title-text` with the space prefix removed
    pub title: Option<String>,

    /// Raw file content
    pub content: String,
}

impl ExportDocument {
    /// Read and parse `filename` from `dir`.
    pub fn load(dir: &Path, filename: &str) -> Result<Self> {
        let content = fs::read_to_string(dir.join(filename))?;
        Self::parse(filename, content)
    }

    /// Parse already-loaded content.
    pub fn parse(filename: impl Into<String>, content: String) -> Result<Self> {
        let document = Html::parse_document(&content);

        let crumbs_sel = selector("#breadcrumbs")?;
        let item_sel = selector("li")?;
        let link_sel = selector("a")?;
        let title_sel = selector("#title-text")?;

        let breadcrumbs = document.select(&crumbs_sel).next().map(|bar| {
            bar.select(&item_sel)
                .map(|item| {
                    let link = item.select(&link_sel).next();
                    Breadcrumb {
                        label: link.map(element_text).unwrap_or_else(|| element_text(item)),
                        href: link.and_then(|a| a.value().attr("href")).map(str::to_string),
                    }
                })
                .collect::<Vec<_>>()
        });

        let title = document
            .select(&title_sel)
            .next()
            .map(|el| clean_title(&element_text(el)))
            .filter(|t| !t.is_empty());

        Ok(Self {
            filename: filename.into(),
            breadcrumbs,
            title,
            content,
        })
    }

    /// Number of breadcrumb items (0 when the bar is missing).
    pub fn depth(&self) -> usize {
        self.breadcrumbs.as_ref().map_or(0, Vec::len)
    }

    /// Href of the breadcrumb at `index`, reduced to a file name.
    pub fn crumb_target(&self, index: usize) -> Option<String> {
        self.breadcrumbs
            .as_ref()?
            .get(index)?
            .href
            .as_deref()
            .map(|href| crate::utils::file_name(href).to_string())
    }

    /// Legacy identifier from the filename suffix.
    pub fn previous_id(&self) -> String {
        previous_id(&self.filename)
    }

    /// Title for display, falling back to the filename stem.
    pub fn display_title(&self) -> String {
        self.title.clone().unwrap_or_else(|| {
            self.filename
                .strip_suffix(".html")
                .unwrap_or(&self.filename)
                .to_string()
        })
    }

    /// Parse the content into a DOM for rewriting.
    pub fn dom(&self) -> Html {
        Html::parse_document(&self.content)
    }
}
