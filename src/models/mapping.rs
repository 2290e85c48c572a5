//! Append-only `previous id -> remote id` tables.

use std::collections::BTreeMap;

use crate::models::{EntityKind, RemoteId};

/// One kind's id table. A key, once written, is never overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdTable {
    entries: BTreeMap<String, RemoteId>,
}

impl IdTable {
    /// Insert a mapping. Returns `false` (and keeps the old value) when the
    /// key is already present.
    pub fn insert(&mut self, previous_id: &str, remote_id: RemoteId) -> bool {
        if self.entries.contains_key(previous_id) {
            log::warn!(
                "Id mapping for {} already exists; keeping {:?}",
                previous_id,
                self.entries.get(previous_id)
            );
            return false;
        }
        self.entries.insert(previous_id.to_string(), remote_id);
        true
    }

    pub fn get(&self, previous_id: &str) -> Option<RemoteId> {
        self.entries.get(previous_id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RemoteId)> {
        self.entries.iter()
    }
}

/// Id tables for every destination kind, scoped to one run.
///
/// `pages` also holds the `_General` pages of shelves, books and chapters,
/// keyed by the container document's previous id.
#[derive(Debug, Clone, Default)]
pub struct IdMapping {
    pub shelves: IdTable,
    pub books: IdTable,
    pub chapters: IdTable,
    pub pages: IdTable,
}

impl IdMapping {
    pub fn table(&self, kind: EntityKind) -> &IdTable {
        match kind {
            EntityKind::Shelf => &self.shelves,
            EntityKind::Book => &self.books,
            EntityKind::Chapter => &self.chapters,
            EntityKind::Page => &self.pages,
        }
    }

    pub fn table_mut(&mut self, kind: EntityKind) -> &mut IdTable {
        match kind {
            EntityKind::Shelf => &mut self.shelves,
            EntityKind::Book => &mut self.books,
            EntityKind::Chapter => &mut self.chapters,
            EntityKind::Page => &mut self.pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_never_overwrites() {
        let mut mapping = IdMapping::default();
        assert!(mapping.table_mut(EntityKind::Book).insert("42", 7));
        assert!(!mapping.table_mut(EntityKind::Book).insert("42", 8));
        assert_eq!(mapping.books.get("42"), Some(7));
        assert_eq!(mapping.table(EntityKind::Page).get("42"), None);
    }
}
