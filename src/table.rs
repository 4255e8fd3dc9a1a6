// 🗂️ Record Table - arena storage shared by the four entity tables
//
// Records live in a slot arena addressed by stable handles. `order` keeps
// insertion order; reads walk it newest-first, so the most recently added
// record always comes out first. Two indices sit on top:
//   - by_id:  id -> handle (open-addressing KeyedIndex)
//   - by_key: unique natural key -> id (city name, fine type)
// plus the table's filter chain and the path it saves to.

use crate::codec;
use crate::error::{DbError, Result};
use crate::filter::{Comparator, Filter, FilterChain, Filterable};
use crate::index::KeyedIndex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// A row type that can live in a `Table`.
pub trait Record: Filterable + Clone + Serialize + DeserializeOwned {
    /// Entity name used in logs and errors
    const ENTITY: &'static str;

    fn id(&self) -> i64;

    /// Natural key kept unique through the `by_key` index, if the entity has one
    fn unique_key(&self) -> Option<&str> {
        None
    }
}

/// Record types whose filters can be evaluated without looking at other tables.
pub trait Matches {
    fn matches(&self, filter: &Filter) -> bool;
}

#[derive(Debug, Clone)]
pub struct Table<R: Record> {
    path: PathBuf,
    slots: Vec<Option<R>>,
    free: Vec<usize>,
    order: Vec<usize>,
    by_id: KeyedIndex<usize>,
    by_key: BTreeMap<String, i64>,
    filters: FilterChain,
}

impl<R: Record> Table<R> {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Table {
            path: path.into(),
            slots: Vec::new(),
            free: Vec::new(),
            order: Vec::new(),
            by_id: KeyedIndex::new(),
            by_key: BTreeMap::new(),
            filters: FilterChain::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    // ========================================================================
    // PERSISTENCE
    // ========================================================================

    /// Reload from the table's own file.
    pub fn load(&mut self) -> Result<usize> {
        let path = self.path.clone();
        self.load_from_file(&path)
    }

    /// Replace the contents with the records stored in `path`.
    /// On any error the current contents are left untouched.
    pub fn load_from_file(&mut self, path: &Path) -> Result<usize> {
        let records: Vec<R> = codec::read_records(path)?;

        let mut seen = HashSet::with_capacity(records.len());
        if let Some(duplicate) = records.iter().find(|r| !seen.insert(r.id())) {
            return Err(DbError::Parse {
                path: path.to_path_buf(),
                message: format!("duplicate {} id {}", R::ENTITY, duplicate.id()),
            });
        }

        self.clear_records();
        // Files are written newest-first; inserting back-to-front restores that order
        for record in records.into_iter().rev() {
            self.insert(record);
        }

        tracing::info!(entity = R::ENTITY, path = %path.display(), count = self.len(), "Loaded table");
        Ok(self.len())
    }

    /// Write every record, newest first, to the table's own file.
    pub fn save_to_file(&self) -> Result<usize> {
        let written = codec::write_records(&self.path, self.iter())?;
        tracing::debug!(entity = R::ENTITY, path = %self.path.display(), count = written, "Saved table");
        Ok(written)
    }

    // ========================================================================
    // STORAGE
    // ========================================================================

    /// `max(existing ids) + 1`, or 1 for an empty table. Ids of deleted
    /// records are never handed out again unless they were the maximum.
    pub fn next_id(&self) -> i64 {
        self.iter().map(|r| r.id()).max().map_or(1, |max| max.max(0) + 1)
    }

    /// Place a record at the head of the table and index it.
    /// Callers validate ids and unique keys beforehand.
    pub fn insert(&mut self, record: R) {
        let id = record.id();
        if let Some(key) = record.unique_key() {
            self.by_key.insert(key.to_string(), id);
        }

        let handle = match self.free.pop() {
            Some(handle) => {
                self.slots[handle] = Some(record);
                handle
            }
            None => {
                self.slots.push(Some(record));
                self.slots.len() - 1
            }
        };

        self.order.push(handle);
        self.by_id.insert(id, handle);
    }

    /// Unlink and return the record with `id`.
    pub fn remove(&mut self, id: i64) -> Option<R> {
        let handle = self.by_id.find(id)?;
        let position = self.order.iter().position(|&h| h == handle)?;

        // Natural key first, then the node, then the id index
        if let Some(key) = self.slots[handle].as_ref().and_then(|r| r.unique_key()) {
            if self.by_key.get(key) == Some(&id) {
                self.by_key.remove(key);
            }
        }
        self.order.remove(position);
        let record = self.slots[handle].take();
        self.free.push(handle);
        self.by_id.remove(id);

        record
    }

    pub fn get(&self, id: i64) -> Option<&R> {
        self.by_id
            .find(id)
            .and_then(|handle| self.slots.get(handle))
            .and_then(|slot| slot.as_ref())
    }

    /// Mutable access for field edits. Changing the id or the unique key
    /// through this reference bypasses the indices; use `rekey` for the latter.
    pub(crate) fn get_mut(&mut self, id: i64) -> Option<&mut R> {
        let handle = self.by_id.find(id)?;
        self.slots.get_mut(handle).and_then(|slot| slot.as_mut())
    }

    pub fn contains(&self, id: i64) -> bool {
        self.by_id.contains(id)
    }

    pub fn id_by_key(&self, key: &str) -> Option<i64> {
        self.by_key.get(key).copied()
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Move the natural-key entry of `id` from `old` to `new`.
    pub(crate) fn rekey(&mut self, id: i64, old: &str, new: &str) {
        if self.by_key.get(old) == Some(&id) {
            self.by_key.remove(old);
        }
        self.by_key.insert(new.to_string(), id);
    }

    /// Apply `edit` to every record (used for cascading reference updates).
    pub(crate) fn for_each_mut<F>(&mut self, mut edit: F)
    where
        F: FnMut(&mut R),
    {
        for &handle in self.order.iter() {
            if let Some(record) = self.slots[handle].as_mut() {
                edit(record);
            }
        }
    }

    fn clear_records(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.order.clear();
        self.by_id.clear();
        self.by_key.clear();
    }

    // ========================================================================
    // ITERATION
    // ========================================================================

    /// Records newest-first. Borrows the table, so it cannot be mutated mid-walk.
    pub fn iter(&self) -> impl Iterator<Item = &R> + '_ {
        self.order
            .iter()
            .rev()
            .filter_map(move |&handle| self.slots[handle].as_ref())
    }

    /// Restartable cursor over record snapshots.
    pub fn cursor(&self) -> Cursor<'_, R> {
        Cursor {
            table: self,
            position: 0,
        }
    }

    /// Owned copies of every record, newest-first.
    pub fn snapshot(&self) -> Vec<R> {
        self.iter().cloned().collect()
    }

    // ========================================================================
    // FILTERS
    // ========================================================================

    pub fn add_filter(&mut self, field: &str, comparator: Comparator, value: &str) -> Result<()> {
        self.filters.add::<R>(Filter::new(field, comparator, value))
    }

    /// Same as `add_filter` with the numeric comparator code (1..=4).
    pub fn add_filter_code(&mut self, field: &str, code: i32, value: &str) -> Result<()> {
        let comparator = Comparator::from_code(code)
            .ok_or_else(|| DbError::validation(format!("Unknown comparator code: {}", code)))?;
        self.add_filter(field, comparator, value)
    }

    pub fn clear_filters(&mut self) {
        self.filters.clear();
    }

    pub fn remove_filter_at(&mut self, index: usize) -> Option<Filter> {
        self.filters.remove_at(index)
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    pub fn filter_description(&self, index: usize) -> String {
        self.filters.describe::<R>(index)
    }

    pub fn filters(&self) -> &FilterChain {
        &self.filters
    }

    /// Records, newest-first, that satisfy `predicate` for every filter.
    pub fn select_with<F>(&self, mut predicate: F) -> Vec<R>
    where
        F: FnMut(&R, &Filter) -> bool,
    {
        self.iter()
            .filter(|record| self.filters.matches_all(|filter| predicate(*record, filter)))
            .cloned()
            .collect()
    }
}

impl<R: Record + Matches> Table<R> {
    /// Snapshots of the records that pass the whole filter chain, newest-first.
    pub fn apply_filters(&self) -> Vec<R> {
        self.select_with(|record, filter| record.matches(filter))
    }
}

// ============================================================================
// CURSOR
// ============================================================================

/// Explicit reset / has_next / next walk over a table.
///
/// Each cursor owns its position, and it holds a shared borrow of the table,
/// so any number of cursors can be live at once but none while the table is
/// being mutated.
pub struct Cursor<'a, R: Record> {
    table: &'a Table<R>,
    position: usize,
}

impl<'a, R: Record> Cursor<'a, R> {
    pub fn reset(&mut self) {
        self.position = 0;
    }

    pub fn has_next(&self) -> bool {
        self.position < self.table.order.len()
    }
}

impl<'a, R: Record> Iterator for Cursor<'a, R> {
    type Item = R;

    fn next(&mut self) -> Option<R> {
        let order = &self.table.order;
        while self.position < order.len() {
            let handle = order[order.len() - 1 - self.position];
            self.position += 1;
            if let Some(record) = self.table.slots[handle].as_ref() {
                return Some(record.clone());
            }
        }
        None
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tag {
        id: i64,
        label: String,
    }

    impl Filterable for Tag {
        fn supports(field: &str, comparator: Comparator) -> bool {
            field == "label" && matches!(comparator, Comparator::Contains | Comparator::Equals)
        }

        fn describe(filter: &Filter) -> String {
            format!("Label {} {:?}", filter.comparator, filter.value)
        }
    }

    impl Matches for Tag {
        fn matches(&self, filter: &Filter) -> bool {
            filter.comparator.matches_text(&self.label, &filter.value)
        }
    }

    impl Record for Tag {
        const ENTITY: &'static str = "Tag";

        fn id(&self) -> i64 {
            self.id
        }

        fn unique_key(&self) -> Option<&str> {
            Some(&self.label)
        }
    }

    fn tag(id: i64, label: &str) -> Tag {
        Tag {
            id,
            label: label.to_string(),
        }
    }

    fn table_with(labels: &[&str]) -> Table<Tag> {
        let mut table = Table::new("tags.txt");
        for label in labels {
            let id = table.next_id();
            table.insert(tag(id, label));
        }
        table
    }

    #[test]
    fn test_ids_are_sequential() {
        let table = table_with(&["a", "b", "c"]);
        let ids: Vec<i64> = table.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![3, 2, 1]); // newest first
        assert_eq!(table.next_id(), 4);
    }

    #[test]
    fn test_deleted_id_not_reused() {
        let mut table = table_with(&["a", "b", "c"]);
        assert_eq!(table.remove(2).unwrap().label, "b");
        assert_eq!(table.next_id(), 4);

        // Deleting the maximum makes max(remaining) + 1 the next id
        table.remove(3);
        assert_eq!(table.next_id(), 2);
    }

    #[test]
    fn test_remove_clears_both_indices() {
        let mut table = table_with(&["a", "b"]);
        table.remove(1);

        assert!(table.get(1).is_none());
        assert!(!table.contains(1));
        assert_eq!(table.id_by_key("a"), None);
        assert_eq!(table.id_by_key("b"), Some(2));
        assert_eq!(table.len(), 1);
        assert!(table.remove(1).is_none());
    }

    #[test]
    fn test_slot_reuse_keeps_order() {
        let mut table = table_with(&["a", "b", "c"]);
        table.remove(2);
        let id = table.next_id();
        table.insert(tag(id, "d"));

        let labels: Vec<String> = table.iter().map(|t| t.label.clone()).collect();
        assert_eq!(labels, vec!["d", "c", "a"]);
        assert_eq!(table.get(4).unwrap().label, "d");
    }

    #[test]
    fn test_cursor_reset() {
        let table = table_with(&["a", "b"]);
        let mut cursor = table.cursor();

        assert!(cursor.has_next());
        assert_eq!(cursor.next().unwrap().label, "b");
        assert_eq!(cursor.next().unwrap().label, "a");
        assert!(!cursor.has_next());
        assert!(cursor.next().is_none());

        cursor.reset();
        assert_eq!(cursor.next().unwrap().label, "b");

        // Independent cursors do not share position
        let other = table.cursor();
        assert_eq!(other.count(), 2);
    }

    #[test]
    fn test_apply_filters() {
        let mut table = table_with(&["apple", "apricot", "banana"]);
        table.add_filter("label", Comparator::Contains, "ap").unwrap();
        assert_eq!(table.apply_filters().len(), 2);

        table.add_filter_code("label", 2, "apple").unwrap();
        let hits = table.apply_filters();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].label, "apple");

        table.remove_filter_at(0);
        assert_eq!(table.filter_count(), 1);
        assert_eq!(table.filter_description(0), "Label = \"apple\"");
        assert_eq!(table.apply_filters(), vec![tag(1, "apple")]);

        assert!(table.add_filter_code("label", 9, "x").is_err());
        assert!(table.add_filter("size", Comparator::Equals, "x").is_err());

        table.clear_filters();
        assert_eq!(table.apply_filters().len(), 3);
    }

    #[test]
    fn test_removing_a_filter_widens_the_result() {
        let mut table = table_with(&["apple", "apricot", "banana", "mango"]);
        table.add_filter("label", Comparator::Contains, "p").unwrap();
        table.add_filter("label", Comparator::Contains, "a").unwrap();

        let labels = |hits: Vec<Tag>| hits.into_iter().map(|t| t.label).collect::<Vec<_>>();
        assert_eq!(labels(table.apply_filters()), vec!["apricot", "apple"]);

        // Only the "a" filter is left
        assert_eq!(table.remove_filter_at(0).unwrap().value, "p");
        assert_eq!(
            labels(table.apply_filters()),
            vec!["mango", "banana", "apricot", "apple"]
        );
    }

    #[test]
    fn test_duplicate_id_in_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.txt");
        std::fs::write(&path, "2 \"b\"\n1 \"a\"\n2 \"c\"\n").unwrap();

        let mut table = table_with(&["keep"]);
        let err = table.load_from_file(&path).unwrap_err();
        assert!(matches!(err, DbError::Parse { .. }));
        assert!(err.to_string().contains("duplicate Tag id 2"));
        assert_eq!(table.snapshot(), vec![tag(1, "keep")]);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.txt");

        let mut table: Table<Tag> = Table::new(&path);
        for label in ["x", "y", "z"] {
            let id = table.next_id();
            table.insert(tag(id, label));
        }
        table.remove(2);
        table.save_to_file().unwrap();

        let mut loaded: Table<Tag> = Table::new(&path);
        assert_eq!(loaded.load().unwrap(), 2);
        assert_eq!(loaded.snapshot(), table.snapshot());
        assert_eq!(loaded.id_by_key("z"), Some(3));
        assert_eq!(loaded.next_id(), 4);
    }

    #[test]
    fn test_failed_load_keeps_contents() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = table_with(&["keep"]);

        let missing = dir.path().join("missing.txt");
        assert!(table.load_from_file(&missing).is_err());
        assert_eq!(table.len(), 1);

        let broken = dir.path().join("broken.txt");
        std::fs::write(&broken, "1 \"ok\"\nnot-a-number \"bad\"\n").unwrap();
        assert!(table.load_from_file(&broken).is_err());
        assert_eq!(table.snapshot(), vec![tag(1, "keep")]);
    }
}
