use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::entity::EntityRecord;

#[derive(Debug, Default)]
struct Table {
    records: Vec<Arc<EntityRecord>>,
    index: HashMap<String, usize>,
}

impl Table {
    fn reindex_from(&mut self, start: usize) {
        for (slot, record) in self.records.iter().enumerate().skip(start) {
            self.index.insert(record.id().to_string(), slot);
        }
    }
}

/// Id-indexed set of entity records with stable iteration order.
///
/// A dense sequence plus an id → slot map, both behind one lock. Records are
/// handed out as `Arc`s so callers never hold the table lock while touching an
/// entity.
#[derive(Debug, Default)]
pub struct ObjectDb {
    table: RwLock<Table>,
}

impl ObjectDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Table> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Table> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace in place. Replacing keeps the record's slot.
    pub fn set(&self, record: Arc<EntityRecord>) {
        let mut table = self.write();
        match table.index.get(record.id()).copied() {
            Some(slot) => table.records[slot] = record,
            None => {
                let slot = table.records.len();
                table.index.insert(record.id().to_string(), slot);
                table.records.push(record);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<EntityRecord>> {
        let table = self.read();
        table.index.get(id).map(|&slot| Arc::clone(&table.records[slot]))
    }

    /// Returns the record for `id`, creating it with `create` if it is unknown.
    /// The check and the insert happen under one write lock.
    pub fn get_or_insert_with(
        &self,
        id: &str,
        create: impl FnOnce() -> EntityRecord,
    ) -> (Arc<EntityRecord>, bool) {
        if let Some(record) = self.get(id) {
            return (record, false);
        }

        let mut table = self.write();
        if let Some(&slot) = table.index.get(id) {
            return (Arc::clone(&table.records[slot]), false);
        }

        let record = Arc::new(create());
        debug_assert_eq!(record.id(), id, "record created under a different id");
        let slot = table.records.len();
        table.index.insert(id.to_string(), slot);
        table.records.push(Arc::clone(&record));
        (record, true)
    }

    /// Ordered removal; every record after the removed slot shifts down by one.
    pub fn delete(&self, id: &str) -> Option<Arc<EntityRecord>> {
        let mut table = self.write();
        let slot = table.index.remove(id)?;
        let record = table.records.remove(slot);
        table.reindex_from(slot);
        Some(record)
    }

    /// Keeps only the records for which `keep` returns true. Returns the
    /// removed records in their former order.
    pub fn retain(&self, mut keep: impl FnMut(&EntityRecord) -> bool) -> Vec<Arc<EntityRecord>> {
        let mut table = self.write();
        let mut removed = Vec::new();
        let records = std::mem::take(&mut table.records);
        for record in records {
            if keep(&record) {
                table.records.push(record);
            } else {
                removed.push(record);
            }
        }

        if !removed.is_empty() {
            table.index.clear();
            table.reindex_from(0);
        }
        removed
    }

    /// A copy of the current membership, in insertion order.
    pub fn select_all(&self) -> Vec<Arc<EntityRecord>> {
        self.read().records.clone()
    }

    pub fn ids(&self) -> Vec<String> {
        self.read()
            .records
            .iter()
            .map(|record| record.id().to_string())
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().records.is_empty()
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        let table = self.read();
        assert_eq!(table.index.len(), table.records.len());
        for (slot, record) in table.records.iter().enumerate() {
            assert_eq!(table.index.get(record.id()), Some(&slot), "{}", record.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::entities::{Player, Tree};

    fn tree(id: &str) -> Arc<EntityRecord> {
        Arc::new(EntityRecord::new(Box::new(Tree::new(id, Vec2::ZERO, 10.0))))
    }

    fn db_with(ids: &[&str]) -> ObjectDb {
        let db = ObjectDb::new();
        for id in ids {
            db.set(tree(id));
        }
        db
    }

    #[test]
    fn set_replaces_in_place() {
        let db = db_with(&["a", "b", "c"]);
        db.set(tree("b"));
        assert_eq!(db.ids(), ["a", "b", "c"]);
        db.assert_consistent();
    }

    #[test]
    fn delete_reindexes_shifted_records() {
        let db = db_with(&["a", "b", "c", "d"]);

        assert!(db.delete("b").is_some());
        assert_eq!(db.ids(), ["a", "c", "d"]);
        db.assert_consistent();
        assert_eq!(db.get("d").unwrap().id(), "d");

        assert!(db.delete("missing").is_none());
        db.assert_consistent();
    }

    #[test]
    fn deleting_last_slot_keeps_map_consistent() {
        let db = db_with(&["a", "b", "c"]);

        assert!(db.delete("c").is_some());
        db.assert_consistent();
        assert!(!db.contains("c"));

        db.set(tree("e"));
        assert_eq!(db.ids(), ["a", "b", "e"]);
        db.assert_consistent();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "different id")]
    fn insert_under_mismatched_id_panics_in_debug() {
        let db = ObjectDb::new();
        db.get_or_insert_with("a", || {
            EntityRecord::new(Box::new(Tree::new("b", Vec2::ZERO, 10.0)))
        });
    }

    #[test]
    fn delete_only_entry() {
        let db = db_with(&["a"]);
        db.delete("a");
        assert!(db.is_empty());
        db.assert_consistent();
    }

    #[test]
    fn mixed_operations_stay_consistent() {
        let db = ObjectDb::new();
        for round in 0..50 {
            let id = format!("e{}", round % 7);
            match round % 3 {
                0 | 1 => db.set(tree(&id)),
                _ => {
                    db.delete(&id);
                }
            }
            db.assert_consistent();
        }

        db.retain(|record| record.id() != "e3");
        db.assert_consistent();
        assert!(!db.contains("e3"));
    }

    #[test]
    fn get_or_insert_creates_once() {
        let db = ObjectDb::new();
        let make = || EntityRecord::new(Box::new(Player::new("p1", "alice", Vec2::ZERO)));

        let (first, created) = db.get_or_insert_with("p1", make);
        assert!(created);
        let (second, created) = db.get_or_insert_with("p1", make);
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn select_all_is_a_snapshot_of_membership() {
        let db = db_with(&["a", "b"]);
        let selected = db.select_all();
        db.delete("a");
        assert_eq!(selected.len(), 2);
        assert_eq!(db.len(), 1);
    }
}
