//! VerDB Document Collection
//!
//! Collection management for document storage. Documents keep insertion
//! order; one lock covers documents and indexes so uniqueness checks and
//! writes are atomic per collection.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use crate::index::{DocumentIndex, IndexDefinition};
use crate::query::{Filter, Query};
use crate::types::{Document, DocumentId, Value};
use crate::update::Update;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use verdb_common::{StoreError, StoreResult};

/// Outcome of an upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(DocumentId),
    Updated(DocumentId),
}

// =============================================================================
// Collection
// =============================================================================

/// A collection of documents.
pub struct Collection {
    name: String,
    state: RwLock<CollectionState>,
}

#[derive(Default)]
struct CollectionState {
    documents: BTreeMap<u64, Document>,
    positions: HashMap<DocumentId, u64>,
    next_seq: u64,
    indexes: Vec<DocumentIndex>,
}

impl CollectionState {
    fn get(&self, id: &DocumentId) -> Option<&Document> {
        self.positions.get(id).and_then(|seq| self.documents.get(seq))
    }

    fn check_unique(&self, doc: &Document) -> StoreResult<()> {
        self.indexes.iter().try_for_each(|idx| idx.check_unique(doc))
    }

    fn insert(&mut self, doc: Document) -> StoreResult<DocumentId> {
        if self.positions.contains_key(&doc.id) {
            return Err(StoreError::DuplicateKey {
                index: "_id_".to_string(),
                key: doc.id.to_string(),
            });
        }
        self.check_unique(&doc)?;

        for index in self.indexes.iter_mut() {
            index.index_document(&doc);
        }
        let id = doc.id.clone();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.positions.insert(id.clone(), seq);
        self.documents.insert(seq, doc);
        Ok(id)
    }

    fn update(&mut self, id: &DocumentId, update: &Update) -> StoreResult<()> {
        let seq = *self
            .positions
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let old = self
            .documents
            .get(&seq)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut new = old.clone();
        update.apply(&mut new);
        self.check_unique(&new)?;

        for index in self.indexes.iter_mut() {
            index.unindex_document(&old);
            index.index_document(&new);
        }
        self.documents.insert(seq, new);
        Ok(())
    }

    fn remove(&mut self, id: &DocumentId) -> Option<Document> {
        let seq = self.positions.remove(id)?;
        let doc = self.documents.remove(&seq)?;
        for index in self.indexes.iter_mut() {
            index.unindex_document(&doc);
        }
        Some(doc)
    }

    /// Documents matching `filter` in insertion order, narrowed through a
    /// single-field index when the filter pins that field.
    fn matching<'a>(&'a self, filter: &Filter) -> Vec<&'a Document> {
        for (field, value) in filter.required_equalities() {
            let hit = self
                .indexes
                .iter()
                .find(|idx| idx.single_field() == Some(field))
                .and_then(|idx| idx.find_eq(value));
            if let Some(ids) = hit {
                let mut seqs: Vec<u64> = ids
                    .iter()
                    .filter_map(|id| self.positions.get(id).copied())
                    .collect();
                seqs.sort_unstable();
                return seqs
                    .iter()
                    .filter_map(|seq| self.documents.get(seq))
                    .filter(|doc| filter.matches(doc))
                    .collect();
            }
        }

        self.documents
            .values()
            .filter(|doc| filter.matches(doc))
            .collect()
    }
}

impl Collection {
    /// Create a new collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(CollectionState::default()),
        }
    }

    /// Get the collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    // -------------------------------------------------------------------------
    // Document Operations
    // -------------------------------------------------------------------------

    /// Insert a document.
    pub fn insert(&self, doc: Document) -> StoreResult<DocumentId> {
        self.state.write().insert(doc)
    }

    /// Get a document by ID.
    pub fn get(&self, id: &DocumentId) -> Option<Document> {
        self.state.read().get(id).cloned()
    }

    /// Apply an update to one document.
    pub fn update_by_id(&self, id: &DocumentId, update: &Update) -> StoreResult<()> {
        self.state.write().update(id, update)
    }

    /// Apply an update to every matching document; returns how many changed.
    pub fn update_many(&self, filter: &Filter, update: &Update) -> StoreResult<usize> {
        let mut state = self.state.write();
        let ids: Vec<DocumentId> = state
            .matching(filter)
            .into_iter()
            .map(|d| d.id.clone())
            .collect();
        for id in &ids {
            state.update(id, update)?;
        }
        Ok(ids.len())
    }

    /// Replace the data of the first matching document, or insert `doc`.
    pub fn upsert(&self, filter: &Filter, doc: Document) -> StoreResult<UpsertOutcome> {
        let mut state = self.state.write();
        let existing = state.matching(filter).first().map(|d| d.id.clone());
        match existing {
            Some(id) => {
                state.update(&id, &Update::Replace(doc.data))?;
                Ok(UpsertOutcome::Updated(id))
            }
            None => state.insert(doc).map(UpsertOutcome::Inserted),
        }
    }

    /// Delete a document.
    pub fn delete(&self, id: &DocumentId) -> StoreResult<Document> {
        self.state
            .write()
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Delete every matching document; returns how many were removed.
    pub fn delete_many(&self, filter: &Filter) -> usize {
        let mut state = self.state.write();
        let ids: Vec<DocumentId> = state
            .matching(filter)
            .into_iter()
            .map(|d| d.id.clone())
            .collect();
        ids.iter().filter(|id| state.remove(id).is_some()).count()
    }

    /// Get the number of documents.
    pub fn count(&self) -> usize {
        self.state.read().documents.len()
    }

    /// Get all documents in insertion order.
    pub fn all(&self) -> Vec<Document> {
        self.state.read().documents.values().cloned().collect()
    }

    // -------------------------------------------------------------------------
    // Query Operations
    // -------------------------------------------------------------------------

    /// Find documents matching a query.
    pub fn find(&self, query: &Query) -> Vec<Document> {
        let state = self.state.read();
        let matching: Vec<Document> = state
            .matching(&query.filter)
            .into_iter()
            .cloned()
            .collect();
        query.shape(matching)
    }

    /// Find one document matching a filter.
    pub fn find_one(&self, filter: &Filter) -> Option<Document> {
        self.state.read().matching(filter).first().map(|d| (*d).clone())
    }

    /// Count documents matching a filter.
    pub fn count_matching(&self, filter: &Filter) -> usize {
        self.state.read().matching(filter).len()
    }

    /// Distinct values of `key` across matching documents, in first-seen
    /// order. Array values contribute their elements.
    pub fn distinct(&self, filter: &Filter, key: &str) -> Vec<Value> {
        let state = self.state.read();
        let mut seen = HashSet::new();
        let mut values = Vec::new();

        for doc in state.matching(filter) {
            let Some(value) = doc.get_field(key) else {
                continue;
            };
            let items = match value {
                Value::Array(items) => items,
                other => vec![other],
            };
            for item in items {
                if seen.insert(item.canonical_string()) {
                    values.push(item);
                }
            }
        }

        values
    }

    // -------------------------------------------------------------------------
    // Index Operations
    // -------------------------------------------------------------------------

    /// Create an index unless an index over the same fields exists.
    ///
    /// Building a unique index over duplicate keys fails and leaves the
    /// collection unchanged.
    pub fn create_index(&self, definition: IndexDefinition) -> StoreResult<()> {
        let mut state = self.state.write();
        if let Some(existing) = state
            .indexes
            .iter()
            .find(|idx| idx.definition().fields == definition.fields)
        {
            if existing.definition().unique == definition.unique {
                return Ok(());
            }
            return Err(StoreError::Backend(format!(
                "index {} already exists with different options",
                existing.name()
            )));
        }

        let mut index = DocumentIndex::new(definition);
        for doc in state.documents.values() {
            index.check_unique(doc)?;
            index.index_document(doc);
        }
        state.indexes.push(index);
        Ok(())
    }

    /// Definitions of all indexes.
    pub fn index_definitions(&self) -> Vec<IndexDefinition> {
        self.state
            .read()
            .indexes
            .iter()
            .map(|idx| idx.definition().clone())
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryBuilder;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_json(value).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let collection = Collection::new("test");
        let id = collection.insert(doc(json!({"_id": "doc1", "name": "Alice"}))).unwrap();
        assert_eq!(id.as_str(), "doc1");

        let retrieved = collection.get(&id).unwrap();
        assert_eq!(retrieved.get("name").and_then(|v| v.as_str()), Some("Alice"));
    }

    #[test]
    fn test_duplicate_id() {
        let collection = Collection::new("test");
        collection.insert(Document::with_id("same-id")).unwrap();
        let result = collection.insert(Document::with_id("same-id"));
        assert!(matches!(result, Err(StoreError::DuplicateKey { .. })));
    }

    #[test]
    fn test_insertion_order_preserved() {
        let collection = Collection::new("test");
        for i in 0..20 {
            collection.insert(doc(json!({"n": i}))).unwrap();
        }
        let ns: Vec<i64> = collection
            .find(&Query::new())
            .iter()
            .filter_map(|d| d.get("n").and_then(|v| v.as_i64()))
            .collect();
        assert_eq!(ns, (0..20).collect::<Vec<i64>>());
    }

    #[test]
    fn test_update_by_id_and_many() {
        let collection = Collection::new("test");
        collection.insert(doc(json!({"_id": "a", "pk": 1, "v": 1}))).unwrap();
        collection.insert(doc(json!({"_id": "b", "pk": 1, "v": 2}))).unwrap();
        collection.insert(doc(json!({"_id": "c", "pk": 2, "v": 3}))).unwrap();

        let changed = collection
            .update_many(&Filter::eq("pk", 1i64), &Update::set(vec![("meta".into(), Value::from("x"))]))
            .unwrap();
        assert_eq!(changed, 2);
        assert_eq!(collection.count_matching(&Filter::eq("meta", "x")), 2);

        collection
            .update_by_id(&DocumentId::new("c"), &Update::Replace(HashMap::new()))
            .unwrap();
        assert!(collection.get(&DocumentId::new("c")).unwrap().is_empty());

        let missing = collection.update_by_id(&DocumentId::new("zz"), &Update::Replace(HashMap::new()));
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_unique_index_enforced_on_insert_and_update() {
        let collection = Collection::new("regs");
        collection
            .create_index(IndexDefinition::new(vec!["name".into()], true))
            .unwrap();

        collection.insert(doc(json!({"_id": "r1", "name": "db/a"}))).unwrap();
        collection.insert(doc(json!({"_id": "r2", "name": "db/b"}))).unwrap();

        let clash = collection.insert(doc(json!({"name": "db/a"})));
        assert!(matches!(clash, Err(StoreError::DuplicateKey { .. })));

        let rename = collection.update_by_id(
            &DocumentId::new("r2"),
            &Update::set(vec![("name".into(), Value::from("db/a"))]),
        );
        assert!(rename.is_err());
        assert_eq!(collection.count(), 2);

        let same = collection.update_by_id(
            &DocumentId::new("r1"),
            &Update::set(vec![("name".into(), Value::from("db/a"))]),
        );
        assert!(same.is_ok());
    }

    #[test]
    fn test_unique_index_over_duplicates_fails() {
        let collection = Collection::new("test");
        collection.insert(doc(json!({"k": 1}))).unwrap();
        collection.insert(doc(json!({"k": 1}))).unwrap();

        let result = collection.create_index(IndexDefinition::new(vec!["k".into()], true));
        assert!(result.is_err());
        assert!(collection.index_definitions().is_empty());
    }

    #[test]
    fn test_index_narrowed_find_matches_scan() {
        let collection = Collection::new("test");
        for i in 0..30 {
            collection
                .insert(doc(json!({"pk": i % 3, "latest": i % 2 == 0, "n": i})))
                .unwrap();
        }
        let query = QueryBuilder::new().eq("pk", 1i64).eq("latest", true).build();
        let scanned = collection.find(&query);

        collection
            .create_index(IndexDefinition::new(vec!["pk".into()], false))
            .unwrap();
        let indexed = collection.find(&query);

        assert_eq!(scanned, indexed);
        assert_eq!(indexed.len(), 5);
    }

    #[test]
    fn test_distinct() {
        let collection = Collection::new("test");
        collection.insert(doc(json!({"c": "red", "t": ["a", "b"]}))).unwrap();
        collection.insert(doc(json!({"c": "blue", "t": ["b"]}))).unwrap();
        collection.insert(doc(json!({"c": "red"}))).unwrap();

        assert_eq!(
            collection.distinct(&Filter::all(), "c"),
            vec![Value::from("red"), Value::from("blue")]
        );
        assert_eq!(
            collection.distinct(&Filter::all(), "t"),
            vec![Value::from("a"), Value::from("b")]
        );
    }

    #[test]
    fn test_upsert_and_delete_many() {
        let collection = Collection::new("test");
        let first = collection.upsert(&Filter::eq("k", 1i64), doc(json!({"k": 1, "v": 1}))).unwrap();
        assert!(matches!(first, UpsertOutcome::Inserted(_)));

        let second = collection.upsert(&Filter::eq("k", 1i64), doc(json!({"k": 1, "v": 2}))).unwrap();
        assert!(matches!(second, UpsertOutcome::Updated(_)));
        assert_eq!(collection.count(), 1);
        assert_eq!(collection.count_matching(&Filter::eq("v", 2i64)), 1);

        assert_eq!(collection.delete_many(&Filter::all()), 1);
        assert_eq!(collection.count(), 0);
    }
}
