//! VerDB Document Index
//!
//! Indexing structures for equality lookups and uniqueness constraints.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use crate::types::{Document, DocumentId, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use verdb_common::{StoreError, StoreResult};

// =============================================================================
// Index Definition
// =============================================================================

/// Fields covered by an index and whether keys must be unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub fields: Vec<String>,
    pub unique: bool,
}

impl IndexDefinition {
    pub fn new(fields: Vec<String>, unique: bool) -> Self {
        Self { fields, unique }
    }

    /// Index name in `field_1_other_1` form.
    pub fn name(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("{}_1", f))
            .collect::<Vec<_>>()
            .join("_")
    }
}

// =============================================================================
// Document Index
// =============================================================================

/// Index over one field or a compound of fields.
///
/// Documents missing every indexed field are not indexed. Single-field
/// indexes also answer equality lookups; array values are indexed both as a
/// whole and per element.
pub struct DocumentIndex {
    definition: IndexDefinition,
    lookup: HashMap<String, HashSet<DocumentId>>,
    unique_keys: HashMap<String, DocumentId>,
}

impl DocumentIndex {
    /// Create a new index.
    pub fn new(definition: IndexDefinition) -> Self {
        Self {
            definition,
            lookup: HashMap::new(),
            unique_keys: HashMap::new(),
        }
    }

    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    pub fn name(&self) -> String {
        self.definition.name()
    }

    /// The indexed field when this is a single-field index.
    pub fn single_field(&self) -> Option<&str> {
        match self.definition.fields.as_slice() {
            [field] => Some(field.as_str()),
            _ => None,
        }
    }

    /// Fail if `doc` would duplicate the key of a different document.
    pub fn check_unique(&self, doc: &Document) -> StoreResult<()> {
        if !self.definition.unique {
            return Ok(());
        }
        if let Some(key) = self.tuple_key(doc) {
            if let Some(owner) = self.unique_keys.get(&key) {
                if owner != &doc.id {
                    return Err(StoreError::DuplicateKey {
                        index: self.name(),
                        key,
                    });
                }
            }
        }
        Ok(())
    }

    /// Index a document.
    pub fn index_document(&mut self, doc: &Document) {
        if self.definition.unique {
            if let Some(key) = self.tuple_key(doc) {
                self.unique_keys.insert(key, doc.id.clone());
            }
        }

        if let Some(field) = self.single_field() {
            if let Some(value) = doc.get_field(field) {
                for key in lookup_keys(&value) {
                    self.lookup.entry(key).or_default().insert(doc.id.clone());
                }
            }
        }
    }

    /// Remove a document from the index.
    pub fn unindex_document(&mut self, doc: &Document) {
        if self.definition.unique {
            if let Some(key) = self.tuple_key(doc) {
                if self.unique_keys.get(&key) == Some(&doc.id) {
                    self.unique_keys.remove(&key);
                }
            }
        }

        if let Some(field) = self.single_field() {
            if let Some(value) = doc.get_field(field) {
                for key in lookup_keys(&value) {
                    if let Some(ids) = self.lookup.get_mut(&key) {
                        ids.remove(&doc.id);
                        if ids.is_empty() {
                            self.lookup.remove(&key);
                        }
                    }
                }
            }
        }
    }

    /// Find documents whose indexed field equals `value`.
    ///
    /// Returns `None` for compound indexes.
    pub fn find_eq(&self, value: &Value) -> Option<Vec<DocumentId>> {
        self.single_field()?;
        Some(
            self.lookup
                .get(&value.canonical_string())
                .map(|ids| ids.iter().cloned().collect())
                .unwrap_or_default(),
        )
    }

    fn tuple_key(&self, doc: &Document) -> Option<String> {
        let values: Vec<Option<Value>> = self
            .definition
            .fields
            .iter()
            .map(|f| doc.get_field(f))
            .collect();
        if values.iter().all(Option::is_none) {
            return None;
        }
        Some(
            values
                .into_iter()
                .map(|v| v.unwrap_or(Value::Null).canonical_string())
                .collect::<Vec<_>>()
                .join("\u{1f}"),
        )
    }
}

fn lookup_keys(value: &Value) -> Vec<String> {
    let mut keys = vec![value.canonical_string()];
    if let Value::Array(items) = value {
        keys.extend(items.iter().map(|v| v.canonical_string()));
    }
    keys
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, field: &str, value: impl Into<Value>) -> Document {
        let mut d = Document::with_id(id);
        d.set(field, value);
        d
    }

    #[test]
    fn test_hash_lookup() {
        let mut index = DocumentIndex::new(IndexDefinition::new(vec!["status".into()], false));

        index.index_document(&doc("doc1", "status", "active"));
        index.index_document(&doc("doc2", "status", "active"));
        index.index_document(&doc("doc3", "status", "inactive"));

        assert_eq!(index.find_eq(&Value::from("active")).unwrap().len(), 2);
        assert_eq!(index.find_eq(&Value::from("inactive")).unwrap().len(), 1);
        assert_eq!(index.find_eq(&Value::from("gone")).unwrap().len(), 0);
    }

    #[test]
    fn test_numeric_keys_are_normalized() {
        let mut index = DocumentIndex::new(IndexDefinition::new(vec!["n".into()], false));
        index.index_document(&doc("doc1", "n", 1i64));
        assert_eq!(index.find_eq(&Value::Float(1.0)).unwrap().len(), 1);
    }

    #[test]
    fn test_array_elements_indexed() {
        let mut index = DocumentIndex::new(IndexDefinition::new(vec!["tags".into()], false));
        index.index_document(&doc("doc1", "tags", vec![Value::from("a"), Value::from("b")]));
        assert_eq!(index.find_eq(&Value::from("b")).unwrap().len(), 1);
    }

    #[test]
    fn test_unique_violation() {
        let mut index = DocumentIndex::new(IndexDefinition::new(vec!["name".into()], true));
        let first = doc("doc1", "name", "db/coll");
        index.index_document(&first);

        assert!(index.check_unique(&first).is_ok());
        let clash = doc("doc2", "name", "db/coll");
        assert!(matches!(
            index.check_unique(&clash),
            Err(StoreError::DuplicateKey { .. })
        ));

        index.unindex_document(&first);
        assert!(index.check_unique(&clash).is_ok());
    }

    #[test]
    fn test_sparse_and_compound() {
        let mut index =
            DocumentIndex::new(IndexDefinition::new(vec!["a".into(), "b".into()], true));
        assert_eq!(index.name(), "a_1_b_1");
        assert!(index.find_eq(&Value::Int(1)).is_none());

        let empty = Document::with_id("e1");
        index.index_document(&empty);
        assert!(index.check_unique(&Document::with_id("e2")).is_ok());

        let mut one = Document::with_id("x1");
        one.set("a", 1i64);
        one.set("b", 2i64);
        index.index_document(&one);

        let mut other = Document::with_id("x2");
        other.set("a", 1i64);
        other.set("b", 3i64);
        assert!(index.check_unique(&other).is_ok());
        other.set("b", 2i64);
        assert!(index.check_unique(&other).is_err());
    }
}
