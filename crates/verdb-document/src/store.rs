//! VerDB Document Store Capability
//!
//! The store interface the versioning core is written against. Every call is
//! scoped to a `Namespace`; implementations must be safe to share across
//! threads.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use crate::index::IndexDefinition;
use crate::mapreduce::{MapReduceOutput, MapReduceSpec};
use crate::pipeline::Stage;
use crate::query::{Filter, Query};
use crate::types::{Document, DocumentId, Value};
use crate::update::Update;
use serde::{Deserialize, Serialize};
use std::fmt;
use verdb_common::StoreResult;

pub use crate::collection::UpsertOutcome;

// =============================================================================
// Namespace
// =============================================================================

/// A (database, collection) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.database, self.collection)
    }
}

// =============================================================================
// Document Store
// =============================================================================

/// Generic query, mutation and index capability over namespaced collections.
pub trait DocumentStore: Send + Sync {
    /// First document matching `filter`, in storage order.
    fn find_one(&self, ns: &Namespace, filter: &Filter) -> StoreResult<Option<Document>>;

    fn find_many(&self, ns: &Namespace, query: &Query) -> StoreResult<Vec<Document>>;

    fn count(&self, ns: &Namespace, filter: &Filter) -> StoreResult<usize>;

    /// Distinct values of `key` among matching documents.
    fn distinct(&self, ns: &Namespace, filter: &Filter, key: &str) -> StoreResult<Vec<Value>>;

    fn insert_one(&self, ns: &Namespace, doc: Document) -> StoreResult<DocumentId>;

    /// Fails with `StoreError::NotFound` when no document has `id`.
    fn update_by_id(&self, ns: &Namespace, id: &DocumentId, update: &Update) -> StoreResult<()>;

    /// Returns the number of documents updated.
    fn update_many(&self, ns: &Namespace, filter: &Filter, update: &Update) -> StoreResult<usize>;

    /// Replace the first match's data with `doc`'s, or insert `doc`.
    fn upsert(&self, ns: &Namespace, filter: &Filter, doc: Document) -> StoreResult<UpsertOutcome>;

    /// Removes and returns the document; `StoreError::NotFound` on a miss.
    fn remove_by_id(&self, ns: &Namespace, id: &DocumentId) -> StoreResult<Document>;

    fn delete_many(&self, ns: &Namespace, filter: &Filter) -> StoreResult<usize>;

    fn aggregate(&self, ns: &Namespace, pipeline: &[Stage]) -> StoreResult<Vec<Value>>;

    /// Run map-reduce over documents matching `filter`.
    fn map_reduce(
        &self,
        ns: &Namespace,
        filter: &Filter,
        spec: &MapReduceSpec,
    ) -> StoreResult<MapReduceOutput>;

    /// Create the index unless one over the same keys exists.
    fn ensure_index(&self, ns: &Namespace, keys: &[String], unique: bool) -> StoreResult<()>;

    fn list_indexes(&self, ns: &Namespace) -> StoreResult<Vec<IndexDefinition>>;
}
