//! VerDB Document Engine
//!
//! In-memory `DocumentStore` implementation. Collections are created on first
//! write or index creation; reads against a missing collection see an empty
//! one. The whole engine can be exported to and rebuilt from a serializable
//! snapshot.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use crate::collection::{Collection, UpsertOutcome};
use crate::index::IndexDefinition;
use crate::mapreduce::{self, MapReduceInfo, MapReduceOutput, MapReduceSpec, OutputMode};
use crate::pipeline::{self, Stage};
use crate::query::{Filter, Query};
use crate::store::{DocumentStore, Namespace};
use crate::types::{Document, DocumentId, Value};
use crate::update::Update;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use verdb_common::StoreResult;

// =============================================================================
// Snapshot
// =============================================================================

/// Serializable contents of one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub namespace: Namespace,
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
    #[serde(default)]
    pub documents: Vec<Document>,
}

/// Serializable contents of the whole engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub collections: Vec<CollectionSnapshot>,
}

// =============================================================================
// Document Engine
// =============================================================================

/// The in-memory document storage and query engine.
pub struct DocumentEngine {
    collections: RwLock<HashMap<Namespace, Arc<Collection>>>,
    stats: RwLock<EngineStats>,
}

impl DocumentEngine {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            stats: RwLock::new(EngineStats::default()),
        }
    }

    // -------------------------------------------------------------------------
    // Collection Management
    // -------------------------------------------------------------------------

    fn collection(&self, ns: &Namespace) -> Option<Arc<Collection>> {
        self.collections.read().get(ns).cloned()
    }

    fn collection_or_create(&self, ns: &Namespace) -> Arc<Collection> {
        if let Some(existing) = self.collection(ns) {
            return existing;
        }
        let mut collections = self.collections.write();
        collections
            .entry(ns.clone())
            .or_insert_with(|| {
                debug!("Creating collection {}", ns);
                Arc::new(Collection::new(ns.collection.clone()))
            })
            .clone()
    }

    /// List all namespaces holding a collection.
    pub fn list_namespaces(&self) -> Vec<Namespace> {
        let mut namespaces: Vec<Namespace> = self.collections.read().keys().cloned().collect();
        namespaces.sort();
        namespaces
    }

    /// Get engine statistics.
    pub fn stats(&self) -> EngineStats {
        self.stats.read().clone()
    }

    // -------------------------------------------------------------------------
    // Snapshot / Restore
    // -------------------------------------------------------------------------

    /// Export every collection with its documents and index definitions.
    pub fn snapshot(&self) -> EngineSnapshot {
        let collections = self.collections.read();
        let mut snapshot: Vec<CollectionSnapshot> = collections
            .iter()
            .map(|(ns, coll)| CollectionSnapshot {
                namespace: ns.clone(),
                indexes: coll.index_definitions(),
                documents: coll.all(),
            })
            .collect();
        snapshot.sort_by(|a, b| a.namespace.cmp(&b.namespace));
        EngineSnapshot {
            collections: snapshot,
        }
    }

    /// Replace the engine contents with a snapshot.
    ///
    /// The snapshot is rebuilt off to the side; on error the current
    /// contents are left untouched.
    pub fn restore(&self, snapshot: EngineSnapshot) -> StoreResult<()> {
        let mut rebuilt = HashMap::new();
        let mut document_count = 0;

        for entry in snapshot.collections {
            let coll = Collection::new(entry.namespace.collection.clone());
            for definition in entry.indexes {
                coll.create_index(definition)?;
            }
            for doc in entry.documents {
                coll.insert(doc)?;
                document_count += 1;
            }
            rebuilt.insert(entry.namespace, Arc::new(coll));
        }

        info!(
            "Restored {} collections ({} documents)",
            rebuilt.len(),
            document_count
        );
        *self.collections.write() = rebuilt;
        Ok(())
    }

    fn record(&self, f: impl FnOnce(&mut EngineStats)) {
        f(&mut self.stats.write());
    }
}

impl Default for DocumentEngine {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// DocumentStore Implementation
// =============================================================================

impl DocumentStore for DocumentEngine {
    fn find_one(&self, ns: &Namespace, filter: &Filter) -> StoreResult<Option<Document>> {
        self.record(|s| s.queries_executed += 1);
        Ok(self.collection(ns).and_then(|c| c.find_one(filter)))
    }

    fn find_many(&self, ns: &Namespace, query: &Query) -> StoreResult<Vec<Document>> {
        self.record(|s| s.queries_executed += 1);
        Ok(self.collection(ns).map(|c| c.find(query)).unwrap_or_default())
    }

    fn count(&self, ns: &Namespace, filter: &Filter) -> StoreResult<usize> {
        self.record(|s| s.queries_executed += 1);
        Ok(self.collection(ns).map_or(0, |c| c.count_matching(filter)))
    }

    fn distinct(&self, ns: &Namespace, filter: &Filter, key: &str) -> StoreResult<Vec<Value>> {
        self.record(|s| s.queries_executed += 1);
        Ok(self
            .collection(ns)
            .map(|c| c.distinct(filter, key))
            .unwrap_or_default())
    }

    fn insert_one(&self, ns: &Namespace, doc: Document) -> StoreResult<DocumentId> {
        let id = self.collection_or_create(ns).insert(doc)?;
        self.record(|s| s.documents_inserted += 1);
        Ok(id)
    }

    fn update_by_id(&self, ns: &Namespace, id: &DocumentId, update: &Update) -> StoreResult<()> {
        self.collection_or_create(ns).update_by_id(id, update)?;
        self.record(|s| s.documents_updated += 1);
        Ok(())
    }

    fn update_many(&self, ns: &Namespace, filter: &Filter, update: &Update) -> StoreResult<usize> {
        let Some(coll) = self.collection(ns) else {
            return Ok(0);
        };
        let updated = coll.update_many(filter, update)?;
        self.record(|s| s.documents_updated += updated as u64);
        Ok(updated)
    }

    fn upsert(&self, ns: &Namespace, filter: &Filter, doc: Document) -> StoreResult<UpsertOutcome> {
        let outcome = self.collection_or_create(ns).upsert(filter, doc)?;
        self.record(|s| match &outcome {
            UpsertOutcome::Inserted(_) => s.documents_inserted += 1,
            UpsertOutcome::Updated(_) => s.documents_updated += 1,
        });
        Ok(outcome)
    }

    fn remove_by_id(&self, ns: &Namespace, id: &DocumentId) -> StoreResult<Document> {
        let removed = self.collection_or_create(ns).delete(id)?;
        self.record(|s| s.documents_deleted += 1);
        Ok(removed)
    }

    fn delete_many(&self, ns: &Namespace, filter: &Filter) -> StoreResult<usize> {
        let deleted = self.collection(ns).map_or(0, |c| c.delete_many(filter));
        self.record(|s| s.documents_deleted += deleted as u64);
        Ok(deleted)
    }

    fn aggregate(&self, ns: &Namespace, stages: &[Stage]) -> StoreResult<Vec<Value>> {
        self.record(|s| s.queries_executed += 1);
        let docs = self.collection(ns).map(|c| c.all()).unwrap_or_default();
        Ok(pipeline::run(stages, docs))
    }

    fn map_reduce(
        &self,
        ns: &Namespace,
        filter: &Filter,
        spec: &MapReduceSpec,
    ) -> StoreResult<MapReduceOutput> {
        let started = Instant::now();
        let docs = self.find_many(ns, &Query::filter(filter.clone()))?;
        let reduced = mapreduce::map_reduce(spec, &docs);

        let mut info = MapReduceInfo {
            input_count: docs.len(),
            emit_count: reduced.emit_count,
            output_count: reduced.rows.len(),
            output_collection: None,
            elapsed_ms: 0,
        };

        let results = match &spec.out {
            Some(out) => {
                let target = Namespace::new(ns.database.clone(), out.collection.clone());
                if out.mode == OutputMode::Replace {
                    self.delete_many(&target, &Filter::all())?;
                }
                for (key, value) in &reduced.rows {
                    let doc = mapreduce::output_document(key, value);
                    let by_id = Filter::eq("_id", doc.id.to_string());
                    self.upsert(&target, &by_id, doc)?;
                }
                info.output_collection = Some(target.to_string());
                None
            }
            None => Some(
                reduced
                    .rows
                    .iter()
                    .map(|(key, value)| mapreduce::result_row(key, value))
                    .collect(),
            ),
        };

        info.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(MapReduceOutput { results, info })
    }

    fn ensure_index(&self, ns: &Namespace, keys: &[String], unique: bool) -> StoreResult<()> {
        self.collection_or_create(ns)
            .create_index(IndexDefinition::new(keys.to_vec(), unique))
    }

    fn list_indexes(&self, ns: &Namespace) -> StoreResult<Vec<IndexDefinition>> {
        Ok(self
            .collection(ns)
            .map(|c| c.index_definitions())
            .unwrap_or_default())
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Engine-wide statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    pub documents_inserted: u64,
    pub documents_updated: u64,
    pub documents_deleted: u64,
    pub queries_executed: u64,
}

// =============================================================================
// Tests
// =============================================================================
