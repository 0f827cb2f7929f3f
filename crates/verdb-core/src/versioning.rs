//! VerDB Versioning Engine
//!
//! Decides, per submitted document, whether to insert a first head,
//! overwrite the head within its bucket, extend the head's validity window
//! or close it and open a new snapshot.
//!
//! Submissions against the same registry are serialized through a lock
//! table keyed by registry name. Closing the old head and inserting the new
//! one are two separate store writes; a reader between them can observe no
//! head for the entity.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use crate::path;
use crate::registry::{IntervalVersions, Registry, VersionSource};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use verdb_common::{Result, VerdbError};
use verdb_document::{Document, DocumentId, DocumentStore, Filter, Update, Value};

/// Reserved version fields.
pub const VER: &str = "_ver";
pub const NEXT: &str = "_next";
pub const IS_LATEST: &str = "_is_latest";

// =============================================================================
// Outcome
// =============================================================================

/// What a versionize call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum VersionOutcome {
    /// First document for the entity.
    Inserted { id: DocumentId },
    /// Head replaced within its bucket.
    Overwritten { id: DocumentId },
    /// Unchanged content; head validity extended to the current bucket.
    Extended { id: DocumentId },
    /// Head closed and a new head inserted.
    Snapshotted { closed: DocumentId, id: DocumentId },
}

impl VersionOutcome {
    /// ID of the current head.
    pub fn id(&self) -> &DocumentId {
        match self {
            Self::Inserted { id }
            | Self::Overwritten { id }
            | Self::Extended { id }
            | Self::Snapshotted { id, .. } => id,
        }
    }
}

// =============================================================================
// Versioner
// =============================================================================

/// Applies registry policies to submitted documents.
pub struct Versioner {
    store: Arc<dyn DocumentStore>,
    versions: Arc<dyn VersionSource>,
    default_interval: i64,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Versioner {
    /// Create a versioner bucketing by wall-clock time.
    pub fn new(store: Arc<dyn DocumentStore>, default_interval: i64) -> Self {
        Self {
            store,
            versions: Arc::new(IntervalVersions),
            default_interval,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the version source.
    pub fn with_version_source(mut self, versions: Arc<dyn VersionSource>) -> Self {
        self.versions = versions;
        self
    }

    /// Current bucket for a registry.
    pub fn current_version(&self, reg: &Registry) -> i64 {
        let interval = if reg.ver_interval > 0 {
            reg.ver_interval
        } else {
            self.default_interval
        };
        self.versions.version(interval)
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Versionize one document under `reg`.
    pub fn versionize(&self, reg: &Registry, doc: Document) -> Result<VersionOutcome> {
        let key = reg.compare_key.as_str();
        let key_value = doc
            .get(key)
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| {
                VerdbError::Validation(format!("document is missing compare key {}", key))
            })?;

        let ns = reg.namespace();
        let lock = self.lock_for(&reg.name);
        let _guard = lock.lock();

        // Update keys apply to every stored version of the entity.
        let updates: Vec<(String, Value)> = reg
            .update_keys
            .iter()
            .filter_map(|k| path::object_value(&doc.data, k).map(|v| (k.clone(), v.clone())))
            .collect();
        if !updates.is_empty() {
            let updated = self.store.update_many(
                &ns,
                &Filter::eq(key, key_value.clone()),
                &Update::set(updates),
            )?;
            debug!("{}: propagated update keys to {} documents", reg.name, updated);
        }

        let ver = self.current_version(reg);
        let mut data = doc.data;
        for reserved in [VER, NEXT, IS_LATEST] {
            data.remove(reserved);
        }
        data.insert(VER.to_string(), Value::Int(ver));
        data.insert(NEXT.to_string(), Value::Int(ver));
        data.insert(IS_LATEST.to_string(), Value::Bool(true));
        let candidate = Document::from_data(data);

        let head_filter = Filter::and(vec![
            Filter::eq(key, key_value),
            Filter::eq(IS_LATEST, true),
        ]);
        let Some(head) = self.store.find_one(&ns, &head_filter)? else {
            let id = self.store.insert_one(&ns, candidate)?;
            debug!("{}: inserted first version {} at {}", reg.name, id, ver);
            return Ok(VersionOutcome::Inserted { id });
        };

        let head_ver = head.get(VER).and_then(Value::as_i64);
        // The head is valid through `_next`; no bucket inside that window
        // may move it.
        let head_next = head.get(NEXT).and_then(Value::as_i64).or(head_ver);
        if let Some(head_next) = head_next.filter(|hn| ver < *hn) {
            return Err(VerdbError::Validation(format!(
                "bucket {} is older than the current head validity {}",
                ver, head_next
            )));
        }
        if head_ver == Some(ver) {
            self.store
                .update_by_id(&ns, &head.id, &Update::Replace(candidate.data))?;
            debug!("{}: overwrote {} within bucket {}", reg.name, head.id, ver);
            return Ok(VersionOutcome::Overwritten { id: head.id });
        }

        if !path::changed(&head, &candidate, &reg.ver_keys) {
            let mut set = vec![(NEXT.to_string(), Value::Int(ver))];
            set.extend(
                candidate
                    .data
                    .into_iter()
                    .filter(|(k, _)| !k.starts_with('_')),
            );
            self.store.update_by_id(&ns, &head.id, &Update::set(set))?;
            debug!("{}: extended {} to {}", reg.name, head.id, ver);
            return Ok(VersionOutcome::Extended { id: head.id });
        }

        let close = Update::set(vec![
            (NEXT.to_string(), Value::Int(ver - 1)),
            (IS_LATEST.to_string(), Value::Bool(false)),
        ]);
        self.store.update_by_id(&ns, &head.id, &close)?;
        let id = self.store.insert_one(&ns, candidate)?;
        debug!("{}: closed {} and opened {} at {}", reg.name, head.id, id, ver);
        Ok(VersionOutcome::Snapshotted {
            closed: head.id,
            id,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
