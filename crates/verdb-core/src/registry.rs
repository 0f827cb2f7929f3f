//! VerDB Registry
//!
//! Versioning configuration for one collection and the version sources that
//! turn wall-clock time into bucket numbers.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use verdb_common::{Result, VerdbError};
use verdb_document::{Document, DocumentId, Namespace};

// =============================================================================
// Index Keys
// =============================================================================

/// A configured index: one dotted path or a compound list of paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexKey {
    Single(String),
    Compound(Vec<String>),
}

impl IndexKey {
    /// Paths covered by the index, in order.
    pub fn paths(&self) -> Vec<String> {
        match self {
            Self::Single(path) => vec![path.clone()],
            Self::Compound(paths) => paths.clone(),
        }
    }

    fn is_valid(&self) -> bool {
        match self {
            Self::Single(path) => !path.is_empty(),
            Self::Compound(paths) => !paths.is_empty() && paths.iter().all(|p| !p.is_empty()),
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Versioning policy bound to one `database/collection`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
    pub database_name: String,
    pub collection_name: String,
    /// Always `database_name/collection_name`; recomputed on every write.
    #[serde(default)]
    pub name: String,
    /// Field identifying one logical entity across its snapshots.
    pub compare_key: String,
    /// Bucket width in seconds; zero selects the configured default.
    #[serde(default)]
    pub ver_interval: i64,
    #[serde(default)]
    pub index_keys: Vec<IndexKey>,
    /// Paths whose change opens a new snapshot.
    #[serde(default)]
    pub ver_keys: Vec<String>,
    /// Paths propagated to every snapshot of the entity.
    #[serde(default)]
    pub update_keys: Vec<String>,
}

impl Registry {
    pub fn new(
        database_name: impl Into<String>,
        collection_name: impl Into<String>,
        compare_key: impl Into<String>,
    ) -> Self {
        let mut reg = Self {
            id: None,
            database_name: database_name.into(),
            collection_name: collection_name.into(),
            name: String::new(),
            compare_key: compare_key.into(),
            ver_interval: 0,
            index_keys: Vec::new(),
            ver_keys: Vec::new(),
            update_keys: Vec::new(),
        };
        reg.name = reg.gen_name();
        reg
    }

    pub fn with_ver_keys(mut self, keys: &[&str]) -> Self {
        self.ver_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_update_keys(mut self, keys: &[&str]) -> Self {
        self.update_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_index_keys(mut self, keys: Vec<IndexKey>) -> Self {
        self.index_keys = keys;
        self
    }

    pub fn with_ver_interval(mut self, seconds: i64) -> Self {
        self.ver_interval = seconds;
        self
    }

    /// `database/collection`.
    pub fn gen_name(&self) -> String {
        format!("{}/{}", self.database_name, self.collection_name)
    }

    /// The versioned collection.
    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.database_name.clone(), self.collection_name.clone())
    }

    /// Check required fields.
    pub fn validate(&self) -> Result<()> {
        if self.database_name.is_empty()
            || self.collection_name.is_empty()
            || self.compare_key.is_empty()
        {
            return Err(VerdbError::Validation(
                "databaseName, collectionName and compareKey can't be empty".into(),
            ));
        }
        if self.ver_keys.is_empty() {
            return Err(VerdbError::Validation("verKeys can't be empty".into()));
        }
        if self.ver_interval < 0 {
            return Err(VerdbError::Validation(format!(
                "verInterval must not be negative, got {}",
                self.ver_interval
            )));
        }
        if !self.index_keys.iter().all(IndexKey::is_valid) {
            return Err(VerdbError::Validation("indexKeys contains an empty path".into()));
        }
        Ok(())
    }

    /// Stored form: every field except `_id` as document data.
    pub fn to_document(&self) -> Result<Document> {
        let json = serde_json::to_value(self)?;
        Document::from_json(json)
            .ok_or_else(|| VerdbError::Serialization("registry is not an object".into()))
    }

    pub fn from_document(doc: &Document) -> Result<Self> {
        Ok(serde_json::from_value(doc.to_json())?)
    }
}

// =============================================================================
// Version Sources
// =============================================================================

/// Maps an interval width to the current bucket number.
pub trait VersionSource: Send + Sync {
    fn version(&self, interval: i64) -> i64;
}

/// Wall-clock buckets: `unix_seconds / interval`.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntervalVersions;

impl VersionSource for IntervalVersions {
    fn version(&self, interval: i64) -> i64 {
        Utc::now().timestamp() / interval.max(1)
    }
}

/// Externally driven bucket counter, ignoring the interval.
#[derive(Debug, Default)]
pub struct ManualVersions {
    current: AtomicI64,
}

impl ManualVersions {
    pub fn new(start: i64) -> Self {
        Self {
            current: AtomicI64::new(start),
        }
    }

    pub fn set(&self, version: i64) {
        self.current.store(version, Ordering::SeqCst);
    }

    /// Move to the next bucket and return it.
    pub fn advance(&self) -> i64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl VersionSource for ManualVersions {
    fn version(&self, _interval: i64) -> i64 {
        self.current.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Tests
// =============================================================================
