//! VerDB Jobs
//!
//! Stored job definitions. A job targets one collection and carries the
//! parameters of its kind; the `type` tag selects the kind.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use verdb_common::{Result, VerdbError};
use verdb_document::{Document, DocumentId, Namespace};

/// Recognized values of the `type` tag.
pub const JOB_TYPES: [&str; 4] = ["CountJob", "DistinctJob", "PipelineJob", "MapReduceJob"];

// =============================================================================
// Job Status
// =============================================================================

/// Scheduling state. A job is `Running` only while a scheduler holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobStatus {
    #[default]
    Ready,
    Running,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::Running => "Running",
        }
    }
}

// =============================================================================
// Job Kind
// =============================================================================

/// Kind-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JobKind {
    /// Count documents matching `query`.
    CountJob {
        #[serde(default)]
        query: JsonValue,
    },
    /// Distinct values of `distinct_key` among documents matching `query`.
    DistinctJob {
        #[serde(default)]
        query: JsonValue,
        distinct_key: String,
    },
    /// Aggregation pipeline over the whole collection.
    PipelineJob {
        #[serde(default)]
        pipeline: Vec<JsonValue>,
    },
    /// Map-reduce over documents matching `query`.
    MapReduceJob {
        #[serde(default)]
        query: JsonValue,
        map_reduce: verdb_document::MapReduceSpec,
    },
}

impl JobKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::CountJob { .. } => JOB_TYPES[0],
            Self::DistinctJob { .. } => JOB_TYPES[1],
            Self::PipelineJob { .. } => JOB_TYPES[2],
            Self::MapReduceJob { .. } => JOB_TYPES[3],
        }
    }
}

// =============================================================================
// Job
// =============================================================================

/// A stored job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "_id", default = "DocumentId::generate")]
    pub id: DocumentId,
    #[serde(default)]
    pub name: String,
    pub target_db: String,
    pub target_repo: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(flatten)]
    pub kind: JobKind,
}

impl Job {
    /// Decode a job definition, reporting an unrecognized or missing `type`
    /// as `UnknownType` before any other decoding error.
    pub fn from_definition(def: JsonValue) -> Result<Self> {
        let type_name = def.get("type").and_then(JsonValue::as_str).unwrap_or("");
        if !JOB_TYPES.contains(&type_name) {
            return Err(VerdbError::UnknownType(type_name.to_string()));
        }
        Ok(serde_json::from_value(def)?)
    }

    pub fn target(&self) -> Namespace {
        Namespace::new(self.target_db.clone(), self.target_repo.clone())
    }

    /// Pre-persist checks. Kind parameters are checked when the job runs.
    pub fn validate(&self) -> Result<()> {
        if self.target_db.is_empty() || self.target_repo.is_empty() {
            return Err(VerdbError::Validation(
                "target_db and target_repo can't be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn to_document(&self) -> Result<Document> {
        Document::from_json(serde_json::to_value(self)?)
            .ok_or_else(|| VerdbError::Serialization("job is not an object".into()))
    }

    pub fn from_document(doc: &Document) -> Result<Self> {
        Ok(serde_json::from_value(doc.to_json())?)
    }

    /// Ready jobs may be scheduled.
    pub fn check_runnable(&self) -> Result<()> {
        match self.status {
            JobStatus::Ready => Ok(()),
            JobStatus::Running => Err(VerdbError::Busy(format!("job {} is running", self.id))),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_kinds() {
        let job = Job::from_definition(json!({
            "name": "dcs",
            "type": "DistinctJob",
            "target_db": "db",
            "target_repo": "hosts",
            "query": {"up": true},
            "distinct_key": "dc"
        }))
        .unwrap();
        assert_eq!(job.status, JobStatus::Ready);
        assert_eq!(job.kind.type_name(), "DistinctJob");
        assert!(matches!(job.kind, JobKind::DistinctJob { ref distinct_key, .. } if distinct_key == "dc"));

        let mr = Job::from_definition(json!({
            "type": "MapReduceJob",
            "target_db": "db",
            "target_repo": "hosts",
            "map_reduce": {"map": {"key": "dc"}, "reduce": "count"}
        }))
        .unwrap();
        assert_eq!(mr.target(), Namespace::new("db", "hosts"));
    }

    #[test]
    fn test_unknown_type() {
        let err = Job::from_definition(json!({"type": "SleepJob", "target_db": "d", "target_repo": "r"}))
            .unwrap_err();
        assert!(matches!(err, VerdbError::UnknownType(ref t) if t == "SleepJob"));

        let err = Job::from_definition(json!({"target_db": "d", "target_repo": "r"})).unwrap_err();
        assert!(matches!(err, VerdbError::UnknownType(_)));
    }

    #[test]
    fn test_bad_parameters_are_serialization_errors() {
        let err = Job::from_definition(json!({"type": "DistinctJob", "target_db": "d", "target_repo": "r"}))
            .unwrap_err();
        assert!(matches!(err, VerdbError::Serialization(_)));
        assert!(err.is_user_error());
    }

    #[test]
    fn test_document_round_trip() {
        let mut job = Job::from_definition(json!({
            "name": "count all",
            "type": "CountJob",
            "target_db": "db",
            "target_repo": "hosts"
        }))
        .unwrap();
        job.status = JobStatus::Running;

        let doc = job.to_document().unwrap();
        assert_eq!(doc.id, job.id);
        assert_eq!(doc.get("status").and_then(|v| v.as_str()), Some("Running"));
        assert_eq!(doc.get("type").and_then(|v| v.as_str()), Some("CountJob"));
        assert_eq!(Job::from_document(&doc).unwrap(), job);
        assert!(job.check_runnable().is_err());
    }
}
