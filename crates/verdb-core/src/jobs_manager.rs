//! VerDB Jobs Manager
//!
//! Creates stored jobs and runs them one per call under a concurrency
//! ceiling. A scheduled job is marked `Running` in the store for the
//! duration of the run and always written back to `Ready` afterwards.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use crate::job::{Job, JobKind, JobStatus};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{error, info, warn};
use verdb_common::{CoreConfig, Result, VerdbError};
use verdb_document::{
    DocumentId, DocumentStore, Filter, Namespace, Query, Stage, Update, Value,
};

/// Result of one scheduled run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedOutcome {
    pub info: JsonValue,
    pub result: JsonValue,
}

#[derive(Debug)]
struct Gauge {
    running: usize,
    max: usize,
}

/// Decrements the running gauge when dropped.
struct RunningSlot<'a> {
    gauge: &'a RwLock<Gauge>,
}

impl Drop for RunningSlot<'_> {
    fn drop(&mut self) {
        let mut gauge = self.gauge.write();
        gauge.running = gauge.running.saturating_sub(1);
    }
}

// =============================================================================
// Jobs Manager
// =============================================================================

/// Job creation and bounded scheduling.
pub struct JobsManager {
    store: Arc<dyn DocumentStore>,
    namespace: Namespace,
    gauge: RwLock<Gauge>,
}

impl JobsManager {
    pub fn new(store: Arc<dyn DocumentStore>, config: &CoreConfig) -> Self {
        Self {
            store,
            namespace: Namespace::new(
                config.meta_database.clone(),
                config.jobs_collection.clone(),
            ),
            gauge: RwLock::new(Gauge {
                running: 0,
                max: config.max_running_jobs,
            }),
        }
    }

    /// Number of jobs currently running.
    pub fn running(&self) -> usize {
        self.gauge.read().running
    }

    /// Decode, validate and persist a job definition as a fresh `Ready` job.
    pub fn create_job(&self, def: JsonValue) -> Result<Job> {
        let mut job = Job::from_definition(def)?;
        job.id = DocumentId::generate();
        job.status = JobStatus::Ready;
        job.validate()?;

        self.store.insert_one(&self.namespace, job.to_document()?)?;
        info!("Created {} {} ({})", job.kind.type_name(), job.id, job.name);
        Ok(job)
    }

    pub fn get_job(&self, id: &DocumentId) -> Result<Job> {
        let doc = self
            .store
            .find_one(&self.namespace, &Filter::eq("_id", id.to_string()))?
            .ok_or_else(|| VerdbError::NotFound(format!("job {}", id)))?;
        Job::from_document(&doc)
    }

    /// Schedule the job with the given ID.
    pub fn sched_by_id(&self, id: &DocumentId) -> Result<SchedOutcome> {
        self.sched(&Filter::eq("_id", id.to_string()))
    }

    /// Run the single job matching `filter`.
    pub fn sched(&self, filter: &Filter) -> Result<SchedOutcome> {
        self.check()?;

        let mut matches = self
            .store
            .find_many(&self.namespace, &Query::filter(filter.clone()).with_limit(2))?;
        if matches.len() != 1 {
            return Err(VerdbError::NotFound(format!(
                "expected exactly one job, found {}",
                matches.len()
            )));
        }
        let job = Job::from_document(&matches.remove(0))?;
        job.check_runnable()?;

        self.set_status(&job.id, JobStatus::Running)?;
        let outcome = {
            let _slot = self.acquire();
            info!("Running {} {}", job.kind.type_name(), job.id);
            self.dispatch(&job)
        };

        let restored = self.set_status(&job.id, JobStatus::Ready);
        match (outcome, restored) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Err(e), Ok(())) => {
                warn!("Job {} failed: {}", job.id, e);
                Err(e)
            }
            (outcome, Err(restore)) => {
                error!("Failed to restore job {} to Ready: {}", job.id, restore);
                Err(VerdbError::merge_restore(outcome.err(), restore))
            }
        }
    }

    /// The check and the later increment are separate critical sections, so
    /// concurrent calls can briefly push `running` past `max`.
    fn check(&self) -> Result<()> {
        let gauge = self.gauge.read();
        if gauge.running >= gauge.max {
            return Err(VerdbError::TooManyJobs(gauge.max));
        }
        Ok(())
    }

    fn acquire(&self) -> RunningSlot<'_> {
        self.gauge.write().running += 1;
        RunningSlot { gauge: &self.gauge }
    }

    fn set_status(&self, id: &DocumentId, status: JobStatus) -> Result<()> {
        let update = Update::set(vec![("status".to_string(), Value::from(status.as_str()))]);
        Ok(self.store.update_by_id(&self.namespace, id, &update)?)
    }

    fn dispatch(&self, job: &Job) -> Result<SchedOutcome> {
        let target = job.target();
        match &job.kind {
            JobKind::CountJob { query } => {
                let count = self.store.count(&target, &Filter::from_json(query)?)?;
                Ok(SchedOutcome {
                    info: JsonValue::Null,
                    result: JsonValue::from(count),
                })
            }
            JobKind::DistinctJob {
                query,
                distinct_key,
            } => {
                let values = self
                    .store
                    .distinct(&target, &Filter::from_json(query)?, distinct_key)?;
                Ok(SchedOutcome {
                    info: JsonValue::Null,
                    result: values_to_json(&values),
                })
            }
            JobKind::PipelineJob { pipeline } => {
                let stages = Stage::parse_pipeline(&JsonValue::Array(pipeline.clone()))?;
                let rows = self.store.aggregate(&target, &stages)?;
                Ok(SchedOutcome {
                    info: JsonValue::Null,
                    result: values_to_json(&rows),
                })
            }
            JobKind::MapReduceJob { query, map_reduce } => {
                let output =
                    self.store
                        .map_reduce(&target, &Filter::from_json(query)?, map_reduce)?;
                Ok(SchedOutcome {
                    info: serde_json::to_value(&output.info)?,
                    result: output
                        .results
                        .map(|rows| values_to_json(&rows))
                        .unwrap_or(JsonValue::Null),
                })
            }
        }
    }
}

fn values_to_json(values: &[Value]) -> JsonValue {
    JsonValue::Array(values.iter().map(Value::to_json).collect())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use verdb_common::StoreError;
    use verdb_document::{Document, DocumentEngine, IndexDefinition, MapReduceSpec, UpsertOutcome};

    fn seeded() -> Arc<DocumentEngine> {
        let store = Arc::new(DocumentEngine::new());
        let hosts = Namespace::new("db", "hosts");
        for (dc, cpus) in [("a", 2), ("b", 4), ("a", 8)] {
            let doc = Document::from_json(json!({"dc": dc, "cpus": cpus})).unwrap();
            store.insert_one(&hosts, doc).unwrap();
        }
        store
    }

    fn manager(store: Arc<dyn DocumentStore>, max: usize) -> JobsManager {
        JobsManager::new(store, &CoreConfig::default().with_max_running_jobs(max))
    }

    fn count_job(jobs: &JobsManager) -> Job {
        jobs.create_job(json!({
            "name": "in a",
            "type": "CountJob",
            "target_db": "db",
            "target_repo": "hosts",
            "query": {"dc": "a"}
        }))
        .unwrap()
    }

    #[test]
    fn test_create_assigns_fresh_id_and_ready() {
        let jobs = manager(seeded(), 4);
        let job = jobs
            .create_job(json!({
                "_id": "mine",
                "status": "Running",
                "type": "CountJob",
                "target_db": "db",
                "target_repo": "hosts"
            }))
            .unwrap();
        assert_ne!(job.id.as_str(), "mine");
        assert_eq!(jobs.get_job(&job.id).unwrap().status, JobStatus::Ready);

        let err = jobs
            .create_job(json!({"type": "Nope", "target_db": "db", "target_repo": "hosts"}))
            .unwrap_err();
        assert!(matches!(err, VerdbError::UnknownType(_)));
    }

    #[test]
    fn test_count_and_distinct() {
        let jobs = manager(seeded(), 4);
        let count = count_job(&jobs);
        let out = jobs.sched_by_id(&count.id).unwrap();
        assert_eq!(out.result, json!(2));
        assert_eq!(out.info, JsonValue::Null);

        let distinct = jobs
            .create_job(json!({
                "type": "DistinctJob",
                "target_db": "db",
                "target_repo": "hosts",
                "distinct_key": "dc"
            }))
            .unwrap();
        assert_eq!(jobs.sched_by_id(&distinct.id).unwrap().result, json!(["a", "b"]));
        assert_eq!(jobs.running(), 0);
    }

    #[test]
    fn test_pipeline_and_map_reduce() {
        let store = seeded();
        let jobs = manager(store.clone(), 4);

        let pipeline = jobs
            .create_job(json!({
                "type": "PipelineJob",
                "target_db": "db",
                "target_repo": "hosts",
                "pipeline": [
                    {"$group": {"_id": "$dc", "cpus": {"$sum": "$cpus"}}},
                    {"$sort": {"_id": 1}}
                ]
            }))
            .unwrap();
        let out = jobs.sched_by_id(&pipeline.id).unwrap();
        assert_eq!(out.result, json!([{"_id": "a", "cpus": 10}, {"_id": "b", "cpus": 4}]));

        let mr = jobs
            .create_job(json!({
                "type": "MapReduceJob",
                "target_db": "db",
                "target_repo": "hosts",
                "map_reduce": {
                    "map": {"key": "dc", "value": "cpus"},
                    "reduce": "max",
                    "out": {"collection": "maxes"}
                }
            }))
            .unwrap();
        let out = jobs.sched_by_id(&mr.id).unwrap();
        assert_eq!(out.result, JsonValue::Null);
        assert_eq!(out.info["output_count"], json!(2));
        assert_eq!(
            store.count(&Namespace::new("db", "maxes"), &Filter::all()).unwrap(),
            2
        );
    }

    #[test]
    fn test_running_job_is_busy() {
        let store = seeded();
        let jobs = manager(store.clone(), 4);
        let job = count_job(&jobs);

        let jobs_ns = Namespace::new("verdb", "jobs");
        let running = Update::set(vec![("status".into(), Value::from("Running"))]);
        store.update_by_id(&jobs_ns, &job.id, &running).unwrap();

        let err = jobs.sched_by_id(&job.id).unwrap_err();
        assert!(matches!(err, VerdbError::Busy(_)));
    }

    #[test]
    fn test_failed_run_restores_ready() {
        let jobs = manager(seeded(), 4);
        let job = jobs
            .create_job(json!({
                "type": "CountJob",
                "target_db": "db",
                "target_repo": "hosts",
                "query": {"cpus": {"$bogus": 1}}
            }))
            .unwrap();

        let err = jobs.sched_by_id(&job.id).unwrap_err();
        assert!(matches!(err, VerdbError::Store(StoreError::InvalidQuery(_))));
        assert_eq!(jobs.get_job(&job.id).unwrap().status, JobStatus::Ready);
        assert_eq!(jobs.running(), 0);
    }

    #[test]
    fn test_zero_or_many_matches_not_found() {
        let jobs = manager(seeded(), 4);
        count_job(&jobs);
        count_job(&jobs);

        let err = jobs.sched(&Filter::eq("type", "CountJob")).unwrap_err();
        assert!(matches!(err, VerdbError::NotFound(_)));
        let err = jobs.sched_by_id(&DocumentId::new("missing")).unwrap_err();
        assert!(matches!(err, VerdbError::NotFound(_)));
    }

    #[test]
    fn test_ceiling() {
        let jobs = manager(seeded(), 1);
        let job = count_job(&jobs);

        let slot = jobs.acquire();
        let err = jobs.sched_by_id(&job.id).unwrap_err();
        assert!(matches!(err, VerdbError::TooManyJobs(1)));
        drop(slot);

        assert!(jobs.sched_by_id(&job.id).is_ok());
    }

    /// Store wrapper that fails status writes back to Ready.
    struct FailingRestore {
        inner: DocumentEngine,
    }

    impl DocumentStore for FailingRestore {
        fn find_one(&self, ns: &Namespace, f: &Filter) -> verdb_common::StoreResult<Option<Document>> {
            self.inner.find_one(ns, f)
        }
        fn find_many(&self, ns: &Namespace, q: &Query) -> verdb_common::StoreResult<Vec<Document>> {
            self.inner.find_many(ns, q)
        }
        fn count(&self, ns: &Namespace, f: &Filter) -> verdb_common::StoreResult<usize> {
            self.inner.count(ns, f)
        }
        fn distinct(&self, ns: &Namespace, f: &Filter, k: &str) -> verdb_common::StoreResult<Vec<Value>> {
            self.inner.distinct(ns, f, k)
        }
        fn insert_one(&self, ns: &Namespace, d: Document) -> verdb_common::StoreResult<DocumentId> {
            self.inner.insert_one(ns, d)
        }
        fn update_by_id(&self, ns: &Namespace, id: &DocumentId, u: &Update) -> verdb_common::StoreResult<()> {
            let to_ready = Update::set(vec![("status".into(), Value::from("Ready"))]);
            if *u == to_ready {
                return Err(StoreError::Backend("write refused".into()));
            }
            self.inner.update_by_id(ns, id, u)
        }
        fn update_many(&self, ns: &Namespace, f: &Filter, u: &Update) -> verdb_common::StoreResult<usize> {
            self.inner.update_many(ns, f, u)
        }
        fn upsert(&self, ns: &Namespace, f: &Filter, d: Document) -> verdb_common::StoreResult<UpsertOutcome> {
            self.inner.upsert(ns, f, d)
        }
        fn remove_by_id(&self, ns: &Namespace, id: &DocumentId) -> verdb_common::StoreResult<Document> {
            self.inner.remove_by_id(ns, id)
        }
        fn delete_many(&self, ns: &Namespace, f: &Filter) -> verdb_common::StoreResult<usize> {
            self.inner.delete_many(ns, f)
        }
        fn aggregate(&self, ns: &Namespace, p: &[Stage]) -> verdb_common::StoreResult<Vec<Value>> {
            self.inner.aggregate(ns, p)
        }
        fn map_reduce(
            &self,
            ns: &Namespace,
            f: &Filter,
            s: &MapReduceSpec,
        ) -> verdb_common::StoreResult<verdb_document::MapReduceOutput> {
            self.inner.map_reduce(ns, f, s)
        }
        fn ensure_index(&self, ns: &Namespace, k: &[String], u: bool) -> verdb_common::StoreResult<()> {
            self.inner.ensure_index(ns, k, u)
        }
        fn list_indexes(&self, ns: &Namespace) -> verdb_common::StoreResult<Vec<IndexDefinition>> {
            self.inner.list_indexes(ns)
        }
    }

    #[test]
    fn test_restore_failure_is_merged() {
        let store = Arc::new(FailingRestore {
            inner: DocumentEngine::new(),
        });
        let jobs = manager(store, 4);
        let ok = count_job(&jobs);
        let err = jobs.sched_by_id(&ok.id).unwrap_err();
        assert!(matches!(err, VerdbError::Store(StoreError::Backend(_))));

        let bad = jobs
            .create_job(json!({
                "type": "PipelineJob",
                "target_db": "db",
                "target_repo": "hosts",
                "pipeline": [{"$nope": 1}]
            }))
            .unwrap();
        let err = jobs.sched_by_id(&bad.id).unwrap_err();
        assert!(matches!(err, VerdbError::StatusRestore { .. }));
        assert_eq!(jobs.running(), 0);
    }
}
