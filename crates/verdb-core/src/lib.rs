//! VerDB Core - Temporal Versioning Engine
//!
//! Versioned storage policy on top of a generic document store. A registry
//! binds a collection to its versioning rules; the versioner decides per
//! submission whether to insert, overwrite, extend or snapshot; the jobs
//! manager runs stored count/distinct/pipeline/map-reduce jobs under a
//! concurrency ceiling.
//!
//! Key Features:
//! - Time-bucketed snapshots with validity windows
//! - Change detection over dotted paths with array fan-out
//! - Cached registries with index provisioning
//! - Bounded job scheduling with a Ready/Running state machine
//!
//! @version 0.1.0
//! @author VerDB Development Team

pub mod path;
pub mod registry;
pub mod versioning;
pub mod search;
pub mod registry_manager;
pub mod upsert;
pub mod job;
pub mod jobs_manager;

pub use registry::{IndexKey, IntervalVersions, ManualVersions, Registry, VersionSource};
pub use versioning::{VersionOutcome, Versioner};
pub use search::SearchRequest;
pub use registry_manager::RegistryManager;
pub use upsert::{direct_upsert, DirectUpsert};
pub use job::{Job, JobKind, JobStatus};
pub use jobs_manager::{JobsManager, SchedOutcome};
pub use verdb_common::{Result, VerdbError};
