//! VerDB Document - Document Store Layer
//!
//! Schema-flexible document model and the store capability the versioning
//! core is written against. Ships an in-memory engine implementing that
//! capability for embedding, tests and single-node deployments.
//!
//! Key Features:
//! - Tagged value model with dotted-path access
//! - Mongo-style JSON filter and update language
//! - Aggregation pipelines and map-reduce
//! - Single and compound indexes, optionally unique
//!
//! @version 0.1.0
//! @author VerDB Development Team

pub mod types;
pub mod query;
pub mod update;
pub mod index;
pub mod collection;
pub mod pipeline;
pub mod mapreduce;
pub mod store;
pub mod engine;

pub use types::{Document, DocumentId, Value};
pub use collection::Collection;
pub use index::{DocumentIndex, IndexDefinition};
pub use query::{Filter, Pattern, Projection, Query, QueryBuilder, Sort};
pub use update::Update;
pub use pipeline::{Accumulator, Stage};
pub use mapreduce::{MapReduceInfo, MapReduceOut, MapReduceOutput, MapReduceSpec, MapSpec, OutputMode, Reducer};
pub use store::{DocumentStore, Namespace, UpsertOutcome};
pub use engine::{CollectionSnapshot, DocumentEngine, EngineSnapshot, EngineStats};
pub use verdb_common::{StoreError, StoreResult};
