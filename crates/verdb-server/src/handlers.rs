//! VerDB Server Handlers
//!
//! Request handlers for the REST API. Core calls are synchronous, so each
//! handler moves its work onto the blocking pool and translates the
//! outcome into the `{"status": ...}` envelope.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use verdb_common::VerdbError;
use verdb_core::{direct_upsert, Registry, SearchRequest, VersionOutcome};
use verdb_document::{Document, DocumentId, Namespace, Update};

// =============================================================================
// Error Response
// =============================================================================

/// Error returned by handlers.
#[derive(Debug)]
pub enum ApiError {
    Core(VerdbError),
    /// A blocking task panicked or was cancelled.
    Internal(String),
}

impl From<VerdbError> for ApiError {
    fn from(err: VerdbError) -> Self {
        ApiError::Core(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Core(err.into())
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Core(err) if err.is_user_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Core(err) => err.to_string(),
            ApiError::Internal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.message());
        } else {
            tracing::debug!("Rejected request: {}", self.message());
        }
        (status, Json(json!({"status": "error", "msg": self.message()}))).into_response()
    }
}

pub type ApiResult = Result<Json<JsonValue>, ApiError>;

/// Run a core call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> verdb_common::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("task failed: {}", e)))?
        .map_err(ApiError::from)
}

fn documents_json(docs: &[Document]) -> Vec<JsonValue> {
    docs.iter().map(Document::to_json).collect()
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Fallback for unknown routes.
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"status": "error", "msg": "not found"})),
    )
}

// =============================================================================
// Registry Endpoints
// =============================================================================

/// Register a collection.
pub async fn create_registry(State(state): State<AppState>, Json(body): Json<JsonValue>) -> ApiResult {
    let reg: Registry = serde_json::from_value(body)?;
    let registries = state.registries.clone();
    let created = blocking(move || registries.create_registry(reg)).await?;
    Ok(Json(json!({"status": "success", "registry": created})))
}

/// Search the persisted registries.
pub async fn search_registries(
    State(state): State<AppState>,
    Json(body): Json<JsonValue>,
) -> ApiResult {
    let request: SearchRequest = serde_json::from_value(body)?;
    let registries = state.registries.clone();
    let docs = blocking(move || registries.search(&request)).await?;
    Ok(Json(json!({"status": "success", "registries": documents_json(&docs)})))
}

/// Look up the registry of one collection.
pub async fn get_registry(
    State(state): State<AppState>,
    Path((database, collection)): Path<(String, String)>,
) -> ApiResult {
    let registries = state.registries.clone();
    let reg = blocking(move || registries.lookup(&database, &collection)).await?;
    Ok(Json(json!({"status": "success", "registry": reg})))
}

/// Replace a registry definition.
pub async fn update_registry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<JsonValue>,
) -> ApiResult {
    let reg: Registry = serde_json::from_value(body)?;
    let registries = state.registries.clone();
    let updated =
        blocking(move || registries.update_registry(&DocumentId::new(id), reg)).await?;
    Ok(Json(json!({"status": "success", "registry": updated})))
}

pub async fn delete_registry(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let registries = state.registries.clone();
    let removed = blocking(move || registries.delete_registry(&DocumentId::new(id))).await?;
    Ok(Json(json!({"status": "success", "registry": removed})))
}

// =============================================================================
// Versioning Endpoints
// =============================================================================

/// One failed document of a batch.
#[derive(Debug, Serialize)]
pub struct DocumentFailure {
    pub err: String,
    pub doc: JsonValue,
}

/// Versionize one document, or each document of an array.
///
/// A single document fails the request on error. A batch always succeeds
/// and lists the documents that failed alongside the outcomes of the rest.
pub async fn versionize(
    State(state): State<AppState>,
    Path((database, collection)): Path<(String, String)>,
    Json(body): Json<JsonValue>,
) -> ApiResult {
    let name = reg_name(&database, &collection);
    let registries = state.registries.clone();
    let versioner = state.versioner.clone();

    match body {
        JsonValue::Array(items) => {
            let (results, errors) = blocking(move || {
                let reg = registries.lookup(&database, &collection)?;
                let mut results: Vec<VersionOutcome> = Vec::new();
                let mut errors = Vec::new();
                for item in items {
                    let outcome = match Document::from_json(item.clone()) {
                        Some(doc) => versioner.versionize(&reg, doc),
                        None => Err(not_an_object()),
                    };
                    match outcome {
                        Ok(outcome) => results.push(outcome),
                        Err(e) => errors.push(DocumentFailure {
                            err: e.to_string(),
                            doc: item,
                        }),
                    }
                }
                Ok((results, errors))
            })
            .await?;
            if !errors.is_empty() {
                tracing::warn!(
                    "{} of {} documents failed to versionize into {}",
                    errors.len(),
                    errors.len() + results.len(),
                    name
                );
            }
            Ok(Json(json!({"status": "success", "results": results, "errors": errors})))
        }
        other => {
            let doc = Document::from_json(other).ok_or_else(not_an_object)?;
            let outcome = blocking(move || {
                let reg = registries.lookup(&database, &collection)?;
                versioner.versionize(&reg, doc)
            })
            .await?;
            Ok(Json(json!({"status": "success", "result": outcome})))
        }
    }
}

fn not_an_object() -> VerdbError {
    VerdbError::Validation("document must be a JSON object".into())
}

fn reg_name(database: &str, collection: &str) -> String {
    format!("{}/{}", database, collection)
}

/// Direct upsert request body.
#[derive(Debug, Deserialize)]
pub struct UpsertRequest {
    pub insert: JsonValue,
    #[serde(default)]
    pub update: Option<JsonValue>,
}

/// Insert or update by compare key, bypassing versioning.
pub async fn upsert(
    State(state): State<AppState>,
    Path((database, collection)): Path<(String, String)>,
    Json(body): Json<JsonValue>,
) -> ApiResult {
    let request: UpsertRequest = serde_json::from_value(body)?;
    let insert = Document::from_json(request.insert).ok_or_else(not_an_object)?;
    let update = match request.update {
        Some(ref json) if !json.is_null() => {
            Some(Update::from_json(json).map_err(VerdbError::from)?)
        }
        _ => None,
    };

    let engine = state.engine.clone();
    let registries = state.registries.clone();
    let outcome = blocking(move || {
        direct_upsert(&*engine, &registries, &database, &collection, insert, update)
    })
    .await?;
    Ok(Json(json!({"status": "success", "result": outcome})))
}

/// Search any collection directly.
pub async fn raw_search(
    State(state): State<AppState>,
    Path((database, collection)): Path<(String, String)>,
    Json(body): Json<JsonValue>,
) -> ApiResult {
    let request: SearchRequest = serde_json::from_value(body)?;
    let engine = state.engine.clone();
    let ns = Namespace::new(database, collection);
    let docs = blocking(move || request.run(&*engine, &ns)).await?;
    Ok(Json(json!({"status": "success", "documents": documents_json(&docs)})))
}

// =============================================================================
// Job Endpoints
// =============================================================================

pub async fn create_job(State(state): State<AppState>, Json(body): Json<JsonValue>) -> ApiResult {
    let jobs = state.jobs.clone();
    let job = blocking(move || jobs.create_job(body)).await?;
    Ok(Json(json!({"status": "success", "job": job})))
}

/// Run a stored job and return its info and result.
pub async fn sched_job(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let jobs = state.jobs.clone();
    let outcome = blocking(move || jobs.sched_by_id(&DocumentId::new(id))).await?;
    Ok(Json(json!({
        "status": "success",
        "info": outcome.info,
        "result": outcome.result,
    })))
}

// =============================================================================
// Tests
// =============================================================================
