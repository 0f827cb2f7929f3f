//! VerDB Router
//!
//! HTTP router configuration with middleware stack. Defines all API routes
//! and applies tracing, CORS, body limits and request ids.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use crate::handlers;
use crate::middleware;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

// =============================================================================
// Router
// =============================================================================

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let registry_routes = Router::new()
        .route("/registry", post(handlers::create_registry))
        .route("/registry/search", post(handlers::search_registries))
        .route("/registry/:db/:collection", get(handlers::get_registry))
        .route(
            "/registries/:id",
            put(handlers::update_registry).delete(handlers::delete_registry),
        );

    let data_routes = Router::new()
        .route("/versionize/:db/:collection", post(handlers::versionize))
        .route("/upsert/:db/:collection", post(handlers::upsert))
        .route("/search/:db/:collection", post(handlers::raw_search));

    let job_routes = Router::new()
        .route("/job", post(handlers::create_job))
        .route("/job/:id/sched", get(handlers::sched_job));

    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api", registry_routes.merge(data_routes).merge(job_routes))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(state.config.body_limit_bytes))
        .layer(TraceLayer::new_for_http());

    if state.config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router = router.layer(cors);
    }

    router
        .layer(axum::middleware::from_fn(middleware::request_id))
        .with_state(state)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn app() -> Router {
        create_router(AppState::new(ServerConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_not_found() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/nonexistent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_wrong_method() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/versionize/db/items")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let config = ServerConfig::default().with_body_limit(16);
        let app = create_router(AppState::new(config).unwrap());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/job")
                    .header("Content-Type", "application/json")
                    .body(Body::from(format!("{{\"name\": \"{}\"}}", "x".repeat(64))))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
